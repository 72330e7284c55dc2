pub mod health;
pub mod influxdb;

pub use health::HealthCheck;
pub use influxdb::InfluxDbClient;
