//! Pluggable metric-source scalers for scale-from-zero autoscaling

pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod flux;
pub mod query;
pub mod resolve;
pub mod scaler;
pub mod util;

/// Re-export of commonly used types for convenience
pub mod prelude {
    pub use crate::connection::health::HealthCheck;
    pub use crate::context::{CancelHandle, PollContext};
    pub use crate::error::{ConfigError, QueryError, Result, ScalerError};
    pub use crate::scaler::{
        AnyScaler, MetricSample, MetricSelector, MetricSpec, Scaler, ScalerConfig,
        ScalerConfigBuilder, build_scaler,
    };
    pub use crate::util::logging::ScalerLogger;
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
