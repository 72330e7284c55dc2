use std::collections::HashMap;
use std::time::Duration;

/// Default per-request timeout for scaler transports
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(3);

/// Everything a scaler is constructed from.
///
/// Owned by the caller; scalers only ever read it.
#[derive(Debug, Clone)]
pub struct ScalerConfig {
    /// Name of the scaled workload
    pub name: String,
    /// Namespace of the scaled workload
    pub namespace: String,
    /// Raw key/value metadata from the trigger declaration
    pub trigger_metadata: HashMap<String, String>,
    /// Credentials from the secret store
    pub auth_params: HashMap<String, String>,
    /// Environment variables reachable through `*FromEnv` keys
    pub resolved_env: HashMap<String, String>,
    /// Position of this trigger among its siblings on the same workload
    pub scaler_index: usize,
    /// Timeout applied to every request the transport makes
    pub global_http_timeout: Duration,
}

impl Default for ScalerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            namespace: String::new(),
            trigger_metadata: HashMap::new(),
            auth_params: HashMap::new(),
            resolved_env: HashMap::new(),
            scaler_index: 0,
            global_http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

/// Builder for scaler configuration
pub struct ScalerConfigBuilder {
    config: ScalerConfig,
}

impl ScalerConfigBuilder {
    /// Create a new builder for the workload called `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            config: ScalerConfig {
                name: name.into(),
                ..Default::default()
            },
        }
    }

    /// Set the workload namespace
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    /// Add a trigger metadata entry
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.trigger_metadata.insert(key.into(), value.into());
        self
    }

    /// Add an auth parameter
    pub fn auth_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.auth_params.insert(key.into(), value.into());
        self
    }

    /// Add a resolved environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.resolved_env.insert(key.into(), value.into());
        self
    }

    /// Set the trigger index
    pub fn scaler_index(mut self, index: usize) -> Self {
        self.config.scaler_index = index;
        self
    }

    /// Set the transport request timeout
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.config.global_http_timeout = timeout;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ScalerConfig {
        self.config
    }
}
