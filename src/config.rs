use config::{self, Environment, File};
use log::{debug, error};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, ScalerError};
use crate::scaler::ScalerConfig;

/// Prefix for environment overrides, e.g. `METRIC_SCALER__LOG_LEVEL=debug`
pub const ENV_PREFIX: &str = "METRIC_SCALER";

/// Trigger metadata keys recognised by the bundled scalers.
///
/// Some configuration sources fold key case; these are restored to their
/// canonical spelling before the scaler sees them.
const KNOWN_KEYS: &[&str] = &[
    "authToken",
    "authTokenFromEnv",
    "organizationName",
    "organizationNameFromEnv",
    "query",
    "serverURL",
    "metricName",
    "thresholdValue",
    "unsafeSsl",
];

/// Contents of a trigger declaration file
#[derive(Debug, Deserialize, Clone)]
pub struct ScalerFileConfig {
    /// Logging level
    #[serde(default)]
    pub log_level: LogLevel,
    /// Per-request transport timeout in seconds
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Declared triggers, in workload order
    #[serde(default)]
    pub triggers: Vec<TriggerDeclaration>,
}

/// Default transport timeout
fn default_http_timeout_secs() -> u64 {
    3
}

impl ScalerFileConfig {
    /// Transport timeout as a duration
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Build the scaler config for the trigger at `index`
    pub fn scaler_config(
        &self,
        index: usize,
        env: &HashMap<String, String>,
    ) -> Result<(String, ScalerConfig)> {
        let trigger = self.triggers.get(index).ok_or_else(|| {
            ScalerError::Config(format!(
                "no trigger at index {} ({} declared)",
                index,
                self.triggers.len()
            ))
        })?;
        Ok((
            trigger.trigger_type.clone(),
            trigger.to_scaler_config(index, self.http_timeout(), env),
        ))
    }
}

/// One scaling trigger as declared in the file
#[derive(Debug, Deserialize, Clone)]
pub struct TriggerDeclaration {
    /// Scaler type, e.g. `influxdb`
    #[serde(rename = "type")]
    pub trigger_type: String,
    /// Owning workload name
    #[serde(default)]
    pub name: String,
    /// Owning workload namespace
    #[serde(default)]
    pub namespace: String,
    /// Trigger metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Credentials, standing in for a secret store
    #[serde(default)]
    pub auth_params: HashMap<String, String>,
}

impl TriggerDeclaration {
    /// Turn the declaration into a scaler config.
    ///
    /// Only environment variables named by a `*FromEnv` key are copied out of
    /// `env`; missing ones are left for the scaler to report.
    pub fn to_scaler_config(
        &self,
        scaler_index: usize,
        http_timeout: Duration,
        env: &HashMap<String, String>,
    ) -> ScalerConfig {
        let trigger_metadata: HashMap<String, String> = self
            .metadata
            .iter()
            .map(|(k, v)| (canonical_key(k), v.clone()))
            .collect();
        let auth_params = self
            .auth_params
            .iter()
            .map(|(k, v)| (canonical_key(k), v.clone()))
            .collect();

        let resolved_env = trigger_metadata
            .iter()
            .filter(|(k, _)| k.ends_with("FromEnv"))
            .filter_map(|(_, name)| env.get(name).map(|value| (name.clone(), value.clone())))
            .collect();

        ScalerConfig {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            trigger_metadata,
            auth_params,
            resolved_env,
            scaler_index,
            global_http_timeout: http_timeout,
        }
    }
}

fn canonical_key(key: &str) -> String {
    KNOWN_KEYS
        .iter()
        .find(|known| known.eq_ignore_ascii_case(key))
        .map(|known| known.to_string())
        .unwrap_or_else(|| key.to_string())
}

/// Logging level
#[derive(Debug, Deserialize, Clone, PartialEq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level
    #[default]
    Info,
    /// Debug level
    Debug,
    /// Trace level
    Trace,
}

/// Load a trigger declaration file, with environment overrides on top
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ScalerFileConfig> {
    let path = path.as_ref();
    debug!("Loading configuration from {}", path.display());

    // Check if the file exists
    if !path.exists() {
        error!("Configuration file {} does not exist", path.display());
        return Err(ScalerError::Config(format!("Configuration file not found: {}", path.display())));
    }

    let extension = match path.extension() {
        Some(ext) => ext.to_string_lossy().to_lowercase(),
        None => {
            error!("Configuration file has no extension");
            return Err(ScalerError::Config(format!("Configuration file has no extension: {}", path.display())));
        }
    };

    let format = match extension.as_str() {
        "toml" => config::FileFormat::Toml,
        "json" => config::FileFormat::Json,
        "yaml" | "yml" => config::FileFormat::Yaml,
        format => {
            error!("Unsupported configuration format: {}", format);
            return Err(ScalerError::Config(format!("Unsupported config format: {}", format)));
        }
    };

    let config = config::Config::builder()
        .add_source(File::from(path).format(format))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| ScalerError::Config(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ScalerError::Config(e.to_string()))
}
