// src/error.rs
use std::time::Duration;
use thiserror::Error;

/// Result type used throughout the metric-scaler library
pub type Result<T> = std::result::Result<T, ScalerError>;

/// Errors raised while turning trigger configuration into scaler metadata.
///
/// These only ever occur during construction, never while polling.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("no {0} given")]
    Missing(&'static str),

    #[error("thresholdValue: failed to parse thresholdValue length {0}")]
    InvalidThreshold(String),

    #[error("thresholdValue: {0} is not a finite number")]
    NonFiniteThreshold(f64),

    #[error("error parsing {key}: invalid boolean {value:?}")]
    InvalidBool { key: &'static str, value: String },

    #[error("no scaler found for type: {0}")]
    UnknownTrigger(String),
}

/// Errors raised while executing a query or decoding its result
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("query failed ({status}): {message}")]
    Execution { status: String, message: String },

    #[error("no results found from query")]
    NoResults,

    #[error("value of type {0} could not be converted into a float")]
    NotFloat(&'static str),

    #[error("malformed query response: {0}")]
    Malformed(String),
}

/// Custom Error type for the metric-scaler library
#[derive(Error, Debug)]
pub enum ScalerError {
    #[error("error parsing {scaler} metadata: {source}")]
    Metadata {
        scaler: &'static str,
        #[source]
        source: ConfigError,
    },

    #[error("Config error: {0}")]
    Config(String),

    #[error(transparent)]
    Trigger(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    #[error("query cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for ScalerError {
    fn from(err: reqwest::Error) -> Self {
        ScalerError::Transport(err.to_string())
    }
}

impl ScalerError {
    /// Wrap a metadata failure with the name of the scaler that raised it
    pub fn metadata(scaler: &'static str, source: ConfigError) -> Self {
        ScalerError::Metadata { scaler, source }
    }

    /// The underlying query error, if this is one
    pub fn as_query(&self) -> Option<&QueryError> {
        match self {
            ScalerError::Query(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_error_message() {
        let err = ScalerError::metadata("influxdb", ConfigError::Missing("authToken"));
        assert_eq!(
            err.to_string(),
            "error parsing influxdb metadata: no authToken given"
        );
    }

    #[test]
    fn test_config_error_keeps_its_type() {
        let err = ScalerError::from(ConfigError::UnknownTrigger("kafka".into()));
        assert_eq!(err.to_string(), "no scaler found for type: kafka");
        assert!(matches!(
            err,
            ScalerError::Trigger(ConfigError::UnknownTrigger(ref kind)) if kind == "kafka"
        ));
    }

    #[test]
    fn test_query_errors_are_verbatim() {
        let err = ScalerError::from(QueryError::NoResults);
        assert_eq!(err.to_string(), "no results found from query");
        assert_eq!(err.as_query(), Some(&QueryError::NoResults));

        let err = ScalerError::from(QueryError::NotFloat("string"));
        assert_eq!(
            err.to_string(),
            "value of type string could not be converted into a float"
        );
    }
}
