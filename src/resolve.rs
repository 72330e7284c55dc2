//! Precedence-ordered lookup of scaler metadata fields.
//!
//! Each field is resolved by walking a fixed list of [`Lookup`] rules and
//! stopping at the first one that produces a value. A rule can also stop the
//! walk with a failure, which is how a dangling `*FromEnv` reference is
//! reported instead of silently falling through to a lower tier.

use crate::error::ConfigError;
use crate::scaler::ScalerConfig;

/// A single place a field value may come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Non-empty value under the field's own key in the trigger metadata
    Literal,
    /// `<field>FromEnv` in the trigger metadata, naming a resolved, non-empty env var
    FromEnv,
    /// Non-empty value under the field's key in the auth params
    AuthParam,
}

/// Rule order for credential-like fields
pub const CREDENTIAL_LOOKUPS: &[Lookup] = &[Lookup::Literal, Lookup::FromEnv, Lookup::AuthParam];

/// Rule order for fields that may only be declared on the trigger
pub const TRIGGER_ONLY: &[Lookup] = &[Lookup::Literal];

/// Rule order for fields that may come from the trigger or the secret store
pub const TRIGGER_OR_AUTH: &[Lookup] = &[Lookup::Literal, Lookup::AuthParam];

enum Outcome {
    Found(String),
    Skip,
    Fail,
}

impl Lookup {
    fn apply(self, field: &str, config: &ScalerConfig) -> Outcome {
        match self {
            Lookup::Literal => non_empty(config.trigger_metadata.get(field)),
            Lookup::FromEnv => {
                let key = format!("{}FromEnv", field);
                match config.trigger_metadata.get(&key) {
                    Some(env_name) if !env_name.is_empty() => {
                        match config.resolved_env.get(env_name) {
                            Some(value) if !value.is_empty() => Outcome::Found(value.clone()),
                            _ => Outcome::Fail,
                        }
                    }
                    _ => Outcome::Skip,
                }
            }
            Lookup::AuthParam => non_empty(config.auth_params.get(field)),
        }
    }
}

fn non_empty(value: Option<&String>) -> Outcome {
    match value {
        Some(v) if !v.is_empty() => Outcome::Found(v.clone()),
        _ => Outcome::Skip,
    }
}

/// Resolve `field` by trying `lookups` in order
pub fn resolve_field(
    config: &ScalerConfig,
    field: &'static str,
    lookups: &[Lookup],
) -> Result<String, ConfigError> {
    resolve_optional(config, field, lookups)?.ok_or(ConfigError::Missing(field))
}

/// Like [`resolve_field`], but an unmatched field is `None` rather than an error.
///
/// A dangling `*FromEnv` reference still fails.
pub fn resolve_optional(
    config: &ScalerConfig,
    field: &'static str,
    lookups: &[Lookup],
) -> Result<Option<String>, ConfigError> {
    for lookup in lookups {
        match lookup.apply(field, config) {
            Outcome::Found(value) => return Ok(Some(value)),
            Outcome::Skip => continue,
            Outcome::Fail => return Err(ConfigError::Missing(field)),
        }
    }
    Ok(None)
}

/// Parse a required finite float from the trigger metadata.
///
/// A key that is present but empty is a parse failure, not a missing field.
pub fn parse_float(config: &ScalerConfig, field: &'static str) -> Result<f64, ConfigError> {
    let raw = config
        .trigger_metadata
        .get(field)
        .ok_or(ConfigError::Missing(field))?;
    let value: f64 = raw
        .parse()
        .map_err(|e: std::num::ParseFloatError| ConfigError::InvalidThreshold(e.to_string()))?;
    if !value.is_finite() {
        return Err(ConfigError::NonFiniteThreshold(value));
    }
    Ok(value)
}

/// Parse an optional boolean from the trigger metadata
pub fn parse_bool(
    config: &ScalerConfig,
    field: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(raw) = config.trigger_metadata.get(field) else {
        return Ok(default);
    };
    match raw.as_str() {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key: field,
            value: raw.clone(),
        }),
    }
}
