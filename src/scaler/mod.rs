//! The polling contract shared by every metric-source scaler.
//!
//! A controller constructs one scaler per trigger, then repeatedly asks it
//! whether the workload is active and what the current metric value is.
//! Scalers never cache, retry or schedule anything themselves.

mod config;
pub mod influxdb;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::connection::HealthCheck;
use crate::context::PollContext;
use crate::error::{ConfigError, Result};
use crate::util::logging::ScalerLogger;

pub use self::config::{DEFAULT_HTTP_TIMEOUT, ScalerConfig, ScalerConfigBuilder};
pub use influxdb::{InfluxDbMetadata, InfluxDbScaler};

/// A single reading reported to the external metrics pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    pub metric_name: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl MetricSample {
    /// A sample of `value` taken now
    pub fn now(metric_name: impl Into<String>, value: f64) -> Self {
        Self {
            metric_name: metric_name.into(),
            value,
            timestamp: Utc::now(),
        }
    }
}

/// How the horizontal autoscaler compares a metric against its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricTargetType {
    AverageValue,
}

/// Metric the horizontal autoscaler should scale on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSpec {
    pub name: String,
    pub target_type: MetricTargetType,
    pub average_value: f64,
}

impl MetricSpec {
    pub fn average_value(name: impl Into<String>, average_value: f64) -> Self {
        Self {
            name: name.into(),
            target_type: MetricTargetType::AverageValue,
            average_value,
        }
    }
}

/// Label selector passed along with metric requests
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricSelector {
    labels: BTreeMap<String, String>,
}

impl MetricSelector {
    /// Selector matching everything
    pub fn everything() -> Self {
        Self::default()
    }

    /// Require `key=value`
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Polling interface implemented by every scaler
#[async_trait]
pub trait Scaler: Send + Sync {
    /// Whether the workload should be considered active
    async fn is_active(&self, ctx: &PollContext) -> Result<bool>;

    /// Current value of the scaler's metric, reported as `metric_name`
    async fn get_metrics(
        &self,
        ctx: &PollContext,
        metric_name: &str,
        selector: &MetricSelector,
    ) -> Result<MetricSample>;

    /// Metrics the horizontal autoscaler should target
    fn get_metric_spec_for_scaling(&self) -> Vec<MetricSpec>;

    /// Release the scaler's connection. Calling it again is a no-op.
    async fn close(&mut self) -> Result<()>;
}

/// Every scaler this crate can build
#[derive(Debug)]
pub enum AnyScaler {
    InfluxDb(InfluxDbScaler),
}

impl AnyScaler {
    /// Trigger type name this scaler was built for
    pub fn trigger_type(&self) -> &'static str {
        match self {
            AnyScaler::InfluxDb(_) => influxdb::TRIGGER_TYPE,
        }
    }

    /// Health probe for the scaler's connection, if it is still open
    pub fn health_check(&self) -> Option<&dyn HealthCheck> {
        match self {
            AnyScaler::InfluxDb(s) => s.client().map(|c| c as &dyn HealthCheck),
        }
    }
}

/// Build the scaler for a trigger of type `trigger_type`
pub fn build_scaler(
    trigger_type: &str,
    config: &ScalerConfig,
    logger: &ScalerLogger,
) -> Result<AnyScaler> {
    match trigger_type {
        influxdb::TRIGGER_TYPE => Ok(AnyScaler::InfluxDb(InfluxDbScaler::new(config, logger)?)),
        other => Err(ConfigError::UnknownTrigger(other.to_string()).into()),
    }
}

#[async_trait]
impl Scaler for AnyScaler {
    async fn is_active(&self, ctx: &PollContext) -> Result<bool> {
        match self {
            AnyScaler::InfluxDb(s) => s.is_active(ctx).await,
        }
    }

    async fn get_metrics(
        &self,
        ctx: &PollContext,
        metric_name: &str,
        selector: &MetricSelector,
    ) -> Result<MetricSample> {
        match self {
            AnyScaler::InfluxDb(s) => s.get_metrics(ctx, metric_name, selector).await,
        }
    }

    fn get_metric_spec_for_scaling(&self) -> Vec<MetricSpec> {
        match self {
            AnyScaler::InfluxDb(s) => s.get_metric_spec_for_scaling(),
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            AnyScaler::InfluxDb(s) => s.close().await,
        }
    }
}
