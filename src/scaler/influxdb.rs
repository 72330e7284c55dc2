use async_trait::async_trait;
use std::fmt;

use crate::connection::InfluxDbClient;
use crate::context::PollContext;
use crate::error::{ConfigError, Result, ScalerError};
use crate::query::{self, QueryApi};
use crate::resolve::{self, CREDENTIAL_LOOKUPS, TRIGGER_ONLY, TRIGGER_OR_AUTH};
use crate::scaler::{MetricSample, MetricSelector, MetricSpec, Scaler, ScalerConfig};
use crate::util::logging::ScalerLogger;
use crate::util::naming::{generate_metric_name_with_index, normalize_string};

/// Trigger type handled by this scaler
pub const TRIGGER_TYPE: &str = "influxdb";

/// Prefix applied to every metric name this scaler reports
const METRIC_PREFIX: &str = "influxdb";

/// Validated settings for an InfluxDB trigger
#[derive(Clone, PartialEq)]
pub struct InfluxDbMetadata {
    auth_token: String,
    organization_name: String,
    query: String,
    server_url: String,
    metric_name: String,
    unsafe_ssl: bool,
    threshold_value: f64,
    scaler_index: usize,
}

impl InfluxDbMetadata {
    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }

    pub fn organization_name(&self) -> &str {
        &self.organization_name
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Normalised metric name, without the trigger index
    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }

    pub fn unsafe_ssl(&self) -> bool {
        self.unsafe_ssl
    }

    pub fn threshold_value(&self) -> f64 {
        self.threshold_value
    }

    pub fn scaler_index(&self) -> usize {
        self.scaler_index
    }
}

impl fmt::Debug for InfluxDbMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfluxDbMetadata")
            .field("auth_token", &"<redacted>")
            .field("organization_name", &self.organization_name)
            .field("query", &self.query)
            .field("server_url", &self.server_url)
            .field("metric_name", &self.metric_name)
            .field("unsafe_ssl", &self.unsafe_ssl)
            .field("threshold_value", &self.threshold_value)
            .field("scaler_index", &self.scaler_index)
            .finish()
    }
}

/// Parse the metadata passed in from the trigger declaration
pub fn parse_influxdb_metadata(
    config: &ScalerConfig,
) -> std::result::Result<InfluxDbMetadata, ConfigError> {
    let auth_token = resolve::resolve_field(config, "authToken", CREDENTIAL_LOOKUPS)?;
    let organization_name = resolve::resolve_field(config, "organizationName", CREDENTIAL_LOOKUPS)?;
    let query = resolve::resolve_field(config, "query", TRIGGER_ONLY)?;
    let server_url = resolve::resolve_field(config, "serverURL", TRIGGER_OR_AUTH)?;

    let metric_base = resolve::resolve_optional(config, "metricName", TRIGGER_ONLY)?
        .unwrap_or_else(|| organization_name.clone());
    let metric_name = normalize_string(&format!("{}-{}", METRIC_PREFIX, metric_base));

    let threshold_value = resolve::parse_float(config, "thresholdValue")?;
    let unsafe_ssl = resolve::parse_bool(config, "unsafeSsl", false)?;

    Ok(InfluxDbMetadata {
        auth_token,
        organization_name,
        query,
        server_url,
        metric_name,
        unsafe_ssl,
        threshold_value,
        scaler_index: config.scaler_index,
    })
}

/// Scaler backed by a Flux query against InfluxDB v2
pub struct InfluxDbScaler<C = InfluxDbClient> {
    client: Option<C>,
    metadata: InfluxDbMetadata,
    logger: ScalerLogger,
}

impl InfluxDbScaler {
    /// Create a new InfluxDB scaler and its client
    pub fn new(config: &ScalerConfig, logger: &ScalerLogger) -> Result<Self> {
        let metadata = parse_influxdb_metadata(config)
            .map_err(|e| ScalerError::metadata(TRIGGER_TYPE, e))?;
        let logger = logger.for_trigger(&config.namespace, &config.name, config.scaler_index);

        let client = InfluxDbClient::open(&metadata, config.global_http_timeout, logger.clone())?;

        Ok(Self::with_client(metadata, client, logger))
    }
}

impl<C: QueryApi> InfluxDbScaler<C> {
    /// Assemble a scaler around an already-open client
    pub fn with_client(metadata: InfluxDbMetadata, client: C, logger: ScalerLogger) -> Self {
        Self {
            client: Some(client),
            metadata,
            logger,
        }
    }

    pub fn metadata(&self) -> &InfluxDbMetadata {
        &self.metadata
    }

    /// The open client, if the scaler has not been closed
    pub fn client(&self) -> Option<&C> {
        self.client.as_ref()
    }

    async fn evaluate(&self, ctx: &PollContext) -> Result<f64> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| ScalerError::Transport("client is closed".to_string()))?;

        let value = query::evaluate(
            client,
            ctx,
            &self.metadata.organization_name,
            &self.metadata.query,
            &self.logger,
        )
        .await?;

        self.logger.debug(format_args!("query returned {}", value));
        Ok(value)
    }
}

impl<C> fmt::Debug for InfluxDbScaler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfluxDbScaler")
            .field("metadata", &self.metadata)
            .field("open", &self.client.is_some())
            .finish()
    }
}

#[async_trait]
impl<C: QueryApi> Scaler for InfluxDbScaler<C> {
    /// Active while the queried value is above zero
    async fn is_active(&self, ctx: &PollContext) -> Result<bool> {
        let value = self.evaluate(ctx).await?;
        Ok(value > 0.0)
    }

    async fn get_metrics(
        &self,
        ctx: &PollContext,
        metric_name: &str,
        _selector: &MetricSelector,
    ) -> Result<MetricSample> {
        let value = self.evaluate(ctx).await?;
        Ok(MetricSample::now(metric_name, value))
    }

    fn get_metric_spec_for_scaling(&self) -> Vec<MetricSpec> {
        let name = generate_metric_name_with_index(
            self.metadata.scaler_index,
            &self.metadata.metric_name,
        );
        vec![MetricSpec::average_value(name, self.metadata.threshold_value)]
    }

    async fn close(&mut self) -> Result<()> {
        if self.client.take().is_some() {
            let server_url = &self.metadata.server_url;
            self.logger.info(format_args!("closed influxdb client for {}", server_url));
        }
        Ok(())
    }
}
