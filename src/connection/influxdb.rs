use async_trait::async_trait;
use native_tls::TlsConnector;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::connection::health::HealthCheck;
use crate::error::{QueryError, Result, ScalerError};
use crate::flux::FluxRecords;
use crate::query::QueryApi;
use crate::scaler::influxdb::InfluxDbMetadata;
use crate::util::logging::ScalerLogger;

/// Long-lived InfluxDB v2 HTTP client.
///
/// Owns a pooled `reqwest` client; every request is authenticated with the
/// scaler's token. Dropping the client releases the pool.
pub struct InfluxDbClient {
    base_url: Url,
    auth_token: String,
    http: reqwest::Client,
    logger: ScalerLogger,
}

/// Body of a `POST /api/v2/query` request
#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    dialect: Dialect,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Dialect {
    header: bool,
    delimiter: &'static str,
    annotations: [&'static str; 3],
    comment_prefix: &'static str,
    date_time_format: &'static str,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            header: true,
            delimiter: ",",
            annotations: ["datatype", "group", "default"],
            comment_prefix: "#",
            date_time_format: "RFC3339",
        }
    }
}

/// Error body returned by the InfluxDB API
#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Body of `GET /health`
#[derive(Debug, Deserialize)]
struct HealthReport {
    status: String,
}

impl InfluxDbClient {
    /// Build a client for the server described by `metadata`
    pub fn open(
        metadata: &InfluxDbMetadata,
        timeout: Duration,
        logger: ScalerLogger,
    ) -> Result<Self> {
        let base_url = parse_base_url(metadata.server_url())?;

        if metadata.unsafe_ssl() {
            logger.warn(format_args!("TLS certificate validation disabled for {}", base_url));
        }
        let http = build_http_client(metadata.unsafe_ssl(), timeout)?;

        logger.info(format_args!("starting up influxdb client for {}", base_url));

        Ok(Self {
            base_url,
            auth_token: metadata.auth_token().to_string(),
            http,
            logger,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ScalerError::Transport(format!("invalid endpoint {}: {}", path, e)))
    }

    fn authorization(&self) -> String {
        format!("Token {}", self.auth_token)
    }
}

impl fmt::Debug for InfluxDbClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfluxDbClient")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl QueryApi for InfluxDbClient {
    async fn query(&self, organization: &str, query: &str) -> Result<FluxRecords> {
        let mut url = self.endpoint("api/v2/query")?;
        url.query_pairs_mut().append_pair("org", organization);

        self.logger.debug(format_args!("running query for org {}: {}", organization, query));

        let response = self
            .http
            .post(url)
            .header(AUTHORIZATION, self.authorization())
            .header(ACCEPT, "application/csv")
            .json(&QueryRequest {
                query,
                kind: "flux",
                dialect: Dialect::default(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.message)
                .unwrap_or(body);
            return Err(QueryError::Execution {
                status: status.to_string(),
                message,
            }
            .into());
        }

        Ok(FluxRecords::new(response))
    }
}

#[async_trait]
impl HealthCheck for InfluxDbClient {
    async fn check_health(&self) -> Result<bool> {
        let url = self.endpoint("health")?;
        let response = match self
            .http
            .get(url)
            .header(AUTHORIZATION, self.authorization())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.logger.warn(format_args!("influxdb health check failed: {}", e));
                return Ok(false);
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            self.logger.warn(format_args!("influxdb health check returned {}", status));
            return Ok(false);
        }

        match response.json::<HealthReport>().await {
            Ok(report) => Ok(report.status == "pass"),
            Err(e) => {
                self.logger.warn(format_args!("unreadable influxdb health report: {}", e));
                Ok(false)
            }
        }
    }

    fn name(&self) -> &str {
        self.base_url.as_str()
    }
}

/// Parse the server URL so that relative API paths resolve beneath it
fn parse_base_url(server_url: &str) -> Result<Url> {
    let mut normalized = server_url.trim().to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    let url = Url::parse(&normalized).map_err(|e| {
        ScalerError::Transport(format!("invalid server URL {:?}: {}", server_url, e))
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ScalerError::Transport(format!(
            "unsupported URL scheme {:?} in {:?}",
            other, server_url
        ))),
    }
}

/// Build the pooled HTTP client
fn build_http_client(unsafe_ssl: bool, timeout: Duration) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(concat!("metric-scaler/", env!("CARGO_PKG_VERSION")));

    if !timeout.is_zero() {
        builder = builder.timeout(timeout);
    }

    if unsafe_ssl {
        builder = builder.use_preconfigured_tls(build_insecure_tls_connector()?);
    }

    builder
        .build()
        .map_err(|e| ScalerError::Transport(format!("failed to build HTTP client: {}", e)))
}

/// TLS connector that skips certificate and hostname validation.
///
/// Only ever used when the trigger explicitly sets `unsafeSsl`.
fn build_insecure_tls_connector() -> Result<TlsConnector> {
    let mut builder = TlsConnector::builder();
    builder.danger_accept_invalid_certs(true);
    builder.danger_accept_invalid_hostnames(true);

    builder
        .build()
        .map_err(|e| ScalerError::Transport(format!("failed to build TLS connector: {}", e)))
}
