//! Single-value query evaluation.
//!
//! The evaluator assumes the first row returned is the value of interest.
//! Ordering and limiting the result is the query author's job; remaining rows
//! are dropped unread.

use async_trait::async_trait;

use crate::context::PollContext;
use crate::error::{QueryError, Result};
use crate::flux::{FluxRecords, FluxValue};
use crate::util::logging::ScalerLogger;

/// Something that can run a Flux query for an organization
#[async_trait]
pub trait QueryApi: Send + Sync {
    /// Start `query` and return a cursor over its rows
    async fn query(&self, organization: &str, query: &str) -> Result<FluxRecords>;
}

/// Run `query` and extract the first row's value as a float
pub async fn evaluate<Q>(
    api: &Q,
    ctx: &PollContext,
    organization: &str,
    query: &str,
    logger: &ScalerLogger,
) -> Result<f64>
where
    Q: QueryApi + ?Sized,
{
    ctx.run(first_value(api, organization, query, logger)).await
}

async fn first_value<Q>(
    api: &Q,
    organization: &str,
    query: &str,
    logger: &ScalerLogger,
) -> Result<f64>
where
    Q: QueryApi + ?Sized,
{
    let mut records = api.query(organization, query).await?;
    let record = records.next().await?.ok_or(QueryError::NoResults)?;
    logger.trace(format_args!("first record of query: {:?}", record));
    Ok(to_float(record.value())?)
}

/// Coerce a numeric cell into a float
pub fn to_float(value: &FluxValue) -> std::result::Result<f64, QueryError> {
    match value {
        FluxValue::Double(v) => Ok(*v),
        FluxValue::Long(v) => Ok(*v as f64),
        FluxValue::UnsignedLong(v) => Ok(*v as f64),
        other => Err(QueryError::NotFloat(other.type_name())),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ScalerError;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Canned-response query API that counts calls
    pub(crate) struct FakeQueryApi {
        pub body: String,
        pub delay: Option<Duration>,
        pub calls: AtomicUsize,
        pub seen: Mutex<Vec<(String, String)>>,
    }

    impl FakeQueryApi {
        pub(crate) fn new(body: impl Into<String>) -> Self {
            Self {
                body: body.into(),
                delay: None,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn delayed(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QueryApi for FakeQueryApi {
        async fn query(&self, organization: &str, query: &str) -> Result<FluxRecords> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen
                .lock()
                .unwrap()
                .push((organization.to_string(), query.to_string()));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(FluxRecords::from_text(self.body.clone()))
        }
    }

    fn logger() -> ScalerLogger {
        ScalerLogger::default()
    }

    /// A single-table response whose `_value` column has `datatype`
    pub(crate) fn single_value(datatype: &str, values: &[&str]) -> String {
        let mut body = format!(
            "#datatype,string,long,{}\n#group,false,false,false\n#default,_result,,\n,result,table,_value\n",
            datatype
        );
        for value in values {
            body.push_str(&format!(",,0,{}\n", value));
        }
        body
    }

    #[tokio::test]
    async fn test_long_is_coerced() {
        let api = FakeQueryApi::new(single_value("long", &["42"]));
        let value = evaluate(&api, &PollContext::new(), "org1", "q", &logger()).await.unwrap();
        assert_eq!(value, 42.0);
        assert_eq!(
            api.seen.lock().unwrap().as_slice(),
            &[("org1".to_string(), "q".to_string())]
        );
    }

    #[tokio::test]
    async fn test_double_passes_through() {
        let api = FakeQueryApi::new(single_value("double", &["0.25"]));
        let value = evaluate(&api, &PollContext::new(), "org", "q", &logger()).await.unwrap();
        assert_eq!(value, 0.25);
    }

    #[tokio::test]
    async fn test_only_first_row_counts() {
        let api = FakeQueryApi::new(single_value("double", &["3", "100", "7"]));
        let value = evaluate(&api, &PollContext::new(), "org", "q", &logger()).await.unwrap();
        assert_eq!(value, 3.0);
    }

    #[tokio::test]
    async fn test_no_rows() {
        let api = FakeQueryApi::new(single_value("double", &[]));
        let err = evaluate(&api, &PollContext::new(), "org", "q", &logger())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "no results found from query");

        let api = FakeQueryApi::new("");
        let err = evaluate(&api, &PollContext::new(), "org", "q", &logger())
            .await
            .unwrap_err();
        assert_eq!(err.as_query(), Some(&QueryError::NoResults));
    }

    #[tokio::test]
    async fn test_non_numeric_value_names_its_type() {
        let api = FakeQueryApi::new(single_value("string", &["busy"]));
        let err = evaluate(&api, &PollContext::new(), "org", "q", &logger())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "value of type string could not be converted into a float"
        );

        let api = FakeQueryApi::new(single_value("boolean", &["true"]));
        let err = evaluate(&api, &PollContext::new(), "org", "q", &logger())
            .await
            .unwrap_err();
        assert_eq!(err.as_query(), Some(&QueryError::NotFloat("boolean")));
    }

    #[tokio::test]
    async fn test_timeout_aborts_query() {
        let api = FakeQueryApi::new(single_value("long", &["1"])).delayed(Duration::from_secs(30));
        let ctx = PollContext::new().with_timeout(Duration::from_millis(20));
        let err = evaluate(&api, &ctx, "org", "q", &logger()).await.unwrap_err();
        assert!(matches!(err, ScalerError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_first_record_traced_on_injected_logger() {
        crate::util::logging::tests::captured("query_trace");
        let logger = ScalerLogger::new("query_trace").for_trigger("jobs", "worker", 2);
        let api = FakeQueryApi::new(single_value("long", &["8"]));
        evaluate(&api, &PollContext::new(), "org", "q", &logger)
            .await
            .unwrap();

        let records = crate::util::logging::tests::captured("query_trace");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].1, log::Level::Trace);
        assert!(records[0].2.starts_with("[jobs/worker trigger 2] first record of query:"));
    }

    #[test]
    fn test_to_float() {
        assert_eq!(to_float(&FluxValue::UnsignedLong(9)), Ok(9.0));
        assert_eq!(to_float(&FluxValue::Long(-3)), Ok(-3.0));
        assert_eq!(to_float(&FluxValue::Null), Err(QueryError::NotFloat("null")));
    }
}
