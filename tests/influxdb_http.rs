//! Drives the InfluxDB scaler over real HTTP against an in-process stub server.

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use metric_scaler::prelude::*;

const LONG_42: &str = "\
#datatype,string,long,dateTime:RFC3339,long,string,string
#group,false,false,false,false,true,true
#default,_result,,,,,
,result,table,_time,_value,_field,_measurement
,,0,2024-05-01T10:00:00Z,42,depth,queue
,,0,2024-05-01T10:01:00Z,7,depth,queue

";

const EMPTY: &str = "\r\n";

struct Reply {
    status: &'static str,
    content_type: &'static str,
    body: String,
}

impl Reply {
    fn csv(body: &str) -> Self {
        Self {
            status: "200 OK",
            content_type: "text/csv; charset=utf-8",
            body: body.to_string(),
        }
    }

    fn json(status: &'static str, body: &str) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.to_string(),
        }
    }
}

/// Minimal HTTP/1.1 server answering each connection with the next reply
struct Stub {
    url: String,
    requests: mpsc::UnboundedReceiver<String>,
}

async fn stub(replies: Vec<Reply>) -> Stub {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let (tx, requests) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        for reply in replies {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let _ = tx.send(request);
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                reply.status,
                reply.content_type,
                reply.body.len(),
                reply.body
            );
            socket.write_all(response.as_bytes()).await.ok();
            socket.shutdown().await.ok();
        }
    });

    Stub { url, requests }
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        let text = String::from_utf8_lossy(&data).to_string();
        if let Some(head_end) = text.find("\r\n\r\n") {
            let content_length = text[..head_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if data.len() >= head_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&data).to_string()
}

fn config_for(url: &str) -> ScalerConfig {
    ScalerConfigBuilder::new("worker")
        .namespace("jobs")
        .metadata("authToken", "tok")
        .metadata("organizationName", "org1")
        .metadata("query", "from(bucket: \"jobs\") |> last()")
        .metadata("serverURL", url)
        .metadata("thresholdValue", "100")
        .http_timeout(Duration::from_secs(5))
        .build()
}

fn build(url: &str) -> AnyScaler {
    build_scaler("influxdb", &config_for(url), &ScalerLogger::new("influxdb_scaler")).unwrap()
}

#[tokio::test]
async fn test_is_active_sends_authenticated_flux_query() {
    let mut server = stub(vec![Reply::csv(LONG_42)]).await;
    let mut scaler = build(&server.url);

    assert!(scaler.is_active(&PollContext::new()).await.unwrap());

    let request = server.requests.recv().await.unwrap();
    let lower = request.to_lowercase();
    assert!(request.starts_with("POST /api/v2/query?org=org1 HTTP/1.1"));
    assert!(lower.contains("authorization: token tok"));
    assert!(lower.contains("accept: application/csv"));
    assert!(request.contains("\"type\":\"flux\""));
    assert!(request.contains("\"query\":\"from(bucket: \\\"jobs\\\") |> last()\""));

    scaler.close().await.unwrap();
}

#[tokio::test]
async fn test_get_metrics_reports_first_row() {
    let server = stub(vec![Reply::csv(LONG_42)]).await;
    let scaler = build(&server.url);

    let sample = scaler
        .get_metrics(
            &PollContext::new(),
            "s0-influxdb-org1",
            &MetricSelector::everything(),
        )
        .await
        .unwrap();
    assert_eq!(sample.metric_name, "s0-influxdb-org1");
    assert_eq!(sample.value, 42.0);
}

#[tokio::test]
async fn test_empty_result() {
    let server = stub(vec![Reply::csv(EMPTY)]).await;
    let scaler = build(&server.url);

    let err = scaler.is_active(&PollContext::new()).await.unwrap_err();
    assert_eq!(err.as_query(), Some(&QueryError::NoResults));
}

#[tokio::test]
async fn test_server_error_message_is_surfaced() {
    let server = stub(vec![Reply::json(
        "401 Unauthorized",
        r#"{"code":"unauthorized","message":"unauthorized access"}"#,
    )])
    .await;
    let scaler = build(&server.url);

    let err = scaler.is_active(&PollContext::new()).await.unwrap_err();
    match err.as_query() {
        Some(QueryError::Execution { status, message }) => {
            assert!(status.starts_with("401"));
            assert_eq!(message, "unauthorized access");
        }
        other => panic!("unexpected error: {other:?} ({err})"),
    }
}

#[tokio::test]
async fn test_health_check() {
    let server = stub(vec![
        Reply::json("200 OK", r#"{"name":"influxdb","status":"pass"}"#),
        Reply::json("503 Service Unavailable", r#"{"name":"influxdb","status":"fail"}"#),
    ])
    .await;
    let scaler = build(&server.url);
    let check = scaler.health_check().unwrap();

    assert!(check.check_health().await.unwrap());
    assert!(!check.check_health().await.unwrap());
}

#[tokio::test]
async fn test_unreachable_server_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let scaler = build(&url);
    let err = scaler.is_active(&PollContext::new()).await.unwrap_err();
    assert!(matches!(err, ScalerError::Transport(_)), "got {err:?}");
}

#[tokio::test]
async fn test_timeout_aborts_hanging_query() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    // Accept and never answer.
    let hold = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(socket);
    });

    let scaler = build(&url);
    let ctx = PollContext::new().with_timeout(Duration::from_millis(200));
    let err = scaler.is_active(&ctx).await.unwrap_err();
    assert!(matches!(err, ScalerError::Timeout(_)), "got {err:?}");

    hold.abort();
}
