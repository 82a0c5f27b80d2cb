//! End-to-end tests: a real gateway on `127.0.0.1:0` driven by WebSocket
//! and HTTP clients.

#![allow(clippy::panic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use dataviz_gateway::config::{DisconnectPolicy, GatewayConfig};
use dataviz_gateway::domain::{Action, ActionRegistry};
use dataviz_gateway::error::{GatewayError, HandlerError};
use dataviz_gateway::server::{Server, ShutdownHandle};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const TIMEOUT: Duration = Duration::from_secs(5);

struct Running {
    addr: SocketAddr,
    handle: ShutdownHandle,
    task: JoinHandle<Result<(), GatewayError>>,
}

impl Running {
    async fn stop(self) -> Result<(), GatewayError> {
        self.handle.shutdown();
        let Ok(Ok(result)) = tokio::time::timeout(TIMEOUT, self.task).await else {
            panic!("server did not stop in time");
        };
        result
    }
}

fn test_config() -> GatewayConfig {
    GatewayConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        max_workers: 2,
        ..GatewayConfig::default()
    }
}

async fn start(config: GatewayConfig, registry: ActionRegistry) -> Running {
    let Ok(server) = Server::bind_with_registry(&config, registry).await else {
        panic!("bind failed");
    };
    let addr = server.local_addr();
    let handle = server.shutdown_handle();
    let task = tokio::spawn(server.run());
    Running { addr, handle, task }
}

async fn connect(addr: SocketAddr) -> Client {
    let Ok(Ok((client, _))) = tokio::time::timeout(TIMEOUT, connect_async(format!("ws://{addr}/"))).await
    else {
        panic!("websocket connect failed");
    };
    client
}

async fn send(client: &mut Client, value: Value) {
    let Ok(()) = client.send(Message::text(value.to_string())).await else {
        panic!("send failed");
    };
}

async fn send_raw(client: &mut Client, text: &str) {
    let Ok(()) = client.send(Message::text(text.to_string())).await else {
        panic!("send failed");
    };
}

/// Next text frame parsed as JSON; skips pings and pongs.
async fn next_json(client: &mut Client) -> Value {
    loop {
        let Ok(frame) = tokio::time::timeout(TIMEOUT, client.next()).await else {
            panic!("timed out waiting for a frame");
        };
        match frame {
            Some(Ok(Message::Text(text))) => {
                let Ok(value) = serde_json::from_str(text.as_str()) else {
                    panic!("frame is not json: {text}");
                };
                return value;
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            other => panic!("expected a text frame, got {other:?}"),
        }
    }
}

fn slow_then_fast_registry(completed: Arc<AtomicUsize>) -> ActionRegistry {
    ActionRegistry::new()
        .register(Action::LoadData, move |_: Value| -> Result<Value, HandlerError> {
            std::thread::sleep(Duration::from_millis(300));
            completed.fetch_add(1, Ordering::SeqCst);
            Ok(json!("slow"))
        })
        .register(Action::ComputeLayout, |_: Value| -> Result<Value, HandlerError> {
            Ok(json!("fast"))
        })
}

#[tokio::test]
async fn load_data_returns_rows_in_file_order() {
    let Ok(dir) = tempfile::tempdir() else {
        panic!("tempdir failed");
    };
    let Ok(()) = std::fs::write(
        dir.path().join("sample.csv"),
        "model,mpg,cyl\nMazda RX4,21.0,6\nDatsun 710,22.8,4\n",
    ) else {
        panic!("write failed");
    };
    let config = GatewayConfig {
        data_dir: dir.path().to_path_buf(),
        ..test_config()
    };
    let registry = ActionRegistry::with_defaults(config.data_dir.clone());
    let server = start(config, registry).await;
    let mut client = connect(server.addr).await;

    send(&mut client, json!({"action": 0, "content": {"name": "sample.csv"}})).await;
    let response = next_json(&mut client).await;

    assert_eq!(response["action"], json!(0));
    let Some(encoded) = response["content"].as_str() else {
        panic!("content should be a JSON string");
    };
    let Ok(rows) = serde_json::from_str::<Value>(encoded) else {
        panic!("content should decode");
    };
    assert_eq!(
        rows,
        json!([
            {"model": "Mazda RX4", "mpg": 21.0, "cyl": 6},
            {"model": "Datsun 710", "mpg": 22.8, "cyl": 4}
        ])
    );

    tokio_test::assert_ok!(server.stop().await);
}

#[tokio::test]
async fn compute_layout_returns_finite_pairs() {
    let server = start(test_config(), ActionRegistry::with_defaults("data")).await;
    let mut client = connect(server.addr).await;

    send(
        &mut client,
        json!({"action": 1, "content": {"nodes": [1, 2, 3], "links": [[1, 2], [2, 3]]}}),
    )
    .await;
    let response = next_json(&mut client).await;

    assert_eq!(response["action"], json!(1));
    let Some(pairs) = response["content"].as_array() else {
        panic!("content should be an array");
    };
    assert_eq!(pairs.len(), 3);
    for pair in pairs {
        let Some(coords) = pair.as_array() else {
            panic!("pair should be an array");
        };
        assert_eq!(coords.len(), 2);
        assert!(coords.iter().all(|c| c.as_f64().is_some_and(f64::is_finite)));
    }

    tokio_test::assert_ok!(server.stop().await);
}

#[tokio::test]
async fn bad_frames_do_not_close_the_connection() {
    let server = start(test_config(), ActionRegistry::with_defaults("data")).await;
    let mut client = connect(server.addr).await;

    send_raw(&mut client, "{this is not json").await;
    send(&mut client, json!({"action": 99, "content": {}})).await;
    send(&mut client, json!({"action": "passData", "content": {}})).await;
    send(&mut client, json!({"action": 1, "content": {"nodes": [1], "links": []}})).await;

    // Bad frames produce no response; the valid one still does.
    let response = next_json(&mut client).await;
    assert_eq!(response, json!({"action": 1, "content": [[0.0, 0.0]]}));

    tokio_test::assert_ok!(server.stop().await);
}

#[tokio::test]
async fn slow_request_does_not_block_fast_one() {
    let completed = Arc::new(AtomicUsize::new(0));
    let server = start(test_config(), slow_then_fast_registry(Arc::clone(&completed))).await;
    let mut client = connect(server.addr).await;

    send(&mut client, json!({"action": 0, "content": {}})).await;
    send(&mut client, json!({"action": 1, "content": {}})).await;

    let first = next_json(&mut client).await;
    let second = next_json(&mut client).await;
    assert_eq!(first, json!({"action": 1, "content": "fast"}));
    assert_eq!(second, json!({"action": 0, "content": "slow"}));

    tokio_test::assert_ok!(server.stop().await);
}

#[tokio::test]
async fn other_connections_are_not_blocked() {
    let completed = Arc::new(AtomicUsize::new(0));
    let server = start(test_config(), slow_then_fast_registry(Arc::clone(&completed))).await;
    let mut slow_client = connect(server.addr).await;
    let mut fast_client = connect(server.addr).await;

    send(&mut slow_client, json!({"action": 0, "content": {}})).await;
    send(&mut fast_client, json!({"action": 1, "content": {}})).await;

    let fast = next_json(&mut fast_client).await;
    assert_eq!(fast, json!({"action": 1, "content": "fast"}));
    assert_eq!(completed.load(Ordering::SeqCst), 0);

    let slow = next_json(&mut slow_client).await;
    assert_eq!(slow, json!({"action": 0, "content": "slow"}));

    tokio_test::assert_ok!(server.stop().await);
}

#[tokio::test]
async fn closing_with_pending_request_discards_result() {
    let completed = Arc::new(AtomicUsize::new(0));
    let server = start(test_config(), slow_then_fast_registry(Arc::clone(&completed))).await;

    let mut client = connect(server.addr).await;
    send(&mut client, json!({"action": 0, "content": {}})).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(client);

    // The job still runs to completion under the default detach policy.
    let waited = tokio::time::timeout(TIMEOUT, async {
        while completed.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "detached job should finish");

    // The server keeps serving new connections.
    let mut client = connect(server.addr).await;
    send(&mut client, json!({"action": 1, "content": {}})).await;
    assert_eq!(next_json(&mut client).await, json!({"action": 1, "content": "fast"}));

    tokio_test::assert_ok!(server.stop().await);
}

#[tokio::test]
async fn abort_policy_cancels_queued_requests_on_close() {
    let started = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&started);
    let registry = ActionRegistry::new()
        .register(Action::LoadData, move |_: Value| -> Result<Value, HandlerError> {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(200));
            Ok(json!("slow"))
        })
        .register(Action::ComputeLayout, |_: Value| -> Result<Value, HandlerError> {
            Ok(json!("fast"))
        });
    let config = GatewayConfig {
        max_workers: 1,
        disconnect_policy: DisconnectPolicy::Abort,
        ..test_config()
    };
    let server = start(config, registry).await;

    let mut client = connect(server.addr).await;
    for _ in 0..3 {
        send(&mut client, json!({"action": 0, "content": {}})).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    tokio_test::assert_ok!(client.close(None).await);

    // Long enough for the two queued jobs to run had they survived.
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(started.load(Ordering::SeqCst), 1);

    // The running job released its slot; the pool still serves.
    let mut client = connect(server.addr).await;
    send(&mut client, json!({"action": 1, "content": {}})).await;
    assert_eq!(next_json(&mut client).await, json!({"action": 1, "content": "fast"}));

    tokio_test::assert_ok!(server.stop().await);
}

#[tokio::test]
async fn handler_failure_is_silent_by_default() {
    let server = start(test_config(), ActionRegistry::with_defaults("data")).await;
    let mut client = connect(server.addr).await;

    send(
        &mut client,
        json!({"action": 1, "content": {"nodes": [1, 2], "links": [[1, 3]]}}),
    )
    .await;
    send(&mut client, json!({"action": 1, "content": {"nodes": [], "links": []}})).await;

    let response = next_json(&mut client).await;
    assert_eq!(response, json!({"action": 1, "content": []}));

    tokio_test::assert_ok!(server.stop().await);
}

#[tokio::test]
async fn handler_failure_is_reported_when_enabled() {
    let config = GatewayConfig {
        report_handler_errors: true,
        ..test_config()
    };
    let server = start(config, ActionRegistry::with_defaults("data")).await;
    let mut client = connect(server.addr).await;

    send(
        &mut client,
        json!({"action": 1, "content": {"nodes": [1, 2], "links": [[1, 3]]}}),
    )
    .await;
    let response = next_json(&mut client).await;
    assert_eq!(response["action"], json!(1));
    assert_eq!(response["error"]["kind"], json!("invalid_graph"));

    send(&mut client, json!({"action": 0, "content": {"name": "missing.csv"}})).await;
    let response = next_json(&mut client).await;
    assert_eq!(response["error"]["kind"], json!("not_found"));

    tokio_test::assert_ok!(server.stop().await);
}

#[tokio::test]
async fn shutdown_drains_then_closes_sessions() {
    let completed = Arc::new(AtomicUsize::new(0));
    let server = start(test_config(), slow_then_fast_registry(Arc::clone(&completed))).await;
    let addr = server.addr;
    let mut client = connect(addr).await;

    send(&mut client, json!({"action": 0, "content": {}})).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    server.handle.shutdown();

    // The outstanding result is still delivered, then the server closes.
    assert_eq!(next_json(&mut client).await, json!({"action": 0, "content": "slow"}));
    let Ok(frame) = tokio::time::timeout(TIMEOUT, client.next()).await else {
        panic!("timed out waiting for close");
    };
    match frame {
        Some(Ok(Message::Close(Some(close)))) => assert_eq!(close.code, CloseCode::Away),
        other => panic!("expected close frame, got {other:?}"),
    }

    tokio_test::assert_ok!(server.stop().await);
    assert_eq!(completed.load(Ordering::SeqCst), 1);
    assert!(connect_async(format!("ws://{addr}/")).await.is_err());
}

#[tokio::test]
async fn health_endpoint_reports_workers() {
    let server = start(test_config(), ActionRegistry::with_defaults("data")).await;

    let Ok(response) = reqwest::get(format!("http://{}/health", server.addr)).await else {
        panic!("health request failed");
    };
    assert!(response.status().is_success());
    let Ok(body) = response.json::<Value>().await else {
        panic!("health body is not json");
    };
    assert_eq!(body["status"], json!("healthy"));
    assert_eq!(body["workers"]["max"], json!(2));

    tokio_test::assert_ok!(server.stop().await);
}
