//! End-to-end integration tests using a real WebSocket client.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use chatrelay_core::{APOLOGY, ConnectionId};
use chatrelay_llm::mock::{MockReply, ScriptedCompletion, ScriptedTranscription};
use chatrelay_server::config::{KeepaliveConfig, ServerConfig};
use chatrelay_server::server::RelayServer;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Boot a test server and return the WS URL + server.
async fn boot_server(completion: ScriptedCompletion, config: ServerConfig) -> (String, Arc<RelayServer>) {
    let server = Arc::new(RelayServer::new(
        config,
        Arc::new(completion),
        Arc::new(ScriptedTranscription::new(vec![])),
        None,
    ));
    let addr = server.listen().await.unwrap();
    (format!("ws://{addr}/ws"), server)
}

async fn connect(url: &str) -> WsStream {
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

/// Wait until the hub reports `n` registered connections.
async fn wait_for_connections(server: &RelayServer, n: usize) {
    timeout(TIMEOUT, async {
        while server.hub().connection_count() != n {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("expected {n} connections, have {}", server.hub().connection_count()));
}

/// Read the next text frame verbatim.
async fn read_text(ws: &mut WsStream) -> String {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return text.as_str().to_owned();
        }
    }
}

async fn read_json(ws: &mut WsStream) -> Value {
    serde_json::from_str(&read_text(ws).await).unwrap()
}

/// True once the server has closed the socket.
async fn closed_by_server(ws: &mut WsStream) -> bool {
    loop {
        match timeout(TIMEOUT, ws.next()).await {
            Err(_) => return false,
            Ok(None | Some(Err(_) | Ok(Message::Close(_)))) => return true,
            Ok(Some(Ok(_))) => {}
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_message_broadcast_then_ai_reply() {
    let completion = ScriptedCompletion::new(vec![MockReply::text("Hi! How can I help?")]);
    let (url, server) = boot_server(completion, ServerConfig::default()).await;

    let mut ws1 = connect(&url).await;
    let mut ws2 = connect(&url).await;
    wait_for_connections(&server, 2).await;

    let raw = r#"{"type":"message","content":"hello","sender":"user"}"#;
    ws1.send(Message::text(raw)).await.unwrap();

    for ws in [&mut ws1, &mut ws2] {
        assert_eq!(read_text(ws).await, raw);
        let reply = read_json(ws).await;
        assert_eq!(reply["type"], "message");
        assert_eq!(reply["sender"], "ai");
        assert_eq!(reply["content"], "Hi! How can I help?");
        assert!(reply["timestamp"].is_string());
    }

    server.shutdown_gracefully(Some(TIMEOUT)).await;
}

#[tokio::test]
async fn e2e_completion_failure_broadcasts_apology() {
    let completion = ScriptedCompletion::new(vec![MockReply::Status(502)]);
    let (url, server) = boot_server(completion, ServerConfig::default()).await;

    let mut ws = connect(&url).await;
    wait_for_connections(&server, 1).await;

    ws.send(Message::text(r#"{"content":"anyone there?","sender":"user"}"#))
        .await
        .unwrap();

    let echoed = read_json(&mut ws).await;
    assert_eq!(echoed["content"], "anyone there?");
    let apology = read_json(&mut ws).await;
    assert_eq!(apology["type"], "error");
    assert_eq!(apology["sender"], "system");
    assert_eq!(apology["content"], APOLOGY);

    server.shutdown_gracefully(Some(TIMEOUT)).await;
}

#[tokio::test]
async fn e2e_saturated_queue_is_evicted() {
    let (_url, server) = boot_server(ScriptedCompletion::new(vec![]), ServerConfig::default()).await;
    let hub = server.hub().clone();

    let stalled = ConnectionId::from_raw("stalled");
    let mut queue = hub.register(stalled.clone()).await.unwrap();

    for i in 0..256 {
        hub.broadcast(Arc::new(format!("frame {i}"))).await;
    }
    assert!(hub.contains(&stalled).await);

    hub.broadcast(Arc::new("one too many".to_string())).await;
    assert!(!hub.contains(&stalled).await);
    assert!(!hub.unregister(&stalled).await);

    let mut buffered = 0;
    while queue.recv().await.is_some() {
        buffered += 1;
    }
    assert_eq!(buffered, 256);

    server.shutdown_gracefully(Some(TIMEOUT)).await;
}

#[tokio::test]
async fn e2e_malformed_frame_skipped() {
    let completion = ScriptedCompletion::always(MockReply::text("ok"));
    let (url, server) = boot_server(completion, ServerConfig::default()).await;

    let mut ws = connect(&url).await;
    wait_for_connections(&server, 1).await;

    ws.send(Message::text("{this is not json")).await.unwrap();
    ws.send(Message::text(r#"{"type":"message","content":"still here","sender":"user"}"#))
        .await
        .unwrap();

    let first = read_json(&mut ws).await;
    assert_eq!(first["content"], "still here");
    assert_eq!(first["sender"], "user");
    let reply = read_json(&mut ws).await;
    assert_eq!(reply["sender"], "ai");
    assert_eq!(server.hub().connection_count(), 1);

    server.shutdown_gracefully(Some(TIMEOUT)).await;
}

#[tokio::test]
async fn e2e_client_close_unregisters() {
    let (url, server) = boot_server(ScriptedCompletion::new(vec![]), ServerConfig::default()).await;

    let mut ws = connect(&url).await;
    wait_for_connections(&server, 1).await;

    ws.close(None).await.unwrap();
    wait_for_connections(&server, 0).await;

    server.shutdown_gracefully(Some(TIMEOUT)).await;
}

#[tokio::test]
async fn e2e_oversized_frame_disconnects() {
    let config = ServerConfig {
        keepalive: KeepaliveConfig {
            max_message_size: 1024,
            ..KeepaliveConfig::default()
        },
        ..ServerConfig::default()
    };
    let completion = ScriptedCompletion::new(vec![]);
    let (url, server) = boot_server(completion, config).await;

    let mut ws = connect(&url).await;
    wait_for_connections(&server, 1).await;

    let big = format!(r#"{{"content":"{}","sender":"user"}}"#, "x".repeat(4096));
    let _ = ws.send(Message::text(big)).await;

    assert!(closed_by_server(&mut ws).await);
    wait_for_connections(&server, 0).await;

    server.shutdown_gracefully(Some(TIMEOUT)).await;
}

#[tokio::test]
async fn e2e_shutdown_closes_clients() {
    let (url, server) = boot_server(ScriptedCompletion::new(vec![]), ServerConfig::default()).await;

    let mut ws = connect(&url).await;
    wait_for_connections(&server, 1).await;

    server.shutdown_gracefully(Some(TIMEOUT)).await;

    assert!(closed_by_server(&mut ws).await);
    assert_eq!(server.hub().connection_count(), 0);
}

#[tokio::test]
async fn e2e_health_over_http() {
    let (url, server) = boot_server(ScriptedCompletion::new(vec![]), ServerConfig::default()).await;
    let http = url.replace("ws://", "http://").replace("/ws", "/health");

    let body: Value = reqwest::get(&http).await.unwrap().json().await.unwrap();
    assert_eq!(body["status"], "ok");

    server.shutdown_gracefully(Some(TIMEOUT)).await;
}
