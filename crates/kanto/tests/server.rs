//! Serving over a real socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use kanto::core::{BoxFuture, ContainerState};
use kanto::prelude::*;
use kanto::server::ServerError;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;

struct Pool {
    events: Arc<Mutex<Vec<&'static str>>>,
    fail_start: bool,
}

impl Lifecycle for Pool {
    fn start(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            if self.fail_start {
                anyhow::bail!("database unreachable");
            }
            self.events.lock().push("start");
            Ok(())
        })
    }

    fn stop(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.events.lock().push("stop");
            Ok(())
        })
    }
}

fn local_config() -> ServerConfig {
    ServerConfig::builder()
        .host("127.0.0.1")
        .shutdown_timeout(Duration::from_secs(2))
        .max_body_bytes(64)
        .build()
}

fn app_with_pool(events: &Arc<Mutex<Vec<&'static str>>>, fail_start: bool) -> App {
    let events = Arc::clone(events);
    let container = ContainerBuilder::new()
        .register_service("pool", move |_| {
            Ok(Pool {
                events: Arc::clone(&events),
                fail_start,
            })
        })
        .unwrap()
        .build();

    let mut app = App::new()
        .with_container(container)
        .with_config(local_config());
    app.routes(
        Router::new("/cards")
            .get("/:id", |ctx: Context| async move {
                let id = ctx.params().get("id").unwrap_or_default().to_string();
                ctx.json(&serde_json::json!({ "id": id }))
            })
            .post("/", |ctx: Context| async move {
                Ok(ctx.text(format!("{} bytes", ctx.body().len())))
            }),
    )
    .unwrap();
    app
}

async fn roundtrip(addr: SocketAddr, raw_request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw_request.as_bytes()).await.unwrap();
    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();
    raw
}

#[tokio::test]
async fn test_listen_serves_until_shutdown() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let app = app_with_pool(&events, false);
    let container = Arc::clone(app.container().unwrap());
    let shutdown = app.shutdown_handle();

    let (ready_tx, ready_rx) = oneshot::channel();
    let server = tokio::spawn(app.listen(0, move |addr| {
        let _ = ready_tx.send(addr);
    }));
    let addr = ready_rx.await.unwrap();
    assert_eq!(container.state(), ContainerState::Started);

    let raw = roundtrip(
        addr,
        "GET /cards/abc HTTP/1.1\r\nhost: localhost\r\nconnection: close\r\n\r\n",
    )
    .await;
    assert!(raw.starts_with("HTTP/1.1 200 OK"), "{raw}");
    assert!(raw.contains(r#"{"id":"abc"}"#), "{raw}");
    assert!(raw.to_ascii_lowercase().contains("x-request-id:"), "{raw}");

    assert!(shutdown.trigger());
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server should stop")
        .unwrap()
        .unwrap();

    assert_eq!(container.state(), ContainerState::Stopped);
    assert_eq!(*events.lock(), ["start", "stop"]);
}

#[tokio::test]
async fn test_body_over_limit_is_rejected() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let app = app_with_pool(&events, false);
    let shutdown = app.shutdown_handle();

    let (ready_tx, ready_rx) = oneshot::channel();
    let server = tokio::spawn(app.listen(0, move |addr| {
        let _ = ready_tx.send(addr);
    }));
    let addr = ready_rx.await.unwrap();

    let small = roundtrip(
        addr,
        "POST /cards HTTP/1.1\r\nhost: localhost\r\ncontent-length: 5\r\nconnection: close\r\n\r\nhello",
    )
    .await;
    assert!(small.starts_with("HTTP/1.1 200 OK"), "{small}");
    assert!(small.ends_with("5 bytes"), "{small}");

    let body = "x".repeat(100);
    let large = roundtrip(
        addr,
        &format!(
            "POST /cards HTTP/1.1\r\nhost: localhost\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        ),
    )
    .await;
    assert!(large.starts_with("HTTP/1.1 413"), "{large}");
    assert!(large.contains("PAYLOAD_TOO_LARGE"), "{large}");

    shutdown.trigger();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_start_failure_aborts_listen() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let app = app_with_pool(&events, true);

    let mut called = false;
    let result = app.listen(0, |_| called = true).await;

    assert!(matches!(result, Err(ServerError::Container(_))));
    assert!(!called);
    assert!(events.lock().is_empty());
}

#[tokio::test]
async fn test_bind_failure_stops_services() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = taken.local_addr().unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    let app = app_with_pool(&events, false);
    let result = app.listen_on(addr, |_| {}).await;

    assert!(matches!(result, Err(ServerError::Bind { .. })));
    assert_eq!(*events.lock(), ["start", "stop"]);
}
