//! Unit tests for the REST backend as wired by `App`.
//!
//! A bare TCP listener stands in for the hosted endpoint so the tests can
//! see the raw request and control whether, and when, it is answered.

use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use smartmark::app::App;
use smartmark::database::Database;
use smartmark::services::settings_engine::SettingsEngine;
use smartmark::types::errors::SyncError;
use smartmark::types::sync::ConnectionState;

/// Builds an App whose REST backend points at `addr`.
fn rest_app(addr: &str, token: Option<&str>, timeout_ms: u64) -> (App, TempDir) {
    let tmp = TempDir::new().expect("Failed to create temp dir");
    let path = tmp.path().join("smartmark.json").to_string_lossy().to_string();
    let mut settings = SettingsEngine::new(Some(path));
    let url = format!("http://{}", addr);
    let timeout = timeout_ms.to_string();
    settings.apply_overrides(|key| match key {
        "SMARTMARK_BACKEND" => Some("rest".to_string()),
        "SMARTMARK_REST_URL" => Some(url.clone()),
        "SMARTMARK_REST_KEY" => Some("anon".to_string()),
        "SMARTMARK_REST_TOKEN" => token.map(str::to_string),
        "SMARTMARK_FETCH_TIMEOUT_MS" => Some(timeout.clone()),
        "SMARTMARK_POLL_INTERVAL_MS" => Some("60000".to_string()),
        _ => None,
    });
    let db = Database::open_in_memory().expect("Failed to open database");
    let app = App::with_database(db, settings).expect("Failed to init App");
    (app, tmp)
}

/// Reads one request head from `socket`, lowercased.
async fn read_head(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    String::from_utf8_lossy(&buf).to_lowercase()
}

#[tokio::test]
async fn test_rest_backend_sends_configured_access_token() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let (head_tx, head_rx) = oneshot::channel();
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let head = read_head(&mut socket).await;
        socket
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 2\r\n\r\n[]")
            .await
            .unwrap();
        head_tx.send(head).unwrap();
    });

    let (app, _tmp) = rest_app(&addr, Some("user-jwt"), 5_000);
    let rows = app.store.query("u1").await.unwrap();
    let head = head_rx.await.unwrap();

    assert!(rows.is_empty());
    assert!(head.starts_with("get /rest/v1/bookmarks?"));
    assert!(head.contains("apikey: anon"));
    assert!(head.contains("authorization: bearer user-jwt"));
    server.abort();
}

#[tokio::test]
async fn test_rest_backend_without_token_uses_api_key() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let (head_tx, head_rx) = oneshot::channel();
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let head = read_head(&mut socket).await;
        socket
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 2\r\n\r\n[]")
            .await
            .unwrap();
        head_tx.send(head).unwrap();
    });

    let (app, _tmp) = rest_app(&addr, None, 5_000);
    app.store.query("u1").await.unwrap();

    assert!(head_rx.await.unwrap().contains("authorization: bearer anon"));
    server.abort();
}

#[tokio::test]
async fn test_unresponsive_backend_fails_initialize_instead_of_hanging() {
    // Accepts connections and never answers any of them.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let server = tokio::spawn(async move {
        let mut open = Vec::new();
        loop {
            let (socket, _) = listener.accept().await.unwrap();
            open.push(socket);
        }
    });

    let (app, _tmp) = rest_app(&addr, None, 200);
    let result = tokio::time::timeout(Duration::from_secs(5), app.controller.initialize("u1"))
        .await
        .expect("initialize hung on an unresponsive backend");

    assert!(matches!(result, Err(SyncError::FetchFailed(_))));
    assert_eq!(app.controller.state(), ConnectionState::Error);
    assert_eq!(app.feed.active_subscriptions(), 1);
    server.abort();
}
