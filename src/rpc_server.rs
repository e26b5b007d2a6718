//! SmartMark RPC Server: JSON-RPC over stdin/stdout.
//!
//! Protocol: one JSON object per line (newline-delimited JSON).
//! Request:  {"id":1, "method":"bookmarks.add", "params":{"url":"...","title":"..."}}
//! Response: {"id":1, "result":{...}} or {"id":1, "error":"..."}
//! Events:   {"event":"bookmarks.changed","revision":7}, {"event":"search.settled","q":"..."}

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use smartmark::app::App;
use smartmark::rpc_handler::handle_method;
use smartmark::services::settings_engine::{default_data_dir, SettingsEngine, SettingsEngineTrait};

/// Simple rate limiter: max requests per second.
struct RateLimiter {
    window_start: Instant,
    request_count: u32,
    max_per_second: u32,
}

impl RateLimiter {
    fn new(max_per_second: u32) -> Self {
        Self { window_start: Instant::now(), request_count: 0, max_per_second }
    }

    /// Returns true if the request is allowed, false if rate-limited.
    fn check(&mut self) -> bool {
        if self.window_start.elapsed().as_secs() >= 1 {
            self.window_start = Instant::now();
            self.request_count = 0;
        }
        self.request_count += 1;
        self.request_count <= self.max_per_second
    }
}

#[tokio::main]
async fn main() {
    let data_dir = default_data_dir();
    let mut settings = SettingsEngine::new(Some(
        data_dir
            .join(smartmark::services::settings_engine::SETTINGS_FILE_NAME)
            .to_string_lossy()
            .to_string(),
    ));
    let settings_error = settings.load_or_init().err();
    settings.apply_env_overrides();

    // stdout carries the protocol, so logs go to stderr
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.get_settings().log_filter));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    if let Some(e) = settings_error {
        warn!("{}, using defaults", e);
    }

    let app = match App::open(&data_dir, settings) {
        Ok(app) => Arc::new(app),
        Err(e) => {
            error!("Failed to initialize SmartMark: {}", e);
            std::process::exit(1);
        }
    };

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Value>();

    // Single writer keeps lines from interleaving
    let writer = tokio::spawn(async move {
        let mut stdout = io::stdout();
        while let Some(message) = out_rx.recv().await {
            let line = format!("{}\n", message);
            if stdout.write_all(line.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
                break;
            }
        }
    });

    let _ = out_tx.send(json!({"event": "ready", "version": env!("CARGO_PKG_VERSION")}));
    info!("Ready, data dir {}", data_dir.display());

    let mut revisions = app.controller.subscribe();
    let events = out_tx.clone();
    let revision_events = tokio::spawn(async move {
        while revisions.changed().await.is_ok() {
            let revision = *revisions.borrow_and_update();
            if events.send(json!({"event": "bookmarks.changed", "revision": revision})).is_err() {
                break;
            }
        }
    });

    let mut settled = app.search.subscribe();
    let events = out_tx.clone();
    let search_events = tokio::spawn(async move {
        while settled.changed().await.is_ok() {
            let q = settled.borrow_and_update().clone();
            if events.send(json!({"event": "search.settled", "q": q})).is_err() {
                break;
            }
        }
    });

    let mut rate_limiter = RateLimiter::new(200);
    let mut lines = BufReader::new(io::stdin()).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(l)) => l,
            Ok(None) => break,
            Err(e) => {
                warn!("stdin read failed: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                let _ = out_tx.send(json!({"id": null, "error": format!("parse error: {}", e)}));
                continue;
            }
        };

        let id = req.get("id").cloned().unwrap_or(Value::Null);

        if !rate_limiter.check() {
            let _ = out_tx.send(json!({"id": id, "error": "rate limit exceeded"}));
            continue;
        }

        let method = req.get("method").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let params = req.get("params").cloned().unwrap_or(json!({}));

        // Requests run concurrently; responses are matched by id.
        let app = Arc::clone(&app);
        let responses = out_tx.clone();
        tokio::spawn(async move {
            let response = match handle_method(&app, &method, &params).await {
                Ok(val) => json!({"id": id, "result": val}),
                Err(err) => json!({"id": id, "error": err}),
            };
            let _ = responses.send(response);
        });
    }

    info!("stdin closed, shutting down");
    app.close_dashboard();
    revision_events.abort();
    search_events.abort();
    drop(out_tx);
    // In-flight requests still hold senders; give them a moment to answer.
    let _ = tokio::time::timeout(Duration::from_secs(2), writer).await;
}
