//! RPC method handler for the SmartMark JSON-RPC protocol.
//!
//! Extracted from `rpc_server.rs` so it can be unit-tested independently.
//! `handle_method` dispatches a method name and its params to the `App`.

use serde_json::{json, Value};

use crate::app::App;
use crate::services::settings_engine::SettingsEngineTrait;
use crate::types::bookmark::Bookmark;
use crate::types::settings::SyncSettings;

const REDACTED: &str = "***";

fn str_param<'a>(params: &'a Value, key: &str) -> Result<&'a str, String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("missing {}", key))
}

fn opt_str_param<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

/// Settings as reported to the front end, with credentials masked.
fn redacted(settings: &SyncSettings) -> SyncSettings {
    let mut shown = settings.clone();
    for secret in [&mut shown.backend.rest_api_key, &mut shown.backend.rest_access_token] {
        if secret.is_some() {
            *secret = Some(REDACTED.to_string());
        }
    }
    shown
}

fn bookmarks_json(items: &[Bookmark]) -> Result<Value, String> {
    serde_json::to_value(items).map_err(|e| e.to_string())
}

/// Dispatch a JSON-RPC method call to the appropriate handler.
///
/// Returns `Ok(Value)` on success or `Err(String)` with an error message.
pub async fn handle_method(app: &App, method: &str, params: &Value) -> Result<Value, String> {
    match method {
        "ping" => Ok(json!({"pong": true})),

        // ─── Auth ───
        "auth.sign_up" => {
            let email = str_param(params, "email")?;
            let password = str_param(params, "password")?;
            let user = app.auth.sign_up(email, password).await.map_err(|e| e.to_string())?;
            Ok(json!({"user": user}))
        }
        "auth.sign_in" => {
            let email = str_param(params, "email")?;
            let password = str_param(params, "password")?;
            let user = app.sign_in(email, password).await.map_err(|e| e.to_string())?;
            Ok(json!({"user": user}))
        }
        "auth.sign_out" => {
            app.sign_out();
            Ok(json!({"ok": true}))
        }
        "auth.user" => Ok(json!({"user": app.auth.user()})),

        // ─── Dashboard ───
        "dashboard.open" => {
            let user = app.open_dashboard().await.map_err(|e| e.to_string())?;
            Ok(json!({"user": user, "state": app.controller.state()}))
        }
        "dashboard.close" => {
            app.close_dashboard();
            Ok(json!({"ok": true}))
        }

        // ─── Bookmarks ───
        "bookmarks.list" => {
            let query = match opt_str_param(params, "q") {
                Some(q) => q.to_string(),
                None => app.search.current(),
            };
            let items = app.controller.filtered(&query);
            Ok(json!({"items": bookmarks_json(&items)?, "q": query}))
        }
        "bookmarks.draft" => {
            let draft = app.edit_draft(opt_str_param(params, "title"), opt_str_param(params, "url"));
            Ok(json!({"draft": draft}))
        }
        "bookmarks.add" => {
            app.edit_draft(opt_str_param(params, "title"), opt_str_param(params, "url"));
            let saved = app.submit_draft().await.map_err(|e| e.to_string())?;
            Ok(json!({"bookmark": saved}))
        }
        "bookmarks.remove" => {
            let id = str_param(params, "id")?;
            app.controller.remove(id).await.map_err(|e| e.to_string())?;
            Ok(json!({"ok": true}))
        }
        "bookmarks.refresh" => {
            app.controller.refresh().await.map_err(|e| e.to_string())?;
            Ok(json!({"ok": true}))
        }
        "bookmarks.state" => {
            serde_json::to_value(app.controller.snapshot()).map_err(|e| e.to_string())
        }

        // ─── Search ───
        "search.set" => {
            let query = str_param(params, "q")?;
            app.search.set_query(query);
            Ok(json!({"ok": true}))
        }

        // ─── Settings ───
        "settings.get" => {
            serde_json::to_value(redacted(app.settings.get_settings())).map_err(|e| e.to_string())
        }

        _ => Err(format!("unknown method: {}", method)),
    }
}
