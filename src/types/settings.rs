use serde::{Deserialize, Serialize};

/// Top-level SmartMark settings container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncSettings {
    pub backend: BackendSettings,
    pub sync: SyncTuning,
    pub log_filter: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            backend: BackendSettings::default(),
            sync: SyncTuning::default(),
            log_filter: "smartmark=info".to_string(),
        }
    }
}

/// Which bookmark backend the app talks to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// SQLite file plus in-process change feed.
    Local,
    /// PostgREST-compatible HTTP endpoint plus polling change feed.
    Rest,
}

/// Backend location and credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendSettings {
    pub kind: BackendKind,
    /// SQLite file name, relative to the data directory. Also holds local accounts.
    pub database_file: String,
    pub rest_url: Option<String>,
    pub rest_api_key: Option<String>,
    /// User access token sent as the bearer credential instead of the API key.
    pub rest_access_token: Option<String>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            kind: BackendKind::Local,
            database_file: "smartmark.db".to_string(),
            rest_url: None,
            rest_api_key: None,
            rest_access_token: None,
        }
    }
}

/// Timing knobs for sync and search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncTuning {
    pub fetch_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub search_debounce_ms: u64,
}

impl Default for SyncTuning {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: 10_000,
            poll_interval_ms: 5_000,
            search_debounce_ms: 200,
        }
    }
}
