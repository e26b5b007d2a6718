// SmartMark Settings Engine
// Loads sync settings from a JSON file in the data directory, layers
// SMARTMARK_* environment overrides on top, and writes a default file on
// first run so there is something to edit.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::types::errors::SettingsError;
use crate::types::settings::{BackendKind, SyncSettings};

/// File name of the settings file inside the data directory.
pub const SETTINGS_FILE_NAME: &str = "smartmark.json";

/// Returns the data directory: `SMARTMARK_DATA_DIR` if set, else the working directory.
pub fn default_data_dir() -> PathBuf {
    match env::var("SMARTMARK_DATA_DIR") {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Trait defining the settings engine interface.
pub trait SettingsEngineTrait {
    fn load(&mut self) -> Result<SyncSettings, SettingsError>;
    fn save(&self) -> Result<(), SettingsError>;
    fn get_settings(&self) -> &SyncSettings;
    fn get_config_path(&self) -> &str;
}

/// Settings engine implementation that persists settings as JSON on disk.
pub struct SettingsEngine {
    config_path: String,
    settings: SyncSettings,
}

impl SettingsEngine {
    /// Creates a new SettingsEngine.
    ///
    /// If `path_override` is `Some`, uses that path for the config file.
    /// Otherwise, uses `smartmark.json` inside [`default_data_dir`].
    pub fn new(path_override: Option<String>) -> Self {
        let config_path = match path_override {
            Some(p) => p,
            None => default_data_dir()
                .join(SETTINGS_FILE_NAME)
                .to_string_lossy()
                .to_string(),
        };

        Self {
            config_path,
            settings: SyncSettings::default(),
        }
    }

    /// Loads the settings file, writing defaults first if it does not exist.
    pub fn load_or_init(&mut self) -> Result<SyncSettings, SettingsError> {
        if Path::new(&self.config_path).exists() {
            return self.load();
        }
        self.settings = SyncSettings::default();
        self.save()?;
        info!("Wrote default settings to {}", self.config_path);
        Ok(self.settings.clone())
    }

    /// Applies `SMARTMARK_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Applies overrides from an arbitrary key lookup.
    ///
    /// Unparseable values are logged and skipped; the file value stays in effect.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(kind) = lookup("SMARTMARK_BACKEND") {
            match kind.trim().to_ascii_lowercase().as_str() {
                "local" => self.settings.backend.kind = BackendKind::Local,
                "rest" => self.settings.backend.kind = BackendKind::Rest,
                other => warn!("Ignoring SMARTMARK_BACKEND={other}: expected local or rest"),
            }
        }
        if let Some(url) = lookup("SMARTMARK_REST_URL") {
            self.settings.backend.rest_url = Some(url);
        }
        if let Some(key) = lookup("SMARTMARK_REST_KEY") {
            self.settings.backend.rest_api_key = Some(key);
        }
        if let Some(token) = lookup("SMARTMARK_REST_TOKEN") {
            self.settings.backend.rest_access_token = Some(token);
        }

        let tuning = &mut self.settings.sync;
        for (name, slot) in [
            ("SMARTMARK_FETCH_TIMEOUT_MS", &mut tuning.fetch_timeout_ms),
            ("SMARTMARK_POLL_INTERVAL_MS", &mut tuning.poll_interval_ms),
            ("SMARTMARK_SEARCH_DEBOUNCE_MS", &mut tuning.search_debounce_ms),
        ] {
            let Some(raw) = lookup(name) else { continue };
            match raw.trim().parse::<u64>() {
                Ok(value) => {
                    debug!("{name} overridden to {value}");
                    *slot = value;
                }
                Err(e) => warn!("Ignoring {name}={raw}: {e}"),
            }
        }
    }
}

impl SettingsEngineTrait for SettingsEngine {
    /// Loads settings from the JSON config file.
    ///
    /// If the file does not exist, returns default settings.
    /// If the file exists but is malformed, returns a serialization error.
    fn load(&mut self) -> Result<SyncSettings, SettingsError> {
        let path = Path::new(&self.config_path);

        if !path.exists() {
            info!("No settings file at {}, using defaults", self.config_path);
            self.settings = SyncSettings::default();
            return Ok(self.settings.clone());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| SettingsError::IoError(format!("Failed to read config file: {}", e)))?;

        let settings: SyncSettings = serde_json::from_str(&content).map_err(|e| {
            SettingsError::SerializationError(format!("Failed to parse config file: {}", e))
        })?;

        self.settings = settings;
        Ok(self.settings.clone())
    }

    /// Saves the current settings to the JSON config file.
    ///
    /// Creates parent directories if they don't exist.
    fn save(&self) -> Result<(), SettingsError> {
        let path = Path::new(&self.config_path);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SettingsError::IoError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let json = serde_json::to_string_pretty(&self.settings).map_err(|e| {
            SettingsError::SerializationError(format!("Failed to serialize settings: {}", e))
        })?;

        fs::write(path, json)
            .map_err(|e| SettingsError::IoError(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    fn get_settings(&self) -> &SyncSettings {
        &self.settings
    }

    fn get_config_path(&self) -> &str {
        &self.config_path
    }
}
