//! Persisted user settings, kept as a flat JSON key/value store.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::difficulty::DifficultyLevel;
use crate::error::EngineError;

const STORE_FILE: &str = "settings.json";
const APP_DIR: &str = "speech-trainer";

pub const DIFFICULTY_KEY: &str = "difficulty";
const MODEL_PATH_KEY: &str = "model_path";
const MODEL_URL_KEY: &str = "model_url";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    pub difficulty: DifficultyLevel,
    pub model_path: Option<String>,
    pub model_url: Option<String>,
}

pub struct SettingsStore {
    path: PathBuf,
    entries: Mutex<Map<String, Value>>,
}

impl SettingsStore {
    /// Opens the store at `path`. A missing or unreadable file yields an empty store.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Map<String, Value>>(&raw) {
                Ok(map) => map,
                Err(e) => {
                    log::warn!("Ignoring corrupt settings store {}: {e}", path.display());
                    Map::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => {
                log::warn!("Failed to load settings store {}: {e}", path.display());
                Map::new()
            }
        };

        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn open_default() -> Self {
        Self::open(default_store_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(key).cloned())
    }

    pub fn set(&self, key: &str, value: Value) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), value);
        }
    }

    pub fn delete(&self, key: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
    }

    pub fn save(&self) -> Result<(), EngineError> {
        let raw = {
            let entries = self
                .entries
                .lock()
                .map_err(|_| EngineError::Settings("settings store is poisoned".to_string()))?;
            serde_json::to_string_pretty(&*entries)
                .map_err(|e| EngineError::Settings(e.to_string()))?
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Settings(format!("create {}: {e}", parent.display()))
            })?;
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, raw)
            .map_err(|e| EngineError::Settings(format!("write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| EngineError::Settings(format!("rename {}: {e}", self.path.display())))?;

        log::debug!("Settings saved to {}", self.path.display());
        Ok(())
    }
}

pub fn default_store_path() -> PathBuf {
    dirs_next::config_dir()
        .or_else(|| std::env::var_os("HOME").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(STORE_FILE)
}

pub fn get_settings(store: &SettingsStore) -> Settings {
    let difficulty = store
        .get(DIFFICULTY_KEY)
        .and_then(|v| v.as_str().map(str::to_string))
        .and_then(|raw| match raw.parse::<DifficultyLevel>() {
            Ok(level) => Some(level),
            Err(e) => {
                log::warn!("Stored difficulty is not usable, falling back to default: {e}");
                None
            }
        })
        .unwrap_or_default();
    let model_path = store
        .get(MODEL_PATH_KEY)
        .and_then(|v| v.as_str().map(str::to_string));
    let model_url = store
        .get(MODEL_URL_KEY)
        .and_then(|v| v.as_str().map(str::to_string));

    Settings {
        difficulty,
        model_path,
        model_url,
    }
}

pub fn save_settings(store: &SettingsStore, settings: &Settings) -> Result<(), EngineError> {
    store.set(
        DIFFICULTY_KEY,
        Value::String(settings.difficulty.as_str().to_string()),
    );

    match &settings.model_path {
        Some(path) => store.set(MODEL_PATH_KEY, serde_json::json!(path)),
        None => store.delete(MODEL_PATH_KEY),
    }
    match &settings.model_url {
        Some(url) => store.set(MODEL_URL_KEY, serde_json::json!(url)),
        None => store.delete(MODEL_URL_KEY),
    }

    store.save()
}

pub fn get_custom_model_path(store: &SettingsStore) -> Option<PathBuf> {
    get_settings(store).model_path.map(PathBuf::from)
}
