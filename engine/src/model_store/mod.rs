mod download;
mod paths;

use std::path::PathBuf;

use thiserror::Error;

use crate::error::EngineError;
use crate::settings::Settings;

pub use paths::{default_cache_root, is_model_dir, model_dir_name, resolve_model_dir};

pub const DEFAULT_MODEL_URL: &str =
    "https://alphacephei.com/vosk/models/vosk-model-small-ru-0.22.zip";

pub(crate) const MODEL_ROOT_ENV: &str = "SPEECH_TRAINER_MODEL_ROOT";

const MAX_RETRIES: usize = 3;
const RETRY_BACKOFF_SECS: u64 = 2;

/// Where the recognition model comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// An already unpacked model directory.
    Directory(PathBuf),
    /// A zip archive, unpacked once under `cache_root`.
    Archive { url: String, cache_root: PathBuf },
}

impl ModelSource {
    pub fn default_archive() -> Self {
        Self::Archive {
            url: DEFAULT_MODEL_URL.to_string(),
            cache_root: default_cache_root(),
        }
    }

    /// A configured model folder wins; otherwise the (configured or default) archive.
    pub fn from_settings(settings: &Settings) -> Self {
        if let Some(path) = settings.model_path.as_deref().filter(|p| !p.trim().is_empty()) {
            return Self::Directory(PathBuf::from(path));
        }
        Self::Archive {
            url: settings
                .model_url
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL_URL.to_string()),
            cache_root: default_cache_root(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ModelStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Model download failed: {0}")]
    Download(String),
    #[error("Model archive is invalid: {0}")]
    Archive(String),
    #[error("Model directory not found or empty: {0}")]
    NotFound(String),
}

impl ModelStoreError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Download(_) => {
                "Could not download the speech model. Check your internet connection and try again."
            }
            Self::Archive(_) => "The downloaded speech model is corrupted. Please try again.",
            Self::NotFound(_) => {
                "Speech model files are missing. Check the model folder in your settings."
            }
            Self::Io(_) => {
                "The app could not read or write its local files. Check disk space and permissions."
            }
        }
    }
}

impl From<ModelStoreError> for EngineError {
    fn from(err: ModelStoreError) -> Self {
        EngineError::LoadFailure(err.to_string())
    }
}
