use std::fs;
use std::path::{Path, PathBuf};

use super::{download, ModelSource, ModelStoreError, MODEL_ROOT_ENV};

pub fn default_cache_root() -> PathBuf {
    if let Some(root) = std::env::var_os(MODEL_ROOT_ENV) {
        return PathBuf::from(root);
    }

    dirs_next::cache_dir()
        .or_else(|| std::env::var_os("HOME").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("speech-trainer")
        .join("models")
}

/// Directory name an archive unpacks into, derived from the URL's file stem.
pub fn model_dir_name(url: &str) -> String {
    let file = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or("model");

    file.strip_suffix(".zip").unwrap_or(file).to_string()
}

pub fn is_model_dir(path: &Path) -> bool {
    path.is_dir()
        && fs::read_dir(path)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false)
}

/// Returns a ready model directory, downloading and unpacking it when needed.
pub fn resolve_model_dir(
    source: &ModelSource,
    progress: &dyn Fn(u8),
) -> Result<PathBuf, ModelStoreError> {
    match source {
        ModelSource::Directory(path) => {
            log::debug!("resolve_model_dir: using directory {}", path.display());
            if is_model_dir(path) {
                progress(100);
                Ok(path.clone())
            } else {
                Err(ModelStoreError::NotFound(path.display().to_string()))
            }
        }
        ModelSource::Archive { url, cache_root } => {
            let target = cache_root.join(model_dir_name(url));
            if is_model_dir(&target) {
                log::info!("Using cached model at {}", target.display());
                progress(100);
                return Ok(target);
            }

            log::info!(
                "No local model under {}; downloading from {}",
                target.display(),
                url
            );
            download::download_and_unpack(url, cache_root, &target, progress)?;
            Ok(target)
        }
    }
}
