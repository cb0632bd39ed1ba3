use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{ModelStoreError, MAX_RETRIES, RETRY_BACKOFF_SECS};

/// Share of the progress bar spent downloading; unpacking fills the rest.
const DOWNLOAD_SHARE: u8 = 90;

pub(crate) fn download_and_unpack(
    url: &str,
    cache_root: &Path,
    target: &Path,
    progress: &dyn Fn(u8),
) -> Result<(), ModelStoreError> {
    fs::create_dir_all(cache_root)?;
    progress(0);

    let archive = match url.strip_prefix("file://") {
        Some(local) => PathBuf::from(local),
        None => {
            let tmp = sibling(target, "zip.download");
            download_asset(url, &tmp, progress)?;
            tmp
        }
    };
    progress(DOWNLOAD_SHARE);

    let result = unpack_archive(&archive, target, progress);

    if archive.extension().is_some_and(|ext| ext == "download") {
        let _ = fs::remove_file(&archive);
    }

    match result {
        Ok(()) => {
            progress(100);
            log::info!("Model unpacked to {}", target.display());
            Ok(())
        }
        Err(err) => {
            log::error!("Model unpack failed: {err}");
            Err(err)
        }
    }
}

fn download_asset(url: &str, dest: &Path, progress: &dyn Fn(u8)) -> Result<(), ModelStoreError> {
    let mut last_err: Option<ModelStoreError> = None;

    for attempt in 1..=MAX_RETRIES {
        if dest.exists() {
            let _ = fs::remove_file(dest);
        }

        log::info!("Downloading model archive from {url} (attempt {attempt}/{MAX_RETRIES})...");

        match try_download_once(url, dest, progress) {
            Ok(()) => return Ok(()),
            Err(err) => {
                log::warn!("Download attempt {attempt} failed: {err}");
                last_err = Some(err);

                if attempt < MAX_RETRIES {
                    std::thread::sleep(Duration::from_secs(RETRY_BACKOFF_SECS * attempt as u64));
                } else if dest.exists() {
                    let _ = fs::remove_file(dest);
                }
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| ModelStoreError::Download(format!("{url}: failed to download"))))
}

fn try_download_once(url: &str, dest: &Path, progress: &dyn Fn(u8)) -> Result<(), ModelStoreError> {
    let response = reqwest::blocking::get(url)
        .map_err(|e| ModelStoreError::Download(format!("{url}: {e}")))?;
    let status = response.status();
    if !status.is_success() {
        return Err(ModelStoreError::Download(format!(
            "{url}: unexpected status {status}"
        )));
    }

    let total_size = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;
    let mut last_reported = 0u8;

    let mut file = fs::File::create(dest)?;
    let mut reader = response;
    let mut buffer = [0; 65536];

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .map_err(|e| ModelStoreError::Download(format!("{url}: read failed: {e}")))?;

        if bytes_read == 0 {
            break;
        }

        file.write_all(&buffer[..bytes_read])
            .map_err(|e| ModelStoreError::Download(format!("{url}: write failed: {e}")))?;

        downloaded += bytes_read as u64;
        let pct = download_percent(downloaded, total_size);
        if pct != last_reported {
            last_reported = pct;
            progress(pct);
        }
    }

    if total_size > 0 && downloaded != total_size {
        return Err(ModelStoreError::Download(format!(
            "Incomplete download: expected {total_size} bytes, got {downloaded}"
        )));
    }

    Ok(())
}

pub(crate) fn download_percent(downloaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let ratio = (downloaded as f64 / total as f64).min(1.0);
    (ratio * DOWNLOAD_SHARE as f64) as u8
}

/// Unpacks `archive` so that the model files end up directly under `target`.
///
/// Archives that wrap everything in a single top-level folder are flattened.
pub(crate) fn unpack_archive(
    archive: &Path,
    target: &Path,
    progress: &dyn Fn(u8),
) -> Result<(), ModelStoreError> {
    let file = fs::File::open(archive)?;
    let mut zip =
        zip::ZipArchive::new(file).map_err(|e| ModelStoreError::Archive(e.to_string()))?;

    let staging = sibling(target, "unpack");
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    let count = zip.len().max(1);
    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| ModelStoreError::Archive(e.to_string()))?;
        let Some(name) = entry.enclosed_name() else {
            log::warn!("Skipping archive entry outside the model folder: {}", entry.name());
            continue;
        };

        let dest = staging.join(name);
        if entry.is_dir() {
            fs::create_dir_all(&dest)?;
        } else {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = fs::File::create(&dest)?;
            std::io::copy(&mut entry, &mut out)?;
        }

        let unpacked = ((i + 1) * (100 - DOWNLOAD_SHARE as usize)) / count;
        progress(DOWNLOAD_SHARE + unpacked as u8);
    }

    let root = single_child_dir(&staging)?.unwrap_or_else(|| staging.clone());
    if target.exists() {
        fs::remove_dir_all(target)?;
    }
    fs::rename(&root, target)?;
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }

    Ok(())
}

/// `<target>.<suffix>` next to `target`, even when its name already contains dots.
fn sibling(target: &Path, suffix: &str) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".to_string());
    target.with_file_name(format!("{name}.{suffix}"))
}

fn single_child_dir(dir: &Path) -> Result<Option<PathBuf>, ModelStoreError> {
    let mut entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    if entries.len() != 1 {
        return Ok(None);
    }
    let entry = entries.remove(0);
    Ok(entry.file_type()?.is_dir().then(|| entry.path()))
}
