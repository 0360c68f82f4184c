//! Download detection.
//!
//! Watches a job's output directory until a new file settles (same size
//! across two consecutive polls), then fingerprints it by streaming the
//! content through SHA-256.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use glob::Pattern;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tokio::time::{Instant, sleep};

use crate::engine::job::DownloadResult;
use crate::error::DetectError;

/// Suffixes browsers append to files still being written.
const IN_PROGRESS_SUFFIXES: &[&str] = &[".crdownload", ".part", ".tmp"];

const HASH_BLOCK_SIZE: usize = 1024 * 1024;

/// Poll `dir` until a candidate file's size is identical across two
/// consecutive polls, then return its path, size, and fingerprint.
///
/// "No file yet" is not an error; only exhausting the full window with
/// nothing stable reports a timeout.
pub async fn wait_for_download(
    dir: &Path,
    name_glob: Option<&str>,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<DownloadResult, DetectError> {
    let pattern = name_glob
        .map(Pattern::new)
        .transpose()
        .map_err(|err| DetectError::Pattern {
            pattern: name_glob.unwrap_or_default().to_string(),
            reason: err.to_string(),
        })?;

    let deadline = Instant::now() + timeout;
    let mut last_seen: Option<(PathBuf, u64)> = None;

    loop {
        if let Some((path, size)) = newest_candidate(dir, pattern.as_ref(), None).await? {
            match &last_seen {
                Some((seen_path, seen_size)) if *seen_path == path && *seen_size == size => {
                    return fingerprint(&path).await;
                }
                _ => last_seen = Some((path, size)),
            }
        }

        if Instant::now() + poll_interval >= deadline {
            return Err(DetectError::Timeout { timeout });
        }
        sleep(poll_interval).await;
    }
}

/// Best-effort single pass: fingerprint the newest completed file modified
/// at or after `since`, if any. Used when a flow succeeds without an
/// explicit download step.
pub async fn latest_file(
    dir: &Path,
    since: DateTime<Utc>,
) -> Result<Option<DownloadResult>, DetectError> {
    match newest_candidate(dir, None, Some(SystemTime::from(since))).await? {
        Some((path, _)) => Ok(Some(fingerprint(&path).await?)),
        None => Ok(None),
    }
}

/// Most recently modified completed file in `dir`, with its size.
async fn newest_candidate(
    dir: &Path,
    pattern: Option<&Pattern>,
    modified_after: Option<SystemTime>,
) -> Result<Option<(PathBuf, u64)>, DetectError> {
    let mut entries = fs::read_dir(dir).await?;
    let mut newest: Option<(PathBuf, u64, SystemTime)> = None;

    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        if IN_PROGRESS_SUFFIXES
            .iter()
            .any(|suffix| name.ends_with(suffix))
        {
            continue;
        }
        if let Some(pattern) = pattern {
            if !pattern.matches(&name) {
                continue;
            }
        }

        let modified = metadata.modified()?;
        if let Some(threshold) = modified_after {
            if modified < threshold {
                continue;
            }
        }

        let newer = match &newest {
            Some((_, _, seen)) => modified > *seen,
            None => true,
        };
        if newer {
            newest = Some((entry.path(), metadata.len(), modified));
        }
    }

    Ok(newest.map(|(path, size, _)| (path, size)))
}

/// Stream the file through SHA-256 in fixed-size blocks.
async fn fingerprint(path: &Path) -> Result<DownloadResult, DetectError> {
    let mut file = fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut block = vec![0u8; HASH_BLOCK_SIZE];
    let mut size: u64 = 0;

    loop {
        let read = file.read(&mut block).await?;
        if read == 0 {
            break;
        }
        hasher.update(&block[..read]);
        size += read as u64;
    }

    Ok(DownloadResult {
        file_path: path.to_path_buf(),
        file_size: size,
        sha256: format!("{:x}", hasher.finalize()),
    })
}
