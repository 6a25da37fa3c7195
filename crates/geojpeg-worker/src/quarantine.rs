//! Failure quarantine: copies failed inputs aside and keeps per-input error logs.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use geojpeg_models::ConversionJob;

use crate::error::WorkerResult;

/// Where failed jobs leave their traces. Both destinations are optional.
#[derive(Debug, Clone, Default)]
pub struct Quarantine {
    failed_dir: Option<PathBuf>,
    error_log_dir: Option<PathBuf>,
}

impl Quarantine {
    pub fn new(failed_dir: Option<PathBuf>, error_log_dir: Option<PathBuf>) -> Self {
        Self {
            failed_dir,
            error_log_dir,
        }
    }

    /// Best-effort record of a failure; problems are logged, never raised.
    pub async fn record_failure(&self, job: &ConversionJob, reason: &str) {
        if let Some(dir) = &self.failed_dir {
            match copy_with_siblings(&job.input, dir).await {
                Ok(copied) => info!("Copied {} files of {} to {}", copied, job.input.display(), dir.display()),
                Err(e) => warn!("Could not quarantine {}: {}", job.input.display(), e),
            }
        }
        if let Some(dir) = &self.error_log_dir {
            if let Err(e) = append_error_log(dir, job, reason).await {
                warn!("Could not write error log for {}: {}", job.input.display(), e);
            }
        }
    }
}

/// Copy `input` and every sibling sharing its base name (sidecars) into `dest`.
pub async fn copy_with_siblings(input: &Path, dest: &Path) -> WorkerResult<usize> {
    tokio::fs::create_dir_all(dest).await?;

    let Some(parent) = input.parent() else {
        return Ok(0);
    };
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let prefix = format!("{}.", stem);

    let mut copied = 0;
    let mut entries = tokio::fs::read_dir(parent).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !name.starts_with(&prefix) || !entry.file_type().await?.is_file() {
            continue;
        }
        tokio::fs::copy(entry.path(), dest.join(name.as_ref())).await?;
        copied += 1;
    }
    Ok(copied)
}

/// Append a timestamped failure line to `<dir>/<stem>.log`.
pub async fn append_error_log(dir: &Path, job: &ConversionJob, reason: &str) -> WorkerResult<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{}.log", job.stem()));

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await?;
    let line = format!(
        "{} job={} input={} error={}\n",
        Utc::now().to_rfc3339(),
        job.id,
        job.input.display(),
        reason
    );
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    Ok(path)
}
