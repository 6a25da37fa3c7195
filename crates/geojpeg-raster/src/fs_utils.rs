//! Filesystem utilities for publishing and cleaning up job artifacts.

use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{RasterError, RasterResult};

/// Move `src` to `dst`, creating the destination directory.
///
/// Staging lives next to the output, so a rename usually suffices. When the
/// work dir sits on another filesystem the file is copied into a `.partial`
/// sibling and renamed, so `dst` never holds a truncated artifact.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> RasterResult<()> {
    let (src, dst) = (src.as_ref(), dst.as_ref());

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    let err = match fs::rename(src, dst).await {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };
    if err.raw_os_error() != Some(EXDEV) {
        return Err(err.into());
    }

    tracing::debug!("{} is on another device, copying to {}", src.display(), dst.display());
    let partial = partial_path(dst);
    if let Err(e) = copy_into_place(src, &partial, dst).await {
        let _ = fs::remove_file(&partial).await;
        return Err(e);
    }
    if let Err(e) = fs::remove_file(src).await {
        tracing::warn!("Left staged file {} behind: {}", src.display(), e);
    }
    Ok(())
}

/// `errno` for a rename across filesystems on Linux and macOS.
const EXDEV: i32 = 18;

fn partial_path(dst: &Path) -> PathBuf {
    let mut name = dst.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}

async fn copy_into_place(src: &Path, partial: &Path, dst: &Path) -> RasterResult<()> {
    fs::copy(src, partial).await?;
    fs::rename(partial, dst).await.map_err(RasterError::from)
}

/// Remove files that may or may not exist. Returns how many were deleted.
pub async fn remove_files<I, P>(paths: I) -> usize
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut removed = 0;
    for path in paths {
        let path = path.as_ref();
        match fs::remove_file(path).await {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
    removed
}
