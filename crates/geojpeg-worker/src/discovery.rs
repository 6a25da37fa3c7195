//! Input discovery: walks batch directories and plans one job per raster.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use geojpeg_models::{ConversionJob, InputFormat};

use crate::config::BatchDirs;
use crate::error::{WorkerError, WorkerResult};

/// Plans output paths and keeps them unique across a whole run.
#[derive(Debug, Default)]
pub struct OutputPlanner {
    claimed: HashSet<PathBuf>,
}

impl OutputPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim an output path for `input`, renaming `<stem>-2`, `<stem>-3`, ...
    /// when an earlier input already claimed the natural name.
    pub fn claim(&mut self, input: &Path, output_dir: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "output".to_string());

        let mut candidate = output_dir.join(format!("{}.jpg", stem));
        let mut suffix = 2;
        while !self.claimed.insert(claim_key(&candidate)) {
            candidate = output_dir.join(format!("{}-{}.jpg", stem, suffix));
            suffix += 1;
        }
        if suffix > 2 {
            warn!(
                "Output name collision for {}; writing {}",
                input.display(),
                candidate.display()
            );
        }
        candidate
    }
}

// Case-insensitive file systems treat `A.jpg` and `a.jpg` as the same file.
fn claim_key(path: &Path) -> PathBuf {
    PathBuf::from(path.to_string_lossy().to_lowercase())
}

/// Discover every input of one batch, in sorted traversal order.
pub fn discover_batch(batch: &BatchDirs, planner: &mut OutputPlanner) -> WorkerResult<Vec<ConversionJob>> {
    if !batch.input_dir.is_dir() {
        return Err(WorkerError::discovery_failed(format!(
            "input directory does not exist: {}",
            batch.input_dir.display()
        )));
    }

    let mut jobs = Vec::new();
    let walker = WalkDir::new(&batch.input_dir)
        .follow_links(true)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", batch.input_dir.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if InputFormat::from_path(path) != Some(batch.format) {
            continue;
        }

        let relative_dir = path
            .parent()
            .and_then(|p| p.strip_prefix(&batch.input_dir).ok())
            .unwrap_or_else(|| Path::new(""));
        let output_dir = batch.output_dir.join(relative_dir);
        let output = planner.claim(path, &output_dir);

        debug!("Planned {} -> {}", path.display(), output.display());
        jobs.push(ConversionJob::new(path, batch.format, output));
    }

    info!(
        "Discovered {} {} inputs in {}",
        jobs.len(),
        batch.format.as_str(),
        batch.input_dir.display()
    );
    Ok(jobs)
}

/// Discover every batch, sharing one output planner.
pub fn discover_all(batches: &[BatchDirs]) -> WorkerResult<Vec<ConversionJob>> {
    let mut planner = OutputPlanner::new();
    let mut jobs = Vec::new();
    for batch in batches {
        jobs.extend(discover_batch(batch, &mut planner)?);
    }
    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"raster").unwrap();
    }

    #[test]
    fn test_discovers_matching_formats_recursively() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in");
        touch(&input.join("a.tif"));
        touch(&input.join("sub").join("b.TIFF"));
        touch(&input.join("c.sid"));
        touch(&input.join("a.aux.xml"));

        let batch = BatchDirs::new(InputFormat::Tiff, &input, dir.path().join("out"));
        let jobs = discover_all(&[batch]).unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].output, dir.path().join("out").join("a.jpg"));
        assert_eq!(jobs[1].output, dir.path().join("out").join("sub").join("b.jpg"));
        assert_eq!(jobs[1].world_file, dir.path().join("out").join("sub").join("b.jgw"));
        assert!(jobs.iter().all(|j| j.format == InputFormat::Tiff));
    }

    #[test]
    fn test_collisions_are_renamed_deterministically() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in");
        touch(&input.join("scene.tif"));
        touch(&input.join("scene.tiff"));

        let batch = BatchDirs::new(InputFormat::Tiff, &input, dir.path().join("out"));
        let first: Vec<_> = discover_all(&[batch.clone()])
            .unwrap()
            .into_iter()
            .map(|j| j.output)
            .collect();
        let second: Vec<_> = discover_all(&[batch])
            .unwrap()
            .into_iter()
            .map(|j| j.output)
            .collect();

        assert_eq!(first, second);
        assert_eq!(
            first,
            vec![
                dir.path().join("out").join("scene.jpg"),
                dir.path().join("out").join("scene-2.jpg"),
            ]
        );
    }

    #[test]
    fn test_planner_ignores_case() {
        let mut planner = OutputPlanner::new();
        let out = Path::new("/out");
        assert_eq!(planner.claim(Path::new("/in/Tile.tif"), out), out.join("Tile.jpg"));
        assert_eq!(planner.claim(Path::new("/in/x/tile.tif"), out), out.join("tile-2.jpg"));
        assert_eq!(planner.claim(Path::new("/in/y/tile.tif"), out), out.join("tile-3.jpg"));
    }

    #[test]
    fn test_collisions_across_batches() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("sid").join("tile.sid"));
        touch(&dir.path().join("tif").join("tile.tif"));
        let out = dir.path().join("out");

        let jobs = discover_all(&[
            BatchDirs::new(InputFormat::Sid, dir.path().join("sid"), &out),
            BatchDirs::new(InputFormat::Tiff, dir.path().join("tif"), &out),
        ])
        .unwrap();

        assert_eq!(jobs[0].output, out.join("tile.jpg"));
        assert_eq!(jobs[1].output, out.join("tile-2.jpg"));
    }

    #[test]
    fn test_missing_input_dir() {
        let batch = BatchDirs::new(InputFormat::Sid, "/definitely/not/here", "/tmp/out");
        assert!(matches!(
            discover_all(&[batch]),
            Err(WorkerError::DiscoveryFailed(_))
        ));
    }
}
