//! Capability interfaces for the external tools.
//!
//! The pipeline only talks to these traits; the GDAL implementations live
//! in `resolver`, `reproject` and `convert`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use geojpeg_models::{EncodeOptions, SpatialReference};

use crate::error::RasterResult;
use crate::reproject::{ReprojectionHint, ReprojectionOutcome};

/// Determines the CRS of an input image.
#[async_trait]
pub trait CrsResolver: Send + Sync {
    /// Name for logging.
    fn name(&self) -> &'static str;

    /// Resolve the spatial reference. An unresolved reference is a valid
    /// answer, not an error.
    async fn resolve(&self, input: &Path) -> SpatialReference;
}

/// Normalizes an input into the target CRS.
#[async_trait]
pub trait Reprojector: Send + Sync {
    /// Reproject `input`, writing intermediates under `work_dir`.
    async fn reproject(
        &self,
        input: &Path,
        hint: &ReprojectionHint,
        work_dir: &Path,
    ) -> ReprojectionOutcome;
}

/// Encodes a raster into JPEG + world file pairs.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Name for logging.
    fn name(&self) -> &'static str;

    /// Write `output` and its world file, or with `options.tile_size` set,
    /// one pair per tile named by [`geojpeg_models::tile_path`].
    ///
    /// Returns every JPEG written. On failure nothing is left at `output`,
    /// at any tile path, or next to them.
    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        options: &EncodeOptions,
    ) -> RasterResult<Vec<PathBuf>>;
}
