//! JPEG + world file encoding with `gdal_translate`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use geojpeg_models::job::WORLD_FILE_EXTENSION;
use geojpeg_models::{jpeg_artifacts, tile_path, EncodeOptions};

use crate::command::{GdalCommand, GdalRunner};
use crate::core::Converter;
use crate::error::{RasterError, RasterResult};
use crate::fs_utils::{move_file, remove_files};
use crate::info::probe_raster;

/// Extensions GDAL may use for the world file it writes next to a JPEG.
const WORLD_FILE_CANDIDATES: [&str; 3] = [WORLD_FILE_EXTENSION, "wld", "jpgw"];

/// Pixel window of one output tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileWindow {
    /// 1-based column
    pub col: u64,
    /// 1-based row
    pub row: u64,
    pub x_off: u64,
    pub y_off: u64,
    pub width: u64,
    pub height: u64,
}

/// Cut a `width` x `height` raster into `tile`-sized windows, row by row.
/// Windows on the right and bottom edges are clipped to the raster.
pub fn tile_windows(width: u64, height: u64, tile: u64) -> Vec<TileWindow> {
    let step = usize::try_from(tile.max(1)).unwrap_or(usize::MAX);
    let mut windows = Vec::new();
    for (row, y_off) in (0..height).step_by(step).enumerate() {
        for (col, x_off) in (0..width).step_by(step).enumerate() {
            windows.push(TileWindow {
                col: col as u64 + 1,
                row: row as u64 + 1,
                x_off,
                y_off,
                width: tile.min(width - x_off),
                height: tile.min(height - y_off),
            });
        }
    }
    windows
}

/// One JPEG to encode: the whole raster, or a window of it.
#[derive(Debug)]
struct Target {
    window: Option<TileWindow>,
    output: PathBuf,
}

/// Encodes rasters with the GDAL JPEG driver.
///
/// Every JPEG of a conversion is written into a staging directory beside
/// the destination. Nothing is moved into place until all of them, each with
/// its world file, exist.
#[derive(Debug, Clone, Default)]
pub struct GdalJpegConverter {
    runner: GdalRunner,
}

impl GdalJpegConverter {
    pub fn new(runner: GdalRunner) -> Self {
        Self { runner }
    }

    /// Build the `gdal_translate` invocation for one JPEG.
    pub fn build_command(
        input: &Path,
        output: &Path,
        options: &EncodeOptions,
        window: Option<&TileWindow>,
    ) -> GdalCommand {
        let cmd = GdalCommand::translate(input, output)
            .output_format("JPEG")
            .creation_option("QUALITY", options.quality)
            .creation_option("WORLDFILE", "YES");

        match window {
            Some(w) => cmd.src_window(w.x_off, w.y_off, w.width, w.height),
            None => cmd,
        }
    }

    async fn plan(&self, input: &Path, output: &Path, options: &EncodeOptions) -> RasterResult<Vec<Target>> {
        let Some(tile) = options.tile_size else {
            return Ok(vec![Target {
                window: None,
                output: output.to_path_buf(),
            }]);
        };

        let info = probe_raster(&self.runner, input).await?;
        let (width, height) = info
            .size
            .filter(|(w, h)| *w > 0 && *h > 0)
            .ok_or_else(|| RasterError::conversion_failed(format!("no raster size for {}", input.display())))?;

        let windows = tile_windows(width, height, u64::from(tile));
        debug!(
            "Tiling {}x{} raster {} into {} tiles of {}px",
            width,
            height,
            input.display(),
            windows.len(),
            tile
        );
        Ok(windows
            .into_iter()
            .map(|w| Target {
                output: tile_path(output, w.col, w.row),
                window: Some(w),
            })
            .collect())
    }

    async fn encode_staged(
        &self,
        input: &Path,
        output: &Path,
        targets: &[Target],
        options: &EncodeOptions,
    ) -> RasterResult<()> {
        let parent = output.parent().unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(parent).await?;

        let staging = tempfile::Builder::new()
            .prefix(".geojpeg-")
            .tempdir_in(parent)?;

        let mut staged = Vec::with_capacity(targets.len());
        for target in targets {
            let file_name = target.output.file_name().ok_or_else(|| {
                RasterError::conversion_failed(format!("invalid output path {}", target.output.display()))
            })?;
            let jpg = staging.path().join(file_name);

            self.runner
                .run(&Self::build_command(input, &jpg, options, target.window.as_ref()))
                .await?;

            if !jpg.is_file() {
                return Err(RasterError::conversion_failed(format!(
                    "encoder produced no image for {}",
                    input.display()
                )));
            }
            let world = find_world_file(&jpg).ok_or_else(|| {
                RasterError::conversion_failed(format!(
                    "encoder produced no world file for {}",
                    input.display()
                ))
            })?;
            staged.push((jpg, world, target.output.as_path()));
        }

        for (jpg, world, dest) in staged {
            move_file(&world, dest.with_extension(WORLD_FILE_EXTENSION)).await?;
            let aux = aux_path(&jpg);
            if aux.is_file() {
                move_file(&aux, aux_path(dest)).await?;
            }
            move_file(&jpg, dest).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl Converter for GdalJpegConverter {
    fn name(&self) -> &'static str {
        "gdal-jpeg"
    }

    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        options: &EncodeOptions,
    ) -> RasterResult<Vec<PathBuf>> {
        debug!(
            "Encoding {} -> {} (quality {})",
            input.display(),
            output.display(),
            options.quality
        );

        let targets = match self.plan(input, output, options).await {
            Ok(targets) => targets,
            Err(e) => {
                remove_files(jpeg_artifacts(output)).await;
                return Err(conversion_error(e));
            }
        };

        if let Err(e) = self.encode_staged(input, output, &targets, options).await {
            let removed = remove_files(
                targets
                    .iter()
                    .flat_map(|t| jpeg_artifacts(&t.output))
                    .collect::<Vec<_>>(),
            )
            .await;
            if removed > 0 {
                warn!("Removed {} partial artifacts of {}", removed, output.display());
            }
            return Err(conversion_error(e));
        }

        info!("Wrote {} JPEG(s) for {}", targets.len(), output.display());
        Ok(targets.into_iter().map(|t| t.output).collect())
    }
}

fn find_world_file(jpg: &Path) -> Option<PathBuf> {
    WORLD_FILE_CANDIDATES
        .iter()
        .map(|ext| jpg.with_extension(ext))
        .find(|p| p.is_file())
}

fn aux_path(jpg: &Path) -> PathBuf {
    let mut s = jpg.as_os_str().to_os_string();
    s.push(".aux.xml");
    PathBuf::from(s)
}

fn conversion_error(err: RasterError) -> RasterError {
    match err {
        RasterError::Cancelled | RasterError::Timeout(_) => err,
        other => RasterError::conversion_failed(describe(&other)),
    }
}

fn describe(err: &RasterError) -> String {
    match err.stderr() {
        Some(stderr) => format!("{}: {}", err, stderr),
        None => err.to_string(),
    }
}
