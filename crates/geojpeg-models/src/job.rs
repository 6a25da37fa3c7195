//! Conversion job definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// World file extension written next to a JPEG.
pub const WORLD_FILE_EXTENSION: &str = "jgw";

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raster format of a job's input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputFormat {
    /// MrSID (`.sid`)
    Sid,
    /// GeoTIFF (`.tif` / `.tiff`)
    Tiff,
}

impl InputFormat {
    /// Detect the format from a file extension (case-insensitive).
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "sid" => Some(Self::Sid),
            "tif" | "tiff" => Some(Self::Tiff),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InputFormat::Sid => "sid",
            InputFormat::Tiff => "tiff",
        }
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One input raster to convert into a JPEG + world file pair.
///
/// Jobs are created once during discovery and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionJob {
    /// Unique job ID
    pub id: JobId,
    /// Input raster path
    pub input: PathBuf,
    /// Detected input format
    pub format: InputFormat,
    /// Output JPEG path
    pub output: PathBuf,
    /// Output world file path
    pub world_file: PathBuf,
}

impl ConversionJob {
    /// Create a job; the world file path is derived from the output path.
    pub fn new(input: impl Into<PathBuf>, format: InputFormat, output: impl Into<PathBuf>) -> Self {
        let output = output.into();
        Self {
            id: JobId::new(),
            input: input.into(),
            format,
            world_file: output.with_extension(WORLD_FILE_EXTENSION),
            output,
        }
    }

    /// Input file name without extension, used for logs and quarantine.
    pub fn stem(&self) -> String {
        self.input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Every file the job may leave next to its output.
    pub fn artifacts(&self) -> Vec<PathBuf> {
        jpeg_artifacts(&self.output)
    }
}

/// A JPEG, its world file and the `.aux.xml` GDAL may write beside it.
pub fn jpeg_artifacts(jpg: &Path) -> Vec<PathBuf> {
    let mut aux = jpg.as_os_str().to_os_string();
    aux.push(".aux.xml");
    vec![
        jpg.to_path_buf(),
        jpg.with_extension(WORLD_FILE_EXTENSION),
        PathBuf::from(aux),
    ]
}

/// Path of tile (`col`, `row`), 1-based, written instead of `output`:
/// `scene.jpg` becomes `scene_<col>_<row>.jpg`.
pub fn tile_path(output: &Path, col: u64, row: u64) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    output.with_file_name(format!("{}_{}_{}.jpg", stem, col, row))
}
