//! Error types for raster operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for raster operations.
pub type RasterResult<T> = Result<T, RasterError>;

/// Errors that can occur while probing, reprojecting or encoding rasters.
#[derive(Debug, Error)]
pub enum RasterError {
    #[error("{0} not found in PATH")]
    ToolNotFound(&'static str),

    #[error("{tool} failed: {message}")]
    CommandFailed {
        tool: &'static str,
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Reprojection failed: {0}")]
    ReprojectionFailed(String),

    #[error("Conversion failed: {0}")]
    ConversionFailed(String),

    #[error("No usable georeferencing: {0}")]
    MissingGeoreference(String),

    #[error("Invalid world file {path}: {message}")]
    InvalidWorldFile { path: PathBuf, message: String },

    #[error("Auxiliary metadata error: {0}")]
    AuxMetadata(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl RasterError {
    /// Create a command failure error.
    pub fn command_failed(
        tool: &'static str,
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::CommandFailed {
            tool,
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create a conversion failure error.
    pub fn conversion_failed(message: impl Into<String>) -> Self {
        Self::ConversionFailed(message.into())
    }

    /// Create a reprojection failure error.
    pub fn reprojection_failed(message: impl Into<String>) -> Self {
        Self::ReprojectionFailed(message.into())
    }

    /// Create a missing georeference error.
    pub fn missing_georeference(message: impl Into<String>) -> Self {
        Self::MissingGeoreference(message.into())
    }

    /// Stderr captured from a failed external tool, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            RasterError::CommandFailed { stderr, .. } => stderr.as_deref(),
            _ => None,
        }
    }
}
