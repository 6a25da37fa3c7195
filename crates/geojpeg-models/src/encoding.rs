//! JPEG encoding options.

use serde::{Deserialize, Serialize};

/// Default JPEG quality
pub const DEFAULT_JPEG_QUALITY: u8 = 90;
/// Highest accepted JPEG quality
pub const MAX_JPEG_QUALITY: u8 = 100;
/// Default target CRS for reprojection (WGS 84)
pub const DEFAULT_TARGET_EPSG: u32 = 4326;

/// Options passed to the JPEG encoder for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeOptions {
    /// JPEG quality (0-100)
    #[serde(default = "default_quality")]
    pub quality: u8,

    /// Tile size in pixels; `None` writes an untiled image
    #[serde(default)]
    pub tile_size: Option<u32>,
}

fn default_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            quality: DEFAULT_JPEG_QUALITY,
            tile_size: None,
        }
    }
}

impl EncodeOptions {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.min(MAX_JPEG_QUALITY),
            tile_size: None,
        }
    }

    /// Enable tiling with the given tile size.
    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = (tile_size > 0).then_some(tile_size);
        self
    }
}
