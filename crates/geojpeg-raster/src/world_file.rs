//! ESRI world files (`.jgw`) and footprint computation.

use std::fmt;
use std::path::Path;

use geojpeg_models::BoundingBox;

use crate::error::{RasterError, RasterResult};

/// Affine pixel-to-map transform stored in a world file.
///
/// Line order on disk is A, D, B, E, C, F; (C, F) is the centre of the
/// upper-left pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldFile {
    /// Pixel width in map units
    pub a: f64,
    /// Row rotation
    pub d: f64,
    /// Column rotation
    pub b: f64,
    /// Pixel height in map units (negative for north-up images)
    pub e: f64,
    /// X of the upper-left pixel centre
    pub c: f64,
    /// Y of the upper-left pixel centre
    pub f: f64,
}

impl WorldFile {
    /// Parse world file text.
    pub fn parse(path: &Path, text: &str) -> RasterResult<Self> {
        let values: Vec<f64> = text
            .split_whitespace()
            .map(|token| {
                token.parse::<f64>().map_err(|_| RasterError::InvalidWorldFile {
                    path: path.to_path_buf(),
                    message: format!("'{}' is not a number", token),
                })
            })
            .collect::<RasterResult<_>>()?;

        match values.as_slice() {
            [a, d, b, e, c, f] => Ok(Self {
                a: *a,
                d: *d,
                b: *b,
                e: *e,
                c: *c,
                f: *f,
            }),
            other => Err(RasterError::InvalidWorldFile {
                path: path.to_path_buf(),
                message: format!("expected 6 values, found {}", other.len()),
            }),
        }
    }

    /// Read and parse a world file.
    pub async fn read(path: &Path) -> RasterResult<Self> {
        if !path.exists() {
            return Err(RasterError::FileNotFound(path.to_path_buf()));
        }
        let text = tokio::fs::read_to_string(path).await?;
        Self::parse(path, &text)
    }

    /// Map coordinate of a pixel-edge position.
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        let col = col - 0.5;
        let row = row - 0.5;
        (
            self.c + self.a * col + self.b * row,
            self.f + self.d * col + self.e * row,
        )
    }

    /// Footprint of a `width` x `height` image.
    pub fn footprint(&self, width: u32, height: u32) -> BoundingBox {
        let (w, h) = (f64::from(width), f64::from(height));
        let corners = [(0.0, 0.0), (w, 0.0), (0.0, h), (w, h)].map(|(col, row)| self.apply(col, row));
        // from_corners only returns None for an empty iterator
        BoundingBox::from_corners(corners).unwrap_or(BoundingBox::new(
            self.c, self.f, self.c, self.f,
        ))
    }
}

impl fmt::Display for WorldFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.a)?;
        writeln!(f, "{}", self.d)?;
        writeln!(f, "{}", self.b)?;
        writeln!(f, "{}", self.e)?;
        writeln!(f, "{}", self.c)?;
        writeln!(f, "{}", self.f)
    }
}

/// Footprint of a converted JPEG from its world file and pixel dimensions.
pub async fn inspect_bounds(image: &Path, world_file: &Path) -> RasterResult<BoundingBox> {
    let transform = WorldFile::read(world_file).await?;
    let (width, height) = image::image_dimensions(image)?;
    Ok(transform.footprint(width, height))
}
