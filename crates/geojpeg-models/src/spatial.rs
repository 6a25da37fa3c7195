//! Spatial reference resolution state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// EPSG code of the GRS 1980 ellipsoid. Metadata readers sometimes surface it
/// instead of the CRS code; it cannot be used to georeference imagery.
pub const ELLIPSOID_GRS80_EPSG: u32 = 7019;

/// Where a spatial reference was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionSource {
    /// Embedded georeferencing metadata of the image itself
    PrimaryMetadata,
    /// Sidecar auxiliary metadata (`.aux.xml`, `.prj`)
    AuxiliaryFile,
    /// No CRS could be determined
    #[default]
    Unresolved,
}

impl ResolutionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionSource::PrimaryMetadata => "primary-metadata",
            ResolutionSource::AuxiliaryFile => "auxiliary-file",
            ResolutionSource::Unresolved => "unresolved",
        }
    }
}

impl fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The CRS of an input image, if one could be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SpatialReference {
    /// EPSG code
    pub epsg: Option<u32>,
    /// Resolution source
    pub source: ResolutionSource,
}

impl SpatialReference {
    /// A reference resolved from the given source.
    pub fn resolved(epsg: u32, source: ResolutionSource) -> Self {
        Self {
            epsg: Some(epsg),
            source,
        }
    }

    /// The unresolved terminal state.
    pub fn unresolved() -> Self {
        Self::default()
    }

    pub fn is_resolved(&self) -> bool {
        self.epsg.is_some() && self.source != ResolutionSource::Unresolved
    }
}

impl fmt::Display for SpatialReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.epsg {
            Some(code) => write!(f, "EPSG:{} ({})", code, self.source),
            None => write!(f, "{}", self.source),
        }
    }
}

/// Check that an EPSG code can describe image georeferencing.
pub fn is_usable_epsg(code: u32) -> bool {
    code != 0 && code != ELLIPSOID_GRS80_EPSG
}
