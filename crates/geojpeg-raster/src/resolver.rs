//! CRS resolution with sidecar fallback.

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, warn};

use geojpeg_models::{ResolutionSource, SpatialReference};

use crate::command::GdalRunner;
use crate::core::CrsResolver;
use crate::info::probe_raster;
use crate::sidecar::read_sidecars;

/// Resolves the CRS from `gdalinfo`, then from `.aux.xml` / `.prj` sidecars.
#[derive(Debug, Clone, Default)]
pub struct GdalCrsResolver {
    runner: GdalRunner,
}

impl GdalCrsResolver {
    pub fn new(runner: GdalRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl CrsResolver for GdalCrsResolver {
    fn name(&self) -> &'static str {
        "gdal"
    }

    async fn resolve(&self, input: &Path) -> SpatialReference {
        let primary = match probe_raster(&self.runner, input).await {
            Ok(info) => info.resolve_epsg(),
            Err(e) => {
                warn!("gdalinfo could not read {}: {}", input.display(), e);
                None
            }
        };

        resolve_from(primary, input).await
    }
}

/// Combine a primary-metadata answer with the sidecar fallback.
pub async fn resolve_from(primary: Option<u32>, input: &Path) -> SpatialReference {
    if let Some(code) = primary {
        return SpatialReference::resolved(code, ResolutionSource::PrimaryMetadata);
    }

    for meta in read_sidecars(input).await {
        if let Some(code) = meta.epsg {
            debug!("EPSG:{} for {} from {}", code, input.display(), meta.path.display());
            return SpatialReference::resolved(code, ResolutionSource::AuxiliaryFile);
        }
    }

    debug!("No CRS found for {}", input.display());
    SpatialReference::unresolved()
}
