#![deny(unreachable_patterns)]
//! GDAL CLI wrapper for georeferenced raster conversion.
//!
//! This crate provides:
//! - Type-safe GDAL command building with timeout and cancellation
//! - CRS resolution from embedded metadata and sidecar files
//! - Two-tier reprojection (fast warp, then sidecar-driven fallback)
//! - Staged JPEG + world file encoding, whole or in pixel-window tiles
//! - World file parsing and footprint computation

pub mod command;
pub mod convert;
pub mod core;
pub mod error;
pub mod fs_utils;
pub mod info;
pub mod reproject;
pub mod resolver;
pub mod sidecar;
pub mod world_file;

#[cfg(test)]
mod testing;

pub use command::{has_driver, tool_version, GdalCommand, GdalRunner, GdalTool};
pub use convert::{tile_windows, GdalJpegConverter, TileWindow};
pub use core::{Converter, CrsResolver, Reprojector};
pub use error::{RasterError, RasterResult};
pub use info::{probe_raster, RasterInfo};
pub use reproject::{
    AuxiliaryWarp, FastWarp, ReprojectionAttempt, ReprojectionHint, ReprojectionMethod,
    ReprojectionOutcome, ReprojectionStrategy, TwoTierReprojector,
};
pub use resolver::GdalCrsResolver;
pub use sidecar::{read_sidecars, AuxMetadata, GroundControlPoint};
pub use world_file::{inspect_bounds, WorldFile};
