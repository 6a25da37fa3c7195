//! Shared data models for the GeoJPEG batch converter.
//!
//! This crate provides Serde-serializable types for:
//! - Conversion jobs and input formats
//! - Spatial references and their resolution source
//! - Geographic bounding boxes and the plausibility policy
//! - Per-job results and the run summary

pub mod bbox;
pub mod encoding;
pub mod job;
pub mod policy;
pub mod result;
pub mod spatial;

// Re-export common types
pub use bbox::{BoundingBox, BoundingBoxParseError};
pub use encoding::{EncodeOptions, DEFAULT_JPEG_QUALITY, DEFAULT_TARGET_EPSG};
pub use job::{jpeg_artifacts, tile_path, ConversionJob, InputFormat, JobId};
pub use policy::{validate, ValidationPolicy};
pub use result::{ConversionResult, JobFailure, Outcome, RunSummary};
pub use spatial::{is_usable_epsg, ResolutionSource, SpatialReference};
