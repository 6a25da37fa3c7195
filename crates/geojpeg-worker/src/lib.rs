//! Batch GeoJPEG conversion worker.
//!
//! This crate provides:
//! - Environment-driven run configuration
//! - Input discovery with collision-free output planning
//! - The per-job resolve / reproject / convert / validate pipeline
//! - A bounded worker-pool scheduler with graceful shutdown
//! - Failure quarantine and structured job logging

pub mod config;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod quarantine;
pub mod scheduler;

#[cfg(test)]
mod testing;

pub use config::{BatchDirs, ConversionConfig};
pub use discovery::{discover_all, discover_batch, OutputPlanner};
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use pipeline::{needs_reprojection, run_job, JobStage, PipelineContext};
pub use quarantine::Quarantine;
pub use scheduler::Scheduler;
