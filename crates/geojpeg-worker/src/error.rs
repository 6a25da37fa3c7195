//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Scheduling failed: {0}")]
    SchedulingFailed(String),

    #[error("Discovery failed: {0}")]
    DiscoveryFailed(String),

    #[error("Raster error: {0}")]
    Raster(#[from] geojpeg_raster::RasterError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn scheduling_failed(msg: impl Into<String>) -> Self {
        Self::SchedulingFailed(msg.into())
    }

    pub fn discovery_failed(msg: impl Into<String>) -> Self {
        Self::DiscoveryFailed(msg.into())
    }

    /// Fatal errors abort the run before or during dispatch.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WorkerError::ConfigError(_)
                | WorkerError::SchedulingFailed(_)
                | WorkerError::DiscoveryFailed(_)
        )
    }
}
