//! Structured job logging.
//!
//! Every lifecycle event carries the job ID, the input path and the
//! current stage as tracing fields.

use tracing::{error, info, warn, Span};

use geojpeg_models::ConversionJob;

/// Job logger for structured logging with consistent formatting.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    input: String,
}

impl JobLogger {
    /// Create a logger for a job.
    pub fn new(job: &ConversionJob) -> Self {
        Self {
            job_id: job.id.to_string(),
            input: job.input.display().to_string(),
        }
    }

    /// Log entry into a pipeline stage.
    pub fn log_stage(&self, stage: &str, message: &str) {
        info!(
            job_id = %self.job_id,
            input = %self.input,
            stage = stage,
            "{}", message
        );
    }

    /// Log a warning during job execution.
    pub fn log_warning(&self, stage: &str, message: &str) {
        warn!(
            job_id = %self.job_id,
            input = %self.input,
            stage = stage,
            "Job warning: {}", message
        );
    }

    /// Log a terminal failure.
    pub fn log_error(&self, stage: &str, message: &str) {
        error!(
            job_id = %self.job_id,
            input = %self.input,
            stage = stage,
            "Job failed: {}", message
        );
    }

    /// Log the terminal outcome.
    pub fn log_completion(&self, outcome: &str) {
        info!(
            job_id = %self.job_id,
            input = %self.input,
            outcome = outcome,
            "Job finished: {}", outcome
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    /// Create a tracing span for this job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            input = %self.input
        )
    }
}
