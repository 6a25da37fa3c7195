//! Conversion metrics.
//!
//! Counters are emitted through the `metrics` facade; without an installed
//! recorder they are no-ops.

use metrics::{counter, histogram};

use geojpeg_models::Outcome;
use geojpeg_raster::ReprojectionAttempt;

/// Metric name constants for consistency.
pub mod names {
    /// Terminal job outcomes by outcome.
    pub const JOBS_TOTAL: &str = "geojpeg_jobs_total";

    /// Reprojection attempts by method and status.
    pub const REPROJECTION_ATTEMPTS_TOTAL: &str = "geojpeg_reprojection_attempts_total";

    /// Job duration in seconds by outcome.
    pub const JOB_DURATION_SECONDS: &str = "geojpeg_job_duration_seconds";
}

/// Record a terminal job outcome.
pub fn record_job(outcome: Outcome, duration_secs: f64) {
    counter!(names::JOBS_TOTAL, "outcome" => outcome.as_str()).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "outcome" => outcome.as_str()).record(duration_secs);
}

/// Record every attempt of one reprojection.
pub fn record_reprojection(attempts: &[ReprojectionAttempt]) {
    for attempt in attempts {
        let status = if attempt.succeeded() { "success" } else { "failure" };
        counter!(
            names::REPROJECTION_ATTEMPTS_TOTAL,
            "method" => attempt.method.as_str(),
            "status" => status
        )
        .increment(1);
    }
}
