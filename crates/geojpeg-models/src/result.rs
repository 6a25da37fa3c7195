//! Per-job outcomes and run aggregation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::{BoundingBox, ConversionJob, JobId, SpatialReference};

/// Terminal outcome of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    /// JPEG + world file written
    Converted,
    /// Unresolved CRS and implausible footprint; output removed
    DiscardedOutOfRange,
    /// Reprojection or conversion failed; no output left
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Converted => "converted",
            Outcome::DiscardedOutOfRange => "discarded-out-of-range",
            Outcome::Failed => "failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result produced exactly once per dispatched job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionResult {
    pub job: ConversionJob,
    pub outcome: Outcome,
    /// Resolved spatial reference, if resolution ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spatial_reference: Option<SpatialReference>,
    /// Footprint computed for unresolved jobs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    /// Failure or discard reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Stage-by-stage notes, including every reprojection attempt
    #[serde(default)]
    pub diagnostics: Vec<String>,
    /// JPEGs written for a converted job: the output itself, or its tiles
    #[serde(default)]
    pub outputs: Vec<PathBuf>,
    pub finished_at: DateTime<Utc>,
}

impl ConversionResult {
    fn new(job: ConversionJob, outcome: Outcome) -> Self {
        Self {
            job,
            outcome,
            spatial_reference: None,
            bounding_box: None,
            reason: None,
            diagnostics: Vec::new(),
            outputs: Vec::new(),
            finished_at: Utc::now(),
        }
    }

    pub fn converted(job: ConversionJob, spatial_reference: SpatialReference) -> Self {
        Self {
            spatial_reference: Some(spatial_reference),
            ..Self::new(job, Outcome::Converted)
        }
    }

    pub fn discarded(
        job: ConversionJob,
        spatial_reference: SpatialReference,
        bounding_box: BoundingBox,
    ) -> Self {
        Self {
            spatial_reference: Some(spatial_reference),
            bounding_box: Some(bounding_box),
            reason: Some(format!("bounding box {} is out of range", bounding_box)),
            ..Self::new(job, Outcome::DiscardedOutOfRange)
        }
    }

    pub fn failed(job: ConversionJob, reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::new(job, Outcome::Failed)
        }
    }

    pub fn with_spatial_reference(mut self, spatial_reference: SpatialReference) -> Self {
        self.spatial_reference = Some(spatial_reference);
        self
    }

    pub fn with_bounding_box(mut self, bounding_box: BoundingBox) -> Self {
        self.bounding_box = Some(bounding_box);
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Vec<String>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_outputs(mut self, outputs: Vec<PathBuf>) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn job_id(&self) -> &JobId {
        &self.job.id
    }
}

/// A failed job, kept for diagnostics after the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub job_id: JobId,
    pub input: PathBuf,
    pub reason: String,
}

/// Order-independent aggregate of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub converted: usize,
    pub discarded: usize,
    pub failed: usize,
    /// Jobs never dispatched because the run was cancelled
    pub not_dispatched: usize,
    /// Failures sorted by input path
    pub failures: Vec<JobFailure>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one result.
    pub fn record(&mut self, result: &ConversionResult) {
        match result.outcome {
            Outcome::Converted => self.converted += 1,
            Outcome::DiscardedOutOfRange => self.discarded += 1,
            Outcome::Failed => {
                self.failed += 1;
                let failure = JobFailure {
                    job_id: result.job.id.clone(),
                    input: result.job.input.clone(),
                    reason: result.reason.clone().unwrap_or_default(),
                };
                let pos = self
                    .failures
                    .partition_point(|f| (&f.input, &f.job_id.0) <= (&failure.input, &failure.job_id.0));
                self.failures.insert(pos, failure);
            }
        }
    }

    /// Number of results recorded.
    pub fn total(&self) -> usize {
        self.converted + self.discarded + self.failed
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        match outcome {
            Outcome::Converted => self.converted,
            Outcome::DiscardedOutOfRange => self.discarded,
            Outcome::Failed => self.failed,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "converted={} discarded={} failed={}",
            self.converted, self.discarded, self.failed
        )?;
        if self.not_dispatched > 0 {
            write!(f, " not_dispatched={}", self.not_dispatched)?;
        }
        Ok(())
    }
}
