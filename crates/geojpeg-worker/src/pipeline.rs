//! Per-job conversion pipeline.
//!
//! A job moves through `Pending -> Resolving -> (Reprojecting)? -> Converting
//! -> (Validating)? -> terminal`. Every path through [`run_job`] yields exactly
//! one [`ConversionResult`], and every non-converted result leaves no output
//! artifact behind.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tempfile::TempDir;
use tokio::sync::watch;
use tracing::Instrument;

use geojpeg_models::job::WORLD_FILE_EXTENSION;
use geojpeg_models::{
    jpeg_artifacts, validate, BoundingBox, ConversionJob, ConversionResult, InputFormat, Outcome,
    SpatialReference,
};
use geojpeg_raster::fs_utils::remove_files;
use geojpeg_raster::{
    inspect_bounds, Converter, CrsResolver, GdalCrsResolver, GdalJpegConverter, RasterError,
    RasterResult, ReprojectionHint, ReprojectionOutcome, Reprojector, TwoTierReprojector,
};

use crate::config::ConversionConfig;
use crate::logging::JobLogger;
use crate::metrics;
use crate::quarantine::Quarantine;

/// Pipeline stage, used in logs and failure reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Pending,
    Resolving,
    Reprojecting,
    Converting,
    Validating,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Pending => "pending",
            JobStage::Resolving => "resolving",
            JobStage::Reprojecting => "reprojecting",
            JobStage::Converting => "converting",
            JobStage::Validating => "validating",
        }
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything a worker needs to run jobs; shared read-only by all workers.
pub struct PipelineContext {
    pub config: Arc<ConversionConfig>,
    pub resolver: Arc<dyn CrsResolver>,
    pub reprojector: Arc<dyn Reprojector>,
    pub converter: Arc<dyn Converter>,
    pub quarantine: Quarantine,
}

impl PipelineContext {
    pub fn new(
        config: ConversionConfig,
        resolver: Arc<dyn CrsResolver>,
        reprojector: Arc<dyn Reprojector>,
        converter: Arc<dyn Converter>,
    ) -> Self {
        let quarantine = Quarantine::new(config.failed_dir.clone(), config.error_log_dir.clone());
        Self {
            config: Arc::new(config),
            resolver,
            reprojector,
            converter,
            quarantine,
        }
    }

    /// Context backed by the GDAL command-line tools.
    ///
    /// `cancel_rx` kills running GDAL processes once it turns `true`.
    pub fn gdal(config: ConversionConfig, cancel_rx: watch::Receiver<bool>) -> Self {
        let runner = config.gdal_runner().with_cancel(cancel_rx);

        Self::new(
            config,
            Arc::new(GdalCrsResolver::new(runner.clone())),
            Arc::new(TwoTierReprojector::gdal(runner.clone())),
            Arc::new(GdalJpegConverter::new(runner)),
        )
    }
}

/// Whether an input must be normalized to the target CRS before encoding.
///
/// GeoTIFF inputs are always normalized; MrSID inputs only when they resolved
/// to a different CRS.
pub fn needs_reprojection(format: InputFormat, sr: &SpatialReference, target_epsg: u32) -> bool {
    match format {
        InputFormat::Tiff => true,
        InputFormat::Sid => sr.epsg.is_some_and(|code| code != target_epsg),
    }
}

/// Non-converted terminal state reached inside the pipeline.
struct Stop {
    stage: JobStage,
    result: ConversionResult,
    /// JPEGs the converter wrote before the job was stopped
    written: Vec<PathBuf>,
}

/// Run one job end-to-end.
pub async fn run_job(ctx: &PipelineContext, job: ConversionJob) -> ConversionResult {
    let logger = JobLogger::new(&job);
    let started = Instant::now();

    let (result, written) = async {
        logger.log_stage(JobStage::Pending.as_str(), "Job started");
        match process(ctx, job, &logger).await {
            Ok(result) => (result, Vec::new()),
            Err(stopped) => {
                if stopped.result.outcome == Outcome::Failed {
                    let reason = stopped.result.reason.clone().unwrap_or_default();
                    logger.log_error(stopped.stage.as_str(), &reason);
                }
                (stopped.result, stopped.written)
            }
        }
    }
    .instrument(logger.create_span())
    .await;

    if result.outcome != Outcome::Converted {
        remove_files(result.job.artifacts()).await;
        remove_files(
            written
                .iter()
                .flat_map(|jpg| jpeg_artifacts(jpg))
                .collect::<Vec<_>>(),
        )
        .await;
    }
    if result.outcome == Outcome::Failed {
        ctx.quarantine
            .record_failure(&result.job, result.reason.as_deref().unwrap_or_default())
            .await;
    }

    metrics::record_job(result.outcome, started.elapsed().as_secs_f64());
    logger.log_completion(result.outcome.as_str());
    result
}

async fn process(
    ctx: &PipelineContext,
    job: ConversionJob,
    logger: &JobLogger,
) -> Result<ConversionResult, Stop> {
    let config = &ctx.config;
    let mut diagnostics = Vec::new();

    logger.log_stage(JobStage::Resolving.as_str(), ctx.resolver.name());
    let sr = ctx.resolver.resolve(&job.input).await;
    diagnostics.push(format!("resolved: {}", sr));

    // Keeps intermediates alive until encoding is done.
    let mut work_dir = None;
    let mut source: PathBuf = job.input.clone();

    if needs_reprojection(job.format, &sr, config.target_epsg) {
        logger.log_stage(JobStage::Reprojecting.as_str(), &format!("target EPSG:{}", config.target_epsg));

        let dir = match job_work_dir(&job, &config.work_dir).await {
            Ok(dir) => dir,
            Err(e) => {
                let reason = format!("could not create work directory: {}", e);
                return Err(stop(JobStage::Reprojecting, job, sr, diagnostics, reason));
            }
        };

        let hint = ReprojectionHint::new(sr.epsg, config.target_epsg);
        let outcome = ctx.reprojector.reproject(&job.input, &hint, dir.path()).await;
        metrics::record_reprojection(outcome.attempts());
        diagnostics.extend(outcome.attempts().iter().map(ToString::to_string));

        match outcome {
            ReprojectionOutcome::Normalized { path, .. } => source = path,
            exhausted @ ReprojectionOutcome::Exhausted { .. } => {
                let reason = match exhausted.into_result() {
                    Err(e) => e.to_string(),
                    Ok(_) => "reprojection produced no output".to_string(),
                };
                return Err(stop(JobStage::Reprojecting, job, sr, diagnostics, reason));
            }
        }
        work_dir = Some(dir);
    }

    logger.log_stage(JobStage::Converting.as_str(), ctx.converter.name());
    let options = config.encode_options(job.format);
    let converted = ctx.converter.convert(&source, &job.output, &options).await;
    let outputs = match converted {
        Ok(outputs) => outputs,
        Err(e) => return Err(stop(JobStage::Converting, job, sr, diagnostics, e.to_string())),
    };
    drop(work_dir);
    if outputs.len() > 1 {
        diagnostics.push(format!("converted: {} tiles", outputs.len()));
    }

    if sr.is_resolved() {
        return Ok(ConversionResult::converted(job, sr)
            .with_diagnostics(diagnostics)
            .with_outputs(outputs));
    }

    if !config.policy.enforce {
        diagnostics.push("validation: bounding-box check disabled".to_string());
        return Ok(ConversionResult::converted(job, sr)
            .with_diagnostics(diagnostics)
            .with_outputs(outputs));
    }

    logger.log_stage(JobStage::Validating.as_str(), "CRS unresolved, checking footprint");
    let bbox = match footprint(&outputs).await {
        Ok(bbox) => bbox,
        Err(e) => {
            let reason = format!("could not compute bounding box: {}", e);
            let mut stopped = stop(JobStage::Validating, job, sr, diagnostics, reason);
            stopped.written = outputs;
            return Err(stopped);
        }
    };

    if validate(&bbox, &config.policy) {
        diagnostics.push(format!("validation: {} accepted", bbox));
        Ok(ConversionResult::converted(job, sr)
            .with_bounding_box(bbox)
            .with_diagnostics(diagnostics)
            .with_outputs(outputs))
    } else {
        diagnostics.push(format!("validation: {} rejected", bbox));
        logger.log_warning(JobStage::Validating.as_str(), &format!("bounding box {} is out of range", bbox));
        Err(Stop {
            stage: JobStage::Validating,
            result: ConversionResult::discarded(job, sr, bbox).with_diagnostics(diagnostics),
            written: outputs,
        })
    }
}

/// Footprint of everything written: one image, or the union of its tiles.
async fn footprint(outputs: &[PathBuf]) -> RasterResult<BoundingBox> {
    let mut union: Option<BoundingBox> = None;
    for jpg in outputs {
        let bbox = inspect_bounds(jpg, &jpg.with_extension(WORLD_FILE_EXTENSION)).await?;
        union = Some(union.map_or(bbox, |u| u.union(&bbox)));
    }
    union.ok_or_else(|| RasterError::conversion_failed("converter reported no output"))
}

/// Per-job scratch directory under `work_dir`, creating `work_dir` if needed.
async fn job_work_dir(job: &ConversionJob, work_dir: &Path) -> std::io::Result<TempDir> {
    tokio::fs::create_dir_all(work_dir).await?;
    tempfile::Builder::new()
        .prefix(&format!("{}-", job.stem()))
        .tempdir_in(work_dir)
}

fn stop(
    stage: JobStage,
    job: ConversionJob,
    sr: SpatialReference,
    diagnostics: Vec<String>,
    reason: String,
) -> Stop {
    Stop {
        stage,
        result: ConversionResult::failed(job, format!("{}: {}", stage, reason))
            .with_spatial_reference(sr)
            .with_diagnostics(diagnostics),
        written: Vec::new(),
    }
}
