//! Bounded worker-pool scheduler.

use std::sync::Arc;

use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{error, info, warn};

use geojpeg_models::{ConversionJob, ConversionResult, RunSummary};
use geojpeg_raster::fs_utils::remove_files;

use crate::config::MAX_WORKERS;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::pipeline::{run_job, PipelineContext};

/// Runs jobs on a fixed-size pool and aggregates their results.
pub struct Scheduler {
    ctx: Arc<PipelineContext>,
    job_semaphore: Arc<Semaphore>,
    workers: usize,
    shutdown: watch::Sender<bool>,
}

impl Scheduler {
    /// Create a scheduler sized from the context's configuration.
    pub fn new(ctx: PipelineContext) -> Self {
        let workers = ctx.config.workers.clamp(1, MAX_WORKERS);
        let (shutdown, _) = watch::channel(false);
        Self {
            ctx: Arc::new(ctx),
            job_semaphore: Arc::new(Semaphore::new(workers)),
            workers,
            shutdown,
        }
    }

    /// Stop dispatching new jobs. In-flight jobs run to completion.
    pub fn shutdown(&self) {
        // Stored even before `run` subscribes.
        self.shutdown.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Run every job and return the aggregated summary.
    ///
    /// Each dispatched job yields exactly one result, even if its worker
    /// panics. Jobs left undispatched by a shutdown are counted separately.
    pub async fn run(&self, jobs: Vec<ConversionJob>) -> WorkerResult<RunSummary> {
        tokio::fs::create_dir_all(&self.ctx.config.work_dir)
            .await
            .map_err(|e| {
                WorkerError::scheduling_failed(format!(
                    "cannot create work directory {}: {}",
                    self.ctx.config.work_dir.display(),
                    e
                ))
            })?;

        let total = jobs.len();
        info!("Scheduling {} jobs on {} workers", total, self.workers);

        // Single writer: only the collector touches the summary.
        let (result_tx, mut result_rx) = mpsc::channel::<ConversionResult>(self.workers.saturating_mul(2));
        let collector = tokio::spawn(async move {
            let mut summary = RunSummary::new();
            while let Some(result) = result_rx.recv().await {
                summary.record(&result);
            }
            summary
        });

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut dispatched = 0usize;
        let mut handles = Vec::with_capacity(total);

        for job in jobs {
            if *shutdown_rx.borrow() {
                break;
            }

            let permit = tokio::select! {
                permit = self.job_semaphore.clone().acquire_owned() => permit
                    .map_err(|_| WorkerError::scheduling_failed("worker pool closed"))?,
                _ = wait_for_shutdown(&mut shutdown_rx) => break,
            };

            dispatched += 1;
            let ctx = Arc::clone(&self.ctx);
            let result_tx = result_tx.clone();

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let result = Self::execute_job(ctx, job).await;
                if result_tx.send(result).await.is_err() {
                    error!("Result collector stopped before all jobs reported");
                }
            }));
        }
        drop(result_tx);

        if dispatched < total {
            warn!(
                "Shutdown requested; {} of {} jobs were not dispatched",
                total - dispatched,
                total
            );
        }

        info!("Waiting for {} in-flight jobs to complete...", handles.len());
        futures::future::join_all(handles).await;

        let mut summary = collector
            .await
            .map_err(|e| WorkerError::scheduling_failed(format!("result collector failed: {}", e)))?;
        summary.not_dispatched = total - dispatched;

        info!("Run finished: {}", summary);
        Ok(summary)
    }

    /// Run one job on its own task so a panic becomes a failed result.
    async fn execute_job(ctx: Arc<PipelineContext>, job: ConversionJob) -> ConversionResult {
        let fallback = job.clone();
        match tokio::spawn(async move { run_job(&ctx, job).await }).await {
            Ok(result) => result,
            Err(e) => {
                error!("Worker for {} crashed: {}", fallback.input.display(), e);
                remove_files(fallback.artifacts()).await;
                let result = ConversionResult::failed(fallback, format!("worker crashed: {}", e));
                metrics::record_job(result.outcome, 0.0);
                result
            }
        }
    }
}

async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
