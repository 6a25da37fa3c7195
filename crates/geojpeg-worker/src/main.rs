//! GeoJPEG batch conversion binary.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use geojpeg_models::{InputFormat, RunSummary};
use geojpeg_raster::{has_driver, GdalTool};
use geojpeg_worker::{
    discover_all, ConversionConfig, PipelineContext, Scheduler, WorkerError, WorkerResult,
};

/// Exit code when the run completed but at least one job failed.
const EXIT_JOB_FAILURES: i32 = 2;

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting geojpeg-worker");

    let code = match run().await {
        Ok(summary) if summary.has_failures() => EXIT_JOB_FAILURES,
        Ok(_) => 0,
        Err(e) => {
            error!("{}", e);
            1
        }
    };

    info!("geojpeg-worker finished with exit code {}", code);
    std::process::exit(code);
}

fn init_tracing() {
    // Pretty output for terminals, JSON for log shipping
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    if let Ok(directive) = "geojpeg=info".parse::<Directive>() {
        env_filter = env_filter.add_directive(directive);
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn run() -> WorkerResult<RunSummary> {
    let config = ConversionConfig::from_env()?;
    info!("Conversion config: {:?}", config);

    check_prerequisites(&config).await?;

    let jobs = discover_all(&config.batches)?;
    if jobs.is_empty() {
        warn!("No input rasters found");
    }

    // First Ctrl-C stops dispatch; a second one kills running GDAL processes.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let scheduler = Arc::new(Scheduler::new(PipelineContext::gdal(config, cancel_rx)));

    let signal_scheduler = Arc::clone(&scheduler);
    let signal_handle = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Received shutdown signal, finishing in-flight jobs (Ctrl-C again to abort them)");
        signal_scheduler.shutdown();

        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received second shutdown signal, cancelling running GDAL processes");
            let _ = cancel_tx.send(true);
        }
    });

    let result = scheduler.run(jobs).await;
    signal_handle.abort();
    let summary = result?;

    for failure in &summary.failures {
        warn!(
            job_id = %failure.job_id,
            input = %failure.input.display(),
            "Failed: {}", failure.reason
        );
    }
    println!("{}", summary);

    Ok(summary)
}

async fn check_prerequisites(config: &ConversionConfig) -> WorkerResult<()> {
    let runner = config.gdal_runner();
    for tool in GdalTool::ALL {
        runner
            .locate(tool)
            .map_err(|e| WorkerError::scheduling_failed(e.to_string()))?;
    }

    if config.batches.iter().any(|b| b.format == InputFormat::Sid) {
        let available = has_driver(&runner, "MrSID").await?;
        if !available {
            return Err(WorkerError::config_error(
                "a MrSID batch is configured but GDAL has no MrSID driver",
            ));
        }
    }

    Ok(())
}
