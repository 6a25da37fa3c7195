//! In-process fakes of the external tools for pipeline and scheduler tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use geojpeg_models::{
    tile_path, BoundingBox, ConversionJob, EncodeOptions, InputFormat, SpatialReference,
    ValidationPolicy,
};
use geojpeg_raster::{
    Converter, CrsResolver, RasterError, RasterResult, ReprojectionAttempt, ReprojectionHint,
    ReprojectionMethod, ReprojectionOutcome, Reprojector, WorldFile,
};

use crate::config::{BatchDirs, ConversionConfig};
use crate::pipeline::PipelineContext;

const IMAGE_SIZE: u32 = 200;

pub struct FakeResolver(pub SpatialReference);

#[async_trait]
impl CrsResolver for FakeResolver {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn resolve(&self, _input: &Path) -> SpatialReference {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReprojectionScript {
    FastSucceeds,
    FallbackSucceeds,
    BothFail,
}

pub struct FakeReprojector {
    script: ReprojectionScript,
    calls: AtomicUsize,
}

impl FakeReprojector {
    pub fn new(script: ReprojectionScript) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn attempt(method: ReprojectionMethod, error: Option<&str>) -> ReprojectionAttempt {
    ReprojectionAttempt {
        method,
        error: error.map(str::to_string),
    }
}

#[async_trait]
impl Reprojector for FakeReprojector {
    async fn reproject(
        &self,
        input: &Path,
        _hint: &ReprojectionHint,
        work_dir: &Path,
    ) -> ReprojectionOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let path = work_dir.join("normalized.tif");
        let _ = tokio::fs::copy(input, &path).await;

        match self.script {
            ReprojectionScript::FastSucceeds => ReprojectionOutcome::Normalized {
                path,
                method: ReprojectionMethod::FastWarp,
                attempts: vec![attempt(ReprojectionMethod::FastWarp, None)],
            },
            ReprojectionScript::FallbackSucceeds => ReprojectionOutcome::Normalized {
                path,
                method: ReprojectionMethod::AuxiliaryFallback,
                attempts: vec![
                    attempt(ReprojectionMethod::FastWarp, Some("no embedded CRS")),
                    attempt(ReprojectionMethod::AuxiliaryFallback, None),
                ],
            },
            ReprojectionScript::BothFail => ReprojectionOutcome::Exhausted {
                attempts: vec![
                    attempt(ReprojectionMethod::FastWarp, Some("no embedded CRS")),
                    attempt(ReprojectionMethod::AuxiliaryFallback, Some("no sidecar")),
                ],
            },
        }
    }
}

/// Writes a real JPEG and a world file describing `footprint`.
pub struct FakeConverter {
    footprint: BoundingBox,
    fail: bool,
    panic_on: Option<String>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeConverter {
    pub fn new(footprint: BoundingBox) -> Self {
        Self {
            footprint,
            fail: false,
            panic_on: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

async fn write_georeferenced(output: &Path, footprint: &BoundingBox) -> RasterResult<()> {
    let a = footprint.width() / f64::from(IMAGE_SIZE);
    let e = -footprint.height() / f64::from(IMAGE_SIZE);
    let world = WorldFile {
        a,
        d: 0.0,
        b: 0.0,
        e,
        c: footprint.min_lon + a / 2.0,
        f: footprint.max_lat + e / 2.0,
    };
    image::RgbImage::new(IMAGE_SIZE, IMAGE_SIZE).save(output)?;
    tokio::fs::write(output.with_extension("jgw"), world.to_string()).await?;
    Ok(())
}

impl FakeConverter {
    async fn write(&self, input: &Path, output: &Path, options: &EncodeOptions) -> RasterResult<Vec<PathBuf>> {
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if self.fail {
            tokio::fs::write(output, b"partial").await?;
            return Err(RasterError::conversion_failed(format!(
                "gdal_translate exited with status 1 for {}",
                input.display()
            )));
        }
        if options.tile_size.is_none() {
            write_georeferenced(output, &self.footprint).await?;
            return Ok(vec![output.to_path_buf()]);
        }

        // Two tiles splitting the footprint at its middle meridian.
        let fp = self.footprint;
        let mid = fp.min_lon + fp.width() / 2.0;
        let halves = [
            (1, BoundingBox::new(fp.min_lon, fp.min_lat, mid, fp.max_lat)),
            (2, BoundingBox::new(mid, fp.min_lat, fp.max_lon, fp.max_lat)),
        ];
        let mut tiles = Vec::new();
        for (col, half) in halves {
            let tile = tile_path(output, col, 1);
            write_georeferenced(&tile, &half).await?;
            tiles.push(tile);
        }
        Ok(tiles)
    }
}

#[async_trait]
impl Converter for FakeConverter {
    fn name(&self) -> &'static str {
        "fake-jpeg"
    }

    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        options: &EncodeOptions,
    ) -> RasterResult<Vec<PathBuf>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let stem = input.file_stem().map(|s| s.to_string_lossy().to_string());
        if self.panic_on.is_some() && stem == self.panic_on {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            panic!("encoder crashed on {}", input.display());
        }

        let result = self.write(input, output, options).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Temp-dir backed pipeline setup with builder-style knobs.
pub struct Fixture {
    pub root: PathBuf,
    pub config: ConversionConfig,
    pub reprojector: Arc<FakeReprojector>,
    pub converter: Arc<FakeConverter>,
    sr: SpatialReference,
}

impl Fixture {
    pub fn new(dir: &TempDir) -> Self {
        let root = dir.path().to_path_buf();
        let work_dir = root.join("work");
        std::fs::create_dir_all(&work_dir).unwrap();

        let config = ConversionConfig {
            workers: 2,
            work_dir,
            ..ConversionConfig::default()
        }
        .with_batch(BatchDirs::new(InputFormat::Sid, root.join("in"), root.join("out")));

        Self {
            root,
            config,
            reprojector: Arc::new(FakeReprojector::new(ReprojectionScript::FastSucceeds)),
            converter: Arc::new(FakeConverter::new(BoundingBox::new(-98.5, 29.0, -98.0, 29.5))),
            sr: SpatialReference::unresolved(),
        }
    }

    pub fn resolve_to(mut self, sr: SpatialReference) -> Self {
        self.sr = sr;
        self
    }

    pub fn policy(mut self, policy: ValidationPolicy) -> Self {
        self.config.policy = policy;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn reproject(mut self, script: ReprojectionScript) -> Self {
        self.reprojector = Arc::new(FakeReprojector::new(script));
        self
    }

    pub fn footprint(mut self, footprint: BoundingBox) -> Self {
        self.converter = Arc::new(FakeConverter::new(footprint));
        self
    }

    pub fn tile_size(mut self, tile_size: u32) -> Self {
        self.config.sid_tile_size = tile_size;
        self
    }

    pub fn failing_encoder(mut self) -> Self {
        let mut converter = FakeConverter::new(self.converter.footprint);
        converter.fail = true;
        self.converter = Arc::new(converter);
        self
    }

    pub fn slow_encoder(mut self, delay: Duration) -> Self {
        let mut converter = FakeConverter::new(self.converter.footprint);
        converter.delay = delay;
        self.converter = Arc::new(converter);
        self
    }

    pub fn panicking_encoder(mut self, stem: &str) -> Self {
        let mut converter = FakeConverter::new(self.converter.footprint);
        converter.panic_on = Some(stem.to_string());
        self.converter = Arc::new(converter);
        self
    }

    /// Create an input file and a job for it.
    pub fn job(&self, name: &str) -> ConversionJob {
        let input = self.root.join("in").join(name);
        std::fs::create_dir_all(input.parent().unwrap()).unwrap();
        std::fs::write(&input, b"raster").unwrap();

        let format = InputFormat::from_path(&input).unwrap();
        let stem = input.file_stem().unwrap().to_string_lossy().to_string();
        ConversionJob::new(input, format, self.root.join("out").join(format!("{}.jpg", stem)))
    }

    pub fn context(&self) -> PipelineContext {
        PipelineContext::new(
            self.config.clone(),
            Arc::new(FakeResolver(self.sr)),
            self.reprojector.clone(),
            self.converter.clone(),
        )
    }
}

pub fn assert_no_artifacts(job: &ConversionJob) {
    for artifact in job.artifacts() {
        assert!(!artifact.exists(), "{} left behind", artifact.display());
    }
}
