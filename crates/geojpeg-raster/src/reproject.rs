//! Two-tier reprojection: a fast warp using standard georeferencing, then a
//! slower fallback that rebuilds georeferencing from sidecar hints.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::command::{GdalCommand, GdalRunner};
use crate::core::Reprojector;
use crate::error::{RasterError, RasterResult};
use crate::info::probe_raster;
use crate::sidecar::read_sidecars;

/// Assumed CRS for rasters that only ship an extended `.tfwx` world file.
pub const TFWX_ASSUMED_EPSG: u32 = 4326;

/// What the caller already knows about the input's CRS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReprojectionHint {
    /// Source EPSG code, if resolved
    pub source_epsg: Option<u32>,
    /// Target EPSG code
    pub target_epsg: u32,
}

impl ReprojectionHint {
    pub fn new(source_epsg: Option<u32>, target_epsg: u32) -> Self {
        Self {
            source_epsg,
            target_epsg,
        }
    }
}

/// Reprojection tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReprojectionMethod {
    /// Direct warp from embedded georeferencing
    FastWarp,
    /// Georeferencing rebuilt from sidecar SRS and control points
    AuxiliaryFallback,
}

impl ReprojectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReprojectionMethod::FastWarp => "fast-warp",
            ReprojectionMethod::AuxiliaryFallback => "auxiliary-fallback",
        }
    }
}

impl fmt::Display for ReprojectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One tier's attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReprojectionAttempt {
    pub method: ReprojectionMethod,
    /// Failure text, `None` on success
    pub error: Option<String>,
}

impl ReprojectionAttempt {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

impl fmt::Display for ReprojectionAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            None => write!(f, "reprojection {}: ok", self.method),
            Some(e) => write!(f, "reprojection {}: failed: {}", self.method, e),
        }
    }
}

/// Tagged result of the two-tier strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReprojectionOutcome {
    /// A tier produced a normalized raster
    Normalized {
        path: PathBuf,
        method: ReprojectionMethod,
        attempts: Vec<ReprojectionAttempt>,
    },
    /// Every tier failed
    Exhausted { attempts: Vec<ReprojectionAttempt> },
}

impl ReprojectionOutcome {
    pub fn attempts(&self) -> &[ReprojectionAttempt] {
        match self {
            ReprojectionOutcome::Normalized { attempts, .. } => attempts,
            ReprojectionOutcome::Exhausted { attempts } => attempts,
        }
    }

    /// Normalized path, or `ReprojectionFailed` listing every attempt.
    pub fn into_result(self) -> RasterResult<PathBuf> {
        match self {
            ReprojectionOutcome::Normalized { path, .. } => Ok(path),
            ReprojectionOutcome::Exhausted { attempts } => {
                let detail = attempts
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                Err(RasterError::reprojection_failed(detail))
            }
        }
    }
}

/// A single reprojection tier.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReprojectionStrategy: Send + Sync {
    fn method(&self) -> ReprojectionMethod;

    /// Produce a raster in the target CRS under `work_dir`.
    async fn attempt(
        &self,
        input: &Path,
        hint: &ReprojectionHint,
        work_dir: &Path,
    ) -> RasterResult<PathBuf>;
}

/// Fast tier first; fallback tier only when the fast tier fails.
#[derive(Clone)]
pub struct TwoTierReprojector {
    fast: Arc<dyn ReprojectionStrategy>,
    fallback: Arc<dyn ReprojectionStrategy>,
}

impl TwoTierReprojector {
    pub fn new(fast: Arc<dyn ReprojectionStrategy>, fallback: Arc<dyn ReprojectionStrategy>) -> Self {
        Self { fast, fallback }
    }

    /// GDAL-backed tiers sharing one runner.
    pub fn gdal(runner: GdalRunner) -> Self {
        Self::new(
            Arc::new(FastWarp::new(runner.clone())),
            Arc::new(AuxiliaryWarp::new(runner)),
        )
    }
}

#[async_trait]
impl Reprojector for TwoTierReprojector {
    async fn reproject(
        &self,
        input: &Path,
        hint: &ReprojectionHint,
        work_dir: &Path,
    ) -> ReprojectionOutcome {
        let mut attempts = Vec::with_capacity(2);

        for tier in [&self.fast, &self.fallback] {
            let method = tier.method();
            match tier.attempt(input, hint, work_dir).await {
                Ok(path) => {
                    info!("Reprojected {} via {}", input.display(), method);
                    attempts.push(ReprojectionAttempt {
                        method,
                        error: None,
                    });
                    return ReprojectionOutcome::Normalized {
                        path,
                        method,
                        attempts,
                    };
                }
                Err(e) => {
                    warn!("Reprojection {} failed for {}: {}", method, input.display(), e);
                    attempts.push(ReprojectionAttempt {
                        method,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        ReprojectionOutcome::Exhausted { attempts }
    }
}

/// `gdalwarp -t_srs EPSG:<target>` straight from the input's own georeferencing.
pub struct FastWarp {
    runner: GdalRunner,
}

impl FastWarp {
    pub fn new(runner: GdalRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl ReprojectionStrategy for FastWarp {
    fn method(&self) -> ReprojectionMethod {
        ReprojectionMethod::FastWarp
    }

    async fn attempt(
        &self,
        input: &Path,
        hint: &ReprojectionHint,
        work_dir: &Path,
    ) -> RasterResult<PathBuf> {
        promote_tfwx(input).await;

        if hint.source_epsg.is_none() {
            let info = probe_raster(&self.runner, input).await?;
            if !info.has_crs() {
                return Err(RasterError::missing_georeference(format!(
                    "{} has no embedded CRS",
                    input.display()
                )));
            }
        }

        let output = work_dir.join(format!("{}_fast.tif", file_stem(input)));
        let mut cmd = GdalCommand::warp(input, &output);
        if let Some(code) = hint.source_epsg {
            cmd = cmd.source_srs(format!("EPSG:{}", code));
        }
        cmd = cmd.target_srs(format!("EPSG:{}", hint.target_epsg));

        self.runner.run(&cmd).await?;
        Ok(output)
    }
}

/// Rebuild georeferencing from sidecar SRS and control points, then warp.
pub struct AuxiliaryWarp {
    runner: GdalRunner,
}

impl AuxiliaryWarp {
    pub fn new(runner: GdalRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl ReprojectionStrategy for AuxiliaryWarp {
    fn method(&self) -> ReprojectionMethod {
        ReprojectionMethod::AuxiliaryFallback
    }

    async fn attempt(
        &self,
        input: &Path,
        hint: &ReprojectionHint,
        work_dir: &Path,
    ) -> RasterResult<PathBuf> {
        let sidecars = read_sidecars(input).await;
        let gcps = sidecars
            .iter()
            .find(|meta| !meta.gcps.is_empty())
            .map(|meta| meta.gcps.clone())
            .unwrap_or_default();

        let srs = sidecars
            .iter()
            .find_map(|meta| meta.srs_definition())
            .or_else(|| hint.source_epsg.map(|code| format!("EPSG:{}", code)))
            .or_else(|| {
                tfwx_path(input).exists().then(|| {
                    debug!(
                        "Only a .tfwx world file for {}; assuming EPSG:{}",
                        input.display(),
                        TFWX_ASSUMED_EPSG
                    );
                    format!("EPSG:{}", TFWX_ASSUMED_EPSG)
                })
            })
            .ok_or_else(|| {
                RasterError::missing_georeference(format!(
                    "no spatial reference in sidecars of {}",
                    input.display()
                ))
            })?;

        let stem = file_stem(input);
        let vrt = work_dir.join(format!("{}_georef.vrt", stem));
        let mut translate = GdalCommand::translate(input, &vrt)
            .output_format("VRT")
            .assign_srs(srs);
        for gcp in &gcps {
            translate = translate.gcp(gcp.pixel, gcp.line, gcp.x, gcp.y);
        }
        self.runner.run(&translate).await?;

        let output = work_dir.join(format!("{}_fallback.tif", stem));
        let warp = GdalCommand::warp(&vrt, &output).target_srs(format!("EPSG:{}", hint.target_epsg));
        self.runner.run(&warp).await?;

        Ok(output)
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "raster".to_string())
}

fn tfwx_path(input: &Path) -> PathBuf {
    input.with_extension("tfwx")
}

/// GDAL only reads `.tfw`; copy a lone `.tfwx` so the warp can see it.
async fn promote_tfwx(input: &Path) {
    let tfwx = tfwx_path(input);
    let tfw = input.with_extension("tfw");
    if tfwx.exists() && !tfw.exists() {
        match tokio::fs::copy(&tfwx, &tfw).await {
            Ok(_) => info!("Copied {} -> {}", tfwx.display(), tfw.display()),
            Err(e) => warn!("Could not copy {} to {}: {}", tfwx.display(), tfw.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hint() -> ReprojectionHint {
        ReprojectionHint::new(None, 4326)
    }

    fn strategy(
        method: ReprojectionMethod,
        result: fn() -> RasterResult<PathBuf>,
        times: usize,
    ) -> Arc<dyn ReprojectionStrategy> {
        let mut mock = MockReprojectionStrategy::new();
        mock.expect_method().return_const(method);
        mock.expect_attempt()
            .times(times)
            .returning(move |_, _, _| result());
        Arc::new(mock)
    }

    #[tokio::test]
    async fn test_fast_path_success_skips_fallback() {
        let reprojector = TwoTierReprojector::new(
            strategy(ReprojectionMethod::FastWarp, || Ok(PathBuf::from("/work/a_fast.tif")), 1),
            strategy(ReprojectionMethod::AuxiliaryFallback, || Ok(PathBuf::from("unused")), 0),
        );

        let outcome = reprojector
            .reproject(Path::new("a.tif"), &hint(), Path::new("/work"))
            .await;

        match &outcome {
            ReprojectionOutcome::Normalized { path, method, attempts } => {
                assert_eq!(path, &PathBuf::from("/work/a_fast.tif"));
                assert_eq!(*method, ReprojectionMethod::FastWarp);
                assert_eq!(attempts.len(), 1);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fallback_after_fast_failure_records_both_attempts() {
        let reprojector = TwoTierReprojector::new(
            strategy(
                ReprojectionMethod::FastWarp,
                || Err(RasterError::missing_georeference("no embedded CRS")),
                1,
            ),
            strategy(
                ReprojectionMethod::AuxiliaryFallback,
                || Ok(PathBuf::from("/work/a_fallback.tif")),
                1,
            ),
        );

        let outcome = reprojector
            .reproject(Path::new("a.tif"), &hint(), Path::new("/work"))
            .await;

        let attempts = outcome.attempts().to_vec();
        assert_eq!(attempts.len(), 2);
        assert!(!attempts[0].succeeded());
        assert!(attempts[1].succeeded());
        assert!(attempts[0].to_string().contains("fast-warp: failed"));
        assert_eq!(outcome.into_result().unwrap(), PathBuf::from("/work/a_fallback.tif"));
    }

    #[tokio::test]
    async fn test_both_tiers_failing_is_exhausted() {
        let reprojector = TwoTierReprojector::new(
            strategy(
                ReprojectionMethod::FastWarp,
                || Err(RasterError::missing_georeference("no embedded CRS")),
                1,
            ),
            strategy(
                ReprojectionMethod::AuxiliaryFallback,
                || Err(RasterError::missing_georeference("no sidecar")),
                1,
            ),
        );

        let outcome = reprojector
            .reproject(Path::new("a.tif"), &hint(), Path::new("/work"))
            .await;
        assert!(matches!(outcome, ReprojectionOutcome::Exhausted { .. }));

        let err = outcome.into_result().unwrap_err();
        assert!(matches!(err, RasterError::ReprojectionFailed(_)));
        let message = err.to_string();
        assert!(message.contains("fast-warp"));
        assert!(message.contains("auxiliary-fallback"));
    }

    #[tokio::test]
    async fn test_auxiliary_warp_without_hints_fails_fast() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("bare.tif");
        tokio::fs::write(&input, b"not really a tiff").await.unwrap();

        let result = AuxiliaryWarp::new(GdalRunner::new())
            .attempt(&input, &hint(), dir.path())
            .await;
        assert!(matches!(result, Err(RasterError::MissingGeoreference(_))));
    }

    #[tokio::test]
    async fn test_promote_tfwx() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("scan.tif");
        tokio::fs::write(dir.path().join("scan.tfwx"), "1\n0\n0\n-1\n0\n0\n").await.unwrap();

        promote_tfwx(&input).await;
        assert!(dir.path().join("scan.tfw").exists());
    }
}
