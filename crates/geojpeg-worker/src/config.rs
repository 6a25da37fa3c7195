//! Conversion run configuration.

use std::path::PathBuf;
use std::time::Duration;

use geojpeg_models::encoding::MAX_JPEG_QUALITY;
use geojpeg_models::{
    BoundingBox, EncodeOptions, InputFormat, ValidationPolicy, DEFAULT_JPEG_QUALITY,
    DEFAULT_TARGET_EPSG,
};
use geojpeg_raster::GdalRunner;

use crate::error::{WorkerError, WorkerResult};

/// Largest accepted worker pool.
pub const MAX_WORKERS: usize = 1024;

/// One input directory converted into one output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchDirs {
    /// Format of the inputs in this batch
    pub format: InputFormat,
    /// Directory walked for inputs
    pub input_dir: PathBuf,
    /// Root of the mirrored output tree
    pub output_dir: PathBuf,
}

impl BatchDirs {
    pub fn new(format: InputFormat, input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            format,
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
        }
    }
}

/// Immutable configuration of a conversion run.
#[derive(Debug, Clone)]
pub struct ConversionConfig {
    /// Batches to convert, SID first
    pub batches: Vec<BatchDirs>,
    /// JPEG quality (0-100)
    pub jpeg_quality: u8,
    /// Tile size for MrSID-derived output; 0 disables tiling
    pub sid_tile_size: u32,
    /// Worker pool size
    pub workers: usize,
    /// Reprojection target
    pub target_epsg: u32,
    /// Bounding-box plausibility policy
    pub policy: ValidationPolicy,
    /// Scratch directory for per-job intermediates
    pub work_dir: PathBuf,
    /// Timeout for each external tool invocation
    pub job_timeout: Option<Duration>,
    /// Where inputs of failed jobs are copied
    pub failed_dir: Option<PathBuf>,
    /// Where per-input error logs are appended
    pub error_log_dir: Option<PathBuf>,
    /// Directory holding the GDAL executables; `PATH` when unset
    pub gdal_bin_dir: Option<PathBuf>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            batches: Vec::new(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            sid_tile_size: 0,
            workers: default_workers(),
            target_epsg: DEFAULT_TARGET_EPSG,
            policy: ValidationPolicy::disabled(),
            work_dir: std::env::temp_dir().join("geojpeg"),
            job_timeout: None,
            failed_dir: None,
            error_log_dir: None,
            gdal_bin_dir: None,
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().min(MAX_WORKERS))
        .unwrap_or(4)
}

impl ConversionConfig {
    /// Create config from environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from any key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> WorkerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let mut batches = Vec::new();
        for (format, input_key, output_key) in [
            (InputFormat::Sid, "GEOJPEG_SID_INPUT", "GEOJPEG_SID_OUTPUT"),
            (InputFormat::Tiff, "GEOJPEG_TIFF_INPUT", "GEOJPEG_TIFF_OUTPUT"),
        ] {
            match (get(input_key), get(output_key)) {
                (Some(input), Some(output)) => batches.push(BatchDirs::new(format, input, output)),
                (None, None) => {}
                (Some(_), None) => {
                    return Err(WorkerError::config_error(format!(
                        "{} is set but {} is not",
                        input_key, output_key
                    )))
                }
                (None, Some(_)) => {
                    return Err(WorkerError::config_error(format!(
                        "{} is set but {} is not",
                        output_key, input_key
                    )))
                }
            }
        }

        let enforce = match get("GEOJPEG_BBOX_CHECK") {
            Some(v) => parse_bool("GEOJPEG_BBOX_CHECK", &v)?,
            None => false,
        };
        let envelope = get("GEOJPEG_BBOX_ENVELOPE")
            .map(|v| {
                v.parse::<BoundingBox>().map_err(|e| {
                    WorkerError::config_error(format!("GEOJPEG_BBOX_ENVELOPE: {}", e))
                })
            })
            .transpose()?;
        let max_span_degrees = parse_opt::<f64>(&get, "GEOJPEG_BBOX_MAX_SPAN")?;

        let config = Self {
            batches,
            jpeg_quality: parse_opt(&get, "GEOJPEG_JPEG_QUALITY")?.unwrap_or(defaults.jpeg_quality),
            sid_tile_size: parse_opt(&get, "GEOJPEG_SID_TILE_SIZE")?.unwrap_or(defaults.sid_tile_size),
            workers: parse_opt(&get, "GEOJPEG_WORKERS")?.unwrap_or(defaults.workers),
            target_epsg: parse_opt(&get, "GEOJPEG_TARGET_EPSG")?.unwrap_or(defaults.target_epsg),
            policy: ValidationPolicy {
                enforce,
                envelope,
                max_span_degrees,
            },
            work_dir: get("GEOJPEG_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            job_timeout: parse_opt::<u64>(&get, "GEOJPEG_JOB_TIMEOUT_SECS")?
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            failed_dir: get("GEOJPEG_FAILED_DIR").map(PathBuf::from),
            error_log_dir: get("GEOJPEG_ERROR_LOG_DIR").map(PathBuf::from),
            gdal_bin_dir: get("GEOJPEG_GDAL_BIN_DIR").map(PathBuf::from),
        };

        config.validate()?;
        Ok(config)
    }

    /// Add a batch programmatically.
    pub fn with_batch(mut self, batch: BatchDirs) -> Self {
        self.batches.push(batch);
        self
    }

    /// Check the configuration before any job starts.
    pub fn validate(&self) -> WorkerResult<()> {
        if self.jpeg_quality > MAX_JPEG_QUALITY {
            return Err(WorkerError::config_error(format!(
                "JPEG quality must be 0-{}, got {}",
                MAX_JPEG_QUALITY, self.jpeg_quality
            )));
        }
        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(WorkerError::config_error(format!(
                "worker count must be 1-{}, got {}",
                MAX_WORKERS, self.workers
            )));
        }
        if self.target_epsg == 0 {
            return Err(WorkerError::config_error("target EPSG code must be greater than 0"));
        }
        if let Some(envelope) = &self.policy.envelope {
            if envelope.is_degenerate() {
                return Err(WorkerError::config_error(format!(
                    "plausibility envelope {} is empty or inverted",
                    envelope
                )));
            }
        }
        if self.policy.enforce && self.policy.envelope.is_none() {
            return Err(WorkerError::config_error(
                "bounding-box check is enabled but no envelope is configured",
            ));
        }
        if let Some(span) = self.policy.max_span_degrees {
            if !span.is_finite() || span <= 0.0 {
                return Err(WorkerError::config_error(format!(
                    "maximum span must be a positive number of degrees, got {}",
                    span
                )));
            }
        }
        if self.batches.is_empty() {
            return Err(WorkerError::config_error(
                "no batch configured; set GEOJPEG_SID_INPUT/OUTPUT or GEOJPEG_TIFF_INPUT/OUTPUT",
            ));
        }
        Ok(())
    }

    /// Encoder options for inputs of the given format.
    pub fn encode_options(&self, format: InputFormat) -> EncodeOptions {
        let options = EncodeOptions::new(self.jpeg_quality);
        match format {
            InputFormat::Sid => options.with_tile_size(self.sid_tile_size),
            InputFormat::Tiff => options,
        }
    }

    /// Timeout in whole seconds, for the GDAL runner.
    pub fn timeout_secs(&self) -> Option<u64> {
        self.job_timeout.map(|d| d.as_secs())
    }

    /// GDAL runner honoring the job timeout and tool directory.
    pub fn gdal_runner(&self) -> GdalRunner {
        let mut runner = GdalRunner::new();
        if let Some(secs) = self.timeout_secs() {
            runner = runner.with_timeout(secs);
        }
        if let Some(dir) = &self.gdal_bin_dir {
            runner = runner.with_tool_dir(dir.clone());
        }
        runner
    }
}

fn parse_opt<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> WorkerResult<Option<T>>
where
    T: std::str::FromStr,
{
    get(key)
        .map(|v| {
            v.parse::<T>()
                .map_err(|_| WorkerError::config_error(format!("{}: invalid value '{}'", key, v)))
        })
        .transpose()
}

fn parse_bool(key: &str, value: &str) -> WorkerResult<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(WorkerError::config_error(format!(
            "{}: invalid boolean '{}'",
            key, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const TIFF_BATCH: [(&str, &str); 2] = [
        ("GEOJPEG_TIFF_INPUT", "/data/tiff"),
        ("GEOJPEG_TIFF_OUTPUT", "/data/jpeg"),
    ];

    #[test]
    fn test_defaults() {
        let config = ConversionConfig::from_lookup(lookup(&TIFF_BATCH)).unwrap();
        assert_eq!(config.batches.len(), 1);
        assert_eq!(config.batches[0].format, InputFormat::Tiff);
        assert_eq!(config.jpeg_quality, 90);
        assert_eq!(config.target_epsg, 4326);
        assert!(config.workers > 0);
        assert!(!config.policy.enforce);
        assert_eq!(config.job_timeout, None);
        assert_eq!(config.gdal_bin_dir, None);
    }

    #[test]
    fn test_full_config() {
        let mut pairs = TIFF_BATCH.to_vec();
        pairs.extend([
            ("GEOJPEG_SID_INPUT", "/data/sid"),
            ("GEOJPEG_SID_OUTPUT", "/data/sid-jpeg"),
            ("GEOJPEG_JPEG_QUALITY", "75"),
            ("GEOJPEG_SID_TILE_SIZE", "512"),
            ("GEOJPEG_WORKERS", "3"),
            ("GEOJPEG_BBOX_CHECK", "true"),
            ("GEOJPEG_BBOX_ENVELOPE", "-106,25,-93,37"),
            ("GEOJPEG_BBOX_MAX_SPAN", "1"),
            ("GEOJPEG_JOB_TIMEOUT_SECS", "600"),
            ("GEOJPEG_GDAL_BIN_DIR", "/opt/gdal/bin"),
        ]);

        let config = ConversionConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.batches[0].format, InputFormat::Sid);
        assert_eq!(config.workers, 3);
        assert_eq!(
            config.policy,
            ValidationPolicy::enforced(BoundingBox::new(-106.0, 25.0, -93.0, 37.0)).with_max_span(1.0)
        );
        assert_eq!(config.timeout_secs(), Some(600));
        assert_eq!(config.gdal_bin_dir, Some(PathBuf::from("/opt/gdal/bin")));
        assert_eq!(config.encode_options(InputFormat::Sid).tile_size, Some(512));
        assert_eq!(config.encode_options(InputFormat::Tiff).tile_size, None);
        assert_eq!(config.encode_options(InputFormat::Tiff).quality, 75);
    }

    #[test]
    fn test_rejects_invalid_values() {
        let cases: [(&str, &str); 7] = [
            ("GEOJPEG_JPEG_QUALITY", "101"),
            ("GEOJPEG_JPEG_QUALITY", "high"),
            ("GEOJPEG_WORKERS", "0"),
            ("GEOJPEG_WORKERS", "1025"),
            ("GEOJPEG_BBOX_ENVELOPE", "-93,25,-106,37"),
            ("GEOJPEG_BBOX_ENVELOPE", "1,2,3"),
            ("GEOJPEG_BBOX_CHECK", "maybe"),
        ];
        for (key, value) in cases {
            let mut pairs = TIFF_BATCH.to_vec();
            pairs.push((key, value));
            let result = ConversionConfig::from_lookup(lookup(&pairs));
            assert!(
                matches!(result, Err(WorkerError::ConfigError(_))),
                "{}={} should be rejected",
                key,
                value
            );
        }
    }

    #[test]
    fn test_huge_worker_count_is_a_config_error() {
        let huge = (usize::MAX >> 2).to_string();
        let mut pairs = TIFF_BATCH.to_vec();
        pairs.push(("GEOJPEG_WORKERS", &huge));

        let err = ConversionConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, WorkerError::ConfigError(_)));
        assert!(err.to_string().contains("worker count"));

        let mut at_cap = TIFF_BATCH.to_vec();
        at_cap.push(("GEOJPEG_WORKERS", "1024"));
        assert_eq!(ConversionConfig::from_lookup(lookup(&at_cap)).unwrap().workers, MAX_WORKERS);
        assert!(ConversionConfig::default().workers <= MAX_WORKERS);
    }

    #[test]
    fn test_enforcement_requires_envelope() {
        let mut pairs = TIFF_BATCH.to_vec();
        pairs.push(("GEOJPEG_BBOX_CHECK", "1"));
        let err = ConversionConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(err.to_string().contains("no envelope"));
    }

    #[test]
    fn test_batch_requires_both_dirs() {
        let err = ConversionConfig::from_lookup(lookup(&[("GEOJPEG_SID_INPUT", "/data/sid")])).unwrap_err();
        assert!(err.to_string().contains("GEOJPEG_SID_OUTPUT"));

        let none = ConversionConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(none.to_string().contains("no batch configured"));
    }

    #[test]
    fn test_programmatic_batch() {
        let config = ConversionConfig::default().with_batch(BatchDirs::new(
            InputFormat::Tiff,
            "/in",
            "/out",
        ));
        assert!(config.validate().is_ok());
    }
}
