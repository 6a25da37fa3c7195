//! Raster metadata from `gdalinfo -json`.

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::sync::LazyLock;

use geojpeg_models::is_usable_epsg;

use crate::command::{GdalCommand, GdalRunner};
use crate::error::{RasterError, RasterResult};

static TOP_LEVEL_AUTHORITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(?:AUTHORITY|ID)\[\s*"EPSG"\s*,\s*"?(\d+)"?"#).unwrap()
});

static ANY_EPSG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:AUTHORITY|ID)\[\s*"EPSG"\s*,\s*"?(\d+)"?|EPSG:{1,2}(\d+)"#).unwrap()
});

/// Georeferencing summary of a raster.
#[derive(Debug, Clone, Default)]
pub struct RasterInfo {
    /// Raster size in pixels (width, height)
    pub size: Option<(u64, u64)>,
    /// CRS as WKT
    pub wkt: Option<String>,
    /// Explicit EPSG code reported by the reader
    pub epsg: Option<u32>,
}

impl RasterInfo {
    /// Best-effort EPSG code: explicit field first, then the WKT authority.
    pub fn resolve_epsg(&self) -> Option<u32> {
        self.epsg
            .filter(|code| is_usable_epsg(*code))
            .or_else(|| self.wkt.as_deref().and_then(epsg_from_wkt))
    }

    /// Whether the raster carries a CRS at all.
    pub fn has_crs(&self) -> bool {
        self.wkt.as_deref().is_some_and(|w| !w.trim().is_empty()) || self.epsg.is_some()
    }
}

/// gdalinfo JSON output format.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GdalInfoOutput {
    size: Option<Vec<u64>>,
    coordinate_system: Option<GdalCoordinateSystem>,
    stac: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct GdalCoordinateSystem {
    wkt: Option<String>,
    epsg: Option<Value>,
}

/// Probe a raster with `gdalinfo -json`.
pub async fn probe_raster(runner: &GdalRunner, path: impl AsRef<Path>) -> RasterResult<RasterInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(RasterError::FileNotFound(path.to_path_buf()));
    }

    let output = runner.run(&GdalCommand::info(path)).await?;
    parse_gdalinfo(&output.stdout)
}

/// Parse `gdalinfo -json` output.
pub fn parse_gdalinfo(json: &str) -> RasterResult<RasterInfo> {
    let raw: GdalInfoOutput = serde_json::from_str(json)?;

    let size = raw
        .size
        .as_deref()
        .and_then(|s| match s {
            [w, h, ..] => Some((*w, *h)),
            _ => None,
        });

    let (wkt, mut epsg) = match raw.coordinate_system {
        Some(cs) => (
            cs.wkt.filter(|w| !w.trim().is_empty()),
            cs.epsg.as_ref().and_then(value_as_epsg),
        ),
        None => (None, None),
    };

    if epsg.is_none() {
        epsg = raw
            .stac
            .as_ref()
            .and_then(|stac| stac.get("proj:epsg"))
            .and_then(value_as_epsg);
    }

    Ok(RasterInfo { size, wkt, epsg })
}

fn value_as_epsg(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().trim_start_matches("EPSG:").parse().ok(),
        _ => None,
    }
}

/// EPSG code of the root element of a WKT string.
///
/// Only the authority at nesting depth one counts; nested authorities
/// belong to the datum, ellipsoid or units.
pub fn epsg_from_wkt(wkt: &str) -> Option<u32> {
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut at_token_start = false;

    for (idx, ch) in wkt.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '[' | '(' if !in_quotes => depth += 1,
            ']' | ')' if !in_quotes => depth = depth.saturating_sub(1),
            ',' if !in_quotes => at_token_start = true,
            c if c.is_whitespace() => {}
            _ if !in_quotes && depth == 1 && at_token_start => {
                at_token_start = false;
                if let Some(code) = TOP_LEVEL_AUTHORITY
                    .captures(&wkt[idx..])
                    .and_then(|caps| caps[1].parse().ok())
                {
                    if is_usable_epsg(code) {
                        return Some(code);
                    }
                }
            }
            _ => at_token_start = false,
        }
    }

    None
}

/// First usable EPSG code mentioned anywhere in free text.
pub fn epsg_from_text(text: &str) -> Option<u32> {
    ANY_EPSG
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .filter_map(|m| m.as_str().parse().ok())
        .find(|code| is_usable_epsg(*code))
}
