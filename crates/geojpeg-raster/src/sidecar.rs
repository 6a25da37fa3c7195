//! Auxiliary georeferencing sidecars.
//!
//! Handles GDAL PAM `.aux.xml` files, ESRI-flavoured `.aux.xml` files
//! (`WKID`, `WKT`, `SourceGCPs`/`TargetGCPs`) and plain `.prj` WKT files.

use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};
use tracing::debug;

use geojpeg_models::is_usable_epsg;

use crate::error::{RasterError, RasterResult};
use crate::info::{epsg_from_text, epsg_from_wkt};

/// A ground control point: image position and its map coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundControlPoint {
    pub pixel: f64,
    pub line: f64,
    pub x: f64,
    pub y: f64,
}

/// Georeferencing hints read from a sidecar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuxMetadata {
    /// Sidecar the hints came from
    pub path: PathBuf,
    /// Declared EPSG code
    pub epsg: Option<u32>,
    /// Declared spatial reference (WKT)
    pub srs: Option<String>,
    /// Ground control points
    pub gcps: Vec<GroundControlPoint>,
}

impl AuxMetadata {
    /// SRS string usable with `-a_srs`.
    pub fn srs_definition(&self) -> Option<String> {
        self.epsg
            .map(|code| format!("EPSG:{}", code))
            .or_else(|| self.srs.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.epsg.is_none() && self.srs.is_none() && self.gcps.is_empty()
    }
}

/// Sidecar paths checked for an input, in priority order.
pub fn sidecar_candidates(input: &Path) -> Vec<PathBuf> {
    let stem = input.with_extension("");
    vec![
        append_extension(&stem, "aux.xml"),
        append_extension(input, "aux.xml"),
        append_extension(&stem, "prj"),
    ]
}

fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(".");
    s.push(ext);
    PathBuf::from(s)
}

/// Read every existing sidecar of `input`, in priority order.
pub async fn read_sidecars(input: &Path) -> Vec<AuxMetadata> {
    let mut found = Vec::new();
    for candidate in sidecar_candidates(input) {
        if !candidate.is_file() {
            continue;
        }
        match read_aux_metadata(&candidate).await {
            Ok(meta) => found.push(meta),
            Err(e) => debug!("Skipping sidecar {}: {}", candidate.display(), e),
        }
    }
    found
}

/// Read and parse a single sidecar.
pub async fn read_aux_metadata(path: &Path) -> RasterResult<AuxMetadata> {
    let bytes = tokio::fs::read(path).await?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(parse_aux_metadata(path, &text))
}

/// Parse sidecar text; never fails, malformed content yields fewer hints.
pub fn parse_aux_metadata(path: &Path, text: &str) -> AuxMetadata {
    let mut meta = AuxMetadata {
        path: path.to_path_buf(),
        ..Default::default()
    };

    let is_prj = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("prj"));

    if is_prj {
        let wkt = text.trim();
        if !wkt.is_empty() {
            meta.epsg = epsg_from_wkt(wkt).or_else(|| epsg_from_text(wkt));
            meta.srs = Some(wkt.to_string());
        }
        return meta;
    }

    match parse_xml(path, text) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!("{}; scanning raw text", e);
            meta.epsg = epsg_from_text(text);
            meta
        }
    }
}

fn parse_xml(path: &Path, text: &str) -> RasterResult<AuxMetadata> {
    let doc = Document::parse(text)
        .map_err(|e| RasterError::AuxMetadata(format!("{}: {}", path.display(), e)))?;

    let mut meta = AuxMetadata {
        path: path.to_path_buf(),
        ..Default::default()
    };

    meta.epsg = ["WKID", "LatestWKID"].iter().find_map(|tag| {
        find_element(&doc, tag)
            .and_then(|n| n.text())
            .and_then(|t| t.trim().parse::<u32>().ok())
            .filter(|code| is_usable_epsg(*code))
    });

    meta.srs = ["SRS", "WKT"]
        .iter()
        .find_map(|tag| element_text(&doc, tag))
        .or_else(|| {
            find_element(&doc, "GCPList")
                .and_then(|n| n.attribute("Projection"))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        });

    if meta.epsg.is_none() {
        meta.epsg = meta
            .srs
            .as_deref()
            .and_then(|srs| epsg_from_wkt(srs).or_else(|| epsg_from_text(srs)));
    }

    meta.gcps = pam_gcps(&doc);
    if meta.gcps.is_empty() {
        meta.gcps = esri_gcps(&doc);
    }

    Ok(meta)
}

fn find_element<'a, 'input>(doc: &'a Document<'input>, tag: &str) -> Option<Node<'a, 'input>> {
    doc.descendants()
        .find(|n| n.is_element() && n.tag_name().name() == tag)
}

fn element_text(doc: &Document<'_>, tag: &str) -> Option<String> {
    find_element(doc, tag)
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// `<GCPList><GCP Pixel=".." Line=".." X=".." Y=".."/></GCPList>`
fn pam_gcps(doc: &Document<'_>) -> Vec<GroundControlPoint> {
    doc.descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "GCP")
        .filter_map(|n| {
            let attr = |name: &str| n.attribute(name).and_then(|v| v.trim().parse::<f64>().ok());
            Some(GroundControlPoint {
                pixel: attr("Pixel")?,
                line: attr("Line")?,
                x: attr("X")?,
                y: attr("Y")?,
            })
        })
        .collect()
}

/// ESRI stores source (image) and target (map) points as flat `<Double>` lists.
fn esri_gcps(doc: &Document<'_>) -> Vec<GroundControlPoint> {
    let doubles = |tag: &str| -> Vec<f64> {
        find_element(doc, tag)
            .map(|n| {
                n.children()
                    .filter(|c| c.is_element() && c.tag_name().name() == "Double")
                    .filter_map(|c| c.text().and_then(|t| t.trim().parse().ok()))
                    .collect()
            })
            .unwrap_or_default()
    };

    let source = doubles("SourceGCPs");
    let target = doubles("TargetGCPs");

    source
        .chunks_exact(2)
        .zip(target.chunks_exact(2))
        .map(|(s, t)| GroundControlPoint {
            pixel: s[0],
            // ESRI image space has y pointing up
            line: s[1].abs(),
            x: t[0],
            y: t[1],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sidecar_candidates_order() {
        let candidates = sidecar_candidates(Path::new("/data/ortho.tif"));
        assert_eq!(
            candidates,
            vec![
                PathBuf::from("/data/ortho.aux.xml"),
                PathBuf::from("/data/ortho.tif.aux.xml"),
                PathBuf::from("/data/ortho.prj"),
            ]
        );
    }

    #[test]
    fn test_parse_esri_wkid() {
        let xml = r#"<?xml version="1.0"?>
<PAMDataset>
  <Metadata domain="xml:ESRI" format="xml">
    <GeodataXform xsi:type="typens:PolynomialXform" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:typens="http://www.esri.com/schemas/ArcGIS/10.8">
      <SpatialReference xsi:type="typens:ProjectedCoordinateSystem">
        <WKT>PROJCS["NAD_1983_UTM_Zone_14N",GEOGCS["GCS_North_American_1983"]]</WKT>
        <WKID>26914</WKID>
        <LatestWKID>26914</LatestWKID>
      </SpatialReference>
      <SourceGCPs xsi:type="typens:ArrayOfDouble">
        <Double>0</Double><Double>0</Double>
        <Double>1000</Double><Double>-800</Double>
      </SourceGCPs>
      <TargetGCPs xsi:type="typens:ArrayOfDouble">
        <Double>540000</Double><Double>3265000</Double>
        <Double>541000</Double><Double>3264200</Double>
      </TargetGCPs>
    </GeodataXform>
  </Metadata>
</PAMDataset>"#;

        let meta = parse_aux_metadata(Path::new("a.aux.xml"), xml);
        assert_eq!(meta.epsg, Some(26914));
        assert_eq!(meta.srs_definition().as_deref(), Some("EPSG:26914"));
        assert!(meta.srs.unwrap().starts_with("PROJCS"));
        assert_eq!(meta.gcps.len(), 2);
        assert_eq!(
            meta.gcps[1],
            GroundControlPoint {
                pixel: 1000.0,
                line: 800.0,
                x: 541000.0,
                y: 3264200.0
            }
        );
    }

    #[test]
    fn test_parse_gdal_pam_srs_and_gcps() {
        let xml = r#"<PAMDataset>
  <SRS dataAxisToSRSAxisMapping="2,1">GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]]],AUTHORITY["EPSG","4326"]]</SRS>
  <GCPList Projection="">
    <GCP Id="1" Pixel="0.5" Line="0.5" X="-98.5" Y="29.5" Z="0"/>
    <GCP Id="2" Pixel="99.5" Line="99.5" X="-98.0" Y="29.0" Z="0"/>
  </GCPList>
</PAMDataset>"#;

        let meta = parse_aux_metadata(Path::new("b.tif.aux.xml"), xml);
        assert_eq!(meta.epsg, Some(4326));
        assert_eq!(meta.gcps.len(), 2);
        assert_eq!(meta.gcps[0].x, -98.5);
    }

    #[test]
    fn test_malformed_xml_falls_back_to_text_scan() {
        let text = "<PAMDataset><SRS>AUTHORITY[\"EPSG\",\"26914\"]</SRS";
        let meta = parse_aux_metadata(Path::new("c.aux.xml"), text);
        assert_eq!(meta.epsg, Some(26914));
        assert!(meta.gcps.is_empty());
    }

    #[test]
    fn test_prj_file() {
        let meta = parse_aux_metadata(
            Path::new("d.prj"),
            r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],AUTHORITY["EPSG","4326"]]"#,
        );
        assert_eq!(meta.epsg, Some(4326));
        assert!(meta.srs.is_some());

        let empty = parse_aux_metadata(Path::new("e.prj"), "   ");
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_read_sidecars_in_priority_order() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("scene.sid");
        tokio::fs::write(dir.path().join("scene.prj"), "EPSG:3857").await.unwrap();
        tokio::fs::write(
            dir.path().join("scene.aux.xml"),
            "<PAMDataset><WKID>26914</WKID></PAMDataset>",
        )
        .await
        .unwrap();

        let found = read_sidecars(&input).await;
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].epsg, Some(26914));
        assert_eq!(found[1].epsg, Some(3857));
    }
}
