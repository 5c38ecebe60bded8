//! Video-map files: a JSON object whose values are arrays of position
//! strings, consecutive pairs forming polyline segments. A `.zst` suffix
//! means the file is zstd-compressed.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};

use crate::utils::geo::LatLon;

pub type VideoMap = Vec<[LatLon; 2]>;

pub fn load_video_map(path: &Path) -> Result<HashMap<String, VideoMap>> {
    let raw = std::fs::read(path).with_context(|| format!("failed to read {path:?}"))?;

    let bytes = if path.extension().and_then(|e| e.to_str()) == Some("zst") {
        zstd::decode_all(raw.as_slice()).with_context(|| format!("failed to decompress {path:?}"))?
    } else {
        raw
    };

    parse_video_map(&bytes)
}

pub fn parse_video_map(bytes: &[u8]) -> Result<HashMap<String, VideoMap>> {
    let raw: HashMap<String, Vec<String>> =
        serde_json::from_slice(bytes).context("failed to parse video map")?;

    let mut maps = HashMap::new();
    for (name, points) in raw {
        if points.len() % 2 != 0 {
            anyhow::bail!("map {name:?}: odd number of segment endpoints");
        }
        let mut segments = Vec::with_capacity(points.len() / 2);
        for pair in points.chunks_exact(2) {
            let a = LatLon::parse(&pair[0])
                .with_context(|| format!("map {name:?}: bad position {:?}", pair[0]))?;
            let b = LatLon::parse(&pair[1])
                .with_context(|| format!("map {name:?}: bad position {:?}", pair[1]))?;
            segments.push([a, b]);
        }
        maps.insert(name, segments);
    }
    Ok(maps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "JFK final": ["40.60, -73.70", "40.65, -73.75", "40.65, -73.75", "40.70, -73.80"],
        "shoreline": ["N040.30.00.000 W073.50.00.000", "40.55, -73.90"]
    }"#;

    #[test]
    fn test_parse_segments() {
        let maps = parse_video_map(SAMPLE.as_bytes()).unwrap();
        assert_eq!(maps["JFK final"].len(), 2);
        assert_eq!(maps["shoreline"].len(), 1);
        assert!((maps["shoreline"][0][0].lat - 40.5).abs() < 1e-9);
    }

    #[test]
    fn test_odd_point_count_is_error() {
        let bad = r#"{"oops": ["40.60, -73.70"]}"#;
        assert!(parse_video_map(bad.as_bytes()).is_err());
    }

    #[test]
    fn test_zstd_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maps.json.zst");
        let compressed = zstd::encode_all(SAMPLE.as_bytes(), 0).unwrap();
        std::fs::File::create(&path).unwrap().write_all(&compressed).unwrap();

        let maps = load_video_map(&path).unwrap();
        assert_eq!(maps.len(), 2);
    }
}
