/// Great-circle math and position parsing
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const EARTH_RADIUS_NM: f64 = 3440.065;

/// A position in decimal degrees, longitude west-negative.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Error)]
#[error("unrecognized position format: {0}")]
pub struct PositionParseError(pub String);

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn distance_nm(&self, other: &LatLon) -> f64 {
        haversine_nm(self.lat, self.lon, other.lat, other.lon)
    }

    /// True bearing from this position to another, 0-360.
    pub fn bearing_to(&self, other: &LatLon) -> f64 {
        let dlon = (other.lon - self.lon).to_radians();
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();

        let y = dlon.sin() * lat2.cos();
        let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();

        normalize_heading(y.atan2(x).to_degrees())
    }

    /// Destination point given a true bearing and distance.
    pub fn offset(&self, bearing_deg: f64, distance_nm: f64) -> LatLon {
        let lat_rad = self.lat.to_radians();
        let lon_rad = self.lon.to_radians();
        let bearing_rad = bearing_deg.to_radians();
        let angular = distance_nm / EARTH_RADIUS_NM;

        let dest_lat = (lat_rad.sin() * angular.cos()
            + lat_rad.cos() * angular.sin() * bearing_rad.cos())
        .asin();
        let dest_lon = lon_rad
            + (bearing_rad.sin() * angular.sin() * lat_rad.cos())
                .atan2(angular.cos() - lat_rad.sin() * dest_lat.sin());

        LatLon::new(dest_lat.to_degrees(), dest_lon.to_degrees())
    }

    /// Parse any of the recognized position forms:
    /// `N040.38.23.000 W073.46.44.000`, a decimal `lat, lon` pair, or the
    /// compact `+403823.000-0734644.000`.
    pub fn parse(s: &str) -> Result<LatLon, PositionParseError> {
        let trimmed = s.trim();

        if let Some(p) = parse_compact(trimmed) {
            return Ok(p);
        }
        if let Some(p) = parse_hemisphere_pair(trimmed) {
            return Ok(p);
        }
        if let Some(p) = parse_decimal_pair(trimmed) {
            return Ok(p);
        }

        Err(PositionParseError(s.to_string()))
    }
}

pub fn haversine_nm(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();

    let a = (dlat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_NM * c
}

/// Normalize heading to [0, 360).
pub fn normalize_heading(heading: f64) -> f64 {
    let mut h = heading % 360.0;
    if h < 0.0 {
        h += 360.0;
    }
    if h >= 360.0 {
        h = 0.0;
    }
    h
}

/// Signed difference target - current, in (-180, 180].
pub fn heading_difference(current: f64, target: f64) -> f64 {
    let mut diff = normalize_heading(target) - normalize_heading(current);
    if diff > 180.0 {
        diff -= 360.0;
    } else if diff <= -180.0 {
        diff += 360.0;
    }
    diff
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnDirection {
    Left,
    Right,
}

pub fn shortest_turn_direction(current: f64, target: f64) -> TurnDirection {
    if heading_difference(current, target) >= 0.0 {
        TurnDirection::Right
    } else {
        TurnDirection::Left
    }
}

/// Local flat projection around a scene center. One unit = one nautical mile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NmScale {
    pub center: LatLon,
    pub nm_per_lat: f64,
    pub nm_per_lon: f64,
}

impl NmScale {
    pub fn from_center(center: LatLon) -> Self {
        Self {
            center,
            nm_per_lat: 60.0,
            nm_per_lon: 60.0 * center.lat.to_radians().cos(),
        }
    }

    /// Project to nm coordinates, x east, y north.
    pub fn to_nm(&self, p: &LatLon) -> (f64, f64) {
        (
            (p.lon - self.center.lon) * self.nm_per_lon,
            (p.lat - self.center.lat) * self.nm_per_lat,
        )
    }

    pub fn from_nm(&self, x: f64, y: f64) -> LatLon {
        LatLon::new(
            self.center.lat + y / self.nm_per_lat,
            self.center.lon + x / self.nm_per_lon,
        )
    }
}

/// Signed perpendicular distance from `p` to the infinite line through `a`
/// and `b`, all in nm coordinates. Positive to the left of a->b.
pub fn signed_line_distance(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len = (dx * dx + dy * dy).sqrt();
    if len < 1e-9 {
        return ((p.0 - a.0).powi(2) + (p.1 - a.1).powi(2)).sqrt();
    }
    -((p.0 - a.0) * dy - (p.1 - a.1) * dx) / len
}

/// Distance along a heading ray from `p` until it crosses the line a->b.
/// Returns None when the ray runs parallel or the crossing is behind `p`.
pub fn ray_line_intersection_distance(
    p: (f64, f64),
    heading_deg: f64,
    a: (f64, f64),
    b: (f64, f64),
) -> Option<f64> {
    // Heading 0 = north (+y), 90 = east (+x).
    let dir = (heading_deg.to_radians().sin(), heading_deg.to_radians().cos());
    let line = (b.0 - a.0, b.1 - a.1);

    let denom = dir.0 * line.1 - dir.1 * line.0;
    if denom.abs() < 1e-9 {
        return None;
    }

    let t = ((a.0 - p.0) * line.1 - (a.1 - p.1) * line.0) / denom;
    if t < 0.0 {
        None
    } else {
        Some(t)
    }
}

fn parse_decimal_pair(s: &str) -> Option<LatLon> {
    let mut parts = s.split(',');
    let lat: f64 = parts.next()?.trim().parse().ok()?;
    let lon: f64 = parts.next()?.trim().parse().ok()?;
    if parts.next().is_some() || !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon)
    {
        return None;
    }
    Some(LatLon::new(lat, lon))
}

/// `N dd.mm.ss.sss` / `W ddd.mm.ss.sss` pairs, comma or whitespace separated.
fn parse_hemisphere_pair(s: &str) -> Option<LatLon> {
    let cleaned = s.replace(',', " ");
    let mut parts = cleaned.split_whitespace();
    let lat = parse_hemisphere_component(parts.next()?, 'N', 'S')?;
    let lon = parse_hemisphere_component(parts.next()?, 'E', 'W')?;
    if parts.next().is_some() {
        return None;
    }
    Some(LatLon::new(lat, lon))
}

fn parse_hemisphere_component(s: &str, positive: char, negative: char) -> Option<f64> {
    let first = s.chars().next()?.to_ascii_uppercase();
    let sign = if first == positive {
        1.0
    } else if first == negative {
        -1.0
    } else {
        return None;
    };

    let fields: Vec<&str> = s[1..].split('.').collect();
    if fields.len() != 4 {
        return None;
    }
    let degrees: f64 = fields[0].parse().ok()?;
    let minutes: f64 = fields[1].parse().ok()?;
    let seconds: f64 = fields[2].parse().ok()?;
    let millis: f64 = fields[3].parse().ok()?;

    Some(sign * (degrees + minutes / 60.0 + seconds / 3600.0 + millis / 3_600_000.0))
}

/// Compact `+ddmmss.sss+dddmmss.sss` form.
fn parse_compact(s: &str) -> Option<LatLon> {
    let re = Regex::new(
        r"^([+-])(\d{2})(\d{2})(\d{2}(?:\.\d+)?)\s*([+-])(\d{3})(\d{2})(\d{2}(?:\.\d+)?)$",
    )
    .ok()?;
    let caps = re.captures(s)?;

    let component = |sign: &str, d: &str, m: &str, sec: &str| -> Option<f64> {
        let deg: f64 = d.parse().ok()?;
        let min: f64 = m.parse().ok()?;
        let sec: f64 = sec.parse().ok()?;
        let v = deg + min / 60.0 + sec / 3600.0;
        Some(if sign == "-" { -v } else { v })
    };

    Some(LatLon::new(
        component(&caps[1], &caps[2], &caps[3], &caps[4])?,
        component(&caps[5], &caps[6], &caps[7], &caps[8])?,
    ))
}
