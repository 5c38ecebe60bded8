use serde::{Deserialize, Serialize};

use crate::utils::geo::LatLon;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlightRules {
    Ifr,
    Vfr,
}

/// Flight plan information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightPlan {
    pub rules: FlightRules,
    pub aircraft_type: String,
    pub departure: String,
    pub arrival: String,
    pub route: String,
    pub cruise_altitude: i32, // feet
}

impl FlightPlan {
    pub fn new(
        rules: FlightRules,
        aircraft_type: impl Into<String>,
        departure: impl Into<String>,
        arrival: impl Into<String>,
        route: impl Into<String>,
        cruise_altitude: i32,
    ) -> Self {
        Self {
            rules,
            aircraft_type: aircraft_type.into(),
            departure: departure.into(),
            arrival: arrival.into(),
            route: route.into(),
            cruise_altitude,
        }
    }

    /// True when `fix` appears as a token of the route string.
    pub fn route_contains(&self, fix: &str) -> bool {
        self.route.split_whitespace().any(|t| t == fix)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArcDirection {
    Clockwise,
    CounterClockwise,
}

/// DME arc leg: either centered on a fix or given by arc length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DmeArc {
    pub center: Option<LatLon>,
    pub length_nm: Option<f64>,
    pub direction: ArcDirection,
}

/// One element of an aircraft's assigned route, consumed head-first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub fix: String,
    pub location: LatLon,
    pub altitude_constraint: Option<f64>, // feet
    pub speed_constraint: Option<f64>,    // knots
    pub depart_heading: Option<f64>,      // degrees, applied after passage
    pub arc: Option<DmeArc>,
    pub flyover: bool,
    pub handoff: bool, // inter-facility handoff is initiated at this fix
}

impl Waypoint {
    pub fn at(fix: impl Into<String>, location: LatLon) -> Self {
        Self {
            fix: fix.into(),
            location,
            altitude_constraint: None,
            speed_constraint: None,
            depart_heading: None,
            arc: None,
            flyover: false,
            handoff: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApproachKind {
    Ils,
    Rnav,
    Visual,
}

impl std::fmt::Display for ApproachKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApproachKind::Ils => write!(f, "ILS"),
            ApproachKind::Rnav => write!(f, "RNAV"),
            ApproachKind::Visual => write!(f, "visual"),
        }
    }
}

/// A published instrument approach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Approach {
    pub id: String,
    pub kind: ApproachKind,
    pub runway: String,
    /// Final approach course, magnetic.
    pub course: f64,
    /// One or more transitions; the first is the default.
    pub waypoints: Vec<Vec<Waypoint>>,
    /// Localizer line from the outer endpoint to the threshold.
    pub localizer: [LatLon; 2],
    pub threshold: LatLon,
    /// Published missed approach, flown on a go-around.
    pub missed: Vec<Waypoint>,
}

impl Approach {
    pub fn default_transition(&self) -> &[Waypoint] {
        self.waypoints.first().map(Vec::as_slice).unwrap_or(&[])
    }
}

/// An approach assignment held by an aircraft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApproachClearance {
    pub approach: Approach,
    pub straight_in: bool,
    /// False while the approach is only expected, true once cleared.
    pub cleared: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_contains() {
        let fp = FlightPlan::new(
            FlightRules::Ifr,
            "B738",
            "KJFK",
            "KBOS",
            "MERIT ROBUC3",
            24000,
        );
        assert!(fp.route_contains("MERIT"));
        assert!(!fp.route_contains("MER"));
    }
}
