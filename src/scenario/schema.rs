//! On-disk scenario group schema. Unknown keys are rejected; missing
//! mandatory keys fail per-type at deserialization.

use std::collections::HashMap;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioGroupFile {
    pub tracon: String,
    pub name: String,
    pub airports: HashMap<String, AirportFile>,
    pub fixes: HashMap<String, String>,
    pub control_positions: HashMap<String, ControlPositionFile>,
    pub scenarios: HashMap<String, ScenarioFile>,
    pub inbound_flows: HashMap<String, InboundFlowFile>,
    pub airlines: HashMap<String, AirlineFile>,
    pub stars_config: StarsConfigFile,
    #[serde(default)]
    pub eram_adaptations: HashMap<String, EramAdaptationFile>,
    pub magnetic_variation: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AirportFile {
    pub location: String,
    pub elevation: f64,
    #[serde(default)]
    pub approaches: HashMap<String, ApproachFile>,
    /// runway -> SID -> route
    #[serde(default)]
    pub departure_routes: HashMap<String, HashMap<String, DepartureRouteFile>>,
    #[serde(default)]
    pub departures: Vec<DepartureFile>,
    #[serde(default)]
    pub exit_categories: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub tower_list: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApproachFile {
    #[serde(rename = "type")]
    pub kind: String, // "ILS", "RNAV", "visual"
    pub runway: String,
    pub course: f64,
    /// One or more transitions of waypoint strings.
    pub waypoints: Vec<String>,
    pub threshold: String,
    /// Derived from course and threshold when absent.
    #[serde(default)]
    pub localizer: Option<[String; 2]>,
    #[serde(default)]
    pub missed: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DepartureRouteFile {
    pub waypoints: String,
    #[serde(default)]
    pub initial_altitude: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DepartureFile {
    pub exit: String,
    pub destination: String,
    pub altitude: i32,
    #[serde(default)]
    pub airlines: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlPositionFile {
    /// Hz; must fall inside the VHF airband.
    pub frequency: u64,
    pub radio_name: String,
    pub sector_id: String,
    pub facility_id: String,
    pub eram_facility: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioFile {
    #[serde(default)]
    pub arrival_runways: Vec<ScenarioRunwayFile>,
    #[serde(default)]
    pub departure_runways: Vec<DepartureRunwayFile>,
    /// arrival group -> airport -> aircraft per hour
    #[serde(default)]
    pub inbound_rates: HashMap<String, HashMap<String, f64>>,
    #[serde(default)]
    pub solo_controller: Option<String>,
    #[serde(default)]
    pub multi_controllers: HashMap<String, MultiControllerFile>,
    #[serde(default)]
    pub controllers: Vec<String>,
    #[serde(default)]
    pub default_maps: Vec<String>,
    pub wind: WindFile,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioRunwayFile {
    pub airport: String,
    pub runway: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DepartureRunwayFile {
    pub airport: String,
    pub runway: String,
    /// departures per hour
    pub rate: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MultiControllerFile {
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub backup: Option<String>,
    /// Covered departures, as "airport/SID" or "airport/runway" tuples.
    #[serde(default)]
    pub departures: Vec<String>,
    /// Covered arrival groups.
    #[serde(default)]
    pub arrivals: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WindFile {
    pub direction: f64,
    pub speed: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InboundFlowFile {
    /// Common transition waypoints, with inline `/a`, `/s`, `/h`, `/ho`,
    /// and `/flyover` annotations.
    pub waypoints: String,
    /// airport -> arrival details
    pub arrivals: HashMap<String, ArrivalFile>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArrivalFile {
    pub airlines: Vec<String>,
    pub initial_altitude: f64,
    pub initial_speed: f64,
    pub initial_controller: String,
    /// Per-runway tail substitutions appended after the common waypoints.
    #[serde(default)]
    pub runway_waypoints: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AirlineFile {
    pub fleet: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StarsConfigFile {
    pub center: String,
    pub range: f64, // nm
    pub beacon_bank: u16,
    #[serde(default)]
    pub scratchpads: HashMap<String, String>,
    pub video_map_file: String,
    #[serde(default)]
    pub radar_sites: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EramAdaptationFile {
    /// fix -> routing entries, first match wins
    pub coordination_fixes: HashMap<String, Vec<CoordinationFixFile>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoordinationFixFile {
    #[serde(rename = "type")]
    pub kind: String, // "route" or "zone"
    pub to_facility: String,
    #[serde(default)]
    pub altitude_range: Option<[i32; 2]>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_key_is_error() {
        let json = r#"{"frequency": 120800000, "radio_name": "Approach",
                       "sector_id": "2W", "facility_id": "N90",
                       "eram_facility": "ZNY", "volume": 11}"#;
        assert!(serde_json::from_str::<ControlPositionFile>(json).is_err());
    }

    #[test]
    fn test_missing_mandatory_key_is_error() {
        let json = r#"{"radio_name": "Approach", "sector_id": "2W",
                       "facility_id": "N90", "eram_facility": "ZNY"}"#;
        assert!(serde_json::from_str::<ControlPositionFile>(json).is_err());
    }
}
