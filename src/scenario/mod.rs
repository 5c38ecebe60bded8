//! Runtime scenario model: airports, fixes, approaches, arrival flows,
//! controller positions, and the STARS/ERAM adaptations. Immutable once
//! validation has passed.

pub mod schema;
pub mod video_map;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aircraft::{Approach, ApproachKind, Waypoint, Wind};
use crate::utils::geo::{LatLon, NmScale};

/// Accumulates load-time defects with a push/pop context stack so every
/// scenario's problems are reported together before exit.
#[derive(Debug, Default)]
pub struct ErrorLogger {
    context: Vec<String>,
    errors: Vec<String>,
}

impl ErrorLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, context: impl Into<String>) {
        self.context.push(context.into());
    }

    pub fn pop(&mut self) {
        self.context.pop();
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let mut line = self.context.join(" / ");
        if !line.is_empty() {
            line.push_str(": ");
        }
        line.push_str(&message.into());
        self.errors.push(line);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn report(&self) -> String {
        self.errors.join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlPosition {
    pub callsign: String,
    pub frequency: u64, // Hz
    pub radio_name: String,
    pub sector_id: String,
    pub facility_id: String,
    pub eram_facility: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DepartureRoute {
    pub waypoints: Vec<Waypoint>,
    pub initial_altitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Departure {
    pub exit: String,
    pub destination: String,
    pub altitude: i32,
    pub airlines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Airport {
    pub icao: String,
    pub location: LatLon,
    pub elevation: f64,
    pub approaches: HashMap<String, Approach>,
    /// runway -> SID -> route
    pub departure_routes: HashMap<String, HashMap<String, DepartureRoute>>,
    pub departures: Vec<Departure>,
    pub exit_categories: HashMap<String, Vec<String>>,
    pub tower_list: Option<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Arrival {
    pub airlines: Vec<String>,
    pub initial_altitude: f64,
    pub initial_speed: f64,
    pub initial_controller: String,
    pub runway_waypoints: HashMap<String, Vec<Waypoint>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InboundFlow {
    pub waypoints: Vec<Waypoint>,
    pub arrivals: HashMap<String, Arrival>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultiController {
    pub primary: bool,
    pub backup: Option<String>,
    pub departures: Vec<String>,
    pub arrivals: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DepartureRunway {
    pub airport: String,
    pub runway: String,
    pub rate: f64, // departures per hour
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrivalRunway {
    pub airport: String,
    pub runway: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub name: String,
    pub arrival_runways: Vec<ArrivalRunway>,
    pub departure_runways: Vec<DepartureRunway>,
    /// arrival group -> airport -> aircraft per hour
    pub inbound_rates: HashMap<String, HashMap<String, f64>>,
    pub solo_controller: Option<String>,
    pub multi_controllers: HashMap<String, MultiController>,
    pub controllers: Vec<String>,
    pub default_maps: Vec<String>,
    pub wind: Wind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StarsAdaptation {
    pub center: LatLon,
    pub range_nm: f64,
    pub beacon_bank: u16,
    pub scratchpads: HashMap<String, String>,
    pub video_map_file: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinationKind {
    RouteBased,
    ZoneBased,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationFix {
    pub kind: CoordinationKind,
    pub to_facility: String,
    pub altitude_range: Option<[i32; 2]>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EramAdaptation {
    /// Sorted keys give deterministic first-match-wins resolution.
    pub coordination_fixes: BTreeMap<String, Vec<CoordinationFix>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioGroup {
    pub tracon: String,
    pub name: String,
    pub airports: HashMap<String, Airport>,
    pub fixes: HashMap<String, LatLon>,
    pub control_positions: HashMap<String, ControlPosition>,
    pub scenarios: HashMap<String, Scenario>,
    pub inbound_flows: HashMap<String, InboundFlow>,
    pub airlines: HashMap<String, Vec<String>>,
    pub stars: StarsAdaptation,
    pub eram_adaptations: HashMap<String, EramAdaptation>,
    pub mag_var: f64,
    pub scale: NmScale,
}

const MAX_BACKUP_HOPS: usize = 25;
const FREQUENCY_MIN: u64 = 118_000_000;
const FREQUENCY_MAX: u64 = 138_000_000;

/// A small single-airport scenario group, served when no scenario
/// directory is configured and used throughout the test suite.
pub const BUILTIN_GROUP_JSON: &str = include_str!("sample_group.json");

impl ScenarioGroup {
    pub fn builtin() -> ScenarioGroup {
        ScenarioGroup::from_json(BUILTIN_GROUP_JSON)
            .expect("the built-in scenario group must validate")
    }

    /// Parse and validate a scenario group from its JSON text. All defects
    /// are collected and reported together.
    pub fn from_json(text: &str) -> Result<ScenarioGroup> {
        let file: schema::ScenarioGroupFile =
            serde_json::from_str(text).context("failed to parse scenario group")?;

        let mut log = ErrorLogger::new();
        let group = ScenarioGroup::build(file, &mut log);
        match group {
            Some(group) if !log.has_errors() => Ok(group),
            _ => anyhow::bail!("scenario group has errors:\n{}", log.report()),
        }
    }

    fn build(file: schema::ScenarioGroupFile, log: &mut ErrorLogger) -> Option<ScenarioGroup> {
        log.push(file.name.clone());

        let center = match LatLon::parse(&file.stars_config.center) {
            Ok(p) => p,
            Err(e) => {
                log.error(format!("stars center: {e}"));
                log.pop();
                return None;
            }
        };
        let scale = NmScale::from_center(center);

        // Named fixes first; airports also resolve as fixes below.
        let mut fixes = HashMap::new();
        for (name, pos) in &file.fixes {
            match LatLon::parse(pos) {
                Ok(p) => {
                    fixes.insert(name.clone(), p);
                }
                Err(e) => log.error(format!("fix {name}: {e}")),
            }
        }
        for (icao, airport) in &file.airports {
            match LatLon::parse(&airport.location) {
                Ok(p) => {
                    fixes.insert(icao.clone(), p);
                }
                Err(e) => log.error(format!("airport {icao}: {e}")),
            }
        }

        let mut airports = HashMap::new();
        for (icao, af) in &file.airports {
            log.push(format!("airport {icao}"));
            if icao.len() > 4 {
                log.error("airport code too long");
            }
            let Some(&location) = fixes.get(icao) else {
                log.pop();
                continue;
            };

            let mut approaches = HashMap::new();
            for (id, approach) in &af.approaches {
                log.push(format!("approach {id}"));
                if let Some(a) = build_approach(id, approach, &fixes, log) {
                    approaches.insert(id.clone(), a);
                }
                log.pop();
            }

            let mut departure_routes = HashMap::new();
            for (runway, sids) in &af.departure_routes {
                let mut by_sid = HashMap::new();
                for (sid, route) in sids {
                    log.push(format!("departure {runway}/{sid}"));
                    by_sid.insert(
                        sid.clone(),
                        DepartureRoute {
                            waypoints: parse_waypoint_string(&route.waypoints, &fixes, log),
                            initial_altitude: route.initial_altitude,
                        },
                    );
                    log.pop();
                }
                departure_routes.insert(runway.clone(), by_sid);
            }

            let departures = af
                .departures
                .iter()
                .map(|d| Departure {
                    exit: d.exit.clone(),
                    destination: d.destination.clone(),
                    altitude: d.altitude,
                    airlines: d.airlines.clone(),
                })
                .collect();

            airports.insert(
                icao.clone(),
                Airport {
                    icao: icao.clone(),
                    location,
                    elevation: af.elevation,
                    approaches,
                    departure_routes,
                    departures,
                    exit_categories: af.exit_categories.clone(),
                    tower_list: af.tower_list,
                },
            );
            log.pop();
        }

        let mut control_positions = HashMap::new();
        for (callsign, cp) in &file.control_positions {
            log.push(format!("position {callsign}"));
            if !(FREQUENCY_MIN..=FREQUENCY_MAX).contains(&cp.frequency) {
                log.error(format!("frequency {} outside the VHF airband", cp.frequency));
            }
            control_positions.insert(
                callsign.clone(),
                ControlPosition {
                    callsign: callsign.clone(),
                    frequency: cp.frequency,
                    radio_name: cp.radio_name.clone(),
                    sector_id: cp.sector_id.clone(),
                    facility_id: cp.facility_id.clone(),
                    eram_facility: cp.eram_facility.clone(),
                },
            );
            log.pop();
        }

        let mut inbound_flows = HashMap::new();
        for (group_name, flow) in &file.inbound_flows {
            log.push(format!("inbound flow {group_name}"));
            let waypoints = parse_waypoint_string(&flow.waypoints, &fixes, log);

            let mut arrivals = HashMap::new();
            for (icao, arrival) in &flow.arrivals {
                log.push(format!("arrival {icao}"));
                if !file.airports.contains_key(icao) {
                    log.error("references an undefined airport");
                }
                for airline in &arrival.airlines {
                    if !file.airlines.contains_key(airline) {
                        log.error(format!("references undefined airline {airline}"));
                    }
                }
                for wp in &waypoints {
                    if let Some(alt) = wp.altitude_constraint {
                        if arrival.initial_altitude < alt {
                            log.error(format!(
                                "initial altitude {} below downstream restriction {} at {}",
                                arrival.initial_altitude, alt, wp.fix
                            ));
                        }
                    }
                }
                let mut runway_waypoints = HashMap::new();
                for (runway, tail) in &arrival.runway_waypoints {
                    runway_waypoints
                        .insert(runway.clone(), parse_waypoint_string(tail, &fixes, log));
                }
                arrivals.insert(
                    icao.clone(),
                    Arrival {
                        airlines: arrival.airlines.clone(),
                        initial_altitude: arrival.initial_altitude,
                        initial_speed: arrival.initial_speed,
                        initial_controller: arrival.initial_controller.clone(),
                        runway_waypoints,
                    },
                );
                log.pop();
            }
            inbound_flows.insert(group_name.clone(), InboundFlow { waypoints, arrivals });
            log.pop();
        }

        let mut scenarios = HashMap::new();
        for (name, sf) in &file.scenarios {
            log.push(format!("scenario {name}"));
            let scenario = Scenario {
                name: name.clone(),
                arrival_runways: sf
                    .arrival_runways
                    .iter()
                    .map(|r| ArrivalRunway { airport: r.airport.clone(), runway: r.runway.clone() })
                    .collect(),
                departure_runways: sf
                    .departure_runways
                    .iter()
                    .map(|r| DepartureRunway {
                        airport: r.airport.clone(),
                        runway: r.runway.clone(),
                        rate: r.rate,
                    })
                    .collect(),
                inbound_rates: sf.inbound_rates.clone(),
                solo_controller: sf.solo_controller.clone(),
                multi_controllers: sf
                    .multi_controllers
                    .iter()
                    .map(|(k, v)| {
                        (
                            k.clone(),
                            MultiController {
                                primary: v.primary,
                                backup: v.backup.clone(),
                                departures: v.departures.clone(),
                                arrivals: v.arrivals.clone(),
                            },
                        )
                    })
                    .collect(),
                controllers: sf.controllers.clone(),
                default_maps: sf.default_maps.clone(),
                wind: Wind { direction: sf.wind.direction, speed: sf.wind.speed },
            };
            validate_scenario(&scenario, &file, &control_positions, &inbound_flows, log);
            scenarios.insert(name.clone(), scenario);
            log.pop();
        }

        let mut eram_adaptations = HashMap::new();
        for (artcc, ad) in &file.eram_adaptations {
            log.push(format!("eram {artcc}"));
            let mut coordination_fixes = BTreeMap::new();
            for (fix, entries) in &ad.coordination_fixes {
                if !fixes.contains_key(fix) {
                    log.error(format!("coordination fix {fix} is not locatable"));
                }
                let parsed: Vec<_> = entries
                    .iter()
                    .filter_map(|e| {
                        let kind = match e.kind.as_str() {
                            "route" => CoordinationKind::RouteBased,
                            "zone" => CoordinationKind::ZoneBased,
                            other => {
                                log.error(format!("unknown coordination type {other:?}"));
                                return None;
                            }
                        };
                        Some(CoordinationFix {
                            kind,
                            to_facility: e.to_facility.clone(),
                            altitude_range: e.altitude_range,
                        })
                    })
                    .collect();
                coordination_fixes.insert(fix.clone(), parsed);
            }
            eram_adaptations.insert(artcc.clone(), EramAdaptation { coordination_fixes });
            log.pop();
        }

        let stars = StarsAdaptation {
            center,
            range_nm: file.stars_config.range,
            beacon_bank: file.stars_config.beacon_bank,
            scratchpads: file.stars_config.scratchpads.clone(),
            video_map_file: file.stars_config.video_map_file.clone(),
        };

        log.pop();

        Some(ScenarioGroup {
            tracon: file.tracon,
            name: file.name,
            airports,
            fixes,
            control_positions,
            scenarios,
            inbound_flows,
            airlines: file.airlines.iter().map(|(k, v)| (k.clone(), v.fleet.clone())).collect(),
            stars,
            eram_adaptations,
            mag_var: file.magnetic_variation,
            scale,
        })
    }

    /// Check the scenarios' default maps against the names the video-map
    /// file actually provides.
    pub fn validate_maps(&self, available: &HashSet<String>, log: &mut ErrorLogger) {
        for scenario in self.scenarios.values() {
            for map in &scenario.default_maps {
                if !available.contains(map) {
                    log.error(format!(
                        "scenario {}: default map {map:?} not in {}",
                        scenario.name, self.stars.video_map_file
                    ));
                }
            }
        }
    }

    pub fn fix_location(&self, name: &str) -> Option<LatLon> {
        self.fixes.get(name).copied()
    }
}

fn validate_scenario(
    scenario: &Scenario,
    file: &schema::ScenarioGroupFile,
    control_positions: &HashMap<String, ControlPosition>,
    inbound_flows: &HashMap<String, InboundFlow>,
    log: &mut ErrorLogger,
) {
    if let Some(solo) = &scenario.solo_controller {
        if !control_positions.contains_key(solo) {
            log.error(format!("solo controller {solo} is not a control position"));
        }
    }
    for callsign in scenario.multi_controllers.keys().chain(scenario.controllers.iter()) {
        if !control_positions.contains_key(callsign) {
            log.error(format!("controller {callsign} is not a control position"));
        }
    }

    // Multi-controller splits: one primary, everyone reaches it by backup.
    if !scenario.multi_controllers.is_empty() {
        let primaries: Vec<_> = scenario
            .multi_controllers
            .iter()
            .filter(|(_, mc)| mc.primary)
            .map(|(cs, _)| cs.clone())
            .collect();
        if primaries.len() != 1 {
            log.error(format!(
                "multi-controller split has {} primaries, want exactly one",
                primaries.len()
            ));
        } else {
            let primary = &primaries[0];
            for (callsign, _) in scenario.multi_controllers.iter().filter(|(_, m)| !m.primary) {
                let mut current = callsign.clone();
                let mut reached = false;
                for _ in 0..MAX_BACKUP_HOPS {
                    match scenario.multi_controllers.get(&current).and_then(|m| m.backup.clone())
                    {
                        Some(next) if next == *primary => {
                            reached = true;
                            break;
                        }
                        Some(next) => current = next,
                        None => break,
                    }
                }
                if !reached {
                    log.error(format!(
                        "controller {callsign} cannot reach primary {primary} through backups"
                    ));
                }
            }
        }

        // Every active departure is covered by exactly one controller.
        for dep in &scenario.departure_runways {
            let Some(airport) = file.airports.get(&dep.airport) else {
                log.error(format!("departure airport {} is undefined", dep.airport));
                continue;
            };
            let sids: Vec<String> = airport
                .departure_routes
                .get(&dep.runway)
                .map(|m| m.keys().cloned().collect())
                .unwrap_or_default();
            for sid in sids {
                let sid_key = format!("{}/{}", dep.airport, sid);
                let runway_key = format!("{}/{}", dep.airport, dep.runway);
                let covering = scenario
                    .multi_controllers
                    .values()
                    .filter(|mc| {
                        mc.departures.contains(&sid_key) || mc.departures.contains(&runway_key)
                    })
                    .count();
                if covering != 1 {
                    log.error(format!(
                        "departure {sid_key} is covered by {covering} controllers, want exactly one"
                    ));
                }
            }
        }
    }

    for (group, rates) in &scenario.inbound_rates {
        match inbound_flows.get(group) {
            None => log.error(format!("arrival group {group} has no inbound flow")),
            Some(flow) => {
                for airport in rates.keys() {
                    if !flow.arrivals.contains_key(airport) {
                        log.error(format!(
                            "arrival group {group} has a rate for {airport} but no arrival"
                        ));
                    }
                }
            }
        }
    }
}

fn build_approach(
    id: &str,
    af: &schema::ApproachFile,
    fixes: &HashMap<String, LatLon>,
    log: &mut ErrorLogger,
) -> Option<Approach> {
    let kind = match af.kind.as_str() {
        "ILS" => ApproachKind::Ils,
        "RNAV" => ApproachKind::Rnav,
        "visual" => ApproachKind::Visual,
        other => {
            log.error(format!("unknown approach type {other:?}"));
            return None;
        }
    };

    let threshold = match LatLon::parse(&af.threshold) {
        Ok(p) => p,
        Err(e) => {
            log.error(format!("threshold: {e}"));
            return None;
        }
    };

    let localizer = match &af.localizer {
        Some([a, b]) => {
            let a = LatLon::parse(a).map_err(|e| log.error(format!("localizer: {e}"))).ok()?;
            let b = LatLon::parse(b).map_err(|e| log.error(format!("localizer: {e}"))).ok()?;
            [a, b]
        }
        // Extend the final approach course out 15 nm from the threshold.
        None => [threshold.offset(crate::utils::geo::normalize_heading(af.course + 180.0), 15.0), threshold],
    };

    let waypoints = af
        .waypoints
        .iter()
        .map(|transition| parse_waypoint_string(transition, fixes, log))
        .collect();

    let missed = af
        .missed
        .as_ref()
        .map(|m| parse_waypoint_string(m, fixes, log))
        .unwrap_or_default();

    Some(Approach {
        id: id.to_string(),
        kind,
        runway: af.runway.clone(),
        course: af.course,
        waypoints,
        localizer,
        threshold,
        missed,
    })
}

/// Parse a waypoint string: fix names separated by whitespace, each with
/// optional `/a<alt>`, `/s<spd>`, `/h<hdg>`, `/ho`, and `/flyover`
/// annotations. Unresolvable fixes are reported, not fatal.
pub fn parse_waypoint_string(
    s: &str,
    fixes: &HashMap<String, LatLon>,
    log: &mut ErrorLogger,
) -> Vec<Waypoint> {
    let mut waypoints = Vec::new();

    for token in s.split_whitespace() {
        let mut parts = token.split('/');
        let name = parts.next().unwrap_or_default();

        let Some(&location) = fixes.get(name) else {
            log.error(format!("waypoint {name} is not locatable"));
            continue;
        };
        let mut wp = Waypoint::at(name, location);

        for annotation in parts {
            if annotation == "ho" {
                wp.handoff = true;
            } else if annotation == "flyover" {
                wp.flyover = true;
            } else if let Some(v) = annotation.strip_prefix('a') {
                match v.parse::<f64>() {
                    Ok(alt) => wp.altitude_constraint = Some(alt),
                    Err(_) => log.error(format!("waypoint {name}: bad altitude {v:?}")),
                }
            } else if let Some(v) = annotation.strip_prefix('s') {
                match v.parse::<f64>() {
                    Ok(spd) => wp.speed_constraint = Some(spd),
                    Err(_) => log.error(format!("waypoint {name}: bad speed {v:?}")),
                }
            } else if let Some(v) = annotation.strip_prefix('h') {
                match v.parse::<f64>() {
                    Ok(h) => wp.depart_heading = Some(h),
                    Err(_) => log.error(format!("waypoint {name}: bad heading {v:?}")),
                }
            } else {
                log.error(format!("waypoint {name}: unknown annotation {annotation:?}"));
            }
        }
        waypoints.push(wp);
    }

    waypoints
}

/// Load every scenario group under `dir`, collecting all defects and
/// reporting them together.
pub fn load_scenario_groups(dir: &Path) -> Result<HashMap<String, ScenarioGroup>> {
    let mut groups = HashMap::new();
    let mut log = ErrorLogger::new();

    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read scenario directory {dir:?}"))?;
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }

        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {path:?}"))?;
        let file: schema::ScenarioGroupFile = match serde_json::from_str(&text) {
            Ok(f) => f,
            Err(e) => {
                log.error(format!("{path:?}: {e}"));
                continue;
            }
        };

        if let Some(group) = ScenarioGroup::build(file, &mut log) {
            // Validate default maps against the video-map file, when present.
            let map_path = dir.join(&group.stars.video_map_file);
            if map_path.exists() {
                match video_map::load_video_map(&map_path) {
                    Ok(maps) => {
                        let names: HashSet<String> = maps.keys().cloned().collect();
                        group.validate_maps(&names, &mut log);
                    }
                    Err(e) => log.error(format!("{}: {e}", group.stars.video_map_file)),
                }
            } else {
                log.error(format!(
                    "{}: video map file {} does not exist",
                    group.name, group.stars.video_map_file
                ));
            }
            info!("[SCENARIO] loaded {} ({})", group.name, group.tracon);
            groups.insert(group.name.clone(), group);
        }
    }

    if log.has_errors() {
        anyhow::bail!("scenario validation failed:\n{}", log.report());
    }
    if groups.is_empty() {
        anyhow::bail!("no scenario groups found in {dir:?}");
    }
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_GROUP: &str = BUILTIN_GROUP_JSON;

    #[test]
    fn test_sample_group_loads() {
        let group = ScenarioGroup::from_json(SAMPLE_GROUP).unwrap();
        assert_eq!(group.tracon, "N90");
        assert!(group.airports.contains_key("KJFK"));
        assert!(group.scenarios.contains_key("South Flow"));
        assert!(group.fix_location("CAMRN").is_some());
    }

    #[test]
    fn test_waypoint_annotations() {
        let group = ScenarioGroup::from_json(SAMPLE_GROUP).unwrap();
        let flow = &group.inbound_flows["CAMRN"];
        let wp = flow.waypoints.iter().find(|w| w.fix == "CAMRN").unwrap();
        assert_eq!(wp.altitude_constraint, Some(8000.0));
        assert_eq!(wp.speed_constraint, Some(250.0));
        assert!(wp.handoff);
    }

    #[test]
    fn test_unlocatable_waypoint_is_collected() {
        let mut log = ErrorLogger::new();
        log.push("test");
        let fixes = HashMap::new();
        let wps = parse_waypoint_string("NOWHERE/a5000", &fixes, &mut log);
        assert!(wps.is_empty());
        assert!(log.has_errors());
        assert!(log.report().contains("NOWHERE"));
    }

    #[test]
    fn test_bad_frequency_is_rejected() {
        let text = SAMPLE_GROUP.replace("120800000", "90000000");
        let err = ScenarioGroup::from_json(&text).unwrap_err();
        assert!(err.to_string().contains("airband"));
    }

    #[test]
    fn test_split_requires_exactly_one_primary() {
        let text = SAMPLE_GROUP.replace("\"primary\": true", "\"primary\": false");
        let err = ScenarioGroup::from_json(&text).unwrap_err();
        assert!(err.to_string().contains("primaries"));
    }

    #[test]
    fn test_error_logger_context() {
        let mut log = ErrorLogger::new();
        log.push("KJFK");
        log.push("approach I22L");
        log.error("threshold missing");
        log.pop();
        log.pop();
        assert_eq!(log.report(), "KJFK / approach I22L: threshold missing");
    }
}
