//! Facility message fabric: the ERAM/STARS flight-data plane. A single
//! `Fabric` owns every node and delivers messages by facility id, so there
//! are no reference cycles between computers.

pub mod messages;
pub mod squawk;

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::fabric::messages::{FlightPlanMessage, MessageKind, TrackInfo};
use crate::fabric::squawk::{Squawk, SquawkPool};
use crate::scenario::{CoordinationKind, EramAdaptation};
use crate::utils::geo::LatLon;

/// Enroute automation node, keyed by ARTCC id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EramComputer {
    pub artcc: String,
    pub inbox: Vec<FlightPlanMessage>,
    pub flight_plans: BTreeMap<Squawk, FlightPlanMessage>,
    pub track_info: BTreeMap<String, TrackInfo>,
    pub squawk_pool: SquawkPool,
    pub adaptation: EramAdaptation,
}

/// Terminal automation node, keyed by TRACON id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StarsComputer {
    pub tracon: String,
    pub parent_artcc: String,
    pub inbox: Vec<FlightPlanMessage>,
    pub plans: BTreeMap<Squawk, FlightPlanMessage>,
    pub track_info: BTreeMap<String, TrackInfo>,
    pub squawk_pool: SquawkPool,
    pub beacon_bank: u16,
}

/// Posted while sorting; the session converts these into controller events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FabricEvent {
    DataAcceptance { flight_id: String, facility: String },
    DataRejection { flight_id: String, facility: String },
}

/// Aircraft state the coordination-fix resolution needs.
#[derive(Debug, Clone, PartialEq)]
pub struct FlightSnapshot {
    pub position: LatLon,
    pub waypoint_fixes: Vec<String>,
}

pub type FlightTable = HashMap<String, FlightSnapshot>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fabric {
    pub erams: BTreeMap<String, EramComputer>,
    pub stars: BTreeMap<String, StarsComputer>,
}

enum Action {
    ForwardToStars(String, FlightPlanMessage),
    ForwardToEram(String, FlightPlanMessage),
    Emit(FabricEvent),
    ReleaseEram(String, Squawk),
}

impl Fabric {
    pub fn new() -> Self {
        Self { erams: BTreeMap::new(), stars: BTreeMap::new() }
    }

    pub fn add_eram(&mut self, artcc: impl Into<String>, adaptation: EramAdaptation) {
        let artcc = artcc.into();
        self.erams.insert(
            artcc.clone(),
            EramComputer {
                artcc,
                inbox: Vec::new(),
                flight_plans: BTreeMap::new(),
                track_info: BTreeMap::new(),
                squawk_pool: SquawkPool::eram(),
                adaptation,
            },
        );
    }

    pub fn add_stars(
        &mut self,
        tracon: impl Into<String>,
        parent_artcc: impl Into<String>,
        beacon_bank: u16,
    ) {
        let tracon = tracon.into();
        self.stars.insert(
            tracon.clone(),
            StarsComputer {
                tracon,
                parent_artcc: parent_artcc.into(),
                inbox: Vec::new(),
                plans: BTreeMap::new(),
                track_info: BTreeMap::new(),
                squawk_pool: SquawkPool::stars(beacon_bank),
                beacon_bank,
            },
        );
    }

    pub fn post_to_eram(&mut self, artcc: &str, msg: FlightPlanMessage) -> bool {
        match self.erams.get_mut(artcc) {
            Some(eram) => {
                eram.inbox.push(msg);
                true
            }
            None => false,
        }
    }

    pub fn post_to_stars(&mut self, tracon: &str, msg: FlightPlanMessage) -> bool {
        match self.stars.get_mut(tracon) {
            Some(stars) => {
                stars.inbox.push(msg);
                true
            }
            None => false,
        }
    }

    /// Drain and process every inbox once. Messages forwarded during this
    /// pass land in their destination inbox and are handled no earlier than
    /// the next pass.
    pub fn sort(&mut self, flights: &FlightTable, fixes: &HashMap<String, LatLon>) -> Vec<FabricEvent> {
        let mut actions = Vec::new();

        let eram_ids: Vec<String> = self.erams.keys().cloned().collect();
        for id in eram_ids {
            let eram = self.erams.get_mut(&id).expect("eram disappeared during sort");
            let inbox = std::mem::take(&mut eram.inbox);
            for msg in inbox {
                process_eram(eram, msg, flights, fixes, &mut actions);
            }
        }

        let stars_ids: Vec<String> = self.stars.keys().cloned().collect();
        for id in stars_ids {
            let stars = self.stars.get_mut(&id).expect("stars disappeared during sort");
            let inbox = std::mem::take(&mut stars.inbox);
            for msg in inbox {
                process_stars(stars, msg, &mut actions);
            }
        }

        let mut events = Vec::new();
        for action in actions {
            match action {
                Action::ForwardToStars(tracon, msg) => {
                    let flight_id = msg.flight_id.clone();
                    if !self.post_to_stars(&tracon, msg) {
                        events.push(FabricEvent::DataRejection { flight_id, facility: tracon });
                    }
                }
                Action::ForwardToEram(artcc, msg) => {
                    let flight_id = msg.flight_id.clone();
                    if !self.post_to_eram(&artcc, msg) {
                        events.push(FabricEvent::DataRejection { flight_id, facility: artcc });
                    }
                }
                Action::Emit(event) => events.push(event),
                Action::ReleaseEram(artcc, code) => {
                    if let Some(eram) = self.erams.get_mut(&artcc) {
                        eram.squawk_pool.release(code);
                    }
                }
            }
        }
        events
    }
}

impl Default for Fabric {
    fn default() -> Self {
        Self::new()
    }
}

fn process_eram(
    eram: &mut EramComputer,
    msg: FlightPlanMessage,
    flights: &FlightTable,
    fixes: &HashMap<String, LatLon>,
    actions: &mut Vec<Action>,
) {
    match msg.kind {
        MessageKind::Plan => {
            let destination = resolve_coordination(&eram.adaptation, &msg, flights, fixes);
            eram.squawk_pool.claim(msg.bcn);
            eram.flight_plans.insert(msg.bcn, msg.clone());
            if let Some(facility) = destination {
                if facility != eram.artcc {
                    actions.push(Action::ForwardToStars(facility, msg));
                }
            }
        }
        MessageKind::RequestFlightPlan => {
            let requester = msg.source.facility_id().to_string();
            if let Some(plan) = eram.flight_plans.get(&msg.bcn) {
                let mut reply = plan.clone();
                reply.kind = MessageKind::DepartureDM;
                actions.push(Action::ForwardToStars(requester, reply));
            }
        }
        MessageKind::InitiateTransfer => {
            if let Some(track) = &msg.track {
                eram.track_info.insert(msg.flight_id.clone(), track.clone());
            }
            let destination = resolve_coordination(&eram.adaptation, &msg, flights, fixes);
            match destination {
                Some(facility) if facility != eram.artcc => {
                    actions.push(Action::Emit(FabricEvent::DataAcceptance {
                        flight_id: msg.flight_id.clone(),
                        facility: eram.artcc.clone(),
                    }));
                    actions.push(Action::ForwardToStars(facility, msg));
                }
                _ => {
                    actions.push(Action::Emit(FabricEvent::DataAcceptance {
                        flight_id: msg.flight_id.clone(),
                        facility: eram.artcc.clone(),
                    }));
                }
            }
        }
        MessageKind::AcceptRecallTransfer => {
            let recorded_owner = eram.track_info.get(&msg.flight_id).map(|t| t.owner.clone());
            let incoming_owner = msg.track.as_ref().map(|t| t.owner.clone());
            match (recorded_owner, incoming_owner) {
                (Some(recorded), Some(incoming)) if incoming != recorded => {
                    // Accept: ownership moves to the incoming controller.
                    if let Some(track) = eram.track_info.get_mut(&msg.flight_id) {
                        track.owner = incoming;
                        track.handoff_target = None;
                    }
                }
                _ => {
                    // Recall: drop the track and return the code to the pool.
                    eram.track_info.remove(&msg.flight_id);
                    eram.flight_plans.remove(&msg.bcn);
                    eram.squawk_pool.release(msg.bcn);
                }
            }
        }
        // Stubbed types: consumed without side effect.
        MessageKind::DepartureDM | MessageKind::BeaconTerminate => {}
        // Terminal-sorted types that strayed to the enroute tier.
        MessageKind::Amendment | MessageKind::Cancellation => {}
    }
}

fn process_stars(stars: &mut StarsComputer, msg: FlightPlanMessage, actions: &mut Vec<Action>) {
    match msg.kind {
        MessageKind::Plan | MessageKind::DepartureDM => {
            stars.plans.insert(msg.bcn, msg);
        }
        MessageKind::Amendment => {
            stars.plans.insert(msg.bcn, msg);
        }
        MessageKind::Cancellation => {
            stars.plans.remove(&msg.bcn);
        }
        MessageKind::InitiateTransfer => {
            if let Some(track) = &msg.track {
                stars.track_info.insert(msg.flight_id.clone(), track.clone());
            }
            actions.push(Action::Emit(FabricEvent::DataAcceptance {
                flight_id: msg.flight_id.clone(),
                facility: stars.tracon.clone(),
            }));
        }
        MessageKind::AcceptRecallTransfer => {
            let recorded_owner = stars.track_info.get(&msg.flight_id).map(|t| t.owner.clone());
            let incoming_owner = msg.track.as_ref().map(|t| t.owner.clone());
            match (recorded_owner, incoming_owner) {
                (Some(recorded), Some(incoming)) if incoming != recorded => {
                    if let Some(track) = stars.track_info.get_mut(&msg.flight_id) {
                        track.owner = incoming;
                        track.handoff_target = None;
                    }
                }
                _ => {
                    stars.track_info.remove(&msg.flight_id);
                    stars.plans.remove(&msg.bcn);
                    // Local codes go back to the local bank; national codes
                    // go back up to the parent center.
                    if in_local_bank(stars.beacon_bank, msg.bcn) {
                        stars.squawk_pool.release(msg.bcn);
                    } else {
                        actions.push(Action::ReleaseEram(stars.parent_artcc.clone(), msg.bcn));
                    }
                }
            }
        }
        // Enroute-sorted types that strayed to the terminal tier.
        MessageKind::RequestFlightPlan | MessageKind::BeaconTerminate => {}
    }
}

fn in_local_bank(bank: u16, code: Squawk) -> bool {
    code.0 & !0o77 == bank * 0o100 && code.0 & 0o77 != 0
}

/// Route-based entries win: the first adapted fix (sorted order) named in
/// the route string or the assigned waypoints. Otherwise the nearest
/// zone-based fix by great-circle distance to the aircraft.
fn resolve_coordination(
    adaptation: &EramAdaptation,
    msg: &FlightPlanMessage,
    flights: &FlightTable,
    fixes: &HashMap<String, LatLon>,
) -> Option<String> {
    let flight = flights.get(&msg.flight_id);
    let altitude = msg.altitude_ft();

    for (fix, entries) in &adaptation.coordination_fixes {
        let on_route = msg.route.split_whitespace().any(|t| t == fix)
            || flight.is_some_and(|f| f.waypoint_fixes.iter().any(|w| w == fix));
        if !on_route {
            continue;
        }
        if let Some(entry) = entries
            .iter()
            .find(|e| e.kind == CoordinationKind::RouteBased && altitude_in_band(e, altitude))
        {
            return Some(entry.to_facility.clone());
        }
    }

    let position = flight?.position;
    let mut best: Option<(f64, &str)> = None;
    for (fix, entries) in &adaptation.coordination_fixes {
        let Some(location) = fixes.get(fix) else { continue };
        for entry in entries {
            if entry.kind != CoordinationKind::ZoneBased || !altitude_in_band(entry, altitude) {
                continue;
            }
            let d = position.distance_nm(location);
            if best.map_or(true, |(bd, _)| d < bd) {
                best = Some((d, entry.to_facility.as_str()));
            }
        }
    }
    best.map(|(_, facility)| facility.to_string())
}

fn altitude_in_band(entry: &crate::scenario::CoordinationFix, altitude: Option<i32>) -> bool {
    match (entry.altitude_range, altitude) {
        (Some([lo, hi]), Some(alt)) => (lo..=hi).contains(&alt),
        _ => true,
    }
}
