//! One running simulation: world state, the wall-clock-paced tick worker,
//! the participant roster, and the controller-facing operations.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::aircraft::{Aircraft, FlightPlan, FlightRules, TickEvent, Wind, MAX_CALLSIGN_LEN};
use crate::aircraft::performance::{builtin_performance, envelope_for, PerformanceDatabase};
use crate::commands;
use crate::fabric::messages::{FlightPlanMessage, MessageKind, SourceId, TrackInfo};
use crate::fabric::squawk::Squawk;
use crate::fabric::{Fabric, FabricEvent, FlightSnapshot, FlightTable};
use crate::nav::{NavContext, SpeedCommand};
use crate::scenario::{Scenario, ScenarioGroup};
use crate::sim::events::{EventQueue, ServerEvent};
use crate::utils::errors::ClientError;
use crate::utils::geo::normalize_heading;

pub const SNAPSHOT_VERSION: u32 = 1;

/// Wall-clock pacing of the tick worker.
pub const REAL_TICK_SECONDS: f64 = 0.1;

pub const DEFAULT_PRESPAWN_MINUTES: f64 = 20.0;
const PRESPAWN_STEP_SECONDS: f64 = 0.5;

const MIN_RATE: f64 = 0.1;
const MAX_RATE: f64 = 100.0;
const MAX_SCRATCHPAD_LEN: usize = 4;

// Launch ceilings; scenario requests beyond these are clamped silently.
const MAX_ARRIVALS_PER_HOUR: f64 = 40.0;
const MAX_DEPARTURES_PER_HOUR: f64 = 60.0;

#[derive(Debug)]
pub struct Participant {
    pub position: String,
    pub events: EventQueue,
    pub last_poll: Option<Instant>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrivalStream {
    pub flow: String,
    pub airport: String,
    pub rate: f64, // aircraft per hour
    pub next_spawn: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartureStream {
    pub airport: String,
    pub runway: String,
    pub rate: f64,
    pub next_spawn: f64,
}

/// The per-aircraft subset shipped to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AircraftSnapshot {
    pub callsign: String,
    pub position: crate::utils::geo::LatLon,
    pub altitude: f64,
    pub ias: f64,
    pub gs: f64,
    pub heading: f64,
    pub squawk: Squawk,
    pub aircraft_type: String,
    pub scratchpad: String,
    pub temporary_altitude: Option<i32>,
    pub tracking_controller: Option<String>,
    pub handoff_target: Option<String>,
    pub sticky_input: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldUpdate {
    pub sim_time: f64,
    pub rate: f64,
    pub paused: bool,
    pub aircraft: Vec<AircraftSnapshot>,
    pub events: Vec<ServerEvent>,
}

/// Versioned session dump for admin export and remote re-hosting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: u32,
    pub group_name: String,
    pub scenario_name: String,
    pub sim_time: f64,
    pub rate: f64,
    pub paused: bool,
    pub wind: Wind,
    pub aircraft: BTreeMap<String, Aircraft>,
    pub fabric: Fabric,
    pub arrivals: Vec<ArrivalStream>,
    pub departures: Vec<DepartureStream>,
}

#[derive(Debug)]
pub struct World {
    pub group_name: String,
    pub scenario_name: String,
    pub sim_time: f64, // simulated seconds since session start
    pub rate: f64,
    pub paused: bool,
    pub wind: Wind,
    pub aircraft: BTreeMap<String, Aircraft>,
    pub fabric: Fabric,
    pub arrivals: Vec<ArrivalStream>,
    pub departures: Vec<DepartureStream>,
    pub participants: HashMap<Uuid, Participant>,
    performance: PerformanceDatabase,
}

impl World {
    pub fn new(group: &ScenarioGroup, scenario_name: &str) -> Result<World, ClientError> {
        let scenario = group
            .scenarios
            .get(scenario_name)
            .ok_or_else(|| ClientError::NoSuchScenario(scenario_name.to_string()))?;

        let mut fabric = Fabric::new();
        for (artcc, adaptation) in &group.eram_adaptations {
            fabric.add_eram(artcc, adaptation.clone());
        }
        for position in group.control_positions.values() {
            if !fabric.erams.contains_key(&position.eram_facility) {
                fabric.add_eram(&position.eram_facility, Default::default());
            }
        }
        let parent = parent_artcc(group);
        fabric.add_stars(&group.tracon, &parent, group.stars.beacon_bank);

        let mut arrivals = Vec::new();
        for (flow, rates) in &scenario.inbound_rates {
            for (airport, rate) in rates {
                let rate = rate.min(MAX_ARRIVALS_PER_HOUR);
                if rate > 0.0 {
                    arrivals.push(ArrivalStream {
                        flow: flow.clone(),
                        airport: airport.clone(),
                        rate,
                        next_spawn: 0.0,
                    });
                }
            }
        }
        arrivals.sort_by(|a, b| (&a.flow, &a.airport).cmp(&(&b.flow, &b.airport)));

        let mut departures = Vec::new();
        for dep in &scenario.departure_runways {
            let rate = dep.rate.min(MAX_DEPARTURES_PER_HOUR);
            if rate > 0.0 {
                departures.push(DepartureStream {
                    airport: dep.airport.clone(),
                    runway: dep.runway.clone(),
                    rate,
                    next_spawn: 0.0,
                });
            }
        }

        Ok(World {
            group_name: group.name.clone(),
            scenario_name: scenario_name.to_string(),
            sim_time: 0.0,
            rate: 1.0,
            paused: false,
            wind: scenario.wind,
            aircraft: BTreeMap::new(),
            fabric,
            arrivals,
            departures,
            participants: HashMap::new(),
            performance: builtin_performance(),
        })
    }

    fn scenario<'a>(&self, group: &'a ScenarioGroup) -> &'a Scenario {
        &group.scenarios[&self.scenario_name]
    }

    fn nav_context(&self, group: &ScenarioGroup) -> NavContext {
        NavContext { mag_var: group.mag_var, scale: group.scale }
    }

    /// Advance the world by `dt` simulated seconds.
    pub fn tick(&mut self, group: &ScenarioGroup, dt: f64) {
        if self.paused {
            return;
        }
        self.sim_time += dt;

        self.run_spawners(group);

        let ctx = self.nav_context(group);
        let wind = self.wind;
        let callsigns: Vec<String> = self.aircraft.keys().cloned().collect();
        for callsign in &callsigns {
            let events = match self.aircraft.get_mut(callsign) {
                Some(ac) => ac.tick(&ctx, wind, dt),
                None => continue,
            };
            for event in events {
                match event {
                    TickEvent::WaypointPassed { fix, handoff: true } => {
                        self.initiate_auto_handoff(group, callsign, &fix);
                    }
                    TickEvent::WaypointPassed { .. } => {}
                    TickEvent::WentAround => {
                        self.broadcast(ServerEvent::WentAround { callsign: callsign.clone() });
                    }
                }
            }
        }

        self.run_exit_tests(group);
        self.sort_fabric(group);
    }

    fn run_spawners(&mut self, group: &ScenarioGroup) {
        let mut arrivals = std::mem::take(&mut self.arrivals);
        for stream in &mut arrivals {
            while stream.next_spawn <= self.sim_time {
                stream.next_spawn = self.sim_time + 3600.0 / stream.rate;
                if self.spawn_arrival(group, &stream.flow, &stream.airport).is_none() {
                    warn!("[SPAWN] arrival spawn failed for {}/{}", stream.flow, stream.airport);
                }
            }
        }
        self.arrivals = arrivals;

        let mut departures = std::mem::take(&mut self.departures);
        for stream in &mut departures {
            while stream.next_spawn <= self.sim_time {
                stream.next_spawn = self.sim_time + 3600.0 / stream.rate;
                if self.spawn_departure(group, &stream.airport, &stream.runway).is_none() {
                    warn!("[SPAWN] departure spawn failed for {}/{}", stream.airport, stream.runway);
                }
            }
        }
        self.departures = departures;
    }

    /// Spawn one arrival on the given flow. Public so controllers can
    /// launch traffic by hand.
    pub fn spawn_arrival(
        &mut self,
        group: &ScenarioGroup,
        flow_name: &str,
        airport: &str,
    ) -> Option<String> {
        let flow = group.inbound_flows.get(flow_name)?;
        let arrival = flow.arrivals.get(airport)?;
        let airport_data = group.airports.get(airport)?;

        let mut rng = rand::thread_rng();
        let airline = arrival.airlines.choose(&mut rng)?;
        let fleet = group.airlines.get(airline)?;
        let aircraft_type = fleet.choose(&mut rng)?.clone();
        let callsign = self.unique_callsign(airline)?;

        // Assigned route: the common transition plus the tail for the
        // active arrival runway.
        let mut waypoints = flow.waypoints.clone();
        let scenario = self.scenario(group);
        if let Some(runway) = scenario
            .arrival_runways
            .iter()
            .find(|r| r.airport == airport)
            .map(|r| r.runway.clone())
        {
            if let Some(tail) = arrival.runway_waypoints.get(&runway) {
                waypoints.extend(tail.iter().cloned());
            }
        }
        if waypoints.is_empty() {
            return None;
        }

        let parent = parent_artcc(group);
        let squawk = match self.fabric.erams.get_mut(&parent) {
            Some(eram) => eram.squawk_pool.allocate(),
            None => Squawk::NONE,
        };

        let route_string =
            waypoints.iter().map(|w| w.fix.as_str()).collect::<Vec<_>>().join(" ");
        let flight_plan = FlightPlan::new(
            FlightRules::Ifr,
            aircraft_type.clone(),
            "ZZZZ",
            airport,
            route_string.clone(),
            arrival.initial_altitude as i32,
        );

        let envelope = envelope_for(&self.performance, &aircraft_type);
        let mut ac = Aircraft::new(
            callsign.clone(),
            waypoints[0].location,
            envelope,
            flight_plan,
            squawk,
            airport_data.location,
            airport_data.elevation,
        );

        // Spawn a few miles outside the first fix, inbound.
        let inbound = if waypoints.len() > 1 {
            waypoints[0].location.bearing_to(&waypoints[1].location)
        } else {
            waypoints[0].location.bearing_to(&airport_data.location)
        };
        ac.position = waypoints[0].location.offset(normalize_heading(inbound + 180.0), 8.0);
        ac.altitude = arrival.initial_altitude;
        ac.ias = arrival.initial_speed;
        ac.gs = arrival.initial_speed;
        ac.heading = normalize_heading(inbound - group.mag_var);
        ac.waypoints = waypoints;
        ac.nav.speed = SpeedCommand::MaintainSpeed { ias: arrival.initial_speed };
        // Tracked by the overlying center until the handoff fix.
        ac.tracking_controller = Some(parent.clone());

        let coordination_fix = ac
            .waypoints
            .iter()
            .find(|w| w.handoff)
            .or_else(|| ac.waypoints.first())
            .map(|w| w.fix.clone())
            .unwrap_or_default();
        let plan = FlightPlanMessage::new(
            MessageKind::Plan,
            SourceId::new(parent.clone(), Utc::now()),
            squawk,
            callsign.clone(),
        )
        .with_route(route_string)
        .with_fix(coordination_fix)
        .with_altitude(format!("{}", arrival.initial_altitude as i32));
        self.fabric.post_to_eram(&parent, plan);

        self.aircraft.insert(callsign.clone(), ac);
        self.broadcast(ServerEvent::AircraftSpawned { callsign: callsign.clone() });
        Some(callsign)
    }

    pub fn spawn_departure(
        &mut self,
        group: &ScenarioGroup,
        airport: &str,
        runway: &str,
    ) -> Option<String> {
        let airport_data = group.airports.get(airport)?;
        let routes = airport_data.departure_routes.get(runway)?;

        let mut rng = rand::thread_rng();
        let sids: Vec<&String> = routes.keys().collect();
        let sid = sids.choose(&mut rng)?.to_string();
        let route = &routes[&sid];

        let departure = airport_data.departures.choose(&mut rng)?;
        let airline = departure.airlines.choose(&mut rng)?;
        let fleet = group.airlines.get(airline)?;
        let aircraft_type = fleet.choose(&mut rng)?.clone();
        let callsign = self.unique_callsign(airline)?;

        let parent = parent_artcc(group);
        let squawk = match self.fabric.erams.get_mut(&parent) {
            Some(eram) => eram.squawk_pool.allocate(),
            None => Squawk::NONE,
        };

        let route_string = format!(
            "{} {}",
            sid,
            route.waypoints.iter().map(|w| w.fix.as_str()).collect::<Vec<_>>().join(" ")
        );
        let flight_plan = FlightPlan::new(
            FlightRules::Ifr,
            aircraft_type.clone(),
            airport,
            departure.destination.clone(),
            route_string.clone(),
            departure.altitude,
        );

        let envelope = envelope_for(&self.performance, &aircraft_type);
        let mut ac = Aircraft::new(
            callsign.clone(),
            airport_data.location,
            envelope,
            flight_plan,
            squawk,
            airport_data.location,
            airport_data.elevation,
        );
        ac.altitude = airport_data.elevation;
        ac.heading = runway_heading(runway);
        ac.waypoints = route.waypoints.clone();
        let initial_altitude = route.initial_altitude.unwrap_or(5000.0);
        ac.nav.add_deferred(crate::nav::DeferredNavCommand::ClimbOnceAirborne {
            alt: initial_altitude,
        });

        let plan = FlightPlanMessage::new(
            MessageKind::Plan,
            SourceId::new(parent.clone(), Utc::now()),
            squawk,
            callsign.clone(),
        )
        .with_route(route_string)
        .with_fix(departure.exit.clone())
        .with_altitude(format!("{}", departure.altitude));
        self.fabric.post_to_eram(&parent, plan);

        // The terminal automation asks the center for the filed plan; the
        // departure message comes back through the fabric.
        let request = FlightPlanMessage::new(
            MessageKind::RequestFlightPlan,
            SourceId::new(group.tracon.clone(), Utc::now()),
            squawk,
            callsign.clone(),
        );
        self.fabric.post_to_eram(&parent, request);

        self.aircraft.insert(callsign.clone(), ac);
        self.broadcast(ServerEvent::AircraftSpawned { callsign: callsign.clone() });
        Some(callsign)
    }

    fn unique_callsign(&self, airline: &str) -> Option<String> {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let callsign = format!("{}{}", airline, rng.gen_range(1..9999));
            if callsign.len() <= MAX_CALLSIGN_LEN && !self.aircraft.contains_key(&callsign) {
                return Some(callsign);
            }
        }
        None
    }

    /// An arrival crossed its handoff fix: offer the track to the covering
    /// TRACON position and tell the message fabric.
    fn initiate_auto_handoff(&mut self, group: &ScenarioGroup, callsign: &str, fix: &str) {
        let scenario = self.scenario(group);
        let Some(target) = arrival_position(scenario) else { return };
        let Some(ac) = self.aircraft.get_mut(callsign) else { return };
        if ac.handoff_target.is_some() {
            return;
        }

        let owner = ac.tracking_controller.clone().unwrap_or_else(|| parent_artcc(group));
        ac.handoff_target = Some(target.clone());
        // The adaptation may assign a scratchpad at the coordination fix.
        if ac.scratchpad.is_empty() {
            if let Some(pad) = group.stars.scratchpads.get(fix) {
                ac.scratchpad = pad.clone();
            }
        }
        let squawk = ac.squawk;
        let route = ac.flight_plan.route.clone();

        let transfer = FlightPlanMessage::new(
            MessageKind::InitiateTransfer,
            SourceId::new(owner.clone(), Utc::now()),
            squawk,
            callsign,
        )
        .with_fix(fix)
        .with_route(route)
        .with_track(TrackInfo { owner: owner.clone(), handoff_target: Some(target.clone()) });
        let parent = parent_artcc(group);
        self.fabric.post_to_eram(&parent, transfer);

        self.post_to_position(
            &target,
            ServerEvent::HandoffOffered { callsign: callsign.to_string(), from: owner, to: target.clone() },
        );
    }

    fn run_exit_tests(&mut self, group: &ScenarioGroup) {
        let mut deleted = Vec::new();
        let mut landed = Vec::new();

        for (callsign, ac) in &self.aircraft {
            let dist = ac.position.distance_nm(&group.stars.center);
            if dist > group.stars.range_nm && ac.tracking_controller.is_none() {
                deleted.push(callsign.clone());
                continue;
            }
            if let Some(clearance) = &ac.approach {
                if clearance.cleared
                    && ac.position.distance_nm(&clearance.approach.threshold) < 0.5
                    && ac.altitude < ac.arrival_elevation + 100.0
                {
                    landed.push(callsign.clone());
                }
            }
        }

        for callsign in deleted {
            self.remove_aircraft(group, &callsign);
            self.broadcast(ServerEvent::AircraftDeleted { callsign });
        }
        for callsign in landed {
            self.remove_aircraft(group, &callsign);
            self.broadcast(ServerEvent::AircraftLanded { callsign });
        }
    }

    /// Remove an aircraft and recall its beacon code through the fabric.
    fn remove_aircraft(&mut self, group: &ScenarioGroup, callsign: &str) {
        let Some(ac) = self.aircraft.remove(callsign) else { return };
        if ac.squawk == Squawk::NONE {
            return;
        }
        let parent = parent_artcc(group);
        let recall = FlightPlanMessage::new(
            MessageKind::AcceptRecallTransfer,
            SourceId::new(group.tracon.clone(), Utc::now()),
            ac.squawk,
            callsign,
        );
        self.fabric.post_to_eram(&parent, recall);
    }

    fn sort_fabric(&mut self, group: &ScenarioGroup) {
        let flights: FlightTable = self
            .aircraft
            .iter()
            .map(|(callsign, ac)| {
                (
                    callsign.clone(),
                    FlightSnapshot {
                        position: ac.position,
                        waypoint_fixes: ac.waypoints.iter().map(|w| w.fix.clone()).collect(),
                    },
                )
            })
            .collect();

        for event in self.fabric.sort(&flights, &group.fixes) {
            let mapped = match event {
                FabricEvent::DataAcceptance { flight_id, facility } => {
                    ServerEvent::DataAcceptance { flight_id, facility }
                }
                FabricEvent::DataRejection { flight_id, facility } => {
                    ServerEvent::DataRejection { flight_id, facility }
                }
            };
            self.broadcast(mapped);
        }
    }

    // ---- participants and events ----

    pub fn broadcast(&mut self, event: ServerEvent) {
        for participant in self.participants.values_mut() {
            participant.events.post(event.clone());
        }
    }

    pub fn post_to_position(&mut self, position: &str, event: ServerEvent) {
        for participant in self.participants.values_mut() {
            if participant.position == position {
                participant.events.post(event.clone());
            }
        }
    }

    pub fn scenario_positions(&self, group: &ScenarioGroup) -> Vec<String> {
        let scenario = self.scenario(group);
        let mut positions: Vec<String> = scenario.multi_controllers.keys().cloned().collect();
        if let Some(solo) = &scenario.solo_controller {
            positions.push(solo.clone());
        }
        positions.extend(scenario.controllers.iter().cloned());
        positions.sort();
        positions.dedup();
        positions
    }

    pub fn available_positions(&self, group: &ScenarioGroup) -> Vec<String> {
        self.scenario_positions(group)
            .into_iter()
            .filter(|p| !self.participants.values().any(|pt| pt.position == *p))
            .collect()
    }

    pub fn sign_on(
        &mut self,
        group: &ScenarioGroup,
        position: &str,
    ) -> Result<Uuid, ClientError> {
        if !group.control_positions.contains_key(position)
            || !self.scenario_positions(group).contains(&position.to_string())
        {
            return Err(ClientError::UnknownControllerPosition(position.to_string()));
        }
        if self.participants.values().any(|p| p.position == position) {
            return Err(ClientError::ControllerPositionTaken(position.to_string()));
        }

        let token = Uuid::new_v4();
        self.participants.insert(
            token,
            Participant { position: position.to_string(), events: EventQueue::default(), last_poll: None },
        );
        info!("[SIGNON] {} as {}", token, position);
        Ok(token)
    }

    pub fn sign_off(&mut self, token: &Uuid) -> Result<(), ClientError> {
        self.participants.remove(token).map(|_| ()).ok_or(ClientError::UnknownToken)
    }

    fn position_of(&self, token: &Uuid) -> Result<String, ClientError> {
        self.participants
            .get(token)
            .map(|p| p.position.clone())
            .ok_or(ClientError::UnknownToken)
    }

    fn aircraft_mut(&mut self, callsign: &str) -> Result<&mut Aircraft, ClientError> {
        self.aircraft
            .get_mut(callsign)
            .ok_or_else(|| ClientError::NoSuchAircraft(callsign.to_string()))
    }

    // ---- controller operations ----

    pub fn world_update(&mut self, token: &Uuid) -> Result<WorldUpdate, ClientError> {
        let participant =
            self.participants.get_mut(token).ok_or(ClientError::UnknownToken)?;
        participant.last_poll = Some(Instant::now());
        let events = participant.events.drain();

        let aircraft = self
            .aircraft
            .values()
            .map(|ac| AircraftSnapshot {
                callsign: ac.callsign.clone(),
                position: ac.position,
                altitude: ac.altitude,
                ias: ac.ias,
                gs: ac.gs,
                heading: ac.heading,
                squawk: ac.squawk,
                aircraft_type: ac.aircraft_type.clone(),
                scratchpad: ac.scratchpad.clone(),
                temporary_altitude: ac.temporary_altitude,
                tracking_controller: ac.tracking_controller.clone(),
                handoff_target: ac.handoff_target.clone(),
                sticky_input: ac.sticky_input.clone(),
                status: ac.status(),
            })
            .collect();

        Ok(WorldUpdate {
            sim_time: self.sim_time,
            rate: self.rate,
            paused: self.paused,
            aircraft,
            events,
        })
    }

    pub fn set_rate(&mut self, token: &Uuid, rate: f64) -> Result<(), ClientError> {
        self.position_of(token)?;
        self.rate = rate.clamp(MIN_RATE, MAX_RATE);
        let rate = self.rate;
        self.broadcast(ServerEvent::RateChanged { rate });
        Ok(())
    }

    pub fn toggle_pause(&mut self, token: &Uuid) -> Result<(), ClientError> {
        self.position_of(token)?;
        self.paused = !self.paused;
        let paused = self.paused;
        self.broadcast(ServerEvent::SimPaused { paused });
        Ok(())
    }

    pub fn initiate_track(&mut self, token: &Uuid, callsign: &str) -> Result<(), ClientError> {
        let me = self.position_of(token)?;
        let ac = self.aircraft_mut(callsign)?;
        if ac.tracking_controller.is_some() {
            return Err(ClientError::AlreadyTracked);
        }
        ac.tracking_controller = Some(me);
        Ok(())
    }

    pub fn drop_track(&mut self, token: &Uuid, callsign: &str) -> Result<(), ClientError> {
        let me = self.position_of(token)?;
        let ac = self.aircraft_mut(callsign)?;
        if ac.tracking_controller.as_deref() != Some(me.as_str()) {
            return Err(ClientError::InvalidAircraftState);
        }
        ac.tracking_controller = None;
        ac.handoff_target = None;
        Ok(())
    }

    pub fn handoff_track(
        &mut self,
        token: &Uuid,
        callsign: &str,
        controller: &str,
    ) -> Result<(), ClientError> {
        let me = self.position_of(token)?;
        if controller == me {
            return Err(ClientError::HandoffTargetNotSignedIn);
        }
        if !self.participants.values().any(|p| p.position == controller) {
            return Err(ClientError::HandoffTargetNotSignedIn);
        }
        let ac = self.aircraft_mut(callsign)?;
        if ac.tracking_controller.as_deref() != Some(me.as_str()) {
            return Err(ClientError::InvalidAircraftState);
        }
        ac.handoff_target = Some(controller.to_string());
        self.post_to_position(
            controller,
            ServerEvent::HandoffOffered {
                callsign: callsign.to_string(),
                from: me,
                to: controller.to_string(),
            },
        );
        Ok(())
    }

    pub fn accept_handoff(&mut self, token: &Uuid, callsign: &str) -> Result<(), ClientError> {
        let me = self.position_of(token)?;
        let tracon = self.group_tracon();
        let ac = self.aircraft_mut(callsign)?;
        if ac.handoff_target.as_deref() != Some(me.as_str()) {
            return Err(ClientError::NoPendingHandoff);
        }
        let previous = ac.tracking_controller.clone();
        ac.tracking_controller = Some(me.clone());
        ac.handoff_target = None;
        let squawk = ac.squawk;

        // Keep the terminal automation's track table in step.
        let accept = FlightPlanMessage::new(
            MessageKind::AcceptRecallTransfer,
            SourceId::new(tracon.clone(), Utc::now()),
            squawk,
            callsign,
        )
        .with_track(TrackInfo { owner: me.clone(), handoff_target: None });
        self.fabric.post_to_stars(&tracon, accept);

        let event = ServerEvent::DataAcceptance {
            flight_id: callsign.to_string(),
            facility: tracon,
        };
        if let Some(previous) = previous {
            self.post_to_position(&previous, event.clone());
        }
        self.post_to_position(&me, event);
        Ok(())
    }

    pub fn reject_handoff(&mut self, token: &Uuid, callsign: &str) -> Result<(), ClientError> {
        let me = self.position_of(token)?;
        let tracon = self.group_tracon();
        let ac = self.aircraft_mut(callsign)?;
        if ac.handoff_target.as_deref() != Some(me.as_str()) {
            return Err(ClientError::NoPendingHandoff);
        }
        ac.handoff_target = None;
        let owner = ac.tracking_controller.clone();
        if let Some(owner) = owner {
            self.post_to_position(
                &owner,
                ServerEvent::DataRejection { flight_id: callsign.to_string(), facility: tracon },
            );
        }
        Ok(())
    }

    pub fn cancel_handoff(&mut self, token: &Uuid, callsign: &str) -> Result<(), ClientError> {
        let me = self.position_of(token)?;
        let ac = self.aircraft_mut(callsign)?;
        if ac.tracking_controller.as_deref() != Some(me.as_str()) || ac.handoff_target.is_none()
        {
            return Err(ClientError::NoPendingHandoff);
        }
        let target = ac.handoff_target.take().unwrap_or_default();
        self.post_to_position(
            &target,
            ServerEvent::HandoffCancelled { callsign: callsign.to_string(), by: me },
        );
        Ok(())
    }

    pub fn point_out(
        &mut self,
        token: &Uuid,
        callsign: &str,
        controller: &str,
    ) -> Result<(), ClientError> {
        let me = self.position_of(token)?;
        if !self.participants.values().any(|p| p.position == controller) {
            return Err(ClientError::HandoffTargetNotSignedIn);
        }
        self.aircraft_mut(callsign)?;
        self.post_to_position(
            controller,
            ServerEvent::PointOut {
                callsign: callsign.to_string(),
                from: me,
                to: controller.to_string(),
            },
        );
        Ok(())
    }

    pub fn set_scratchpad(
        &mut self,
        token: &Uuid,
        callsign: &str,
        text: &str,
    ) -> Result<(), ClientError> {
        self.position_of(token)?;
        if text.len() > MAX_SCRATCHPAD_LEN {
            return Err(ClientError::IllegalScratchpad(text.to_string()));
        }
        self.aircraft_mut(callsign)?.scratchpad = text.to_ascii_uppercase();
        Ok(())
    }

    pub fn assign_altitude(
        &mut self,
        token: &Uuid,
        group: &ScenarioGroup,
        callsign: &str,
        altitude_ft: i32,
    ) -> Result<(), ClientError> {
        self.position_of(token)?;
        let ac = self.aircraft_mut(callsign)?;
        commands::apply_effect(ac, group, commands::Effect::ClearAltitude(altitude_ft as f64))
    }

    pub fn set_temporary_altitude(
        &mut self,
        token: &Uuid,
        callsign: &str,
        altitude_ft: i32,
    ) -> Result<(), ClientError> {
        self.position_of(token)?;
        if !(0..=60_000).contains(&altitude_ft) {
            return Err(ClientError::IllegalAltitude(altitude_ft));
        }
        self.aircraft_mut(callsign)?.temporary_altitude = Some(altitude_ft);
        Ok(())
    }

    pub fn apply_effect(
        &mut self,
        token: &Uuid,
        group: &ScenarioGroup,
        callsign: &str,
        effect: commands::Effect,
    ) -> Result<(), ClientError> {
        self.position_of(token)?;
        let ac = self.aircraft_mut(callsign)?;
        commands::apply_effect(ac, group, effect)
    }

    pub fn go_around(&mut self, token: &Uuid, callsign: &str) -> Result<(), ClientError> {
        self.position_of(token)?;
        let ac = self.aircraft_mut(callsign)?;
        ac.execute_go_around();
        self.broadcast(ServerEvent::WentAround { callsign: callsign.to_string() });
        Ok(())
    }

    pub fn delete_aircraft(
        &mut self,
        token: &Uuid,
        group: &ScenarioGroup,
        callsign: &str,
    ) -> Result<(), ClientError> {
        self.position_of(token)?;
        if !self.aircraft.contains_key(callsign) {
            return Err(ClientError::NoSuchAircraft(callsign.to_string()));
        }
        self.remove_aircraft(group, callsign);
        self.broadcast(ServerEvent::AircraftDeleted { callsign: callsign.to_string() });
        Ok(())
    }

    pub fn launch_aircraft(
        &mut self,
        token: &Uuid,
        group: &ScenarioGroup,
        flow: &str,
        airport: &str,
    ) -> Result<String, ClientError> {
        self.position_of(token)?;
        let callsign = self
            .spawn_arrival(group, flow, airport)
            .ok_or_else(|| ClientError::NoSuchFacility(flow.to_string()))?;
        // Hand-launched traffic enters untracked so the launching
        // controller can take it.
        if let Some(ac) = self.aircraft.get_mut(&callsign) {
            ac.tracking_controller = None;
        }
        Ok(callsign)
    }

    pub fn run_aircraft_commands(
        &mut self,
        token: &Uuid,
        group: &ScenarioGroup,
        callsign: &str,
        input: &str,
    ) -> Result<(), ClientError> {
        self.position_of(token)?;
        let ac = self.aircraft_mut(callsign)?;
        commands::run_aircraft_commands(ac, group, input)
    }

    pub fn expect_approach(
        &mut self,
        token: &Uuid,
        group: &ScenarioGroup,
        callsign: &str,
        approach: &str,
    ) -> Result<(), ClientError> {
        self.apply_effect(
            token,
            group,
            callsign,
            commands::Effect::ExpectApproach(approach.to_string()),
        )
    }

    pub fn cleared_approach(
        &mut self,
        token: &Uuid,
        group: &ScenarioGroup,
        callsign: &str,
        approach: &str,
        straight_in: bool,
    ) -> Result<(), ClientError> {
        self.apply_effect(
            token,
            group,
            callsign,
            commands::Effect::ClearedApproach { id: approach.to_string(), straight_in },
        )
    }

    fn group_tracon(&self) -> String {
        self.fabric.stars.keys().next().cloned().unwrap_or_default()
    }

    // ---- persistence ----

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            version: SNAPSHOT_VERSION,
            group_name: self.group_name.clone(),
            scenario_name: self.scenario_name.clone(),
            sim_time: self.sim_time,
            rate: self.rate,
            paused: self.paused,
            wind: self.wind,
            aircraft: self.aircraft.clone(),
            fabric: self.fabric.clone(),
            arrivals: self.arrivals.clone(),
            departures: self.departures.clone(),
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, ClientError> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(&self.snapshot(), &mut buf)
            .map_err(|e| ClientError::internal(format!("snapshot encode: {e}")))?;
        Ok(buf)
    }

    pub fn deserialize(blob: &[u8]) -> Result<SessionSnapshot, ClientError> {
        let snapshot: SessionSnapshot = ciborium::de::from_reader(blob)
            .map_err(|e| ClientError::internal(format!("snapshot decode: {e}")))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(ClientError::internal(format!(
                "snapshot version {} does not match {}",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }
        Ok(snapshot)
    }

    pub fn restore(group: &ScenarioGroup, snapshot: SessionSnapshot) -> Result<World, ClientError> {
        let mut world = World::new(group, &snapshot.scenario_name)?;
        world.sim_time = snapshot.sim_time;
        world.rate = snapshot.rate;
        world.paused = snapshot.paused;
        world.wind = snapshot.wind;
        world.aircraft = snapshot.aircraft;
        world.fabric = snapshot.fabric;
        world.arrivals = snapshot.arrivals;
        world.departures = snapshot.departures;
        Ok(world)
    }
}

/// The ARTCC that owns this TRACON's airspace: the sorted-first ERAM
/// facility named by the control positions.
fn parent_artcc(group: &ScenarioGroup) -> String {
    let mut facilities: Vec<&String> =
        group.control_positions.values().map(|p| &p.eram_facility).collect();
    facilities.sort();
    facilities.first().map(|s| s.to_string()).unwrap_or_else(|| "ZZZ".to_string())
}

/// The position arrivals are handed to: the flow's covering controller,
/// falling back to the solo position or the split primary.
fn arrival_position(scenario: &Scenario) -> Option<String> {
    if let Some(solo) = &scenario.solo_controller {
        return Some(solo.clone());
    }
    scenario
        .multi_controllers
        .iter()
        .find(|(_, mc)| !mc.arrivals.is_empty())
        .or_else(|| scenario.multi_controllers.iter().find(|(_, mc)| mc.primary))
        .map(|(callsign, _)| callsign.clone())
}

fn runway_heading(runway: &str) -> f64 {
    let digits: String = runway.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse::<f64>().map(|n| normalize_heading(n * 10.0)).unwrap_or(0.0)
}

/// A hosted simulation: the world behind its lock plus the worker pacing it.
pub struct Session {
    pub name: String,
    pub group: Arc<ScenarioGroup>,
    state: Mutex<World>,
}

impl Session {
    /// Create a session and run the prespawn so the first client does not
    /// see an empty scope.
    pub fn new(
        name: impl Into<String>,
        group: Arc<ScenarioGroup>,
        scenario_name: &str,
        prespawn_minutes: f64,
    ) -> Result<Arc<Session>, ClientError> {
        let mut world = World::new(&group, scenario_name)?;

        let steps = (prespawn_minutes * 60.0 / PRESPAWN_STEP_SECONDS).max(0.0) as usize;
        for _ in 0..steps {
            world.tick(&group, PRESPAWN_STEP_SECONDS);
        }
        info!(
            "[SESSION] {} prespawned {} aircraft over {} sim minutes",
            world.scenario_name,
            world.aircraft.len(),
            prespawn_minutes
        );

        Ok(Arc::new(Session { name: name.into(), group, state: Mutex::new(world) }))
    }

    /// Start the wall-clock tick worker. The worker holds only a weak
    /// reference; it exits when the session is dropped.
    pub fn start(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs_f64(REAL_TICK_SECONDS));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let Some(session) = weak.upgrade() else { break };
                let mut world = session.state.lock().await;
                if !world.paused {
                    let dt = REAL_TICK_SECONDS * world.rate;
                    world.tick(&session.group, dt);
                }
            }
        });
    }

    /// Run `f` with the world lock held. Handlers never hold the lock
    /// across network calls.
    pub async fn with_world<R>(&self, f: impl FnOnce(&mut World, &ScenarioGroup) -> R) -> R {
        let mut world = self.state.lock().await;
        f(&mut world, &self.group)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_world() -> (World, Arc<ScenarioGroup>) {
        let group = Arc::new(ScenarioGroup::builtin());
        let world = World::new(&group, "South Flow").unwrap();
        (world, group)
    }

    fn signed_on(world: &mut World, group: &ScenarioGroup, position: &str) -> Uuid {
        world.sign_on(group, position).unwrap()
    }

    #[test]
    fn test_spawn_arrival_allocates_squawk_and_plan() {
        let (mut world, group) = test_world();
        let callsign = world.spawn_arrival(&group, "CAMRN", "KJFK").unwrap();
        let ac = &world.aircraft[&callsign];
        assert_ne!(ac.squawk, Squawk::NONE);
        assert!(!ac.waypoints.is_empty());
        // The plan message is waiting at the center.
        assert!(world.fabric.erams["ZNY"].inbox.iter().any(|m| m.flight_id == callsign));
    }

    #[test]
    fn test_tick_advances_time_and_spawns() {
        let (mut world, group) = test_world();
        for _ in 0..100 {
            world.tick(&group, 0.5);
        }
        assert!((world.sim_time - 50.0).abs() < 1e-9);
        assert!(!world.aircraft.is_empty());
    }

    #[test]
    fn test_pause_freezes_sim_time() {
        let (mut world, group) = test_world();
        let token = signed_on(&mut world, &group, "2W");
        world.tick(&group, 0.5);
        let frozen = world.sim_time;

        world.toggle_pause(&token).unwrap();
        for _ in 0..100 {
            world.tick(&group, 0.5);
        }
        assert_eq!(world.sim_time, frozen);

        world.toggle_pause(&token).unwrap();
        world.tick(&group, 0.5);
        assert!((world.sim_time - frozen - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_rate_is_clamped() {
        let (mut world, group) = test_world();
        let token = signed_on(&mut world, &group, "2W");
        world.set_rate(&token, 1000.0).unwrap();
        assert_eq!(world.rate, 100.0);
        world.set_rate(&token, 0.0).unwrap();
        assert_eq!(world.rate, 0.1);
    }

    #[test]
    fn test_handoff_accept_flow() {
        let (mut world, group) = test_world();
        let c1 = signed_on(&mut world, &group, "2W");
        let c2 = signed_on(&mut world, &group, "4P");
        let callsign = world.spawn_arrival(&group, "CAMRN", "KJFK").unwrap();

        // C1 takes the track, then offers it to C2.
        world.aircraft.get_mut(&callsign).unwrap().tracking_controller = None;
        world.initiate_track(&c1, &callsign).unwrap();
        world.handoff_track(&c1, &callsign, "4P").unwrap();
        assert_eq!(
            world.aircraft[&callsign].handoff_state(),
            crate::aircraft::HandoffState::OutboundTo {
                owner: "2W".to_string(),
                target: "4P".to_string()
            }
        );

        world.accept_handoff(&c2, &callsign).unwrap();
        assert_eq!(
            world.aircraft[&callsign].tracking_controller.as_deref(),
            Some("4P")
        );
        assert_eq!(world.aircraft[&callsign].handoff_target, None);

        // Both sides hear about it.
        let c1_events = world.participants.get_mut(&c1).unwrap().events.drain();
        assert!(c1_events
            .iter()
            .any(|e| matches!(e, ServerEvent::DataAcceptance { flight_id, .. } if *flight_id == callsign)));
        let c2_events = world.participants.get_mut(&c2).unwrap().events.drain();
        assert!(c2_events
            .iter()
            .any(|e| matches!(e, ServerEvent::DataAcceptance { flight_id, .. } if *flight_id == callsign)));
    }

    #[test]
    fn test_handoff_to_absent_controller_fails() {
        let (mut world, group) = test_world();
        let c1 = signed_on(&mut world, &group, "2W");
        let callsign = world.spawn_arrival(&group, "CAMRN", "KJFK").unwrap();
        world.aircraft.get_mut(&callsign).unwrap().tracking_controller = None;
        world.initiate_track(&c1, &callsign).unwrap();

        let err = world.handoff_track(&c1, &callsign, "4P").unwrap_err();
        assert_eq!(err, ClientError::HandoffTargetNotSignedIn);
    }

    #[test]
    fn test_reject_returns_track_to_owner() {
        let (mut world, group) = test_world();
        let c1 = signed_on(&mut world, &group, "2W");
        let c2 = signed_on(&mut world, &group, "4P");
        let callsign = world.spawn_arrival(&group, "CAMRN", "KJFK").unwrap();
        world.aircraft.get_mut(&callsign).unwrap().tracking_controller = None;
        world.initiate_track(&c1, &callsign).unwrap();
        world.handoff_track(&c1, &callsign, "4P").unwrap();

        world.reject_handoff(&c2, &callsign).unwrap();
        assert_eq!(world.aircraft[&callsign].tracking_controller.as_deref(), Some("2W"));
        assert_eq!(world.aircraft[&callsign].handoff_target, None);
    }

    #[test]
    fn test_position_taken() {
        let (mut world, group) = test_world();
        signed_on(&mut world, &group, "2W");
        let err = world.sign_on(&group, "2W").unwrap_err();
        assert_eq!(err, ClientError::ControllerPositionTaken("2W".to_string()));
    }

    #[test]
    fn test_scratchpad_length_limit() {
        let (mut world, group) = test_world();
        let token = signed_on(&mut world, &group, "2W");
        let callsign = world.spawn_arrival(&group, "CAMRN", "KJFK").unwrap();

        world.set_scratchpad(&token, &callsign, "cam").unwrap();
        assert_eq!(world.aircraft[&callsign].scratchpad, "CAM");

        let err = world.set_scratchpad(&token, &callsign, "TOOBIG").unwrap_err();
        assert!(matches!(err, ClientError::IllegalScratchpad(_)));
    }

    #[test]
    fn test_world_update_drains_events_fifo() {
        let (mut world, group) = test_world();
        let token = signed_on(&mut world, &group, "2W");
        world.broadcast(ServerEvent::RateChanged { rate: 2.0 });
        world.broadcast(ServerEvent::SimPaused { paused: true });

        let update = world.world_update(&token).unwrap();
        assert_eq!(update.events.len(), 2);
        assert!(matches!(update.events[0], ServerEvent::RateChanged { .. }));

        // A second poll sees nothing new.
        let update = world.world_update(&token).unwrap();
        assert!(update.events.is_empty());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let (mut world, group) = test_world();
        world.spawn_arrival(&group, "CAMRN", "KJFK").unwrap();
        for _ in 0..20 {
            world.tick(&group, 0.5);
        }

        let blob = world.serialize().unwrap();
        let snapshot = World::deserialize(&blob).unwrap();
        let restored = World::restore(&group, snapshot).unwrap();

        assert_eq!(restored.aircraft.len(), world.aircraft.len());
        assert!((restored.sim_time - world.sim_time).abs() < 1e-5);
        for (callsign, ac) in &world.aircraft {
            let other = &restored.aircraft[callsign];
            assert!((other.altitude - ac.altitude).abs() < 1e-5);
            assert!((other.position.lat - ac.position.lat).abs() < 1e-5);
        }
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let (mut world, group) = test_world();
        world.spawn_arrival(&group, "CAMRN", "KJFK").unwrap();
        let mut snapshot = world.snapshot();
        snapshot.version = 99;
        let mut blob = Vec::new();
        ciborium::ser::into_writer(&snapshot, &mut blob).unwrap();
        assert!(World::deserialize(&blob).is_err());
    }

    #[test]
    fn test_departure_plan_reaches_the_stars() {
        let (mut world, group) = test_world();
        let callsign = world.spawn_departure(&group, "KJFK", "22R").unwrap();
        let squawk = world.aircraft[&callsign].squawk;

        // Pass one: the center files the plan and answers the request.
        // Pass two: the departure message lands in the terminal table.
        world.tick(&group, 0.5);
        world.tick(&group, 0.5);

        let stars = &world.fabric.stars["N90"];
        assert!(stars.plans.contains_key(&squawk));
        assert_eq!(stars.plans[&squawk].flight_id, callsign);
    }

    #[test]
    fn test_auto_handoff_at_ho_fix() {
        let (mut world, group) = test_world();
        signed_on(&mut world, &group, "2W");
        let callsign = world.spawn_arrival(&group, "CAMRN", "KJFK").unwrap();

        // Run until the aircraft crosses CAMRN, the /ho fix.
        for _ in 0..2400 {
            world.tick(&group, 0.5);
            if world.aircraft.get(&callsign).map_or(true, |ac| ac.handoff_target.is_some()) {
                break;
            }
        }
        let ac = world.aircraft.get(&callsign).expect("aircraft disappeared early");
        assert_eq!(ac.handoff_target.as_deref(), Some("2W"));
    }
}
