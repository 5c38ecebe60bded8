use serde::{Deserialize, Serialize};

use crate::aircraft::dynamics::{self, Wind};
use crate::aircraft::flight_plan::{ApproachClearance, FlightPlan, Waypoint};
use crate::aircraft::performance::PerformanceEnvelope;
use crate::fabric::squawk::Squawk;
use crate::nav::{
    DeferredNavCommand, LateralCommand, Nav, NavContext, NavUpdate, SpeedCommand, TurnMethod,
    VerticalCommand, STANDARD_TURN_RATE,
};
use crate::utils::geo::LatLon;

pub const MAX_CALLSIGN_LEN: usize = 8;

/// Derived handoff state; see `Session` for the transition rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoffState {
    Untracked,
    OwnedBy(String),
    OutboundTo { owner: String, target: String },
}

/// Something that happened during a tick that the session cares about.
#[derive(Debug, Clone, PartialEq)]
pub enum TickEvent {
    WaypointPassed { fix: String, handoff: bool },
    WentAround,
}

/// One computer-piloted aircraft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aircraft {
    pub callsign: String,

    // Kinematics
    pub position: LatLon,
    pub altitude: f64, // feet
    pub ias: f64,      // knots
    pub gs: f64,       // knots
    pub heading: f64,  // magnetic degrees

    // Configuration
    pub aircraft_type: String,
    pub performance: PerformanceEnvelope,

    // Assignments
    pub flight_plan: FlightPlan,
    pub waypoints: Vec<Waypoint>,
    pub squawk: Squawk,
    pub scratchpad: String,
    pub temporary_altitude: Option<i32>,
    pub tracking_controller: Option<String>,
    pub handoff_target: Option<String>,
    pub approach: Option<ApproachClearance>,
    pub nav: Nav,

    // Arrival airport, for approach-speed gating and exit tests
    pub arrival_location: LatLon,
    pub arrival_elevation: f64,

    /// Unparsed remainder of the last controller input, kept for display.
    pub sticky_input: String,
}

impl Aircraft {
    pub fn new(
        callsign: impl Into<String>,
        position: LatLon,
        performance: PerformanceEnvelope,
        flight_plan: FlightPlan,
        squawk: Squawk,
        arrival_location: LatLon,
        arrival_elevation: f64,
    ) -> Self {
        let callsign = callsign.into();
        let aircraft_type = flight_plan.aircraft_type.clone();
        Self {
            callsign,
            position,
            altitude: 0.0,
            ias: 0.0,
            gs: 0.0,
            heading: 0.0,
            aircraft_type,
            performance,
            flight_plan,
            waypoints: Vec::new(),
            squawk,
            scratchpad: String::new(),
            temporary_altitude: None,
            tracking_controller: None,
            handoff_target: None,
            approach: None,
            nav: Nav::default(),
            arrival_location,
            arrival_elevation,
            sticky_input: String::new(),
        }
    }

    pub fn approach_cleared(&self) -> bool {
        self.approach.as_ref().is_some_and(|c| c.cleared)
    }

    pub fn handoff_state(&self) -> HandoffState {
        match (&self.tracking_controller, &self.handoff_target) {
            (None, _) => HandoffState::Untracked,
            (Some(owner), None) => HandoffState::OwnedBy(owner.clone()),
            (Some(owner), Some(target)) => HandoffState::OutboundTo {
                owner: owner.clone(),
                target: target.clone(),
            },
        }
    }

    /// One simulation step of `dt_s` simulated seconds.
    pub fn tick(&mut self, ctx: &NavContext, wind: Wind, dt_s: f64) -> Vec<TickEvent> {
        let mut events = Vec::new();

        // Deferred commands first; they may rewrite the slots and the route.
        let mut nav = std::mem::take(&mut self.nav);
        let updates = nav.tick(self, ctx);
        self.nav = nav;
        for update in updates {
            match update {
                NavUpdate::ClearWaypoints => self.waypoints.clear(),
                NavUpdate::ReplaceWaypoints(wps) => self.waypoints = wps,
                NavUpdate::ExecuteGoAround => {
                    self.execute_go_around();
                    events.push(TickEvent::WentAround);
                }
                // Slot updates were applied inside Nav::tick.
                _ => {}
            }
        }

        let targets = self.nav.evaluate(self, ctx);
        dynamics::advance(self, &targets, wind, ctx.mag_var, dt_s);

        // Waypoint passage: pop the head fix once we are within two turn
        // radii, then apply its crossing restrictions.
        if self.nav.lateral.passes_waypoints() {
            if let Some(wp) = self.waypoints.first() {
                let radius = dynamics::turn_radius_nm(self.gs, STANDARD_TURN_RATE);
                if self.position.distance_nm(&wp.location) < 2.0 * radius.max(0.25) {
                    let wp = self.waypoints.remove(0);
                    // Altitude before speed before heading.
                    if let Some(alt) = wp.altitude_constraint {
                        self.nav.vertical = VerticalCommand::MaintainAltitude { alt };
                    }
                    if let Some(ias) = wp.speed_constraint {
                        self.nav.speed = SpeedCommand::MaintainSpeed { ias };
                    }
                    if let Some(heading) = wp.depart_heading {
                        self.nav.lateral =
                            LateralCommand::fly_heading(heading, TurnMethod::Closest);
                    }
                    events.push(TickEvent::WaypointPassed { fix: wp.fix, handoff: wp.handoff });
                }
            }
        }

        events
    }

    /// Abandon the approach: fly the published missed approach and mark the
    /// clearance uncleared so a later re-clearance is required.
    pub fn execute_go_around(&mut self) {
        self.nav.deferred.retain(|cmd| {
            !matches!(
                cmd,
                DeferredNavCommand::TurnToInterceptLocalizer
                    | DeferredNavCommand::HoldLocalizerAfterIntercept
                    | DeferredNavCommand::ApproachSpeedAt5Dme
                    | DeferredNavCommand::GoAround { .. }
            )
        });

        let missed_altitude = self.arrival_elevation + 3000.0;

        let Some(clearance) = self.approach.as_mut() else {
            self.nav.vertical = VerticalCommand::MaintainAltitude { alt: missed_altitude };
            return;
        };
        clearance.cleared = false;
        let approach = clearance.approach.clone();

        if approach.missed.is_empty() {
            self.nav.lateral = LateralCommand::fly_heading(approach.course, TurnMethod::Closest);
            self.nav.vertical = VerticalCommand::MaintainAltitude { alt: missed_altitude };
        } else {
            self.waypoints = approach.missed;
            self.nav.lateral = LateralCommand::FlyRoute;
            self.nav.vertical = VerticalCommand::FlyRoute;
        }

        if matches!(self.nav.speed, SpeedCommand::FinalApproachSpeed) {
            let ias = (1.6 * self.performance.landing_speed).min(self.performance.cruise_speed);
            self.nav.speed = SpeedCommand::MaintainSpeed { ias };
        }
    }

    /// Multi-line readout used by the text console.
    pub fn status(&self) -> String {
        self.nav.summary(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aircraft::flight_plan::{Approach, ApproachKind, FlightRules};
    use crate::nav::NavContext;
    use crate::utils::geo::NmScale;

    fn test_context() -> NavContext {
        NavContext {
            mag_var: 0.0,
            scale: NmScale::from_center(LatLon::new(40.64, -73.78)),
        }
    }

    fn test_aircraft() -> Aircraft {
        let fp = FlightPlan::new(FlightRules::Ifr, "B738", "KBOS", "KJFK", "MERIT CAMRN", 24000);
        let mut ac = Aircraft::new(
            "DAL123",
            LatLon::new(40.9, -73.5),
            PerformanceEnvelope::default(),
            fp,
            Squawk(0o2101),
            LatLon::new(40.64, -73.78),
            13.0,
        );
        ac.altitude = 8000.0;
        ac.ias = 250.0;
        ac.gs = 260.0;
        ac.heading = 230.0;
        ac
    }

    fn test_approach(_ctx: &NavContext) -> Approach {
        let threshold = LatLon::new(40.64, -73.78);
        let outer = threshold.offset(255.0, 12.0); // reciprocal of 075
        Approach {
            id: "I7R".to_string(),
            kind: ApproachKind::Ils,
            runway: "07R".to_string(),
            course: 75.0,
            waypoints: vec![vec![Waypoint::at("FITBA", threshold.offset(255.0, 6.0))]],
            localizer: [outer, threshold],
            threshold,
            missed: vec![],
        }
    }

    #[test]
    fn test_waypoint_popped_once() {
        let ctx = test_context();
        let mut ac = test_aircraft();
        // Head straight at a fix half a mile away so one tick passes it.
        let fix = ac.position.offset(230.0, 0.4);
        ac.waypoints.push(Waypoint::at("MERIT", fix));
        ac.waypoints.push(Waypoint::at("CAMRN", fix.offset(230.0, 20.0)));

        let events = ac.tick(&ctx, Wind::default(), 1.0);
        assert!(events
            .iter()
            .any(|e| matches!(e, TickEvent::WaypointPassed { fix, .. } if fix == "MERIT")));
        assert_eq!(ac.waypoints.len(), 1);
        assert_eq!(ac.waypoints[0].fix, "CAMRN");

        // The popped fix never comes back.
        for _ in 0..10 {
            ac.tick(&ctx, Wind::default(), 1.0);
            assert!(ac.waypoints.iter().all(|w| w.fix != "MERIT"));
        }
    }

    #[test]
    fn test_crossing_restrictions_become_slot_commands() {
        let ctx = test_context();
        let mut ac = test_aircraft();
        let fix = ac.position.offset(230.0, 0.3);
        let mut wp = Waypoint::at("MERIT", fix);
        wp.altitude_constraint = Some(6000.0);
        wp.speed_constraint = Some(210.0);
        ac.waypoints.push(wp);

        ac.tick(&ctx, Wind::default(), 1.0);
        assert_eq!(ac.nav.vertical, VerticalCommand::MaintainAltitude { alt: 6000.0 });
        assert_eq!(ac.nav.speed, SpeedCommand::MaintainSpeed { ias: 210.0 });
    }

    #[test]
    fn test_go_around_marks_approach_uncleared() {
        let ctx = test_context();
        let mut ac = test_aircraft();
        ac.approach = Some(ApproachClearance {
            approach: test_approach(&ctx),
            straight_in: false,
            cleared: true,
        });
        ac.nav.speed = SpeedCommand::FinalApproachSpeed;
        ac.nav.add_deferred(DeferredNavCommand::HoldLocalizerAfterIntercept);

        ac.execute_go_around();

        assert!(!ac.approach_cleared());
        assert!(ac.approach.is_some());
        assert!(ac.nav.deferred.is_empty());
        assert!(matches!(ac.nav.speed, SpeedCommand::MaintainSpeed { .. }));
    }

    #[test]
    fn test_handoff_state_is_exclusive() {
        let mut ac = test_aircraft();
        assert_eq!(ac.handoff_state(), HandoffState::Untracked);

        ac.tracking_controller = Some("2W".to_string());
        assert_eq!(ac.handoff_state(), HandoffState::OwnedBy("2W".to_string()));

        ac.handoff_target = Some("4P".to_string());
        assert_eq!(
            ac.handoff_state(),
            HandoffState::OutboundTo { owner: "2W".to_string(), target: "4P".to_string() }
        );
    }

    #[test]
    fn test_localizer_intercept_sequence() {
        let ctx = test_context();
        let mut ac = test_aircraft();
        let approach = test_approach(&ctx);
        let threshold = approach.threshold;

        // Two miles south of the final approach course, angling toward it.
        ac.position = threshold.offset(255.0, 8.0).offset(165.0, 2.0);
        ac.altitude = 2000.0;
        ac.ias = 160.0;
        ac.gs = 160.0;
        ac.heading = 30.0;
        ac.approach = Some(ApproachClearance {
            approach,
            straight_in: false,
            cleared: true,
        });
        ac.nav.add_deferred(DeferredNavCommand::TurnToInterceptLocalizer);

        let mut installed = false;
        for _ in 0..600 {
            ac.tick(&ctx, Wind::default(), 1.0);
            if ac
                .nav
                .deferred
                .iter()
                .any(|c| matches!(c, DeferredNavCommand::HoldLocalizerAfterIntercept))
                || matches!(ac.nav.lateral, LateralCommand::HoldLocalizer)
            {
                installed = true;
                break;
            }
        }
        assert!(installed, "intercept never armed");

        // Eventually the aircraft joins and tracks the localizer.
        let mut joined = false;
        for _ in 0..600 {
            ac.tick(&ctx, Wind::default(), 1.0);
            if matches!(ac.nav.lateral, LateralCommand::HoldLocalizer) {
                joined = true;
                break;
            }
        }
        assert!(joined, "never joined the localizer");
    }
}
