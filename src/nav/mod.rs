//! Per-aircraft navigation state machine: one lateral, one speed, and one
//! vertical command, plus a set of deferred conditional commands.

pub mod commands;

use serde::{Deserialize, Serialize};

pub use commands::{
    DeferredNavCommand, LateralCommand, LateralGuidance, NavUpdate, SpeedCommand, TurnMethod,
    VerticalCommand,
};

use crate::aircraft::Aircraft;
use crate::utils::geo::NmScale;

/// Rate sentinel meaning "as fast as the airframe allows".
pub const MAXIMUM_RATE: f64 = 1.0e5;

/// Standard rate turn, degrees per second.
pub const STANDARD_TURN_RATE: f64 = 3.0;

/// Scene-level constants the nav commands need.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavContext {
    /// Magnetic variation at the scene center; magnetic = true - variation.
    pub mag_var: f64,
    pub scale: NmScale,
}

/// The per-tick output of the state machine, consumed by the dynamics step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavTargets {
    pub heading: f64,
    pub turn: TurnMethod,
    pub heading_rate: f64, // degrees per second
    pub ias: f64,
    pub ias_rate: f64, // knots per minute
    pub altitude: f64,
    pub altitude_rate: f64, // feet per minute
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nav {
    pub lateral: LateralCommand,
    pub speed: SpeedCommand,
    pub vertical: VerticalCommand,
    pub deferred: Vec<DeferredNavCommand>,
}

impl Default for Nav {
    fn default() -> Self {
        Self {
            lateral: LateralCommand::FlyRoute,
            speed: SpeedCommand::FlyRoute,
            vertical: VerticalCommand::FlyRoute,
            deferred: Vec::new(),
        }
    }
}

impl Nav {
    /// Pure query: current targets and rates for all three axes.
    pub fn evaluate(&self, ac: &Aircraft, ctx: &NavContext) -> NavTargets {
        let lateral = self.lateral.evaluate(ac, ctx);
        let (ias, ias_rate) = self.speed.evaluate(ac, ctx);
        let (altitude, altitude_rate) = self.vertical.evaluate(ac, ctx);

        NavTargets {
            heading: lateral.heading,
            turn: lateral.turn,
            heading_rate: lateral.rate,
            ias,
            ias_rate,
            altitude,
            altitude_rate,
        }
    }

    /// Idempotent insert: at most one deferred command per variant.
    pub fn add_deferred(&mut self, cmd: DeferredNavCommand) {
        let tag = std::mem::discriminant(&cmd);
        if !self.deferred.iter().any(|c| std::mem::discriminant(c) == tag) {
            self.deferred.push(cmd);
        }
    }

    /// Evaluate the deferred commands, install whatever fired, and hand the
    /// aircraft-level updates back to the tick driver.
    pub fn tick(&mut self, ac: &Aircraft, ctx: &NavContext) -> Vec<NavUpdate> {
        let pending = std::mem::take(&mut self.deferred);
        let mut aircraft_updates = Vec::new();

        for cmd in pending {
            match cmd.evaluate(ac, self, ctx) {
                Some(updates) => {
                    for update in updates {
                        match update {
                            NavUpdate::Lateral(l) => self.lateral = l,
                            NavUpdate::Speed(s) => self.speed = s,
                            NavUpdate::Vertical(v) => self.vertical = v,
                            NavUpdate::Defer(d) => self.add_deferred(d),
                            other => aircraft_updates.push(other),
                        }
                    }
                }
                None => self.deferred.push(cmd),
            }
        }

        aircraft_updates
    }

    /// Human-readable status; empty lines are skipped and deferred
    /// summaries are sorted for determinism.
    pub fn summary(&self, ac: &Aircraft) -> String {
        let mut lines: Vec<String> = [
            self.lateral.summary(ac),
            self.speed.summary(ac),
            self.vertical.summary(ac),
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect();

        let mut deferred: Vec<String> = self.deferred.iter().map(|c| c.summary()).collect();
        deferred.sort();
        lines.extend(deferred);

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aircraft::{Aircraft, FlightPlan, FlightRules, Waypoint};
    use crate::aircraft::performance::PerformanceEnvelope;
    use crate::fabric::squawk::Squawk;
    use crate::utils::geo::LatLon;

    fn test_context() -> NavContext {
        NavContext {
            mag_var: 0.0,
            scale: NmScale::from_center(LatLon::new(40.64, -73.78)),
        }
    }

    fn test_aircraft() -> Aircraft {
        let fp = FlightPlan::new(FlightRules::Ifr, "B738", "KBOS", "KJFK", "MERIT", 24000);
        let mut ac = Aircraft::new(
            "DAL123",
            LatLon::new(40.9, -73.5),
            PerformanceEnvelope::default(),
            fp,
            Squawk(0o2101),
            LatLon::new(40.64, -73.78),
            13.0,
        );
        ac.altitude = 10_000.0;
        ac.ias = 280.0;
        ac.gs = 300.0;
        ac.heading = 230.0;
        ac
    }

    #[test]
    fn test_fly_heading_evaluate() {
        let ctx = test_context();
        let ac = test_aircraft();
        let mut nav = Nav::default();
        nav.lateral = LateralCommand::fly_heading(180.0, TurnMethod::Closest);

        let targets = nav.evaluate(&ac, &ctx);
        assert_eq!(targets.heading, 180.0);
        assert_eq!(targets.heading_rate, STANDARD_TURN_RATE);
    }

    #[test]
    fn test_empty_route_flies_present_heading() {
        let ctx = test_context();
        let ac = test_aircraft();
        let nav = Nav::default();

        let targets = nav.evaluate(&ac, &ctx);
        assert_eq!(targets.heading, ac.heading);
        assert!(nav.summary(&ac).contains("Fly present heading"));
    }

    #[test]
    fn test_axes_are_independent() {
        let ctx = test_context();
        let ac = test_aircraft();
        let mut nav = Nav::default();

        let before = nav.evaluate(&ac, &ctx);
        nav.lateral = LateralCommand::fly_heading(90.0, TurnMethod::Left);
        let after = nav.evaluate(&ac, &ctx);

        assert_eq!(before.ias, after.ias);
        assert_eq!(before.ias_rate, after.ias_rate);
        assert_eq!(before.altitude, after.altitude);
        assert_eq!(before.altitude_rate, after.altitude_rate);
    }

    #[test]
    fn test_route_speed_constraint_rate() {
        let ctx = test_context();
        let mut ac = test_aircraft();

        // Fix 10 nm ahead at 300 kts ground speed: ETA two minutes.
        let fix = ac.position.offset(230.0, 10.0);
        let mut wp = Waypoint::at("CAMRN", fix);
        wp.speed_constraint = Some(210.0);
        ac.waypoints.push(wp);

        let nav = Nav::default();
        let targets = nav.evaluate(&ac, &ctx);
        assert_eq!(targets.ias, 210.0);
        // |280 - 210| / 2 min * 0.8 decel factor
        assert!((targets.ias_rate - 28.0).abs() < 0.5);
    }

    #[test]
    fn test_final_approach_speed_bands() {
        let ctx = test_context();
        let mut ac = test_aircraft();
        ac.ias = 180.0;
        let mut nav = Nav::default();
        nav.speed = SpeedCommand::FinalApproachSpeed;

        // Inside one mile: landing speed exactly.
        ac.position = ac.arrival_location.offset(0.0, 0.5);
        let targets = nav.evaluate(&ac, &ctx);
        assert_eq!(targets.ias, ac.performance.landing_speed);

        // Beyond ten miles: never faster than current.
        ac.position = ac.arrival_location.offset(0.0, 15.0);
        ac.ias = 150.0;
        let targets = nav.evaluate(&ac, &ctx);
        assert!(targets.ias <= 150.0);
    }

    #[test]
    fn test_add_deferred_is_idempotent() {
        let mut nav = Nav::default();
        nav.add_deferred(DeferredNavCommand::ApproachSpeedAt5Dme);
        nav.add_deferred(DeferredNavCommand::ApproachSpeedAt5Dme);
        assert_eq!(nav.deferred.len(), 1);
    }

    #[test]
    fn test_speed_after_altitude_fires_once() {
        let ctx = test_context();
        let mut ac = test_aircraft();
        ac.altitude = 11_000.0;
        let mut nav = Nav::default();
        nav.add_deferred(DeferredNavCommand::SpeedAfterAltitude {
            alt: 10_000.0,
            from_above: true,
            ias: 250.0,
        });

        // Above the threshold: nothing happens.
        assert!(nav.tick(&ac, &ctx).is_empty());
        assert_eq!(nav.deferred.len(), 1);

        // Below it: the speed slot is installed and the trigger is gone.
        ac.altitude = 9_900.0;
        assert!(nav.tick(&ac, &ctx).is_empty());
        assert_eq!(nav.speed, SpeedCommand::MaintainSpeed { ias: 250.0 });
        assert!(nav.deferred.is_empty());
    }

    #[test]
    fn test_deferred_evaluation_is_pure() {
        let ctx = test_context();
        let mut ac = test_aircraft();
        ac.altitude = 9_000.0;
        let nav = Nav::default();
        let cmd = DeferredNavCommand::SpeedAfterAltitude {
            alt: 10_000.0,
            from_above: true,
            ias: 250.0,
        };

        let first = cmd.evaluate(&ac, &nav, &ctx);
        let second = cmd.evaluate(&ac, &nav, &ctx);
        assert_eq!(first, second);
    }

    #[test]
    fn test_summary_sorted_and_nonempty() {
        let ac = test_aircraft();
        let mut nav = Nav::default();
        nav.lateral = LateralCommand::fly_heading(180.0, TurnMethod::Closest);
        nav.add_deferred(DeferredNavCommand::TurnToInterceptLocalizer);
        nav.add_deferred(DeferredNavCommand::ApproachSpeedAt5Dme);

        let summary = nav.summary(&ac);
        assert!(summary.contains("Fly heading 180"));
        let at5 = summary.find("At 5 DME").unwrap();
        let turn = summary.find("Turn to intercept").unwrap();
        assert!(at5 < turn);
    }

    #[test]
    fn test_serialize_round_trip() {
        let mut nav = Nav::default();
        nav.lateral = LateralCommand::fly_heading(75.0, TurnMethod::Right);
        nav.speed = SpeedCommand::MaintainSpeed { ias: 210.0 };
        nav.vertical = VerticalCommand::MaintainAltitude { alt: 3000.0 };
        nav.add_deferred(DeferredNavCommand::GoAround { distance_nm: 2.0 });

        let mut buf = Vec::new();
        ciborium::ser::into_writer(&nav, &mut buf).unwrap();
        let back: Nav = ciborium::de::from_reader(buf.as_slice()).unwrap();
        assert_eq!(nav, back);
    }

    #[test]
    fn test_unknown_tag_is_hard_error() {
        // A speed-slot tag that is not in the legal set must be rejected.
        let json = r#"{"lateral":{"type":"FlyRoute"},"speed":{"type":"HoldShort"},
                       "vertical":{"type":"FlyRoute"},"deferred":[]}"#;
        assert!(serde_json::from_str::<Nav>(json).is_err());
    }
}
