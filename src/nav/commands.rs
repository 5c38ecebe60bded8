use serde::{Deserialize, Serialize};

use crate::aircraft::Aircraft;
use crate::nav::{Nav, NavContext, MAXIMUM_RATE, STANDARD_TURN_RATE};
use crate::utils::geo::{
    heading_difference, normalize_heading, ray_line_intersection_distance, signed_line_distance,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnMethod {
    Closest,
    Left,
    Right,
}

/// Lateral guidance for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LateralGuidance {
    pub heading: f64, // magnetic
    pub turn: TurnMethod,
    pub rate: f64, // degrees per second
}

/// Result of evaluating a deferred command. Slot updates are applied by the
/// nav state machine; the rest are handed to the aircraft tick driver.
#[derive(Debug, Clone, PartialEq)]
pub enum NavUpdate {
    Lateral(LateralCommand),
    Speed(SpeedCommand),
    Vertical(VerticalCommand),
    Defer(DeferredNavCommand),
    ClearWaypoints,
    ReplaceWaypoints(Vec<crate::aircraft::Waypoint>),
    ExecuteGoAround,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LateralCommand {
    FlyHeading {
        heading: f64,
        turn: TurnMethod,
        rate: f64,
    },
    FlyRoute,
    HoldLocalizer,
}

impl LateralCommand {
    pub fn fly_heading(heading: f64, turn: TurnMethod) -> Self {
        LateralCommand::FlyHeading { heading, turn, rate: STANDARD_TURN_RATE }
    }

    /// Only route-following consumes waypoints.
    pub fn passes_waypoints(&self) -> bool {
        matches!(self, LateralCommand::FlyRoute)
    }

    pub fn evaluate(&self, ac: &Aircraft, ctx: &NavContext) -> LateralGuidance {
        match self {
            LateralCommand::FlyHeading { heading, turn, rate } => LateralGuidance {
                heading: *heading,
                turn: *turn,
                rate: *rate,
            },
            LateralCommand::FlyRoute => {
                let heading = match ac.waypoints.first() {
                    Some(wp) => {
                        let true_bearing = ac.position.bearing_to(&wp.location);
                        normalize_heading(true_bearing - ctx.mag_var)
                    }
                    None => ac.heading,
                };
                LateralGuidance { heading, turn: TurnMethod::Closest, rate: STANDARD_TURN_RATE }
            }
            LateralCommand::HoldLocalizer => {
                let Some(clearance) = ac.approach.as_ref() else {
                    return LateralGuidance {
                        heading: ac.heading,
                        turn: TurnMethod::Closest,
                        rate: STANDARD_TURN_RATE,
                    };
                };
                let ap = &clearance.approach;
                let p = ctx.scale.to_nm(&ac.position);
                let a = ctx.scale.to_nm(&ap.localizer[0]);
                let b = ctx.scale.to_nm(&ap.localizer[1]);
                let d = signed_line_distance(p, a, b);

                let heading = if d.abs() < 0.025 {
                    ap.course
                } else if d.abs() > 0.3 {
                    // Too far out; the localizer is not engaged.
                    ac.heading
                } else {
                    // Nudge back toward the beam.
                    normalize_heading(ap.course + 3.0 * d.signum())
                };
                LateralGuidance { heading, turn: TurnMethod::Closest, rate: STANDARD_TURN_RATE }
            }
        }
    }

    pub fn summary(&self, ac: &Aircraft) -> String {
        match self {
            LateralCommand::FlyHeading { heading, .. } => {
                format!("Fly heading {:03.0}", heading)
            }
            LateralCommand::FlyRoute => {
                if ac.waypoints.is_empty() {
                    "Fly present heading".to_string()
                } else {
                    "Fly assigned route".to_string()
                }
            }
            LateralCommand::HoldLocalizer => "Fly the localizer course".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SpeedCommand {
    MaintainSpeed { ias: f64 },
    FlyRoute,
    FinalApproachSpeed,
}

impl SpeedCommand {
    /// Returns (target IAS in knots, rate in knots per minute).
    pub fn evaluate(&self, ac: &Aircraft, _ctx: &NavContext) -> (f64, f64) {
        match self {
            SpeedCommand::MaintainSpeed { ias } => (*ias, MAXIMUM_RATE),
            SpeedCommand::FlyRoute => {
                if let Some(wp) = ac.waypoints.first() {
                    if let Some(target) = wp.speed_constraint {
                        return match eta_minutes(ac, &wp.location) {
                            Some(eta) => {
                                let mult = if target < ac.ias { 0.8 } else { 1.25 };
                                let rate = (target - ac.ias).abs() / eta * mult;
                                (target, rate.min(MAXIMUM_RATE))
                            }
                            None => (target, MAXIMUM_RATE),
                        };
                    }
                }
                // No constraint: 250 below 10,000, 70% cruise above.
                let target = if ac.altitude < 10_000.0 {
                    ac.performance.cruise_speed.min(250.0)
                } else {
                    0.7 * ac.performance.cruise_speed
                };
                (target, MAXIMUM_RATE)
            }
            SpeedCommand::FinalApproachSpeed => {
                let landing = ac.performance.landing_speed;
                let approach_speed = (1.6 * landing).min(ac.performance.cruise_speed);
                let d = ac.position.distance_nm(&ac.arrival_location);

                let target = if d <= 1.0 {
                    landing
                } else if d >= 10.0 {
                    approach_speed.min(ac.ias)
                } else {
                    let far = approach_speed.min(ac.ias);
                    (landing + (far - landing) * (d - 1.0) / 9.0).min(ac.ias)
                };
                (target, MAXIMUM_RATE)
            }
        }
    }

    pub fn summary(&self, _ac: &Aircraft) -> String {
        match self {
            SpeedCommand::MaintainSpeed { ias } => format!("Maintain {:.0} kts", ias),
            SpeedCommand::FlyRoute => String::new(),
            SpeedCommand::FinalApproachSpeed => "Fly final approach speed".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum VerticalCommand {
    MaintainAltitude { alt: f64 },
    FlyRoute,
}

impl VerticalCommand {
    /// Returns (target altitude in feet, rate in feet per minute).
    pub fn evaluate(&self, ac: &Aircraft, _ctx: &NavContext) -> (f64, f64) {
        match self {
            VerticalCommand::MaintainAltitude { alt } => (*alt, MAXIMUM_RATE),
            VerticalCommand::FlyRoute => {
                if let Some(wp) = ac.waypoints.first() {
                    if let Some(target) = wp.altitude_constraint {
                        // On approach below the crossing altitude: stay down,
                        // never climb back up into it.
                        if ac.approach_cleared() && ac.altitude < target {
                            return (ac.altitude, 0.0);
                        }
                        return match eta_minutes(ac, &wp.location) {
                            Some(eta) => (target, (target - ac.altitude).abs() / eta),
                            None => (target, MAXIMUM_RATE),
                        };
                    }
                }
                (ac.altitude, 0.0)
            }
        }
    }

    pub fn summary(&self, _ac: &Aircraft) -> String {
        match self {
            VerticalCommand::MaintainAltitude { alt } => format!("Maintain {:.0} ft", alt),
            VerticalCommand::FlyRoute => String::new(),
        }
    }
}

/// Conditional commands evaluated each tick; when one fires it installs the
/// commands it carries and is removed from the deferred set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DeferredNavCommand {
    SpeedAfterAltitude {
        alt: f64,
        from_above: bool,
        ias: f64,
    },
    AltitudeAfterSpeed {
        ias: f64,
        from_above: bool,
        alt: f64,
    },
    ApproachSpeedAt5Dme,
    ClimbOnceAirborne {
        alt: f64,
    },
    TurnToInterceptLocalizer,
    HoldLocalizerAfterIntercept,
    GoAround {
        distance_nm: f64,
    },
}

impl DeferredNavCommand {
    /// `Some(updates)` when the trigger fired; `None` to try again next tick.
    pub fn evaluate(
        &self,
        ac: &Aircraft,
        nav: &Nav,
        ctx: &NavContext,
    ) -> Option<Vec<NavUpdate>> {
        match self {
            DeferredNavCommand::SpeedAfterAltitude { alt, from_above, ias } => {
                let crossed = if *from_above {
                    ac.altitude <= *alt
                } else {
                    ac.altitude >= *alt
                };
                crossed.then(|| vec![NavUpdate::Speed(SpeedCommand::MaintainSpeed { ias: *ias })])
            }
            DeferredNavCommand::AltitudeAfterSpeed { ias, from_above, alt } => {
                let crossed = if *from_above {
                    ac.ias <= *ias
                } else {
                    ac.ias >= *ias
                };
                crossed.then(|| {
                    vec![NavUpdate::Vertical(VerticalCommand::MaintainAltitude { alt: *alt })]
                })
            }
            DeferredNavCommand::ApproachSpeedAt5Dme => {
                (ac.position.distance_nm(&ac.arrival_location) <= 5.0)
                    .then(|| vec![NavUpdate::Speed(SpeedCommand::FinalApproachSpeed)])
            }
            DeferredNavCommand::ClimbOnceAirborne { alt } => {
                (ac.ias >= 1.1 * ac.performance.min_speed).then(|| {
                    vec![NavUpdate::Vertical(VerticalCommand::MaintainAltitude { alt: *alt })]
                })
            }
            DeferredNavCommand::TurnToInterceptLocalizer => {
                let clearance = ac.approach.as_ref().filter(|c| c.cleared)?;
                let ap = &clearance.approach;
                if ac.gs < 1.0 {
                    return None;
                }

                let p = ctx.scale.to_nm(&ac.position);
                let a = ctx.scale.to_nm(&ap.localizer[0]);
                let b = ctx.scale.to_nm(&ap.localizer[1]);
                let true_heading = normalize_heading(ac.heading + ctx.mag_var);

                // A crossing behind the aircraft means the intercept was
                // missed; keep quiet and try again next tick.
                let dist = ray_line_intersection_distance(p, true_heading, a, b)?;
                let eta_s = dist / ac.gs * 3600.0;

                let turn_deg = heading_difference(ac.heading, ap.course).abs();
                // Time to make the turn at standard rate, with 0.5 slop.
                let threshold_s = turn_deg * (1.0 / STANDARD_TURN_RATE) * 0.5;

                (eta_s < threshold_s).then(|| {
                    vec![
                        NavUpdate::Lateral(LateralCommand::fly_heading(
                            ap.course,
                            TurnMethod::Closest,
                        )),
                        NavUpdate::ClearWaypoints,
                        NavUpdate::Defer(DeferredNavCommand::HoldLocalizerAfterIntercept),
                    ]
                })
            }
            DeferredNavCommand::HoldLocalizerAfterIntercept => {
                let clearance = ac.approach.as_ref().filter(|c| c.cleared)?;
                let ap = &clearance.approach;

                let p = ctx.scale.to_nm(&ac.position);
                let a = ctx.scale.to_nm(&ap.localizer[0]);
                let b = ctx.scale.to_nm(&ap.localizer[1]);
                if signed_line_distance(p, a, b).abs() >= 0.2 {
                    return None;
                }

                // Splice the remaining approach waypoints ahead of the
                // aircraft: drop fixes behind it or further out than it is.
                let ac_dist = ac.position.distance_nm(&ap.threshold);
                let course_true = normalize_heading(ap.course + ctx.mag_var).to_radians();
                let dir = (course_true.sin(), course_true.cos());
                let remaining: Vec<_> = ap
                    .default_transition()
                    .iter()
                    .filter(|wp| {
                        let w = ctx.scale.to_nm(&wp.location);
                        let ahead = (w.0 - p.0) * dir.0 + (w.1 - p.1) * dir.1 > 0.0;
                        ahead && wp.location.distance_nm(&ap.threshold) < ac_dist
                    })
                    .cloned()
                    .collect();

                let mut updates = vec![
                    NavUpdate::ReplaceWaypoints(remaining),
                    NavUpdate::Lateral(LateralCommand::HoldLocalizer),
                    NavUpdate::Vertical(VerticalCommand::FlyRoute),
                ];
                if !matches!(nav.speed, SpeedCommand::MaintainSpeed { .. }) {
                    updates.push(NavUpdate::Speed(SpeedCommand::FinalApproachSpeed));
                }
                Some(updates)
            }
            DeferredNavCommand::GoAround { distance_nm } => {
                (ac.position.distance_nm(&ac.arrival_location) < *distance_nm)
                    .then(|| vec![NavUpdate::ExecuteGoAround])
            }
        }
    }

    pub fn summary(&self) -> String {
        match self {
            DeferredNavCommand::SpeedAfterAltitude { alt, ias, .. } => {
                format!("At {:.0} ft, maintain {:.0} kts", alt, ias)
            }
            DeferredNavCommand::AltitudeAfterSpeed { ias, alt, .. } => {
                format!("At {:.0} kts, maintain {:.0} ft", ias, alt)
            }
            DeferredNavCommand::ApproachSpeedAt5Dme => {
                "At 5 DME, slow to final approach speed".to_string()
            }
            DeferredNavCommand::ClimbOnceAirborne { alt } => {
                format!("Once airborne, climb and maintain {:.0} ft", alt)
            }
            DeferredNavCommand::TurnToInterceptLocalizer => {
                "Turn to intercept the localizer".to_string()
            }
            DeferredNavCommand::HoldLocalizerAfterIntercept => "Join the localizer".to_string(),
            DeferredNavCommand::GoAround { distance_nm } => {
                format!("Go around {:.0} nm from the field", distance_nm)
            }
        }
    }
}

fn eta_minutes(ac: &Aircraft, to: &crate::utils::geo::LatLon) -> Option<f64> {
    if ac.gs < 1.0 {
        return None;
    }
    Some(ac.position.distance_nm(to) / ac.gs * 60.0)
}
