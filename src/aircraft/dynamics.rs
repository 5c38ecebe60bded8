//! Kinematic integration: drives heading, speed, altitude, and position
//! toward the nav targets, honoring the commanded rates and the airframe's
//! physical limits.

use serde::{Deserialize, Serialize};

use crate::aircraft::Aircraft;
use crate::nav::{NavTargets, TurnMethod};
use crate::utils::geo::{heading_difference, normalize_heading};

/// Wind at the surface, blowing FROM `direction` (true degrees).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Wind {
    pub direction: f64,
    pub speed: f64, // knots
}

// Airframe limits applied when the nav rate is effectively "immediate".
const MAX_ACCELERATION: f64 = 60.0; // knots per minute
const MAX_DECELERATION: f64 = 90.0; // knots per minute

/// Radius of a turn at the given ground speed and turn rate.
pub fn turn_radius_nm(gs_kt: f64, rate_deg_s: f64) -> f64 {
    if rate_deg_s <= 0.0 {
        return 0.0;
    }
    (gs_kt / 3600.0) / rate_deg_s.to_radians()
}

/// Advance the aircraft by `dt_s` simulated seconds toward `targets`.
pub fn advance(ac: &mut Aircraft, targets: &NavTargets, wind: Wind, mag_var: f64, dt_s: f64) {
    advance_heading(ac, targets, dt_s);
    advance_speed(ac, targets, dt_s);
    advance_altitude(ac, targets, dt_s);

    // Ground speed: TAS plus the tailwind component along track.
    let true_heading = normalize_heading(ac.heading + mag_var);
    let tas = ac.ias * (1.0 + (ac.altitude / 1000.0) * 0.02);
    let tailwind = -wind.speed * (true_heading - wind.direction).to_radians().cos();
    ac.gs = (tas + tailwind).max(0.0);

    ac.position = ac.position.offset(true_heading, ac.gs * dt_s / 3600.0);
}

fn advance_heading(ac: &mut Aircraft, targets: &NavTargets, dt_s: f64) {
    let diff = heading_difference(ac.heading, targets.heading);
    if diff.abs() < 1e-9 {
        return;
    }

    // Signed degrees of travel, per the requested turn direction.
    let travel = match targets.turn {
        TurnMethod::Closest => diff,
        TurnMethod::Left => {
            if diff > 0.0 {
                diff - 360.0
            } else {
                diff
            }
        }
        TurnMethod::Right => {
            if diff < 0.0 {
                diff + 360.0
            } else {
                diff
            }
        }
    };

    let step = targets.heading_rate * dt_s;
    if step >= travel.abs() {
        ac.heading = normalize_heading(targets.heading);
    } else {
        ac.heading = normalize_heading(ac.heading + step * travel.signum());
    }
}

fn advance_speed(ac: &mut Aircraft, targets: &NavTargets, dt_s: f64) {
    let delta = targets.ias - ac.ias;
    if delta.abs() < 1e-9 {
        return;
    }

    let limit = if delta > 0.0 { MAX_ACCELERATION } else { MAX_DECELERATION };
    let rate = targets.ias_rate.min(limit);
    let step = rate / 60.0 * dt_s;

    if step >= delta.abs() {
        ac.ias = targets.ias;
    } else {
        ac.ias += step * delta.signum();
    }
}

fn advance_altitude(ac: &mut Aircraft, targets: &NavTargets, dt_s: f64) {
    let delta = targets.altitude - ac.altitude;
    if delta.abs() < 1e-9 {
        return;
    }

    let limit = if delta > 0.0 {
        ac.performance.climb_rate
    } else {
        ac.performance.descent_rate
    };
    let rate = targets.altitude_rate.min(limit);
    let step = rate / 60.0 * dt_s;

    if step >= delta.abs() {
        ac.altitude = targets.altitude;
    } else {
        ac.altitude += step * delta.signum();
    }
}
