//! Controller command interpreter: tokenised, prefix-dispatched clauses
//! applied left to right. Parsing short-circuits on the first bad token;
//! effects already applied stand, and the unparsed remainder becomes the
//! aircraft's sticky input.

use crate::aircraft::{Aircraft, ApproachClearance, Waypoint};
use crate::nav::{
    DeferredNavCommand, LateralCommand, SpeedCommand, TurnMethod, VerticalCommand,
};
use crate::scenario::ScenarioGroup;
use crate::utils::errors::ClientError;
use crate::utils::geo::normalize_heading;

/// One parsed clause, not yet applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    FlyHeading { heading: f64, turn: TurnMethod },
    FlyPresentHeading,
    TurnBy { degrees: f64, turn: TurnMethod },
    ClearAltitude(f64),
    ClearedApproach { id: String, straight_in: bool },
    ExpectApproach(String),
    CrossFix { fix: String, altitude: Option<f64>, speed: Option<f64> },
    DirectFix(String),
    DepartFixHeading { fix: String, heading: f64 },
    AssignSpeed(f64),
    ClearSpeedRestriction,
}

/// Run a controller command string against one aircraft.
pub fn run_aircraft_commands(
    ac: &mut Aircraft,
    group: &ScenarioGroup,
    input: &str,
) -> Result<(), ClientError> {
    ac.sticky_input.clear();
    let tokens: Vec<&str> = input.split_whitespace().collect();

    for (i, token) in tokens.iter().enumerate() {
        let result = parse_token(token).and_then(|effect| apply_effect(ac, group, effect));
        if let Err(e) = result {
            ac.sticky_input = tokens[i..].join(" ");
            return Err(e);
        }
    }
    Ok(())
}

/// Prefix dispatch for a single token.
pub fn parse_token(token: &str) -> Result<Effect, ClientError> {
    let bad = || ClientError::InvalidCommandSyntax(token.to_string());
    let upper = token.to_ascii_uppercase();

    if let Some(rest) = upper.strip_prefix("CSI") {
        if rest.is_empty() {
            return Err(bad());
        }
        return Ok(Effect::ClearedApproach { id: rest.to_string(), straight_in: true });
    }

    let mut chars = upper.chars();
    let prefix = chars.next().ok_or_else(bad)?;
    let rest = chars.as_str();

    match prefix {
        'H' => {
            if rest.is_empty() {
                Ok(Effect::FlyPresentHeading)
            } else {
                Ok(Effect::FlyHeading { heading: parse_heading(rest).ok_or_else(bad)?, turn: TurnMethod::Closest })
            }
        }
        'L' | 'R' => {
            let turn = if prefix == 'L' { TurnMethod::Left } else { TurnMethod::Right };
            if let Some(deg) = rest.strip_suffix('D') {
                let degrees: f64 = deg.parse().map_err(|_| bad())?;
                if !(1.0..=360.0).contains(&degrees) {
                    return Err(bad());
                }
                Ok(Effect::TurnBy { degrees, turn })
            } else {
                Ok(Effect::FlyHeading { heading: parse_heading(rest).ok_or_else(bad)?, turn })
            }
        }
        'C' => {
            if rest.is_empty() {
                Err(bad())
            } else if rest.bytes().all(|b| b.is_ascii_digit()) {
                Ok(Effect::ClearAltitude(parse_altitude(rest).ok_or_else(bad)?))
            } else if rest.contains('/') {
                parse_cross_fix(rest).ok_or_else(bad)
            } else {
                Ok(Effect::ClearedApproach { id: rest.to_string(), straight_in: false })
            }
        }
        'D' => {
            if rest.is_empty() {
                Err(bad())
            } else if rest.bytes().all(|b| b.is_ascii_digit()) {
                Ok(Effect::ClearAltitude(parse_altitude(rest).ok_or_else(bad)?))
            } else if let Some((fix, tail)) = rest.split_once('/') {
                let heading = tail.strip_prefix('H').and_then(parse_heading).ok_or_else(bad)?;
                Ok(Effect::DepartFixHeading { fix: fix.to_string(), heading })
            } else {
                Ok(Effect::DirectFix(rest.to_string()))
            }
        }
        'S' => {
            if rest.is_empty() {
                Ok(Effect::ClearSpeedRestriction)
            } else {
                let kt: f64 = rest.parse().map_err(|_| bad())?;
                if kt == 0.0 {
                    Ok(Effect::ClearSpeedRestriction)
                } else if (50.0..=500.0).contains(&kt) {
                    Ok(Effect::AssignSpeed(kt))
                } else {
                    Err(bad())
                }
            }
        }
        'E' => {
            if rest.is_empty() {
                Err(bad())
            } else {
                Ok(Effect::ExpectApproach(rest.to_string()))
            }
        }
        _ => Err(bad()),
    }
}

fn parse_heading(s: &str) -> Option<f64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let h: f64 = s.parse().ok()?;
    (h <= 360.0).then_some(h)
}

/// Values below 1000 are hundreds of feet.
fn parse_altitude(s: &str) -> Option<f64> {
    let v: f64 = s.parse().ok()?;
    if v < 1000.0 {
        Some(v * 100.0)
    } else {
        Some(v)
    }
}

/// Crossing altitudes: single and double digits are thousands of feet
/// ("cross at 6" is 6000), three digits are hundreds.
fn parse_crossing_altitude(s: &str) -> Option<f64> {
    let v: f64 = s.parse().ok()?;
    if v < 100.0 {
        Some(v * 1000.0)
    } else if v < 1000.0 {
        Some(v * 100.0)
    } else {
        Some(v)
    }
}

/// `<fix>/A<alt>/S<spd>`, either constraint optional, in either order.
fn parse_cross_fix(s: &str) -> Option<Effect> {
    let mut parts = s.split('/');
    let fix = parts.next()?.to_string();
    if fix.is_empty() {
        return None;
    }

    let mut altitude = None;
    let mut speed = None;
    for part in parts {
        if let Some(a) = part.strip_prefix('A') {
            altitude = Some(parse_crossing_altitude(a)?);
        } else if let Some(v) = part.strip_prefix('S') {
            speed = Some(v.parse().ok()?);
        } else {
            return None;
        }
    }
    if altitude.is_none() && speed.is_none() {
        return None;
    }
    Some(Effect::CrossFix { fix, altitude, speed })
}

/// Apply one clause to the aircraft.
pub fn apply_effect(
    ac: &mut Aircraft,
    group: &ScenarioGroup,
    effect: Effect,
) -> Result<(), ClientError> {
    match effect {
        Effect::FlyHeading { heading, turn } => {
            ac.nav.lateral = LateralCommand::fly_heading(heading, turn);
            Ok(())
        }
        Effect::FlyPresentHeading => {
            ac.nav.lateral = LateralCommand::fly_heading(ac.heading, TurnMethod::Closest);
            Ok(())
        }
        Effect::TurnBy { degrees, turn } => {
            let delta = match turn {
                TurnMethod::Left => -degrees,
                _ => degrees,
            };
            ac.nav.lateral =
                LateralCommand::fly_heading(normalize_heading(ac.heading + delta), turn);
            Ok(())
        }
        Effect::ClearAltitude(alt) => {
            if !(0.0..=60_000.0).contains(&alt) {
                return Err(ClientError::IllegalAltitude(alt as i32));
            }
            // On the runway, hold the climb until flying speed.
            if ac.ias < ac.performance.min_speed {
                ac.nav.add_deferred(DeferredNavCommand::ClimbOnceAirborne { alt });
            } else {
                ac.nav.vertical = VerticalCommand::MaintainAltitude { alt };
            }
            Ok(())
        }
        Effect::ClearedApproach { id, straight_in } => {
            let approach = find_approach(ac, group, &id)?;
            ac.approach = Some(ApproachClearance { approach, straight_in, cleared: true });
            ac.nav.add_deferred(DeferredNavCommand::TurnToInterceptLocalizer);
            ac.nav.add_deferred(DeferredNavCommand::ApproachSpeedAt5Dme);
            Ok(())
        }
        Effect::ExpectApproach(id) => {
            let approach = find_approach(ac, group, &id)?;
            ac.approach = Some(ApproachClearance { approach, straight_in: false, cleared: false });
            Ok(())
        }
        Effect::CrossFix { fix, altitude, speed } => {
            direct_to_fix(ac, group, &fix)?;
            let wp = ac.waypoints.first_mut().ok_or(ClientError::NoSuchFix(fix))?;
            if altitude.is_some() {
                wp.altitude_constraint = altitude;
            }
            if speed.is_some() {
                wp.speed_constraint = speed;
            }
            ac.nav.lateral = LateralCommand::FlyRoute;
            ac.nav.vertical = VerticalCommand::FlyRoute;
            ac.nav.speed = SpeedCommand::FlyRoute;
            Ok(())
        }
        Effect::DirectFix(fix) => {
            direct_to_fix(ac, group, &fix)?;
            ac.nav.lateral = LateralCommand::FlyRoute;
            Ok(())
        }
        Effect::DepartFixHeading { fix, heading } => {
            direct_to_fix(ac, group, &fix)?;
            if let Some(wp) = ac.waypoints.first_mut() {
                wp.depart_heading = Some(heading);
            }
            ac.nav.lateral = LateralCommand::FlyRoute;
            Ok(())
        }
        Effect::AssignSpeed(kt) => {
            ac.nav.speed = SpeedCommand::MaintainSpeed { ias: kt };
            Ok(())
        }
        Effect::ClearSpeedRestriction => {
            ac.nav.speed = SpeedCommand::FlyRoute;
            Ok(())
        }
    }
}

/// Direct the aircraft to a fix: drop preceding waypoints if it is on the
/// assigned route, otherwise make it the route.
fn direct_to_fix(ac: &mut Aircraft, group: &ScenarioGroup, fix: &str) -> Result<(), ClientError> {
    if let Some(idx) = ac.waypoints.iter().position(|wp| wp.fix == fix) {
        ac.waypoints.drain(..idx);
        return Ok(());
    }
    let location = group
        .fix_location(fix)
        .ok_or_else(|| ClientError::NoSuchFix(fix.to_string()))?;
    ac.waypoints = vec![Waypoint::at(fix, location)];
    Ok(())
}

fn find_approach(
    ac: &Aircraft,
    group: &ScenarioGroup,
    id: &str,
) -> Result<crate::aircraft::Approach, ClientError> {
    group
        .airports
        .get(&ac.flight_plan.arrival)
        .and_then(|airport| airport.approaches.get(id))
        .cloned()
        .ok_or_else(|| ClientError::NoSuchApproach(id.to_string()))
}
