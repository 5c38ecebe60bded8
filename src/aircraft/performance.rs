use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Performance envelope for one aircraft type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceEnvelope {
    pub min_speed: f64,     // Vmin, knots IAS
    pub v2: f64,            // takeoff safety speed, knots
    pub landing_speed: f64, // Vref, knots
    pub cruise_speed: f64,  // knots IAS
    pub climb_rate: f64,    // ft/min
    pub descent_rate: f64,  // ft/min, positive
}

impl Default for PerformanceEnvelope {
    fn default() -> Self {
        // Generic medium twin jet
        Self {
            min_speed: 130.0,
            v2: 145.0,
            landing_speed: 140.0,
            cruise_speed: 290.0,
            climb_rate: 2200.0,
            descent_rate: 2000.0,
        }
    }
}

pub type PerformanceDatabase = HashMap<String, PerformanceEnvelope>;

/// Built-in performance table. Types not listed fall back to the default
/// envelope.
pub fn builtin_performance() -> PerformanceDatabase {
    let mut db = HashMap::new();

    let mut add = |types: &[&str], env: PerformanceEnvelope| {
        for t in types {
            db.insert(t.to_string(), env.clone());
        }
    };

    add(
        &["B738", "B737", "B38M", "B739"],
        PerformanceEnvelope {
            min_speed: 135.0,
            v2: 150.0,
            landing_speed: 140.0,
            cruise_speed: 290.0,
            climb_rate: 2500.0,
            descent_rate: 2200.0,
        },
    );
    add(
        &["A319", "A320", "A321", "A20N", "A21N"],
        PerformanceEnvelope {
            min_speed: 130.0,
            v2: 145.0,
            landing_speed: 138.0,
            cruise_speed: 285.0,
            climb_rate: 2400.0,
            descent_rate: 2100.0,
        },
    );
    add(
        &["B77W", "B772", "B777", "B788", "B789", "B78X"],
        PerformanceEnvelope {
            min_speed: 140.0,
            v2: 160.0,
            landing_speed: 145.0,
            cruise_speed: 300.0,
            climb_rate: 2200.0,
            descent_rate: 2000.0,
        },
    );
    add(
        &["A332", "A333", "A339"],
        PerformanceEnvelope {
            min_speed: 138.0,
            v2: 155.0,
            landing_speed: 142.0,
            cruise_speed: 295.0,
            climb_rate: 2100.0,
            descent_rate: 2000.0,
        },
    );
    add(
        &["CRJ7", "CRJ9", "E145", "E170", "E75L", "E190"],
        PerformanceEnvelope {
            min_speed: 120.0,
            v2: 140.0,
            landing_speed: 130.0,
            cruise_speed: 280.0,
            climb_rate: 2800.0,
            descent_rate: 2400.0,
        },
    );
    add(
        &["C172", "PA28", "BE36"],
        PerformanceEnvelope {
            min_speed: 50.0,
            v2: 65.0,
            landing_speed: 65.0,
            cruise_speed: 110.0,
            climb_rate: 700.0,
            descent_rate: 700.0,
        },
    );

    db
}

pub fn envelope_for(db: &PerformanceDatabase, aircraft_type: &str) -> PerformanceEnvelope {
    db.get(aircraft_type).cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_type() {
        let db = builtin_performance();
        let env = envelope_for(&db, "B738");
        assert_eq!(env.landing_speed, 140.0);
        assert_eq!(env.climb_rate, 2500.0);
    }

    #[test]
    fn test_unknown_type_falls_back() {
        let db = builtin_performance();
        let env = envelope_for(&db, "ZZZZ");
        assert_eq!(env, PerformanceEnvelope::default());
    }
}
