pub mod aircraft;
pub mod dynamics;
pub mod flight_plan;
pub mod performance;

pub use aircraft::{Aircraft, HandoffState, TickEvent, MAX_CALLSIGN_LEN};
pub use dynamics::Wind;
pub use flight_plan::{
    Approach, ApproachClearance, ApproachKind, ArcDirection, DmeArc, FlightPlan, FlightRules,
    Waypoint,
};
