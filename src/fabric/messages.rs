use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fabric::squawk::Squawk;

/// Originating facility plus the Zulu time the message was composed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceId {
    pub facility: String,
    pub zulu: DateTime<Utc>,
}

impl SourceId {
    pub fn new(facility: impl Into<String>, zulu: DateTime<Utc>) -> Self {
        Self { facility: facility.into(), zulu }
    }

    /// The facility identifier is the first three characters.
    pub fn facility_id(&self) -> &str {
        let end = self.facility.len().min(3);
        &self.facility[..end]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinationTimeKind {
    Arrival,
    Proposed,
    Estimated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationTime {
    pub time: DateTime<Utc>,
    pub kind: CoordinationTimeKind,
}

/// Ownership block carried by transfer messages and recorded in the
/// track-info tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub owner: String,
    pub handoff_target: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Plan,
    Amendment,
    Cancellation,
    RequestFlightPlan,
    DepartureDM,
    BeaconTerminate,
    InitiateTransfer,
    AcceptRecallTransfer,
}

/// Inter-facility flight-data message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightPlanMessage {
    pub kind: MessageKind,
    pub source: SourceId,
    pub bcn: Squawk,
    pub flight_id: String,
    pub coordination_fix: String,
    pub coordination_time: Option<CoordinationTime>,
    pub altitude: String,
    pub route: String,
    pub track: Option<TrackInfo>,
}

impl FlightPlanMessage {
    pub fn new(
        kind: MessageKind,
        source: SourceId,
        bcn: Squawk,
        flight_id: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            source,
            bcn,
            flight_id: flight_id.into(),
            coordination_fix: String::new(),
            coordination_time: None,
            altitude: String::new(),
            route: String::new(),
            track: None,
        }
    }

    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = route.into();
        self
    }

    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.coordination_fix = fix.into();
        self
    }

    pub fn with_altitude(mut self, altitude: impl Into<String>) -> Self {
        self.altitude = altitude.into();
        self
    }

    pub fn with_track(mut self, track: TrackInfo) -> Self {
        self.track = Some(track);
        self
    }

    /// Altitude string as feet, when it parses.
    pub fn altitude_ft(&self) -> Option<i32> {
        self.altitude.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facility_id_prefix() {
        let src = SourceId::new("N90C", Utc::now());
        assert_eq!(src.facility_id(), "N90");
    }

    #[test]
    fn test_altitude_parses() {
        let msg = FlightPlanMessage::new(
            MessageKind::Plan,
            SourceId::new("ZNY", Utc::now()),
            Squawk(0o2017),
            "DAL123",
        )
        .with_altitude("11000");
        assert_eq!(msg.altitude_ft(), Some(11000));
    }
}
