use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced to clients at the RPC boundary. These are recoverable:
/// the connection stays up and the reply carries the error verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ClientError {
    #[error("unknown or expired token")]
    UnknownToken,
    #[error("a simulation named {0:?} already exists")]
    DuplicateSimName(String),
    #[error("unknown controller position {0:?}")]
    UnknownControllerPosition(String),
    #[error("controller position {0:?} is already covered")]
    ControllerPositionTaken(String),
    #[error("illegal aircraft callsign {0:?}")]
    IllegalCallsign(String),
    #[error("illegal scratchpad {0:?}")]
    IllegalScratchpad(String),
    #[error("illegal altitude {0}")]
    IllegalAltitude(i32),
    #[error("no flight plan filed for {0}")]
    NoFlightPlan(String),
    #[error("no such aircraft {0}")]
    NoSuchAircraft(String),
    #[error("no such facility {0}")]
    NoSuchFacility(String),
    #[error("no such fix {0}")]
    NoSuchFix(String),
    #[error("no such approach {0}")]
    NoSuchApproach(String),
    #[error("unable to parse beacon code {0:?}")]
    SquawkParse(String),
    #[error("invalid command syntax: {0}")]
    InvalidCommandSyntax(String),
    #[error("airport string too long: {0:?}")]
    AirportTooLong(String),
    #[error("no such session {0:?}")]
    NoSuchSession(String),
    #[error("no such scenario {0:?}")]
    NoSuchScenario(String),
    #[error("aircraft is not in a state where that instruction applies")]
    InvalidAircraftState,
    #[error("handoff target is not signed in")]
    HandoffTargetNotSignedIn,
    #[error("no handoff pending for that aircraft")]
    NoPendingHandoff,
    #[error("aircraft is already tracked")]
    AlreadyTracked,
    #[error("protocol version mismatch: client {client}, server {server}")]
    VersionMismatch { client: u32, server: u32 },
    #[error("internal error: {0}")]
    Internal(String),
}

impl ClientError {
    /// Invariant violation inside a handler; the handler aborts with an
    /// internal-error reply and the session state is left untouched.
    pub fn internal(context: impl Into<String>) -> Self {
        ClientError::Internal(context.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let e = ClientError::NoSuchAircraft("DAL123".into());
        assert_eq!(e.to_string(), "no such aircraft DAL123");
    }

    #[test]
    fn test_round_trip() {
        let e = ClientError::VersionMismatch { client: 2, server: 1 };
        let mut buf = Vec::new();
        ciborium::ser::into_writer(&e, &mut buf).unwrap();
        let back: ClientError = ciborium::de::from_reader(buf.as_slice()).unwrap();
        assert_eq!(e, back);
    }
}
