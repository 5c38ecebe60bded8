//! Wire-level request/response types. Frames carry a self-describing
//! binary encoding, so tagged variants round-trip without a schema.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::nav::TurnMethod;
use crate::sim::manager::{Catalog, NewSimConfig};
use crate::sim::session::WorldUpdate;
use crate::utils::errors::ClientError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HeadingSpec {
    Heading(f64),
    LeftDeg(f64),
    RightDeg(f64),
    Present,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Call {
    SignOn { version: u32 },
    New(NewSimConfig),
    SignOff,
    GetWorldUpdate,
    GetSerializeSim,
    SetSimRate { rate: f64 },
    TogglePause,
    InitiateTrack { callsign: String },
    DropTrack { callsign: String },
    HandoffTrack { callsign: String, controller: String },
    AcceptHandoff { callsign: String },
    RejectHandoff { callsign: String },
    CancelHandoff { callsign: String },
    PointOut { callsign: String, controller: String },
    SetScratchpad { callsign: String, text: String },
    AssignAltitude { callsign: String, altitude_ft: i32 },
    SetTemporaryAltitude { callsign: String, altitude_ft: i32 },
    AssignHeading { callsign: String, spec: HeadingSpec, turn: TurnMethod },
    AssignSpeed { callsign: String, kt: f64 },
    DirectFix { callsign: String, fix: String },
    DepartFixHeading { callsign: String, fix: String, heading: f64 },
    CrossFixAt { callsign: String, fix: String, altitude: Option<f64>, speed: Option<f64> },
    ExpectApproach { callsign: String, approach: String },
    ClearedApproach { callsign: String, approach: String, straight_in: bool },
    GoAround { callsign: String },
    DeleteAircraft { callsign: String },
    LaunchAircraft { flow: String, airport: String },
    RunAircraftCommands { callsign: String, commands: String },
}

impl Call {
    /// Short name for the request/response log.
    pub fn name(&self) -> &'static str {
        match self {
            Call::SignOn { .. } => "SignOn",
            Call::New(_) => "New",
            Call::SignOff => "SignOff",
            Call::GetWorldUpdate => "GetWorldUpdate",
            Call::GetSerializeSim => "GetSerializeSim",
            Call::SetSimRate { .. } => "SetSimRate",
            Call::TogglePause => "TogglePause",
            Call::InitiateTrack { .. } => "InitiateTrack",
            Call::DropTrack { .. } => "DropTrack",
            Call::HandoffTrack { .. } => "HandoffTrack",
            Call::AcceptHandoff { .. } => "AcceptHandoff",
            Call::RejectHandoff { .. } => "RejectHandoff",
            Call::CancelHandoff { .. } => "CancelHandoff",
            Call::PointOut { .. } => "PointOut",
            Call::SetScratchpad { .. } => "SetScratchpad",
            Call::AssignAltitude { .. } => "AssignAltitude",
            Call::SetTemporaryAltitude { .. } => "SetTemporaryAltitude",
            Call::AssignHeading { .. } => "AssignHeading",
            Call::AssignSpeed { .. } => "AssignSpeed",
            Call::DirectFix { .. } => "DirectFix",
            Call::DepartFixHeading { .. } => "DepartFixHeading",
            Call::CrossFixAt { .. } => "CrossFixAt",
            Call::ExpectApproach { .. } => "ExpectApproach",
            Call::ClearedApproach { .. } => "ClearedApproach",
            Call::GoAround { .. } => "GoAround",
            Call::DeleteAircraft { .. } => "DeleteAircraft",
            Call::LaunchAircraft { .. } => "LaunchAircraft",
            Call::RunAircraftCommands { .. } => "RunAircraftCommands",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub token: Option<Uuid>,
    pub call: Call,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    Empty,
    Catalog(Catalog),
    SignedOn { token: Uuid, update: WorldUpdate },
    WorldUpdate(WorldUpdate),
    SerializedSim(Vec<u8>),
    Launched { callsign: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    pub result: Result<Reply, ClientError>,
}
