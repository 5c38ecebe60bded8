//! TCP front end: accept loop, per-connection tasks, and RPC dispatch.

pub mod client;
pub mod codec;
pub mod proto;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::commands::Effect;
use crate::nav::TurnMethod;
use crate::server::proto::{Call, HeadingSpec, Reply, Request, Response};
use crate::sim::manager::SessionManager;
use crate::sim::tts::SpeechSynthesizer;
use crate::utils::errors::ClientError;

/// Per-call deadline; disabled while a debugger is attached.
pub const RPC_TIMEOUT: Duration = Duration::from_secs(5);

const DEFAULT_MAX_CONNECTIONS: usize = 64;

pub struct Server {
    manager: Arc<SessionManager>,
    tts: SpeechSynthesizer,
    host: String,
    port: u16,
    max_connections: usize,
}

impl Server {
    pub fn new(manager: Arc<SessionManager>, host: String, port: u16) -> Self {
        Self {
            manager,
            tts: SpeechSynthesizer::from_env(),
            host,
            port,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub async fn run(&self) -> Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .context(format!("Failed to bind to {}", addr))?;
        self.run_on(listener).await
    }

    /// Accept loop. Connections beyond the limit are refused at accept.
    pub async fn run_on(&self, listener: TcpListener) -> Result<()> {
        info!("[LISTENING] Server is listening on {}", listener.local_addr()?);

        let permits = Arc::new(Semaphore::new(self.max_connections));
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let Ok(permit) = permits.clone().try_acquire_owned() else {
                        warn!("[REFUSED] {} over the connection limit", peer);
                        continue;
                    };
                    info!("[NEW CONNECTION] {} connected", peer);

                    let manager = self.manager.clone();
                    let tts = self.tts.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, manager, tts).await {
                            error!("[ERROR] {}: {}", peer, e);
                        }
                        info!("[DISCONNECTED] {} disconnected", peer);
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!("[ERROR] Failed to accept connection: {}", e);
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    manager: Arc<SessionManager>,
    tts: SpeechSynthesizer,
) -> Result<()> {
    let (mut reader, mut writer) = stream.into_split();

    loop {
        let Some(request) = codec::read_frame::<_, Request>(&mut reader).await? else {
            break;
        };
        let started = Instant::now();
        let name = request.call.name();
        let id = request.id;

        let result = if debugger_attached() {
            dispatch(&manager, &tts, request).await
        } else {
            match tokio::time::timeout(RPC_TIMEOUT, dispatch(&manager, &tts, request)).await {
                Ok(result) => result,
                Err(_) => Err(ClientError::internal("request deadline exceeded")),
            }
        };

        // The client IP never travels on the wire; it is attached here at
        // the codec boundary for audit.
        info!(
            "[RPC] {} #{} from {} -> {} in {:.1?}",
            name,
            id,
            peer.ip(),
            if result.is_ok() { "ok" } else { "err" },
            started.elapsed()
        );

        let version_mismatch =
            matches!(result, Err(ClientError::VersionMismatch { .. }));
        codec::write_frame(&mut writer, &Response { id, result }).await?;
        if version_mismatch {
            // One reply, then the connection closes.
            break;
        }
    }
    Ok(())
}

async fn dispatch(
    manager: &Arc<SessionManager>,
    tts: &SpeechSynthesizer,
    request: Request,
) -> Result<Reply, ClientError> {
    match request.call {
        Call::SignOn { version } => manager.sign_on(version).await.map(Reply::Catalog),
        Call::New(config) => manager
            .new_session(config)
            .await
            .map(|(token, update)| Reply::SignedOn { token, update }),
        call => {
            let token = request.token.ok_or(ClientError::UnknownToken)?;
            if matches!(call, Call::SignOff) {
                manager.sign_off(&token).await?;
                return Ok(Reply::Empty);
            }
            let session = manager.session_for(&token)?;

            match call {
                Call::GetWorldUpdate => session
                    .with_world(|w, _| w.world_update(&token))
                    .await
                    .map(Reply::WorldUpdate),
                Call::GetSerializeSim => session
                    .with_world(|w, _| w.serialize())
                    .await
                    .map(Reply::SerializedSim),
                Call::SetSimRate { rate } => {
                    session.with_world(|w, _| w.set_rate(&token, rate)).await.map(|_| Reply::Empty)
                }
                Call::TogglePause => {
                    session.with_world(|w, _| w.toggle_pause(&token)).await.map(|_| Reply::Empty)
                }
                Call::InitiateTrack { callsign } => session
                    .with_world(|w, _| w.initiate_track(&token, &callsign))
                    .await
                    .map(|_| Reply::Empty),
                Call::DropTrack { callsign } => session
                    .with_world(|w, _| w.drop_track(&token, &callsign))
                    .await
                    .map(|_| Reply::Empty),
                Call::HandoffTrack { callsign, controller } => session
                    .with_world(|w, _| w.handoff_track(&token, &callsign, &controller))
                    .await
                    .map(|_| Reply::Empty),
                Call::AcceptHandoff { callsign } => session
                    .with_world(|w, _| w.accept_handoff(&token, &callsign))
                    .await
                    .map(|_| Reply::Empty),
                Call::RejectHandoff { callsign } => session
                    .with_world(|w, _| w.reject_handoff(&token, &callsign))
                    .await
                    .map(|_| Reply::Empty),
                Call::CancelHandoff { callsign } => session
                    .with_world(|w, _| w.cancel_handoff(&token, &callsign))
                    .await
                    .map(|_| Reply::Empty),
                Call::PointOut { callsign, controller } => session
                    .with_world(|w, _| w.point_out(&token, &callsign, &controller))
                    .await
                    .map(|_| Reply::Empty),
                Call::SetScratchpad { callsign, text } => session
                    .with_world(|w, _| w.set_scratchpad(&token, &callsign, &text))
                    .await
                    .map(|_| Reply::Empty),
                Call::AssignAltitude { callsign, altitude_ft } => session
                    .with_world(|w, g| w.assign_altitude(&token, g, &callsign, altitude_ft))
                    .await
                    .map(|_| Reply::Empty),
                Call::SetTemporaryAltitude { callsign, altitude_ft } => session
                    .with_world(|w, _| w.set_temporary_altitude(&token, &callsign, altitude_ft))
                    .await
                    .map(|_| Reply::Empty),
                Call::AssignHeading { callsign, spec, turn } => {
                    let effect = heading_effect(spec, turn);
                    session
                        .with_world(|w, g| w.apply_effect(&token, g, &callsign, effect))
                        .await
                        .map(|_| Reply::Empty)
                }
                Call::AssignSpeed { callsign, kt } => {
                    let effect = if kt == 0.0 {
                        Effect::ClearSpeedRestriction
                    } else {
                        Effect::AssignSpeed(kt)
                    };
                    session
                        .with_world(|w, g| w.apply_effect(&token, g, &callsign, effect))
                        .await
                        .map(|_| Reply::Empty)
                }
                Call::DirectFix { callsign, fix } => session
                    .with_world(|w, g| {
                        w.apply_effect(&token, g, &callsign, Effect::DirectFix(fix))
                    })
                    .await
                    .map(|_| Reply::Empty),
                Call::DepartFixHeading { callsign, fix, heading } => session
                    .with_world(|w, g| {
                        w.apply_effect(&token, g, &callsign, Effect::DepartFixHeading { fix, heading })
                    })
                    .await
                    .map(|_| Reply::Empty),
                Call::CrossFixAt { callsign, fix, altitude, speed } => session
                    .with_world(|w, g| {
                        w.apply_effect(&token, g, &callsign, Effect::CrossFix { fix, altitude, speed })
                    })
                    .await
                    .map(|_| Reply::Empty),
                Call::ExpectApproach { callsign, approach } => session
                    .with_world(|w, g| w.expect_approach(&token, g, &callsign, &approach))
                    .await
                    .map(|_| Reply::Empty),
                Call::ClearedApproach { callsign, approach, straight_in } => session
                    .with_world(|w, g| {
                        w.cleared_approach(&token, g, &callsign, &approach, straight_in)
                    })
                    .await
                    .map(|_| Reply::Empty),
                Call::GoAround { callsign } => session
                    .with_world(|w, _| w.go_around(&token, &callsign))
                    .await
                    .map(|_| Reply::Empty),
                Call::DeleteAircraft { callsign } => session
                    .with_world(|w, g| w.delete_aircraft(&token, g, &callsign))
                    .await
                    .map(|_| Reply::Empty),
                Call::LaunchAircraft { flow, airport } => session
                    .with_world(|w, g| w.launch_aircraft(&token, g, &flow, &airport))
                    .await
                    .map(|callsign| Reply::Launched { callsign }),
                Call::RunAircraftCommands { callsign, commands } => {
                    let result = session
                        .with_world(|w, g| w.run_aircraft_commands(&token, g, &callsign, &commands))
                        .await;
                    if result.is_ok() && tts.is_enabled() {
                        speak_readback(tts, &callsign);
                    }
                    result.map(|_| Reply::Empty)
                }
                Call::SignOn { .. } | Call::New(_) | Call::SignOff => unreachable!(),
            }
        }
    }
}

fn heading_effect(spec: HeadingSpec, turn: TurnMethod) -> Effect {
    match spec {
        HeadingSpec::Heading(heading) => Effect::FlyHeading { heading, turn },
        HeadingSpec::LeftDeg(degrees) => Effect::TurnBy { degrees, turn: TurnMethod::Left },
        HeadingSpec::RightDeg(degrees) => Effect::TurnBy { degrees, turn: TurnMethod::Right },
        HeadingSpec::Present => Effect::FlyPresentHeading,
    }
}

/// Fire-and-forget readback synthesis; the result channels honor the RPC
/// deadline and whichever side fires is logged.
fn speak_readback(tts: &SpeechSynthesizer, callsign: &str) {
    let future = tts.synthesize(&format!("{}, roger", callsign));
    tokio::spawn(async move {
        match future.wait(RPC_TIMEOUT).await {
            Ok(audio) => debug!("[TTS] readback of {} bytes", audio.len()),
            Err(e) => debug!("[TTS] synthesis failed: {}", e),
        }
    });
}

/// External predicate: per-call deadlines are suppressed under a debugger.
pub fn debugger_attached() -> bool {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if let Some(pid) = line.strip_prefix("TracerPid:") {
                    return pid.trim() != "0";
                }
            }
        }
        false
    }
    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::ScenarioGroup;
    use crate::sim::manager::{NewSimConfig, PROTOCOL_VERSION};
    use std::collections::HashMap;

    fn test_manager() -> Arc<SessionManager> {
        let group = ScenarioGroup::builtin();
        let mut groups = HashMap::new();
        groups.insert(group.name.clone(), group);
        Arc::new(SessionManager::new(groups).with_prespawn(0.0))
    }

    fn request(id: u64, token: Option<uuid::Uuid>, call: Call) -> Request {
        Request { id, token, call }
    }

    #[tokio::test]
    async fn test_sign_on_version_gate() {
        let manager = test_manager();
        let tts = SpeechSynthesizer::disabled();

        let ok = dispatch(&manager, &tts, request(1, None, Call::SignOn { version: PROTOCOL_VERSION }))
            .await;
        assert!(matches!(ok, Ok(Reply::Catalog(_))));

        let err = dispatch(&manager, &tts, request(2, None, Call::SignOn { version: 42 })).await;
        assert!(matches!(err, Err(ClientError::VersionMismatch { .. })));
    }

    #[tokio::test]
    async fn test_unknown_token_rejected() {
        let manager = test_manager();
        let tts = SpeechSynthesizer::disabled();
        let err = dispatch(
            &manager,
            &tts,
            request(1, Some(uuid::Uuid::new_v4()), Call::GetWorldUpdate),
        )
        .await;
        assert_eq!(err, Err(ClientError::UnknownToken));
    }

    #[tokio::test]
    async fn test_full_rpc_flow() {
        let manager = test_manager();
        let tts = SpeechSynthesizer::disabled();

        let config = NewSimConfig {
            name: "sweatbox".to_string(),
            group: "NY Approach South".to_string(),
            scenario: "South Flow".to_string(),
            position: "2W".to_string(),
            join: None,
            prespawn_minutes: Some(0.0),
        };
        let reply = dispatch(&manager, &tts, request(1, None, Call::New(config))).await.unwrap();
        let Reply::SignedOn { token, .. } = reply else { panic!("expected SignedOn") };

        // Launch an aircraft, steer it, and observe the effects in a delta.
        let reply = dispatch(
            &manager,
            &tts,
            request(
                2,
                Some(token),
                Call::LaunchAircraft { flow: "CAMRN".to_string(), airport: "KJFK".to_string() },
            ),
        )
        .await
        .unwrap();
        let Reply::Launched { callsign } = reply else { panic!("expected Launched") };

        dispatch(
            &manager,
            &tts,
            request(
                3,
                Some(token),
                Call::RunAircraftCommands { callsign: callsign.clone(), commands: "H180 S210".into() },
            ),
        )
        .await
        .unwrap();

        let reply = dispatch(&manager, &tts, request(4, Some(token), Call::GetWorldUpdate))
            .await
            .unwrap();
        let Reply::WorldUpdate(update) = reply else { panic!("expected WorldUpdate") };
        let snapshot = update.aircraft.iter().find(|a| a.callsign == callsign).unwrap();
        assert!(snapshot.status.contains("Fly heading 180"));
        assert!(snapshot.status.contains("Maintain 210 kts"));
    }
}
