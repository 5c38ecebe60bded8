//! Typed RPC client: one TCP connection, sequential request/response with
//! a per-call deadline.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use uuid::Uuid;

use crate::server::codec;
use crate::server::proto::{Call, Reply, Request, Response};
use crate::server::RPC_TIMEOUT;
use crate::sim::manager::{Catalog, NewSimConfig};
use crate::sim::session::WorldUpdate;

pub struct RpcClient {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    next_id: u64,
    deadline: Duration,
    token: Option<Uuid>,
}

impl RpcClient {
    pub async fn connect(addr: &str) -> Result<RpcClient> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("Failed to connect to {}", addr))?;
        let (reader, writer) = stream.into_split();
        Ok(RpcClient { reader, writer, next_id: 1, deadline: RPC_TIMEOUT, token: None })
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn token(&self) -> Option<Uuid> {
        self.token
    }

    /// One round trip. The call times out at the client-side deadline; the
    /// server may still complete the work.
    pub async fn call(&mut self, call: Call) -> Result<Reply> {
        let id = self.next_id;
        self.next_id += 1;
        let request = Request { id, token: self.token, call };

        let exchange = async {
            codec::write_frame(&mut self.writer, &request).await?;
            loop {
                let response: Response = codec::read_frame(&mut self.reader)
                    .await?
                    .context("server closed the connection")?;
                if response.id == id {
                    return Ok::<Response, anyhow::Error>(response);
                }
            }
        };

        let response = tokio::time::timeout(self.deadline, exchange)
            .await
            .context("request deadline exceeded")??;
        response.result.map_err(|e| anyhow::anyhow!(e))
    }

    pub async fn sign_on(&mut self, version: u32) -> Result<Catalog> {
        match self.call(Call::SignOn { version }).await? {
            Reply::Catalog(catalog) => Ok(catalog),
            other => anyhow::bail!("unexpected reply to SignOn: {:?}", other),
        }
    }

    /// Create or join a session; the returned token rides on every later
    /// call automatically.
    pub async fn new_session(&mut self, config: NewSimConfig) -> Result<WorldUpdate> {
        match self.call(Call::New(config)).await? {
            Reply::SignedOn { token, update } => {
                self.token = Some(token);
                Ok(update)
            }
            other => anyhow::bail!("unexpected reply to New: {:?}", other),
        }
    }

    pub async fn sign_off(&mut self) -> Result<()> {
        self.call(Call::SignOff).await?;
        self.token = None;
        Ok(())
    }

    pub async fn get_world_update(&mut self) -> Result<WorldUpdate> {
        match self.call(Call::GetWorldUpdate).await? {
            Reply::WorldUpdate(update) => Ok(update),
            other => anyhow::bail!("unexpected reply to GetWorldUpdate: {:?}", other),
        }
    }

    pub async fn launch_aircraft(&mut self, flow: &str, airport: &str) -> Result<String> {
        let call = Call::LaunchAircraft { flow: flow.to_string(), airport: airport.to_string() };
        match self.call(call).await? {
            Reply::Launched { callsign } => Ok(callsign),
            other => anyhow::bail!("unexpected reply to LaunchAircraft: {:?}", other),
        }
    }

    pub async fn run_aircraft_commands(&mut self, callsign: &str, commands: &str) -> Result<()> {
        self.call(Call::RunAircraftCommands {
            callsign: callsign.to_string(),
            commands: commands.to_string(),
        })
        .await?;
        Ok(())
    }

    pub async fn get_serialized_sim(&mut self) -> Result<Vec<u8>> {
        match self.call(Call::GetSerializeSim).await? {
            Reply::SerializedSim(blob) => Ok(blob),
            other => anyhow::bail!("unexpected reply to GetSerializeSim: {:?}", other),
        }
    }
}
