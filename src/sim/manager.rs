//! Process-wide registry of running sessions plus the sign-on flow. The
//! registry lock is coarse and only guards O(1) bookkeeping; it is never
//! held while calling into a session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::scenario::ScenarioGroup;
use crate::sim::session::{Session, WorldUpdate, DEFAULT_PRESPAWN_MINUTES};
use crate::utils::errors::ClientError;

pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationSummary {
    pub group: String,
    pub tracon: String,
    pub scenarios: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningSession {
    pub name: String,
    pub group: String,
    pub scenario: String,
    pub available_positions: Vec<String>,
}

/// What a signing-on client gets to choose from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub configurations: Vec<ConfigurationSummary>,
    pub running: Vec<RunningSession>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSimConfig {
    pub name: String,
    pub group: String,
    pub scenario: String,
    pub position: String,
    /// Join this running session instead of creating a new one.
    pub join: Option<String>,
    pub prespawn_minutes: Option<f64>,
}

struct Registry {
    sessions: HashMap<String, Arc<Session>>,
    tokens: HashMap<Uuid, Arc<Session>>,
}

pub struct SessionManager {
    groups: HashMap<String, Arc<ScenarioGroup>>,
    registry: Mutex<Registry>,
    default_prespawn_minutes: f64,
}

impl SessionManager {
    pub fn new(groups: HashMap<String, ScenarioGroup>) -> Self {
        Self {
            groups: groups.into_iter().map(|(k, v)| (k, Arc::new(v))).collect(),
            registry: Mutex::new(Registry { sessions: HashMap::new(), tokens: HashMap::new() }),
            default_prespawn_minutes: DEFAULT_PRESPAWN_MINUTES,
        }
    }

    pub fn with_prespawn(mut self, minutes: f64) -> Self {
        self.default_prespawn_minutes = minutes;
        self
    }

    /// Protocol handshake: reject mismatched clients, return the catalog.
    pub async fn sign_on(&self, version: u32) -> Result<Catalog, ClientError> {
        if version != PROTOCOL_VERSION {
            return Err(ClientError::VersionMismatch { client: version, server: PROTOCOL_VERSION });
        }
        Ok(self.catalog().await)
    }

    pub async fn catalog(&self) -> Catalog {
        let mut configurations: Vec<ConfigurationSummary> = self
            .groups
            .values()
            .map(|g| {
                let mut scenarios: Vec<String> = g.scenarios.keys().cloned().collect();
                scenarios.sort();
                ConfigurationSummary { group: g.name.clone(), tracon: g.tracon.clone(), scenarios }
            })
            .collect();
        configurations.sort_by(|a, b| a.group.cmp(&b.group));

        let sessions: Vec<(String, Arc<Session>)> = {
            let registry = self.registry.lock().expect("registry lock poisoned");
            registry.sessions.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };

        let mut running = Vec::new();
        for (name, session) in sessions {
            let (scenario, available_positions) = session
                .with_world(|world, group| {
                    (world.scenario_name.clone(), world.available_positions(group))
                })
                .await;
            running.push(RunningSession {
                name,
                group: session.group.name.clone(),
                scenario,
                available_positions,
            });
        }
        running.sort_by(|a, b| a.name.cmp(&b.name));

        Catalog { configurations, running }
    }

    /// Create a new session (or join a running one) and sign the client on
    /// as the requested controller position.
    pub async fn new_session(
        &self,
        config: NewSimConfig,
    ) -> Result<(Uuid, WorldUpdate), ClientError> {
        let session = match &config.join {
            Some(name) => {
                let registry = self.registry.lock().expect("registry lock poisoned");
                registry
                    .sessions
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ClientError::NoSuchSession(name.clone()))?
            }
            None => {
                {
                    let registry = self.registry.lock().expect("registry lock poisoned");
                    if registry.sessions.contains_key(&config.name) {
                        return Err(ClientError::DuplicateSimName(config.name.clone()));
                    }
                }
                let group = self
                    .groups
                    .get(&config.group)
                    .cloned()
                    .ok_or_else(|| ClientError::NoSuchScenario(config.group.clone()))?;
                let prespawn =
                    config.prespawn_minutes.unwrap_or(self.default_prespawn_minutes);
                let session =
                    Session::new(config.name.clone(), group, &config.scenario, prespawn)?;
                session.start();

                let mut registry = self.registry.lock().expect("registry lock poisoned");
                if registry.sessions.contains_key(&config.name) {
                    return Err(ClientError::DuplicateSimName(config.name.clone()));
                }
                registry.sessions.insert(config.name.clone(), session.clone());
                info!("[SESSION] created {} ({}/{})", config.name, config.group, config.scenario);
                session
            }
        };

        let position = config.position.clone();
        let result = session
            .with_world(|world, group| {
                let token = world.sign_on(group, &position)?;
                let update = world.world_update(&token)?;
                Ok::<_, ClientError>((token, update))
            })
            .await;

        let (token, update) = result?;
        let mut registry = self.registry.lock().expect("registry lock poisoned");
        registry.tokens.insert(token, session);
        Ok((token, update))
    }

    /// O(1) token routing.
    pub fn session_for(&self, token: &Uuid) -> Result<Arc<Session>, ClientError> {
        let registry = self.registry.lock().expect("registry lock poisoned");
        registry.tokens.get(token).cloned().ok_or(ClientError::UnknownToken)
    }

    /// Sign a participant off; a session with no participants left is torn
    /// down unless it is the only one.
    pub async fn sign_off(&self, token: &Uuid) -> Result<(), ClientError> {
        let session = {
            let mut registry = self.registry.lock().expect("registry lock poisoned");
            registry.tokens.remove(token).ok_or(ClientError::UnknownToken)?
        };

        let remaining = session
            .with_world(|world, _| {
                world.sign_off(token)?;
                Ok::<_, ClientError>(world.participants.len())
            })
            .await?;

        if remaining == 0 {
            let mut registry = self.registry.lock().expect("registry lock poisoned");
            if registry.sessions.len() > 1 {
                registry.sessions.remove(&session.name);
                info!("[SESSION] {} retired", session.name);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_manager() -> SessionManager {
        let group = ScenarioGroup::builtin();
        let mut groups = HashMap::new();
        groups.insert(group.name.clone(), group);
        SessionManager::new(groups).with_prespawn(0.0)
    }

    fn new_config(name: &str, position: &str) -> NewSimConfig {
        NewSimConfig {
            name: name.to_string(),
            group: "NY Approach South".to_string(),
            scenario: "South Flow".to_string(),
            position: position.to_string(),
            join: None,
            prespawn_minutes: Some(0.0),
        }
    }

    #[tokio::test]
    async fn test_version_mismatch() {
        let manager = test_manager();
        let err = manager.sign_on(99).await.unwrap_err();
        assert_eq!(err, ClientError::VersionMismatch { client: 99, server: PROTOCOL_VERSION });
    }

    #[tokio::test]
    async fn test_catalog_lists_configurations() {
        let manager = test_manager();
        let catalog = manager.sign_on(PROTOCOL_VERSION).await.unwrap();
        assert_eq!(catalog.configurations.len(), 1);
        assert!(catalog.configurations[0].scenarios.contains(&"South Flow".to_string()));
        assert!(catalog.running.is_empty());
    }

    #[tokio::test]
    async fn test_create_join_and_route() {
        let manager = test_manager();
        let (token, update) = manager.new_session(new_config("sweatbox", "2W")).await.unwrap();
        assert_eq!(update.rate, 1.0);
        assert!(manager.session_for(&token).is_ok());

        // A second client joins the running session on another position.
        let mut join = new_config("ignored", "4P");
        join.join = Some("sweatbox".to_string());
        let (token2, _) = manager.new_session(join).await.unwrap();
        assert_ne!(token, token2);

        let catalog = manager.catalog().await;
        assert_eq!(catalog.running.len(), 1);
        assert!(catalog.running[0].available_positions.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let manager = test_manager();
        manager.new_session(new_config("sweatbox", "2W")).await.unwrap();
        let err = manager.new_session(new_config("sweatbox", "4P")).await.unwrap_err();
        assert_eq!(err, ClientError::DuplicateSimName("sweatbox".to_string()));
    }

    #[tokio::test]
    async fn test_sign_off_invalidates_token() {
        let manager = test_manager();
        let (token, _) = manager.new_session(new_config("sweatbox", "2W")).await.unwrap();
        manager.sign_off(&token).await.unwrap();
        assert!(manager.session_for(&token).is_err());
        // The only session stays alive for the next client.
        assert_eq!(manager.catalog().await.running.len(), 1);
    }
}
