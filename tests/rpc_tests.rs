//! End-to-end RPC tests over a real TCP socket: framed, compressed
//! request/response between the typed client and a served session.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::net::TcpListener;

use tracon_sweatbox::scenario::ScenarioGroup;
use tracon_sweatbox::server::client::RpcClient;
use tracon_sweatbox::server::proto::Call;
use tracon_sweatbox::server::Server;
use tracon_sweatbox::sim::manager::{NewSimConfig, PROTOCOL_VERSION};
use tracon_sweatbox::sim::SessionManager;

async fn serve() -> String {
    let group = ScenarioGroup::builtin();
    let mut groups = HashMap::new();
    groups.insert(group.name.clone(), group);
    let manager = Arc::new(SessionManager::new(groups).with_prespawn(0.0));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let server = Server::new(manager, "127.0.0.1".to_string(), 0);
    tokio::spawn(async move {
        let _ = server.run_on(listener).await;
    });
    addr
}

fn config(name: &str, position: &str) -> NewSimConfig {
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
async fn sign_on_create_and_steer() {
    let addr = serve().await;
    let mut client = RpcClient::connect(&addr).await.unwrap();

    let catalog = client.sign_on(PROTOCOL_VERSION).await.unwrap();
    assert_eq!(catalog.configurations.len(), 1);

    client.new_session(config("sweatbox", "2W")).await.unwrap();
    assert!(client.token().is_some());

    let callsign = client.launch_aircraft("CAMRN", "KJFK").await.unwrap();
    client.run_aircraft_commands(&callsign, "H180 S210").await.unwrap();

    let update = client.get_world_update().await.unwrap();
    let ac = update.aircraft.iter().find(|a| a.callsign == callsign).unwrap();
    assert!(ac.status.contains("Fly heading 180"));
    assert!(ac.status.contains("Maintain 210 kts"));

    // The session snapshot is a valid versioned blob.
    let blob = client.get_serialized_sim().await.unwrap();
    assert!(!blob.is_empty());

    client.sign_off().await.unwrap();
}

#[tokio::test]
async fn version_mismatch_closes_connection() {
    let addr = serve().await;
    let mut client = RpcClient::connect(&addr).await.unwrap();

    let err = client.sign_on(PROTOCOL_VERSION + 1).await.unwrap_err();
    assert!(err.to_string().contains("version"));

    // One reply, then the server hangs up.
    let followup = client.call(Call::SignOn { version: PROTOCOL_VERSION }).await;
    assert!(followup.is_err());
}

#[tokio::test]
async fn unknown_token_is_a_client_error() {
    let addr = serve().await;
    let mut client = RpcClient::connect(&addr).await.unwrap();
    // No sign-on: every stateful call must be refused.
    let err = client.get_world_update().await.unwrap_err();
    assert!(err.to_string().contains("token"));
}

#[tokio::test]
async fn two_controllers_hand_off_over_the_wire() {
    let addr = serve().await;

    let mut c1 = RpcClient::connect(&addr).await.unwrap();
    c1.sign_on(PROTOCOL_VERSION).await.unwrap();
    c1.new_session(config("sweatbox", "2W")).await.unwrap();

    let mut c2 = RpcClient::connect(&addr).await.unwrap();
    c2.sign_on(PROTOCOL_VERSION).await.unwrap();
    let mut join = config("ignored", "4P");
    join.join = Some("sweatbox".to_string());
    c2.new_session(join).await.unwrap();

    let callsign = c1.launch_aircraft("CAMRN", "KJFK").await.unwrap();
    c1.call(Call::InitiateTrack { callsign: callsign.clone() }).await.unwrap();
    c1.call(Call::HandoffTrack { callsign: callsign.clone(), controller: "4P".to_string() })
        .await
        .unwrap();
    c2.call(Call::AcceptHandoff { callsign: callsign.clone() }).await.unwrap();

    let update = c2.get_world_update().await.unwrap();
    let ac = update.aircraft.iter().find(|a| a.callsign == callsign).unwrap();
    assert_eq!(ac.tracking_controller.as_deref(), Some("4P"));
}
