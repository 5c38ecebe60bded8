use tracon_sweatbox::fabric::squawk::Squawk;
use tracon_sweatbox::scenario::ScenarioGroup;
use tracon_sweatbox::sim::events::ServerEvent;
use tracon_sweatbox::sim::session::World;

fn south_flow() -> (World, ScenarioGroup) {
    let group = ScenarioGroup::builtin();
    let world = World::new(&group, "South Flow").unwrap();
    (world, group)
}

#[test]
fn handoff_accept_notifies_both_controllers() {
    let (mut world, group) = south_flow();
    let c1 = world.sign_on(&group, "2W").unwrap();
    let c2 = world.sign_on(&group, "4P").unwrap();

    let callsign = world.spawn_arrival(&group, "CAMRN", "KJFK").unwrap();
    world.aircraft.get_mut(&callsign).unwrap().tracking_controller = None;
    world.initiate_track(&c1, &callsign).unwrap();
    world.handoff_track(&c1, &callsign, "4P").unwrap();
    world.accept_handoff(&c2, &callsign).unwrap();

    assert_eq!(world.aircraft[&callsign].tracking_controller.as_deref(), Some("4P"));
    assert_eq!(world.aircraft[&callsign].handoff_target, None);

    for token in [&c1, &c2] {
        let update = world.world_update(token).unwrap();
        assert!(
            update.events.iter().any(|e| matches!(
                e,
                ServerEvent::DataAcceptance { flight_id, .. } if *flight_id == callsign
            )),
            "missing acceptance notification"
        );
    }
}

#[test]
fn pause_freezes_simulated_time() {
    let (mut world, group) = south_flow();
    let token = world.sign_on(&group, "2W").unwrap();

    world.tick(&group, 0.5);
    let frozen = world.sim_time;
    world.toggle_pause(&token).unwrap();

    // Ten real seconds of paused wall clock: a hundred worker iterations.
    for _ in 0..100 {
        world.tick(&group, 0.5);
    }
    assert_eq!(world.sim_time, frozen);

    // The first tick after unpause advances by one step, not by the
    // accumulated wall clock.
    world.toggle_pause(&token).unwrap();
    world.tick(&group, 0.5);
    assert!((world.sim_time - frozen - 0.5).abs() < 1e-9);
}

#[test]
fn deleted_aircraft_returns_its_squawk() {
    let (mut world, group) = south_flow();
    let token = world.sign_on(&group, "2W").unwrap();

    let callsign = world.spawn_arrival(&group, "CAMRN", "KJFK").unwrap();
    let code = world.aircraft[&callsign].squawk;
    assert_ne!(code, Squawk::NONE);
    assert!(!world.fabric.erams["ZNY"].squawk_pool.contains(code));

    world.delete_aircraft(&token, &group, &callsign).unwrap();
    // The recall travels through the fabric on the next sort pass.
    world.tick(&group, 0.5);

    assert!(world.fabric.erams["ZNY"].squawk_pool.contains(code));
    assert!(!world.fabric.erams["ZNY"].flight_plans.contains_key(&code));
}

#[test]
fn squawks_are_never_duplicated() {
    let (mut world, group) = south_flow();

    // Run long enough to spawn a stream of traffic.
    for _ in 0..1200 {
        world.tick(&group, 0.5);
    }

    let mut seen = std::collections::HashSet::new();
    for ac in world.aircraft.values() {
        if ac.squawk != Squawk::NONE {
            assert!(seen.insert(ac.squawk), "duplicate beacon code {}", ac.squawk);
        }
    }
}

#[test]
fn world_update_is_a_delta() {
    let (mut world, group) = south_flow();
    let token = world.sign_on(&group, "2W").unwrap();

    world.set_rate(&token, 4.0).unwrap();
    let first = world.world_update(&token).unwrap();
    assert!(first.events.iter().any(|e| matches!(e, ServerEvent::RateChanged { rate } if *rate == 4.0)));

    let second = world.world_update(&token).unwrap();
    assert!(second.events.is_empty());
    assert_eq!(second.rate, 4.0);
}

#[test]
fn session_snapshot_round_trips() {
    let (mut world, group) = south_flow();
    world.spawn_arrival(&group, "CAMRN", "KJFK").unwrap();
    for _ in 0..60 {
        world.tick(&group, 0.5);
    }

    let blob = world.serialize().unwrap();
    let restored = World::restore(&group, World::deserialize(&blob).unwrap()).unwrap();

    assert!((restored.sim_time - world.sim_time).abs() < 1e-5);
    assert_eq!(restored.aircraft.len(), world.aircraft.len());
    for (callsign, ac) in &world.aircraft {
        let other = &restored.aircraft[callsign];
        assert!((other.position.lat - ac.position.lat).abs() < 1e-5);
        assert!((other.position.lon - ac.position.lon).abs() < 1e-5);
        assert!((other.altitude - ac.altitude).abs() < 1e-5);
        assert!((other.ias - ac.ias).abs() < 1e-5);
        assert_eq!(other.nav, ac.nav);
    }
}

#[test]
fn arrivals_descend_and_land_or_exit_cleanly() {
    let (mut world, group) = south_flow();

    // Half an hour of simulation; every aircraft must stay in a sane state.
    for _ in 0..3600 {
        world.tick(&group, 0.5);
        for ac in world.aircraft.values() {
            assert!(ac.altitude >= 0.0, "{} went underground", ac.callsign);
            assert!(ac.ias >= 0.0);
            assert!((0.0..360.0).contains(&ac.heading));
        }
    }
}
