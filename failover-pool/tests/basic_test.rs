// Copyright 2020 Joyent, Inc.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use failover_pool::config::ManagerConfig;
use failover_pool::connection::Connection;
use failover_pool::error::Error;
use failover_pool::manager::types::Tries;
use failover_pool::manager::{ConnectionManager, Manager, PooledConnection};
use failover_pool::order::RoundRobin;

use common::{log, FakeFactory};

fn manager(config: &ManagerConfig) -> ConnectionManager<FakeFactory> {
    ConnectionManager::new(config, FakeFactory::new(), Some(log())).unwrap()
}

#[test]
fn all_servers_down_exhausts_every_round() {
    let config = ManagerConfig::new(vec!["a", "b", "c"])
        .tries(3)
        .sleep_time(20);
    let manager = manager(&config);
    let state = manager.factory().state.clone();
    for server in &["a", "b", "c"] {
        state.set_down(server);
    }

    let start = Instant::now();
    match manager.get_connection() {
        Err(Error::ConnectionUnavailable { servers, rounds }) => {
            assert_eq!(servers, 3);
            assert_eq!(rounds, 3);
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(start.elapsed() >= Duration::from_millis(40));

    // One attempt per server per round, in list order every round
    assert_eq!(
        state.attempts(),
        vec!["a", "b", "c", "a", "b", "c", "a", "b", "c"]
    );

    let stats = manager.stats();
    assert_eq!(stats.rounds, 3);
    assert_eq!(stats.attempts, 9);
    assert_eq!(stats.failed_attempts, 9);
    assert_eq!(stats.sleeps, 2);
    assert_eq!(stats.created_connections, 0.into());
}

#[test]
fn failover_to_second_server() {
    let config = ManagerConfig::new(vec!["a", "b"]).tries(3).sleep_time(5000);
    let manager = manager(&config);
    let state = manager.factory().state.clone();
    state.set_down("a");

    let start = Instant::now();
    let conn = manager.get_connection().unwrap();
    assert_eq!(conn.server(), "b");
    assert!(start.elapsed() < Duration::from_secs(5));

    assert_eq!(state.attempts(), vec!["a", "b"]);
    let stats = manager.stats();
    assert_eq!(stats.rounds, 1);
    assert_eq!(stats.failed_attempts, 1);
    assert_eq!(stats.sleeps, 0);
    assert_eq!(stats.created_connections, 1.into());
}

#[test]
fn first_success_ends_the_round() {
    let config = ManagerConfig::new(vec!["a", "b", "c"]).tries(1).sleep_time(0);
    let manager = manager(&config);
    let state = manager.factory().state.clone();

    for _ in 0..3 {
        let conn = manager.get_connection().unwrap();
        assert_eq!(conn.server(), "a");
    }
    assert_eq!(state.attempts(), vec!["a", "a", "a"]);
}

#[test]
fn success_in_a_later_round() {
    let config = ManagerConfig::new(vec!["a", "b"]).tries(5).sleep_time(1);
    let manager = manager(&config);
    let state = manager.factory().state.clone();

    // Fails all of round 0 and the first server of round 1
    state.fail_next(3);

    let conn = manager.get_connection().unwrap();
    assert_eq!(conn.server(), "b");
    assert_eq!(state.attempts(), vec!["a", "b", "a", "b"]);

    let stats = manager.stats();
    assert_eq!(stats.rounds, 2);
    assert_eq!(stats.sleeps, 1);
}

#[test]
fn unbounded_tries_keep_going() {
    let config = ManagerConfig::new(vec!["a"]).tries(0).sleep_time(1);
    let manager = manager(&config);
    assert_eq!(manager.retry_options().tries, Tries::Unbounded);

    let state = manager.factory().state.clone();
    state.fail_next(25);

    let conn = manager.get_connection().unwrap();
    assert_eq!(conn.server(), "a");
    assert_eq!(manager.stats().rounds, 26);
    assert_eq!(manager.stats().sleeps, 25);
}

#[test]
fn negative_sleep_time_does_not_sleep() {
    let config = ManagerConfig::new(vec!["a"]).tries(4).sleep_time(-1000);
    let manager = manager(&config);
    assert_eq!(manager.retry_options().sleep_time, Duration::from_millis(0));
    manager.factory().state.set_down("a");

    let start = Instant::now();
    assert!(manager.get_connection().is_err());
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(manager.stats().sleeps, 3);
}

#[test]
fn timeouts_are_passed_to_the_factory() {
    let config = ManagerConfig::new(vec!["a"])
        .tries(1)
        .sleep_time(0)
        .so_timeout(1500)
        .con_timeout("250");
    let manager = manager(&config);

    let _conn = manager.try_to_connect(&"a".to_string()).unwrap();
    assert_eq!(
        manager.factory().state.last_timeouts(),
        Some((Duration::from_millis(1500), Duration::from_millis(250)))
    );
}

#[test]
fn invalid_server_entries_are_skipped() {
    let config = ManagerConfig::new(vec!["a", "!bogus", "", "b"])
        .tries(1)
        .sleep_time(0);
    let manager = manager(&config);
    assert_eq!(manager.servers(), vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn missing_required_settings_are_fatal() {
    let no_tries = ManagerConfig::new(vec!["a"]).sleep_time(10);
    let result = ConnectionManager::new(&no_tries, FakeFactory::new(), None);
    assert!(matches!(result, Err(Error::Configuration(_))));

    let bad_sleep = ManagerConfig::new(vec!["a"]).tries(1).sleep_time("long");
    let result = ConnectionManager::new(&bad_sleep, FakeFactory::new(), None);
    assert!(matches!(result, Err(Error::Configuration(_))));
}

#[test]
fn no_servers_fails_immediately() {
    let config = ManagerConfig::new(vec!["!bogus"]).tries(0).sleep_time(1000);
    let manager = manager(&config);

    match manager.get_connection() {
        Err(Error::ConnectionUnavailable { servers, rounds }) => {
            assert_eq!(servers, 0);
            assert_eq!(rounds, 0);
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn give_connection_disconnects() {
    let config = ManagerConfig::new(vec!["a"]).tries(1).sleep_time(0);
    let manager = manager(&config);

    let conn = manager.get_connection().unwrap();
    let disconnected = conn.disconnected();
    assert!(manager.give_connection(conn).is_ok());
    assert!(disconnected.load(Ordering::SeqCst));

    let stats = manager.stats();
    assert_eq!(stats.released_connections, 1.into());
    assert_eq!(stats.closed_connections, 1.into());
    assert_eq!(stats.close_failures, 0.into());
}

#[test]
fn release_failure_is_returned_not_raised() {
    let config = ManagerConfig::new(vec!["a"]).tries(1).sleep_time(0);
    let manager = manager(&config);
    manager.factory().state.fail_disconnects();

    let conn = manager.get_connection().unwrap();
    match manager.give_connection(conn) {
        Err(Error::Release { server, .. }) => assert_eq!(server, "a"),
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(manager.stats().close_failures, 1.into());

    // The claimed connection guard swallows the failure
    let conn = PooledConnection::claim(&manager).unwrap();
    drop(conn);
    assert_eq!(manager.stats().close_failures, 2.into());
}

#[test]
fn claimed_connection_is_given_back_on_drop() {
    let config = ManagerConfig::new(vec!["a"]).tries(1).sleep_time(0);
    let manager = manager(&config);

    let conn = PooledConnection::claim(&manager).unwrap();
    assert_eq!(conn.server(), "a");
    let disconnected = conn.disconnected();
    assert!(!disconnected.load(Ordering::SeqCst));
    drop(conn);
    assert!(disconnected.load(Ordering::SeqCst));

    let conn = PooledConnection::claim(&manager).unwrap();
    let detached = conn.detach();
    assert!(!detached.disconnected().load(Ordering::SeqCst));
    assert_eq!(manager.stats().released_connections, 1.into());
}

#[test]
fn interrupted_sleep_moves_to_the_next_round() {
    let config = ManagerConfig::new(vec!["a"]).tries(2).sleep_time(60_000);
    let manager = Arc::new(manager(&config));
    manager.factory().state.set_down("a");

    let start = Instant::now();
    let manager_clone = manager.clone();
    let caller = thread::spawn(move || manager_clone.get_connection());

    while !caller.is_finished() {
        manager.interrupt();
        thread::sleep(Duration::from_millis(10));
    }

    let result = caller.join().unwrap();
    assert!(matches!(
        result,
        Err(Error::ConnectionUnavailable { rounds: 2, .. })
    ));
    assert!(start.elapsed() < Duration::from_secs(60));

    let stats = manager.stats();
    assert_eq!(stats.attempts, 2);
    assert_eq!(stats.sleeps, 1);
    assert_eq!(stats.interrupted_sleeps, 1);
}

#[test]
fn round_robin_order() {
    let config = ManagerConfig::new(vec!["a", "b", "c"]).tries(1).sleep_time(0);
    let manager = manager(&config).with_server_order(RoundRobin::new());

    let servers: Vec<String> = (0..4)
        .map(|_| manager.get_connection().unwrap().server().clone())
        .collect();
    assert_eq!(servers, vec!["a", "b", "c", "a"]);
}

#[test]
fn reload_replaces_servers_and_options() {
    let config = ManagerConfig::new(vec!["a"]).tries(1).sleep_time(0);
    let manager = manager(&config);

    let reloaded = ManagerConfig::new(vec!["x", "y"]).tries(0).sleep_time(5);
    manager.reload(&reloaded).unwrap();

    assert_eq!(manager.servers(), vec!["x".to_string(), "y".to_string()]);
    assert_eq!(manager.retry_options().tries, Tries::Unbounded);
    assert_eq!(manager.get_connection().unwrap().server(), "x");
}

#[test]
fn invalid_reload_keeps_the_current_servers() {
    let config = ManagerConfig::new(vec!["a"]).tries(2).sleep_time(0);
    let manager = manager(&config);

    let broken = ManagerConfig::new(vec!["x"]).sleep_time(5);
    assert!(matches!(
        manager.reload(&broken),
        Err(Error::Configuration(_))
    ));
    assert_eq!(manager.servers(), vec!["a".to_string()]);
    assert_eq!(manager.retry_options().tries, Tries::Bounded(2));
}

#[test]
fn shutdown_is_idempotent() {
    let config = ManagerConfig::new(vec!["a"]).tries(1).sleep_time(0);
    let manager = manager(&config);

    manager.shutdown();
    manager.shutdown();
    assert!(manager.get_connection().is_ok());
}
