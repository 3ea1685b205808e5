// Copyright 2020 Joyent, Inc.

#![allow(dead_code)]

use std::collections::HashSet;
use std::io::{Error as IOError, ErrorKind};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use slog::{o, Drain, Logger};

use failover_pool::connection::Connection;
use failover_pool::factory::ConnectionFactory;

pub fn log() -> Logger {
    let plain = slog_term::PlainSyncDecorator::new(std::io::stdout());
    Logger::root(
        Mutex::new(slog_term::FullFormat::new(plain).build()).fuse(),
        o!("build-id" => "0.1.0"),
    )
}

#[derive(Debug)]
pub struct DummyConnection {
    pub id: u64,
    server: String,
    healthy: Arc<AtomicBool>,
    disconnected: Arc<AtomicBool>,
    fail_disconnect: bool,
}

impl DummyConnection {
    /// A handle for flipping the result of `test` after the connection has
    /// been handed back.
    pub fn health(&self) -> Arc<AtomicBool> {
        self.healthy.clone()
    }

    /// A handle for observing `disconnect` after the connection has been
    /// handed back.
    pub fn disconnected(&self) -> Arc<AtomicBool> {
        self.disconnected.clone()
    }
}

impl Connection for DummyConnection {
    type Error = IOError;
    type Server = String;

    fn server(&self) -> &String {
        &self.server
    }

    fn test(&mut self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    fn disconnect(&mut self) -> Result<(), IOError> {
        self.disconnected.store(true, Ordering::SeqCst);
        if self.fail_disconnect {
            Err(IOError::new(ErrorKind::Other, "disconnect failed"))
        } else {
            Ok(())
        }
    }
}

/// State shared between a `FakeFactory` and the test that built it.
#[derive(Debug, Default)]
pub struct FakeState {
    down: Mutex<HashSet<String>>,
    attempts: Mutex<Vec<String>>,
    fail_next: AtomicUsize,
    created: AtomicU64,
    fail_disconnect: AtomicBool,
    timeouts: Mutex<Option<(Duration, Duration)>>,
}

impl FakeState {
    pub fn set_down(&self, server: &str) {
        self.down.lock().unwrap().insert(server.to_string());
    }

    pub fn set_up(&self, server: &str) {
        self.down.lock().unwrap().remove(server);
    }

    /// Fail the next `n` connection attempts whatever the server.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn fail_disconnects(&self) {
        self.fail_disconnect.store(true, Ordering::SeqCst);
    }

    /// Servers passed to `create_connection`, in order.
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn created(&self) -> u64 {
        self.created.load(Ordering::SeqCst)
    }

    /// The timeouts passed to the last `create_connection` call.
    pub fn last_timeouts(&self) -> Option<(Duration, Duration)> {
        *self.timeouts.lock().unwrap()
    }
}

/// Servers are plain names. Entries starting with `!` are invalid.
#[derive(Debug, Default)]
pub struct FakeFactory {
    pub state: Arc<FakeState>,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: Arc<FakeState>) -> Self {
        FakeFactory { state }
    }
}

impl ConnectionFactory for FakeFactory {
    type Server = String;
    type Connection = DummyConnection;
    type Error = IOError;

    fn create_server(&self, entry: &str) -> Result<String, IOError> {
        if entry.is_empty() || entry.starts_with('!') {
            return Err(IOError::new(
                ErrorKind::InvalidInput,
                format!("invalid server entry: {}", entry),
            ));
        }
        Ok(entry.to_string())
    }

    fn create_connection(
        &self,
        server: &String,
        so_timeout: Duration,
        con_timeout: Duration,
    ) -> Result<DummyConnection, IOError> {
        let state = &self.state;
        state.attempts.lock().unwrap().push(server.clone());
        *state.timeouts.lock().unwrap() = Some((so_timeout, con_timeout));

        let fail_next = state.fail_next.load(Ordering::SeqCst);
        if fail_next > 0 {
            state.fail_next.store(fail_next - 1, Ordering::SeqCst);
            return Err(IOError::new(
                ErrorKind::ConnectionRefused,
                format!("{} refused the connection", server),
            ));
        }

        if state.down.lock().unwrap().contains(server) {
            return Err(IOError::new(
                ErrorKind::ConnectionRefused,
                format!("{} is down", server),
            ));
        }

        let id = state.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(DummyConnection {
            id,
            server: server.clone(),
            healthy: Arc::new(AtomicBool::new(true)),
            disconnected: Arc::new(AtomicBool::new(false)),
            fail_disconnect: state.fail_disconnect.load(Ordering::SeqCst),
        })
    }
}
