// Copyright 2020 Joyent, Inc.

pub mod types;

use std::fmt::Result as FmtResult;
use std::fmt::{Debug, Display, Formatter};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use slog::{debug, error, info, o, trace, warn, Drain, Logger};

use crate::config::ManagerConfig;
use crate::connection::Connection;
use crate::error::Error;
use crate::factory::ConnectionFactory;
use crate::manager::types::{
    Counters, ManagerStats, RetryOptions, RoundDelay, SleepOutcome,
};
use crate::order::{InOrder, ServerOrder};

/// The operations shared by `ConnectionManager` and `ConnectionPoolManager`.
///
/// The trait is object safe so managers built from configuration can be kept
/// side by side in a `PoolRegistry`.
pub trait Manager: Send + Sync {
    type Connection: Connection;

    /// Obtain a live connection, failing over across the configured servers
    /// and retrying whole rounds as configured. The only error returned is
    /// `Error::ConnectionUnavailable`.
    fn get_connection(&self) -> Result<Self::Connection, Error>;

    /// Hand a connection back to the manager. Failures are logged by the
    /// manager before being returned, so callers are free to ignore them.
    fn give_connection(
        &self,
        connection: Self::Connection,
    ) -> Result<(), Error>;

    /// Shut down and re-initialize in place from `config`. If `config` is
    /// invalid the manager is left untouched.
    fn reload(&self, config: &ManagerConfig) -> Result<(), Error>;

    /// Release every resource held by the manager. Idempotent.
    fn shutdown(&self);

    /// Cut short every sleep between retry rounds that is in progress. The
    /// sleeping callers move on to their next round immediately.
    fn interrupt(&self);

    fn stats(&self) -> ManagerStats;
}

/// A manager stored in a `PoolRegistry`.
pub type SharedManager<C> = Arc<dyn Manager<Connection = C>>;

// The servers and retry options published together by initialization and by
// every reload.
#[derive(Debug)]
struct Generation<S> {
    servers: Vec<S>,
    retry: RetryOptions,
}

fn build_generation<F>(
    factory: &F,
    config: &ManagerConfig,
    log: &Logger,
) -> Result<Generation<F::Server>, Error>
where
    F: ConnectionFactory,
{
    let retry = RetryOptions::from_config(config, log)?;

    let mut servers = Vec::with_capacity(config.servers.len());
    for entry in &config.servers {
        match factory.create_server(entry) {
            Ok(server) => {
                debug!(log, "Adding server {}", server);
                servers.push(server);
            }
            Err(e) => {
                warn!(log, "Skipping invalid server entry {}: {}", entry, e);
            }
        }
    }

    Ok(Generation { servers, retry })
}

/// Hands out connections to an ordered list of servers with failover.
///
/// Every call to `get_connection` opens a new connection through the
/// `ConnectionFactory` and every call to `give_connection` closes it. See
/// `ConnectionPoolManager` for the variant that keeps released connections
/// for reuse.
pub struct ConnectionManager<F>
where
    F: ConnectionFactory,
{
    factory: F,
    generation: ArcSwap<Generation<F::Server>>,
    order: Box<dyn ServerOrder>,
    delay: RoundDelay,
    lifecycle: Mutex<()>,
    counters: Counters,
    log: Logger,
}

impl<F> Debug for ConnectionManager<F>
where
    F: ConnectionFactory,
{
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        let generation = self.generation.load();
        f.debug_struct("ConnectionManager")
            .field("servers", &generation.servers)
            .field("retry", &generation.retry)
            .field("order", &self.order)
            .field("log", &self.log)
            .finish()
    }
}

impl<F> ConnectionManager<F>
where
    F: ConnectionFactory,
{
    /// Build a manager from `config`. Server entries the factory cannot parse
    /// are logged and skipped. A missing or non-numeric `tries` or
    /// `sleep_time` is an error.
    ///
    /// If no logger is given the manager logs through the
    /// [`slog-stdlog`](https://docs.rs/slog-stdlog) drain.
    pub fn new(
        config: &ManagerConfig,
        factory: F,
        log: Option<Logger>,
    ) -> Result<Self, Error> {
        let log = log
            .unwrap_or_else(|| Logger::root(slog_stdlog::StdLog.fuse(), o!()));

        let generation = build_generation(&factory, config, &log)?;
        info!(
            log,
            "Connection manager using {} of {} configured servers, tries: {}",
            generation.servers.len(),
            config.servers.len(),
            generation.retry.tries
        );

        Ok(ConnectionManager {
            factory,
            generation: ArcSwap::from_pointee(generation),
            order: Box::new(InOrder),
            delay: RoundDelay::new(),
            lifecycle: Mutex::new(()),
            counters: Counters::default(),
            log,
        })
    }

    /// Replace the strategy deciding the order servers are tried in each
    /// round. The default is `InOrder`.
    pub fn with_server_order<O>(mut self, order: O) -> Self
    where
        O: ServerOrder + 'static,
    {
        self.set_server_order(Box::new(order));
        self
    }

    pub(crate) fn set_server_order(&mut self, order: Box<dyn ServerOrder>) {
        self.order = order;
    }

    /// The servers of the current generation, in configured order.
    pub fn servers(&self) -> Vec<F::Server> {
        self.generation.load().servers.clone()
    }

    pub fn retry_options(&self) -> RetryOptions {
        self.generation.load().retry
    }

    /// Whether `server` is part of the current generation.
    pub fn is_configured(&self, server: &F::Server) -> bool {
        self.generation.load().servers.contains(server)
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn log(&self) -> &Logger {
        &self.log
    }

    /// Open a brand-new connection to `server` with the configured timeouts.
    pub fn try_to_connect(
        &self,
        server: &F::Server,
    ) -> Result<F::Connection, F::Error> {
        let retry = self.retry_options();
        self.create_connection(server, &retry)
    }

    pub(crate) fn create_connection(
        &self,
        server: &F::Server,
        retry: &RetryOptions,
    ) -> Result<F::Connection, F::Error> {
        let conn = self.factory.create_connection(
            server,
            retry.so_timeout,
            retry.con_timeout,
        )?;
        Counters::incr(&self.counters.created);
        debug!(self.log, "Created connection for server {}", server);
        Ok(conn)
    }

    // The failover loop. `attempt` is tried against each server in the order
    // chosen for the round; the first success is returned.
    pub(crate) fn get_connection_with<A, E>(
        &self,
        mut attempt: A,
    ) -> Result<F::Connection, Error>
    where
        A: FnMut(&F::Server, &RetryOptions) -> Result<F::Connection, E>,
        E: Display,
    {
        let generation = self.generation.load_full();
        let servers = &generation.servers;
        let retry = &generation.retry;

        if servers.is_empty() {
            error!(self.log, "No servers configured");
            return Err(Error::ConnectionUnavailable {
                servers: 0,
                rounds: 0,
            });
        }

        let mut round: u64 = 0;
        while retry.tries.permits(round) {
            Counters::incr(&self.counters.rounds);
            trace!(self.log, "Starting round {}", round);

            for idx in self.order.select_order(servers.len(), round) {
                let server = match servers.get(idx) {
                    Some(server) => server,
                    None => {
                        warn!(self.log, "Server index {} out of range", idx);
                        continue;
                    }
                };

                Counters::incr(&self.counters.attempts);
                match attempt(server, retry) {
                    Ok(conn) => {
                        debug!(
                            self.log,
                            "Got connection for server {} in round {}",
                            server,
                            round
                        );
                        return Ok(conn);
                    }
                    Err(e) => {
                        Counters::incr(&self.counters.failed_attempts);
                        warn!(
                            self.log,
                            "Failed to connect to server {}. Reason: {}",
                            server,
                            e
                        );
                    }
                }
            }

            round += 1;
            if retry.tries.permits(round) {
                Counters::incr(&self.counters.sleeps);
                if self.delay.sleep(retry.sleep_time)
                    == SleepOutcome::Interrupted
                {
                    Counters::incr(&self.counters.interrupted_sleeps);
                    debug!(
                        self.log,
                        "Sleep before round {} interrupted", round
                    );
                }
            }
        }

        error!(
            self.log,
            "All {} servers are down or unreachable after {} rounds",
            servers.len(),
            round
        );
        Err(Error::ConnectionUnavailable {
            servers: servers.len(),
            rounds: round,
        })
    }

    pub(crate) fn close_connection(
        &self,
        mut connection: F::Connection,
    ) -> Result<(), Error> {
        let server = connection.server().to_string();
        Counters::incr(&self.counters.closed);
        match connection.disconnect() {
            Ok(()) => {
                trace!(self.log, "Closed connection for server {}", server);
                Ok(())
            }
            Err(e) => {
                Counters::incr(&self.counters.close_failures);
                warn!(
                    self.log,
                    "Failed to properly close connection for server {}. \
                     Reason: {}",
                    server,
                    e
                );
                Err(Error::Release {
                    server,
                    reason: e.to_string(),
                })
            }
        }
    }

    pub(crate) fn counters(&self) -> &Counters {
        &self.counters
    }

    // Build the next generation from `config` and, once it is known to be
    // valid, publish it and run `release`. Connections handed back after the
    // new generation is visible can be checked against it. Serialized with
    // `serialized`.
    pub(crate) fn reload_with<R>(
        &self,
        config: &ManagerConfig,
        release: R,
    ) -> Result<(), Error>
    where
        R: FnOnce(),
    {
        let _lifecycle = self.lifecycle.lock();
        let generation = build_generation(&self.factory, config, &self.log)?;
        info!(
            self.log,
            "Reloaded connection manager with {} of {} configured servers",
            generation.servers.len(),
            config.servers.len()
        );
        self.generation.store(Arc::new(generation));
        release();
        Ok(())
    }

    pub(crate) fn serialized<T, R>(&self, f: R) -> T
    where
        R: FnOnce() -> T,
    {
        let _lifecycle = self.lifecycle.lock();
        f()
    }
}

impl<F> Manager for ConnectionManager<F>
where
    F: ConnectionFactory,
{
    type Connection = F::Connection;

    fn get_connection(&self) -> Result<F::Connection, Error> {
        self.get_connection_with(|server, retry| {
            self.create_connection(server, retry)
        })
    }

    fn give_connection(&self, connection: F::Connection) -> Result<(), Error> {
        Counters::incr(&self.counters.released);
        self.close_connection(connection)
    }

    fn reload(&self, config: &ManagerConfig) -> Result<(), Error> {
        self.reload_with(config, || ())
    }

    fn shutdown(&self) {
        self.serialized(|| {
            trace!(self.log, "shutdown: nothing pooled to release");
        })
    }

    fn interrupt(&self) {
        self.delay.interrupt()
    }

    fn stats(&self) -> ManagerStats {
        self.counters.snapshot()
    }
}

/// A connection claimed from a manager that is handed back when it falls out
/// of scope.
pub struct PooledConnection<'a, M>
where
    M: Manager + ?Sized,
{
    manager: &'a M,
    connection: Option<M::Connection>,
}

impl<'a, M> PooledConnection<'a, M>
where
    M: Manager + ?Sized,
{
    /// Obtain a connection from `manager` with `get_connection`.
    pub fn claim(manager: &'a M) -> Result<Self, Error> {
        let connection = manager.get_connection()?;
        Ok(PooledConnection {
            manager,
            connection: Some(connection),
        })
    }

    /// Take the connection out of the guard. It will not be given back to
    /// the manager.
    pub fn detach(mut self) -> M::Connection {
        self.connection
            .take()
            .expect("connection present until the guard is consumed")
    }
}

impl<'a, M> Drop for PooledConnection<'a, M>
where
    M: Manager + ?Sized,
{
    fn drop(&mut self) {
        if let Some(conn) = self.connection.take() {
            // Release failures have already been logged by the manager
            let _ = self.manager.give_connection(conn);
        }
    }
}

impl<'a, M> Deref for PooledConnection<'a, M>
where
    M: Manager + ?Sized,
{
    type Target = M::Connection;

    fn deref(&self) -> &M::Connection {
        self.connection
            .as_ref()
            .expect("connection present until the guard is consumed")
    }
}

impl<'a, M> DerefMut for PooledConnection<'a, M>
where
    M: Manager + ?Sized,
{
    fn deref_mut(&mut self) -> &mut M::Connection {
        self.connection
            .as_mut()
            .expect("connection present until the guard is consumed")
    }
}
