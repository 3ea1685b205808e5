// Copyright 2020 Joyent, Inc.

use std::fmt::Result as FmtResult;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crossbeam_queue::SegQueue;
use dashmap::DashMap;
use slog::{debug, info, trace, warn, Logger};

use crate::config::ManagerConfig;
use crate::connection::Connection;
use crate::error::Error;
use crate::factory::ConnectionFactory;
use crate::manager::types::{Counters, ManagerStats, RetryOptions};
use crate::manager::{ConnectionManager, Manager};
use crate::order::ServerOrder;

type IdleQueue<C> = Arc<SegQueue<C>>;

/// A `ConnectionManager` that keeps released connections for reuse.
///
/// Released connections are queued per server without being checked. The
/// next time a server is tried its idle connections are taken off the queue
/// one at a time and probed with `Connection::test`; the first healthy one is
/// handed out and the unhealthy ones are closed and dropped. Only when the
/// queue runs dry is a new connection opened through the factory.
///
/// Idle queues are safe for concurrent use, so any number of threads may get
/// and give connections at the same time.
pub struct ConnectionPoolManager<F>
where
    F: ConnectionFactory,
{
    manager: ConnectionManager<F>,
    idle: DashMap<F::Server, IdleQueue<F::Connection>>,
}

impl<F> Debug for ConnectionPoolManager<F>
where
    F: ConnectionFactory,
{
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        f.debug_struct("ConnectionPoolManager")
            .field("manager", &self.manager)
            .field("idle_connections", &self.idle_connections())
            .finish()
    }
}

impl<F> ConnectionPoolManager<F>
where
    F: ConnectionFactory,
{
    /// Build a pooling manager from `config`. Initialization follows
    /// `ConnectionManager::new`; the pool starts out empty.
    pub fn new(
        config: &ManagerConfig,
        factory: F,
        log: Option<Logger>,
    ) -> Result<Self, Error> {
        Ok(ConnectionPoolManager {
            manager: ConnectionManager::new(config, factory, log)?,
            idle: DashMap::new(),
        })
    }

    /// See `ConnectionManager::with_server_order`.
    pub fn with_server_order<O>(mut self, order: O) -> Self
    where
        O: ServerOrder + 'static,
    {
        self.manager.set_server_order(Box::new(order));
        self
    }

    /// The wrapped non-pooling manager.
    pub fn manager(&self) -> &ConnectionManager<F> {
        &self.manager
    }

    pub fn servers(&self) -> Vec<F::Server> {
        self.manager.servers()
    }

    pub fn retry_options(&self) -> RetryOptions {
        self.manager.retry_options()
    }

    /// The number of idle connections across all servers.
    pub fn idle_connections(&self) -> usize {
        self.idle.iter().map(|queue| queue.value().len()).sum()
    }

    /// The number of idle connections for `server`.
    pub fn idle_connections_for(&self, server: &F::Server) -> usize {
        self.idle
            .get(server)
            .map(|queue| queue.value().len())
            .unwrap_or(0)
    }

    /// Reuse a healthy idle connection to `server` if there is one, otherwise
    /// open a new connection with the configured timeouts.
    pub fn try_to_connect(
        &self,
        server: &F::Server,
    ) -> Result<F::Connection, F::Error> {
        let retry = self.manager.retry_options();
        self.reuse_or_connect(server, &retry)
    }

    fn reuse_or_connect(
        &self,
        server: &F::Server,
        retry: &RetryOptions,
    ) -> Result<F::Connection, F::Error> {
        // Clone the queue handle out of the map so no shard lock is held
        // while running health checks.
        let queue = self.idle.get(server).map(|queue| queue.value().clone());

        if let Some(queue) = queue {
            while let Some(mut conn) = queue.pop() {
                if conn.test() {
                    Counters::incr(&self.manager.counters().reused);
                    debug!(
                        self.log(),
                        "Found idle connection for server {}", server
                    );
                    return Ok(conn);
                }

                Counters::incr(&self.manager.counters().discarded);
                warn!(
                    self.log(),
                    "Discarding idle connection for server {} that failed \
                     its health check",
                    server
                );
                let _ = self.manager.close_connection(conn);
            }
        }

        self.manager.create_connection(server, retry)
    }

    // Close every idle connection and forget the queues of servers that are
    // no longer configured. A failure to close one connection has already
    // been logged and does not stop the rest from being closed.
    fn drain(&self) {
        let queues: Vec<(F::Server, IdleQueue<F::Connection>)> = self
            .idle
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut closed = 0;
        for (server, queue) in queues {
            while let Some(conn) = queue.pop() {
                trace!(
                    self.log(),
                    "Closing idle connection for server {}", server
                );
                let _ = self.manager.close_connection(conn);
                closed += 1;
            }
        }

        self.idle
            .retain(|server, _| self.manager.is_configured(server));
        info!(self.log(), "Closed {} idle connections", closed);
    }

    fn log(&self) -> &Logger {
        self.manager.log()
    }
}

impl<F> Manager for ConnectionPoolManager<F>
where
    F: ConnectionFactory,
{
    type Connection = F::Connection;

    fn get_connection(&self) -> Result<F::Connection, Error> {
        self.manager.get_connection_with(|server, retry| {
            self.reuse_or_connect(server, retry)
        })
    }

    /// Queue `connection` for reuse. The health check is deferred until the
    /// connection is next taken from the queue. A connection to a server
    /// dropped by `reload` is closed instead. This never fails.
    fn give_connection(&self, connection: F::Connection) -> Result<(), Error> {
        Counters::incr(&self.manager.counters().released);

        let server = connection.server().clone();
        if !self.manager.is_configured(&server) {
            debug!(
                self.log(),
                "Closing connection for server {} that is no longer \
                 configured",
                server
            );
            // Close failures have already been logged
            let _ = self.manager.close_connection(connection);
            return Ok(());
        }

        trace!(
            self.log(),
            "Returning connection for server {} to the pool", server
        );

        let queue = self
            .idle
            .entry(server)
            .or_insert_with(|| Arc::new(SegQueue::new()))
            .value()
            .clone();
        queue.push(connection);
        Ok(())
    }

    fn reload(&self, config: &ManagerConfig) -> Result<(), Error> {
        self.manager.reload_with(config, || self.drain())
    }

    fn shutdown(&self) {
        self.manager.serialized(|| self.drain())
    }

    fn interrupt(&self) {
        self.manager.interrupt()
    }

    fn stats(&self) -> ManagerStats {
        let mut stats = self.manager.stats();
        stats.idle_connections = (self.idle_connections() as u64).into();
        stats
    }
}

impl<F> Drop for ConnectionPoolManager<F>
where
    F: ConnectionFactory,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}
