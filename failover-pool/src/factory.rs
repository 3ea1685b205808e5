// Copyright 2020 Joyent, Inc.

use std::error;
use std::time::Duration;

use crate::connection::Connection;
use crate::server::Server;

/// Produces `Server` descriptors from configuration and opens new
/// connections to them.
///
/// The factory captures whatever protocol-specific configuration is needed to
/// establish a connection (credentials, database names and so on). The
/// managers only ever call it with the configured endpoint entries and the
/// normalized timeouts.
pub trait ConnectionFactory: Send + Sync + 'static {
    /// The server descriptor produced by `create_server`.
    type Server: Server;
    /// The connection produced by `create_connection`.
    type Connection: Connection<Server = Self::Server>;
    /// The error returned by either operation.
    type Error: error::Error + Send + Sync + 'static;

    /// Parse one configured endpoint entry into a server descriptor. An
    /// error here causes the manager to log and skip the entry.
    fn create_server(&self, entry: &str) -> Result<Self::Server, Self::Error>;

    /// Open a brand-new connection to `server`. A zero `so_timeout` or
    /// `con_timeout` means no timeout. Any error is treated by the manager as
    /// a failed attempt against that server.
    fn create_connection(
        &self,
        server: &Self::Server,
        so_timeout: Duration,
        con_timeout: Duration,
    ) -> Result<Self::Connection, Self::Error>;
}
