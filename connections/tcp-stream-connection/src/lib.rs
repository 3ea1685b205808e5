// Copyright 2019 Joyent, Inc.

//! A TCP `Connection` and `ConnectionFactory` for failover-pool.
//!
//! Server entries are `host:port` strings. Host names are resolved when the
//! manager is built and the first address returned is used.

use std::io::{Error as IOError, ErrorKind};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use thiserror::Error;

use failover_pool::connection::Connection;
use failover_pool::factory::ConnectionFactory;
use failover_pool::server::Backend;

#[derive(Debug, Error)]
pub enum TcpError {
    #[error("invalid server entry {entry}: {reason}")]
    InvalidServer { entry: String, reason: String },
    #[error(transparent)]
    IOError(#[from] IOError),
}

#[derive(Debug)]
pub struct TcpConnection {
    stream: TcpStream,
    backend: Backend,
    connected: bool,
}

impl TcpConnection {
    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

impl Connection for TcpConnection {
    type Error = IOError;
    type Server = Backend;

    fn server(&self) -> &Backend {
        &self.backend
    }

    // Peek without blocking: pending data or nothing to read means the
    // socket is open, end of stream or an error means it is not.
    fn test(&mut self) -> bool {
        if !self.connected {
            return false;
        }
        if self.stream.set_nonblocking(true).is_err() {
            self.connected = false;
            return false;
        }

        let mut buf = [0u8; 1];
        let alive = match self.stream.peek(&mut buf) {
            Ok(0) => false,
            Ok(_) => true,
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => true,
            Err(_) => false,
        };

        if self.stream.set_nonblocking(false).is_err() {
            self.connected = false;
            return false;
        }
        if !alive {
            self.connected = false;
        }
        alive
    }

    fn disconnect(&mut self) -> Result<(), Self::Error> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;
        match self.stream.shutdown(Shutdown::Both) {
            Err(ref e) if e.kind() == ErrorKind::NotConnected => Ok(()),
            result => result,
        }
    }
}

impl Deref for TcpConnection {
    type Target = TcpStream;

    fn deref(&self) -> &TcpStream {
        &self.stream
    }
}

impl DerefMut for TcpConnection {
    fn deref_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }
}

#[derive(Clone, Debug, Default)]
pub struct TcpConnectionFactory {
    nodelay: bool,
}

impl TcpConnectionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `TCP_NODELAY` on every new connection.
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

impl ConnectionFactory for TcpConnectionFactory {
    type Server = Backend;
    type Connection = TcpConnection;
    type Error = TcpError;

    fn create_server(&self, entry: &str) -> Result<Backend, TcpError> {
        let invalid = |reason: String| TcpError::InvalidServer {
            entry: entry.to_string(),
            reason,
        };

        let mut addrs = entry
            .trim()
            .to_socket_addrs()
            .map_err(|e| invalid(e.to_string()))?;
        addrs
            .next()
            .map(Backend::from)
            .ok_or_else(|| invalid(String::from("no addresses found")))
    }

    fn create_connection(
        &self,
        server: &Backend,
        so_timeout: Duration,
        con_timeout: Duration,
    ) -> Result<TcpConnection, TcpError> {
        let zero = Duration::from_millis(0);
        let addr = server.socket_addr();

        let stream = if con_timeout > zero {
            TcpStream::connect_timeout(&addr, con_timeout)?
        } else {
            TcpStream::connect(addr)?
        };

        if so_timeout > zero {
            stream.set_read_timeout(Some(so_timeout))?;
            stream.set_write_timeout(Some(so_timeout))?;
        }
        stream.set_nodelay(self.nodelay)?;

        Ok(TcpConnection {
            stream,
            backend: server.clone(),
            connected: true,
        })
    }
}
