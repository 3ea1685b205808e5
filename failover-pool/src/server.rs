// Copyright 2020 Joyent, Inc.

use std::fmt;
use std::hash::Hash;
use std::net::{IpAddr, SocketAddr};

use derive_more::Display;

/// Identity of a remote endpoint a manager may connect to.
///
/// The pool indexes idle connections by server, so two values that refer to
/// the same physical endpoint must compare equal and hash identically. Any
/// type with the listed bounds is a `Server`.
pub trait Server:
    Clone + fmt::Debug + fmt::Display + Eq + Hash + Send + Sync + 'static
{
}

impl<T> Server for T where
    T: Clone + fmt::Debug + fmt::Display + Eq + Hash + Send + Sync + 'static
{
}

/// The port number for a backend. This is a type alias for u16.
pub type BackendPort = u16;
/// The concatenation of the backend address and port with a colon
/// delimiter. This is a type alias for String.
pub type BackendName = String;
/// The IP address of the backend. This is a type alias for std::net::IpAddr.
pub type BackendAddress = IpAddr;

/// A socket-addressed `Server`.
#[derive(Clone, Debug, Display, Eq, Hash, PartialEq)]
#[display(fmt = "{}", name)]
pub struct Backend {
    /// The concatenation of the backend address and port with a colon delimiter.
    pub name: BackendName,
    /// The address of the backend.
    pub address: BackendAddress,
    /// The port of the backend.
    pub port: BackendPort,
}

impl Backend {
    /// Return a new instance of `Backend` given a `BackendAddress` and `BackendPort`.
    pub fn new(address: &BackendAddress, port: BackendPort) -> Self {
        Backend {
            name: backend_name(address, port),
            address: *address,
            port,
        }
    }

    /// The socket address to connect to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((self.address, self.port))
    }
}

impl From<SocketAddr> for Backend {
    fn from(addr: SocketAddr) -> Self {
        Backend::new(&addr.ip(), addr.port())
    }
}

// Concatentate the backend address and port with a colon delimiter. IPv6
// addresses are bracketed so the name parses back as a socket address.
fn backend_name(address: &BackendAddress, port: BackendPort) -> BackendName {
    SocketAddr::from((*address, port)).to_string()
}
