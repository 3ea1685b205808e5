// Copyright 2020 Joyent, Inc.

use std::error;

use crate::server::Server;

/// A live session to one `Server`.
///
/// The `Connection` trait defines the interface that must be implemented in
/// order to be handed out by a connection manager. A connection need not be
/// limited to a TCP socket, but could be any logical notion of a session that
/// implements the `Connection` trait.
///
/// A connection value has exactly one owner at a time: the caller that
/// obtained it from a manager, an idle queue inside a pooling manager, or
/// nobody once it has been disconnected and dropped.
pub trait Connection: Send + Sized + 'static {
    /// The error type returned by `disconnect`. Each implementation of the
    /// `Connection` trait may choose the concrete error type that is relevant
    /// to it. The only constraint is that it implements the standard library
    /// [Error](https://doc.rust-lang.org/std/error/trait.Error.html) trait.
    type Error: error::Error;
    /// The kind of server this connection is bound to.
    type Server: Server;

    /// The server this connection was established to.
    fn server(&self) -> &Self::Server;

    /// Liveness probe used before reusing a pooled connection. Returns `false`
    /// if the connection is dead. Aside from noting that the connection has
    /// died, this must have no effect visible to the caller.
    fn test(&mut self) -> bool;

    /// Close the connection and release its underlying resources.
    fn disconnect(&mut self) -> Result<(), Self::Error>;
}
