// Copyright 2020 Joyent, Inc.

use std::io;

use thiserror::Error;

/// Errors returned by the connection managers and the pool registry.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or missing configuration.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    /// Every configured server failed in every retry round.
    #[error(
        "all configured servers are down or unreachable \
         ({servers} servers, {rounds} rounds)"
    )]
    ConnectionUnavailable { servers: usize, rounds: u64 },
    /// Closing a released connection failed.
    #[error("failed to release connection to {server}: {reason}")]
    Release { server: String, reason: String },
    /// A pool names a connection factory that was never registered.
    #[error("unknown connection factory: {0}")]
    UnknownFactory(String),
    #[error(transparent)]
    IOError(#[from] io::Error),
    #[error(transparent)]
    TomlError(#[from] toml::de::Error),
}
