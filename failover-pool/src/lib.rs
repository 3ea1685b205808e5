// Copyright 2020 Joyent, Inc.

//! A multi-server connection manager with failover
//!
//! failover-pool hands out live connections to one of several servers that
//! provide the same service. Callers ask a manager for a connection, use it,
//! and hand it back. Behind that interface the manager tries each configured
//! server in turn until one answers, retrying whole rounds over the server
//! list with a sleep in between, and (in its pooling form) keeps released
//! connections around so the next caller does not pay the cost of
//! establishing a new one.
//!
//! The crate relies on two traits supplied by the user: the
//! [`ConnectionFactory`](factory/trait.ConnectionFactory.html) trait and the
//! [`Connection`](connection/trait.Connection.html) trait.
//!
//! ## Servers and factories
//!
//! A *server* is any value that identifies a remote endpoint and can be
//! compared and hashed; see the [`Server`](server/trait.Server.html) trait.
//! [`Backend`](server/struct.Backend.html) is provided for endpoints reached
//! by IP address and port.
//!
//! A *connection factory* turns each configured endpoint entry into a server
//! and opens new connections to a server with a socket timeout and a connect
//! timeout. It is the place to capture application level configuration such
//! as credentials or a database name.
//!
//! ## Connections
//!
//! A *connection* is not necessarily just a TCP socket. It can be anything
//! that provides some kind of logical session with a server, as long as it
//! knows which server it belongs to, can be probed for liveness with `test`,
//! and can be closed with `disconnect`.
//!
//! ## Failover
//!
//! [`ConnectionManager::get_connection`](manager/trait.Manager.html#tymethod.get_connection)
//! makes up to `tries` *rounds*. In each round it tries every server, in the
//! order chosen by a [`ServerOrder`](order/trait.ServerOrder.html) strategy
//! (list order by default), and returns the first connection it gets. When
//! a whole round fails it sleeps `sleep_time` and starts the next round. A
//! `tries` of zero or less keeps going until a server answers. Individual
//! failures are logged; only when every round has failed does the caller get
//! [`Error::ConnectionUnavailable`](error/enum.Error.html).
//!
//! The sleep between rounds can be cut short with `interrupt`, in which case
//! the next round starts immediately.
//!
//! ## Pooling
//!
//! [`ConnectionPoolManager`](pool_manager/struct.ConnectionPoolManager.html)
//! keeps connections handed back with `give_connection` in a queue per
//! server instead of closing them. When that server is next tried, queued
//! connections are probed with `test` and the first healthy one is handed
//! out. Connections that fail the probe are closed and dropped. `shutdown`
//! closes every queued connection.
//!
//! ## Registries
//!
//! A [`PoolRegistry`](registry/struct.PoolRegistry.html) builds one manager
//! per named pool in a [`RegistryConfig`](config/struct.RegistryConfig.html)
//! and looks them up by name.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Mutex;
//!
//! use slog::{o, Drain, Logger};
//!
//! use failover_pool::config::ManagerConfig;
//! use failover_pool::manager::{Manager, PooledConnection};
//! use failover_pool::pool_manager::ConnectionPoolManager;
//!
//! let plain = slog_term::PlainSyncDecorator::new(std::io::stdout());
//! let log = Logger::root(
//!     Mutex::new(slog_term::FullFormat::new(plain).build()).fuse(),
//!     o!("build-id" => "0.1.0"),
//! );
//!
//! let config = ManagerConfig::new(vec!["10.0.0.1:5432", "10.0.0.2:5432"])
//!     .tries(3)
//!     .sleep_time(1000)
//!     .con_timeout(5000);
//!
//! let manager = ConnectionPoolManager::new(&config, MyFactory::new(), Some(log))?;
//!
//! {
//!     let conn = PooledConnection::claim(&manager)?;
//!     // Do stuff here
//!     // The connection is given back to the manager when it falls out of scope.
//! }
//!
//! manager.shutdown();
//! ```

#![allow(missing_docs)]

pub mod config;
pub mod connection;
pub mod error;
pub mod factory;
pub mod manager;
pub mod order;
pub mod pool_manager;
pub mod registry;
pub mod server;
