// Copyright 2020 Joyent, Inc.

//! Named managers built from configuration.
//!
//! A `PoolRegistry` owns one manager per `[pools.<name>]` entry of a
//! `RegistryConfig`. Each entry names the connection factory to use by an
//! identifier that must have been registered with the registry's
//! `FactoryRegistry`.
//!
//! ```rust,ignore
//! let mut factories = FactoryRegistry::new();
//! factories.register("tcp", TcpConnectionFactory::new);
//!
//! let registry = PoolRegistry::new(factories, Some(log));
//! registry.init_multi_managers(&RegistryConfig::from_file("pools.toml")?)?;
//!
//! let primary = registry.get_manager("primary").ok_or(MyError::NoPool)?;
//! let conn = PooledConnection::claim(&*primary)?;
//! ```

use std::collections::HashMap;
use std::fmt::Result as FmtResult;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use parking_lot::Mutex;
use slog::{error, info, o, Drain, Logger};

use crate::config::{PoolConfig, RegistryConfig};
use crate::connection::Connection;
use crate::error::Error;
use crate::factory::ConnectionFactory;
use crate::manager::{ConnectionManager, SharedManager};
use crate::pool_manager::ConnectionPoolManager;

type Constructor<C> = Box<
    dyn Fn(&str, &PoolConfig, &Logger) -> Result<SharedManager<C>, Error>
        + Send
        + Sync,
>;

/// Maps factory identifiers used in configuration to connection factories.
pub struct FactoryRegistry<C>
where
    C: Connection,
{
    constructors: HashMap<String, Constructor<C>>,
}

impl<C> Debug for FactoryRegistry<C>
where
    C: Connection,
{
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        let mut ids: Vec<&String> = self.constructors.keys().collect();
        ids.sort();
        f.debug_struct("FactoryRegistry")
            .field("factories", &ids)
            .finish()
    }
}

impl<C> Default for FactoryRegistry<C>
where
    C: Connection,
{
    fn default() -> Self {
        FactoryRegistry {
            constructors: HashMap::new(),
        }
    }
}

impl<C> FactoryRegistry<C>
where
    C: Connection,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `build` under `id`. `build` is called once for every pool
    /// that names `id`, and the factory it returns is owned by that pool's
    /// manager. Registering an `id` again replaces the earlier entry.
    pub fn register<F, B>(&mut self, id: &str, build: B) -> &mut Self
    where
        F: ConnectionFactory<Connection = C>,
        B: Fn() -> F + Send + Sync + 'static,
    {
        let constructor: Constructor<C> = Box::new(
            move |name: &str,
                  pool: &PoolConfig,
                  log: &Logger|
                  -> Result<SharedManager<C>, Error> {
                let log = log.new(o!("pool" => name.to_string()));
                let factory = build();
                let manager: SharedManager<C> = if pool.pooling {
                    Arc::new(ConnectionPoolManager::new(
                        &pool.manager,
                        factory,
                        Some(log),
                    )?)
                } else {
                    Arc::new(ConnectionManager::new(
                        &pool.manager,
                        factory,
                        Some(log),
                    )?)
                };
                Ok(manager)
            },
        );

        self.constructors.insert(id.to_string(), constructor);
        self
    }

    pub fn contains(&self, id: &str) -> bool {
        self.constructors.contains_key(id)
    }

    fn build(
        &self,
        name: &str,
        pool: &PoolConfig,
        log: &Logger,
    ) -> Result<SharedManager<C>, Error> {
        match self.constructors.get(&pool.factory) {
            Some(constructor) => constructor(name, pool, log),
            None => Err(Error::UnknownFactory(pool.factory.clone())),
        }
    }
}

/// A set of managers looked up by pool name.
///
/// Initialization, lookup and shutdown are serialized on one lock, so a
/// lookup never observes a partially rebuilt set.
pub struct PoolRegistry<C>
where
    C: Connection,
{
    factories: FactoryRegistry<C>,
    managers: Mutex<HashMap<String, SharedManager<C>>>,
    log: Logger,
}

impl<C> Debug for PoolRegistry<C>
where
    C: Connection,
{
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        f.debug_struct("PoolRegistry")
            .field("factories", &self.factories)
            .field("pools", &self.names())
            .finish()
    }
}

impl<C> PoolRegistry<C>
where
    C: Connection,
{
    pub fn new(factories: FactoryRegistry<C>, log: Option<Logger>) -> Self {
        let log = log
            .unwrap_or_else(|| Logger::root(slog_stdlog::StdLog.fuse(), o!()));
        PoolRegistry {
            factories,
            managers: Mutex::new(HashMap::new()),
            log,
        }
    }

    /// Replace the registered managers with one manager per pool in
    /// `config`. Existing managers are shut down first. If any pool cannot
    /// be built the managers built so far are shut down as well, the error
    /// is returned and the registry is left empty.
    pub fn init_multi_managers(
        &self,
        config: &RegistryConfig,
    ) -> Result<(), Error> {
        let mut managers = self.managers.lock();
        shutdown_all(&mut managers, &self.log);

        let mut built = HashMap::with_capacity(config.pools.len());
        for (name, pool) in &config.pools {
            match self.factories.build(name, pool, &self.log) {
                Ok(manager) => {
                    info!(
                        self.log,
                        "Initialized pool {} with factory {}",
                        name,
                        pool.factory
                    );
                    built.insert(name.clone(), manager);
                }
                Err(e) => {
                    error!(
                        self.log,
                        "Failed to initialize pool {}: {}", name, e
                    );
                    shutdown_all(&mut built, &self.log);
                    return Err(e);
                }
            }
        }

        *managers = built;
        Ok(())
    }

    /// The manager registered as `name`, if any.
    pub fn get_manager(&self, name: &str) -> Option<SharedManager<C>> {
        self.managers.lock().get(name).cloned()
    }

    /// Shut down every registered manager and empty the registry.
    pub fn shutdown_managers(&self) {
        let mut managers = self.managers.lock();
        shutdown_all(&mut managers, &self.log);
    }

    /// Registered pool names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.managers.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.managers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.lock().is_empty()
    }
}

impl<C> Drop for PoolRegistry<C>
where
    C: Connection,
{
    fn drop(&mut self) {
        self.shutdown_managers();
    }
}

fn shutdown_all<C>(
    managers: &mut HashMap<String, SharedManager<C>>,
    log: &Logger,
) where
    C: Connection,
{
    for (name, manager) in managers.drain() {
        info!(log, "Shutting down pool {}", name);
        manager.shutdown();
    }
}
