// Copyright 2020 Joyent, Inc.

//! Configuration consumed by the managers and the pool registry.
//!
//! Configuration is normally read from TOML:
//!
//! ```toml
//! [pools.primary]
//! factory = "tcp"
//! servers = ["10.0.0.1:5432", "10.0.0.2:5432"]
//! tries = 3
//! sleep_time = 1000
//! so_timeout = 30000
//! con_timeout = 5000
//!
//! [pools.audit]
//! factory = "tcp"
//! pooling = false
//! servers = ["10.0.1.1:6000"]
//! tries = 0
//! sleep_time = 250
//! ```
//!
//! All times are in milliseconds. `tries` and `sleep_time` are required;
//! the timeouts are optional and default to 0 (no timeout).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde_derive::Deserialize;

use crate::error::Error;

/// A numeric setting as written in configuration. Values may be given as
/// strings, in which case they are parsed when the manager is built.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Setting {
    Number(i64),
    Text(String),
}

impl Setting {
    /// The integer value of the setting, if it has one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Setting::Number(n) => Some(*n),
            Setting::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl From<i64> for Setting {
    fn from(n: i64) -> Self {
        Setting::Number(n)
    }
}

impl From<&str> for Setting {
    fn from(s: &str) -> Self {
        Setting::Text(s.to_string())
    }
}

/// The configuration of a single `ConnectionManager` or
/// `ConnectionPoolManager`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ManagerConfig {
    /// Endpoint entries, each turned into one server by the factory.
    #[serde(default)]
    pub servers: Vec<String>,
    /// Maximum number of full rounds over the server list. Zero or negative
    /// means retry until a server answers.
    pub tries: Option<Setting>,
    /// Sleep between rounds in milliseconds.
    pub sleep_time: Option<Setting>,
    /// Socket idle timeout in milliseconds.
    pub so_timeout: Option<Setting>,
    /// Connection establishment timeout in milliseconds.
    pub con_timeout: Option<Setting>,
}

impl ManagerConfig {
    pub fn new<I, S>(servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ManagerConfig {
            servers: servers.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn tries<T: Into<Setting>>(mut self, tries: T) -> Self {
        self.tries = Some(tries.into());
        self
    }

    pub fn sleep_time<T: Into<Setting>>(mut self, millis: T) -> Self {
        self.sleep_time = Some(millis.into());
        self
    }

    pub fn so_timeout<T: Into<Setting>>(mut self, millis: T) -> Self {
        self.so_timeout = Some(millis.into());
        self
    }

    pub fn con_timeout<T: Into<Setting>>(mut self, millis: T) -> Self {
        self.con_timeout = Some(millis.into());
        self
    }
}

fn default_pooling() -> bool {
    true
}

/// One named pool in a `RegistryConfig`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct PoolConfig {
    /// Identifier of the connection factory registered with the
    /// `FactoryRegistry`.
    pub factory: String,
    /// Build a `ConnectionPoolManager` (the default) rather than a plain
    /// `ConnectionManager`.
    #[serde(default = "default_pooling")]
    pub pooling: bool,
    #[serde(flatten)]
    pub manager: ManagerConfig,
}

/// The set of named pools managed by a `PoolRegistry`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct RegistryConfig {
    #[serde(default)]
    pub pools: BTreeMap<String, PoolConfig>,
}

impl RegistryConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, Error> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}
