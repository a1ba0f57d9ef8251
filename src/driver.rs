//! Driver registry.
//!
//! A [`Driver`] turns a DSN into a [`Target`] without touching the network.
//! [`Drivers`] maps driver identifiers to drivers; the connector refuses
//! identifiers it cannot find here.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::any::AnyDriver;
use crate::target::Target;

/// Opens pool handles for one family of databases.
pub trait Driver: Send + Sync {
    /// Build a handle for `dsn`. Must not connect.
    fn open(&self, driver_name: &str, dsn: &str) -> Result<Arc<dyn Target>, sqlx::Error>;
}

/// Driver identifiers served by the sqlx backend, instrumented aliases included.
pub const SQLX_DRIVER_NAMES: &[&str] = &[
    "postgres",
    "postgresql",
    "nrpostgres",
    "mysql",
    "mariadb",
    "nrmysql",
    "sqlite",
    "sqlite3",
];

/// Driver identifier → driver.
#[derive(Clone, Default)]
pub struct Drivers {
    drivers: HashMap<String, Arc<dyn Driver>>,
}

impl Drivers {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the sqlx backend under [`SQLX_DRIVER_NAMES`].
    pub fn with_defaults() -> Self {
        let any: Arc<dyn Driver> = Arc::new(AnyDriver::new());
        let mut drivers = Self::new();
        for name in SQLX_DRIVER_NAMES {
            drivers.register(*name, Arc::clone(&any));
        }
        drivers
    }

    /// Add or replace the driver for `name`.
    pub fn register(&mut self, name: impl Into<String>, driver: Arc<dyn Driver>) -> &mut Self {
        self.drivers.insert(name.into(), driver);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Driver>> {
        self.drivers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.drivers.contains_key(name)
    }

    /// Registered identifiers, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.drivers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for Drivers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Drivers").field("names", &self.names()).finish()
    }
}
