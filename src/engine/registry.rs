// SPDX-License-Identifier: Apache-2.0

//! Driver Registry
//!
//! Maps driver ids (the `driver` field of the connection parameters) to
//! connectors. Lookups are case-insensitive.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::engine::drivers::mysql::MySqlConnector;
use crate::engine::traits::Connector;

/// Registry that holds the available connectors
pub struct DriverRegistry {
    connectors: HashMap<String, Arc<dyn Connector>>,
}

impl DriverRegistry {
    /// Creates a new empty registry
    pub fn new() -> Self {
        Self {
            connectors: HashMap::new(),
        }
    }

    /// Registry with every connector shipped in this crate.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        let mysql: Arc<dyn Connector> = Arc::new(MySqlConnector::new());
        registry.register(Arc::clone(&mysql));
        registry.register_alias("mariadb", mysql);
        registry
    }

    /// Process-wide registry of the built-in connectors.
    pub fn builtin() -> &'static DriverRegistry {
        static BUILTIN: OnceLock<DriverRegistry> = OnceLock::new();
        BUILTIN.get_or_init(DriverRegistry::with_builtin)
    }

    /// Registers a connector under its `driver_id()`
    pub fn register(&mut self, connector: Arc<dyn Connector>) {
        let id = connector.driver_id().to_ascii_lowercase();
        self.connectors.insert(id, connector);
    }

    /// Registers a connector under an additional id
    pub fn register_alias(&mut self, alias: &str, connector: Arc<dyn Connector>) {
        self.connectors.insert(alias.to_ascii_lowercase(), connector);
    }

    /// Gets a connector by driver id
    pub fn get(&self, driver_id: &str) -> Option<Arc<dyn Connector>> {
        self.connectors
            .get(&driver_id.trim().to_ascii_lowercase())
            .cloned()
    }

    /// Lists all registered driver ids, sorted
    pub fn list(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.connectors.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}
