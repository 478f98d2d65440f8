//! In-memory service registry.
//!
//! Maps a service name to the instances registered under it, in
//! registration order. A service with no instances left is removed so
//! that lookups and the live count agree.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::schema::string_or_number;
use crate::error::RegistryError;

/// A registered instance. Port is kept textual as it was registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub address: String,
    #[serde(deserialize_with = "string_or_number")]
    pub port: String,
}

impl ServiceRecord {
    pub fn new(address: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port: port.into(),
        }
    }

    /// `http://address:port`
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.address, self.port)
    }
}

/// Whether a registration changed the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Added,
    AlreadyPresent,
}

/// Thread-safe registry of live service instances.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: Mutex<HashMap<String, Vec<ServiceRecord>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instance. Re-registering an existing instance is a no-op.
    pub fn register(
        &self,
        name: &str,
        address: &str,
        port: &str,
    ) -> Result<Registration, RegistryError> {
        require_fields(&[("service_name", name), ("service_address", address), ("service_port", port)])?;

        let record = ServiceRecord::new(address, port);
        let mut services = self.services.lock();
        let instances = services.entry(name.to_string()).or_default();
        if instances.contains(&record) {
            return Ok(Registration::AlreadyPresent);
        }
        instances.push(record);
        Ok(Registration::Added)
    }

    /// Remove an instance. Returns whether anything was removed.
    pub fn deregister(&self, name: &str, address: &str, port: &str) -> Result<bool, RegistryError> {
        require_fields(&[("service_name", name), ("service_address", address), ("service_port", port)])?;

        let mut services = self.services.lock();
        let Some(instances) = services.get_mut(name) else {
            return Ok(false);
        };

        let before = instances.len();
        instances.retain(|r| !(r.address == address && r.port == port));
        let removed = instances.len() != before;
        if instances.is_empty() {
            services.remove(name);
        }
        Ok(removed)
    }

    /// The earliest-registered live instance of `name`.
    pub fn lookup(&self, name: &str) -> Result<ServiceRecord, RegistryError> {
        self.services
            .lock()
            .get(name)
            .and_then(|instances| instances.first().cloned())
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Total number of registered instances across all services.
    pub fn status(&self) -> usize {
        self.services.lock().values().map(Vec::len).sum()
    }

    /// Number of services with at least one instance.
    pub fn service_count(&self) -> usize {
        self.services.lock().len()
    }

    /// Copy of every service and its instances, ordered by name.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<ServiceRecord>> {
        self.services
            .lock()
            .iter()
            .map(|(name, instances)| (name.clone(), instances.clone()))
            .collect()
    }
}

fn require_fields(fields: &[(&str, &str)]) -> Result<(), RegistryError> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| *field)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(RegistryError::InvalidInput(missing.join(", ")))
    }
}
