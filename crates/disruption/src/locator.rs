//! Locators identify what a sampler is probing.
//!
//! A locator is a small set of sorted key/value pairs. Its string form,
//! `key/value key/value ...`, is the grouping key downstream reporting uses
//! to collect intervals per backend and connection type.

use crate::types::ConnectionType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name of the backend whose disruption is being measured
pub const BACKEND_DISRUPTION_NAME_KEY: &str = "backend-disruption-name";
/// `new` or `reused`
pub const CONNECTION_KEY: &str = "connection";
/// Instance that performed the sampling
pub const DISRUPTION_KEY: &str = "disruption";
pub const NAMESPACE_KEY: &str = "namespace";
pub const ROUTE_KEY: &str = "route";
pub const LOAD_BALANCER_KEY: &str = "load-balancer";

/// Structured identifier for a probed backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    keys: BTreeMap<String, String>,
}

impl Locator {
    /// Locator for a plain disruption check.
    pub fn disruption_check(
        backend_disruption_name: &str,
        source: &str,
        connection_type: ConnectionType,
    ) -> Self {
        Self::default()
            .with(BACKEND_DISRUPTION_NAME_KEY, backend_disruption_name)
            .with(CONNECTION_KEY, connection_type.to_string())
            .with(DISRUPTION_KEY, source)
    }

    /// Locator for a disruption check that goes through a named route.
    pub fn route_disruption_check(
        backend_disruption_name: &str,
        source: &str,
        namespace: &str,
        route: &str,
        connection_type: ConnectionType,
    ) -> Self {
        Self::disruption_check(backend_disruption_name, source, connection_type)
            .with(NAMESPACE_KEY, namespace)
            .with(ROUTE_KEY, route)
    }

    /// Add or replace a key.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.keys.insert(key.into(), value.into());
        self
    }

    /// Qualify the locator with the load balancer the traffic went through.
    pub fn with_load_balancer(self, load_balancer: &str) -> Self {
        self.with(LOAD_BALANCER_KEY, load_balancer)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.keys.get(key).map(String::as_str)
    }

    /// The backend disruption name, empty when the locator has none.
    pub fn backend_disruption_name(&self) -> &str {
        self.get(BACKEND_DISRUPTION_NAME_KEY).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.keys {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{}/{}", key, value)?;
            first = false;
        }
        Ok(())
    }
}
