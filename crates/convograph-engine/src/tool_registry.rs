//! Capability registry: the set of operations offered to models.
//!
//! The [`ToolRegistry`] holds [`Capability`] trait objects keyed by name,
//! with concurrent read access and runtime registration/removal.
//!
//! # Example
//!
//! ```
//! use convograph_engine::defaults::time_capabilities;
//! use convograph_engine::tool_registry::ToolRegistry;
//!
//! let registry = ToolRegistry::from_capabilities(time_capabilities());
//! assert!(registry.get("current_utc_time").is_some());
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::errors::CapabilityError;
use crate::traits::{Capability, CapabilityRegistry};
use crate::types::CapabilitySpec;

/// Thread-safe registry of capabilities with runtime mutability.
///
/// Cheaply cloneable. Clones share the same underlying registry, so a
/// capability registered through one handle is visible through all others.
#[derive(Clone)]
pub struct ToolRegistry {
    inner: Arc<RwLock<BTreeMap<String, Arc<dyn Capability>>>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    pub fn from_capabilities(capabilities: impl IntoIterator<Item = Arc<dyn Capability>>) -> Self {
        let registry = Self::new();
        for capability in capabilities {
            registry.register(capability);
        }
        registry
    }

    /// Register a capability, replacing any existing one with the same name.
    pub fn register(&self, capability: Arc<dyn Capability>) {
        let name = capability.spec().name;
        self.inner.write().insert(name, capability);
    }

    /// Remove a capability by name. Returns `true` if it existed.
    pub fn remove(&self, name: &str) -> bool {
        self.inner.write().remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.inner.read().get(name).cloned()
    }

    /// Specs of all capabilities, in name order.
    pub fn snapshot(&self) -> Vec<CapabilitySpec> {
        self.inner.read().values().map(|c| c.spec()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CapabilityRegistry for ToolRegistry {
    fn list(&self) -> Vec<CapabilitySpec> {
        self.snapshot()
    }

    async fn invoke(&self, name: &str, arguments: Value) -> Result<String, CapabilityError> {
        // Clone out of the lock; calls may take a while.
        let capability = self.get(name).ok_or_else(|| CapabilityError::NotFound {
            name: name.to_string(),
        })?;
        debug!(capability = name, "invoking capability");
        capability.call(arguments).await
    }
}
