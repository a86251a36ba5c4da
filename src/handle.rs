//! Live-swappable registry for hot reload.
//!
//! Readers take an `Arc<Registry>` snapshot per request and keep it for the whole pipeline,
//! so a reload never changes definitions under an in-flight request.

use crate::error::ConfigError;
use crate::registry::Registry;
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared handle to the current registry.
#[derive(Debug, Clone)]
pub struct RegistryHandle {
    inner: Arc<ArcSwap<Registry>>,
}

impl RegistryHandle {
    /// Wrap a loaded registry.
    pub fn new(registry: Registry) -> Self {
        Self { inner: Arc::new(ArcSwap::from_pointee(registry)) }
    }

    /// Snapshot the current registry (cheap clone of Arc).
    pub fn current(&self) -> Arc<Registry> {
        self.inner.load_full()
    }

    /// Swap in a registry without verification.
    pub fn replace(&self, registry: Registry) {
        self.inner.store(Arc::new(registry));
    }

    /// Rebuild from declarations, verify, then swap.
    ///
    /// The new registry starts from the current settings with no definitions. On any wiring
    /// problem the current registry stays in place and the problems are returned.
    pub fn reload<F>(&self, declare: F) -> Result<(), Vec<ConfigError>>
    where
        F: FnOnce(&mut Registry) -> Result<(), ConfigError>,
    {
        let mut fresh = Registry::with_config(self.current().config().clone());
        if let Err(err) = declare(&mut fresh) {
            warn!(target: "lanyard::registry", error = %err, "reload rejected");
            return Err(vec![err]);
        }
        if let Err(problems) = fresh.verify() {
            warn!(target: "lanyard::registry", problems = problems.len(), "reload rejected");
            return Err(problems);
        }
        self.inner.store(Arc::new(fresh));
        info!(target: "lanyard::registry", "registry reloaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Attribute;

    #[test]
    fn snapshots_survive_reload() {
        let handle = RegistryHandle::new(Registry::new());
        let before = handle.current();
        handle
            .reload(|r| {
                r.define_entity("user", |e| {
                    e.basic(Attribute::field("id"));
                });
                Ok(())
            })
            .expect("valid registry");
        assert!(before.entity("user").is_none());
        assert!(handle.current().entity("user").is_some());
    }

    #[test]
    fn failed_reload_keeps_current() {
        let handle = RegistryHandle::new(Registry::new());
        let problems = handle
            .reload(|r| {
                r.define_entity("user", |e| {
                    e.basic(Attribute::field("pet").entity("pet"));
                });
                Ok(())
            })
            .unwrap_err();
        assert_eq!(problems, vec![ConfigError::UnknownEntity { name: "pet".into() }]);
        assert!(handle.current().entity("user").is_none());
    }
}
