//! Process-wide registry of live actor systems.

use std::collections::HashSet;
use std::sync::RwLock;

use tokio::runtime::Handle;
use troupe_core::{ActorError, ActorResult};

/// Live system names, plus the runtime blocking waits fall back to.
///
/// Actor paths start with the system name, so two live systems with the same
/// name would fight over ractor's global name registry.
pub struct SystemRegistry {
    systems: RwLock<HashSet<String>>,
    runtime: RwLock<Option<Handle>>,
}

impl SystemRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            systems: RwLock::new(HashSet::new()),
            runtime: RwLock::new(None),
        }
    }

    /// Claim a system name.
    pub(crate) fn register(&self, name: &str) -> ActorResult<()> {
        let mut systems = self
            .systems
            .write()
            .map_err(|_| ActorError::Configuration("system registry poisoned".into()))?;
        if !systems.insert(name.to_string()) {
            return Err(ActorError::NameConflict(name.to_string()));
        }
        Ok(())
    }

    /// Release a system name.
    pub(crate) fn unregister(&self, name: &str) {
        match self.systems.write() {
            Ok(mut systems) => {
                systems.remove(name);
            }
            Err(_) => tracing::warn!(system = name, "system registry poisoned, name not released"),
        }
    }

    /// Whether a system with this name is running.
    pub fn is_live(&self, name: &str) -> bool {
        self.systems
            .read()
            .map(|systems| systems.contains(name))
            .unwrap_or(false)
    }

    /// Remember the runtime the latest system was created on.
    pub(crate) fn remember_runtime(&self, handle: Handle) {
        if let Ok(mut runtime) = self.runtime.write() {
            *runtime = Some(handle);
        }
    }

    /// Runtime used by blocking waits on threads outside tokio.
    pub fn runtime(&self) -> Option<Handle> {
        self.runtime.read().ok().and_then(|runtime| runtime.clone())
    }
}

impl Default for SystemRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Global registry instance.
static REGISTRY: std::sync::LazyLock<SystemRegistry> = std::sync::LazyLock::new(SystemRegistry::new);

/// Get the global system registry.
pub fn global_registry() -> &'static SystemRegistry {
    &REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_exclusive_until_released() {
        let registry = SystemRegistry::new();
        assert!(registry.register("orders").is_ok());
        assert_eq!(
            registry.register("orders"),
            Err(ActorError::NameConflict("orders".to_string()))
        );

        registry.unregister("orders");
        assert!(!registry.is_live("orders"));
        assert!(registry.register("orders").is_ok());
        assert!(registry.is_live("orders"));
    }

    #[tokio::test]
    async fn test_latest_runtime_is_remembered() {
        let registry = SystemRegistry::new();
        assert!(registry.runtime().is_none());

        registry.remember_runtime(Handle::current());
        assert!(registry.runtime().is_some());
    }
}
