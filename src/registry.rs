//! Permission registry: a process-local, read-optimised projection of the
//! persisted grant records.
//!
//! The registry is a cache, never a source of truth. `reload` swaps the
//! whole snapshot atomically so readers never observe a partial rebuild;
//! lookups are synchronous and fail-closed. Staleness is bounded: every
//! grant-affecting database mutation returns a [`RegistryInvalidation`]
//! that the supervising caller must route back through [`refresh`] before
//! the next state mutation is admitted.
//!
//! [`refresh`]: PermissionRegistry::refresh

use crate::db::{Database, DbError, RegistryInvalidation};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Well-known permission names.
pub mod perm {
    /// Required to write authoritative state through the coordinator
    /// (exempting only the configured aggregator module).
    pub const ENGINE_STATE_UPDATE: &str = "engine.state.update";
}

/// In-memory cache of granted permissions per attached module.
#[derive(Default)]
pub struct PermissionRegistry {
    grants: RwLock<HashMap<String, HashSet<String>>>,
}

impl PermissionRegistry {
    /// Create an empty registry. Empty means zero permissions for every
    /// module; call [`reload`](Self::reload) to warm it.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the snapshot from persisted truth and swap it in wholesale.
    pub async fn reload(&self, db: &Database) -> Result<(), DbError> {
        let snapshot = db.modules().attached_with_grants().await?;
        let modules = snapshot.len();
        let grants: usize = snapshot.values().map(HashSet::len).sum();

        *self.grants.write() = snapshot;

        info!(modules, grants, "Permission registry reloaded");
        Ok(())
    }

    /// Consume an invalidation token by reloading.
    ///
    /// This is the contract replacing ad hoc manual reload calls: the
    /// mutation hands its caller a token, and the cache cannot silently
    /// diverge for longer than one operation.
    pub async fn refresh(
        &self,
        _invalidation: RegistryInvalidation,
        db: &Database,
    ) -> Result<(), DbError> {
        self.reload(db).await
    }

    /// Whether `module_id` holds `permission`.
    ///
    /// Lock-free in the uncontended case and fail-closed: an unknown module
    /// or permission is simply not granted.
    pub fn is_granted(&self, module_id: &str, permission: &str) -> bool {
        self.grants
            .read()
            .get(module_id)
            .is_some_and(|granted| granted.contains(permission))
    }

    /// Module ids currently present in the snapshot (attached modules).
    pub fn known_modules(&self) -> Vec<String> {
        self.grants.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fail_closed_when_empty() {
        let registry = PermissionRegistry::new();
        assert!(!registry.is_granted("mod.anything", perm::ENGINE_STATE_UPDATE));
    }

    #[test]
    fn test_lookup_against_snapshot() {
        let registry = PermissionRegistry::new();
        {
            let mut grants = registry.grants.write();
            grants.insert(
                "mod.resolver.fraud".to_string(),
                HashSet::from([perm::ENGINE_STATE_UPDATE.to_string()]),
            );
            grants.insert("mod.feature.chat".to_string(), HashSet::new());
        }

        assert!(registry.is_granted("mod.resolver.fraud", perm::ENGINE_STATE_UPDATE));
        // Attached but ungranted
        assert!(!registry.is_granted("mod.feature.chat", perm::ENGINE_STATE_UPDATE));
        // Unknown module
        assert!(!registry.is_granted("mod.ghost", perm::ENGINE_STATE_UPDATE));
        // Unknown permission
        assert!(!registry.is_granted("mod.resolver.fraud", "engine.sessions.delete"));
    }
}
