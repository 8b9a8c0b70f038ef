//! Process-wide engine context.
//!
//! Owns the database handle, permission registry, coordinator and module
//! API facade. Constructed exactly once at startup and passed by
//! reference; there are no ambient singletons to look up.

use crate::config::EngineConfig;
use crate::coordinator::StateCoordinator;
use crate::db::{Database, mailbox};
use crate::delivery::LiveDelivery;
use crate::error::EngineResult;
use crate::facade::ModuleApi;
use crate::registry::PermissionRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// The assembled engine core.
pub struct Engine {
    config: EngineConfig,
    db: Database,
    registry: Arc<PermissionRegistry>,
    coordinator: StateCoordinator,
    module_api: ModuleApi,
}

impl Engine {
    /// Assemble the engine over an open database and a live delivery
    /// channel, warming the permission registry so the cache is valid
    /// before the first mutation is admitted.
    pub async fn new(
        config: EngineConfig,
        db: Database,
        delivery: Arc<dyn LiveDelivery>,
    ) -> EngineResult<Self> {
        let registry = Arc::new(PermissionRegistry::new());
        registry.reload(&db).await?;

        let coordinator =
            StateCoordinator::new(db.clone(), Arc::clone(&registry), config.clone());
        let module_api = ModuleApi::new(db.clone(), delivery);

        Ok(Self {
            config,
            db,
            registry,
            coordinator,
            module_api,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn registry(&self) -> &Arc<PermissionRegistry> {
        &self.registry
    }

    pub fn coordinator(&self) -> &StateCoordinator {
        &self.coordinator
    }

    pub fn module_api(&self) -> &ModuleApi {
        &self.module_api
    }

    /// Spawn the mailbox retention sweeper with the configured window.
    pub fn spawn_retention_task(&self) -> JoinHandle<()> {
        let retention = Duration::from_secs(self.config.mailbox_retention_days * 24 * 60 * 60);
        let interval = Duration::from_secs(self.config.purge_interval_secs);
        mailbox::spawn_retention_task(self.db.clone(), retention, interval)
    }
}
