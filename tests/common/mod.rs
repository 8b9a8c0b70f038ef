//! Integration test common infrastructure.
//!
//! Spins up an engine over a private in-memory database and provides
//! helpers for installing test modules with or without grants.

use std::sync::Arc;
use veristate::config::EngineConfig;
use veristate::db::{Database, ModuleKind, ModuleManifest, PermissionRequest};
use veristate::delivery::{InProcessDelivery, LiveDelivery};
use veristate::engine::Engine;
use veristate::registry::perm;

/// Aggregator module id used across the integration suites.
#[allow(dead_code)]
pub const AGGREGATOR: &str = "mod.aggregator";

/// An engine wired to an in-process delivery channel the tests can observe.
pub struct TestEngine {
    pub engine: Engine,
    #[allow(dead_code)]
    pub delivery: Arc<InProcessDelivery>,
}

/// Spawn a test engine with default configuration.
pub async fn spawn() -> anyhow::Result<TestEngine> {
    spawn_with(|_| {}).await
}

/// Spawn a test engine with tweaked engine configuration.
pub async fn spawn_with(tweak: impl FnOnce(&mut EngineConfig)) -> anyhow::Result<TestEngine> {
    let mut config = EngineConfig {
        aggregator_module_id: AGGREGATOR.to_string(),
        ..EngineConfig::default()
    };
    tweak(&mut config);

    let db = Database::new(":memory:").await?;
    let delivery = Arc::new(InProcessDelivery::new());
    let engine = Engine::new(config, db, delivery.clone() as Arc<dyn LiveDelivery>).await?;

    Ok(TestEngine { engine, delivery })
}

/// Build a manifest requesting the given permissions.
pub fn manifest(module_id: &str, permissions: &[&str]) -> ModuleManifest {
    ModuleManifest {
        id: module_id.to_string(),
        version: "1.0.0".to_string(),
        description: None,
        permissions: permissions
            .iter()
            .map(|name| PermissionRequest {
                name: name.to_string(),
                description: String::new(),
                required: true,
            })
            .collect(),
    }
}

/// Register and attach a module without granting anything.
#[allow(dead_code)]
pub async fn install_feature(t: &TestEngine, module_id: &str) -> anyhow::Result<()> {
    let (_, invalidation) = t
        .engine
        .db()
        .modules()
        .register(&manifest(module_id, &[perm::ENGINE_STATE_UPDATE]), ModuleKind::Feature)
        .await?;
    t.engine
        .registry()
        .refresh(invalidation, t.engine.db())
        .await?;
    Ok(())
}

/// Register, attach and grant `engine.state.update` - a resolver.
#[allow(dead_code)]
pub async fn install_resolver(t: &TestEngine, module_id: &str) -> anyhow::Result<()> {
    install_feature(t, module_id).await?;
    let invalidation = t
        .engine
        .db()
        .modules()
        .grant(module_id, perm::ENGINE_STATE_UPDATE)
        .await?;
    t.engine
        .registry()
        .refresh(invalidation, t.engine.db())
        .await?;
    Ok(())
}
