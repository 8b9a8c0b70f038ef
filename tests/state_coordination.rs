//! Coordinator invariants: authorization gating, lock arbitration, and the
//! aggregator/resolver conflict asymmetry.

mod common;
use common::{AGGREGATOR, install_feature, install_resolver, spawn, spawn_with};
use veristate::db::{SessionState, StateMetadata, StateUpdate};
use veristate::error::EngineError;

fn update(state: SessionState) -> StateUpdate {
    StateUpdate {
        state,
        metadata: None,
    }
}

#[tokio::test]
async fn test_unauthorized_module_is_rejected_without_side_effects() -> anyhow::Result<()> {
    let t = spawn().await?;
    // Attached, but engine.state.update was never granted
    install_feature(&t, "mod.feature.chat").await?;

    let result = t
        .engine
        .coordinator()
        .propose_update("mod.feature.chat", "S", "P", update(SessionState::Satisfied))
        .await;

    let err = result.unwrap_err();
    assert!(matches!(err, EngineError::AuthorizationDenied { .. }));
    assert_eq!(err.error_code(), "authorization_denied");

    // The check happens before any lock inspection or write: no record
    // exists even though none existed before.
    assert!(t.engine.coordinator().read_status("S", "P").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_unknown_module_is_rejected() -> anyhow::Result<()> {
    let t = spawn().await?;

    // Never registered at all - fail-closed
    let result = t
        .engine
        .coordinator()
        .propose_update("mod.ghost", "S", "P", update(SessionState::Satisfied))
        .await;

    assert!(matches!(
        result,
        Err(EngineError::AuthorizationDenied { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_aggregator_needs_no_grant() -> anyhow::Result<()> {
    let t = spawn().await?;

    let record = t
        .engine
        .coordinator()
        .propose_update(AGGREGATOR, "S", "P", update(SessionState::Satisfied))
        .await?;

    assert_eq!(record.current_state, SessionState::Satisfied);
    assert_eq!(record.last_updated_by, AGGREGATOR);
    Ok(())
}

#[tokio::test]
async fn test_resolver_write_rejected_by_foreign_lock() -> anyhow::Result<()> {
    let t = spawn().await?;
    install_resolver(&t, "mod.resolver.fraud").await?;
    install_resolver(&t, "mod.resolver.audit").await?;

    t.engine
        .coordinator()
        .propose_update(AGGREGATOR, "S", "P", update(SessionState::Satisfied))
        .await?;
    t.engine
        .coordinator()
        .acquire_lock("S", "P", "mod.resolver.fraud", Some(60), Some("investigating"))
        .await?;

    let err = t
        .engine
        .coordinator()
        .propose_update(
            "mod.resolver.audit",
            "S",
            "P",
            update(SessionState::NotSatisfied),
        )
        .await
        .unwrap_err();

    match err {
        EngineError::LockConflict { holder } => assert_eq!(holder, "mod.resolver.fraud"),
        other => panic!("expected LockConflict, got {other:?}"),
    }

    // Stored state unchanged
    let record = t.engine.coordinator().read_status("S", "P").await?.unwrap();
    assert_eq!(record.current_state, SessionState::Satisfied);
    assert_eq!(record.last_updated_by, AGGREGATOR);
    Ok(())
}

#[tokio::test]
async fn test_aggregator_is_silently_shadowed_by_foreign_lock() -> anyhow::Result<()> {
    let t = spawn().await?;
    install_resolver(&t, "mod.resolver.fraud").await?;

    t.engine
        .coordinator()
        .propose_update(
            "mod.resolver.fraud",
            "S",
            "P",
            update(SessionState::NotSatisfied),
        )
        .await?;
    t.engine
        .coordinator()
        .acquire_lock("S", "P", "mod.resolver.fraud", Some(60), None)
        .await?;

    // No error: the aggregator is a best-effort background process and is
    // expected to be routinely shadowed by active investigations.
    let returned = t
        .engine
        .coordinator()
        .propose_update(AGGREGATOR, "S", "P", update(SessionState::Suspicious))
        .await?;

    assert_eq!(returned.current_state, SessionState::NotSatisfied);

    let stored = t.engine.coordinator().read_status("S", "P").await?.unwrap();
    assert_eq!(stored.current_state, SessionState::NotSatisfied);
    assert_eq!(stored.last_updated_by, "mod.resolver.fraud");
    Ok(())
}

#[tokio::test]
async fn test_lock_holder_writes_through_own_lock() -> anyhow::Result<()> {
    let t = spawn().await?;
    install_resolver(&t, "mod.resolver.fraud").await?;

    t.engine
        .coordinator()
        .acquire_lock("S", "P", "mod.resolver.fraud", Some(60), None)
        .await?;

    let record = t
        .engine
        .coordinator()
        .propose_update(
            "mod.resolver.fraud",
            "S",
            "P",
            StateUpdate {
                state: SessionState::Suspicious,
                metadata: Some(StateMetadata::Reason {
                    reason: "GPS signal lost in tunnel".into(),
                }),
            },
        )
        .await?;

    assert_eq!(record.current_state, SessionState::Suspicious);
    assert!(matches!(
        record.state_metadata,
        Some(StateMetadata::Reason { .. })
    ));
    // Writing through one's own lock does not release it
    assert!(record.lock.held);
    Ok(())
}

#[tokio::test]
async fn test_expired_lock_behaves_as_unlocked() -> anyhow::Result<()> {
    let t = spawn().await?;
    install_resolver(&t, "mod.resolver.fraud").await?;
    install_resolver(&t, "mod.resolver.audit").await?;

    // Duration zero: expired the moment it is taken
    t.engine
        .coordinator()
        .acquire_lock("S", "P", "mod.resolver.fraud", Some(0), None)
        .await?;

    let record = t
        .engine
        .coordinator()
        .propose_update(
            "mod.resolver.audit",
            "S",
            "P",
            update(SessionState::PartiallySatisfied),
        )
        .await?;

    assert_eq!(record.current_state, SessionState::PartiallySatisfied);
    assert_eq!(record.last_updated_by, "mod.resolver.audit");
    Ok(())
}

#[tokio::test]
async fn test_release_is_holder_only() -> anyhow::Result<()> {
    let t = spawn().await?;
    install_resolver(&t, "mod.resolver.fraud").await?;
    install_resolver(&t, "mod.resolver.audit").await?;

    t.engine
        .coordinator()
        .acquire_lock("S", "P", "mod.resolver.fraud", Some(60), None)
        .await?;

    // A non-holder release is a no-op, not an error
    t.engine
        .coordinator()
        .release_lock("S", "P", "mod.resolver.audit")
        .await?;
    let record = t.engine.coordinator().read_status("S", "P").await?.unwrap();
    assert!(record.lock.held);
    assert_eq!(record.lock.holder.as_deref(), Some("mod.resolver.fraud"));

    // The holder's release clears the lock
    t.engine
        .coordinator()
        .release_lock("S", "P", "mod.resolver.fraud")
        .await?;
    let record = t.engine.coordinator().read_status("S", "P").await?.unwrap();
    assert!(!record.lock.held);
    assert!(record.lock.holder.is_none());
    assert!(record.lock.expires_at.is_none());
    Ok(())
}

#[tokio::test]
async fn test_default_lock_acquisition_overwrites() -> anyhow::Result<()> {
    let t = spawn().await?;
    install_resolver(&t, "mod.resolver.fraud").await?;
    install_resolver(&t, "mod.resolver.audit").await?;

    t.engine
        .coordinator()
        .acquire_lock("S", "P", "mod.resolver.fraud", Some(60), None)
        .await?;

    // Cooperative semantics: acquisition always succeeds and overwrites
    let record = t
        .engine
        .coordinator()
        .acquire_lock("S", "P", "mod.resolver.audit", Some(60), Some("escalated"))
        .await?;

    assert_eq!(record.lock.holder.as_deref(), Some("mod.resolver.audit"));
    assert_eq!(record.lock.reason.as_deref(), Some("escalated"));
    Ok(())
}

#[tokio::test]
async fn test_exclusive_lock_toggle_rejects_steal() -> anyhow::Result<()> {
    let t = spawn_with(|config| config.exclusive_locks = true).await?;
    install_resolver(&t, "mod.resolver.fraud").await?;
    install_resolver(&t, "mod.resolver.audit").await?;

    t.engine
        .coordinator()
        .acquire_lock("S", "P", "mod.resolver.fraud", Some(60), None)
        .await?;

    let err = t
        .engine
        .coordinator()
        .acquire_lock("S", "P", "mod.resolver.audit", Some(60), None)
        .await
        .unwrap_err();
    match err {
        EngineError::LockConflict { holder } => assert_eq!(holder, "mod.resolver.fraud"),
        other => panic!("expected LockConflict, got {other:?}"),
    }

    // Re-acquisition by the holder still succeeds (extends the lock)
    let record = t
        .engine
        .coordinator()
        .acquire_lock("S", "P", "mod.resolver.fraud", Some(120), None)
        .await?;
    assert_eq!(record.lock.holder.as_deref(), Some("mod.resolver.fraud"));
    Ok(())
}

#[tokio::test]
async fn test_exclusive_toggle_allows_taking_expired_lock() -> anyhow::Result<()> {
    let t = spawn_with(|config| config.exclusive_locks = true).await?;
    install_resolver(&t, "mod.resolver.fraud").await?;
    install_resolver(&t, "mod.resolver.audit").await?;

    t.engine
        .coordinator()
        .acquire_lock("S", "P", "mod.resolver.fraud", Some(0), None)
        .await?;

    let record = t
        .engine
        .coordinator()
        .acquire_lock("S", "P", "mod.resolver.audit", Some(60), None)
        .await?;
    assert_eq!(record.lock.holder.as_deref(), Some("mod.resolver.audit"));
    Ok(())
}

#[tokio::test]
async fn test_lock_acquisition_passes_permission_gate() -> anyhow::Result<()> {
    let t = spawn().await?;
    install_feature(&t, "mod.feature.chat").await?;

    let result = t
        .engine
        .coordinator()
        .acquire_lock("S", "P", "mod.feature.chat", Some(60), None)
        .await;

    assert!(matches!(
        result,
        Err(EngineError::AuthorizationDenied { .. })
    ));
    assert!(t.engine.coordinator().read_status("S", "P").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_session_overview_counts_by_state() -> anyhow::Result<()> {
    let t = spawn().await?;

    for (participant, state) in [
        ("P1", SessionState::Satisfied),
        ("P2", SessionState::Satisfied),
        ("P3", SessionState::Suspicious),
    ] {
        t.engine
            .coordinator()
            .propose_update(AGGREGATOR, "S", participant, update(state))
            .await?;
    }
    // A different session must not leak into the overview
    t.engine
        .coordinator()
        .propose_update(AGGREGATOR, "S2", "P9", update(SessionState::NotSatisfied))
        .await?;

    let overview = t.engine.coordinator().session_overview("S").await?;
    assert_eq!(overview.state_counts[&SessionState::Satisfied], 2);
    assert_eq!(overview.state_counts[&SessionState::Suspicious], 1);
    assert!(!overview.state_counts.contains_key(&SessionState::NotSatisfied));
    assert_eq!(overview.recent.len(), 3);
    Ok(())
}
