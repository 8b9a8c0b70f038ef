//! State consistency coordinator.
//!
//! Arbitrates between the continuous low-trust aggregation process and
//! sporadic high-trust authoritative interventions. Two writer roles
//! exist: the single configured **aggregator** (always trusted, silently
//! shadowed by foreign locks) and **resolvers** (modules granted
//! `engine.state.update`, for whom a foreign lock is a surfaced conflict).
//!
//! All writes go through the conditional statements in
//! [`StateRepository`](crate::db::StateRepository), so permission checks
//! happen here and lock arbitration happens inside the store - there is no
//! check-then-act window in between.

use crate::config::EngineConfig;
use crate::db::{Database, SessionState, StateRecord, StateUpdate};
use crate::error::{EngineError, EngineResult};
use crate::registry::{PermissionRegistry, perm};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Aggregated per-session view for the supervising read path.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SessionOverview {
    pub session_id: String,
    pub state_counts: HashMap<SessionState, i64>,
    pub recent: Vec<StateRecord>,
}

/// Enforces permission and lock rules before any state mutation commits.
#[derive(Clone)]
pub struct StateCoordinator {
    db: Database,
    registry: Arc<PermissionRegistry>,
    config: EngineConfig,
}

impl StateCoordinator {
    /// Number of recent records included in a session overview.
    const OVERVIEW_RECENT_LIMIT: u32 = 10;

    pub fn new(db: Database, registry: Arc<PermissionRegistry>, config: EngineConfig) -> Self {
        Self {
            db,
            registry,
            config,
        }
    }

    fn is_aggregator(&self, module_id: &str) -> bool {
        module_id == self.config.aggregator_module_id
    }

    /// Authorization gate shared by every state mutation: the aggregator is
    /// always trusted, everyone else needs `engine.state.update`.
    fn authorize(&self, module_id: &str) -> EngineResult<()> {
        if self.is_aggregator(module_id)
            || self.registry.is_granted(module_id, perm::ENGINE_STATE_UPDATE)
        {
            return Ok(());
        }
        warn!(
            module_id = %module_id,
            permission = perm::ENGINE_STATE_UPDATE,
            "State mutation denied"
        );
        Err(EngineError::AuthorizationDenied {
            module_id: module_id.to_string(),
            permission: perm::ENGINE_STATE_UPDATE,
        })
    }

    /// Propose a state update for a participant.
    ///
    /// Authorization is checked before any lock inspection; an unauthorized
    /// call writes nothing and creates no record. A write blocked by a
    /// foreign active lock is a silent no-op for the aggregator (the
    /// current record is returned unchanged) and a [`EngineError::LockConflict`]
    /// for a resolver. Last-writer-wins; no metadata merge.
    pub async fn propose_update(
        &self,
        module_id: &str,
        session_id: &str,
        participant_id: &str,
        update: StateUpdate,
    ) -> EngineResult<StateRecord> {
        self.authorize(module_id)?;

        let now = chrono::Utc::now().timestamp();
        let committed = self
            .db
            .state()
            .propose_write(
                session_id,
                participant_id,
                module_id,
                update.state,
                update.metadata.as_ref(),
                now,
            )
            .await?;

        if let Some(record) = committed {
            debug!(
                module_id = %module_id,
                session_id = %session_id,
                participant_id = %participant_id,
                state = %record.current_state,
                "State updated"
            );
            return Ok(record);
        }

        // The conditional write was absorbed by a foreign active lock.
        let record = self
            .db
            .state()
            .find(session_id, participant_id)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!(
                    "state record {session_id}/{participant_id} vanished under lock arbitration"
                ))
            })?;

        if self.is_aggregator(module_id) {
            // Expected contention: the aggregator is routinely shadowed by
            // active investigations. Not an error.
            debug!(
                session_id = %session_id,
                participant_id = %participant_id,
                locked_by = ?record.lock.holder,
                "Aggregator update shadowed by state lock"
            );
            return Ok(record);
        }

        let holder = record
            .lock
            .holder
            .clone()
            .unwrap_or_else(|| "unknown".to_string());
        warn!(
            module_id = %module_id,
            session_id = %session_id,
            participant_id = %participant_id,
            holder = %holder,
            "Resolver write rejected by state lock"
        );
        Err(EngineError::LockConflict { holder })
    }

    /// Acquire the state lock for a participant, upserting the record if
    /// absent.
    ///
    /// Default semantics are cooperative: acquisition always succeeds and
    /// overwrites any existing lock, with expiry bounding the damage of an
    /// errant overwrite. With `engine.exclusive_locks` enabled the
    /// acquisition is conditional and a foreign unexpired lock yields
    /// [`EngineError::LockConflict`].
    pub async fn acquire_lock(
        &self,
        session_id: &str,
        participant_id: &str,
        module_id: &str,
        duration_secs: Option<u64>,
        reason: Option<&str>,
    ) -> EngineResult<StateRecord> {
        self.authorize(module_id)?;

        let duration = duration_secs.unwrap_or(self.config.default_lock_secs);
        let now = chrono::Utc::now().timestamp();
        let expires_at = now + duration as i64;

        let acquired = self
            .db
            .state()
            .upsert_lock(
                session_id,
                participant_id,
                module_id,
                now,
                expires_at,
                reason,
                self.config.exclusive_locks,
            )
            .await?;

        if !acquired {
            let holder = self
                .db
                .state()
                .find(session_id, participant_id)
                .await?
                .and_then(|r| r.lock.holder)
                .unwrap_or_else(|| "unknown".to_string());
            return Err(EngineError::LockConflict { holder });
        }

        debug!(
            module_id = %module_id,
            session_id = %session_id,
            participant_id = %participant_id,
            duration_secs = duration,
            "State lock acquired"
        );

        self.db
            .state()
            .find(session_id, participant_id)
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!(
                    "state record {session_id}/{participant_id} vanished after lock acquisition"
                ))
            })
    }

    /// Release the lock if (and only if) `module_id` holds it.
    ///
    /// A non-holder call is a no-op so a module can never release a lock it
    /// does not own, accidentally or otherwise.
    pub async fn release_lock(
        &self,
        session_id: &str,
        participant_id: &str,
        module_id: &str,
    ) -> EngineResult<()> {
        let now = chrono::Utc::now().timestamp();
        let released = self
            .db
            .state()
            .release_lock(session_id, participant_id, module_id, now)
            .await?;

        if released {
            debug!(
                module_id = %module_id,
                session_id = %session_id,
                participant_id = %participant_id,
                "State lock released"
            );
        }
        Ok(())
    }

    /// Read the current record for a participant, if any.
    pub async fn read_status(
        &self,
        session_id: &str,
        participant_id: &str,
    ) -> EngineResult<Option<StateRecord>> {
        Ok(self.db.state().find(session_id, participant_id).await?)
    }

    /// Aggregate view of a session: per-state counts and recent activity.
    pub async fn session_overview(&self, session_id: &str) -> EngineResult<SessionOverview> {
        let counts = self.db.state().session_counts(session_id).await?;
        let recent = self
            .db
            .state()
            .recent_for_session(session_id, Self::OVERVIEW_RECENT_LIMIT)
            .await?;

        Ok(SessionOverview {
            session_id: session_id.to_string(),
            state_counts: counts.into_iter().collect(),
            recent,
        })
    }
}
