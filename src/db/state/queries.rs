//! State record repository.
//!
//! Every mutation here is a single conditional statement: the lock
//! ownership/expiry condition lives in the statement's WHERE clause, so
//! there is no window between lock inspection and write even when several
//! processes share the database.

use super::models::{SessionState, StateLock, StateMetadata, StateRecord};
use crate::db::DbError;
use sqlx::SqlitePool;

/// Raw row shape shared by every query that returns full records.
type StateRow = (
    String,         // session_id
    String,         // participant_id
    String,         // current_state
    Option<String>, // state_metadata (JSON)
    String,         // last_updated_by
    bool,           // lock_held
    Option<String>, // lock_holder
    Option<i64>,    // locked_at
    Option<i64>,    // lock_expires_at
    Option<String>, // lock_reason
    i64,            // created_at
    i64,            // updated_at
);

const COLUMNS: &str = "session_id, participant_id, current_state, state_metadata, \
     last_updated_by, lock_held, lock_holder, locked_at, lock_expires_at, \
     lock_reason, created_at, updated_at";

fn record_from_row(row: StateRow) -> Result<StateRecord, DbError> {
    let (
        session_id,
        participant_id,
        current_state,
        state_metadata,
        last_updated_by,
        lock_held,
        lock_holder,
        locked_at,
        lock_expires_at,
        lock_reason,
        created_at,
        updated_at,
    ) = row;

    let state_metadata = state_metadata
        .as_deref()
        .map(serde_json::from_str::<StateMetadata>)
        .transpose()?;

    Ok(StateRecord {
        session_id,
        participant_id,
        current_state: SessionState::parse(&current_state)?,
        state_metadata,
        last_updated_by,
        lock: StateLock {
            held: lock_held,
            holder: lock_holder,
            locked_at,
            expires_at: lock_expires_at,
            reason: lock_reason,
        },
        created_at,
        updated_at,
    })
}

/// Repository for state record operations.
pub struct StateRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> StateRepository<'a> {
    /// Create a new state repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Find the live record for a participant in a session.
    pub async fn find(
        &self,
        session_id: &str,
        participant_id: &str,
    ) -> Result<Option<StateRecord>, DbError> {
        let row: Option<StateRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM state_records WHERE session_id = ? AND participant_id = ?"
        ))
        .bind(session_id)
        .bind(participant_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(record_from_row).transpose()
    }

    /// Conditionally upsert a state proposal.
    ///
    /// The write commits iff the record is absent, unlocked, lock-expired,
    /// or locked by the proposer itself. Returns the committed record, or
    /// `None` when a foreign active lock absorbed the write (the caller
    /// decides whether that is a silent no-op or a conflict).
    pub async fn propose_write(
        &self,
        session_id: &str,
        participant_id: &str,
        module_id: &str,
        state: SessionState,
        metadata: Option<&StateMetadata>,
        now: i64,
    ) -> Result<Option<StateRecord>, DbError> {
        let metadata_json = metadata.map(serde_json::to_string).transpose()?;

        let row: Option<StateRow> = sqlx::query_as(&format!(
            r#"
            INSERT INTO state_records
                (session_id, participant_id, current_state, state_metadata,
                 last_updated_by, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            ON CONFLICT(session_id, participant_id) DO UPDATE SET
                current_state = excluded.current_state,
                state_metadata = excluded.state_metadata,
                last_updated_by = excluded.last_updated_by,
                updated_at = excluded.updated_at
            WHERE state_records.lock_held = 0
               OR state_records.lock_holder = excluded.last_updated_by
               OR (state_records.lock_expires_at IS NOT NULL
                   AND state_records.lock_expires_at <= excluded.updated_at)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(session_id)
        .bind(participant_id)
        .bind(state.as_str())
        .bind(metadata_json)
        .bind(module_id)
        .bind(now)
        .fetch_optional(self.pool)
        .await?;

        row.map(record_from_row).transpose()
    }

    /// Set the lock, upserting the record if absent.
    ///
    /// With `exclusive` false the lock is overwritten unconditionally (the
    /// cooperative-locking semantics). With `exclusive` true the statement
    /// only commits when the lock is free, expired, or already held by
    /// `module_id`; returns `false` when a foreign active lock won.
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_lock(
        &self,
        session_id: &str,
        participant_id: &str,
        module_id: &str,
        now: i64,
        expires_at: i64,
        reason: Option<&str>,
        exclusive: bool,
    ) -> Result<bool, DbError> {
        let condition = if exclusive {
            r#"
            WHERE state_records.lock_held = 0
               OR state_records.lock_holder = excluded.lock_holder
               OR (state_records.lock_expires_at IS NOT NULL
                   AND state_records.lock_expires_at <= excluded.locked_at)
            "#
        } else {
            ""
        };

        let result = sqlx::query(&format!(
            r#"
            INSERT INTO state_records
                (session_id, participant_id, last_updated_by,
                 lock_held, lock_holder, locked_at, lock_expires_at,
                 lock_reason, created_at, updated_at)
            VALUES (?1, ?2, ?3, 1, ?3, ?4, ?5, ?6, ?4, ?4)
            ON CONFLICT(session_id, participant_id) DO UPDATE SET
                lock_held = 1,
                lock_holder = excluded.lock_holder,
                locked_at = excluded.locked_at,
                lock_expires_at = excluded.lock_expires_at,
                lock_reason = excluded.lock_reason,
                updated_at = excluded.updated_at
            {condition}
            "#
        ))
        .bind(session_id)
        .bind(participant_id)
        .bind(module_id)
        .bind(now)
        .bind(expires_at)
        .bind(reason)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Clear the lock iff `module_id` is the current holder.
    ///
    /// Returns whether a lock was actually released; a non-holder call is a
    /// no-op, never an error.
    pub async fn release_lock(
        &self,
        session_id: &str,
        participant_id: &str,
        module_id: &str,
        now: i64,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE state_records
            SET lock_held = 0, lock_holder = NULL, locked_at = NULL,
                lock_expires_at = NULL, lock_reason = NULL, updated_at = ?4
            WHERE session_id = ?1 AND participant_id = ?2 AND lock_holder = ?3
            "#,
        )
        .bind(session_id)
        .bind(participant_id)
        .bind(module_id)
        .bind(now)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Per-state record counts for a session.
    pub async fn session_counts(
        &self,
        session_id: &str,
    ) -> Result<Vec<(SessionState, i64)>, DbError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT current_state, COUNT(*)
            FROM state_records
            WHERE session_id = ?
            GROUP BY current_state
            "#,
        )
        .bind(session_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter()
            .map(|(state, count)| Ok((SessionState::parse(&state)?, count)))
            .collect()
    }

    /// Most recently updated records for a session.
    pub async fn recent_for_session(
        &self,
        session_id: &str,
        limit: u32,
    ) -> Result<Vec<StateRecord>, DbError> {
        let rows: Vec<StateRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM state_records \
             WHERE session_id = ? ORDER BY updated_at DESC LIMIT ?"
        ))
        .bind(session_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(record_from_row).collect()
    }
}
