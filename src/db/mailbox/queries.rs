//! Mailbox repository.

use super::models::{MessageStatus, MessageType, PendingMessage};
use crate::db::DbError;
use sqlx::SqlitePool;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

type MessageRow = (String, String, String, String, String, i64);

fn message_from_row(row: MessageRow) -> Result<PendingMessage, DbError> {
    let (id, target_id, message_type, payload, status, created_at) = row;
    Ok(PendingMessage {
        id,
        target_id,
        message_type: MessageType::parse(&message_type)?,
        payload: serde_json::from_str(&payload)?,
        status: MessageStatus::parse(&status)?,
        created_at,
    })
}

fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

/// Repository for mailbox operations.
pub struct MailboxRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> MailboxRepository<'a> {
    /// Create a new mailbox repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Durably store a message for a recipient.
    ///
    /// This is the only durability guarantee in the system; callers must
    /// not attempt live delivery unless this has succeeded.
    pub async fn store(
        &self,
        target_id: &str,
        message_type: MessageType,
        payload: &serde_json::Value,
    ) -> Result<PendingMessage, DbError> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = now_nanos();
        let payload_json = serde_json::to_string(payload)?;

        sqlx::query(
            r#"
            INSERT INTO pending_messages (id, target_id, message_type, payload, status, created_at)
            VALUES (?, ?, ?, ?, 'pending', ?)
            "#,
        )
        .bind(&id)
        .bind(target_id)
        .bind(message_type.as_str())
        .bind(&payload_json)
        .bind(created_at)
        .execute(self.pool)
        .await?;

        tracing::debug!(
            target_id = %target_id,
            message_id = %id,
            message_type = %message_type.as_str(),
            "Message stored for delivery"
        );

        Ok(PendingMessage {
            id,
            target_id: target_id.to_string(),
            message_type,
            payload: payload.clone(),
            status: MessageStatus::Pending,
            created_at,
        })
    }

    /// Fetch all pending messages for a recipient in creation order and
    /// mark them delivered in the same statement.
    ///
    /// A row is returned only if this call transitioned it, so two
    /// concurrent fetchers can never both claim the same message. Crash
    /// between return and the client's own acknowledgment can still
    /// duplicate delivery (at-least-once).
    pub async fn fetch_and_clear(
        &self,
        target_id: &str,
    ) -> Result<Vec<PendingMessage>, DbError> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            UPDATE pending_messages
            SET status = 'delivered'
            WHERE target_id = ? AND status = 'pending'
            RETURNING id, target_id, message_type, payload, status, created_at
            "#,
        )
        .bind(target_id)
        .fetch_all(self.pool)
        .await?;

        let mut messages = rows
            .into_iter()
            .map(message_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        // RETURNING order is unspecified; creation order is the contract.
        messages.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));

        if !messages.is_empty() {
            tracing::debug!(
                target_id = %target_id,
                count = messages.len(),
                "Fetched and cleared pending messages"
            );
        }

        Ok(messages)
    }

    /// Delete messages older than `retention` regardless of status.
    /// Returns the number of purged rows.
    pub async fn purge_expired(&self, retention: Duration) -> Result<u64, DbError> {
        let cutoff = now_nanos().saturating_sub(retention.as_nanos() as i64);

        let result = sqlx::query("DELETE FROM pending_messages WHERE created_at < ?")
            .bind(cutoff)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
