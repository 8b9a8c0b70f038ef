//! Mailbox database models.

use crate::db::DbError;
use serde::Serialize;

/// Kind of a pending message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Human-facing notification for the recipient's dashboard.
    Notification,
    /// Machine-facing command to a specific UI surface.
    UiAction,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Notification => "notification",
            Self::UiAction => "ui_action",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DbError> {
        match s {
            "notification" => Ok(Self::Notification),
            "ui_action" => Ok(Self::UiAction),
            other => Err(DbError::InvalidMessageType(other.to_string())),
        }
    }
}

/// Delivery status of a pending message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Delivered,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DbError> {
        match s {
            "pending" => Ok(Self::Pending),
            "delivered" => Ok(Self::Delivered),
            other => Err(DbError::InvalidMessageType(other.to_string())),
        }
    }
}

/// A durably queued message.
#[derive(Debug, Clone, Serialize)]
pub struct PendingMessage {
    pub id: String,
    pub target_id: String,
    pub message_type: MessageType,
    pub payload: serde_json::Value,
    pub status: MessageStatus,
    /// Nanosecond creation timestamp; fetch order follows it.
    pub created_at: i64,
}
