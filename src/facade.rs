//! Module API facade.
//!
//! The only outward-facing surface modules may use to notify or command
//! participants. Every handle is bound to exactly one module id and stamps
//! it on everything it emits, so a module can never forge another module's
//! identity or target another module's UI surface.
//!
//! Delivery contract: single-recipient operations store to the mailbox
//! first (the hard failure boundary - a failed store propagates and no
//! live push is attempted), then push live best-effort. Session broadcasts
//! are live-only; offline participants miss them by design.

use crate::db::{Database, MessageType, PendingMessage};
use crate::delivery::LiveDelivery;
use crate::error::EngineResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Severity of a human-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteLevel {
    Info,
    Warning,
    Error,
}

/// A human-readable notification for a participant's dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub message: String,
    pub level: NoteLevel,
}

impl Note {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: NoteLevel::Info,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: NoteLevel::Warning,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: NoteLevel::Error,
        }
    }
}

/// A machine-facing command for one module's UI surface at one user.
#[derive(Debug, Clone)]
pub struct UiCommand {
    pub target_user_id: String,
    pub payload: serde_json::Value,
}

/// Factory for per-module API handles.
pub struct ModuleApi {
    db: Database,
    delivery: Arc<dyn LiveDelivery>,
}

impl ModuleApi {
    pub fn new(db: Database, delivery: Arc<dyn LiveDelivery>) -> Self {
        Self { db, delivery }
    }

    /// Create the sandboxed handle for one module.
    pub fn create_handle(&self, module_id: &str) -> ModuleHandle {
        ModuleHandle {
            module_id: module_id.to_string(),
            db: self.db.clone(),
            delivery: Arc::clone(&self.delivery),
        }
    }
}

/// A module's capability to reach participants, stamped with its identity.
#[derive(Clone)]
pub struct ModuleHandle {
    module_id: String,
    db: Database,
    delivery: Arc<dyn LiveDelivery>,
}

impl ModuleHandle {
    /// The module id this handle is bound to.
    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    /// Human-facing notification operations.
    pub fn notifications(&self) -> Notifications<'_> {
        Notifications { handle: self }
    }

    /// Machine-facing UI command operations.
    pub fn ui_actions(&self) -> UiActions<'_> {
        UiActions { handle: self }
    }
}

/// Notification operations on a module handle.
pub struct Notifications<'a> {
    handle: &'a ModuleHandle,
}

impl Notifications<'_> {
    /// Send a private notification to a single user, with guaranteed
    /// eventual delivery even if they are offline.
    pub async fn send_to_user(&self, user_id: &str, note: &Note) -> EngineResult<PendingMessage> {
        let payload = serde_json::to_value(note).map_err(crate::db::DbError::from)?;

        // Store first; live delivery only after durability is secured.
        let stored = self
            .handle
            .db
            .mailbox()
            .store(user_id, MessageType::Notification, &payload)
            .await?;

        self.handle
            .delivery
            .send_to_target(user_id, "notification", &payload)
            .await;

        Ok(stored)
    }

    /// Broadcast a notification to all currently-connected participants of
    /// a session.
    ///
    /// Live-only: nothing is persisted, and participants offline at this
    /// moment never see the notice. Callers needing the per-recipient
    /// guarantee should fan out over [`send_to_user`](Self::send_to_user).
    pub async fn send_to_session(&self, session_id: &str, note: &Note) -> EngineResult<()> {
        let payload = serde_json::to_value(note).map_err(crate::db::DbError::from)?;

        self.handle
            .delivery
            .broadcast_to_group(session_id, "notification", &payload)
            .await;

        Ok(())
    }
}

/// UI command dispatch on a module handle.
pub struct UiActions<'a> {
    handle: &'a ModuleHandle,
}

impl UiActions<'_> {
    /// Dispatch a command to this module's UI surface for a specific user.
    ///
    /// The target module id is stamped by the facade, not supplied by the
    /// caller, so a command can only ever address the issuing module's own
    /// UI components. Always mailbox-backed: UI commands, unlike ambient
    /// notices, must not be silently lost.
    pub async fn dispatch(&self, command: UiCommand) -> EngineResult<PendingMessage> {
        let full_payload = serde_json::json!({
            "target_module_id": self.handle.module_id,
            "payload": command.payload,
        });

        let stored = self
            .handle
            .db
            .mailbox()
            .store(&command.target_user_id, MessageType::UiAction, &full_payload)
            .await?;

        self.handle
            .delivery
            .send_to_target(&command.target_user_id, "ui_action", &full_payload)
            .await;

        Ok(stored)
    }
}
