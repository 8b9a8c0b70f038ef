//! Store-and-forward mailbox.
//!
//! Every outward module action is written here before any live delivery
//! attempt, so a never-connected recipient still receives it on next
//! fetch. Delivery is at-least-once; consumers must be idempotent on
//! message id.

mod models;
mod queries;

pub use models::{MessageStatus, MessageType, PendingMessage};
pub use queries::MailboxRepository;

use crate::db::Database;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Spawn the periodic retention sweep.
///
/// Messages older than `retention` are purged regardless of status; a
/// recipient absent longer than the window silently loses undelivered
/// messages, which bounds storage growth by design.
pub fn spawn_retention_task(
    db: Database,
    retention: Duration,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match db.mailbox().purge_expired(retention).await {
                Ok(0) => {}
                Ok(purged) => debug!(purged, "Mailbox retention sweep"),
                Err(e) => warn!(error = %e, "Mailbox retention sweep failed"),
            }
        }
    })
}
