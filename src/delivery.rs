//! Live delivery channel.
//!
//! Best-effort real-time push to currently-connected recipients, organised
//! by recipient and by session-broadcast group. Delivery is fire-and-forget
//! by contract: an absent or saturated recipient is silently skipped, and
//! failures here never affect the mailbox's durability guarantee.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use tokio::sync::mpsc;
use tracing::trace;

/// An event pushed to a connected recipient.
#[derive(Debug, Clone)]
pub struct DeliveryEvent {
    pub event: String,
    pub payload: serde_json::Value,
}

/// Abstract "deliver now" channel consulted after a durable store.
///
/// Implementations must be silent no-ops when the target or group has no
/// active connection.
#[async_trait]
pub trait LiveDelivery: Send + Sync {
    /// Push to a single recipient if connected.
    async fn send_to_target(&self, target_id: &str, event: &str, payload: &serde_json::Value);

    /// Push to every connected member of a broadcast group.
    async fn broadcast_to_group(&self, group_id: &str, event: &str, payload: &serde_json::Value);
}

/// In-process delivery channel over bounded mpsc senders.
///
/// The daemon wires this as the stand-in behind the trait seam; a concrete
/// wire transport is an external collaborator that registers and removes
/// connections the same way.
#[derive(Default)]
pub struct InProcessDelivery {
    /// Connected recipients: target id -> event sender.
    targets: DashMap<String, mpsc::Sender<DeliveryEvent>>,
    /// Broadcast groups: group id -> member target ids.
    groups: DashMap<String, DashSet<String>>,
}

impl InProcessDelivery {
    /// Per-connection event buffer. A slow consumer loses events rather
    /// than backpressuring the engine (the mailbox already holds the
    /// durable copy where one is required).
    const CHANNEL_CAPACITY: usize = 64;

    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for a recipient, replacing any previous one.
    /// Returns the receiving end of the connection's event stream.
    pub fn connect(&self, target_id: &str) -> mpsc::Receiver<DeliveryEvent> {
        let (tx, rx) = mpsc::channel(Self::CHANNEL_CAPACITY);
        self.targets.insert(target_id.to_string(), tx);
        rx
    }

    /// Drop a recipient's connection and its group memberships.
    pub fn disconnect(&self, target_id: &str) {
        self.targets.remove(target_id);
        for group in self.groups.iter() {
            group.value().remove(target_id);
        }
    }

    /// Add a recipient to a broadcast group.
    pub fn join_group(&self, group_id: &str, target_id: &str) {
        self.groups
            .entry(group_id.to_string())
            .or_default()
            .insert(target_id.to_string());
    }

    /// Remove a recipient from a broadcast group.
    pub fn leave_group(&self, group_id: &str, target_id: &str) {
        if let Some(group) = self.groups.get(group_id) {
            group.value().remove(target_id);
        }
    }

    fn push(&self, target_id: &str, event: &str, payload: &serde_json::Value) {
        let Some(sender) = self.targets.get(target_id) else {
            trace!(target_id = %target_id, "Live push skipped: not connected");
            return;
        };

        let delivery = DeliveryEvent {
            event: event.to_string(),
            payload: payload.clone(),
        };

        if let Err(e) = sender.try_send(delivery) {
            trace!(target_id = %target_id, error = %e, "Live push dropped");
            if matches!(e, mpsc::error::TrySendError::Closed(_)) {
                drop(sender);
                self.targets.remove(target_id);
            }
        }
    }
}

#[async_trait]
impl LiveDelivery for InProcessDelivery {
    async fn send_to_target(&self, target_id: &str, event: &str, payload: &serde_json::Value) {
        self.push(target_id, event, payload);
    }

    async fn broadcast_to_group(&self, group_id: &str, event: &str, payload: &serde_json::Value) {
        let Some(group) = self.groups.get(group_id) else {
            return;
        };
        let members: Vec<String> = group.iter().map(|m| m.key().clone()).collect();
        drop(group);

        for member in members {
            self.push(&member, event, payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_send_to_connected_target() {
        let delivery = InProcessDelivery::new();
        let mut rx = delivery.connect("user-1");

        delivery
            .send_to_target("user-1", "notification", &json!({"message": "hi"}))
            .await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event, "notification");
        assert_eq!(event.payload["message"], "hi");
    }

    #[tokio::test]
    async fn test_send_to_absent_target_is_noop() {
        let delivery = InProcessDelivery::new();
        // Must not panic or error
        delivery
            .send_to_target("nobody", "notification", &json!({}))
            .await;
    }

    #[tokio::test]
    async fn test_broadcast_reaches_only_group_members() {
        let delivery = InProcessDelivery::new();
        let mut member = delivery.connect("user-1");
        let mut outsider = delivery.connect("user-2");
        delivery.join_group("session-1", "user-1");

        delivery
            .broadcast_to_group("session-1", "notification", &json!({"message": "all"}))
            .await;

        assert_eq!(member.recv().await.unwrap().payload["message"], "all");
        assert!(outsider.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_prunes_groups() {
        let delivery = InProcessDelivery::new();
        let _rx = delivery.connect("user-1");
        delivery.join_group("session-1", "user-1");
        delivery.disconnect("user-1");

        delivery
            .broadcast_to_group("session-1", "notification", &json!({}))
            .await;
        // No receiver, no panic; membership gone
        assert!(
            delivery
                .groups
                .get("session-1")
                .is_none_or(|g| g.is_empty())
        );
    }
}
