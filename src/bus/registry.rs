use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::warn;
use uuid::Uuid;

use crate::bus::{Envelope, EventKind, NotificationBus, Recipient};
use crate::error::DispatchError;
use crate::observability::metrics::Metrics;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Driver,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Driver => "driver",
            Role::Admin => "admin",
        }
    }

    fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

struct ClientHandle {
    outbox: mpsc::Sender<Envelope>,
    role: Role,
}

/// In-process fan-out of push notifications to live connections.
///
/// Identities map to at most one connection each; administrators receive
/// every published envelope. Fan-out runs under the read lock; evicting a
/// dead connection takes the write lock after the fan-out finishes. A send
/// that cannot complete within the timeout counts as dead, so one slow
/// consumer cannot stall delivery to the rest.
pub struct ConnectionRegistry {
    users: RwLock<HashMap<Uuid, ClientHandle>>,
    admins: RwLock<HashMap<Uuid, ClientHandle>>,
    buffer: usize,
    send_timeout: Duration,
    metrics: Metrics,
}

impl ConnectionRegistry {
    pub fn new(buffer: usize, send_timeout: Duration, metrics: Metrics) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            admins: RwLock::new(HashMap::new()),
            buffer,
            send_timeout,
            metrics,
        }
    }

    /// Attach a verified connection and hand back its outbox. A previous
    /// connection under the same identity is replaced; its outbox closes
    /// and the stale socket task winds down on its own.
    pub async fn register(&self, identity: Uuid, role: Role) -> mpsc::Receiver<Envelope> {
        let (tx, rx) = mpsc::channel(self.buffer);
        let mut guard = self.map_for(role).write().await;
        if let Some(old) = guard.insert(identity, ClientHandle { outbox: tx, role }) {
            self.metrics
                .connected_clients
                .with_label_values(&[old.role.as_str()])
                .dec();
        }
        self.metrics
            .connected_clients
            .with_label_values(&[role.as_str()])
            .inc();
        rx
    }

    pub async fn unregister(&self, identity: Uuid, role: Role) {
        let mut guard = self.map_for(role).write().await;
        if let Some(handle) = guard.remove(&identity) {
            self.metrics
                .connected_clients
                .with_label_values(&[handle.role.as_str()])
                .dec();
        }
    }

    pub async fn connections(&self) -> usize {
        self.users.read().await.len() + self.admins.read().await.len()
    }

    fn map_for(&self, role: Role) -> &RwLock<HashMap<Uuid, ClientHandle>> {
        if role.is_admin() {
            &self.admins
        } else {
            &self.users
        }
    }

    async fn send(&self, handle: &ClientHandle, envelope: Envelope) -> bool {
        matches!(
            timeout(self.send_timeout, handle.outbox.send(envelope)).await,
            Ok(Ok(()))
        )
    }
}

#[async_trait]
impl NotificationBus for ConnectionRegistry {
    /// Best-effort, at-most-once delivery: every admin connection plus the
    /// one connection matching the recipient. Dead connections are evicted;
    /// the publish itself never fails.
    async fn publish(
        &self,
        recipient: Recipient,
        kind: EventKind,
        payload: Value,
    ) -> Result<(), DispatchError> {
        let envelope = Envelope {
            recipient: recipient.wire_id(),
            kind,
            payload,
        };

        let mut dead_admins = Vec::new();
        {
            let admins = self.admins.read().await;
            for (id, handle) in admins.iter() {
                if !self.send(handle, envelope.clone()).await {
                    warn!(client = %id, "dropping unresponsive admin connection");
                    dead_admins.push(*id);
                }
            }
        }

        let mut dead_user = None;
        if let Recipient::Id(id) = recipient {
            let users = self.users.read().await;
            if let Some(handle) = users.get(&id) {
                if !self.send(handle, envelope.clone()).await {
                    warn!(client = %id, "dropping unresponsive client connection");
                    dead_user = Some(id);
                }
            }
        }

        for id in dead_admins {
            self.unregister(id, Role::Admin).await;
        }
        if let Some(id) = dead_user {
            self.unregister(id, Role::User).await;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use uuid::Uuid;

    use super::{ConnectionRegistry, Role};
    use crate::bus::{EventKind, NotificationBus, Recipient};
    use crate::observability::metrics::Metrics;

    fn registry() -> ConnectionRegistry {
        ConnectionRegistry::new(8, Duration::from_millis(50), Metrics::new())
    }

    #[tokio::test]
    async fn targeted_publish_reaches_recipient_and_admins() {
        let registry = registry();
        let user = Uuid::new_v4();
        let admin = Uuid::new_v4();

        let mut user_rx = registry.register(user, Role::User).await;
        let mut admin_rx = registry.register(admin, Role::Admin).await;

        registry
            .publish(
                Recipient::Id(user),
                EventKind::StatusUpdate,
                json!({ "booking_id": "b-1" }),
            )
            .await
            .unwrap();

        let to_user = user_rx.recv().await.unwrap();
        assert_eq!(to_user.kind, EventKind::StatusUpdate);
        assert_eq!(to_user.recipient, user.to_string());

        let to_admin = admin_rx.recv().await.unwrap();
        assert_eq!(to_admin.kind, EventKind::StatusUpdate);
    }

    #[tokio::test]
    async fn admin_broadcast_skips_regular_clients() {
        let registry = registry();
        let driver = Uuid::new_v4();
        let admin = Uuid::new_v4();

        let mut driver_rx = registry.register(driver, Role::Driver).await;
        let mut admin_rx = registry.register(admin, Role::Admin).await;

        registry
            .publish(
                Recipient::Admins,
                EventKind::DriverStatusUpdate,
                json!({ "driver_id": driver, "status": "Busy" }),
            )
            .await
            .unwrap();

        assert!(admin_rx.recv().await.is_some());
        assert!(driver_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_to_unknown_identity_is_a_noop() {
        let registry = registry();
        registry
            .publish(
                Recipient::Id(Uuid::new_v4()),
                EventKind::BookingAccepted,
                json!({}),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn dead_connection_is_evicted_without_failing_the_publish() {
        let registry = registry();
        let user = Uuid::new_v4();

        let rx = registry.register(user, Role::User).await;
        drop(rx);
        assert_eq!(registry.connections().await, 1);

        registry
            .publish(Recipient::Id(user), EventKind::StatusUpdate, json!({}))
            .await
            .unwrap();

        assert_eq!(registry.connections().await, 0);
    }

    #[tokio::test]
    async fn slow_consumer_is_evicted_after_the_send_timeout() {
        let registry = ConnectionRegistry::new(1, Duration::from_millis(20), Metrics::new());
        let user = Uuid::new_v4();

        // Fill the outbox and never drain it.
        let _rx = registry.register(user, Role::User).await;
        registry
            .publish(Recipient::Id(user), EventKind::StatusUpdate, json!({}))
            .await
            .unwrap();
        registry
            .publish(Recipient::Id(user), EventKind::StatusUpdate, json!({}))
            .await
            .unwrap();

        assert_eq!(registry.connections().await, 0);
    }

    #[tokio::test]
    async fn reconnect_replaces_the_previous_connection() {
        let registry = registry();
        let user = Uuid::new_v4();

        let mut first = registry.register(user, Role::User).await;
        let mut second = registry.register(user, Role::User).await;
        assert_eq!(registry.connections().await, 1);

        registry
            .publish(Recipient::Id(user), EventKind::StatusUpdate, json!({}))
            .await
            .unwrap();

        assert!(second.recv().await.is_some());
        assert!(first.recv().await.is_none());
    }
}
