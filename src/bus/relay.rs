use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;

use crate::bus::{Envelope, EventKind, NotificationBus, Recipient};
use crate::error::DispatchError;

/// Durable external pub/sub backend. Fan-out and delivery are the broker's
/// concern; this client only serializes and publishes.
#[derive(Clone)]
pub struct RelayBus {
    manager: ConnectionManager,
}

impl RelayBus {
    pub async fn connect(url: &str) -> Result<Self, DispatchError> {
        let client = redis::Client::open(url)
            .map_err(|err| DispatchError::Dependency(format!("invalid relay url: {err}")))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|err| DispatchError::Dependency(format!("relay connect failed: {err}")))?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl NotificationBus for RelayBus {
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
        let data = serde_json::to_string(&envelope)
            .map_err(|err| DispatchError::Dependency(format!("envelope encode failed: {err}")))?;

        let mut conn = self.manager.clone();
        let _: i64 = conn
            .publish(recipient.topic(), data)
            .await
            .map_err(|err| DispatchError::Dependency(format!("relay publish failed: {err}")))?;

        Ok(())
    }
}
