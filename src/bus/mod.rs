pub mod registry;
pub mod relay;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::DispatchError;

/// Relay channel carrying envelopes addressed to every administrator
/// listener. Individual recipients publish on their own identity.
pub const ADMIN_CHANNEL: &str = "admins";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Recipient {
    Admins,
    Id(Uuid),
}

impl Recipient {
    /// Identity written into the envelope; the empty string is reserved
    /// for the admin broadcast.
    pub fn wire_id(&self) -> String {
        match self {
            Recipient::Admins => String::new(),
            Recipient::Id(id) => id.to_string(),
        }
    }

    /// Relay topic the envelope is published on.
    pub fn topic(&self) -> String {
        match self {
            Recipient::Admins => ADMIN_CHANNEL.to_string(),
            Recipient::Id(id) => id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    NewBookingRequest,
    BookingAccepted,
    StatusUpdate,
    DriverLocation,
    DriverStatusUpdate,
}

/// Wire shape pushed to connected clients and relayed to the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub recipient: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub payload: Value,
}

/// Single outbound primitive of the dispatch core. Implementations differ
/// in transport, never in contract; call sites receive one at construction
/// and never branch on the backend.
#[async_trait]
pub trait NotificationBus: Send + Sync {
    async fn publish(
        &self,
        recipient: Recipient,
        kind: EventKind,
        payload: Value,
    ) -> Result<(), DispatchError>;
}
