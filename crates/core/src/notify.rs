use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::user::UserId;

/// Wire-level event names, bound by subscribers.
pub mod events {
    pub const REQUEST_CREATED: &str = "request:created";
    pub const REQUEST_UPDATED: &str = "request:updated";
    pub const REQUEST_DELETED: &str = "request:deleted";
    pub const STATUS_CHANGED: &str = "status:changed";
    pub const STOCK_LOW: &str = "stock:low";
    pub const CATALOG_CHANGED: &str = "catalog:changed";
    pub const NOTIFICATION: &str = "notification";
}

/// Delivery scopes. `Inventory` reaches every authenticated client, `Admin`
/// only admins, `User` exactly one account's private stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Channel {
    Inventory,
    Admin,
    User(UserId),
}

impl Channel {
    pub fn topic(&self) -> String {
        match self {
            Self::Inventory => "inventory".to_owned(),
            Self::Admin => "admin".to_owned(),
            Self::User(user_id) => format!("user-{user_id}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: String,
    pub channel: String,
    pub event: String,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl EventEnvelope {
    pub fn new(channel: Channel, event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            channel: channel.topic(),
            event: event.into(),
            payload,
            occurred_at: Utc::now(),
        }
    }
}

/// Outbound notification port. Publishing is fire-and-forget with
/// at-most-once delivery; implementations must never fail the caller.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, envelope: EventEnvelope);
}

#[derive(Clone, Default)]
pub struct InMemoryPublisher {
    events: Arc<Mutex<Vec<EventEnvelope>>>,
}

impl InMemoryPublisher {
    pub fn events(&self) -> Vec<EventEnvelope> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EventPublisher for InMemoryPublisher {
    fn publish(&self, envelope: EventEnvelope) {
        match self.events.lock() {
            Ok(mut events) => events.push(envelope),
            Err(poisoned) => poisoned.into_inner().push(envelope),
        }
    }
}
