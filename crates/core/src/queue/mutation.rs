//! Queued mutation records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::Error;

/// Delivery state of a queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MutationState {
    Pending,
    InFlight,
}

impl MutationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationState::Pending => "pending",
            MutationState::InFlight => "in_flight",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, Error> {
        match raw {
            "pending" => Ok(MutationState::Pending),
            "in_flight" => Ok(MutationState::InFlight),
            other => Err(Error::Serialization(format!("unknown mutation state '{other}'"))),
        }
    }
}

/// A write waiting for the remote endpoint to acknowledge it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMutation {
    /// Durable FIFO position.
    pub seq: i64,
    /// Client-generated idempotency id.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_key: Option<String>,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub state: MutationState,
}

/// A mutation before it is queued.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationDraft {
    pub id: String,
    pub entity_key: Option<String>,
    pub payload: Value,
}

impl MutationDraft {
    /// New draft with a fresh UUID v4 id.
    pub fn new(payload: Value) -> Self {
        Self { id: Uuid::new_v4().to_string(), entity_key: None, payload }
    }

    /// Reuse an existing id, e.g. when a caller retries a write it already queued.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Group the mutation with others touching the same record.
    pub fn with_entity_key(mut self, key: impl Into<String>) -> Self {
        self.entity_key = Some(key.into());
        self
    }
}
