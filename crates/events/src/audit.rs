//! Activity-log record for a single domain event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use sawit_core::UserId;

use crate::event::Event;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit payload serialization failed: {0}")]
    Serialization(String),

    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

/// One entry of the activity log.
///
/// - `action` is the event type (e.g. `"orders.purchase_order.approved"`).
/// - `module` is the aggregate type the event belongs to.
/// - `sequence` is the aggregate version reached by applying the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub event_id: Uuid,
    pub actor: UserId,
    pub action: String,
    pub module: String,
    pub reference: Uuid,
    pub sequence: u64,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,
    pub payload: JsonValue,
}

impl AuditRecord {
    /// Build a record from a typed domain event.
    ///
    /// Serializes the event to JSON and copies its metadata (type, schema
    /// version, business time) next to the caller-supplied stream metadata.
    pub fn from_event<E>(
        actor: UserId,
        module: impl Into<String>,
        reference: Uuid,
        sequence: u64,
        event: &E,
    ) -> Result<Self, AuditError>
    where
        E: Event + Serialize,
    {
        let payload =
            serde_json::to_value(event).map_err(|e| AuditError::Serialization(e.to_string()))?;

        Ok(Self {
            event_id: Uuid::now_v7(),
            actor,
            action: event.event_type().to_string(),
            module: module.into(),
            reference,
            sequence,
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize)]
    struct Touched {
        weight_kg: i64,
        occurred_at: DateTime<Utc>,
    }

    impl Event for Touched {
        fn event_type(&self) -> &'static str {
            "test.thing.touched"
        }

        fn version(&self) -> u32 {
            1
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.occurred_at
        }
    }

    #[test]
    fn from_event_copies_metadata_and_payload() {
        let now = Utc::now();
        let actor = UserId::new();
        let reference = Uuid::now_v7();
        let event = Touched {
            weight_kg: 800,
            occurred_at: now,
        };

        let record = AuditRecord::from_event(actor, "test.thing", reference, 3, &event).unwrap();

        assert_eq!(record.actor, actor);
        assert_eq!(record.action, "test.thing.touched");
        assert_eq!(record.module, "test.thing");
        assert_eq!(record.reference, reference);
        assert_eq!(record.sequence, 3);
        assert_eq!(record.occurred_at, now);
        assert_eq!(record.payload["weight_kg"], 800);
    }
}
