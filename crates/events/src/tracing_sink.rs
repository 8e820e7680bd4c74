//! Audit sink that writes records as structured `tracing` events.

use crate::audit::{AuditError, AuditRecord};
use crate::sink::AuditSink;

/// Emits each record on the `audit` target at `INFO` level.
///
/// With the JSON subscriber installed this produces one log line per record,
/// which is enough for shipping the activity log to an external collector.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl TracingAuditSink {
    pub fn new() -> Self {
        Self
    }
}

impl AuditSink for TracingAuditSink {
    type Error = AuditError;

    fn record(&self, record: AuditRecord) -> Result<(), Self::Error> {
        let payload = serde_json::to_string(&record.payload)
            .map_err(|e| AuditError::Serialization(e.to_string()))?;

        tracing::info!(
            target: "audit",
            event_id = %record.event_id,
            actor = %record.actor,
            action = %record.action,
            module = %record.module,
            reference = %record.reference,
            sequence = record.sequence,
            occurred_at = %record.occurred_at.to_rfc3339(),
            payload = %payload,
            "activity recorded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sawit_core::UserId;
    use uuid::Uuid;

    #[test]
    fn records_without_a_subscriber_installed() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let sink = TracingAuditSink::new();
        let result = sink.record(AuditRecord {
            event_id: Uuid::now_v7(),
            actor: UserId::new(),
            action: "stock.lot.registered".to_string(),
            module: "stock.lot".to_string(),
            reference: Uuid::now_v7(),
            sequence: 1,
            event_version: 1,
            occurred_at: Utc::now(),
            payload: serde_json::json!({ "quantity_kg": 1000 }),
        });
        assert!(result.is_ok());
    }
}
