use serde::Serialize;
use uuid::Uuid;

use sawit_core::UserId;
use sawit_events::{AuditRecord, Event};

/// Audit records collected while a unit of work runs.
///
/// Records are only handed to the sink once the unit of work has committed,
/// so a rolled-back operation leaves nothing in the activity log.
#[derive(Debug, Clone)]
pub struct Trail {
    actor: UserId,
    records: Vec<AuditRecord>,
}

impl Trail {
    pub fn new(actor: UserId) -> Self {
        Self {
            actor,
            records: Vec::new(),
        }
    }

    /// Note one event. `sequence` is the version the event brought the
    /// record to.
    pub fn push<E>(&mut self, module: &str, reference: Uuid, sequence: u64, event: &E)
    where
        E: Event + Serialize,
    {
        match AuditRecord::from_event(self.actor, module, reference, sequence, event) {
            Ok(record) => self.records.push(record),
            Err(err) => tracing::warn!(
                error = %err,
                action = event.event_type(),
                %reference,
                "dropping unserializable audit record"
            ),
        }
    }

    /// Note a batch of events applied on top of `base_version`.
    pub fn push_all<E>(&mut self, module: &str, reference: Uuid, base_version: u64, events: &[E])
    where
        E: Event + Serialize,
    {
        for (offset, event) in (1u64..).zip(events) {
            self.push(module, reference, base_version + offset, event);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<AuditRecord> {
        self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    #[derive(Debug, Clone, Serialize)]
    struct Weighed {
        occurred_at: DateTime<Utc>,
    }

    impl Event for Weighed {
        fn event_type(&self) -> &'static str {
            "weighing.session.weighed"
        }

        fn version(&self) -> u32 {
            1
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.occurred_at
        }
    }

    #[test]
    fn batch_sequences_continue_from_base_version() {
        let mut trail = Trail::new(UserId::new());
        let event = Weighed {
            occurred_at: Utc::now(),
        };
        trail.push_all("weighing.session", Uuid::now_v7(), 4, &[event.clone(), event]);

        let sequences: Vec<u64> = trail.into_records().iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![5, 6]);
    }
}
