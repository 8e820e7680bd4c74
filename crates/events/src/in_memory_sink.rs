//! In-memory audit sink for tests/dev.

use std::sync::{Mutex, mpsc};

use crate::audit::{AuditError, AuditRecord};
use crate::sink::AuditSink;

/// Keeps every record in memory and fans it out to subscribers.
///
/// - No IO
/// - Records are kept in arrival order
/// - Dead subscribers are dropped on the next publish
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
    subscribers: Mutex<Vec<mpsc::Sender<AuditRecord>>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Records whose action matches `action` exactly.
    pub fn with_action(&self, action: &str) -> Vec<AuditRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.action == action)
            .collect()
    }

    pub fn subscribe(&self) -> mpsc::Receiver<AuditRecord> {
        let (tx, rx) = mpsc::channel();

        // A poisoned lock still yields a receiver; it just never gets messages.
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }

        rx
    }
}

impl AuditSink for InMemoryAuditSink {
    type Error = AuditError;

    fn record(&self, record: AuditRecord) -> Result<(), Self::Error> {
        {
            let mut subs = self
                .subscribers
                .lock()
                .map_err(|_| AuditError::Unavailable("subscriber lock poisoned".into()))?;
            subs.retain(|tx| tx.send(record.clone()).is_ok());
        }

        self.records
            .lock()
            .map_err(|_| AuditError::Unavailable("record lock poisoned".into()))?
            .push(record);
        Ok(())
    }
}
