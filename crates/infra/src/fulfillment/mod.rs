//! Fulfillment service: the application layer over the domain aggregates.
//!
//! Every mutating operation follows the same pipeline:
//!
//! ```text
//! request
//!   ↓
//! 1. open a unit of work on the store
//!   ↓
//! 2. load the records involved (locked for the rest of the unit)
//!   ↓
//! 3. execute domain commands (pure decision + apply)
//!   ↓
//! 4. write the new states back with a version check
//!   ↓
//! 5. commit, then hand one audit record per event to the audit sink
//! ```
//!
//! A failure at any step before the commit discards every write of the
//! operation, including sequence numbers drawn for it. Audit delivery
//! happens after the commit and never fails the operation.

mod audit;
mod error;
mod orders;
mod payments;
mod reports;
mod stock;
mod weighing;

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use serde::Serialize;
use uuid::Uuid;

use sawit_core::{Aggregate, DomainError};
use sawit_events::{AuditSink, Event};
use sawit_settlement::{DocumentPrefixes, GradePenaltyTable};

use crate::clock::Clock;
use crate::store::Store;

pub use audit::Trail;
pub use error::FulfillmentError;
pub use orders::NewOrder;
pub use payments::NewPayment;
pub use reports::{AdminStats, BuyerStats, DailySales, DashboardStats, GradeBreakdown, summarize};
pub use stock::NewLot;
pub use weighing::{OutboundReading, Settled};

/// Business settings the service is constructed with.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSettings {
    pub penalty_table: GradePenaltyTable,
    pub prefixes: DocumentPrefixes,
    pub order_prefix: String,
    /// Offset of the business day; counters and document dates follow the
    /// local calendar day.
    pub utc_offset: FixedOffset,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            penalty_table: GradePenaltyTable::default(),
            prefixes: DocumentPrefixes::default(),
            order_prefix: "PO".to_string(),
            utc_offset: FixedOffset::east_opt(7 * 3600).unwrap_or_else(|| Utc.fix()),
        }
    }
}

/// Order fulfillment over a [`Store`], reporting to an [`AuditSink`].
///
/// Holds no global state: everything it needs is passed at construction.
pub struct FulfillmentService<S, A> {
    store: S,
    audit: A,
    clock: Arc<dyn Clock>,
    settings: ServiceSettings,
}

impl<S, A> core::fmt::Debug for FulfillmentService<S, A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FulfillmentService")
            .field("clock", &self.clock)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<S, A> FulfillmentService<S, A>
where
    S: Store,
    A: AuditSink,
{
    pub fn new(store: S, audit: A, clock: Arc<dyn Clock>, settings: ServiceSettings) -> Self {
        Self {
            store,
            audit,
            clock,
            settings,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn audit(&self) -> &A {
        &self.audit
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Calendar day of `at` in the business time zone.
    pub fn business_day(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.settings.utc_offset).date_naive()
    }

    /// Deliver committed audit records. Sink failures are logged and dropped.
    fn publish(&self, trail: Trail) {
        for record in trail.into_records() {
            let action = record.action.clone();
            let reference = record.reference;
            if let Err(err) = self.audit.record(record) {
                tracing::warn!(
                    error = %err,
                    action = %action,
                    reference = %reference,
                    "audit sink rejected record"
                );
            }
        }
    }
}

/// Execute `command` on `aggregate` and note the resulting events on `trail`.
fn execute<G>(
    aggregate: &mut G,
    command: G::Command,
    module: &'static str,
    reference: Uuid,
    trail: &mut Trail,
) -> Result<Vec<G::Event>, DomainError>
where
    G: Aggregate<Error = DomainError>,
    G::Event: Event + Serialize,
{
    let base_version = aggregate.version();
    let events = aggregate.execute(&command)?;
    trail.push_all(module, reference, base_version, &events);
    Ok(events)
}
