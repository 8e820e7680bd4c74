//! Domain events and the audit trail they feed.
//!
//! Aggregates emit typed events (see [`Event`]); after a successful commit each
//! event is wrapped into an [`AuditRecord`] and handed to an [`AuditSink`].

pub mod audit;
pub mod event;
pub mod in_memory_sink;
pub mod sink;
pub mod tracing_sink;

pub use audit::{AuditError, AuditRecord};
pub use event::Event;
pub use in_memory_sink::InMemoryAuditSink;
pub use sink::AuditSink;
pub use tracing_sink::TracingAuditSink;
