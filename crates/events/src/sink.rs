//! Audit sink abstraction.
//!
//! A sink receives records after the state change that produced them has
//! been committed. Delivery is fire-and-forget from the caller's point of
//! view: a failing sink is logged and never undoes or fails the operation.

use std::sync::Arc;

use crate::audit::AuditRecord;

pub trait AuditSink: Send + Sync {
    type Error: core::fmt::Display + core::fmt::Debug;

    fn record(&self, record: AuditRecord) -> Result<(), Self::Error>;
}

impl<S> AuditSink for Arc<S>
where
    S: AuditSink + ?Sized,
{
    type Error = S::Error;

    fn record(&self, record: AuditRecord) -> Result<(), Self::Error> {
        (**self).record(record)
    }
}
