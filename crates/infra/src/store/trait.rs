use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;

use sawit_core::ExpectedVersion;
use sawit_orders::{PurchaseOrder, PurchaseOrderId};
use sawit_settlement::{Payment, PaymentId, SalesDocument, SalesDocumentId};
use sawit_stock::{StockLot, StockLotId};
use sawit_weighing::{WeighingSession, WeighingSessionId};

use super::filter::{DocumentFilter, LotFilter, OrderFilter, PaymentFilter, SessionFilter};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A conditional update lost a race (stored version differs from expected).
    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    /// An insert collided with an existing record or unique number.
    #[error("duplicate record: {0}")]
    Duplicate(String),

    /// The backend failed (connection, serialization, lock poisoning, ...).
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Which per-day counter to draw from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SequenceKind {
    PurchaseOrder,
    SalesDocument,
    LoadingQueue,
}

impl SequenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SequenceKind::PurchaseOrder => "purchase_order",
            SequenceKind::SalesDocument => "sales_document",
            SequenceKind::LoadingQueue => "loading_queue",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SequenceKey {
    pub kind: SequenceKind,
    pub day: NaiveDate,
}

impl SequenceKey {
    pub fn new(kind: SequenceKind, day: NaiveDate) -> Self {
        Self { kind, day }
    }
}

/// Reads and writes performed inside one transaction.
///
/// Implementations must guarantee:
/// - reads of a record taken for update are isolated from concurrent
///   transactions until commit (no lost updates, no oversell)
/// - `update_*` only succeeds when the stored version equals `expected`
/// - `next_sequence` is gap-free per key: a rolled-back transaction does not
///   consume a number
pub trait UnitOfWork {
    fn lot(&mut self, id: StockLotId) -> Result<Option<StockLot>, StoreError>;
    fn insert_lot(&mut self, lot: &StockLot) -> Result<(), StoreError>;
    fn update_lot(&mut self, lot: &StockLot, expected: ExpectedVersion) -> Result<(), StoreError>;
    fn lots(&mut self, filter: &LotFilter) -> Result<Vec<StockLot>, StoreError>;

    fn order(&mut self, id: PurchaseOrderId) -> Result<Option<PurchaseOrder>, StoreError>;
    fn insert_order(&mut self, order: &PurchaseOrder) -> Result<(), StoreError>;
    fn update_order(
        &mut self,
        order: &PurchaseOrder,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError>;
    fn orders(&mut self, filter: &OrderFilter) -> Result<Vec<PurchaseOrder>, StoreError>;

    fn session(&mut self, id: WeighingSessionId) -> Result<Option<WeighingSession>, StoreError>;
    fn session_for_order(
        &mut self,
        order_id: PurchaseOrderId,
    ) -> Result<Option<WeighingSession>, StoreError>;
    fn insert_session(&mut self, session: &WeighingSession) -> Result<(), StoreError>;
    fn update_session(
        &mut self,
        session: &WeighingSession,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError>;
    fn sessions(&mut self, filter: &SessionFilter) -> Result<Vec<WeighingSession>, StoreError>;

    fn document(&mut self, id: SalesDocumentId) -> Result<Option<SalesDocument>, StoreError>;
    fn document_for_order(
        &mut self,
        order_id: PurchaseOrderId,
    ) -> Result<Option<SalesDocument>, StoreError>;
    fn insert_document(&mut self, document: &SalesDocument) -> Result<(), StoreError>;
    fn documents(&mut self, filter: &DocumentFilter) -> Result<Vec<SalesDocument>, StoreError>;

    fn payment(&mut self, id: PaymentId) -> Result<Option<Payment>, StoreError>;
    fn insert_payment(&mut self, payment: &Payment) -> Result<(), StoreError>;
    fn update_payment(
        &mut self,
        payment: &Payment,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError>;
    /// Payments in recording order (oldest first).
    fn payments(&mut self, filter: &PaymentFilter) -> Result<Vec<Payment>, StoreError>;

    /// Allocate the next value of a per-day counter, starting at 1.
    fn next_sequence(&mut self, key: SequenceKey) -> Result<u32, StoreError>;
}

/// Transactional record store.
///
/// `transaction` runs `work` against a fresh unit of work. Everything written
/// through it is committed when `work` returns `Ok` and discarded when it
/// returns `Err`; the closure's error is passed through unchanged.
pub trait Store: Send + Sync {
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<T, E>,
        E: From<StoreError>;
}

impl<S> Store for Arc<S>
where
    S: Store + ?Sized,
{
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<T, E>,
        E: From<StoreError>,
    {
        (**self).transaction(work)
    }
}
