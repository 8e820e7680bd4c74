use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};

use sawit_core::{AggregateRoot, ExpectedVersion};
use sawit_orders::{PurchaseOrder, PurchaseOrderId};
use sawit_settlement::{Payment, PaymentId, SalesDocument, SalesDocumentId};
use sawit_stock::{StockLot, StockLotId};
use sawit_weighing::{WeighingSession, WeighingSessionId};

use super::filter::{DocumentFilter, LotFilter, OrderFilter, PaymentFilter, SessionFilter};
use super::r#trait::{SequenceKey, Store, StoreError, UnitOfWork};

#[derive(Debug, Default)]
struct Tables {
    lots: HashMap<StockLotId, StockLot>,
    orders: HashMap<PurchaseOrderId, PurchaseOrder>,
    sessions: HashMap<WeighingSessionId, WeighingSession>,
    documents: HashMap<SalesDocumentId, SalesDocument>,
    payments: HashMap<PaymentId, Payment>,
    sequences: BTreeMap<SequenceKey, u32>,
}

/// In-memory record store.
///
/// Intended for tests/dev. Transactions are fully serialized: the table lock is
/// held for the whole unit of work. Writes go straight to the tables and are
/// journaled; the journal is replayed backwards when the work fails or
/// panics, so the tables only ever hold committed state between transactions.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for InMemoryStore {
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<T, E>,
        E: From<StoreError>,
    {
        // A panicking unit of work rolls itself back while unwinding, so a
        // poisoned lock still guards consistent tables.
        let mut tables = self
            .tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut uow = InMemoryUnitOfWork {
            tables: &mut *tables,
            undo: Vec::new(),
        };
        let value = work(&mut uow)?;
        uow.commit();
        Ok(value)
    }
}

/// Prior value of one overwritten slot.
enum Undo {
    Lot(StockLotId, Option<StockLot>),
    Order(PurchaseOrderId, Option<PurchaseOrder>),
    Session(WeighingSessionId, Option<WeighingSession>),
    Document(SalesDocumentId, Option<SalesDocument>),
    Payment(PaymentId, Option<Payment>),
    Sequence(SequenceKey, Option<u32>),
}

struct InMemoryUnitOfWork<'a> {
    tables: &'a mut Tables,
    undo: Vec<Undo>,
}

impl InMemoryUnitOfWork<'_> {
    fn commit(mut self) {
        self.undo.clear();
    }

    fn rollback(&mut self) {
        while let Some(entry) = self.undo.pop() {
            match entry {
                Undo::Lot(id, prev) => restore(&mut self.tables.lots, id, prev),
                Undo::Order(id, prev) => restore(&mut self.tables.orders, id, prev),
                Undo::Session(id, prev) => restore(&mut self.tables.sessions, id, prev),
                Undo::Document(id, prev) => restore(&mut self.tables.documents, id, prev),
                Undo::Payment(id, prev) => restore(&mut self.tables.payments, id, prev),
                Undo::Sequence(key, prev) => match prev {
                    Some(value) => {
                        self.tables.sequences.insert(key, value);
                    }
                    None => {
                        self.tables.sequences.remove(&key);
                    }
                },
            }
        }
    }
}

impl Drop for InMemoryUnitOfWork<'_> {
    fn drop(&mut self) {
        self.rollback();
    }
}

fn restore<K, V>(table: &mut HashMap<K, V>, key: K, prev: Option<V>)
where
    K: Eq + Hash,
{
    match prev {
        Some(value) => {
            table.insert(key, value);
        }
        None => {
            table.remove(&key);
        }
    }
}

fn check_version(
    kind: &str,
    id: impl core::fmt::Display,
    stored: Option<u64>,
    expected: ExpectedVersion,
) -> Result<(), StoreError> {
    let Some(actual) = stored else {
        return Err(StoreError::Conflict(format!("{kind} {id} does not exist")));
    };
    if !expected.matches(actual) {
        return Err(StoreError::Conflict(format!(
            "{kind} {id}: expected {expected:?}, found {actual}"
        )));
    }
    Ok(())
}

impl UnitOfWork for InMemoryUnitOfWork<'_> {
    fn lot(&mut self, id: StockLotId) -> Result<Option<StockLot>, StoreError> {
        Ok(self.tables.lots.get(&id).cloned())
    }

    fn insert_lot(&mut self, lot: &StockLot) -> Result<(), StoreError> {
        let id = lot.id_typed();
        if self.tables.lots.contains_key(&id) {
            return Err(StoreError::Duplicate(format!("stock lot {id}")));
        }
        let prev = self.tables.lots.insert(id, lot.clone());
        self.undo.push(Undo::Lot(id, prev));
        Ok(())
    }

    fn update_lot(&mut self, lot: &StockLot, expected: ExpectedVersion) -> Result<(), StoreError> {
        let id = lot.id_typed();
        let stored = self.tables.lots.get(&id).map(|l| l.version());
        check_version("stock lot", id, stored, expected)?;
        let prev = self.tables.lots.insert(id, lot.clone());
        self.undo.push(Undo::Lot(id, prev));
        Ok(())
    }

    fn lots(&mut self, filter: &LotFilter) -> Result<Vec<StockLot>, StoreError> {
        let mut lots: Vec<_> = self
            .tables
            .lots
            .values()
            .filter(|l| filter.matches(l))
            .cloned()
            .collect();
        // Latest harvest first.
        lots.sort_by_key(|l| std::cmp::Reverse((l.harvest_date(), l.id_typed())));
        Ok(lots)
    }

    fn order(&mut self, id: PurchaseOrderId) -> Result<Option<PurchaseOrder>, StoreError> {
        Ok(self.tables.orders.get(&id).cloned())
    }

    fn insert_order(&mut self, order: &PurchaseOrder) -> Result<(), StoreError> {
        let id = order.id_typed();
        if self.tables.orders.contains_key(&id) {
            return Err(StoreError::Duplicate(format!("purchase order {id}")));
        }
        if self
            .tables
            .orders
            .values()
            .any(|o| o.order_number() == order.order_number())
        {
            return Err(StoreError::Duplicate(format!(
                "order number {}",
                order.order_number()
            )));
        }
        let prev = self.tables.orders.insert(id, order.clone());
        self.undo.push(Undo::Order(id, prev));
        Ok(())
    }

    fn update_order(
        &mut self,
        order: &PurchaseOrder,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let id = order.id_typed();
        let stored = self.tables.orders.get(&id).map(|o| o.version());
        check_version("purchase order", id, stored, expected)?;
        let prev = self.tables.orders.insert(id, order.clone());
        self.undo.push(Undo::Order(id, prev));
        Ok(())
    }

    fn orders(&mut self, filter: &OrderFilter) -> Result<Vec<PurchaseOrder>, StoreError> {
        let mut orders: Vec<_> = self
            .tables
            .orders
            .values()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect();
        // Newest first; ids are time-ordered.
        orders.sort_by_key(|o| std::cmp::Reverse((o.created_at(), o.id_typed())));
        Ok(orders)
    }

    fn session(&mut self, id: WeighingSessionId) -> Result<Option<WeighingSession>, StoreError> {
        Ok(self.tables.sessions.get(&id).cloned())
    }

    fn session_for_order(
        &mut self,
        order_id: PurchaseOrderId,
    ) -> Result<Option<WeighingSession>, StoreError> {
        Ok(self
            .tables
            .sessions
            .values()
            .find(|s| s.order_id() == Some(order_id))
            .cloned())
    }

    fn insert_session(&mut self, session: &WeighingSession) -> Result<(), StoreError> {
        let id = session.id_typed();
        if self.tables.sessions.contains_key(&id) {
            return Err(StoreError::Duplicate(format!("weighing session {id}")));
        }
        if let Some(order_id) = session.order_id() {
            if self
                .tables
                .sessions
                .values()
                .any(|s| s.order_id() == Some(order_id))
            {
                return Err(StoreError::Duplicate(format!(
                    "weighing session for order {order_id}"
                )));
            }
        }
        let prev = self.tables.sessions.insert(id, session.clone());
        self.undo.push(Undo::Session(id, prev));
        Ok(())
    }

    fn update_session(
        &mut self,
        session: &WeighingSession,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let id = session.id_typed();
        let stored = self.tables.sessions.get(&id).map(|s| s.version());
        check_version("weighing session", id, stored, expected)?;
        let prev = self.tables.sessions.insert(id, session.clone());
        self.undo.push(Undo::Session(id, prev));
        Ok(())
    }

    fn sessions(&mut self, filter: &SessionFilter) -> Result<Vec<WeighingSession>, StoreError> {
        let mut sessions: Vec<_> = self
            .tables
            .sessions
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        sessions.sort_by_key(|s| (s.schedule().map(|sch| sch.loading_at), s.queue_number()));
        Ok(sessions)
    }

    fn document(&mut self, id: SalesDocumentId) -> Result<Option<SalesDocument>, StoreError> {
        Ok(self.tables.documents.get(&id).cloned())
    }

    fn document_for_order(
        &mut self,
        order_id: PurchaseOrderId,
    ) -> Result<Option<SalesDocument>, StoreError> {
        Ok(self
            .tables
            .documents
            .values()
            .find(|d| d.order_id() == order_id)
            .cloned())
    }

    fn insert_document(&mut self, document: &SalesDocument) -> Result<(), StoreError> {
        let id = document.id_typed();
        if self.tables.documents.contains_key(&id) {
            return Err(StoreError::Duplicate(format!("sales document {id}")));
        }
        for existing in self.tables.documents.values() {
            if existing.order_id() == document.order_id()
                || existing.session_id() == document.session_id()
            {
                return Err(StoreError::Duplicate(format!(
                    "sales document for order {}",
                    document.order_id()
                )));
            }
            let (a, b) = (existing.numbers(), document.numbers());
            if a.delivery_note == b.delivery_note
                || a.invoice == b.invoice
                || a.weight_certificate == b.weight_certificate
            {
                return Err(StoreError::Duplicate(format!(
                    "document number {}",
                    b.invoice
                )));
            }
        }
        let prev = self.tables.documents.insert(id, document.clone());
        self.undo.push(Undo::Document(id, prev));
        Ok(())
    }

    fn documents(&mut self, filter: &DocumentFilter) -> Result<Vec<SalesDocument>, StoreError> {
        let mut documents: Vec<_> = self
            .tables
            .documents
            .values()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect();
        documents.sort_by(|a, b| {
            (a.document_date(), &a.numbers().invoice).cmp(&(b.document_date(), &b.numbers().invoice))
        });
        Ok(documents)
    }

    fn payment(&mut self, id: PaymentId) -> Result<Option<Payment>, StoreError> {
        Ok(self.tables.payments.get(&id).cloned())
    }

    fn insert_payment(&mut self, payment: &Payment) -> Result<(), StoreError> {
        let id = payment.id_typed();
        if self.tables.payments.contains_key(&id) {
            return Err(StoreError::Duplicate(format!("payment {id}")));
        }
        let prev = self.tables.payments.insert(id, payment.clone());
        self.undo.push(Undo::Payment(id, prev));
        Ok(())
    }

    fn update_payment(
        &mut self,
        payment: &Payment,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let id = payment.id_typed();
        let stored = self.tables.payments.get(&id).map(|p| p.version());
        check_version("payment", id, stored, expected)?;
        let prev = self.tables.payments.insert(id, payment.clone());
        self.undo.push(Undo::Payment(id, prev));
        Ok(())
    }

    fn payments(&mut self, filter: &PaymentFilter) -> Result<Vec<Payment>, StoreError> {
        let mut payments: Vec<_> = self
            .tables
            .payments
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        payments.sort_by_key(|p| (p.recorded_at(), p.id_typed()));
        Ok(payments)
    }

    fn next_sequence(&mut self, key: SequenceKey) -> Result<u32, StoreError> {
        let prev = self.tables.sequences.get(&key).copied();
        let next = prev
            .unwrap_or(0)
            .checked_add(1)
            .ok_or_else(|| StoreError::Backend(format!("sequence {key:?} exhausted")))?;
        self.tables.sequences.insert(key, next);
        self.undo.push(Undo::Sequence(key, prev));
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use sawit_core::Aggregate;
    use sawit_stock::{RegisterLot, StockCommand, WithdrawLot};

    use crate::FulfillmentError;
    use crate::store::r#trait::SequenceKind;

    fn lot() -> StockLot {
        let id = StockLotId::generate();
        let mut lot = StockLot::empty(id);
        lot.execute(&StockCommand::RegisterLot(RegisterLot {
            lot_id: id,
            estate: "Kebun Sei Mangkei".to_string(),
            harvest_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            quantity_kg: 100,
            grade: sawit_core::Grade::A,
            unit_price: 1_000,
            oil_content_pct: None,
            note: None,
            occurred_at: chrono::Utc::now(),
        }))
        .unwrap();
        lot
    }

    #[test]
    fn failed_transaction_leaves_no_trace() {
        let store = InMemoryStore::new();
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let key = SequenceKey::new(SequenceKind::SalesDocument, day);

        let result: Result<(), StoreError> = store.transaction(|uow| {
            uow.insert_lot(&lot())?;
            uow.next_sequence(key)?;
            Err(StoreError::Backend("boom".to_string()))
        });
        assert!(result.is_err());

        let (lots, next) = store
            .transaction(|uow| -> Result<_, StoreError> {
                Ok((uow.lots(&LotFilter::default())?, uow.next_sequence(key)?))
            })
            .unwrap();
        assert!(lots.is_empty());
        assert_eq!(next, 1);
    }

    #[test]
    fn rollback_restores_overwritten_records() {
        let store = InMemoryStore::new();
        let original = lot();
        store
            .transaction(|uow| -> Result<_, StoreError> { uow.insert_lot(&original) })
            .unwrap();

        let mut withdrawn = original.clone();
        withdrawn
            .execute(&StockCommand::WithdrawLot(WithdrawLot {
                lot_id: original.id_typed(),
                occurred_at: chrono::Utc::now(),
            }))
            .unwrap();
        let result: Result<(), StoreError> = store.transaction(|uow| {
            uow.update_lot(&withdrawn, ExpectedVersion::Exact(1))?;
            Err(StoreError::Backend("boom".to_string()))
        });
        assert!(result.is_err());

        let stored = store
            .transaction(|uow| -> Result<_, StoreError> { uow.lot(original.id_typed()) })
            .unwrap();
        assert_eq!(stored, Some(original));
    }

    #[test]
    fn panicking_work_leaves_the_store_usable() {
        let store = InMemoryStore::new();
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let key = SequenceKey::new(SequenceKind::PurchaseOrder, day);

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: Result<(), StoreError> = store.transaction(|uow| {
                uow.insert_lot(&lot())?;
                uow.next_sequence(key)?;
                panic!("work blew up");
            });
        }));
        assert!(outcome.is_err());

        let (lots, next) = store
            .transaction(|uow| -> Result<_, StoreError> {
                Ok((uow.lots(&LotFilter::default())?, uow.next_sequence(key)?))
            })
            .unwrap();
        assert!(lots.is_empty());
        assert_eq!(next, 1);
    }

    #[test]
    fn stale_update_is_a_conflict() {
        let store = InMemoryStore::new();
        let lot = lot();
        store
            .transaction(|uow| -> Result<_, StoreError> { uow.insert_lot(&lot) })
            .unwrap();

        let err = store
            .transaction(|uow| -> Result<_, StoreError> {
                uow.update_lot(&lot, ExpectedVersion::Exact(0))
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        store
            .transaction(|uow| -> Result<_, StoreError> {
                uow.update_lot(&lot, ExpectedVersion::Exact(1))
            })
            .unwrap();
    }

    #[test]
    fn stale_version_reaches_service_callers_as_store_conflict() {
        let store = InMemoryStore::new();
        let lot = lot();
        store
            .transaction(|uow| -> Result<_, StoreError> { uow.insert_lot(&lot) })
            .unwrap();

        let err = store
            .transaction(|uow| -> Result<(), FulfillmentError> {
                uow.update_lot(&lot, ExpectedVersion::Exact(3))?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(
            err,
            FulfillmentError::Domain(sawit_core::DomainError::StoreConflict(_))
        ));
        assert_eq!(err.code(), "STORE_CONFLICT");
    }

    #[test]
    fn sequences_are_independent_per_kind_and_day() {
        let store = InMemoryStore::new();
        let d1 = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();

        let values = store
            .transaction(|uow| -> Result<_, StoreError> {
                Ok(vec![
                    uow.next_sequence(SequenceKey::new(SequenceKind::SalesDocument, d1))?,
                    uow.next_sequence(SequenceKey::new(SequenceKind::SalesDocument, d1))?,
                    uow.next_sequence(SequenceKey::new(SequenceKind::SalesDocument, d2))?,
                    uow.next_sequence(SequenceKey::new(SequenceKind::PurchaseOrder, d1))?,
                ])
            })
            .unwrap();
        assert_eq!(values, vec![1, 2, 1, 1]);
    }
}
