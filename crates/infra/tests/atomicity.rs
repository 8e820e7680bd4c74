mod common;

use std::sync::Arc;

use sawit_core::{ExpectedVersion, Grade};
use sawit_events::InMemoryAuditSink;
use sawit_infra::store::{
    DocumentFilter, LotFilter, OrderFilter, PaymentFilter, SequenceKey, SessionFilter, Store,
    StoreError, UnitOfWork,
};
use sawit_infra::{FulfillmentError, InMemoryStore, OutboundReading};
use sawit_orders::{OrderStatus, PurchaseOrder, PurchaseOrderId};
use sawit_settlement::{Payment, PaymentId, SalesDocument, SalesDocumentId};
use sawit_stock::{StockLot, StockLotId};
use sawit_weighing::{SessionStatus, WeighingSession, WeighingSessionId};

use common::{harness, harness_with};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    DocumentInsert,
    LotUpdate,
    MissingOrder,
}

/// Wraps the in-memory store and fails one kind of read or write.
struct FaultyStore {
    inner: Arc<InMemoryStore>,
    fault: Fault,
}

impl Store for FaultyStore {
    fn transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<T, E>,
        E: From<StoreError>,
    {
        let fault = self.fault;
        self.inner.transaction(move |uow| {
            let mut faulty = FaultyUow { inner: uow, fault };
            work(&mut faulty)
        })
    }
}

struct FaultyUow<'a> {
    inner: &'a mut dyn UnitOfWork,
    fault: Fault,
}

impl UnitOfWork for FaultyUow<'_> {
    fn lot(&mut self, id: StockLotId) -> Result<Option<StockLot>, StoreError> {
        self.inner.lot(id)
    }
    fn insert_lot(&mut self, lot: &StockLot) -> Result<(), StoreError> {
        self.inner.insert_lot(lot)
    }
    fn update_lot(&mut self, lot: &StockLot, expected: ExpectedVersion) -> Result<(), StoreError> {
        if self.fault == Fault::LotUpdate {
            return Err(StoreError::Conflict("injected".to_string()));
        }
        self.inner.update_lot(lot, expected)
    }
    fn lots(&mut self, filter: &LotFilter) -> Result<Vec<StockLot>, StoreError> {
        self.inner.lots(filter)
    }

    fn order(&mut self, id: PurchaseOrderId) -> Result<Option<PurchaseOrder>, StoreError> {
        if self.fault == Fault::MissingOrder {
            return Ok(None);
        }
        self.inner.order(id)
    }
    fn insert_order(&mut self, order: &PurchaseOrder) -> Result<(), StoreError> {
        self.inner.insert_order(order)
    }
    fn update_order(
        &mut self,
        order: &PurchaseOrder,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        self.inner.update_order(order, expected)
    }
    fn orders(&mut self, filter: &OrderFilter) -> Result<Vec<PurchaseOrder>, StoreError> {
        self.inner.orders(filter)
    }

    fn session(&mut self, id: WeighingSessionId) -> Result<Option<WeighingSession>, StoreError> {
        self.inner.session(id)
    }
    fn session_for_order(
        &mut self,
        order_id: PurchaseOrderId,
    ) -> Result<Option<WeighingSession>, StoreError> {
        self.inner.session_for_order(order_id)
    }
    fn insert_session(&mut self, session: &WeighingSession) -> Result<(), StoreError> {
        self.inner.insert_session(session)
    }
    fn update_session(
        &mut self,
        session: &WeighingSession,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        self.inner.update_session(session, expected)
    }
    fn sessions(&mut self, filter: &SessionFilter) -> Result<Vec<WeighingSession>, StoreError> {
        self.inner.sessions(filter)
    }

    fn document(&mut self, id: SalesDocumentId) -> Result<Option<SalesDocument>, StoreError> {
        self.inner.document(id)
    }
    fn document_for_order(
        &mut self,
        order_id: PurchaseOrderId,
    ) -> Result<Option<SalesDocument>, StoreError> {
        self.inner.document_for_order(order_id)
    }
    fn insert_document(&mut self, document: &SalesDocument) -> Result<(), StoreError> {
        if self.fault == Fault::DocumentInsert {
            return Err(StoreError::Backend("disk full".to_string()));
        }
        self.inner.insert_document(document)
    }
    fn documents(&mut self, filter: &DocumentFilter) -> Result<Vec<SalesDocument>, StoreError> {
        self.inner.documents(filter)
    }

    fn payment(&mut self, id: PaymentId) -> Result<Option<Payment>, StoreError> {
        self.inner.payment(id)
    }
    fn insert_payment(&mut self, payment: &Payment) -> Result<(), StoreError> {
        self.inner.insert_payment(payment)
    }
    fn update_payment(
        &mut self,
        payment: &Payment,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        self.inner.update_payment(payment, expected)
    }
    fn payments(&mut self, filter: &PaymentFilter) -> Result<Vec<Payment>, StoreError> {
        self.inner.payments(filter)
    }

    fn next_sequence(&mut self, key: SequenceKey) -> Result<u32, StoreError> {
        self.inner.next_sequence(key)
    }
}

fn faulty(
    store: &Arc<InMemoryStore>,
    audit: &Arc<InMemoryAuditSink>,
    fault: Fault,
) -> common::Harness<FaultyStore, Arc<InMemoryAuditSink>> {
    harness_with(
        FaultyStore {
            inner: store.clone(),
            fault,
        },
        audit.clone(),
    )
}

#[test]
fn failed_document_write_rolls_back_the_whole_weigh_out() {
    let (h, store, audit) = harness();
    let lot = h.lot(1_000, Grade::A, 1_000);
    let session = h.weighed_in(&lot, 800, 1_000);
    let order_id = session.order_id().unwrap();
    let audited_before = audit.records().len();

    let f = faulty(&store, &audit, Fault::DocumentInsert);
    let err = f
        .service
        .record_outbound(
            &f.operator,
            session.id_typed(),
            OutboundReading {
                weight_kg: 1_800,
                grade: Grade::B,
                quality: Default::default(),
            },
        )
        .unwrap_err();
    assert_eq!(
        err,
        FulfillmentError::Store(StoreError::Backend("disk full".to_string()))
    );
    assert_eq!(err.code(), "STORE_FAILURE");

    let stored = h.service.session(session.id_typed()).unwrap();
    assert_eq!(stored, session);
    assert_eq!(stored.status(), SessionStatus::Loading);
    assert_eq!(h.service.order(order_id).unwrap().status(), OrderStatus::Loading);
    assert!(h.service.documents(&DocumentFilter::default()).unwrap().is_empty());
    assert_eq!(audit.records().len(), audited_before);
    assert!(
        audit
            .with_action("weighing.session.outbound_recorded")
            .is_empty()
    );

    // The failed attempt did not burn a document number.
    let settled = h.weigh_out(&session, 1_800, Grade::B);
    assert_eq!(settled.document.numbers().invoice, "INV-20240307-0001");
}

#[test]
fn weigh_out_of_a_vanished_order_is_a_settlement_error() {
    let (h, store, audit) = harness();
    let lot = h.lot(1_000, Grade::A, 1_000);
    let session = h.weighed_in(&lot, 800, 1_000);
    let order_id = session.order_id().unwrap();

    let f = faulty(&store, &audit, Fault::MissingOrder);
    let err = f
        .service
        .record_outbound(
            &f.operator,
            session.id_typed(),
            OutboundReading {
                weight_kg: 1_800,
                grade: Grade::A,
                quality: Default::default(),
            },
        )
        .unwrap_err();
    assert_eq!(err.code(), "SETTLEMENT_ERROR");

    let stored = h.service.session(session.id_typed()).unwrap();
    assert_eq!(stored.status(), SessionStatus::Loading);
    assert!(stored.outbound().is_none());
    assert_eq!(h.service.order(order_id).unwrap().status(), OrderStatus::Loading);
    assert!(h.service.documents(&DocumentFilter::default()).unwrap().is_empty());
    assert!(
        audit
            .with_action("weighing.session.outbound_recorded")
            .is_empty()
    );

    let settled = h.weigh_out(&session, 1_800, Grade::A);
    assert_eq!(settled.document.numbers().invoice, "INV-20240307-0001");
}

#[test]
fn conflicting_lot_write_fails_order_creation_cleanly() {
    let (h, store, audit) = harness();
    let lot = h.lot(1_000, Grade::A, 1_000);

    let f = faulty(&store, &audit, Fault::LotUpdate);
    let err = f
        .service
        .create_order(&f.buyer, f.new_order(&lot, 400))
        .unwrap_err();
    assert_eq!(err.code(), "STORE_CONFLICT");
    assert!(matches!(err, FulfillmentError::Domain(_)));

    assert_eq!(h.service.lot(lot.id_typed()).unwrap().available_kg(), 1_000);
    assert!(h.service.orders(&OrderFilter::default()).unwrap().is_empty());
    assert!(audit.with_action("orders.purchase_order.created").is_empty());

    let order = h
        .service
        .create_order(&h.buyer, h.new_order(&lot, 400))
        .unwrap();
    assert_eq!(order.order_number(), "PO-20240307-0001");
}

#[test]
fn failed_release_keeps_the_order_open() {
    let (h, store, audit) = harness();
    let lot = h.lot(1_000, Grade::A, 1_000);
    let order = h
        .service
        .create_order(&h.buyer, h.new_order(&lot, 400))
        .unwrap();

    let f = faulty(&store, &audit, Fault::LotUpdate);
    let err = f.service.cancel_order(&f.buyer, order.id_typed()).unwrap_err();
    assert_eq!(err.code(), "STORE_CONFLICT");

    assert_eq!(
        h.service.order(order.id_typed()).unwrap().status(),
        OrderStatus::Pending
    );
    assert_eq!(h.service.lot(lot.id_typed()).unwrap().available_kg(), 600);
}
