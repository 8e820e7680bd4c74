mod common;

use std::sync::Arc;

use sawit_core::Grade;
use sawit_events::{AuditError, AuditRecord, AuditSink};
use sawit_infra::InMemoryStore;
use sawit_orders::OrderStatus;

use common::{harness, harness_with};

struct RejectingSink;

impl AuditSink for RejectingSink {
    type Error = AuditError;

    fn record(&self, _record: AuditRecord) -> Result<(), Self::Error> {
        Err(AuditError::Unavailable("activity log offline".to_string()))
    }
}

fn trail(records: &[AuditRecord]) -> Vec<(&str, &str, u64)> {
    records
        .iter()
        .map(|r| (r.action.as_str(), r.module.as_str(), r.sequence))
        .collect()
}

#[test]
fn order_creation_is_logged_with_record_versions() {
    let (h, _, audit) = harness();
    let lot = h.lot(1_000, Grade::A, 1_000);
    let before = audit.records().len();

    let order = h
        .service
        .create_order(&h.buyer, h.new_order(&lot, 400))
        .unwrap();

    let records = audit.records().split_off(before);
    assert_eq!(
        trail(&records),
        vec![
            ("orders.purchase_order.created", "orders.purchase_order", 1),
            ("stock.lot.reserved", "stock.lot", 2),
        ]
    );
    assert!(records.iter().all(|r| r.actor == h.buyer.user_id));
    assert_eq!(records[0].reference, *order.id_typed().as_uuid());
    assert_eq!(records[1].reference, *lot.id_typed().as_uuid());
    assert_eq!(records[0].payload["OrderCreated"]["order_number"], "PO-20240307-0001");
}

#[test]
fn weigh_out_logs_session_document_and_order() {
    let (h, _, audit) = harness();
    let lot = h.lot(1_000, Grade::A, 1_000);
    let session = h.weighed_in(&lot, 800, 1_000);
    let before = audit.records().len();

    h.weigh_out(&session, 1_800, Grade::A);

    let records = audit.records().split_off(before);
    assert_eq!(
        trail(&records),
        vec![
            ("weighing.session.outbound_recorded", "weighing.session", 3),
            (
                "settlement.sales_document.issued",
                "settlement.sales_document",
                1
            ),
            (
                "orders.purchase_order.completed",
                "orders.purchase_order",
                4
            ),
        ]
    );
    assert!(records.iter().all(|r| r.actor == h.operator.user_id));
}

#[test]
fn failing_sink_does_not_fail_operations() {
    let store = Arc::new(InMemoryStore::new());
    let h = harness_with(store, RejectingSink);
    let lot = h.lot(1_000, Grade::A, 1_000);

    let order = h.approved_order(&lot, 400);
    assert_eq!(order.status(), OrderStatus::Approved);

    let session = h.weighed_in(&lot, 300, 1_000);
    let settled = h.weigh_out(&session, 1_300, Grade::A);
    assert_eq!(settled.document.final_total(), 300_000);
    assert_eq!(h.service.lot(lot.id_typed()).unwrap().available_kg(), 300);
}

#[test]
fn rolled_back_operations_leave_no_records() {
    let (h, _, audit) = harness();
    let lot = h.lot(100, Grade::A, 1_000);
    let before = audit.records().len();

    assert!(
        h.service
            .create_order(&h.buyer, h.new_order(&lot, 101))
            .is_err()
    );
    assert_eq!(audit.records().len(), before);
}
