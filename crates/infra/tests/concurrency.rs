mod common;

use std::collections::BTreeSet;

use sawit_core::{DomainError, Grade};
use sawit_infra::OutboundReading;
use sawit_infra::store::OrderFilter;
use sawit_orders::OrderStatus;

use common::harness;

#[test]
fn racing_orders_cannot_oversell_a_lot() {
    let (h, _, _) = harness();
    let lot = h.lot(100, Grade::A, 1_000);

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let (h, lot) = (&h, &lot);
                scope.spawn(move || h.service.create_order(&h.buyer, h.new_order(lot, 60)))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("thread panicked"))
            .collect()
    });

    let (ok, failed): (Vec<_>, Vec<_>) = results.into_iter().partition(Result::is_ok);
    assert_eq!(ok.len(), 1);
    assert_eq!(failed.len(), 1);

    let err = failed
        .into_iter()
        .next()
        .and_then(Result::err)
        .and_then(|e| e.domain().cloned());
    assert_eq!(
        err,
        Some(DomainError::InsufficientStock {
            requested: 60,
            available: 40
        })
    );

    assert_eq!(h.service.lot(lot.id_typed()).unwrap().available_kg(), 40);
    let orders = h.service.orders(&OrderFilter::default()).unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].order_number(), "PO-20240307-0001");
}

#[test]
fn concurrent_orders_get_distinct_numbers() {
    let (h, _, _) = harness();
    let lot = h.lot(50_000, Grade::A, 1_000);

    let numbers: Vec<String> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..50)
            .map(|_| {
                let (h, lot) = (&h, &lot);
                scope.spawn(move || {
                    h.service
                        .create_order(&h.buyer, h.new_order(lot, 100))
                        .map(|o| o.order_number().to_string())
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("thread panicked").unwrap())
            .collect()
    });

    let expected: BTreeSet<String> = (1..=50).map(|n| format!("PO-20240307-{n:04}")).collect();
    assert_eq!(numbers.into_iter().collect::<BTreeSet<_>>(), expected);
    assert_eq!(h.service.lot(lot.id_typed()).unwrap().available_kg(), 45_000);
}

#[test]
fn concurrent_weigh_outs_number_documents_without_gaps() {
    let (h, _, _) = harness();
    let lot = h.lot(100_000, Grade::A, 1_000);
    let sessions: Vec<_> = (0..100).map(|_| h.weighed_in(&lot, 100, 1_000)).collect();

    let invoices: Vec<String> = std::thread::scope(|scope| {
        let handles: Vec<_> = sessions
            .iter()
            .map(|session| {
                let h = &h;
                scope.spawn(move || {
                    h.service
                        .record_outbound(
                            &h.operator,
                            session.id_typed(),
                            OutboundReading {
                                weight_kg: 1_100,
                                grade: Grade::A,
                                quality: Default::default(),
                            },
                        )
                        .map(|s| s.document.numbers().invoice.clone())
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("thread panicked").unwrap())
            .collect()
    });

    let expected: BTreeSet<String> = (1..=100).map(|n| format!("INV-20240307-{n:04}")).collect();
    let unique: BTreeSet<String> = invoices.iter().cloned().collect();
    assert_eq!(invoices.len(), 100);
    assert_eq!(unique, expected);

    let completed = h
        .service
        .orders(&OrderFilter {
            status: Some(OrderStatus::Completed),
            ..OrderFilter::default()
        })
        .unwrap();
    assert_eq!(completed.len(), 100);
}

#[test]
fn only_one_of_two_racing_weigh_outs_settles() {
    let (h, _, _) = harness();
    let lot = h.lot(1_000, Grade::A, 1_000);
    let session = h.weighed_in(&lot, 800, 1_000);

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = [1_800, 1_900]
            .into_iter()
            .map(|weight_kg| {
                let h = &h;
                let session_id = session.id_typed();
                scope.spawn(move || {
                    h.service.record_outbound(
                        &h.operator,
                        session_id,
                        OutboundReading {
                            weight_kg,
                            grade: Grade::A,
                            quality: Default::default(),
                        },
                    )
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("thread panicked"))
            .collect()
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(h.service.documents(&Default::default()).unwrap().len(), 1);
}
