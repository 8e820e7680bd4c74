//! Shared fixtures for the fulfillment integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use sawit_core::{Actor, Grade, UserId};
use sawit_events::{AuditSink, InMemoryAuditSink};
use sawit_infra::store::Store;
use sawit_infra::{
    FixedClock, FulfillmentService, InMemoryStore, NewLot, NewOrder, OutboundReading,
    ServiceSettings, Settled,
};
use sawit_orders::{OrderStatus, PaymentTerms, PurchaseOrder};
use sawit_stock::StockLot;
use sawit_weighing::{LoadingSchedule, WeighingSession};

pub struct Harness<S, A> {
    pub service: FulfillmentService<S, A>,
    pub clock: Arc<FixedClock>,
    pub admin: Actor,
    pub operator: Actor,
    pub buyer: Actor,
}

pub type MemoryHarness = Harness<Arc<InMemoryStore>, Arc<InMemoryAuditSink>>;

/// 2024-03-07 09:00 in UTC+7.
pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 7, 2, 0, 0).unwrap()
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn harness() -> (MemoryHarness, Arc<InMemoryStore>, Arc<InMemoryAuditSink>) {
    let store = Arc::new(InMemoryStore::new());
    let audit = Arc::new(InMemoryAuditSink::new());
    let h = harness_with(store.clone(), audit.clone());
    (h, store, audit)
}

pub fn harness_with<S: Store, A: AuditSink>(store: S, audit: A) -> Harness<S, A> {
    let clock = Arc::new(FixedClock::new(start()));
    let service =
        FulfillmentService::new(store, audit, clock.clone(), ServiceSettings::default());
    Harness {
        service,
        clock,
        admin: Actor::admin(UserId::new()),
        operator: Actor::operator(UserId::new()),
        buyer: Actor::buyer(UserId::new()),
    }
}

pub fn schedule() -> LoadingSchedule {
    LoadingSchedule {
        loading_at: start(),
        plate_number: " bk 1234 xy ".to_string(),
        driver_name: "Sutrisno".to_string(),
    }
}

impl<S: Store, A: AuditSink> Harness<S, A> {
    pub fn lot(&self, quantity_kg: i64, grade: Grade, unit_price: i64) -> StockLot {
        self.service
            .register_lot(
                &self.admin,
                NewLot {
                    estate: "Kebun Sei Mangkei".to_string(),
                    harvest_date: day(2024, 3, 6),
                    quantity_kg,
                    grade,
                    unit_price,
                    oil_content_pct: Some(22.5),
                    note: None,
                },
            )
            .unwrap()
    }

    pub fn new_order(&self, lot: &StockLot, quantity_kg: i64) -> NewOrder {
        NewOrder {
            lot_id: lot.id_typed(),
            quantity_kg,
            pickup_date: day(2024, 3, 8),
            payment_terms: PaymentTerms::Transfer,
            note: None,
        }
    }

    pub fn approved_order(&self, lot: &StockLot, quantity_kg: i64) -> PurchaseOrder {
        let order = self
            .service
            .create_order(&self.buyer, self.new_order(lot, quantity_kg))
            .unwrap();
        self.service
            .set_order_status(&self.admin, order.id_typed(), OrderStatus::Approved, None)
            .unwrap()
    }

    /// An approved order with an open session and the empty truck weighed.
    pub fn weighed_in(&self, lot: &StockLot, quantity_kg: i64, inbound_kg: i64) -> WeighingSession {
        let order = self.approved_order(lot, quantity_kg);
        let session = self
            .service
            .open_session(&self.operator, order.id_typed(), schedule())
            .unwrap();
        self.service
            .record_inbound(&self.operator, session.id_typed(), inbound_kg)
            .unwrap()
    }

    pub fn weigh_out(&self, session: &WeighingSession, outbound_kg: i64, grade: Grade) -> Settled {
        self.service
            .record_outbound(
                &self.operator,
                session.id_typed(),
                OutboundReading {
                    weight_kg: outbound_kg,
                    grade,
                    quality: Default::default(),
                },
            )
            .unwrap()
    }
}
