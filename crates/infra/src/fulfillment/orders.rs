use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{Span, instrument};

use sawit_core::{Actor, AggregateRoot, DomainError, ExpectedVersion};
use sawit_events::AuditSink;
use sawit_orders::{
    AGGREGATE_TYPE as ORDER_AGGREGATE, ApproveOrder, CancelOrder, CreateOrder, OrderCommand,
    OrderEvent, OrderStatus, PaymentTerms, PurchaseOrder, PurchaseOrderId, RejectOrder,
    daily_number,
};
use sawit_stock::{
    AGGREGATE_TYPE as LOT_AGGREGATE, ReleaseStock, ReserveStock, StockCommand, StockLotId,
};

use crate::store::{OrderFilter, SequenceKey, SequenceKind, Store, UnitOfWork};

use super::{FulfillmentError, FulfillmentService, Trail, execute};

/// Input for [`FulfillmentService::create_order`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub lot_id: StockLotId,
    pub quantity_kg: i64,
    pub pickup_date: NaiveDate,
    pub payment_terms: PaymentTerms,
    pub note: Option<String>,
}

impl<S, A> FulfillmentService<S, A>
where
    S: Store,
    A: AuditSink,
{
    /// Place an order against a lot on behalf of `actor` (the buyer).
    ///
    /// The lot's grade and price are snapshotted onto the order and the
    /// quantity is reserved in the same unit of work; two orders racing for
    /// the last kilograms of a lot cannot both succeed.
    #[instrument(
        skip(self, actor, order),
        fields(
            actor = %actor.user_id,
            lot_id = %order.lot_id,
            quantity_kg = order.quantity_kg,
            order_number = tracing::field::Empty
        ),
        err
    )]
    pub fn create_order(
        &self,
        actor: &Actor,
        order: NewOrder,
    ) -> Result<PurchaseOrder, FulfillmentError> {
        let now = self.clock.now();
        let day = self.business_day(now);
        let order_id = PurchaseOrderId::generate();

        let (created, trail) = self.store.transaction(|uow| -> Result<_, FulfillmentError> {
            let mut trail = Trail::new(actor.user_id);

            let mut lot = uow
                .lot(order.lot_id)?
                .ok_or_else(|| DomainError::not_found("stock lot", order.lot_id))?;
            if !lot.is_available() {
                return Err(DomainError::StockUnavailable {
                    status: lot.status().to_string(),
                }
                .into());
            }

            let counter = uow.next_sequence(SequenceKey::new(SequenceKind::PurchaseOrder, day))?;
            let order_number = daily_number(&self.settings.order_prefix, day, counter);

            let mut record = PurchaseOrder::empty(order_id);
            execute(
                &mut record,
                OrderCommand::CreateOrder(CreateOrder {
                    order_id,
                    order_number,
                    buyer: actor.user_id,
                    lot_id: order.lot_id,
                    quantity_kg: order.quantity_kg,
                    grade: lot.grade(),
                    unit_price: lot.unit_price(),
                    pickup_date: order.pickup_date,
                    pickup_location: lot.estate().to_string(),
                    payment_terms: order.payment_terms,
                    note: order.note,
                    occurred_at: now,
                }),
                ORDER_AGGREGATE,
                *order_id.as_uuid(),
                &mut trail,
            )?;

            let lot_version = lot.version();
            execute(
                &mut lot,
                StockCommand::ReserveStock(ReserveStock {
                    lot_id: order.lot_id,
                    order_id: order_id.0,
                    quantity_kg: order.quantity_kg,
                    occurred_at: now,
                }),
                LOT_AGGREGATE,
                *order.lot_id.as_uuid(),
                &mut trail,
            )?;

            uow.update_lot(&lot, ExpectedVersion::Exact(lot_version))?;
            uow.insert_order(&record)?;
            Ok((record, trail))
        })?;

        Span::current().record("order_number", created.order_number());
        self.publish(trail);
        tracing::info!(order_id = %order_id, total_price = created.total_price(), "purchase order created");
        Ok(created)
    }

    /// Move an order to `approved`, `rejected` or `cancelled`.
    ///
    /// `loading` and `completed` are driven by the weighing session and are
    /// refused here. Rejection and cancellation give the reserved quantity
    /// back to the lot.
    #[instrument(skip(self, actor, note), fields(actor = %actor.user_id), err)]
    pub fn set_order_status(
        &self,
        actor: &Actor,
        order_id: PurchaseOrderId,
        target: OrderStatus,
        note: Option<String>,
    ) -> Result<PurchaseOrder, FulfillmentError> {
        let now = self.clock.now();

        let (order, trail) = self.store.transaction(|uow| -> Result<_, FulfillmentError> {
            let mut trail = Trail::new(actor.user_id);
            let mut order = load_order(uow, order_id)?;
            let expected = order.version();

            let command = match target {
                OrderStatus::Approved => OrderCommand::ApproveOrder(ApproveOrder {
                    order_id,
                    approved_by: actor.user_id,
                    note,
                    occurred_at: now,
                }),
                OrderStatus::Rejected => OrderCommand::RejectOrder(RejectOrder {
                    order_id,
                    rejected_by: actor.user_id,
                    note,
                    occurred_at: now,
                }),
                OrderStatus::Cancelled => OrderCommand::CancelOrder(CancelOrder {
                    order_id,
                    cancelled_by: actor.user_id,
                    occurred_at: now,
                }),
                OrderStatus::Pending | OrderStatus::Loading | OrderStatus::Completed => {
                    return Err(DomainError::invalid_transition(
                        "purchase order",
                        order.status(),
                        target,
                    )
                    .into());
                }
            };

            let events = execute(
                &mut order,
                command,
                ORDER_AGGREGATE,
                *order_id.as_uuid(),
                &mut trail,
            )?;
            release_for(uow, &events, actor, now, &mut trail)?;
            uow.update_order(&order, ExpectedVersion::Exact(expected))?;
            Ok((order, trail))
        })?;

        self.publish(trail);
        tracing::info!(order_id = %order_id, status = %order.status(), "purchase order status changed");
        Ok(order)
    }

    /// Cancel a `pending` or `approved` order and release its reservation.
    pub fn cancel_order(
        &self,
        actor: &Actor,
        order_id: PurchaseOrderId,
    ) -> Result<PurchaseOrder, FulfillmentError> {
        self.set_order_status(actor, order_id, OrderStatus::Cancelled, None)
    }

    pub fn order(&self, order_id: PurchaseOrderId) -> Result<PurchaseOrder, FulfillmentError> {
        self.store
            .transaction(|uow| -> Result<_, FulfillmentError> { load_order(uow, order_id) })
    }

    /// Orders matching `filter`, newest first.
    pub fn orders(&self, filter: &OrderFilter) -> Result<Vec<PurchaseOrder>, FulfillmentError> {
        self.store
            .transaction(|uow| -> Result<_, FulfillmentError> { Ok(uow.orders(filter)?) })
    }
}

pub(super) fn load_order(
    uow: &mut dyn UnitOfWork,
    order_id: PurchaseOrderId,
) -> Result<PurchaseOrder, FulfillmentError> {
    uow.order(order_id)?
        .ok_or_else(|| DomainError::not_found("purchase order", order_id).into())
}

/// Give back the quantity named by reject/cancel events to its lot.
fn release_for(
    uow: &mut dyn UnitOfWork,
    events: &[OrderEvent],
    actor: &Actor,
    now: DateTime<Utc>,
    trail: &mut Trail,
) -> Result<(), FulfillmentError> {
    for event in events {
        let (order_id, lot_id, quantity_kg) = match event {
            OrderEvent::OrderRejected(e) => (e.order_id, e.lot_id, e.released_kg),
            OrderEvent::OrderCancelled(e) => (e.order_id, e.lot_id, e.released_kg),
            _ => continue,
        };

        let mut lot = uow
            .lot(lot_id)?
            .ok_or_else(|| DomainError::not_found("stock lot", lot_id))?;
        let expected = lot.version();

        let released = execute(
            &mut lot,
            StockCommand::ReleaseStock(ReleaseStock {
                lot_id,
                order_id: order_id.0,
                quantity_kg,
                occurred_at: now,
            }),
            LOT_AGGREGATE,
            *lot_id.as_uuid(),
            trail,
        );
        if let Err(err @ DomainError::InvariantViolation(_)) = &released {
            tracing::error!(
                error = %err,
                actor = %actor.user_id,
                order_id = %order_id,
                lot_id = %lot_id,
                "stock release rejected"
            );
        }
        released?;

        uow.update_lot(&lot, ExpectedVersion::Exact(expected))?;
    }
    Ok(())
}
