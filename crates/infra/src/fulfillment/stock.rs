use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{Span, instrument};

use sawit_core::{Actor, AggregateRoot, DomainError, ExpectedVersion, Grade};
use sawit_events::AuditSink;
use sawit_stock::{
    AGGREGATE_TYPE, RegisterLot, RepriceLot, StockCommand, StockLot, StockLotId, WithdrawLot,
};

use crate::store::{LotFilter, Store};

use super::{FulfillmentError, FulfillmentService, Trail, execute};

/// Input for [`FulfillmentService::register_lot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLot {
    pub estate: String,
    pub harvest_date: NaiveDate,
    pub quantity_kg: i64,
    pub grade: Grade,
    pub unit_price: i64,
    pub oil_content_pct: Option<f64>,
    pub note: Option<String>,
}

impl<S, A> FulfillmentService<S, A>
where
    S: Store,
    A: AuditSink,
{
    /// Put a harvested lot on sale. `available` starts equal to the total.
    #[instrument(
        skip(self, actor, lot),
        fields(actor = %actor.user_id, lot_id = tracing::field::Empty),
        err
    )]
    pub fn register_lot(&self, actor: &Actor, lot: NewLot) -> Result<StockLot, FulfillmentError> {
        let now = self.clock.now();
        let lot_id = StockLotId::generate();
        Span::current().record("lot_id", tracing::field::display(lot_id));

        let (registered, trail) = self.store.transaction(|uow| -> Result<_, FulfillmentError> {
            let mut trail = Trail::new(actor.user_id);
            let mut record = StockLot::empty(lot_id);
            execute(
                &mut record,
                StockCommand::RegisterLot(RegisterLot {
                    lot_id,
                    estate: lot.estate,
                    harvest_date: lot.harvest_date,
                    quantity_kg: lot.quantity_kg,
                    grade: lot.grade,
                    unit_price: lot.unit_price,
                    oil_content_pct: lot.oil_content_pct,
                    note: lot.note,
                    occurred_at: now,
                }),
                AGGREGATE_TYPE,
                *lot_id.as_uuid(),
                &mut trail,
            )?;
            uow.insert_lot(&record)?;
            Ok((record, trail))
        })?;

        self.publish(trail);
        tracing::info!(
            total_kg = registered.total_kg(),
            grade = %registered.grade(),
            "stock lot registered"
        );
        Ok(registered)
    }

    /// Change the quoted price for future orders. Existing orders keep the
    /// price they were created with.
    #[instrument(skip(self, actor), fields(actor = %actor.user_id), err)]
    pub fn reprice_lot(
        &self,
        actor: &Actor,
        lot_id: StockLotId,
        unit_price: i64,
    ) -> Result<StockLot, FulfillmentError> {
        let now = self.clock.now();
        self.change_lot(
            actor,
            lot_id,
            StockCommand::RepriceLot(RepriceLot {
                lot_id,
                unit_price,
                occurred_at: now,
            }),
        )
    }

    /// Close a lot for new orders. Reservations already made stay in place and
    /// can still be released.
    #[instrument(skip(self, actor), fields(actor = %actor.user_id), err)]
    pub fn withdraw_lot(
        &self,
        actor: &Actor,
        lot_id: StockLotId,
    ) -> Result<StockLot, FulfillmentError> {
        let now = self.clock.now();
        self.change_lot(
            actor,
            lot_id,
            StockCommand::WithdrawLot(WithdrawLot {
                lot_id,
                occurred_at: now,
            }),
        )
    }

    pub fn lot(&self, lot_id: StockLotId) -> Result<StockLot, FulfillmentError> {
        self.store.transaction(|uow| -> Result<_, FulfillmentError> {
            uow.lot(lot_id)?
                .ok_or_else(|| DomainError::not_found("stock lot", lot_id).into())
        })
    }

    pub fn lots(&self, filter: &LotFilter) -> Result<Vec<StockLot>, FulfillmentError> {
        self.store
            .transaction(|uow| -> Result<_, FulfillmentError> { Ok(uow.lots(filter)?) })
    }

    fn change_lot(
        &self,
        actor: &Actor,
        lot_id: StockLotId,
        command: StockCommand,
    ) -> Result<StockLot, FulfillmentError> {
        let (lot, trail) = self.store.transaction(|uow| -> Result<_, FulfillmentError> {
            let mut trail = Trail::new(actor.user_id);
            let mut lot = uow
                .lot(lot_id)?
                .ok_or_else(|| DomainError::not_found("stock lot", lot_id))?;
            let expected = lot.version();

            execute(&mut lot, command, AGGREGATE_TYPE, *lot_id.as_uuid(), &mut trail)?;
            uow.update_lot(&lot, ExpectedVersion::Exact(expected))?;
            Ok((lot, trail))
        })?;

        self.publish(trail);
        Ok(lot)
    }
}
