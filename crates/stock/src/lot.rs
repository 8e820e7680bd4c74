use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use sawit_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Grade};
use sawit_events::Event;

sawit_core::typed_aggregate_id!(
    /// Stock lot identifier.
    StockLotId
);

/// Aggregate type name used for audit records and storage.
pub const AGGREGATE_TYPE: &str = "stock.lot";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotStatus {
    Available,
    Exhausted,
    Withdrawn,
}

impl LotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LotStatus::Available => "available",
            LotStatus::Exhausted => "exhausted",
            LotStatus::Withdrawn => "withdrawn",
        }
    }
}

impl core::fmt::Display for LotStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate root: StockLot.
///
/// `total_kg` is fixed at registration. `available_kg` moves with
/// reservations and releases and is the only quantity orders draw from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockLot {
    id: StockLotId,
    estate: String,
    harvest_date: Option<NaiveDate>,
    total_kg: i64,
    available_kg: i64,
    grade: Grade,
    unit_price: i64,
    oil_content_pct: Option<f64>,
    note: Option<String>,
    status: LotStatus,
    registered_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl StockLot {
    /// Create an empty, not-yet-registered aggregate instance.
    pub fn empty(id: StockLotId) -> Self {
        Self {
            id,
            estate: String::new(),
            harvest_date: None,
            total_kg: 0,
            available_kg: 0,
            grade: Grade::A,
            unit_price: 0,
            oil_content_pct: None,
            note: None,
            status: LotStatus::Available,
            registered_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> StockLotId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn estate(&self) -> &str {
        &self.estate
    }

    pub fn harvest_date(&self) -> Option<NaiveDate> {
        self.harvest_date
    }

    pub fn total_kg(&self) -> i64 {
        self.total_kg
    }

    pub fn available_kg(&self) -> i64 {
        self.available_kg
    }

    pub fn reserved_kg(&self) -> i64 {
        self.total_kg - self.available_kg
    }

    pub fn grade(&self) -> Grade {
        self.grade
    }

    pub fn unit_price(&self) -> i64 {
        self.unit_price
    }

    pub fn oil_content_pct(&self) -> Option<f64> {
        self.oil_content_pct
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn status(&self) -> LotStatus {
        self.status
    }

    pub fn registered_at(&self) -> Option<DateTime<Utc>> {
        self.registered_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Open for new orders.
    pub fn is_available(&self) -> bool {
        self.created && self.status == LotStatus::Available
    }
}

impl AggregateRoot for StockLot {
    type Id = StockLotId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterLot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterLot {
    pub lot_id: StockLotId,
    pub estate: String,
    pub harvest_date: NaiveDate,
    pub quantity_kg: i64,
    pub grade: Grade,
    pub unit_price: i64,
    pub oil_content_pct: Option<f64>,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReserveStock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveStock {
    pub lot_id: StockLotId,
    pub order_id: AggregateId,
    pub quantity_kg: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReleaseStock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseStock {
    pub lot_id: StockLotId,
    pub order_id: AggregateId,
    pub quantity_kg: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RepriceLot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepriceLot {
    pub lot_id: StockLotId,
    pub unit_price: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: WithdrawLot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawLot {
    pub lot_id: StockLotId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StockCommand {
    RegisterLot(RegisterLot),
    ReserveStock(ReserveStock),
    ReleaseStock(ReleaseStock),
    RepriceLot(RepriceLot),
    WithdrawLot(WithdrawLot),
}

/// Event: LotRegistered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LotRegistered {
    pub lot_id: StockLotId,
    pub estate: String,
    pub harvest_date: NaiveDate,
    pub quantity_kg: i64,
    pub grade: Grade,
    pub unit_price: i64,
    pub oil_content_pct: Option<f64>,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReserved {
    pub lot_id: StockLotId,
    pub order_id: AggregateId,
    pub quantity_kg: i64,
    pub remaining_kg: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReleased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReleased {
    pub lot_id: StockLotId,
    pub order_id: AggregateId,
    pub quantity_kg: i64,
    pub remaining_kg: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LotRepriced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotRepriced {
    pub lot_id: StockLotId,
    pub previous_price: i64,
    pub unit_price: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LotWithdrawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotWithdrawn {
    pub lot_id: StockLotId,
    pub available_kg: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StockEvent {
    LotRegistered(LotRegistered),
    StockReserved(StockReserved),
    StockReleased(StockReleased),
    LotRepriced(LotRepriced),
    LotWithdrawn(LotWithdrawn),
}

impl Event for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::LotRegistered(_) => "stock.lot.registered",
            StockEvent::StockReserved(_) => "stock.lot.reserved",
            StockEvent::StockReleased(_) => "stock.lot.released",
            StockEvent::LotRepriced(_) => "stock.lot.repriced",
            StockEvent::LotWithdrawn(_) => "stock.lot.withdrawn",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockEvent::LotRegistered(e) => e.occurred_at,
            StockEvent::StockReserved(e) => e.occurred_at,
            StockEvent::StockReleased(e) => e.occurred_at,
            StockEvent::LotRepriced(e) => e.occurred_at,
            StockEvent::LotWithdrawn(e) => e.occurred_at,
        }
    }
}

impl Aggregate for StockLot {
    type Command = StockCommand;
    type Event = StockEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StockEvent::LotRegistered(e) => {
                self.id = e.lot_id;
                self.estate = e.estate.clone();
                self.harvest_date = Some(e.harvest_date);
                self.total_kg = e.quantity_kg;
                self.available_kg = e.quantity_kg;
                self.grade = e.grade;
                self.unit_price = e.unit_price;
                self.oil_content_pct = e.oil_content_pct;
                self.note = e.note.clone();
                self.status = LotStatus::Available;
                self.registered_at = Some(e.occurred_at);
                self.created = true;
            }
            StockEvent::StockReserved(e) => {
                self.available_kg = e.remaining_kg;
                if self.available_kg == 0 && self.status == LotStatus::Available {
                    self.status = LotStatus::Exhausted;
                }
            }
            StockEvent::StockReleased(e) => {
                self.available_kg = e.remaining_kg;
                if self.available_kg > 0 && self.status == LotStatus::Exhausted {
                    self.status = LotStatus::Available;
                }
            }
            StockEvent::LotRepriced(e) => {
                self.unit_price = e.unit_price;
            }
            StockEvent::LotWithdrawn(_) => {
                self.status = LotStatus::Withdrawn;
            }
        }

        self.updated_at = Some(event.occurred_at());

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StockCommand::RegisterLot(cmd) => self.handle_register(cmd),
            StockCommand::ReserveStock(cmd) => self.handle_reserve(cmd),
            StockCommand::ReleaseStock(cmd) => self.handle_release(cmd),
            StockCommand::RepriceLot(cmd) => self.handle_reprice(cmd),
            StockCommand::WithdrawLot(cmd) => self.handle_withdraw(cmd),
        }
    }
}

impl StockLot {
    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("stock lot", self.id));
        }
        Ok(())
    }

    fn ensure_lot_id(&self, lot_id: StockLotId) -> Result<(), DomainError> {
        if self.id != lot_id {
            return Err(DomainError::invariant("lot_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterLot) -> Result<Vec<StockEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("stock lot already exists"));
        }
        self.ensure_lot_id(cmd.lot_id)?;
        if cmd.estate.trim().is_empty() {
            return Err(DomainError::validation("estate cannot be empty"));
        }
        if cmd.quantity_kg <= 0 {
            return Err(DomainError::validation("quantity_kg must be positive"));
        }
        if cmd.unit_price <= 0 {
            return Err(DomainError::validation("unit_price must be positive"));
        }
        if let Some(pct) = cmd.oil_content_pct {
            if !(0.0..=100.0).contains(&pct) {
                return Err(DomainError::validation(
                    "oil_content_pct must be between 0 and 100",
                ));
            }
        }

        Ok(vec![StockEvent::LotRegistered(LotRegistered {
            lot_id: cmd.lot_id,
            estate: cmd.estate.trim().to_string(),
            harvest_date: cmd.harvest_date,
            quantity_kg: cmd.quantity_kg,
            grade: cmd.grade,
            unit_price: cmd.unit_price,
            oil_content_pct: cmd.oil_content_pct,
            note: cmd.note.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reserve(&self, cmd: &ReserveStock) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_lot_id(cmd.lot_id)?;

        if cmd.quantity_kg <= 0 {
            return Err(DomainError::validation("quantity_kg must be positive"));
        }

        // A lot that is not open reports nothing available to reserve.
        let available = if self.status == LotStatus::Available {
            self.available_kg
        } else {
            0
        };
        if cmd.quantity_kg > available {
            return Err(DomainError::InsufficientStock {
                requested: cmd.quantity_kg,
                available,
            });
        }

        Ok(vec![StockEvent::StockReserved(StockReserved {
            lot_id: cmd.lot_id,
            order_id: cmd.order_id,
            quantity_kg: cmd.quantity_kg,
            remaining_kg: self.available_kg - cmd.quantity_kg,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_release(&self, cmd: &ReleaseStock) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_lot_id(cmd.lot_id)?;

        if cmd.quantity_kg <= 0 {
            return Err(DomainError::validation("quantity_kg must be positive"));
        }

        let remaining = self.available_kg + cmd.quantity_kg;
        if remaining > self.total_kg {
            return Err(DomainError::invariant(format!(
                "release of {} kg would raise available to {} kg, above the lot total of {} kg",
                cmd.quantity_kg, remaining, self.total_kg
            )));
        }

        Ok(vec![StockEvent::StockReleased(StockReleased {
            lot_id: cmd.lot_id,
            order_id: cmd.order_id,
            quantity_kg: cmd.quantity_kg,
            remaining_kg: remaining,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reprice(&self, cmd: &RepriceLot) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_lot_id(cmd.lot_id)?;

        if cmd.unit_price <= 0 {
            return Err(DomainError::validation("unit_price must be positive"));
        }
        if self.status == LotStatus::Withdrawn {
            return Err(DomainError::StockUnavailable {
                status: self.status.to_string(),
            });
        }

        Ok(vec![StockEvent::LotRepriced(LotRepriced {
            lot_id: cmd.lot_id,
            previous_price: self.unit_price,
            unit_price: cmd.unit_price,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_withdraw(&self, cmd: &WithdrawLot) -> Result<Vec<StockEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_lot_id(cmd.lot_id)?;

        if self.status == LotStatus::Withdrawn {
            return Err(DomainError::invalid_transition(
                "stock lot",
                self.status,
                LotStatus::Withdrawn,
            ));
        }

        Ok(vec![StockEvent::LotWithdrawn(LotWithdrawn {
            lot_id: cmd.lot_id,
            available_kg: self.available_kg,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn registered(total: i64) -> StockLot {
        let id = StockLotId::new(AggregateId::new());
        let mut lot = StockLot::empty(id);
        lot.execute(&StockCommand::RegisterLot(RegisterLot {
            lot_id: id,
            estate: "Kebun Sei Mangkei".to_string(),
            harvest_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            quantity_kg: total,
            grade: Grade::A,
            unit_price: 1_000,
            oil_content_pct: Some(22.5),
            note: None,
            occurred_at: test_time(),
        }))
        .unwrap();
        lot
    }

    fn reserve(lot: &StockLot, qty: i64) -> StockCommand {
        StockCommand::ReserveStock(ReserveStock {
            lot_id: lot.id_typed(),
            order_id: AggregateId::new(),
            quantity_kg: qty,
            occurred_at: test_time(),
        })
    }

    fn release(lot: &StockLot, qty: i64) -> StockCommand {
        StockCommand::ReleaseStock(ReleaseStock {
            lot_id: lot.id_typed(),
            order_id: AggregateId::new(),
            quantity_kg: qty,
            occurred_at: test_time(),
        })
    }

    #[test]
    fn register_sets_available_to_total() {
        let lot = registered(1_000);
        assert_eq!(lot.total_kg(), 1_000);
        assert_eq!(lot.available_kg(), 1_000);
        assert_eq!(lot.status(), LotStatus::Available);
        assert_eq!(lot.version(), 1);
    }

    #[test]
    fn register_rejects_non_positive_quantity() {
        let id = StockLotId::new(AggregateId::new());
        let lot = StockLot::empty(id);
        let err = lot
            .handle(&StockCommand::RegisterLot(RegisterLot {
                lot_id: id,
                estate: "Kebun".to_string(),
                harvest_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                quantity_kg: 0,
                grade: Grade::B,
                unit_price: 1_000,
                oil_content_pct: None,
                note: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        match err {
            DomainError::Validation(msg) if msg.contains("quantity_kg") => {}
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn reserve_more_than_available_fails() {
        let mut lot = registered(100);
        lot.execute(&reserve(&lot, 60)).unwrap();

        let err = lot.handle(&reserve(&lot, 60)).unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientStock {
                requested: 60,
                available: 40
            }
        );
        assert_eq!(lot.available_kg(), 40);
    }

    #[test]
    fn reserving_everything_exhausts_and_release_reopens() {
        let mut lot = registered(100);
        lot.execute(&reserve(&lot, 100)).unwrap();
        assert_eq!(lot.status(), LotStatus::Exhausted);
        assert!(!lot.is_available());

        let err = lot.handle(&reserve(&lot, 1)).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientStock { available: 0, .. }));

        lot.execute(&release(&lot, 30)).unwrap();
        assert_eq!(lot.status(), LotStatus::Available);
        assert_eq!(lot.available_kg(), 30);
    }

    #[test]
    fn over_release_is_an_invariant_violation() {
        let mut lot = registered(100);
        lot.execute(&reserve(&lot, 20)).unwrap();

        let err = lot.handle(&release(&lot, 21)).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(lot.available_kg(), 80);
    }

    #[test]
    fn withdrawn_lot_refuses_reservations_but_accepts_releases() {
        let mut lot = registered(100);
        lot.execute(&reserve(&lot, 50)).unwrap();
        lot.execute(&StockCommand::WithdrawLot(WithdrawLot {
            lot_id: lot.id_typed(),
            occurred_at: test_time(),
        }))
        .unwrap();

        let err = lot.handle(&reserve(&lot, 10)).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientStock { available: 0, .. }));

        lot.execute(&release(&lot, 50)).unwrap();
        assert_eq!(lot.available_kg(), 100);
        assert_eq!(lot.status(), LotStatus::Withdrawn);
    }

    #[test]
    fn reprice_changes_only_the_quote() {
        let mut lot = registered(100);
        lot.execute(&StockCommand::RepriceLot(RepriceLot {
            lot_id: lot.id_typed(),
            unit_price: 1_250,
            occurred_at: test_time(),
        }))
        .unwrap();
        assert_eq!(lot.unit_price(), 1_250);
        assert_eq!(lot.available_kg(), 100);
    }

    #[test]
    fn commands_against_unregistered_lot_are_not_found() {
        let lot = StockLot::empty(StockLotId::new(AggregateId::new()));
        let err = lot.handle(&reserve(&lot, 1)).unwrap_err();
        assert!(matches!(err, DomainError::NotFound { entity: "stock lot", .. }));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Reserve(i64),
        Release(i64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1i64..400).prop_map(Op::Reserve),
            (1i64..400).prop_map(Op::Release),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, ..ProptestConfig::default() })]

        #[test]
        fn available_stays_within_bounds(total in 1i64..2_000, ops in prop::collection::vec(op_strategy(), 0..40)) {
            let mut lot = registered(total);
            for op in ops {
                let cmd = match op {
                    Op::Reserve(q) => reserve(&lot, q),
                    Op::Release(q) => release(&lot, q),
                };
                let before = lot.clone();
                if lot.execute(&cmd).is_err() {
                    prop_assert_eq!(&lot, &before);
                }
                prop_assert!(lot.available_kg() >= 0);
                prop_assert!(lot.available_kg() <= lot.total_kg());
                prop_assert_eq!(lot.status() == LotStatus::Exhausted, lot.available_kg() == 0);
            }
        }

        #[test]
        fn reserve_then_release_restores_available(total in 1i64..2_000, qty in 1i64..2_000) {
            prop_assume!(qty <= total);
            let mut lot = registered(total);
            lot.execute(&reserve(&lot, qty)).unwrap();
            lot.execute(&release(&lot, qty)).unwrap();
            prop_assert_eq!(lot.available_kg(), total);
            prop_assert_eq!(lot.status(), LotStatus::Available);
        }
    }
}
