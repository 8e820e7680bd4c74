use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use sawit_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Grade, UserId};
use sawit_events::Event;
use sawit_stock::StockLotId;

sawit_core::typed_aggregate_id!(
    /// Purchase order identifier.
    PurchaseOrderId
);

/// Aggregate type name used for audit records and storage.
pub const AGGREGATE_TYPE: &str = "orders.purchase_order";

/// Purchase order status.
///
/// ```text
/// pending ──> approved ──> loading ──> completed
///    │            │
///    ├──> rejected│
///    └──────────> cancelled
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Approved,
    Loading,
    Completed,
    Rejected,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Approved,
        OrderStatus::Loading,
        OrderStatus::Completed,
        OrderStatus::Rejected,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Approved => "approved",
            OrderStatus::Loading => "loading",
            OrderStatus::Completed => "completed",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Statuses reachable in one step from `self`.
    pub fn allowed_transitions(&self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Pending => &[
                OrderStatus::Approved,
                OrderStatus::Rejected,
                OrderStatus::Cancelled,
            ],
            OrderStatus::Approved => &[OrderStatus::Loading, OrderStatus::Cancelled],
            OrderStatus::Loading => &[OrderStatus::Completed],
            OrderStatus::Completed | OrderStatus::Rejected | OrderStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown order status: {s:?}")))
    }
}

/// How the buyer intends to pay for the order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentTerms {
    Cash,
    Transfer,
    Credit,
}

impl PaymentTerms {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentTerms::Cash => "cash",
            PaymentTerms::Transfer => "transfer",
            PaymentTerms::Credit => "credit",
        }
    }
}

impl core::fmt::Display for PaymentTerms {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate root: PurchaseOrder.
///
/// Price, grade and pickup location are snapshots of the lot at creation and
/// never change afterwards, even if the lot is repriced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    id: PurchaseOrderId,
    order_number: String,
    buyer: Option<UserId>,
    lot_id: Option<StockLotId>,
    quantity_kg: i64,
    grade: Grade,
    unit_price: i64,
    total_price: i64,
    pickup_date: Option<NaiveDate>,
    pickup_location: String,
    payment_terms: PaymentTerms,
    note: Option<String>,
    status: OrderStatus,
    approved_by: Option<UserId>,
    approved_at: Option<DateTime<Utc>>,
    status_note: Option<String>,
    closed_by: Option<UserId>,
    session_id: Option<AggregateId>,
    document_id: Option<AggregateId>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl PurchaseOrder {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: PurchaseOrderId) -> Self {
        Self {
            id,
            order_number: String::new(),
            buyer: None,
            lot_id: None,
            quantity_kg: 0,
            grade: Grade::A,
            unit_price: 0,
            total_price: 0,
            pickup_date: None,
            pickup_location: String::new(),
            payment_terms: PaymentTerms::Cash,
            note: None,
            status: OrderStatus::Pending,
            approved_by: None,
            approved_at: None,
            status_note: None,
            closed_by: None,
            session_id: None,
            document_id: None,
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PurchaseOrderId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn buyer(&self) -> Option<UserId> {
        self.buyer
    }

    pub fn lot_id(&self) -> Option<StockLotId> {
        self.lot_id
    }

    pub fn quantity_kg(&self) -> i64 {
        self.quantity_kg
    }

    pub fn grade(&self) -> Grade {
        self.grade
    }

    pub fn unit_price(&self) -> i64 {
        self.unit_price
    }

    pub fn total_price(&self) -> i64 {
        self.total_price
    }

    pub fn pickup_date(&self) -> Option<NaiveDate> {
        self.pickup_date
    }

    pub fn pickup_location(&self) -> &str {
        &self.pickup_location
    }

    pub fn payment_terms(&self) -> PaymentTerms {
        self.payment_terms
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn approved_by(&self) -> Option<UserId> {
        self.approved_by
    }

    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        self.approved_at
    }

    /// Note attached by the last approve/reject decision.
    pub fn status_note(&self) -> Option<&str> {
        self.status_note.as_deref()
    }

    /// Who rejected or cancelled the order.
    pub fn closed_by(&self) -> Option<UserId> {
        self.closed_by
    }

    pub fn session_id(&self) -> Option<AggregateId> {
        self.session_id
    }

    pub fn document_id(&self) -> Option<AggregateId> {
        self.document_id
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Whether a cancel request would currently be accepted.
    pub fn can_cancel(&self) -> bool {
        self.created && self.status.can_transition_to(OrderStatus::Cancelled)
    }
}

impl AggregateRoot for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrder {
    pub order_id: PurchaseOrderId,
    pub order_number: String,
    pub buyer: UserId,
    pub lot_id: StockLotId,
    pub quantity_kg: i64,
    pub grade: Grade,
    pub unit_price: i64,
    pub pickup_date: NaiveDate,
    pub pickup_location: String,
    pub payment_terms: PaymentTerms,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveOrder {
    pub order_id: PurchaseOrderId,
    pub approved_by: UserId,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectOrder {
    pub order_id: PurchaseOrderId,
    pub rejected_by: UserId,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: PurchaseOrderId,
    pub cancelled_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: StartLoading (issued when a weighing session is opened).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartLoading {
    pub order_id: PurchaseOrderId,
    pub session_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteOrder (issued by settlement).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteOrder {
    pub order_id: PurchaseOrderId,
    pub document_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    CreateOrder(CreateOrder),
    ApproveOrder(ApproveOrder),
    RejectOrder(RejectOrder),
    CancelOrder(CancelOrder),
    StartLoading(StartLoading),
    CompleteOrder(CompleteOrder),
}

/// Event: OrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: PurchaseOrderId,
    pub order_number: String,
    pub buyer: UserId,
    pub lot_id: StockLotId,
    pub quantity_kg: i64,
    pub grade: Grade,
    pub unit_price: i64,
    pub total_price: i64,
    pub pickup_date: NaiveDate,
    pub pickup_location: String,
    pub payment_terms: PaymentTerms,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderApproved {
    pub order_id: PurchaseOrderId,
    pub approved_by: UserId,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderRejected. `released_kg` goes back to the lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRejected {
    pub order_id: PurchaseOrderId,
    pub rejected_by: UserId,
    pub lot_id: StockLotId,
    pub released_kg: i64,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderCancelled. `released_kg` goes back to the lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: PurchaseOrderId,
    pub cancelled_by: UserId,
    pub previous_status: OrderStatus,
    pub lot_id: StockLotId,
    pub released_kg: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LoadingStarted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadingStarted {
    pub order_id: PurchaseOrderId,
    pub session_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCompleted {
    pub order_id: PurchaseOrderId,
    pub document_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderCreated(OrderCreated),
    OrderApproved(OrderApproved),
    OrderRejected(OrderRejected),
    OrderCancelled(OrderCancelled),
    LoadingStarted(LoadingStarted),
    OrderCompleted(OrderCompleted),
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "orders.purchase_order.created",
            OrderEvent::OrderApproved(_) => "orders.purchase_order.approved",
            OrderEvent::OrderRejected(_) => "orders.purchase_order.rejected",
            OrderEvent::OrderCancelled(_) => "orders.purchase_order.cancelled",
            OrderEvent::LoadingStarted(_) => "orders.purchase_order.loading_started",
            OrderEvent::OrderCompleted(_) => "orders.purchase_order.completed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderCreated(e) => e.occurred_at,
            OrderEvent::OrderApproved(e) => e.occurred_at,
            OrderEvent::OrderRejected(e) => e.occurred_at,
            OrderEvent::OrderCancelled(e) => e.occurred_at,
            OrderEvent::LoadingStarted(e) => e.occurred_at,
            OrderEvent::OrderCompleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PurchaseOrder {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderCreated(e) => {
                self.id = e.order_id;
                self.order_number = e.order_number.clone();
                self.buyer = Some(e.buyer);
                self.lot_id = Some(e.lot_id);
                self.quantity_kg = e.quantity_kg;
                self.grade = e.grade;
                self.unit_price = e.unit_price;
                self.total_price = e.total_price;
                self.pickup_date = Some(e.pickup_date);
                self.pickup_location = e.pickup_location.clone();
                self.payment_terms = e.payment_terms;
                self.note = e.note.clone();
                self.status = OrderStatus::Pending;
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            OrderEvent::OrderApproved(e) => {
                self.status = OrderStatus::Approved;
                self.approved_by = Some(e.approved_by);
                self.approved_at = Some(e.occurred_at);
                self.status_note = e.note.clone();
            }
            OrderEvent::OrderRejected(e) => {
                self.status = OrderStatus::Rejected;
                self.closed_by = Some(e.rejected_by);
                self.status_note = e.note.clone();
            }
            OrderEvent::OrderCancelled(e) => {
                self.status = OrderStatus::Cancelled;
                self.closed_by = Some(e.cancelled_by);
            }
            OrderEvent::LoadingStarted(e) => {
                self.status = OrderStatus::Loading;
                self.session_id = Some(e.session_id);
            }
            OrderEvent::OrderCompleted(e) => {
                self.status = OrderStatus::Completed;
                self.document_id = Some(e.document_id);
            }
        }

        self.updated_at = Some(event.occurred_at());

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::CreateOrder(cmd) => self.handle_create(cmd),
            OrderCommand::ApproveOrder(cmd) => self.handle_approve(cmd),
            OrderCommand::RejectOrder(cmd) => self.handle_reject(cmd),
            OrderCommand::CancelOrder(cmd) => self.handle_cancel(cmd),
            OrderCommand::StartLoading(cmd) => self.handle_start_loading(cmd),
            OrderCommand::CompleteOrder(cmd) => self.handle_complete(cmd),
        }
    }
}

impl PurchaseOrder {
    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("purchase order", self.id));
        }
        Ok(())
    }

    fn ensure_order_id(&self, order_id: PurchaseOrderId) -> Result<(), DomainError> {
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_transition(&self, next: OrderStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::invalid_transition(
                "purchase order",
                self.status,
                next,
            ));
        }
        Ok(())
    }

    fn reserved_lot(&self) -> Result<StockLotId, DomainError> {
        self.lot_id
            .ok_or_else(|| DomainError::invariant("order has no stock lot"))
    }

    fn handle_create(&self, cmd: &CreateOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("purchase order already exists"));
        }
        self.ensure_order_id(cmd.order_id)?;

        if cmd.order_number.trim().is_empty() {
            return Err(DomainError::validation("order_number cannot be empty"));
        }
        if cmd.quantity_kg <= 0 {
            return Err(DomainError::validation("quantity_kg must be positive"));
        }
        if cmd.unit_price <= 0 {
            return Err(DomainError::validation("unit_price must be positive"));
        }
        let total_price = cmd
            .unit_price
            .checked_mul(cmd.quantity_kg)
            .ok_or_else(|| DomainError::validation("order total overflows"))?;

        Ok(vec![OrderEvent::OrderCreated(OrderCreated {
            order_id: cmd.order_id,
            order_number: cmd.order_number.clone(),
            buyer: cmd.buyer,
            lot_id: cmd.lot_id,
            quantity_kg: cmd.quantity_kg,
            grade: cmd.grade,
            unit_price: cmd.unit_price,
            total_price,
            pickup_date: cmd.pickup_date,
            pickup_location: cmd.pickup_location.clone(),
            payment_terms: cmd.payment_terms,
            note: cmd.note.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApproveOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_order_id(cmd.order_id)?;
        self.ensure_transition(OrderStatus::Approved)?;

        Ok(vec![OrderEvent::OrderApproved(OrderApproved {
            order_id: cmd.order_id,
            approved_by: cmd.approved_by,
            note: cmd.note.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject(&self, cmd: &RejectOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_order_id(cmd.order_id)?;
        self.ensure_transition(OrderStatus::Rejected)?;

        Ok(vec![OrderEvent::OrderRejected(OrderRejected {
            order_id: cmd.order_id,
            rejected_by: cmd.rejected_by,
            lot_id: self.reserved_lot()?,
            released_kg: self.quantity_kg,
            note: cmd.note.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_order_id(cmd.order_id)?;
        self.ensure_transition(OrderStatus::Cancelled)?;

        Ok(vec![OrderEvent::OrderCancelled(OrderCancelled {
            order_id: cmd.order_id,
            cancelled_by: cmd.cancelled_by,
            previous_status: self.status,
            lot_id: self.reserved_lot()?,
            released_kg: self.quantity_kg,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_start_loading(&self, cmd: &StartLoading) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_order_id(cmd.order_id)?;
        self.ensure_transition(OrderStatus::Loading)?;

        Ok(vec![OrderEvent::LoadingStarted(LoadingStarted {
            order_id: cmd.order_id,
            session_id: cmd.session_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(&self, cmd: &CompleteOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_order_id(cmd.order_id)?;
        self.ensure_transition(OrderStatus::Completed)?;

        Ok(vec![OrderEvent::OrderCompleted(OrderCompleted {
            order_id: cmd.order_id,
            document_id: cmd.document_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
