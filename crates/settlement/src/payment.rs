//! Payments recorded against sales documents and their verification.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use sawit_core::{Aggregate, AggregateRoot, DomainError, UserId};
use sawit_events::Event;
use sawit_orders::{PaymentTerms, PurchaseOrderId};

use crate::document::SalesDocumentId;

sawit_core::typed_aggregate_id!(
    /// Payment identifier.
    PaymentId
);

/// Aggregate type name used for audit records and storage.
pub const AGGREGATE_TYPE: &str = "settlement.payment";

/// State of a single payment.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Pending,
    Verified,
    Rejected,
}

impl PaymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Pending => "pending",
            PaymentState::Verified => "verified",
            PaymentState::Rejected => "rejected",
        }
    }
}

impl core::fmt::Display for PaymentState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment status of an order, derived from its latest payment.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Pending,
    Verified,
    Rejected,
}

impl PaymentStatus {
    pub fn from_latest(latest: Option<&Payment>) -> Self {
        match latest.map(Payment::state) {
            None => PaymentStatus::Unpaid,
            Some(PaymentState::Pending) => PaymentStatus::Pending,
            Some(PaymentState::Verified) => PaymentStatus::Verified,
            Some(PaymentState::Rejected) => PaymentStatus::Rejected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Verified => "verified",
            PaymentStatus::Rejected => "rejected",
        }
    }
}

impl core::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verification outcome chosen by the verifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentDecision {
    Verified,
    Rejected,
}

/// Who sent the money.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayerDetails {
    pub bank: Option<String>,
    pub account_number: Option<String>,
    pub account_name: Option<String>,
}

/// Aggregate root: Payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    id: PaymentId,
    document_id: Option<SalesDocumentId>,
    order_id: Option<PurchaseOrderId>,
    amount: i64,
    method: PaymentTerms,
    payer: PayerDetails,
    paid_on: Option<NaiveDate>,
    due_on: Option<NaiveDate>,
    note: Option<String>,
    state: PaymentState,
    recorded_by: Option<UserId>,
    recorded_at: Option<DateTime<Utc>>,
    verified_by: Option<UserId>,
    verified_at: Option<DateTime<Utc>>,
    verification_note: Option<String>,
    version: u64,
    created: bool,
}

impl Payment {
    /// Create an empty, not-yet-recorded aggregate instance.
    pub fn empty(id: PaymentId) -> Self {
        Self {
            id,
            document_id: None,
            order_id: None,
            amount: 0,
            method: PaymentTerms::Transfer,
            payer: PayerDetails::default(),
            paid_on: None,
            due_on: None,
            note: None,
            state: PaymentState::Pending,
            recorded_by: None,
            recorded_at: None,
            verified_by: None,
            verified_at: None,
            verification_note: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PaymentId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn document_id(&self) -> Option<SalesDocumentId> {
        self.document_id
    }

    pub fn order_id(&self) -> Option<PurchaseOrderId> {
        self.order_id
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }

    pub fn method(&self) -> PaymentTerms {
        self.method
    }

    pub fn payer(&self) -> &PayerDetails {
        &self.payer
    }

    pub fn paid_on(&self) -> Option<NaiveDate> {
        self.paid_on
    }

    pub fn due_on(&self) -> Option<NaiveDate> {
        self.due_on
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn state(&self) -> PaymentState {
        self.state
    }

    pub fn recorded_by(&self) -> Option<UserId> {
        self.recorded_by
    }

    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        self.recorded_at
    }

    pub fn verified_by(&self) -> Option<UserId> {
        self.verified_by
    }

    pub fn verified_at(&self) -> Option<DateTime<Utc>> {
        self.verified_at
    }

    pub fn verification_note(&self) -> Option<&str> {
        self.verification_note.as_deref()
    }
}

impl AggregateRoot for Payment {
    type Id = PaymentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RecordPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayment {
    pub payment_id: PaymentId,
    pub document_id: SalesDocumentId,
    pub order_id: PurchaseOrderId,
    pub amount: i64,
    pub method: PaymentTerms,
    pub payer: PayerDetails,
    pub paid_on: NaiveDate,
    pub due_on: Option<NaiveDate>,
    pub note: Option<String>,
    pub recorded_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: VerifyPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyPayment {
    pub payment_id: PaymentId,
    pub decision: PaymentDecision,
    pub note: Option<String>,
    pub verified_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentCommand {
    RecordPayment(RecordPayment),
    VerifyPayment(VerifyPayment),
}

/// Event: PaymentRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecorded {
    pub payment_id: PaymentId,
    pub document_id: SalesDocumentId,
    pub order_id: PurchaseOrderId,
    pub amount: i64,
    pub method: PaymentTerms,
    pub payer: PayerDetails,
    pub paid_on: NaiveDate,
    pub due_on: Option<NaiveDate>,
    pub note: Option<String>,
    pub recorded_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentVerified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentVerified {
    pub payment_id: PaymentId,
    pub verified_by: UserId,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRejected {
    pub payment_id: PaymentId,
    pub rejected_by: UserId,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentEvent {
    PaymentRecorded(PaymentRecorded),
    PaymentVerified(PaymentVerified),
    PaymentRejected(PaymentRejected),
}

impl Event for PaymentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PaymentEvent::PaymentRecorded(_) => "settlement.payment.recorded",
            PaymentEvent::PaymentVerified(_) => "settlement.payment.verified",
            PaymentEvent::PaymentRejected(_) => "settlement.payment.rejected",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PaymentEvent::PaymentRecorded(e) => e.occurred_at,
            PaymentEvent::PaymentVerified(e) => e.occurred_at,
            PaymentEvent::PaymentRejected(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Payment {
    type Command = PaymentCommand;
    type Event = PaymentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PaymentEvent::PaymentRecorded(e) => {
                self.id = e.payment_id;
                self.document_id = Some(e.document_id);
                self.order_id = Some(e.order_id);
                self.amount = e.amount;
                self.method = e.method;
                self.payer = e.payer.clone();
                self.paid_on = Some(e.paid_on);
                self.due_on = e.due_on;
                self.note = e.note.clone();
                self.state = PaymentState::Pending;
                self.recorded_by = Some(e.recorded_by);
                self.recorded_at = Some(e.occurred_at);
                self.created = true;
            }
            PaymentEvent::PaymentVerified(e) => {
                self.state = PaymentState::Verified;
                self.verified_by = Some(e.verified_by);
                self.verified_at = Some(e.occurred_at);
                self.verification_note = e.note.clone();
            }
            PaymentEvent::PaymentRejected(e) => {
                self.state = PaymentState::Rejected;
                self.verified_by = Some(e.rejected_by);
                self.verified_at = Some(e.occurred_at);
                self.verification_note = e.note.clone();
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PaymentCommand::RecordPayment(cmd) => self.handle_record(cmd),
            PaymentCommand::VerifyPayment(cmd) => self.handle_verify(cmd),
        }
    }
}

impl Payment {
    fn ensure_payment_id(&self, payment_id: PaymentId) -> Result<(), DomainError> {
        if self.id != payment_id {
            return Err(DomainError::invariant("payment_id mismatch"));
        }
        Ok(())
    }

    fn handle_record(&self, cmd: &RecordPayment) -> Result<Vec<PaymentEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("payment already exists"));
        }
        self.ensure_payment_id(cmd.payment_id)?;

        if cmd.amount <= 0 {
            return Err(DomainError::validation("amount must be positive"));
        }
        if let Some(due) = cmd.due_on {
            if due < cmd.paid_on {
                return Err(DomainError::validation("due date cannot precede payment date"));
            }
        }

        Ok(vec![PaymentEvent::PaymentRecorded(PaymentRecorded {
            payment_id: cmd.payment_id,
            document_id: cmd.document_id,
            order_id: cmd.order_id,
            amount: cmd.amount,
            method: cmd.method,
            payer: cmd.payer.clone(),
            paid_on: cmd.paid_on,
            due_on: cmd.due_on,
            note: cmd.note.clone(),
            recorded_by: cmd.recorded_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_verify(&self, cmd: &VerifyPayment) -> Result<Vec<PaymentEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found("payment", self.id));
        }
        self.ensure_payment_id(cmd.payment_id)?;

        let target = match cmd.decision {
            PaymentDecision::Verified => PaymentState::Verified,
            PaymentDecision::Rejected => PaymentState::Rejected,
        };
        if self.state != PaymentState::Pending {
            return Err(DomainError::invalid_transition("payment", self.state, target));
        }

        let event = match cmd.decision {
            PaymentDecision::Verified => PaymentEvent::PaymentVerified(PaymentVerified {
                payment_id: cmd.payment_id,
                verified_by: cmd.verified_by,
                note: cmd.note.clone(),
                occurred_at: cmd.occurred_at,
            }),
            PaymentDecision::Rejected => PaymentEvent::PaymentRejected(PaymentRejected {
                payment_id: cmd.payment_id,
                rejected_by: cmd.verified_by,
                note: cmd.note.clone(),
                occurred_at: cmd.occurred_at,
            }),
        };
        Ok(vec![event])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sawit_core::AggregateId;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn record_cmd(payment_id: PaymentId, amount: i64) -> PaymentCommand {
        PaymentCommand::RecordPayment(RecordPayment {
            payment_id,
            document_id: SalesDocumentId::generate(),
            order_id: PurchaseOrderId::generate(),
            amount,
            method: PaymentTerms::Transfer,
            payer: PayerDetails {
                bank: Some("BRI".to_string()),
                account_number: Some("0123456789".to_string()),
                account_name: Some("PT Sawit Makmur".to_string()),
            },
            paid_on: NaiveDate::from_ymd_opt(2024, 3, 8).unwrap(),
            due_on: None,
            note: None,
            recorded_by: UserId::new(),
            occurred_at: test_time(),
        })
    }

    fn recorded(amount: i64) -> Payment {
        let id = PaymentId::new(AggregateId::new());
        let mut payment = Payment::empty(id);
        payment.execute(&record_cmd(id, amount)).unwrap();
        payment
    }

    fn verify(payment: &Payment, decision: PaymentDecision) -> PaymentCommand {
        PaymentCommand::VerifyPayment(VerifyPayment {
            payment_id: payment.id_typed(),
            decision,
            note: Some("checked against statement".to_string()),
            verified_by: UserId::new(),
            occurred_at: test_time(),
        })
    }

    #[test]
    fn recorded_payment_is_pending() {
        let payment = recorded(720_000);
        assert_eq!(payment.state(), PaymentState::Pending);
        assert_eq!(PaymentStatus::from_latest(Some(&payment)), PaymentStatus::Pending);
    }

    #[test]
    fn no_payment_means_unpaid() {
        assert_eq!(PaymentStatus::from_latest(None), PaymentStatus::Unpaid);
    }

    #[test]
    fn non_positive_amount_is_rejected() {
        let id = PaymentId::generate();
        let payment = Payment::empty(id);
        let err = payment.handle(&record_cmd(id, 0)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn verification_records_verifier() {
        let mut payment = recorded(720_000);
        payment.execute(&verify(&payment, PaymentDecision::Verified)).unwrap();
        assert_eq!(payment.state(), PaymentState::Verified);
        assert!(payment.verified_by().is_some());
        assert!(payment.verified_at().is_some());
    }

    #[test]
    fn decided_payment_cannot_be_decided_again() {
        let mut payment = recorded(720_000);
        payment.execute(&verify(&payment, PaymentDecision::Rejected)).unwrap();
        assert_eq!(PaymentStatus::from_latest(Some(&payment)), PaymentStatus::Rejected);

        let err = payment
            .handle(&verify(&payment, PaymentDecision::Verified))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { entity: "payment", .. }));
    }
}
