//! Sales documents issued at settlement.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use sawit_core::{DomainError, DomainResult, Entity, Grade, UserId};
use sawit_events::Event;
use sawit_orders::{PurchaseOrderId, daily_number};
use sawit_weighing::WeighingSessionId;

use crate::calculator::Settlement;

sawit_core::typed_aggregate_id!(
    /// Sales document identifier.
    SalesDocumentId
);

/// Record type name used for audit records and storage.
pub const RECORD_TYPE: &str = "settlement.sales_document";

/// Prefixes for the three numbers printed on a settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentPrefixes {
    pub delivery_note: String,
    pub invoice: String,
    pub weight_certificate: String,
}

impl Default for DocumentPrefixes {
    fn default() -> Self {
        Self {
            delivery_note: "SJ".to_string(),
            invoice: "INV".to_string(),
            weight_certificate: "BT".to_string(),
        }
    }
}

/// Delivery note, invoice and weight certificate numbers.
///
/// All three share one per-day counter, so a settlement can be looked up by
/// any of them and they always line up.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentNumbers {
    pub delivery_note: String,
    pub invoice: String,
    pub weight_certificate: String,
}

impl DocumentNumbers {
    pub fn for_day(prefixes: &DocumentPrefixes, day: NaiveDate, counter: u32) -> DomainResult<Self> {
        if counter == 0 {
            return Err(DomainError::settlement("document counter starts at 1"));
        }
        Ok(Self {
            delivery_note: daily_number(&prefixes.delivery_note, day, counter),
            invoice: daily_number(&prefixes.invoice, day, counter),
            weight_certificate: daily_number(&prefixes.weight_certificate, day, counter),
        })
    }
}

/// Input for [`SalesDocument::issue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueDocument {
    pub document_id: SalesDocumentId,
    pub order_id: PurchaseOrderId,
    pub session_id: WeighingSessionId,
    pub numbers: DocumentNumbers,
    pub document_date: NaiveDate,
    pub contracted_grade: Grade,
    pub observed_grade: Grade,
    pub settlement: Settlement,
    pub issued_by: UserId,
    pub issued_at: DateTime<Utc>,
}

/// Immutable settlement record. Exactly one per completed weighing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesDocument {
    id: SalesDocumentId,
    order_id: PurchaseOrderId,
    session_id: WeighingSessionId,
    numbers: DocumentNumbers,
    document_date: NaiveDate,
    net_kg: i64,
    unit_price: i64,
    contracted_grade: Grade,
    observed_grade: Grade,
    penalty_pct: u32,
    gross_total: i64,
    adjustment: i64,
    final_total: i64,
    issued_by: UserId,
    issued_at: DateTime<Utc>,
}

impl SalesDocument {
    pub fn issue(input: IssueDocument) -> DomainResult<Self> {
        let s = input.settlement;
        if s.final_total != s.gross_total + s.adjustment {
            return Err(DomainError::invariant(
                "final total must equal gross total plus adjustment",
            ));
        }
        Ok(Self {
            id: input.document_id,
            order_id: input.order_id,
            session_id: input.session_id,
            numbers: input.numbers,
            document_date: input.document_date,
            net_kg: s.net_kg,
            unit_price: s.unit_price,
            contracted_grade: input.contracted_grade,
            observed_grade: input.observed_grade,
            penalty_pct: s.penalty_pct,
            gross_total: s.gross_total,
            adjustment: s.adjustment,
            final_total: s.final_total,
            issued_by: input.issued_by,
            issued_at: input.issued_at,
        })
    }

    pub fn id_typed(&self) -> SalesDocumentId {
        self.id
    }

    pub fn order_id(&self) -> PurchaseOrderId {
        self.order_id
    }

    pub fn session_id(&self) -> WeighingSessionId {
        self.session_id
    }

    pub fn numbers(&self) -> &DocumentNumbers {
        &self.numbers
    }

    pub fn document_date(&self) -> NaiveDate {
        self.document_date
    }

    pub fn net_kg(&self) -> i64 {
        self.net_kg
    }

    pub fn unit_price(&self) -> i64 {
        self.unit_price
    }

    pub fn contracted_grade(&self) -> Grade {
        self.contracted_grade
    }

    pub fn observed_grade(&self) -> Grade {
        self.observed_grade
    }

    pub fn penalty_pct(&self) -> u32 {
        self.penalty_pct
    }

    pub fn gross_total(&self) -> i64 {
        self.gross_total
    }

    pub fn adjustment(&self) -> i64 {
        self.adjustment
    }

    pub fn final_total(&self) -> i64 {
        self.final_total
    }

    pub fn issued_by(&self) -> UserId {
        self.issued_by
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// The fact of issuance, for the activity log.
    pub fn issued_event(&self) -> DocumentIssued {
        DocumentIssued {
            document_id: self.id,
            order_id: self.order_id,
            session_id: self.session_id,
            numbers: self.numbers.clone(),
            net_kg: self.net_kg,
            final_total: self.final_total,
            occurred_at: self.issued_at,
        }
    }
}

impl Entity for SalesDocument {
    type Id = SalesDocumentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Event: DocumentIssued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentIssued {
    pub document_id: SalesDocumentId,
    pub order_id: PurchaseOrderId,
    pub session_id: WeighingSessionId,
    pub numbers: DocumentNumbers,
    pub net_kg: i64,
    pub final_total: i64,
    pub occurred_at: DateTime<Utc>,
}

impl Event for DocumentIssued {
    fn event_type(&self) -> &'static str {
        "settlement.sales_document.issued"
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}
