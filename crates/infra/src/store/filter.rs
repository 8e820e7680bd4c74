//! Listing filters. Every field is optional; `None` means "any".

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use sawit_core::{Grade, UserId};
use sawit_orders::{OrderStatus, PurchaseOrder, PurchaseOrderId};
use sawit_settlement::{Payment, PaymentState, SalesDocument, SalesDocumentId};
use sawit_stock::{LotStatus, StockLot, StockLotId};
use sawit_weighing::{SessionStatus, WeighingSession};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotFilter {
    pub status: Option<LotStatus>,
    pub grade: Option<Grade>,
    /// Estate name, compared after trimming.
    pub estate: Option<String>,
}

impl LotFilter {
    pub fn matches(&self, lot: &StockLot) -> bool {
        self.status.is_none_or(|s| lot.status() == s)
            && self.grade.is_none_or(|g| lot.grade() == g)
            && self
                .estate
                .as_deref()
                .is_none_or(|e| lot.estate() == e.trim())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFilter {
    pub buyer: Option<UserId>,
    pub status: Option<OrderStatus>,
    pub lot_id: Option<StockLotId>,
}

impl OrderFilter {
    pub fn matches(&self, order: &PurchaseOrder) -> bool {
        self.buyer.is_none_or(|b| order.buyer() == Some(b))
            && self.status.is_none_or(|s| order.status() == s)
            && self.lot_id.is_none_or(|l| order.lot_id() == Some(l))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFilter {
    pub status: Option<SessionStatus>,
    pub order_id: Option<PurchaseOrderId>,
    /// Loading queue day (business calendar).
    pub loading_day: Option<NaiveDate>,
}

impl SessionFilter {
    /// The loading queue of one day.
    pub fn on_day(day: NaiveDate) -> Self {
        Self {
            loading_day: Some(day),
            ..Self::default()
        }
    }

    pub fn matches(&self, session: &WeighingSession) -> bool {
        self.status.is_none_or(|s| session.status() == s)
            && self.order_id.is_none_or(|o| session.order_id() == Some(o))
            && self
                .loading_day
                .is_none_or(|d| session.loading_day() == Some(d))
    }
}

/// Documents by order and/or document date range (both ends inclusive).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFilter {
    pub order_id: Option<PurchaseOrderId>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DocumentFilter {
    pub fn between(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self {
            order_id: None,
            from,
            to,
        }
    }

    pub fn matches(&self, document: &SalesDocument) -> bool {
        let day = document.document_date();
        self.order_id.is_none_or(|o| document.order_id() == o)
            && self.from.is_none_or(|f| day >= f)
            && self.to.is_none_or(|t| day <= t)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFilter {
    pub order_id: Option<PurchaseOrderId>,
    pub document_id: Option<SalesDocumentId>,
    pub state: Option<PaymentState>,
}

impl PaymentFilter {
    pub fn for_order(order_id: PurchaseOrderId) -> Self {
        Self {
            order_id: Some(order_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, payment: &Payment) -> bool {
        self.order_id.is_none_or(|o| payment.order_id() == Some(o))
            && self.document_id.is_none_or(|d| payment.document_id() == Some(d))
            && self.state.is_none_or(|s| payment.state() == s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sawit_weighing::WeighingSessionId;

    #[test]
    fn empty_filters_match_everything() {
        let lot = StockLot::empty(StockLotId::generate());
        assert!(LotFilter::default().matches(&lot));

        let order = PurchaseOrder::empty(PurchaseOrderId::generate());
        assert!(OrderFilter::default().matches(&order));

        let session = WeighingSession::empty(WeighingSessionId::generate());
        assert!(SessionFilter::default().matches(&session));
    }

    #[test]
    fn narrowing_filters_skip_unopened_records() {
        let lot = StockLot::empty(StockLotId::generate());
        let by_estate = LotFilter {
            estate: Some("Kebun Sei Mangkei".to_string()),
            ..LotFilter::default()
        };
        assert!(!by_estate.matches(&lot));

        let session = WeighingSession::empty(WeighingSessionId::generate());
        let day = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert!(!SessionFilter::on_day(day).matches(&session));
        let by_order = SessionFilter {
            order_id: Some(PurchaseOrderId::generate()),
            ..SessionFilter::default()
        };
        assert!(!by_order.matches(&session));
    }

    #[test]
    fn order_filter_on_buyer_excludes_uncreated_orders() {
        let order = PurchaseOrder::empty(PurchaseOrderId::generate());
        let filter = OrderFilter {
            buyer: Some(UserId::new()),
            ..OrderFilter::default()
        };
        assert!(!filter.matches(&order));
    }
}
