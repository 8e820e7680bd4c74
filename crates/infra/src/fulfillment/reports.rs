//! Sales reporting over issued documents, and the per-role dashboard.

use std::collections::BTreeMap;

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use sawit_core::{Actor, Grade, Role};
use sawit_events::AuditSink;
use sawit_orders::{OrderStatus, PurchaseOrder};
use sawit_settlement::SalesDocument;
use sawit_stock::LotStatus;

use crate::store::{DocumentFilter, LotFilter, OrderFilter, Store};

use super::{FulfillmentError, FulfillmentService};

/// Delivered kilograms per observed grade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeBreakdown {
    pub a: i64,
    pub b: i64,
    pub c: i64,
}

impl GradeBreakdown {
    fn add(&mut self, grade: Grade, kg: i64) {
        match grade {
            Grade::A => self.a += kg,
            Grade::B => self.b += kg,
            Grade::C => self.c += kg,
        }
    }
}

/// Sales of one document day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySales {
    pub day: NaiveDate,
    pub documents: u32,
    pub total_kg: i64,
    /// Sum of final totals, after grade adjustments.
    pub revenue: i64,
    /// Mean contracted unit price, rounded half away from zero.
    pub average_unit_price: i64,
    pub kg_by_grade: GradeBreakdown,
}

#[derive(Default)]
struct DayTotals {
    documents: u32,
    total_kg: i64,
    revenue: i64,
    unit_price_sum: i128,
    kg_by_grade: GradeBreakdown,
}

/// Fold documents into one row per document day, newest day first.
pub fn summarize(documents: &[SalesDocument]) -> Vec<DailySales> {
    let mut days: BTreeMap<NaiveDate, DayTotals> = BTreeMap::new();

    for doc in documents {
        let totals = days.entry(doc.document_date()).or_default();
        totals.documents += 1;
        totals.total_kg += doc.net_kg();
        totals.revenue += doc.final_total();
        totals.unit_price_sum += i128::from(doc.unit_price());
        totals.kg_by_grade.add(doc.observed_grade(), doc.net_kg());
    }

    days.into_iter()
        .rev()
        .map(|(day, t)| DailySales {
            day,
            documents: t.documents,
            total_kg: t.total_kg,
            revenue: t.revenue,
            average_unit_price: average(t.unit_price_sum, t.documents),
            kg_by_grade: t.kg_by_grade,
        })
        .collect()
}

fn average(sum: i128, count: u32) -> i64 {
    if count == 0 {
        return 0;
    }
    let n = i128::from(count);
    let rounded = if sum >= 0 {
        (2 * sum + n) / (2 * n)
    } else {
        -((-2 * sum + n) / (2 * n))
    };
    i64::try_from(rounded).unwrap_or(if rounded > 0 { i64::MAX } else { i64::MIN })
}

/// A buyer's own orders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerStats {
    pub total_orders: u32,
    pub pending_orders: u32,
    pub approved_orders: u32,
    pub completed_orders: u32,
    /// Contracted totals of completed orders.
    pub total_spent: i64,
}

impl BuyerStats {
    fn from_orders(orders: &[PurchaseOrder]) -> Self {
        let mut stats = Self {
            total_orders: count(orders.len()),
            ..Self::default()
        };
        for order in orders {
            match order.status() {
                OrderStatus::Pending => stats.pending_orders += 1,
                OrderStatus::Approved => stats.approved_orders += 1,
                OrderStatus::Completed => {
                    stats.completed_orders += 1;
                    stats.total_spent += order.total_price();
                }
                OrderStatus::Loading | OrderStatus::Rejected | OrderStatus::Cancelled => {}
            }
        }
        stats
    }
}

/// Back-office overview.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminStats {
    pub available_lots: u32,
    pub pending_orders: u32,
    /// Final totals of documents dated in the current business month.
    pub revenue_month: i64,
}

/// Dashboard figures; buyers see their own orders, staff see the whole yard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum DashboardStats {
    Buyer(BuyerStats),
    Admin(AdminStats),
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// First and last day of the month `day` falls in.
fn month_of(day: NaiveDate) -> (NaiveDate, Option<NaiveDate>) {
    let first = day.with_day(1).unwrap_or(day);
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt());
    (first, last)
}

impl<S, A> FulfillmentService<S, A>
where
    S: Store,
    A: AuditSink,
{
    /// Daily sales between two document days, both inclusive, newest day
    /// first. Open ends are unbounded.
    pub fn daily_sales(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<DailySales>, FulfillmentError> {
        let documents = self.documents(&DocumentFilter::between(from, to))?;
        Ok(summarize(&documents))
    }

    /// Dashboard for `actor`. Operators get the admin view.
    pub fn dashboard_stats(&self, actor: &Actor) -> Result<DashboardStats, FulfillmentError> {
        let today = self.business_day(self.clock.now());

        self.store.transaction(|uow| -> Result<_, FulfillmentError> {
            match actor.role {
                Role::Buyer => {
                    let orders = uow.orders(&OrderFilter {
                        buyer: Some(actor.user_id),
                        ..OrderFilter::default()
                    })?;
                    Ok(DashboardStats::Buyer(BuyerStats::from_orders(&orders)))
                }
                Role::Admin | Role::Operator => {
                    let available_lots = uow.lots(&LotFilter {
                        status: Some(LotStatus::Available),
                        ..LotFilter::default()
                    })?;
                    let pending_orders = uow.orders(&OrderFilter {
                        status: Some(OrderStatus::Pending),
                        ..OrderFilter::default()
                    })?;
                    let (first, last) = month_of(today);
                    let documents = uow.documents(&DocumentFilter::between(Some(first), last))?;

                    Ok(DashboardStats::Admin(AdminStats {
                        available_lots: count(available_lots.len()),
                        pending_orders: count(pending_orders.len()),
                        revenue_month: documents.iter().map(SalesDocument::final_total).sum(),
                    }))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn average_rounds_half_away_from_zero() {
        assert_eq!(average(3, 2), 2);
        assert_eq!(average(5, 4), 1);
        assert_eq!(average(2_000, 3), 667);
        assert_eq!(average(0, 0), 0);
    }

    #[test]
    fn month_bounds_cover_the_whole_month() {
        let day = |m, d| NaiveDate::from_ymd_opt(2024, m, d).unwrap();
        assert_eq!(month_of(day(2, 14)), (day(2, 1), Some(day(2, 29))));
        assert_eq!(month_of(day(12, 31)), (day(12, 1), Some(day(12, 31))));
    }

    #[test]
    fn breakdown_accumulates_per_grade() {
        let mut breakdown = GradeBreakdown::default();
        breakdown.add(Grade::A, 800);
        breakdown.add(Grade::C, 200);
        breakdown.add(Grade::A, 100);
        assert_eq!(
            breakdown,
            GradeBreakdown {
                a: 900,
                b: 0,
                c: 200
            }
        );
    }

    proptest! {
        #[test]
        fn average_is_within_half_a_rupiah(sum in -1_000_000_000i128..1_000_000_000, count in 1u32..500) {
            let avg = i128::from(average(sum, count));
            let n = i128::from(count);
            prop_assert!((avg * n - sum).abs() * 2 <= n);
        }
    }
}
