//! Grade-dependent price reconciliation.
//!
//! Pure arithmetic over whole rupiah and whole kilograms. Intermediate products
//! are computed in `i128` so that no realistic input can overflow before the
//! final range check.

use serde::{Deserialize, Serialize};

use sawit_core::{DomainError, DomainResult, Grade};

/// Penalty percentages keyed by how many grade tiers the observed fruit sits
/// below the contracted grade.
///
/// Index 0 is "same grade or better" and must be 0. Distances beyond the end of
/// the table use the last step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u32>", into = "Vec<u32>")]
pub struct GradePenaltyTable {
    steps: Vec<u32>,
}

impl GradePenaltyTable {
    pub fn new(steps: Vec<u32>) -> DomainResult<Self> {
        match steps.first() {
            None => return Err(DomainError::validation("penalty table cannot be empty")),
            Some(0) => {}
            Some(_) => {
                return Err(DomainError::validation(
                    "penalty for a matching grade must be 0",
                ));
            }
        }
        if steps.iter().any(|p| *p > 100) {
            return Err(DomainError::validation("penalty percent cannot exceed 100"));
        }
        if steps.windows(2).any(|w| w[1] < w[0]) {
            return Err(DomainError::validation(
                "penalty must not decrease as the grade gets worse",
            ));
        }
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[u32] {
        &self.steps
    }

    /// Penalty percent for delivering `observed` against a `contracted` grade.
    pub fn percent_for(&self, contracted: Grade, observed: Grade) -> u32 {
        let distance = usize::from(observed.tiers_below(contracted));
        self.steps
            .get(distance)
            .or_else(|| self.steps.last())
            .copied()
            .unwrap_or(0)
    }
}

impl Default for GradePenaltyTable {
    fn default() -> Self {
        Self {
            steps: vec![0, 10, 20],
        }
    }
}

impl TryFrom<Vec<u32>> for GradePenaltyTable {
    type Error = DomainError;

    fn try_from(steps: Vec<u32>) -> Result<Self, Self::Error> {
        Self::new(steps)
    }
}

impl From<GradePenaltyTable> for Vec<u32> {
    fn from(table: GradePenaltyTable) -> Self {
        table.steps
    }
}

/// Priced outcome of one weighing.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub net_kg: i64,
    pub unit_price: i64,
    pub penalty_pct: u32,
    pub gross_total: i64,
    /// Signed; zero or negative.
    pub adjustment: i64,
    pub final_total: i64,
}

/// Price a delivery.
///
/// - `gross = unit_price * net_kg`
/// - `adjustment = -round(gross * penalty% / 100)`, rounding half away from zero
/// - `final = gross + adjustment`
pub fn settle(
    table: &GradePenaltyTable,
    contracted: Grade,
    observed: Grade,
    unit_price: i64,
    net_kg: i64,
) -> DomainResult<Settlement> {
    if unit_price <= 0 {
        return Err(DomainError::settlement("unit price must be positive"));
    }
    if net_kg < 0 {
        return Err(DomainError::settlement("net weight cannot be negative"));
    }

    let penalty_pct = table.percent_for(contracted, observed);

    let gross = i128::from(unit_price) * i128::from(net_kg);
    let penalty = div_round_half_away(gross * i128::from(penalty_pct), 100);
    let adjustment = -penalty;
    let final_total = gross + adjustment;

    Ok(Settlement {
        net_kg,
        unit_price,
        penalty_pct,
        gross_total: to_rupiah(gross)?,
        adjustment: to_rupiah(adjustment)?,
        final_total: to_rupiah(final_total)?,
    })
}

fn div_round_half_away(numerator: i128, denominator: i128) -> i128 {
    let half = denominator / 2;
    if numerator >= 0 {
        (numerator + half) / denominator
    } else {
        (numerator - half) / denominator
    }
}

fn to_rupiah(value: i128) -> DomainResult<i64> {
    i64::try_from(value).map_err(|_| DomainError::settlement("amount out of range"))
}
