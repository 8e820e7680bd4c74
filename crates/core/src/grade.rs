//! Quality grade of harvested fruit.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_object::ValueObject;

/// Quality grade, best first.
///
/// Ordering follows quality: `A < B < C` in declaration order, so a *larger*
/// grade is a *worse* one. Use [`Grade::tiers_below`] rather than comparing
/// directly when the question is "how much worse".
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
}

impl Grade {
    pub const ALL: [Grade; 3] = [Grade::A, Grade::B, Grade::C];

    /// Zero-based quality tier (`A` = 0).
    pub fn tier(self) -> u8 {
        match self {
            Grade::A => 0,
            Grade::B => 1,
            Grade::C => 2,
        }
    }

    /// How many tiers `self` sits below `reference`. Zero when `self` is
    /// the same grade or better.
    pub fn tiers_below(self, reference: Grade) -> u8 {
        self.tier().saturating_sub(reference.tier())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
        }
    }
}

impl ValueObject for Grade {}

impl core::fmt::Display for Grade {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Grade {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" | "a" => Ok(Grade::A),
            "B" | "b" => Ok(Grade::B),
            "C" | "c" => Ok(Grade::C),
            other => Err(DomainError::validation(format!("unknown grade: {other:?}"))),
        }
    }
}
