//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, illegal transitions, stock and weighing rules). Infrastructure
/// concerns belong elsewhere; the only store-related kind here is
/// `StoreConflict`, which callers must be able to render like any other
/// business failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. non-positive quantity).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A lot, order, session, document or payment is absent.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Status change not permitted from the current state.
    #[error("invalid transition: {entity} cannot move from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// Requested quantity exceeds what the lot can still give.
    #[error("insufficient stock: requested {requested} kg, available {available} kg")]
    InsufficientStock { requested: i64, available: i64 },

    /// The lot exists but is not open for new orders.
    #[error("stock lot is not available (status: {status})")]
    StockUnavailable { status: String },

    /// A scale reading was rejected.
    #[error("invalid weight: {0}")]
    InvalidWeight(String),

    /// Weigh-out attempted before a usable weigh-in.
    #[error("inbound weight has not been recorded")]
    InboundMissing,

    /// The settlement step could not produce a sales document.
    #[error("settlement failed: {0}")]
    SettlementError(String),

    /// A concurrent update raced with this one (stale version).
    #[error("store conflict: {0}")]
    StoreConflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(entity: &'static str, id: impl core::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_transition(
        entity: &'static str,
        from: impl core::fmt::Display,
        to: impl core::fmt::Display,
    ) -> Self {
        Self::InvalidTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn invalid_weight(msg: impl Into<String>) -> Self {
        Self::InvalidWeight(msg.into())
    }

    pub fn settlement(msg: impl Into<String>) -> Self {
        Self::SettlementError(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::StoreConflict(msg.into())
    }

    /// Stable machine-readable code, suitable for API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "VALIDATION_ERROR",
            DomainError::InvariantViolation(_) => "INVARIANT_VIOLATION",
            DomainError::InvalidId(_) => "INVALID_ID",
            DomainError::NotFound { .. } => "NOT_FOUND",
            DomainError::InvalidTransition { .. } => "INVALID_TRANSITION",
            DomainError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            DomainError::StockUnavailable { .. } => "STOCK_UNAVAILABLE",
            DomainError::InvalidWeight(_) => "INVALID_WEIGHT",
            DomainError::InboundMissing => "INBOUND_MISSING",
            DomainError::SettlementError(_) => "SETTLEMENT_ERROR",
            DomainError::StoreConflict(_) => "STORE_CONFLICT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_user_facing_detail() {
        let err = DomainError::InsufficientStock {
            requested: 60,
            available: 40,
        };
        assert_eq!(
            err.to_string(),
            "insufficient stock: requested 60 kg, available 40 kg"
        );

        let err = DomainError::invalid_transition("purchase order", "completed", "cancelled");
        assert_eq!(
            err.to_string(),
            "invalid transition: purchase order cannot move from completed to cancelled"
        );
        assert_eq!(err.code(), "INVALID_TRANSITION");
    }

    #[test]
    fn not_found_names_the_entity() {
        let err = DomainError::not_found("stock lot", "42");
        assert_eq!(err.to_string(), "stock lot not found: 42");
        assert_eq!(err.code(), "NOT_FOUND");
    }
}
