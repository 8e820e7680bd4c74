use thiserror::Error;

use sawit_core::DomainError;

use crate::store::StoreError;

/// Error returned by every [`FulfillmentService`](super::FulfillmentService)
/// operation.
///
/// Lost optimistic-concurrency races surface as
/// [`DomainError::StoreConflict`] so callers see one error kind for "someone
/// else changed this record first", whichever layer detected it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FulfillmentError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(StoreError),
}

impl FulfillmentError {
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            FulfillmentError::Domain(err) => Some(err),
            FulfillmentError::Store(_) => None,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            FulfillmentError::Domain(err) => err.code(),
            FulfillmentError::Store(StoreError::Duplicate(_)) => "DUPLICATE",
            FulfillmentError::Store(_) => "STORE_FAILURE",
        }
    }
}

impl From<StoreError> for FulfillmentError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => FulfillmentError::Domain(DomainError::StoreConflict(msg)),
            other => FulfillmentError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_conflict_becomes_domain_conflict() {
        let err = FulfillmentError::from(StoreError::Conflict("lot v3".into()));
        assert_eq!(err.code(), "STORE_CONFLICT");
        assert!(matches!(err.domain(), Some(DomainError::StoreConflict(_))));
    }

    #[test]
    fn backend_failures_stay_store_errors() {
        let err = FulfillmentError::from(StoreError::Backend("down".into()));
        assert_eq!(err.code(), "STORE_FAILURE");
        assert!(err.domain().is_none());
    }
}
