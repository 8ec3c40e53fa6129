use thiserror::Error;

use crate::domain::request::RequestStatus;
use crate::domain::unit::UnitStatus;

/// Business-rule failures. The HTTP layer owns the status-code mapping;
/// everything here is transport-agnostic.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("unit is not available for use (status {status:?})")]
    UnitUnavailable { status: UnitStatus },
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i64, available: i64 },
    #[error("request was already decided (status {status:?})")]
    AlreadyDecided { status: RequestStatus },
    #[error("quantity must be at least 1, got {0}")]
    InvalidQuantity(i64),
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("operation requires the ADMIN role")]
    AdminRequired,
    #[error("only the requester or an admin may perform this operation")]
    NotRequestOwner,
}

impl DomainError {
    /// Precondition failures are retryable from the client's point of view
    /// once the world changes; authorization failures are not.
    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::AdminRequired | Self::NotRequestOwner)
    }
}

#[cfg(test)]
mod tests {
    use super::DomainError;
    use crate::domain::request::RequestStatus;
    use crate::domain::unit::UnitStatus;

    #[test]
    fn messages_name_the_violated_rule() {
        let error = DomainError::InsufficientStock { requested: 5, available: 2 };
        assert_eq!(error.to_string(), "insufficient stock: requested 5, available 2");

        let error = DomainError::UnitUnavailable { status: UnitStatus::Maintenance };
        assert!(error.to_string().contains("Maintenance"));

        let error = DomainError::AlreadyDecided { status: RequestStatus::Approved };
        assert!(error.to_string().contains("Approved"));
    }

    #[test]
    fn authorization_failures_are_distinguished() {
        assert!(DomainError::AdminRequired.is_authorization());
        assert!(DomainError::NotRequestOwner.is_authorization());
        assert!(!DomainError::InvalidQuantity(0).is_authorization());
    }
}
