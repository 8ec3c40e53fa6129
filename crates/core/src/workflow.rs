//! Pure decision logic for the request workflow. Nothing here touches
//! storage: the db crate applies outcomes atomically and re-asserts the
//! guards inside the transaction.

use serde::{Deserialize, Serialize};

use crate::domain::request::{Decision, RequestStatus};
use crate::domain::unit::UnitStatus;
use crate::domain::user::{Principal, UserId};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestKind {
    Usage,
    Maintenance,
}

/// The target unit as observed when a rule is checked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnitSnapshot {
    pub status: UnitStatus,
    pub quantity: i64,
}

/// Inventory side effect an approval carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockEffect {
    None,
    /// Usage approval: decrement by the requested quantity, floor at zero.
    Decrement { quantity: i64 },
    /// Maintenance approval: the unit leaves circulation.
    MarkMaintenance,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub effect: StockEffect,
}

/// Creation rule for usage requests: the unit must currently be AVAILABLE
/// and hold enough stock.
pub fn validate_usage_creation(unit: UnitSnapshot, quantity: i64) -> Result<(), DomainError> {
    if quantity < 1 {
        return Err(DomainError::InvalidQuantity(quantity));
    }
    if unit.status != UnitStatus::Available {
        return Err(DomainError::UnitUnavailable { status: unit.status });
    }
    if quantity > unit.quantity {
        return Err(DomainError::InsufficientStock { requested: quantity, available: unit.quantity });
    }
    Ok(())
}

/// Creation rule for maintenance requests: any unit status qualifies, but a
/// reason is mandatory.
pub fn validate_maintenance_creation(reason: &str) -> Result<(), DomainError> {
    if reason.trim().is_empty() {
        return Err(DomainError::EmptyField("reason"));
    }
    Ok(())
}

/// Only admins decide.
pub fn authorize_decider(principal: &Principal) -> Result<(), DomainError> {
    if principal.is_admin() {
        Ok(())
    } else {
        Err(DomainError::AdminRequired)
    }
}

/// Deletion is for the requester or an admin.
pub fn authorize_request_deletion(
    principal: &Principal,
    owner: &UserId,
) -> Result<(), DomainError> {
    if principal.may_act_for(owner) {
        Ok(())
    } else {
        Err(DomainError::NotRequestOwner)
    }
}

/// The state machine: PENDING -> APPROVED | REJECTED, both terminal.
pub fn decide(
    kind: RequestKind,
    current: RequestStatus,
    decision: Decision,
    quantity: i64,
) -> Result<DecisionOutcome, DomainError> {
    if current != RequestStatus::Pending {
        return Err(DomainError::AlreadyDecided { status: current });
    }

    let effect = match (kind, decision) {
        (RequestKind::Usage, Decision::Approved) => StockEffect::Decrement { quantity },
        (RequestKind::Maintenance, Decision::Approved) => StockEffect::MarkMaintenance,
        (_, Decision::Rejected) => StockEffect::None,
    };

    Ok(DecisionOutcome { from: current, to: decision.as_status(), effect })
}

/// Status rule after an approved decrement: AVAILABLE while stock remains,
/// USED the moment quantity reaches zero.
pub fn status_after_decrement(current: UnitStatus, remaining: i64) -> UnitStatus {
    if remaining == 0 && current == UnitStatus::Available {
        UnitStatus::Used
    } else {
        current
    }
}
