use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::item::ItemId;
use crate::domain::unit::UnitId;
use crate::domain::user::UserId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivityLogId(pub String);

impl ActivityLogId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

impl std::fmt::Display for ActivityLogId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionCode {
    CreateCategory,
    UpdateCategory,
    DeleteCategory,
    CreateItem,
    UpdateItem,
    DeleteItem,
    CreateUnit,
    AdjustStock,
    DeleteUnit,
    RequestUsage,
    RequestMaintenance,
    ApproveUsage,
    RejectUsage,
    ApproveMaintenance,
    RejectMaintenance,
    DeleteUsageRequest,
    DeleteMaintenanceRequest,
}

impl ActionCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateCategory => "CREATE_CATEGORY",
            Self::UpdateCategory => "UPDATE_CATEGORY",
            Self::DeleteCategory => "DELETE_CATEGORY",
            Self::CreateItem => "CREATE_ITEM",
            Self::UpdateItem => "UPDATE_ITEM",
            Self::DeleteItem => "DELETE_ITEM",
            Self::CreateUnit => "CREATE_UNIT",
            Self::AdjustStock => "ADJUST_STOCK",
            Self::DeleteUnit => "DELETE_UNIT",
            Self::RequestUsage => "REQUEST_USAGE",
            Self::RequestMaintenance => "REQUEST_MAINTENANCE",
            Self::ApproveUsage => "APPROVE_USAGE",
            Self::RejectUsage => "REJECT_USAGE",
            Self::ApproveMaintenance => "APPROVE_MAINTENANCE",
            Self::RejectMaintenance => "REJECT_MAINTENANCE",
            Self::DeleteUsageRequest => "DELETE_USAGE_REQUEST",
            Self::DeleteMaintenanceRequest => "DELETE_MAINTENANCE_REQUEST",
        }
    }
}

impl std::str::FromStr for ActionCode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "CREATE_CATEGORY" => Ok(Self::CreateCategory),
            "UPDATE_CATEGORY" => Ok(Self::UpdateCategory),
            "DELETE_CATEGORY" => Ok(Self::DeleteCategory),
            "CREATE_ITEM" => Ok(Self::CreateItem),
            "UPDATE_ITEM" => Ok(Self::UpdateItem),
            "DELETE_ITEM" => Ok(Self::DeleteItem),
            "CREATE_UNIT" => Ok(Self::CreateUnit),
            "ADJUST_STOCK" => Ok(Self::AdjustStock),
            "DELETE_UNIT" => Ok(Self::DeleteUnit),
            "REQUEST_USAGE" => Ok(Self::RequestUsage),
            "REQUEST_MAINTENANCE" => Ok(Self::RequestMaintenance),
            "APPROVE_USAGE" => Ok(Self::ApproveUsage),
            "REJECT_USAGE" => Ok(Self::RejectUsage),
            "APPROVE_MAINTENANCE" => Ok(Self::ApproveMaintenance),
            "REJECT_MAINTENANCE" => Ok(Self::RejectMaintenance),
            "DELETE_USAGE_REQUEST" => Ok(Self::DeleteUsageRequest),
            "DELETE_MAINTENANCE_REQUEST" => Ok(Self::DeleteMaintenanceRequest),
            other => Err(format!("unknown action code `{other}`")),
        }
    }
}

/// Append-only audit record. Item/unit references are soft so entries
/// survive deletion of what they describe.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub id: ActivityLogId,
    pub user_id: UserId,
    pub action: ActionCode,
    pub detail: String,
    pub item_id: Option<ItemId>,
    pub unit_id: Option<UnitId>,
    pub recorded_at: DateTime<Utc>,
}

impl ActivityLogEntry {
    pub fn new(user_id: UserId, action: ActionCode, detail: impl Into<String>) -> Self {
        Self {
            id: ActivityLogId::generate(),
            user_id,
            action,
            detail: detail.into(),
            item_id: None,
            unit_id: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_item(mut self, item_id: ItemId) -> Self {
        self.item_id = Some(item_id);
        self
    }

    pub fn with_unit(mut self, unit_id: UnitId) -> Self {
        self.unit_id = Some(unit_id);
        self
    }
}
