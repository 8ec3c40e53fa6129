use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::item::ItemId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitId(pub String);

impl UnitId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitStatus {
    Available,
    Used,
    Maintenance,
    Damaged,
}

impl UnitStatus {
    pub const ALL: [UnitStatus; 4] =
        [Self::Available, Self::Used, Self::Maintenance, Self::Damaged];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Used => "USED",
            Self::Maintenance => "MAINTENANCE",
            Self::Damaged => "DAMAGED",
        }
    }
}

impl std::str::FromStr for UnitStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "AVAILABLE" => Ok(Self::Available),
            "USED" => Ok(Self::Used),
            "MAINTENANCE" => Ok(Self::Maintenance),
            "DAMAGED" => Ok(Self::Damaged),
            other => Err(format!("unknown unit status `{other}`")),
        }
    }
}

/// A serialized/tracked instance of an inventory item. Quantity is never
/// negative; the workflow store enforces this with a guarded decrement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub item_id: ItemId,
    pub serial_number: String,
    pub status: UnitStatus,
    pub quantity: i64,
    pub low_stock_threshold: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Unit {
    pub fn is_low_stock(&self) -> bool {
        self.status == UnitStatus::Available && self.quantity <= self.low_stock_threshold
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{Unit, UnitId, UnitStatus};
    use crate::domain::item::ItemId;

    fn unit(status: UnitStatus, quantity: i64, threshold: i64) -> Unit {
        Unit {
            id: UnitId("unit-1".to_owned()),
            item_id: ItemId("item-1".to_owned()),
            serial_number: "LP001".to_owned(),
            status,
            quantity,
            low_stock_threshold: threshold,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn low_stock_requires_available_status() {
        assert!(unit(UnitStatus::Available, 2, 3).is_low_stock());
        assert!(!unit(UnitStatus::Maintenance, 2, 3).is_low_stock());
        assert!(!unit(UnitStatus::Available, 4, 3).is_low_stock());
    }

    #[test]
    fn status_round_trips_through_storage_form() {
        for status in UnitStatus::ALL {
            assert_eq!(status.as_str().parse::<UnitStatus>(), Ok(status));
        }
        assert!("BROKEN".parse::<UnitStatus>().is_err());
    }
}
