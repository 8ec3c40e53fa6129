//! Read side of the request workflow. Both request kinds live here because
//! they share the same join shape; all writes go through the workflow store,
//! which owns the transactional state machine.

use sqlx::{sqlite::SqliteRow, Row};

use stockroom_core::domain::request::{
    MaintenanceRequest, MaintenanceRequestId, RequestStatus, UsageRequest, UsageRequestId,
};
use stockroom_core::domain::unit::UnitId;
use stockroom_core::domain::user::UserId;

use super::{
    parse_timestamp, MaintenanceRequestRepository, MaintenanceRequestView, RepositoryError,
    UsageRequestRepository, UsageRequestView,
};
use crate::DbPool;

pub struct SqlUsageRequestRepository {
    pool: DbPool,
}

impl SqlUsageRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub struct SqlMaintenanceRequestRepository {
    pool: DbPool,
}

impl SqlMaintenanceRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_status(raw: String) -> Result<RequestStatus, RepositoryError> {
    raw.parse::<RequestStatus>().map_err(RepositoryError::Decode)
}

pub(crate) fn usage_request_from_row(row: &SqliteRow) -> Result<UsageRequest, RepositoryError> {
    Ok(UsageRequest {
        id: UsageRequestId(row.try_get("id")?),
        user_id: UserId(row.try_get("user_id")?),
        unit_id: UnitId(row.try_get("unit_id")?),
        quantity: row.try_get("quantity")?,
        status: parse_status(row.try_get("status")?)?,
        reason: row.try_get("reason")?,
        remark: row.try_get("remark")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

pub(crate) fn maintenance_request_from_row(
    row: &SqliteRow,
) -> Result<MaintenanceRequest, RepositoryError> {
    Ok(MaintenanceRequest {
        id: MaintenanceRequestId(row.try_get("id")?),
        user_id: UserId(row.try_get("user_id")?),
        unit_id: UnitId(row.try_get("unit_id")?),
        reason: row.try_get("reason")?,
        status: parse_status(row.try_get("status")?)?,
        remark: row.try_get("remark")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

pub(crate) fn usage_view_from_row(row: &SqliteRow) -> Result<UsageRequestView, RepositoryError> {
    Ok(UsageRequestView {
        request: usage_request_from_row(row)?,
        requester_name: row.try_get("requester_name")?,
        item_name: row.try_get("item_name")?,
        serial_number: row.try_get("serial_number")?,
    })
}

pub(crate) fn maintenance_view_from_row(
    row: &SqliteRow,
) -> Result<MaintenanceRequestView, RepositoryError> {
    Ok(MaintenanceRequestView {
        request: maintenance_request_from_row(row)?,
        requester_name: row.try_get("requester_name")?,
        item_name: row.try_get("item_name")?,
        serial_number: row.try_get("serial_number")?,
    })
}

// The unit join is LEFT because unit_id is a soft reference: a decided
// request outlives the unit it was raised against.
pub(crate) const USAGE_VIEW_QUERY: &str = "SELECT r.id, r.user_id, r.unit_id, r.quantity, r.status, r.reason, r.remark,
            r.created_at, r.updated_at,
            u.name AS requester_name, i.name AS item_name, s.serial_number
     FROM usage_request r
     JOIN user u ON u.id = r.user_id
     LEFT JOIN unit s ON s.id = r.unit_id
     LEFT JOIN item i ON i.id = s.item_id";

pub(crate) const MAINTENANCE_VIEW_QUERY: &str = "SELECT r.id, r.user_id, r.unit_id, r.reason, r.status, r.remark,
            r.created_at, r.updated_at,
            u.name AS requester_name, i.name AS item_name, s.serial_number
     FROM maintenance_request r
     JOIN user u ON u.id = r.user_id
     LEFT JOIN unit s ON s.id = r.unit_id
     LEFT JOIN item i ON i.id = s.item_id";

#[async_trait::async_trait]
impl UsageRequestRepository for SqlUsageRequestRepository {
    async fn find_by_id(
        &self,
        id: &UsageRequestId,
    ) -> Result<Option<UsageRequest>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, user_id, unit_id, quantity, status, reason, remark,
                    created_at, updated_at
             FROM usage_request WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(usage_request_from_row).transpose()
    }

    async fn list(
        &self,
        user: Option<&UserId>,
        status: Option<RequestStatus>,
    ) -> Result<Vec<UsageRequestView>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{USAGE_VIEW_QUERY}
             WHERE (?1 IS NULL OR r.user_id = ?1)
               AND (?2 IS NULL OR r.status = ?2)
             ORDER BY r.created_at DESC"
        ))
        .bind(user.map(|id| id.0.clone()))
        .bind(status.map(|status| status.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(usage_view_from_row).collect()
    }
}

#[async_trait::async_trait]
impl MaintenanceRequestRepository for SqlMaintenanceRequestRepository {
    async fn find_by_id(
        &self,
        id: &MaintenanceRequestId,
    ) -> Result<Option<MaintenanceRequest>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, user_id, unit_id, reason, status, remark, created_at, updated_at
             FROM maintenance_request WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(maintenance_request_from_row).transpose()
    }

    async fn list(
        &self,
        user: Option<&UserId>,
        status: Option<RequestStatus>,
    ) -> Result<Vec<MaintenanceRequestView>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{MAINTENANCE_VIEW_QUERY}
             WHERE (?1 IS NULL OR r.user_id = ?1)
               AND (?2 IS NULL OR r.status = ?2)
             ORDER BY r.created_at DESC"
        ))
        .bind(user.map(|id| id.0.clone()))
        .bind(status.map(|status| status.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(maintenance_view_from_row).collect()
    }
}
