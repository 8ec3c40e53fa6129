use sqlx::{sqlite::SqliteRow, Row};

use stockroom_core::domain::item::ItemId;
use stockroom_core::domain::unit::{Unit, UnitId, UnitStatus};

use super::{parse_timestamp, RepositoryError, UnitRepository};
use crate::DbPool;

pub struct SqlUnitRepository {
    pool: DbPool,
}

impl SqlUnitRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn unit_from_row(row: &SqliteRow) -> Result<Unit, RepositoryError> {
    let raw_status: String = row.try_get("status")?;
    Ok(Unit {
        id: UnitId(row.try_get("id")?),
        item_id: ItemId(row.try_get("item_id")?),
        serial_number: row.try_get("serial_number")?,
        status: raw_status.parse::<UnitStatus>().map_err(RepositoryError::Decode)?,
        quantity: row.try_get("quantity")?,
        low_stock_threshold: row.try_get("low_stock_threshold")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

const UNIT_COLUMNS: &str =
    "id, item_id, serial_number, status, quantity, low_stock_threshold, created_at, updated_at";

#[async_trait::async_trait]
impl UnitRepository for SqlUnitRepository {
    async fn find_by_id(&self, id: &UnitId) -> Result<Option<Unit>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {UNIT_COLUMNS} FROM unit WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(unit_from_row).transpose()
    }

    async fn list(
        &self,
        item: Option<&ItemId>,
        status: Option<UnitStatus>,
    ) -> Result<Vec<Unit>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {UNIT_COLUMNS} FROM unit
             WHERE (?1 IS NULL OR item_id = ?1)
               AND (?2 IS NULL OR status = ?2)
             ORDER BY serial_number ASC"
        ))
        .bind(item.map(|id| id.0.clone()))
        .bind(status.map(|status| status.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(unit_from_row).collect()
    }

    async fn list_low_stock(&self) -> Result<Vec<Unit>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {UNIT_COLUMNS} FROM unit
             WHERE status = 'AVAILABLE' AND quantity <= low_stock_threshold
             ORDER BY quantity ASC, serial_number ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(unit_from_row).collect()
    }

    async fn save(&self, unit: Unit) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO unit (id, item_id, serial_number, status, quantity,
                               low_stock_threshold, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 item_id = excluded.item_id,
                 serial_number = excluded.serial_number,
                 status = excluded.status,
                 quantity = excluded.quantity,
                 low_stock_threshold = excluded.low_stock_threshold,
                 updated_at = excluded.updated_at",
        )
        .bind(&unit.id.0)
        .bind(&unit.item_id.0)
        .bind(&unit.serial_number)
        .bind(unit.status.as_str())
        .bind(unit.quantity)
        .bind(unit.low_stock_threshold)
        .bind(unit.created_at.to_rfc3339())
        .bind(unit.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: &UnitId) -> Result<u64, RepositoryError> {
        // The guard lives in the statement so the check and the delete are one
        // atomic step; 0 rows means the unit is missing or still referenced by
        // a PENDING or APPROVED request. Rejected requests keep their soft
        // reference and do not block.
        let result = sqlx::query(
            "DELETE FROM unit
             WHERE id = ?1
               AND NOT EXISTS (
                   SELECT 1 FROM usage_request
                   WHERE unit_id = ?1 AND status IN ('PENDING', 'APPROVED'))
               AND NOT EXISTS (
                   SELECT 1 FROM maintenance_request
                   WHERE unit_id = ?1 AND status IN ('PENDING', 'APPROVED'))",
        )
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
