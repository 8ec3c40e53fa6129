use sqlx::{sqlite::SqliteRow, Row};

use stockroom_core::domain::category::CategoryId;
use stockroom_core::domain::item::{Item, ItemId};

use super::{parse_timestamp, ItemRepository, RepositoryError};
use crate::DbPool;

pub struct SqlItemRepository {
    pool: DbPool,
}

impl SqlItemRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn item_from_row(row: &SqliteRow) -> Result<Item, RepositoryError> {
    Ok(Item {
        id: ItemId(row.try_get("id")?),
        name: row.try_get("name")?,
        category_id: CategoryId(row.try_get("category_id")?),
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[async_trait::async_trait]
impl ItemRepository for SqlItemRepository {
    async fn find_by_id(&self, id: &ItemId) -> Result<Option<Item>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, category_id, created_at, updated_at FROM item WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(item_from_row).transpose()
    }

    async fn list_with_unit_counts(
        &self,
        category: Option<&CategoryId>,
    ) -> Result<Vec<(Item, i64)>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT i.id, i.name, i.category_id, i.created_at, i.updated_at,
                    COUNT(u.id) AS unit_count
             FROM item i
             LEFT JOIN unit u ON u.item_id = i.id
             WHERE (?1 IS NULL OR i.category_id = ?1)
             GROUP BY i.id
             ORDER BY i.name ASC",
        )
        .bind(category.map(|id| id.0.clone()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let item = item_from_row(row)?;
                let unit_count: i64 = row.try_get("unit_count")?;
                Ok((item, unit_count))
            })
            .collect()
    }

    async fn save(&self, item: Item) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO item (id, name, category_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 category_id = excluded.category_id,
                 updated_at = excluded.updated_at",
        )
        .bind(&item.id.0)
        .bind(&item.name)
        .bind(&item.category_id.0)
        .bind(item.created_at.to_rfc3339())
        .bind(item.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: &ItemId) -> Result<u64, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM item WHERE id = ?").bind(&id.0).execute(&self.pool).await?;

        Ok(result.rows_affected())
    }

    async fn count_units(&self, id: &ItemId) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM unit WHERE item_id = ?")
            .bind(&id.0)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
