use sqlx::{sqlite::SqliteRow, Row};

use stockroom_core::domain::category::{Category, CategoryId};

use super::{parse_timestamp, CategoryRepository, RepositoryError};
use crate::DbPool;

/// A category plus the catalog sizes list endpoints display.
#[derive(Clone, Debug, PartialEq)]
pub struct CategoryWithCounts {
    pub category: Category,
    pub item_count: i64,
    pub unit_count: i64,
}

pub struct SqlCategoryRepository {
    pool: DbPool,
}

impl SqlCategoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn category_from_row(row: &SqliteRow) -> Result<Category, RepositoryError> {
    Ok(Category {
        id: CategoryId(row.try_get("id")?),
        name: row.try_get("name")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[async_trait::async_trait]
impl CategoryRepository for SqlCategoryRepository {
    async fn find_by_id(&self, id: &CategoryId) -> Result<Option<Category>, RepositoryError> {
        let row =
            sqlx::query("SELECT id, name, created_at, updated_at FROM category WHERE id = ?")
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        row.as_ref().map(category_from_row).transpose()
    }

    async fn list_with_counts(&self) -> Result<Vec<CategoryWithCounts>, RepositoryError> {
        // The unit join multiplies item rows, so the item count must be
        // DISTINCT while units count plainly.
        let rows = sqlx::query(
            "SELECT c.id, c.name, c.created_at, c.updated_at,
                    COUNT(DISTINCT i.id) AS item_count,
                    COUNT(u.id) AS unit_count
             FROM category c
             LEFT JOIN item i ON i.category_id = c.id
             LEFT JOIN unit u ON u.item_id = i.id
             GROUP BY c.id
             ORDER BY c.name ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(CategoryWithCounts {
                    category: category_from_row(row)?,
                    item_count: row.try_get("item_count")?,
                    unit_count: row.try_get("unit_count")?,
                })
            })
            .collect()
    }

    async fn save(&self, category: Category) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO category (id, name, created_at, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 updated_at = excluded.updated_at",
        )
        .bind(&category.id.0)
        .bind(&category.name)
        .bind(category.created_at.to_rfc3339())
        .bind(category.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: &CategoryId) -> Result<u64, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM category WHERE id = ?").bind(&id.0).execute(&self.pool).await?;

        Ok(result.rows_affected())
    }

    async fn count_items(&self, id: &CategoryId) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM item WHERE category_id = ?")
            .bind(&id.0)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use sqlx::error::ErrorKind;

    use stockroom_core::domain::category::{Category, CategoryId};
    use stockroom_core::domain::item::{Item, ItemId};
    use stockroom_core::domain::unit::{Unit, UnitId, UnitStatus};

    use super::SqlCategoryRepository;
    use crate::repositories::{
        CategoryRepository, ItemRepository, RepositoryError, SqlItemRepository, SqlUnitRepository,
        UnitRepository,
    };
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn sample_category(id: &str, name: &str) -> Category {
        let now = Utc::now();
        Category {
            id: CategoryId(id.to_string()),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    async fn insert_item(pool: &DbPool, id: &str, name: &str, category_id: &str) {
        let now = Utc::now();
        SqlItemRepository::new(pool.clone())
            .save(Item {
                id: ItemId(id.to_string()),
                name: name.to_string(),
                category_id: CategoryId(category_id.to_string()),
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("insert item");
    }

    async fn insert_unit(pool: &DbPool, id: &str, item_id: &str, serial: &str) {
        let now = Utc::now();
        SqlUnitRepository::new(pool.clone())
            .save(Unit {
                id: UnitId(id.to_string()),
                item_id: ItemId(item_id.to_string()),
                serial_number: serial.to_string(),
                status: UnitStatus::Available,
                quantity: 1,
                low_stock_threshold: 1,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("insert unit");
    }

    #[tokio::test]
    async fn list_orders_by_name_and_counts_items_and_units() {
        let pool = setup().await;
        let repo = SqlCategoryRepository::new(pool.clone());

        repo.save(sample_category("cat-2", "Printer")).await.expect("save printer");
        repo.save(sample_category("cat-1", "Laptop")).await.expect("save laptop");
        insert_item(&pool, "item-1", "ThinkPad X1", "cat-1").await;
        insert_item(&pool, "item-2", "MacBook Air", "cat-1").await;
        insert_unit(&pool, "unit-1", "item-1", "LP001").await;
        insert_unit(&pool, "unit-2", "item-1", "LP002").await;
        insert_unit(&pool, "unit-3", "item-2", "MB001").await;

        let listed = repo.list_with_counts().await.expect("list");
        let summary: Vec<(&str, i64, i64)> = listed
            .iter()
            .map(|entry| (entry.category.name.as_str(), entry.item_count, entry.unit_count))
            .collect();
        assert_eq!(summary, vec![("Laptop", 2, 3), ("Printer", 0, 0)]);
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected_by_the_schema() {
        let pool = setup().await;
        let repo = SqlCategoryRepository::new(pool);

        repo.save(sample_category("cat-1", "Laptop")).await.expect("save");
        let result = repo.save(sample_category("cat-2", "Laptop")).await;

        match result {
            Err(RepositoryError::Database(sqlx::Error::Database(error))) => {
                assert_eq!(error.kind(), ErrorKind::UniqueViolation);
            }
            other => panic!("expected unique violation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_is_blocked_while_items_reference_the_category() {
        let pool = setup().await;
        let repo = SqlCategoryRepository::new(pool.clone());

        repo.save(sample_category("cat-1", "Laptop")).await.expect("save");
        insert_item(&pool, "item-1", "ThinkPad X1", "cat-1").await;

        let result = repo.delete(&CategoryId("cat-1".to_string())).await;
        match result {
            Err(RepositoryError::Database(sqlx::Error::Database(error))) => {
                assert_eq!(error.kind(), ErrorKind::ForeignKeyViolation);
            }
            other => panic!("expected foreign key violation, got {other:?}"),
        }
        assert_eq!(repo.count_items(&CategoryId("cat-1".to_string())).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn delete_removes_an_empty_category() {
        let pool = setup().await;
        let repo = SqlCategoryRepository::new(pool);

        repo.save(sample_category("cat-1", "Laptop")).await.expect("save");
        assert_eq!(repo.delete(&CategoryId("cat-1".to_string())).await.expect("delete"), 1);
        assert!(repo.find_by_id(&CategoryId("cat-1".to_string())).await.expect("find").is_none());
        assert_eq!(repo.delete(&CategoryId("cat-1".to_string())).await.expect("redelete"), 0);
    }
}
