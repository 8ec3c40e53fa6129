use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use stockroom_core::domain::activity::{ActionCode, ActivityLogEntry, ActivityLogId};
use stockroom_core::domain::item::ItemId;
use stockroom_core::domain::unit::UnitId;
use stockroom_core::domain::user::UserId;

use super::{parse_timestamp, ActivityLogRepository, RepositoryError};
use crate::DbPool;

/// Filter for the admin listing. The range is half-open: `start <= t < end`.
#[derive(Clone, Debug)]
pub struct ActivityLogFilter {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub user_id: Option<UserId>,
    pub limit: u32,
}

impl Default for ActivityLogFilter {
    fn default() -> Self {
        Self { start: None, end: None, user_id: None, limit: 50 }
    }
}

/// A log entry joined with the acting user's display name.
#[derive(Clone, Debug, PartialEq)]
pub struct ActivityLogView {
    pub entry: ActivityLogEntry,
    pub user_name: String,
}

pub struct SqlActivityLogRepository {
    pool: DbPool,
}

impl SqlActivityLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn entry_from_row(row: &SqliteRow) -> Result<ActivityLogEntry, RepositoryError> {
    let raw_action: String = row.try_get("action")?;
    Ok(ActivityLogEntry {
        id: ActivityLogId(row.try_get("id")?),
        user_id: UserId(row.try_get("user_id")?),
        action: raw_action.parse::<ActionCode>().map_err(RepositoryError::Decode)?,
        detail: row.try_get("detail")?,
        item_id: row.try_get::<Option<String>, _>("item_id")?.map(ItemId),
        unit_id: row.try_get::<Option<String>, _>("unit_id")?.map(UnitId),
        recorded_at: parse_timestamp("recorded_at", row.try_get("recorded_at")?)?,
    })
}

fn view_from_row(row: &SqliteRow) -> Result<ActivityLogView, RepositoryError> {
    Ok(ActivityLogView { entry: entry_from_row(row)?, user_name: row.try_get("user_name")? })
}

#[async_trait::async_trait]
impl ActivityLogRepository for SqlActivityLogRepository {
    async fn append(&self, entry: ActivityLogEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO activity_log (id, user_id, action, detail, item_id, unit_id, recorded_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id.0)
        .bind(&entry.user_id.0)
        .bind(entry.action.as_str())
        .bind(&entry.detail)
        .bind(entry.item_id.as_ref().map(|id| id.0.clone()))
        .bind(entry.unit_id.as_ref().map(|id| id.0.clone()))
        .bind(entry.recorded_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(
        &self,
        filter: &ActivityLogFilter,
    ) -> Result<Vec<ActivityLogView>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT l.id, l.user_id, l.action, l.detail, l.item_id, l.unit_id, l.recorded_at,
                    u.name AS user_name
             FROM activity_log l
             JOIN user u ON u.id = l.user_id
             WHERE (?1 IS NULL OR l.recorded_at >= ?1)
               AND (?2 IS NULL OR l.recorded_at < ?2)
               AND (?3 IS NULL OR l.user_id = ?3)
             ORDER BY l.recorded_at DESC
             LIMIT ?4",
        )
        .bind(filter.start.map(|start| start.to_rfc3339()))
        .bind(filter.end.map(|end| end.to_rfc3339()))
        .bind(filter.user_id.as_ref().map(|id| id.0.clone()))
        .bind(filter.limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(view_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use stockroom_core::domain::activity::{ActionCode, ActivityLogEntry};
    use stockroom_core::domain::unit::UnitId;
    use stockroom_core::domain::user::{Role, User, UserId};

    use super::{ActivityLogFilter, SqlActivityLogRepository};
    use crate::repositories::{ActivityLogRepository, SqlUserRepository, UserRepository};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn seed_user(pool: &DbPool, id: &str, name: &str, email: &str) {
        let now = Utc::now();
        SqlUserRepository::new(pool.clone())
            .save(User {
                id: UserId(id.to_string()),
                name: name.to_string(),
                email: email.to_string(),
                password_hash: "$2b$10$hash".to_string(),
                role: Role::Admin,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("seed user");
    }

    async fn setup() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        seed_user(&pool, "u-1", "Admin", "admin@stockroom.local").await;
        pool
    }

    #[tokio::test]
    async fn append_and_list_round_trip_with_the_actor_name() {
        let pool = setup().await;
        let repo = SqlActivityLogRepository::new(pool);

        let entry = ActivityLogEntry::new(
            UserId("u-1".to_string()),
            ActionCode::ApproveUsage,
            "approved usage of ThinkPad X1 (LP001)",
        )
        .with_unit(UnitId("unit-9".to_string()));
        repo.append(entry.clone()).await.expect("append");

        let listed = repo.list(&ActivityLogFilter::default()).await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].user_name, "Admin");
        assert_eq!(listed[0].entry.action, ActionCode::ApproveUsage);
        assert_eq!(listed[0].entry.detail, entry.detail);
        assert_eq!(listed[0].entry.unit_id.as_ref().map(|id| id.0.as_str()), Some("unit-9"));
        assert_eq!(listed[0].entry.item_id, None);
    }

    #[tokio::test]
    async fn list_returns_newest_first_and_honors_the_limit() {
        let pool = setup().await;
        let repo = SqlActivityLogRepository::new(pool);

        for offset in 0..5 {
            let mut entry = ActivityLogEntry::new(
                UserId("u-1".to_string()),
                ActionCode::AdjustStock,
                format!("adjustment #{offset}"),
            );
            entry.recorded_at = Utc::now() - Duration::minutes(offset);
            repo.append(entry).await.expect("append");
        }

        let listed = repo
            .list(&ActivityLogFilter { limit: 3, ..ActivityLogFilter::default() })
            .await
            .expect("list");
        let details: Vec<&str> = listed.iter().map(|view| view.entry.detail.as_str()).collect();
        assert_eq!(details, vec!["adjustment #0", "adjustment #1", "adjustment #2"]);
    }

    #[tokio::test]
    async fn list_filters_by_actor_and_half_open_range() {
        let pool = setup().await;
        seed_user(&pool, "u-2", "Staff", "staff@stockroom.local").await;
        let repo = SqlActivityLogRepository::new(pool);

        let base = Utc::now() - Duration::days(10);
        for (offset_days, user, detail) in
            [(0, "u-1", "oldest"), (2, "u-2", "staff action"), (4, "u-1", "newest")]
        {
            let mut entry =
                ActivityLogEntry::new(UserId(user.to_string()), ActionCode::CreateItem, detail);
            entry.recorded_at = base + Duration::days(offset_days);
            repo.append(entry).await.expect("append");
        }

        let staff_only = repo
            .list(&ActivityLogFilter {
                user_id: Some(UserId("u-2".to_string())),
                ..ActivityLogFilter::default()
            })
            .await
            .expect("list by actor");
        assert_eq!(staff_only.len(), 1);
        assert_eq!(staff_only[0].user_name, "Staff");

        // End is exclusive, so the day-4 entry at exactly `end` is cut off.
        let ranged = repo
            .list(&ActivityLogFilter {
                start: Some(base + Duration::days(1)),
                end: Some(base + Duration::days(4)),
                ..ActivityLogFilter::default()
            })
            .await
            .expect("list by range");
        assert_eq!(ranged.len(), 1);
        assert_eq!(ranged[0].entry.detail, "staff action");
    }

    #[tokio::test]
    async fn entries_survive_without_subject_references() {
        let pool = setup().await;
        let repo = SqlActivityLogRepository::new(pool);

        repo.append(ActivityLogEntry::new(
            UserId("u-1".to_string()),
            ActionCode::DeleteCategory,
            "deleted category Printer",
        ))
        .await
        .expect("append");

        let listed = repo.list(&ActivityLogFilter::default()).await.expect("list");
        assert_eq!(listed[0].entry.item_id, None);
        assert_eq!(listed[0].entry.unit_id, None);
    }
}
