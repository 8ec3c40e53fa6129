use sqlx::{sqlite::SqliteRow, Row};

use stockroom_core::domain::notification::{Notification, NotificationId, NotificationKind};
use stockroom_core::domain::user::UserId;

use super::{parse_timestamp, NotificationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlNotificationRepository {
    pool: DbPool,
}

impl SqlNotificationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn notification_from_row(row: &SqliteRow) -> Result<Notification, RepositoryError> {
    let raw_kind: String = row.try_get("kind")?;
    let is_read: i64 = row.try_get("is_read")?;
    Ok(Notification {
        id: NotificationId(row.try_get("id")?),
        user_id: UserId(row.try_get("user_id")?),
        title: row.try_get("title")?,
        message: row.try_get("message")?,
        kind: raw_kind.parse::<NotificationKind>().map_err(RepositoryError::Decode)?,
        is_read: is_read != 0,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

#[async_trait::async_trait]
impl NotificationRepository for SqlNotificationRepository {
    async fn save(&self, notification: Notification) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO notification (id, user_id, title, message, kind, is_read, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&notification.id.0)
        .bind(&notification.user_id.0)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.kind.as_str())
        .bind(notification.is_read as i64)
        .bind(notification.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_user(
        &self,
        user: &UserId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, user_id, title, message, kind, is_read, created_at
             FROM notification
             WHERE user_id = ?1 AND (?2 = 0 OR is_read = 0)
             ORDER BY created_at DESC",
        )
        .bind(&user.0)
        .bind(unread_only as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(notification_from_row).collect()
    }

    async fn mark_read(
        &self,
        id: &NotificationId,
        user: &UserId,
    ) -> Result<u64, RepositoryError> {
        let result =
            sqlx::query("UPDATE notification SET is_read = 1 WHERE id = ? AND user_id = ?")
                .bind(&id.0)
                .bind(&user.0)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }

    async fn mark_all_read(&self, user: &UserId) -> Result<u64, RepositoryError> {
        let result =
            sqlx::query("UPDATE notification SET is_read = 1 WHERE user_id = ? AND is_read = 0")
                .bind(&user.0)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }
}
