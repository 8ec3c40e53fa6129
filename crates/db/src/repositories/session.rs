use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use stockroom_core::domain::session::{Session, SessionToken};
use stockroom_core::domain::user::UserId;

use super::{parse_timestamp, RepositoryError, SessionRepository};
use crate::DbPool;

pub struct SqlSessionRepository {
    pool: DbPool,
}

impl SqlSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn session_from_row(row: SqliteRow) -> Result<Session, RepositoryError> {
    Ok(Session {
        token: SessionToken(row.try_get("token")?),
        user_id: UserId(row.try_get("user_id")?),
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        expires_at: parse_timestamp("expires_at", row.try_get("expires_at")?)?,
    })
}

#[async_trait::async_trait]
impl SessionRepository for SqlSessionRepository {
    async fn save(&self, session: Session) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO session (token, user_id, created_at, expires_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&session.token.0)
        .bind(&session.user_id.0)
        .bind(session.created_at.to_rfc3339())
        .bind(session.expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<Session>, RepositoryError> {
        let row = sqlx::query(
            "SELECT token, user_id, created_at, expires_at FROM session WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        row.map(session_from_row).transpose()
    }

    async fn delete(&self, token: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM session WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM session WHERE expires_at <= ?")
            .bind(now.to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use stockroom_core::domain::session::Session;
    use stockroom_core::domain::user::{Role, User, UserId};

    use super::SqlSessionRepository;
    use crate::repositories::{SessionRepository, SqlUserRepository, UserRepository};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let now = Utc::now();
        SqlUserRepository::new(pool.clone())
            .save(User {
                id: UserId("u-1".to_string()),
                name: "User".to_string(),
                email: "user@stockroom.local".to_string(),
                password_hash: "$2b$10$hash".to_string(),
                role: Role::User,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("insert session owner");

        pool
    }

    #[tokio::test]
    async fn save_find_and_delete_round_trip() {
        let pool = setup().await;
        let repo = SqlSessionRepository::new(pool);

        let session = Session::issue(UserId("u-1".to_string()), 24);
        repo.save(session.clone()).await.expect("save");

        let found = repo.find_by_token(&session.token.0).await.expect("find").expect("exists");
        assert_eq!(found.user_id, session.user_id);
        assert!(!found.is_expired(Utc::now()));

        assert!(repo.delete(&session.token.0).await.expect("delete"));
        assert!(!repo.delete(&session.token.0).await.expect("second delete"));
        assert!(repo.find_by_token(&session.token.0).await.expect("find gone").is_none());
    }

    #[tokio::test]
    async fn delete_expired_purges_only_stale_sessions() {
        let pool = setup().await;
        let repo = SqlSessionRepository::new(pool);

        let mut stale = Session::issue(UserId("u-1".to_string()), 1);
        stale.expires_at = Utc::now() - Duration::hours(2);
        let fresh = Session::issue(UserId("u-1".to_string()), 24);

        repo.save(stale.clone()).await.expect("save stale");
        repo.save(fresh.clone()).await.expect("save fresh");

        let purged = repo.delete_expired(Utc::now()).await.expect("purge");
        assert_eq!(purged, 1);
        assert!(repo.find_by_token(&stale.token.0).await.expect("stale gone").is_none());
        assert!(repo.find_by_token(&fresh.token.0).await.expect("fresh kept").is_some());
    }
}
