use sqlx::{sqlite::SqliteRow, Row};

use stockroom_core::domain::user::{Role, User, UserId};

use super::{parse_timestamp, RepositoryError, UserRepository};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn user_from_row(row: SqliteRow) -> Result<User, RepositoryError> {
    let role_raw = row.try_get::<String, _>("role")?;

    Ok(User {
        id: UserId(row.try_get("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: role_raw.parse().map_err(RepositoryError::Decode)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, email, password_hash, role, created_at, updated_at
             FROM user WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(user_from_row).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, email, password_hash, role, created_at, updated_at
             FROM user WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(user_from_row).transpose()
    }

    async fn save(&self, user: User) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO user (id, name, email, password_hash, role, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 email = excluded.email,
                 password_hash = excluded.password_hash,
                 role = excluded.role,
                 updated_at = excluded.updated_at",
        )
        .bind(&user.id.0)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.created_at.to_rfc3339())
        .bind(user.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_ids_by_role(&self, role: Role) -> Result<Vec<UserId>, RepositoryError> {
        let rows = sqlx::query("SELECT id FROM user WHERE role = ? ORDER BY created_at ASC")
            .bind(role.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(|row| Ok(UserId(row.try_get("id")?))).collect()
    }
}
