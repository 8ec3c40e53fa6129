use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Canonical demo accounts. Password hashes are supplied by the caller at
/// load time; the db crate never hashes anything itself.
const SEED_USERS: &[SeedUserContract] = &[
    SeedUserContract {
        id: "seed-user-admin",
        name: "Admin",
        email: "admin@stockroom.local",
        role: "ADMIN",
        check_label: "admin-account",
    },
    SeedUserContract {
        id: "seed-user-staff",
        name: "User",
        email: "user@stockroom.local",
        role: "USER",
        check_label: "staff-account",
    },
];

const SEED_UNITS: &[SeedUnitContract] = &[
    SeedUnitContract {
        id: "seed-unit-lp001",
        item_id: "seed-item-thinkpad",
        serial_number: "LP001",
        status: "AVAILABLE",
        quantity: 3,
        low_stock_threshold: 1,
        check_label: "unit-lp001",
    },
    SeedUnitContract {
        id: "seed-unit-lp002",
        item_id: "seed-item-thinkpad",
        serial_number: "LP002",
        status: "AVAILABLE",
        quantity: 2,
        low_stock_threshold: 1,
        check_label: "unit-lp002",
    },
    SeedUnitContract {
        id: "seed-unit-pr001",
        item_id: "seed-item-laserjet",
        serial_number: "PR001",
        status: "AVAILABLE",
        quantity: 4,
        low_stock_threshold: 2,
        check_label: "unit-pr001",
    },
    SeedUnitContract {
        id: "seed-unit-pr002",
        item_id: "seed-item-laserjet",
        serial_number: "PR002",
        status: "MAINTENANCE",
        quantity: 1,
        low_stock_threshold: 1,
        check_label: "unit-pr002",
    },
];

const SEED_CATEGORY_IDS: &[&str] = &["seed-cat-laptop", "seed-cat-printer"];

const SEED_ITEM_IDS: &[&str] = &["seed-item-thinkpad", "seed-item-laserjet"];

const SEED_LOG_IDS: &[&str] = &[
    "seed-log-001",
    "seed-log-002",
    "seed-log-003",
    "seed-log-004",
    "seed-log-005",
    "seed-log-006",
];

const SEED_USAGE_REQUEST_ID: &str = "seed-req-usage";
const SEED_MAINTENANCE_REQUEST_ID: &str = "seed-req-maintenance";

const SEED_TIMESTAMP: &str = "2026-08-01T09:00:00+00:00";

/// Bcrypt hashes for the two demo accounts, computed by the caller.
#[derive(Debug, Clone)]
pub struct SeedPasswordHashes {
    pub admin: String,
    pub user: String,
}

/// Deterministic demo dataset: two accounts, a small two-category catalog,
/// the catalog's audit trail, and one pending request of each kind.
pub struct DemoDataset;

impl DemoDataset {
    /// SQL fixture content for everything except user rows.
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed_data.sql");

    /// Load the demo dataset. Reloading is idempotent and resets the demo
    /// requests back to PENDING.
    pub async fn load(
        pool: &DbPool,
        hashes: &SeedPasswordHashes,
    ) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        // Users go in first so the fixture SQL can reference them.
        for user in SEED_USERS {
            let hash = if user.role == "ADMIN" { &hashes.admin } else { &hashes.user };
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
            .bind(user.id)
            .bind(user.name)
            .bind(user.email)
            .bind(hash)
            .bind(user.role)
            .bind(SEED_TIMESTAMP)
            .bind(SEED_TIMESTAMP)
            .execute(&mut *tx)
            .await?;
        }

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let users_seeded = SEED_USERS
            .iter()
            .map(|user| UserSeedInfo { name: user.name, email: user.email, role: user.role })
            .collect::<Vec<_>>();

        Ok(SeedResult { users_seeded, units_seeded: SEED_UNITS.len() })
    }

    /// Verify that the demo dataset exists and matches the contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for user in SEED_USERS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM user WHERE id = ?1 AND email = ?2 AND role = ?3)",
            )
            .bind(user.id)
            .bind(user.email)
            .bind(user.role)
            .fetch_one(pool)
            .await?;
            checks.push((user.check_label, present == 1));
        }

        let quoted_categories = sql_array_from_ids(SEED_CATEGORY_IDS);
        let category_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM category WHERE id IN {quoted_categories}"
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("categories", category_count == SEED_CATEGORY_IDS.len() as i64));

        let quoted_items = sql_array_from_ids(SEED_ITEM_IDS);
        let item_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM item WHERE id IN {quoted_items}"
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("items", item_count == SEED_ITEM_IDS.len() as i64));

        for unit in SEED_UNITS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM unit
                 WHERE id = ?1 AND item_id = ?2 AND serial_number = ?3
                   AND status = ?4 AND quantity = ?5 AND low_stock_threshold = ?6)",
            )
            .bind(unit.id)
            .bind(unit.item_id)
            .bind(unit.serial_number)
            .bind(unit.status)
            .bind(unit.quantity)
            .bind(unit.low_stock_threshold)
            .fetch_one(pool)
            .await?;
            checks.push((unit.check_label, present == 1));
        }

        let usage_pending: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM usage_request WHERE id = ?1 AND status = 'PENDING')",
        )
        .bind(SEED_USAGE_REQUEST_ID)
        .fetch_one(pool)
        .await?;
        checks.push(("usage-request-pending", usage_pending == 1));

        let maintenance_pending: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM maintenance_request WHERE id = ?1 AND status = 'PENDING')",
        )
        .bind(SEED_MAINTENANCE_REQUEST_ID)
        .fetch_one(pool)
        .await?;
        checks.push(("maintenance-request-pending", maintenance_pending == 1));

        let quoted_logs = sql_array_from_ids(SEED_LOG_IDS);
        let log_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(1) FROM activity_log WHERE id IN {quoted_logs}"
        ))
        .fetch_one(pool)
        .await?;
        checks.push(("catalog-log-entries", log_count == SEED_LOG_IDS.len() as i64));

        let all_present = checks.iter().all(|(_, exists)| *exists);
        Ok(VerificationResult { all_present, checks })
    }

    /// Remove the demo dataset, including anything the demo accounts did
    /// after seeding. Deletion runs child-first to satisfy foreign keys.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        let quoted_users =
            sql_array_from_ids(&SEED_USERS.iter().map(|user| user.id).collect::<Vec<_>>());
        let quoted_units =
            sql_array_from_ids(&SEED_UNITS.iter().map(|unit| unit.id).collect::<Vec<_>>());
        let quoted_items = sql_array_from_ids(SEED_ITEM_IDS);
        let quoted_categories = sql_array_from_ids(SEED_CATEGORY_IDS);

        sqlx::query(&format!("DELETE FROM activity_log WHERE user_id IN {quoted_users}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM usage_request WHERE user_id IN {quoted_users}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM maintenance_request WHERE user_id IN {quoted_users}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM unit WHERE id IN {quoted_units}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM item WHERE id IN {quoted_items}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM category WHERE id IN {quoted_categories}"))
            .execute(&mut *tx)
            .await?;
        // Sessions and notifications cascade from the user rows.
        sqlx::query(&format!("DELETE FROM user WHERE id IN {quoted_users}"))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct SeedUserContract {
    id: &'static str,
    name: &'static str,
    email: &'static str,
    role: &'static str,
    check_label: &'static str,
}

#[derive(Debug, Clone, Copy)]
struct SeedUnitContract {
    id: &'static str,
    item_id: &'static str,
    serial_number: &'static str,
    status: &'static str,
    quantity: i64,
    low_stock_threshold: i64,
    check_label: &'static str,
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{}'", id)).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub users_seeded: Vec<UserSeedInfo>,
    pub units_seeded: usize,
}

#[derive(Debug)]
pub struct UserSeedInfo {
    pub name: &'static str,
    pub email: &'static str,
    pub role: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
