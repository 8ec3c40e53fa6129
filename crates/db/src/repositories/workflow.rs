//! Transactional write side of the request workflow. Each operation opens one
//! transaction, re-asserts the pure rules from the core crate against current
//! rows, applies the outcome, and appends the audit entry before committing.
//! Any error rolls the whole step back, audit entry included.

use chrono::Utc;
use sqlx::{Sqlite, Transaction};
use thiserror::Error;

use stockroom_core::domain::activity::{ActionCode, ActivityLogEntry};
use stockroom_core::domain::request::{
    Decision, MaintenanceRequest, MaintenanceRequestId, RequestStatus, UsageRequest,
    UsageRequestId,
};
use stockroom_core::domain::unit::{Unit, UnitId};
use stockroom_core::domain::user::Principal;
use stockroom_core::errors::DomainError;
use stockroom_core::workflow::{
    authorize_decider, authorize_request_deletion, decide, status_after_decrement,
    validate_maintenance_creation, validate_usage_creation, RequestKind, StockEffect,
    UnitSnapshot,
};

use super::request::{
    maintenance_view_from_row, usage_view_from_row, MAINTENANCE_VIEW_QUERY, USAGE_VIEW_QUERY,
};
use super::unit::unit_from_row;
use super::{MaintenanceRequestView, RepositoryError, UsageRequestView};
use crate::DbPool;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("subject of the operation does not exist")]
    NotFound,
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<sqlx::Error> for WorkflowError {
    fn from(error: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(error))
    }
}

/// A decided usage request plus the state the caller needs for follow-up:
/// display names for messages and the unit as it looks after the decision.
#[derive(Clone, Debug)]
pub struct UsageDecision {
    pub request: UsageRequest,
    pub requester_name: String,
    pub item_name: Option<String>,
    pub serial_number: Option<String>,
    pub unit: Option<Unit>,
}

#[derive(Clone, Debug)]
pub struct MaintenanceDecision {
    pub request: MaintenanceRequest,
    pub requester_name: String,
    pub item_name: Option<String>,
    pub serial_number: Option<String>,
    pub unit: Option<Unit>,
}

pub struct SqlWorkflowStore {
    pool: DbPool,
}

fn subject(item_name: Option<&str>, serial_number: Option<&str>) -> String {
    match (item_name, serial_number) {
        (Some(item), Some(serial)) => format!("{item} ({serial})"),
        (Some(item), None) => item.to_string(),
        (None, Some(serial)) => format!("unit {serial}"),
        (None, None) => "a removed unit".to_string(),
    }
}

async fn fetch_unit(
    tx: &mut Transaction<'_, Sqlite>,
    unit_id: &UnitId,
) -> Result<Option<Unit>, WorkflowError> {
    let row = sqlx::query(
        "SELECT id, item_id, serial_number, status, quantity, low_stock_threshold,
                created_at, updated_at
         FROM unit WHERE id = ?",
    )
    .bind(&unit_id.0)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row.as_ref().map(unit_from_row).transpose()?)
}

async fn fetch_usage_view(
    tx: &mut Transaction<'_, Sqlite>,
    id: &UsageRequestId,
) -> Result<Option<UsageRequestView>, WorkflowError> {
    let row = sqlx::query(&format!("{USAGE_VIEW_QUERY} WHERE r.id = ?"))
        .bind(&id.0)
        .fetch_optional(&mut **tx)
        .await?;

    Ok(row.as_ref().map(usage_view_from_row).transpose()?)
}

async fn fetch_maintenance_view(
    tx: &mut Transaction<'_, Sqlite>,
    id: &MaintenanceRequestId,
) -> Result<Option<MaintenanceRequestView>, WorkflowError> {
    let row = sqlx::query(&format!("{MAINTENANCE_VIEW_QUERY} WHERE r.id = ?"))
        .bind(&id.0)
        .fetch_optional(&mut **tx)
        .await?;

    Ok(row.as_ref().map(maintenance_view_from_row).transpose()?)
}

async fn append_log(
    tx: &mut Transaction<'_, Sqlite>,
    entry: &ActivityLogEntry,
) -> Result<(), WorkflowError> {
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
    .execute(&mut **tx)
    .await?;

    Ok(())
}

impl SqlWorkflowStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create_usage_request(
        &self,
        principal: &Principal,
        unit_id: &UnitId,
        quantity: i64,
        reason: Option<String>,
    ) -> Result<UsageRequestView, WorkflowError> {
        let mut tx = self.pool.begin().await?;

        let Some(unit) = fetch_unit(&mut tx, unit_id).await? else {
            return Err(WorkflowError::NotFound);
        };
        validate_usage_creation(
            UnitSnapshot { status: unit.status, quantity: unit.quantity },
            quantity,
        )?;

        let item_name: String = sqlx::query_scalar("SELECT name FROM item WHERE id = ?")
            .bind(&unit.item_id.0)
            .fetch_one(&mut *tx)
            .await?;
        let requester_name: String = sqlx::query_scalar("SELECT name FROM user WHERE id = ?")
            .bind(&principal.user_id.0)
            .fetch_one(&mut *tx)
            .await?;

        let now = Utc::now();
        let request = UsageRequest {
            id: UsageRequestId::generate(),
            user_id: principal.user_id.clone(),
            unit_id: unit_id.clone(),
            quantity,
            status: RequestStatus::Pending,
            reason,
            remark: None,
            created_at: now,
            updated_at: now,
        };
        sqlx::query(
            "INSERT INTO usage_request
                 (id, user_id, unit_id, quantity, status, reason, remark, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.user_id.0)
        .bind(&request.unit_id.0)
        .bind(request.quantity)
        .bind(request.status.as_str())
        .bind(&request.reason)
        .bind(&request.remark)
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        let entry = ActivityLogEntry::new(
            principal.user_id.clone(),
            ActionCode::RequestUsage,
            format!("requested {quantity} x {item_name} ({})", unit.serial_number),
        )
        .with_item(unit.item_id.clone())
        .with_unit(unit.id.clone());
        append_log(&mut tx, &entry).await?;

        tx.commit().await?;
        Ok(UsageRequestView {
            request,
            requester_name,
            item_name: Some(item_name),
            serial_number: Some(unit.serial_number),
        })
    }

    pub async fn create_maintenance_request(
        &self,
        principal: &Principal,
        unit_id: &UnitId,
        reason: String,
    ) -> Result<MaintenanceRequestView, WorkflowError> {
        validate_maintenance_creation(&reason)?;

        let mut tx = self.pool.begin().await?;

        let Some(unit) = fetch_unit(&mut tx, unit_id).await? else {
            return Err(WorkflowError::NotFound);
        };
        let item_name: String = sqlx::query_scalar("SELECT name FROM item WHERE id = ?")
            .bind(&unit.item_id.0)
            .fetch_one(&mut *tx)
            .await?;
        let requester_name: String = sqlx::query_scalar("SELECT name FROM user WHERE id = ?")
            .bind(&principal.user_id.0)
            .fetch_one(&mut *tx)
            .await?;

        let now = Utc::now();
        let request = MaintenanceRequest {
            id: MaintenanceRequestId::generate(),
            user_id: principal.user_id.clone(),
            unit_id: unit_id.clone(),
            reason,
            status: RequestStatus::Pending,
            remark: None,
            created_at: now,
            updated_at: now,
        };
        sqlx::query(
            "INSERT INTO maintenance_request
                 (id, user_id, unit_id, reason, status, remark, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.user_id.0)
        .bind(&request.unit_id.0)
        .bind(&request.reason)
        .bind(request.status.as_str())
        .bind(&request.remark)
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        let entry = ActivityLogEntry::new(
            principal.user_id.clone(),
            ActionCode::RequestMaintenance,
            format!(
                "requested maintenance for {item_name} ({}): {}",
                unit.serial_number, request.reason
            ),
        )
        .with_item(unit.item_id.clone())
        .with_unit(unit.id.clone());
        append_log(&mut tx, &entry).await?;

        tx.commit().await?;
        Ok(MaintenanceRequestView {
            request,
            requester_name,
            item_name: Some(item_name),
            serial_number: Some(unit.serial_number),
        })
    }

    pub async fn decide_usage_request(
        &self,
        principal: &Principal,
        id: &UsageRequestId,
        decision: Decision,
        remark: Option<String>,
    ) -> Result<UsageDecision, WorkflowError> {
        authorize_decider(principal)?;

        let mut tx = self.pool.begin().await?;

        let Some(view) = fetch_usage_view(&mut tx, id).await? else {
            return Err(WorkflowError::NotFound);
        };
        let outcome =
            decide(RequestKind::Usage, view.request.status, decision, view.request.quantity)?;

        let now = Utc::now();
        let flipped = sqlx::query(
            "UPDATE usage_request SET status = ?, remark = ?, updated_at = ?
             WHERE id = ? AND status = 'PENDING'",
        )
        .bind(outcome.to.as_str())
        .bind(&remark)
        .bind(now.to_rfc3339())
        .bind(&id.0)
        .execute(&mut *tx)
        .await?;
        if flipped.rows_affected() == 0 {
            return Err(already_decided_usage(&mut tx, id).await?);
        }

        if let StockEffect::Decrement { quantity } = outcome.effect {
            let decremented = sqlx::query(
                "UPDATE unit SET quantity = quantity - ?1, updated_at = ?2
                 WHERE id = ?3 AND quantity >= ?1",
            )
            .bind(quantity)
            .bind(now.to_rfc3339())
            .bind(&view.request.unit_id.0)
            .execute(&mut *tx)
            .await?;
            if decremented.rows_affected() == 0 {
                let available: Option<i64> =
                    sqlx::query_scalar("SELECT quantity FROM unit WHERE id = ?")
                        .bind(&view.request.unit_id.0)
                        .fetch_optional(&mut *tx)
                        .await?;
                return Err(match available {
                    Some(available) => {
                        DomainError::InsufficientStock { requested: quantity, available }.into()
                    }
                    None => WorkflowError::NotFound,
                });
            }

            // Settle the AVAILABLE -> USED rule on the post-decrement state.
            if let Some(unit) = fetch_unit(&mut tx, &view.request.unit_id).await? {
                let settled = status_after_decrement(unit.status, unit.quantity);
                if settled != unit.status {
                    sqlx::query("UPDATE unit SET status = ?, updated_at = ? WHERE id = ?")
                        .bind(settled.as_str())
                        .bind(now.to_rfc3339())
                        .bind(&unit.id.0)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }

        let unit_after = fetch_unit(&mut tx, &view.request.unit_id).await?;

        let action = match decision {
            Decision::Approved => ActionCode::ApproveUsage,
            Decision::Rejected => ActionCode::RejectUsage,
        };
        let verb = match decision {
            Decision::Approved => "approved",
            Decision::Rejected => "rejected",
        };
        let mut detail = format!(
            "{verb} {} x {} for {}",
            view.request.quantity,
            subject(view.item_name.as_deref(), view.serial_number.as_deref()),
            view.requester_name,
        );
        if let Some(remark) = &remark {
            detail.push_str(": ");
            detail.push_str(remark);
        }
        let mut entry = ActivityLogEntry::new(principal.user_id.clone(), action, detail)
            .with_unit(view.request.unit_id.clone());
        if let Some(unit) = &unit_after {
            entry = entry.with_item(unit.item_id.clone());
        }
        append_log(&mut tx, &entry).await?;

        tx.commit().await?;

        let request =
            UsageRequest { status: outcome.to, remark, updated_at: now, ..view.request };
        Ok(UsageDecision {
            request,
            requester_name: view.requester_name,
            item_name: view.item_name,
            serial_number: view.serial_number,
            unit: unit_after,
        })
    }

    pub async fn decide_maintenance_request(
        &self,
        principal: &Principal,
        id: &MaintenanceRequestId,
        decision: Decision,
        remark: Option<String>,
    ) -> Result<MaintenanceDecision, WorkflowError> {
        authorize_decider(principal)?;

        let mut tx = self.pool.begin().await?;

        let Some(view) = fetch_maintenance_view(&mut tx, id).await? else {
            return Err(WorkflowError::NotFound);
        };
        let outcome = decide(RequestKind::Maintenance, view.request.status, decision, 0)?;

        let now = Utc::now();
        let flipped = sqlx::query(
            "UPDATE maintenance_request SET status = ?, remark = ?, updated_at = ?
             WHERE id = ? AND status = 'PENDING'",
        )
        .bind(outcome.to.as_str())
        .bind(&remark)
        .bind(now.to_rfc3339())
        .bind(&id.0)
        .execute(&mut *tx)
        .await?;
        if flipped.rows_affected() == 0 {
            return Err(already_decided_maintenance(&mut tx, id).await?);
        }

        if outcome.effect == StockEffect::MarkMaintenance {
            let parked = sqlx::query(
                "UPDATE unit SET status = 'MAINTENANCE', updated_at = ? WHERE id = ?",
            )
            .bind(now.to_rfc3339())
            .bind(&view.request.unit_id.0)
            .execute(&mut *tx)
            .await?;
            if parked.rows_affected() == 0 {
                return Err(WorkflowError::NotFound);
            }
        }

        let unit_after = fetch_unit(&mut tx, &view.request.unit_id).await?;

        let action = match decision {
            Decision::Approved => ActionCode::ApproveMaintenance,
            Decision::Rejected => ActionCode::RejectMaintenance,
        };
        let verb = match decision {
            Decision::Approved => "approved",
            Decision::Rejected => "rejected",
        };
        let mut detail = format!(
            "{verb} maintenance of {} for {}",
            subject(view.item_name.as_deref(), view.serial_number.as_deref()),
            view.requester_name,
        );
        if let Some(remark) = &remark {
            detail.push_str(": ");
            detail.push_str(remark);
        }
        let mut entry = ActivityLogEntry::new(principal.user_id.clone(), action, detail)
            .with_unit(view.request.unit_id.clone());
        if let Some(unit) = &unit_after {
            entry = entry.with_item(unit.item_id.clone());
        }
        append_log(&mut tx, &entry).await?;

        tx.commit().await?;

        let request =
            MaintenanceRequest { status: outcome.to, remark, updated_at: now, ..view.request };
        Ok(MaintenanceDecision {
            request,
            requester_name: view.requester_name,
            item_name: view.item_name,
            serial_number: view.serial_number,
            unit: unit_after,
        })
    }

    pub async fn delete_usage_request(
        &self,
        principal: &Principal,
        id: &UsageRequestId,
    ) -> Result<UsageRequestView, WorkflowError> {
        let mut tx = self.pool.begin().await?;

        let Some(view) = fetch_usage_view(&mut tx, id).await? else {
            return Err(WorkflowError::NotFound);
        };
        authorize_request_deletion(principal, &view.request.user_id)?;

        sqlx::query("DELETE FROM usage_request WHERE id = ?")
            .bind(&id.0)
            .execute(&mut *tx)
            .await?;

        let entry = ActivityLogEntry::new(
            principal.user_id.clone(),
            ActionCode::DeleteUsageRequest,
            format!(
                "deleted usage request from {} for {}",
                view.requester_name,
                subject(view.item_name.as_deref(), view.serial_number.as_deref()),
            ),
        )
        .with_unit(view.request.unit_id.clone());
        append_log(&mut tx, &entry).await?;

        tx.commit().await?;
        Ok(view)
    }

    pub async fn delete_maintenance_request(
        &self,
        principal: &Principal,
        id: &MaintenanceRequestId,
    ) -> Result<MaintenanceRequestView, WorkflowError> {
        let mut tx = self.pool.begin().await?;

        let Some(view) = fetch_maintenance_view(&mut tx, id).await? else {
            return Err(WorkflowError::NotFound);
        };
        authorize_request_deletion(principal, &view.request.user_id)?;

        sqlx::query("DELETE FROM maintenance_request WHERE id = ?")
            .bind(&id.0)
            .execute(&mut *tx)
            .await?;

        let entry = ActivityLogEntry::new(
            principal.user_id.clone(),
            ActionCode::DeleteMaintenanceRequest,
            format!(
                "deleted maintenance request from {} for {}",
                view.requester_name,
                subject(view.item_name.as_deref(), view.serial_number.as_deref()),
            ),
        )
        .with_unit(view.request.unit_id.clone());
        append_log(&mut tx, &entry).await?;

        tx.commit().await?;
        Ok(view)
    }
}

async fn already_decided_usage(
    tx: &mut Transaction<'_, Sqlite>,
    id: &UsageRequestId,
) -> Result<WorkflowError, WorkflowError> {
    let raw: Option<String> = sqlx::query_scalar("SELECT status FROM usage_request WHERE id = ?")
        .bind(&id.0)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(match raw {
        Some(raw) => {
            let status = raw.parse::<RequestStatus>().map_err(RepositoryError::Decode)?;
            DomainError::AlreadyDecided { status }.into()
        }
        None => WorkflowError::NotFound,
    })
}

async fn already_decided_maintenance(
    tx: &mut Transaction<'_, Sqlite>,
    id: &MaintenanceRequestId,
) -> Result<WorkflowError, WorkflowError> {
    let raw: Option<String> =
        sqlx::query_scalar("SELECT status FROM maintenance_request WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&mut **tx)
            .await?;
    Ok(match raw {
        Some(raw) => {
            let status = raw.parse::<RequestStatus>().map_err(RepositoryError::Decode)?;
            DomainError::AlreadyDecided { status }.into()
        }
        None => WorkflowError::NotFound,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use stockroom_core::domain::activity::ActionCode;
    use stockroom_core::domain::category::{Category, CategoryId};
    use stockroom_core::domain::item::{Item, ItemId};
    use stockroom_core::domain::request::{Decision, RequestStatus};
    use stockroom_core::domain::unit::{Unit, UnitId, UnitStatus};
    use stockroom_core::domain::user::{Principal, Role, User, UserId};
    use stockroom_core::errors::DomainError;

    use super::{SqlWorkflowStore, WorkflowError};
    use crate::repositories::{
        ActivityLogFilter, ActivityLogRepository, CategoryRepository, ItemRepository,
        SqlActivityLogRepository, SqlCategoryRepository, SqlItemRepository, SqlUnitRepository,
        SqlUserRepository, SqlUsageRequestRepository, UnitRepository, UsageRequestRepository,
        UserRepository,
    };
    use crate::{connect_with_settings, migrations, DbPool};

    fn admin() -> Principal {
        Principal::new(UserId("a-1".to_string()), Role::Admin)
    }

    fn alice() -> Principal {
        Principal::new(UserId("u-1".to_string()), Role::User)
    }

    fn bob() -> Principal {
        Principal::new(UserId("u-2".to_string()), Role::User)
    }

    async fn setup() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let now = Utc::now();
        let users = SqlUserRepository::new(pool.clone());
        for (id, name, email, role) in [
            ("a-1", "Admin", "admin@stockroom.local", Role::Admin),
            ("u-1", "Alice", "alice@stockroom.local", Role::User),
            ("u-2", "Bob", "bob@stockroom.local", Role::User),
        ] {
            users
                .save(User {
                    id: UserId(id.to_string()),
                    name: name.to_string(),
                    email: email.to_string(),
                    password_hash: "$2b$10$hash".to_string(),
                    role,
                    created_at: now,
                    updated_at: now,
                })
                .await
                .expect("seed user");
        }

        SqlCategoryRepository::new(pool.clone())
            .save(Category {
                id: CategoryId("cat-1".to_string()),
                name: "Laptop".to_string(),
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("seed category");
        SqlItemRepository::new(pool.clone())
            .save(Item {
                id: ItemId("item-1".to_string()),
                name: "ThinkPad X1".to_string(),
                category_id: CategoryId("cat-1".to_string()),
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("seed item");
        seed_unit(&pool, "unit-1", "LP001", UnitStatus::Available, 3).await;
        pool
    }

    async fn seed_unit(pool: &DbPool, id: &str, serial: &str, status: UnitStatus, quantity: i64) {
        let now = Utc::now();
        SqlUnitRepository::new(pool.clone())
            .save(Unit {
                id: UnitId(id.to_string()),
                item_id: ItemId("item-1".to_string()),
                serial_number: serial.to_string(),
                status,
                quantity,
                low_stock_threshold: 1,
                created_at: now,
                updated_at: now,
            })
            .await
            .expect("seed unit");
    }

    async fn unit_state(pool: &DbPool, id: &str) -> Unit {
        SqlUnitRepository::new(pool.clone())
            .find_by_id(&UnitId(id.to_string()))
            .await
            .expect("find unit")
            .expect("unit present")
    }

    async fn log_count(pool: &DbPool, action: ActionCode) -> usize {
        SqlActivityLogRepository::new(pool.clone())
            .list(&ActivityLogFilter { limit: 100, ..ActivityLogFilter::default() })
            .await
            .expect("list log")
            .into_iter()
            .filter(|view| view.entry.action == action)
            .count()
    }

    #[tokio::test]
    async fn usage_creation_persists_the_request_and_logs_it() {
        let pool = setup().await;
        let store = SqlWorkflowStore::new(pool.clone());

        let view = store
            .create_usage_request(&alice(), &UnitId("unit-1".to_string()), 2, Some("field work".to_string()))
            .await
            .expect("create");

        assert_eq!(view.request.status, RequestStatus::Pending);
        assert_eq!(view.request.quantity, 2);
        assert_eq!(view.requester_name, "Alice");
        assert_eq!(view.item_name.as_deref(), Some("ThinkPad X1"));
        assert_eq!(view.serial_number.as_deref(), Some("LP001"));

        let stored = SqlUsageRequestRepository::new(pool.clone())
            .find_by_id(&view.request.id)
            .await
            .expect("find")
            .expect("persisted");
        assert_eq!(stored.status, RequestStatus::Pending);
        assert_eq!(stored.reason.as_deref(), Some("field work"));

        // Stock is reserved at approval time, not at creation.
        assert_eq!(unit_state(&pool, "unit-1").await.quantity, 3);
        assert_eq!(log_count(&pool, ActionCode::RequestUsage).await, 1);
    }

    #[tokio::test]
    async fn usage_creation_rejects_unavailable_units_and_bad_quantities() {
        let pool = setup().await;
        seed_unit(&pool, "unit-2", "LP002", UnitStatus::Maintenance, 5).await;
        let store = SqlWorkflowStore::new(pool.clone());

        let unavailable = store
            .create_usage_request(&alice(), &UnitId("unit-2".to_string()), 1, None)
            .await;
        assert!(matches!(
            unavailable,
            Err(WorkflowError::Domain(DomainError::UnitUnavailable { .. }))
        ));

        let zero = store.create_usage_request(&alice(), &UnitId("unit-1".to_string()), 0, None).await;
        assert!(matches!(zero, Err(WorkflowError::Domain(DomainError::InvalidQuantity(0)))));

        let over_ask =
            store.create_usage_request(&alice(), &UnitId("unit-1".to_string()), 4, None).await;
        assert!(matches!(
            over_ask,
            Err(WorkflowError::Domain(DomainError::InsufficientStock {
                requested: 4,
                available: 3
            }))
        ));

        assert_eq!(log_count(&pool, ActionCode::RequestUsage).await, 0);
    }

    #[tokio::test]
    async fn usage_creation_on_a_missing_unit_is_not_found() {
        let pool = setup().await;
        let store = SqlWorkflowStore::new(pool);

        let result =
            store.create_usage_request(&alice(), &UnitId("no-such-unit".to_string()), 1, None).await;
        assert!(matches!(result, Err(WorkflowError::NotFound)));
    }

    #[tokio::test]
    async fn approving_usage_decrements_stock_and_logs() {
        let pool = setup().await;
        let store = SqlWorkflowStore::new(pool.clone());
        let view = store
            .create_usage_request(&alice(), &UnitId("unit-1".to_string()), 2, None)
            .await
            .expect("create");

        let decision = store
            .decide_usage_request(
                &admin(),
                &view.request.id,
                Decision::Approved,
                Some("take from shelf B".to_string()),
            )
            .await
            .expect("approve");

        assert_eq!(decision.request.status, RequestStatus::Approved);
        assert_eq!(decision.request.remark.as_deref(), Some("take from shelf B"));
        let unit = decision.unit.expect("unit present");
        assert_eq!(unit.quantity, 1);
        assert_eq!(unit.status, UnitStatus::Available);
        assert_eq!(log_count(&pool, ActionCode::ApproveUsage).await, 1);
    }

    #[tokio::test]
    async fn draining_approval_marks_the_unit_used() {
        let pool = setup().await;
        seed_unit(&pool, "unit-2", "LP002", UnitStatus::Available, 2).await;
        let store = SqlWorkflowStore::new(pool.clone());
        let view = store
            .create_usage_request(&alice(), &UnitId("unit-2".to_string()), 2, None)
            .await
            .expect("create");

        let decision = store
            .decide_usage_request(&admin(), &view.request.id, Decision::Approved, None)
            .await
            .expect("approve");

        let unit = decision.unit.expect("unit present");
        assert_eq!(unit.quantity, 0);
        assert_eq!(unit.status, UnitStatus::Used);
    }

    #[tokio::test]
    async fn losing_approval_rolls_back_the_whole_decision() {
        let pool = setup().await;
        let store = SqlWorkflowStore::new(pool.clone());
        // Two pending asks of 2 against a stock of 3: only one can win.
        let first = store
            .create_usage_request(&alice(), &UnitId("unit-1".to_string()), 2, None)
            .await
            .expect("create first");
        let second = store
            .create_usage_request(&bob(), &UnitId("unit-1".to_string()), 2, None)
            .await
            .expect("create second");

        store
            .decide_usage_request(&admin(), &first.request.id, Decision::Approved, None)
            .await
            .expect("first approval");

        let lost = store
            .decide_usage_request(&admin(), &second.request.id, Decision::Approved, None)
            .await;
        assert!(matches!(
            lost,
            Err(WorkflowError::Domain(DomainError::InsufficientStock {
                requested: 2,
                available: 1
            }))
        ));

        // The failed decision left nothing behind: still pending, stock
        // untouched, no second approval logged.
        let still_pending = SqlUsageRequestRepository::new(pool.clone())
            .find_by_id(&second.request.id)
            .await
            .expect("find")
            .expect("present");
        assert_eq!(still_pending.status, RequestStatus::Pending);
        assert_eq!(unit_state(&pool, "unit-1").await.quantity, 1);
        assert_eq!(log_count(&pool, ActionCode::ApproveUsage).await, 1);
    }

    #[tokio::test]
    async fn decisions_are_one_shot() {
        let pool = setup().await;
        let store = SqlWorkflowStore::new(pool);
        let view = store
            .create_usage_request(&alice(), &UnitId("unit-1".to_string()), 1, None)
            .await
            .expect("create");
        store
            .decide_usage_request(&admin(), &view.request.id, Decision::Rejected, None)
            .await
            .expect("first decision");

        let again =
            store.decide_usage_request(&admin(), &view.request.id, Decision::Approved, None).await;
        assert!(matches!(
            again,
            Err(WorkflowError::Domain(DomainError::AlreadyDecided {
                status: RequestStatus::Rejected
            }))
        ));
    }

    #[tokio::test]
    async fn rejection_leaves_stock_untouched() {
        let pool = setup().await;
        let store = SqlWorkflowStore::new(pool.clone());
        let view = store
            .create_usage_request(&alice(), &UnitId("unit-1".to_string()), 2, None)
            .await
            .expect("create");

        let decision = store
            .decide_usage_request(
                &admin(),
                &view.request.id,
                Decision::Rejected,
                Some("not this quarter".to_string()),
            )
            .await
            .expect("reject");

        assert_eq!(decision.request.status, RequestStatus::Rejected);
        let unit = unit_state(&pool, "unit-1").await;
        assert_eq!(unit.quantity, 3);
        assert_eq!(unit.status, UnitStatus::Available);
        assert_eq!(log_count(&pool, ActionCode::RejectUsage).await, 1);
    }

    #[tokio::test]
    async fn non_admins_cannot_decide() {
        let pool = setup().await;
        let store = SqlWorkflowStore::new(pool);
        let view = store
            .create_usage_request(&alice(), &UnitId("unit-1".to_string()), 1, None)
            .await
            .expect("create");

        let result =
            store.decide_usage_request(&alice(), &view.request.id, Decision::Approved, None).await;
        assert!(matches!(result, Err(WorkflowError::Domain(DomainError::AdminRequired))));
    }

    #[tokio::test]
    async fn approving_maintenance_parks_the_unit() {
        let pool = setup().await;
        let store = SqlWorkflowStore::new(pool.clone());
        let view = store
            .create_maintenance_request(
                &bob(),
                &UnitId("unit-1".to_string()),
                "screen flickers".to_string(),
            )
            .await
            .expect("create");
        assert_eq!(view.requester_name, "Bob");

        let decision = store
            .decide_maintenance_request(&admin(), &view.request.id, Decision::Approved, None)
            .await
            .expect("approve");

        assert_eq!(decision.request.status, RequestStatus::Approved);
        let unit = decision.unit.expect("unit present");
        assert_eq!(unit.status, UnitStatus::Maintenance);
        assert_eq!(unit.quantity, 3);
        assert_eq!(log_count(&pool, ActionCode::ApproveMaintenance).await, 1);
    }

    #[tokio::test]
    async fn maintenance_creation_requires_a_reason() {
        let pool = setup().await;
        let store = SqlWorkflowStore::new(pool.clone());

        let result = store
            .create_maintenance_request(&bob(), &UnitId("unit-1".to_string()), "   ".to_string())
            .await;
        assert!(matches!(
            result,
            Err(WorkflowError::Domain(DomainError::EmptyField("reason")))
        ));

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM maintenance_request")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(rows, 0);
    }

    #[tokio::test]
    async fn request_deletion_is_owner_or_admin() {
        let pool = setup().await;
        let store = SqlWorkflowStore::new(pool.clone());
        let view = store
            .create_usage_request(&alice(), &UnitId("unit-1".to_string()), 1, None)
            .await
            .expect("create");

        let stranger = store.delete_usage_request(&bob(), &view.request.id).await;
        assert!(matches!(
            stranger,
            Err(WorkflowError::Domain(DomainError::NotRequestOwner))
        ));

        let deleted =
            store.delete_usage_request(&alice(), &view.request.id).await.expect("owner deletes");
        assert_eq!(deleted.request.id, view.request.id);
        assert!(SqlUsageRequestRepository::new(pool.clone())
            .find_by_id(&view.request.id)
            .await
            .expect("find")
            .is_none());
        assert_eq!(log_count(&pool, ActionCode::DeleteUsageRequest).await, 1);

        let gone = store.delete_usage_request(&admin(), &view.request.id).await;
        assert!(matches!(gone, Err(WorkflowError::NotFound)));
    }

    #[tokio::test]
    async fn admins_may_delete_requests_they_do_not_own() {
        let pool = setup().await;
        let store = SqlWorkflowStore::new(pool.clone());
        let view = store
            .create_maintenance_request(
                &bob(),
                &UnitId("unit-1".to_string()),
                "keyboard sticks".to_string(),
            )
            .await
            .expect("create");
        store
            .decide_maintenance_request(&admin(), &view.request.id, Decision::Rejected, None)
            .await
            .expect("decide");

        // Decided requests stay deletable.
        let deleted = store
            .delete_maintenance_request(&admin(), &view.request.id)
            .await
            .expect("admin deletes");
        assert_eq!(deleted.request.status, RequestStatus::Rejected);
        assert_eq!(log_count(&pool, ActionCode::DeleteMaintenanceRequest).await, 1);
    }
}
