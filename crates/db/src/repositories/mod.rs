use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use stockroom_core::domain::activity::ActivityLogEntry;
use stockroom_core::domain::category::{Category, CategoryId};
use stockroom_core::domain::item::{Item, ItemId};
use stockroom_core::domain::notification::{Notification, NotificationId};
use stockroom_core::domain::request::{
    MaintenanceRequest, MaintenanceRequestId, RequestStatus, UsageRequest, UsageRequestId,
};
use stockroom_core::domain::session::Session;
use stockroom_core::domain::unit::{Unit, UnitId, UnitStatus};
use stockroom_core::domain::user::{Role, User, UserId};

pub mod activity_log;
pub mod category;
pub mod item;
pub mod notification;
pub mod report;
pub mod request;
pub mod session;
pub mod unit;
pub mod user;
pub mod workflow;

pub use activity_log::{ActivityLogFilter, ActivityLogView, SqlActivityLogRepository};
pub use category::{CategoryWithCounts, SqlCategoryRepository};
pub use item::SqlItemRepository;
pub use notification::SqlNotificationRepository;
pub use report::{
    ActivityExportRow, DailyUsage, MaintenanceExportRow, OverviewStats, ReportRepository,
    SqlReportRepository, StatusCount, StockExportRow,
};
pub use request::{SqlMaintenanceRequestRepository, SqlUsageRequestRepository};
pub use session::SqlSessionRepository;
pub use unit::SqlUnitRepository;
pub use user::SqlUserRepository;
pub use workflow::{MaintenanceDecision, SqlWorkflowStore, UsageDecision, WorkflowError};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;
    async fn save(&self, user: User) -> Result<(), RepositoryError>;
    async fn list_ids_by_role(&self, role: Role) -> Result<Vec<UserId>, RepositoryError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn save(&self, session: Session) -> Result<(), RepositoryError>;
    async fn find_by_token(&self, token: &str) -> Result<Option<Session>, RepositoryError>;
    async fn delete(&self, token: &str) -> Result<bool, RepositoryError>;
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn find_by_id(&self, id: &CategoryId) -> Result<Option<Category>, RepositoryError>;
    async fn list_with_counts(&self) -> Result<Vec<CategoryWithCounts>, RepositoryError>;
    async fn save(&self, category: Category) -> Result<(), RepositoryError>;
    /// Returns rows affected; the schema's foreign key rejects deletion
    /// while items still reference the category.
    async fn delete(&self, id: &CategoryId) -> Result<u64, RepositoryError>;
    async fn count_items(&self, id: &CategoryId) -> Result<i64, RepositoryError>;
}

#[async_trait]
pub trait ItemRepository: Send + Sync {
    async fn find_by_id(&self, id: &ItemId) -> Result<Option<Item>, RepositoryError>;
    async fn list_with_unit_counts(
        &self,
        category_id: Option<&CategoryId>,
    ) -> Result<Vec<(Item, i64)>, RepositoryError>;
    async fn save(&self, item: Item) -> Result<(), RepositoryError>;
    async fn delete(&self, id: &ItemId) -> Result<u64, RepositoryError>;
    async fn count_units(&self, id: &ItemId) -> Result<i64, RepositoryError>;
}

#[async_trait]
pub trait UnitRepository: Send + Sync {
    async fn find_by_id(&self, id: &UnitId) -> Result<Option<Unit>, RepositoryError>;
    async fn list(
        &self,
        item_id: Option<&ItemId>,
        status: Option<UnitStatus>,
    ) -> Result<Vec<Unit>, RepositoryError>;
    /// AVAILABLE units at or below their threshold, lowest stock first.
    async fn list_low_stock(&self) -> Result<Vec<Unit>, RepositoryError>;
    async fn save(&self, unit: Unit) -> Result<(), RepositoryError>;
    /// Deletes only while no PENDING or APPROVED request references the
    /// unit; the guard is part of the statement, so 0 rows means missing or
    /// still referenced.
    async fn delete(&self, id: &UnitId) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait UsageRequestRepository: Send + Sync {
    async fn find_by_id(&self, id: &UsageRequestId)
        -> Result<Option<UsageRequest>, RepositoryError>;
    async fn list(
        &self,
        requester: Option<&UserId>,
        status: Option<RequestStatus>,
    ) -> Result<Vec<UsageRequestView>, RepositoryError>;
}

#[async_trait]
pub trait MaintenanceRequestRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &MaintenanceRequestId,
    ) -> Result<Option<MaintenanceRequest>, RepositoryError>;
    async fn list(
        &self,
        requester: Option<&UserId>,
        status: Option<RequestStatus>,
    ) -> Result<Vec<MaintenanceRequestView>, RepositoryError>;
}

#[async_trait]
pub trait ActivityLogRepository: Send + Sync {
    async fn append(&self, entry: ActivityLogEntry) -> Result<(), RepositoryError>;
    /// Entries joined with actor names, newest first, bounded by the filter.
    async fn list(
        &self,
        filter: &ActivityLogFilter,
    ) -> Result<Vec<ActivityLogView>, RepositoryError>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn save(&self, notification: Notification) -> Result<(), RepositoryError>;
    async fn list_for_user(
        &self,
        user_id: &UserId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, RepositoryError>;
    /// Scoped to the owner so one user cannot mark another's notifications.
    async fn mark_read(
        &self,
        id: &NotificationId,
        user_id: &UserId,
    ) -> Result<u64, RepositoryError>;
    async fn mark_all_read(&self, user_id: &UserId) -> Result<u64, RepositoryError>;
}

/// A usage request joined with the display fields list endpoints need.
/// Unit fields are optional because the unit reference is soft.
#[derive(Clone, Debug, PartialEq)]
pub struct UsageRequestView {
    pub request: UsageRequest,
    pub requester_name: String,
    pub item_name: Option<String>,
    pub serial_number: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MaintenanceRequestView {
    pub request: MaintenanceRequest,
    pub requester_name: String,
    pub item_name: Option<String>,
    pub serial_number: Option<String>,
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}
