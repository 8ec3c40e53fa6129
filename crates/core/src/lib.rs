pub mod config;
pub mod domain;
pub mod errors;
pub mod notify;
pub mod workflow;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::activity::{ActionCode, ActivityLogEntry, ActivityLogId};
pub use domain::category::{Category, CategoryId};
pub use domain::item::{Item, ItemId};
pub use domain::notification::{Notification, NotificationId, NotificationKind};
pub use domain::report::{MonthlyReport, MonthlyReportId, ReportMonth};
pub use domain::request::{
    Decision, MaintenanceRequest, MaintenanceRequestId, RequestStatus, UsageRequest,
    UsageRequestId,
};
pub use domain::session::{Session, SessionToken};
pub use domain::unit::{Unit, UnitId, UnitStatus};
pub use domain::user::{Principal, Role, User, UserId};
pub use errors::DomainError;
pub use notify::{Channel, EventEnvelope, EventPublisher, InMemoryPublisher};
pub use workflow::{DecisionOutcome, RequestKind, StockEffect, UnitSnapshot};
