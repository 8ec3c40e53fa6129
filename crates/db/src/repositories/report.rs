//! Read models for dashboards and exports. Everything here is derived from
//! the transactional tables; only the monthly counters are materialized, and
//! those are rebuilt wholesale on refresh rather than maintained in place.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use stockroom_core::domain::activity::ActionCode;
use stockroom_core::domain::category::CategoryId;
use stockroom_core::domain::report::{MonthlyReport, MonthlyReportId, ReportMonth};
use stockroom_core::domain::request::RequestStatus;
use stockroom_core::domain::unit::UnitStatus;

use super::{parse_timestamp, RepositoryError};
use crate::DbPool;

/// Headline numbers for the dashboard, computed in one round trip.
#[derive(Clone, Debug, PartialEq)]
pub struct OverviewStats {
    pub total_categories: i64,
    pub total_items: i64,
    pub total_units: i64,
    pub total_quantity: i64,
    pub low_stock_units: i64,
    pub pending_usage_requests: i64,
    pub pending_maintenance_requests: i64,
}

/// One bucket of the unit status breakdown. Statuses with no units are
/// absent; callers zero-fill if they need the full set.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusCount {
    pub status: UnitStatus,
    pub count: i64,
}

/// Approved usage volume for one calendar day, `YYYY-MM-DD`.
#[derive(Clone, Debug, PartialEq)]
pub struct DailyUsage {
    pub day: String,
    pub count: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StockExportRow {
    pub category_name: String,
    pub item_name: String,
    pub serial_number: String,
    pub quantity: i64,
    pub status: UnitStatus,
}

/// Catalog columns are optional: a decided request may outlive its unit.
#[derive(Clone, Debug, PartialEq)]
pub struct MaintenanceExportRow {
    pub created_at: DateTime<Utc>,
    pub requester_name: String,
    pub category_name: Option<String>,
    pub item_name: Option<String>,
    pub serial_number: Option<String>,
    pub reason: String,
    pub status: RequestStatus,
    pub remark: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ActivityExportRow {
    pub recorded_at: DateTime<Utc>,
    pub user_name: String,
    pub action: ActionCode,
    pub detail: String,
}

/// Date ranges are half-open: `start <= t < end`.
#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn overview(&self) -> Result<OverviewStats, RepositoryError>;
    async fn unit_status_counts(&self) -> Result<Vec<StatusCount>, RepositoryError>;
    async fn usage_per_day(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<DailyUsage>, RepositoryError>;
    async fn find_monthly(
        &self,
        month: &ReportMonth,
        category: Option<&CategoryId>,
    ) -> Result<Option<MonthlyReport>, RepositoryError>;
    /// Recomputes the counters for the month/scope and replaces any cached
    /// row, all in one transaction.
    async fn refresh_monthly(
        &self,
        month: &ReportMonth,
        category: Option<&CategoryId>,
    ) -> Result<MonthlyReport, RepositoryError>;
    async fn export_stock(&self) -> Result<Vec<StockExportRow>, RepositoryError>;
    async fn export_maintenance(
        &self,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<Vec<MaintenanceExportRow>, RepositoryError>;
    async fn export_activity(
        &self,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<Vec<ActivityExportRow>, RepositoryError>;
}

pub struct SqlReportRepository {
    pool: DbPool,
}

impl SqlReportRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn report_from_row(row: &SqliteRow) -> Result<MonthlyReport, RepositoryError> {
    let raw_month: String = row.try_get("month")?;
    Ok(MonthlyReport {
        id: MonthlyReportId(row.try_get("id")?),
        month: raw_month.parse::<ReportMonth>().map_err(RepositoryError::Decode)?,
        category_id: row.try_get::<Option<String>, _>("category_id")?.map(CategoryId),
        total_items: row.try_get("total_items")?,
        total_usage: row.try_get("total_usage")?,
        total_maintenance: row.try_get("total_maintenance")?,
        generated_at: parse_timestamp("generated_at", row.try_get("generated_at")?)?,
    })
}

fn range_bounds(
    range: Option<(DateTime<Utc>, DateTime<Utc>)>,
) -> (Option<String>, Option<String>) {
    match range {
        Some((start, end)) => (Some(start.to_rfc3339()), Some(end.to_rfc3339())),
        None => (None, None),
    }
}

#[async_trait]
impl ReportRepository for SqlReportRepository {
    async fn overview(&self) -> Result<OverviewStats, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                 (SELECT COUNT(1) FROM category) AS total_categories,
                 (SELECT COUNT(1) FROM item) AS total_items,
                 (SELECT COUNT(1) FROM unit) AS total_units,
                 (SELECT IFNULL(SUM(quantity), 0) FROM unit) AS total_quantity,
                 (SELECT COUNT(1) FROM unit
                  WHERE status = 'AVAILABLE' AND quantity <= low_stock_threshold)
                     AS low_stock_units,
                 (SELECT COUNT(1) FROM usage_request WHERE status = 'PENDING')
                     AS pending_usage_requests,
                 (SELECT COUNT(1) FROM maintenance_request WHERE status = 'PENDING')
                     AS pending_maintenance_requests",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(OverviewStats {
            total_categories: row.try_get("total_categories")?,
            total_items: row.try_get("total_items")?,
            total_units: row.try_get("total_units")?,
            total_quantity: row.try_get("total_quantity")?,
            low_stock_units: row.try_get("low_stock_units")?,
            pending_usage_requests: row.try_get("pending_usage_requests")?,
            pending_maintenance_requests: row.try_get("pending_maintenance_requests")?,
        })
    }

    async fn unit_status_counts(&self) -> Result<Vec<StatusCount>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT status, COUNT(1) AS count FROM unit GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let raw_status: String = row.try_get("status")?;
                Ok(StatusCount {
                    status: raw_status.parse::<UnitStatus>().map_err(RepositoryError::Decode)?,
                    count: row.try_get("count")?,
                })
            })
            .collect()
    }

    async fn usage_per_day(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<DailyUsage>, RepositoryError> {
        // RFC 3339 sorts lexicographically, so the first 10 characters are
        // the calendar day.
        let rows = sqlx::query(
            "SELECT substr(created_at, 1, 10) AS day, COUNT(1) AS count
             FROM usage_request
             WHERE status = 'APPROVED' AND created_at >= ?
             GROUP BY day
             ORDER BY day ASC",
        )
        .bind(since.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| Ok(DailyUsage { day: row.try_get("day")?, count: row.try_get("count")? }))
            .collect()
    }

    async fn find_monthly(
        &self,
        month: &ReportMonth,
        category: Option<&CategoryId>,
    ) -> Result<Option<MonthlyReport>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, month, category_id, total_items, total_usage, total_maintenance,
                    generated_at
             FROM monthly_report
             WHERE month = ?1 AND IFNULL(category_id, '') = IFNULL(?2, '')",
        )
        .bind(month.label())
        .bind(category.map(|id| id.0.clone()))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(report_from_row).transpose()
    }

    async fn refresh_monthly(
        &self,
        month: &ReportMonth,
        category: Option<&CategoryId>,
    ) -> Result<MonthlyReport, RepositoryError> {
        let start = month.start().to_rfc3339();
        let end = month.end().to_rfc3339();
        let scope = category.map(|id| id.0.clone());

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM monthly_report
             WHERE month = ?1 AND IFNULL(category_id, '') = IFNULL(?2, '')",
        )
        .bind(month.label())
        .bind(scope.clone())
        .execute(&mut *tx)
        .await?;

        let total_items: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM unit u
             JOIN item i ON i.id = u.item_id
             WHERE u.created_at >= ?1 AND u.created_at < ?2
               AND (?3 IS NULL OR i.category_id = ?3)",
        )
        .bind(&start)
        .bind(&end)
        .bind(scope.clone())
        .fetch_one(&mut *tx)
        .await?;

        let total_usage: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM usage_request r
             WHERE r.status = 'APPROVED'
               AND r.created_at >= ?1 AND r.created_at < ?2
               AND (?3 IS NULL OR EXISTS (
                   SELECT 1 FROM unit u JOIN item i ON i.id = u.item_id
                   WHERE u.id = r.unit_id AND i.category_id = ?3))",
        )
        .bind(&start)
        .bind(&end)
        .bind(scope.clone())
        .fetch_one(&mut *tx)
        .await?;

        let total_maintenance: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM maintenance_request r
             WHERE r.status = 'APPROVED'
               AND r.created_at >= ?1 AND r.created_at < ?2
               AND (?3 IS NULL OR EXISTS (
                   SELECT 1 FROM unit u JOIN item i ON i.id = u.item_id
                   WHERE u.id = r.unit_id AND i.category_id = ?3))",
        )
        .bind(&start)
        .bind(&end)
        .bind(scope.clone())
        .fetch_one(&mut *tx)
        .await?;

        let report = MonthlyReport {
            id: MonthlyReportId::generate(),
            month: *month,
            category_id: category.cloned(),
            total_items,
            total_usage,
            total_maintenance,
            generated_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO monthly_report
                 (id, month, category_id, total_items, total_usage, total_maintenance,
                  generated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&report.id.0)
        .bind(report.month.label())
        .bind(scope)
        .bind(report.total_items)
        .bind(report.total_usage)
        .bind(report.total_maintenance)
        .bind(report.generated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(report)
    }

    async fn export_stock(&self) -> Result<Vec<StockExportRow>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT c.name AS category_name, i.name AS item_name, u.serial_number,
                    u.quantity, u.status
             FROM unit u
             JOIN item i ON i.id = u.item_id
             JOIN category c ON c.id = i.category_id
             ORDER BY c.name ASC, i.name ASC, u.serial_number ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let raw_status: String = row.try_get("status")?;
                Ok(StockExportRow {
                    category_name: row.try_get("category_name")?,
                    item_name: row.try_get("item_name")?,
                    serial_number: row.try_get("serial_number")?,
                    quantity: row.try_get("quantity")?,
                    status: raw_status.parse::<UnitStatus>().map_err(RepositoryError::Decode)?,
                })
            })
            .collect()
    }

    async fn export_maintenance(
        &self,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<Vec<MaintenanceExportRow>, RepositoryError> {
        let (start, end) = range_bounds(range);
        let rows = sqlx::query(
            "SELECT r.created_at, u.name AS requester_name, c.name AS category_name,
                    i.name AS item_name, s.serial_number, r.reason, r.status, r.remark
             FROM maintenance_request r
             JOIN user u ON u.id = r.user_id
             LEFT JOIN unit s ON s.id = r.unit_id
             LEFT JOIN item i ON i.id = s.item_id
             LEFT JOIN category c ON c.id = i.category_id
             WHERE (?1 IS NULL OR r.created_at >= ?1)
               AND (?2 IS NULL OR r.created_at < ?2)
             ORDER BY r.created_at ASC",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let raw_status: String = row.try_get("status")?;
                Ok(MaintenanceExportRow {
                    created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
                    requester_name: row.try_get("requester_name")?,
                    category_name: row.try_get("category_name")?,
                    item_name: row.try_get("item_name")?,
                    serial_number: row.try_get("serial_number")?,
                    reason: row.try_get("reason")?,
                    status: raw_status
                        .parse::<RequestStatus>()
                        .map_err(RepositoryError::Decode)?,
                    remark: row.try_get("remark")?,
                })
            })
            .collect()
    }

    async fn export_activity(
        &self,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<Vec<ActivityExportRow>, RepositoryError> {
        let (start, end) = range_bounds(range);
        let rows = sqlx::query(
            "SELECT a.recorded_at, u.name AS user_name, a.action, a.detail
             FROM activity_log a
             JOIN user u ON u.id = a.user_id
             WHERE (?1 IS NULL OR a.recorded_at >= ?1)
               AND (?2 IS NULL OR a.recorded_at < ?2)
             ORDER BY a.recorded_at ASC",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let raw_action: String = row.try_get("action")?;
                Ok(ActivityExportRow {
                    recorded_at: parse_timestamp("recorded_at", row.try_get("recorded_at")?)?,
                    user_name: row.try_get("user_name")?,
                    action: raw_action.parse::<ActionCode>().map_err(RepositoryError::Decode)?,
                    detail: row.try_get("detail")?,
                })
            })
            .collect()
    }
}
