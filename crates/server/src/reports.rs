//! Dashboards, cached monthly reports, the activity log listing, and CSV
//! exports. Everything reads through the report repository; the only write
//! path is the monthly cache refresh.

use axum::extract::{Query, State};
use axum::http::header::{HeaderName, CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::domain::activity::ActivityLogEntry;
use stockroom_core::domain::category::CategoryId;
use stockroom_core::domain::report::{MonthlyReport, ReportMonth};
use stockroom_core::domain::unit::UnitStatus;
use stockroom_core::domain::user::UserId;
use stockroom_db::repositories::{
    ActivityLogFilter, ActivityLogRepository, ReportRepository, SqlActivityLogRepository,
    SqlReportRepository,
};

use crate::auth::{require_admin, CurrentUser};
use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/stats/overview", get(overview))
        .route("/api/stats/usage", get(usage_stats))
        .route("/api/reports/monthly", get(monthly_report).post(refresh_monthly_report))
        .route("/api/activity", get(list_activity))
        .route("/api/export", get(export_csv))
}

/// Query dates are whole days, inclusive on both ends; the repositories work
/// with half-open instants, so the end day is widened by one.
fn parse_day(raw: &str, field: &'static str) -> Result<DateTime<Utc>, ApiError> {
    let day = raw
        .parse::<NaiveDate>()
        .map_err(|_| ApiError::Validation(format!("{field} must be a YYYY-MM-DD date")))?;
    Ok(day.and_time(NaiveTime::MIN).and_utc())
}

fn parse_range(
    start: Option<&str>,
    end: Option<&str>,
) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>, ApiError> {
    let range = match (start, end) {
        (None, None) => None,
        (Some(start), Some(end)) => {
            let start = parse_day(start, "start")?;
            let end = parse_day(end, "end")? + Duration::days(1);
            if end <= start {
                return Err(ApiError::Validation("end must not precede start".to_owned()));
            }
            Some((start, end))
        }
        _ => {
            return Err(ApiError::Validation(
                "start and end must be provided together".to_owned(),
            ));
        }
    };
    Ok(range)
}

// ---- dashboard stats ----

#[derive(Debug, Serialize)]
struct StatusBreakdown {
    status: UnitStatus,
    count: i64,
}

#[derive(Debug, Serialize)]
struct OverviewResponse {
    total_categories: i64,
    total_items: i64,
    total_units: i64,
    total_quantity: i64,
    low_stock_units: i64,
    pending_usage_requests: i64,
    pending_maintenance_requests: i64,
    status_breakdown: Vec<StatusBreakdown>,
}

async fn overview(
    _user: CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<OverviewResponse>, ApiError> {
    let repo = SqlReportRepository::new(state.db_pool.clone());
    let stats = repo.overview().await?;
    let counts = repo.unit_status_counts().await?;

    // Zero-fill so the dashboard always sees every status bucket.
    let status_breakdown = UnitStatus::ALL
        .into_iter()
        .map(|status| StatusBreakdown {
            status,
            count: counts
                .iter()
                .find(|bucket| bucket.status == status)
                .map(|bucket| bucket.count)
                .unwrap_or(0),
        })
        .collect();

    Ok(Json(OverviewResponse {
        total_categories: stats.total_categories,
        total_items: stats.total_items,
        total_units: stats.total_units,
        total_quantity: stats.total_quantity,
        low_stock_units: stats.low_stock_units,
        pending_usage_requests: stats.pending_usage_requests,
        pending_maintenance_requests: stats.pending_maintenance_requests,
        status_breakdown,
    }))
}

#[derive(Debug, Deserialize)]
struct UsageStatsQuery {
    days: Option<i64>,
}

#[derive(Debug, Serialize)]
struct UsagePoint {
    day: String,
    count: i64,
}

async fn usage_stats(
    _user: CurrentUser,
    Query(query): Query<UsageStatsQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<UsagePoint>>, ApiError> {
    let days = query.days.unwrap_or(30).clamp(1, 365);
    let since = Utc::now() - Duration::days(days);
    let points = SqlReportRepository::new(state.db_pool.clone()).usage_per_day(since).await?;
    Ok(Json(
        points.into_iter().map(|point| UsagePoint { day: point.day, count: point.count }).collect(),
    ))
}

// ---- monthly reports ----

#[derive(Debug, Deserialize)]
struct MonthlyQuery {
    month: Option<String>,
    category_id: Option<String>,
}

fn parse_month(raw: Option<&str>) -> Result<ReportMonth, ApiError> {
    let Some(raw) = raw else {
        return Err(ApiError::Validation("month is required".to_owned()));
    };
    raw.parse::<ReportMonth>().map_err(ApiError::Validation)
}

async fn monthly_report(
    _user: CurrentUser,
    Query(query): Query<MonthlyQuery>,
    State(state): State<AppState>,
) -> Result<Json<MonthlyReport>, ApiError> {
    let month = parse_month(query.month.as_deref())?;
    let category = query.category_id.map(CategoryId);

    let repo = SqlReportRepository::new(state.db_pool.clone());
    if let Some(cached) = repo.find_monthly(&month, category.as_ref()).await? {
        return Ok(Json(cached));
    }
    // Cache miss: compute once and store, so the next read is a lookup.
    let report = repo.refresh_monthly(&month, category.as_ref()).await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
struct RefreshMonthlyPayload {
    month: String,
    category_id: Option<String>,
}

async fn refresh_monthly_report(
    user: CurrentUser,
    State(state): State<AppState>,
    Json(body): Json<RefreshMonthlyPayload>,
) -> Result<Json<MonthlyReport>, ApiError> {
    require_admin(&user)?;
    let month = parse_month(Some(&body.month))?;
    let category = body.category_id.map(CategoryId);

    let report = SqlReportRepository::new(state.db_pool.clone())
        .refresh_monthly(&month, category.as_ref())
        .await?;
    Ok(Json(report))
}

// ---- activity log ----

#[derive(Debug, Deserialize)]
struct ActivityQuery {
    start: Option<String>,
    end: Option<String>,
    user_id: Option<String>,
    limit: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ActivityEntryResponse {
    #[serde(flatten)]
    entry: ActivityLogEntry,
    user_name: String,
}

async fn list_activity(
    user: CurrentUser,
    Query(query): Query<ActivityQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<ActivityEntryResponse>>, ApiError> {
    require_admin(&user)?;

    let range = parse_range(query.start.as_deref(), query.end.as_deref())?;
    let filter = ActivityLogFilter {
        start: range.map(|(start, _)| start),
        end: range.map(|(_, end)| end),
        user_id: query.user_id.map(UserId),
        limit: query.limit.unwrap_or(50).clamp(1, 500),
    };

    let entries =
        SqlActivityLogRepository::new(state.db_pool.clone()).list(&filter).await?;
    Ok(Json(
        entries
            .into_iter()
            .map(|view| ActivityEntryResponse { entry: view.entry, user_name: view.user_name })
            .collect(),
    ))
}

// ---- CSV export ----

#[derive(Debug, Deserialize)]
struct ExportQuery {
    kind: Option<String>,
    start: Option<String>,
    end: Option<String>,
}

type CsvDownload = ([(HeaderName, String); 2], Vec<u8>);

fn csv_download(kind: &str, body: Vec<u8>) -> CsvDownload {
    let filename = format!("{kind}-report-{}.csv", Utc::now().format("%Y-%m-%d"));
    (
        [
            (CONTENT_TYPE, "text/csv; charset=utf-8".to_owned()),
            (CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        body,
    )
}

fn finish_csv(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>, ApiError> {
    writer
        .into_inner()
        .map_err(|error| ApiError::Internal(format!("csv serialization failed: {error}")))
}

async fn export_csv(
    user: CurrentUser,
    Query(query): Query<ExportQuery>,
    State(state): State<AppState>,
) -> Result<CsvDownload, ApiError> {
    require_admin(&user)?;

    let Some(kind) = query.kind.as_deref() else {
        return Err(ApiError::Validation("kind is required".to_owned()));
    };
    let range = parse_range(query.start.as_deref(), query.end.as_deref())?;
    let repo = SqlReportRepository::new(state.db_pool.clone());

    let body = match kind {
        "stock" => {
            // The stock report is a snapshot; date filters do not apply.
            let mut writer = csv::Writer::from_writer(Vec::new());
            writer.write_record(["category", "item", "serial_number", "quantity", "status"])?;
            for row in repo.export_stock().await? {
                writer.write_record([
                    row.category_name,
                    row.item_name,
                    row.serial_number,
                    row.quantity.to_string(),
                    row.status.as_str().to_owned(),
                ])?;
            }
            finish_csv(writer)?
        }
        "maintenance" => {
            let mut writer = csv::Writer::from_writer(Vec::new());
            writer.write_record([
                "created_at",
                "requester",
                "category",
                "item",
                "serial_number",
                "reason",
                "status",
                "remark",
            ])?;
            for row in repo.export_maintenance(range).await? {
                writer.write_record([
                    row.created_at.to_rfc3339(),
                    row.requester_name,
                    row.category_name.unwrap_or_default(),
                    row.item_name.unwrap_or_default(),
                    row.serial_number.unwrap_or_default(),
                    row.reason,
                    row.status.as_str().to_owned(),
                    row.remark.unwrap_or_default(),
                ])?;
            }
            finish_csv(writer)?
        }
        "activity" => {
            let mut writer = csv::Writer::from_writer(Vec::new());
            writer.write_record(["recorded_at", "user", "action", "detail"])?;
            for row in repo.export_activity(range).await? {
                writer.write_record([
                    row.recorded_at.to_rfc3339(),
                    row.user_name,
                    row.action.as_str().to_owned(),
                    row.detail,
                ])?;
            }
            finish_csv(writer)?
        }
        other => {
            return Err(ApiError::Validation(format!(
                "unknown export kind `{other}`, expected stock, activity, or maintenance"
            )));
        }
    };

    Ok(csv_download(kind, body))
}
