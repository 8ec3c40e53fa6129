//! Usage and maintenance request endpoints. All state transitions run inside
//! the workflow store's transactions; this layer adds authorization context,
//! response shaping, and the post-commit fan-out (notifications and live
//! events).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;

use stockroom_core::domain::notification::NotificationKind;
use stockroom_core::domain::request::{
    Decision, MaintenanceRequest, MaintenanceRequestId, RequestStatus, UsageRequest,
    UsageRequestId,
};
use stockroom_core::domain::unit::{Unit, UnitId, UnitStatus};
use stockroom_core::notify::{events, Channel};
use stockroom_db::repositories::{
    MaintenanceDecision, MaintenanceRequestRepository, MaintenanceRequestView,
    SqlMaintenanceRequestRepository, SqlUsageRequestRepository, SqlWorkflowStore, UsageDecision,
    UsageRequestRepository, UsageRequestView,
};

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::notify::{announce_low_stock, notify_admins, notify_user, publish};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/requests/usage", get(list_usage).post(create_usage))
        .route("/api/requests/usage/{id}", patch(decide_usage).delete(delete_usage))
        .route("/api/requests/maintenance", get(list_maintenance).post(create_maintenance))
        .route(
            "/api/requests/maintenance/{id}",
            patch(decide_maintenance).delete(delete_maintenance),
        )
}

fn subject(item_name: Option<&str>, serial_number: Option<&str>) -> String {
    match (item_name, serial_number) {
        (Some(item), Some(serial)) => format!("{item} ({serial})"),
        (Some(item), None) => item.to_owned(),
        (None, Some(serial)) => format!("unit {serial}"),
        (None, None) => "a removed unit".to_owned(),
    }
}

/// An approval can push an AVAILABLE unit to or below its threshold. The
/// pre-decision quantity is the post-decision one plus what was taken.
fn crossed_into_low_stock(unit: &Unit, decremented_by: i64) -> bool {
    unit.is_low_stock() && unit.quantity + decremented_by > unit.low_stock_threshold
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    status: Option<String>,
}

impl StatusQuery {
    fn parse(&self) -> Result<Option<RequestStatus>, ApiError> {
        self.status
            .as_deref()
            .map(|raw| raw.parse::<RequestStatus>().map_err(ApiError::Validation))
            .transpose()
    }
}

#[derive(Debug, Deserialize)]
struct DecisionPayload {
    status: Decision,
    remark: Option<String>,
}

// ---- usage ----

#[derive(Debug, Deserialize)]
struct CreateUsagePayload {
    unit_id: String,
    quantity: i64,
    reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct UsageRequestResponse {
    #[serde(flatten)]
    request: UsageRequest,
    requester_name: String,
    item_name: Option<String>,
    serial_number: Option<String>,
}

impl From<UsageRequestView> for UsageRequestResponse {
    fn from(view: UsageRequestView) -> Self {
        Self {
            request: view.request,
            requester_name: view.requester_name,
            item_name: view.item_name,
            serial_number: view.serial_number,
        }
    }
}

impl From<UsageDecision> for UsageRequestResponse {
    fn from(decision: UsageDecision) -> Self {
        Self {
            request: decision.request,
            requester_name: decision.requester_name,
            item_name: decision.item_name,
            serial_number: decision.serial_number,
        }
    }
}

async fn list_usage(
    user: CurrentUser,
    Query(query): Query<StatusQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<UsageRequestResponse>>, ApiError> {
    let status = query.parse()?;
    let requester = if user.is_admin() { None } else { Some(user.user.id.clone()) };
    let views = SqlUsageRequestRepository::new(state.db_pool.clone())
        .list(requester.as_ref(), status)
        .await?;
    Ok(Json(views.into_iter().map(UsageRequestResponse::from).collect()))
}

async fn create_usage(
    user: CurrentUser,
    State(state): State<AppState>,
    Json(body): Json<CreateUsagePayload>,
) -> Result<(StatusCode, Json<UsageRequestResponse>), ApiError> {
    let view = SqlWorkflowStore::new(state.db_pool.clone())
        .create_usage_request(
            &user.principal(),
            &UnitId(body.unit_id),
            body.quantity,
            body.reason,
        )
        .await?;

    notify_admins(
        &state,
        "New usage request",
        &format!(
            "{} requested {} x {}",
            view.requester_name,
            view.request.quantity,
            subject(view.item_name.as_deref(), view.serial_number.as_deref()),
        ),
        NotificationKind::Request,
    )
    .await;
    publish(
        &state,
        Channel::Admin,
        events::REQUEST_CREATED,
        json!({ "kind": "usage", "request_id": view.request.id.0 }),
    );

    Ok((StatusCode::CREATED, Json(view.into())))
}

async fn decide_usage(
    user: CurrentUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<DecisionPayload>,
) -> Result<Json<UsageRequestResponse>, ApiError> {
    let outcome = SqlWorkflowStore::new(state.db_pool.clone())
        .decide_usage_request(&user.principal(), &UsageRequestId(id), body.status, body.remark)
        .await?;

    let verb = match body.status {
        Decision::Approved => "approved",
        Decision::Rejected => "rejected",
    };
    let mut message = format!(
        "Your request for {} x {} was {verb}",
        outcome.request.quantity,
        subject(outcome.item_name.as_deref(), outcome.serial_number.as_deref()),
    );
    if let Some(remark) = &outcome.request.remark {
        message.push_str(": ");
        message.push_str(remark);
    }
    notify_user(
        &state,
        &outcome.request.user_id,
        &format!("Usage request {verb}"),
        &message,
        NotificationKind::StatusChange,
    )
    .await;
    publish(
        &state,
        Channel::Admin,
        events::REQUEST_UPDATED,
        json!({
            "kind": "usage",
            "request_id": outcome.request.id.0,
            "status": outcome.request.status,
        }),
    );

    if body.status == Decision::Approved {
        if let Some(unit) = &outcome.unit {
            // Fully drained stock flips the unit to USED inside the
            // transaction; mirror it on the live channel.
            if unit.status == UnitStatus::Used && unit.quantity == 0 {
                publish(
                    &state,
                    Channel::Inventory,
                    events::STATUS_CHANGED,
                    json!({ "unit_id": unit.id.0, "to": unit.status }),
                );
            }
            if crossed_into_low_stock(unit, outcome.request.quantity) {
                let item_name = outcome.item_name.as_deref().unwrap_or("unknown item");
                announce_low_stock(&state, unit, item_name).await;
            }
        }
    }

    Ok(Json(outcome.into()))
}

async fn delete_usage(
    user: CurrentUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let view = SqlWorkflowStore::new(state.db_pool.clone())
        .delete_usage_request(&user.principal(), &UsageRequestId(id))
        .await?;

    publish(
        &state,
        Channel::Admin,
        events::REQUEST_DELETED,
        json!({ "kind": "usage", "request_id": view.request.id.0 }),
    );

    Ok(StatusCode::NO_CONTENT)
}

// ---- maintenance ----

#[derive(Debug, Deserialize)]
struct CreateMaintenancePayload {
    unit_id: String,
    reason: String,
}

#[derive(Debug, Serialize)]
struct MaintenanceRequestResponse {
    #[serde(flatten)]
    request: MaintenanceRequest,
    requester_name: String,
    item_name: Option<String>,
    serial_number: Option<String>,
}

impl From<MaintenanceRequestView> for MaintenanceRequestResponse {
    fn from(view: MaintenanceRequestView) -> Self {
        Self {
            request: view.request,
            requester_name: view.requester_name,
            item_name: view.item_name,
            serial_number: view.serial_number,
        }
    }
}

impl From<MaintenanceDecision> for MaintenanceRequestResponse {
    fn from(decision: MaintenanceDecision) -> Self {
        Self {
            request: decision.request,
            requester_name: decision.requester_name,
            item_name: decision.item_name,
            serial_number: decision.serial_number,
        }
    }
}

async fn list_maintenance(
    user: CurrentUser,
    Query(query): Query<StatusQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<MaintenanceRequestResponse>>, ApiError> {
    let status = query.parse()?;
    let requester = if user.is_admin() { None } else { Some(user.user.id.clone()) };
    let views = SqlMaintenanceRequestRepository::new(state.db_pool.clone())
        .list(requester.as_ref(), status)
        .await?;
    Ok(Json(views.into_iter().map(MaintenanceRequestResponse::from).collect()))
}

async fn create_maintenance(
    user: CurrentUser,
    State(state): State<AppState>,
    Json(body): Json<CreateMaintenancePayload>,
) -> Result<(StatusCode, Json<MaintenanceRequestResponse>), ApiError> {
    let view = SqlWorkflowStore::new(state.db_pool.clone())
        .create_maintenance_request(&user.principal(), &UnitId(body.unit_id), body.reason)
        .await?;

    notify_admins(
        &state,
        "New maintenance request",
        &format!(
            "{} reported {}: {}",
            view.requester_name,
            subject(view.item_name.as_deref(), view.serial_number.as_deref()),
            view.request.reason,
        ),
        NotificationKind::Request,
    )
    .await;
    publish(
        &state,
        Channel::Admin,
        events::REQUEST_CREATED,
        json!({ "kind": "maintenance", "request_id": view.request.id.0 }),
    );

    Ok((StatusCode::CREATED, Json(view.into())))
}

async fn decide_maintenance(
    user: CurrentUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<DecisionPayload>,
) -> Result<Json<MaintenanceRequestResponse>, ApiError> {
    let outcome = SqlWorkflowStore::new(state.db_pool.clone())
        .decide_maintenance_request(
            &user.principal(),
            &MaintenanceRequestId(id),
            body.status,
            body.remark,
        )
        .await?;

    let verb = match body.status {
        Decision::Approved => "approved",
        Decision::Rejected => "rejected",
    };
    let mut message = format!(
        "Your maintenance request for {} was {verb}",
        subject(outcome.item_name.as_deref(), outcome.serial_number.as_deref()),
    );
    if let Some(remark) = &outcome.request.remark {
        message.push_str(": ");
        message.push_str(remark);
    }
    notify_user(
        &state,
        &outcome.request.user_id,
        &format!("Maintenance request {verb}"),
        &message,
        NotificationKind::StatusChange,
    )
    .await;
    publish(
        &state,
        Channel::Admin,
        events::REQUEST_UPDATED,
        json!({
            "kind": "maintenance",
            "request_id": outcome.request.id.0,
            "status": outcome.request.status,
        }),
    );

    if body.status == Decision::Approved {
        if let Some(unit) = &outcome.unit {
            if unit.status == UnitStatus::Maintenance {
                publish(
                    &state,
                    Channel::Inventory,
                    events::STATUS_CHANGED,
                    json!({ "unit_id": unit.id.0, "to": unit.status }),
                );
            }
        }
    }

    Ok(Json(outcome.into()))
}

async fn delete_maintenance(
    user: CurrentUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let view = SqlWorkflowStore::new(state.db_pool.clone())
        .delete_maintenance_request(&user.principal(), &MaintenanceRequestId(id))
        .await?;

    publish(
        &state,
        Channel::Admin,
        events::REQUEST_DELETED,
        json!({ "kind": "maintenance", "request_id": view.request.id.0 }),
    );

    Ok(StatusCode::NO_CONTENT)
}
