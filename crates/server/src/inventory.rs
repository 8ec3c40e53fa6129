//! Catalog management: categories, items, and physical units. Reads are open
//! to every authenticated user; writes are admin-only, logged, and announced
//! on the live channels after they commit.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, patch, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use stockroom_core::domain::activity::{ActionCode, ActivityLogEntry};
use stockroom_core::domain::category::{Category, CategoryId};
use stockroom_core::domain::item::{Item, ItemId};
use stockroom_core::domain::unit::{Unit, UnitId, UnitStatus};
use stockroom_core::notify::{events, Channel};
use stockroom_core::DomainError;
use stockroom_db::repositories::{
    ActivityLogRepository, CategoryRepository, ItemRepository, SqlActivityLogRepository,
    SqlCategoryRepository, SqlItemRepository, SqlUnitRepository, UnitRepository,
};

use crate::auth::{require_admin, CurrentUser};
use crate::error::ApiError;
use crate::notify::{announce_low_stock, publish};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/categories", get(list_categories).post(create_category))
        .route("/api/categories/{id}", put(update_category).delete(delete_category))
        .route("/api/items", get(list_items).post(create_item))
        .route("/api/items/{id}", put(update_item).delete(delete_item))
        .route("/api/items/{id}/units", get(list_item_units).post(create_unit))
        .route("/api/units", get(list_units))
        .route("/api/units/low-stock", get(list_low_stock))
        .route("/api/units/{id}", patch(adjust_unit).delete(delete_unit))
}

/// Best-effort audit append for the standalone CRUD paths. Request workflow
/// transitions log inside their own transaction instead.
async fn record_activity(state: &AppState, entry: ActivityLogEntry) {
    if let Err(error) = SqlActivityLogRepository::new(state.db_pool.clone()).append(entry).await {
        warn!(
            event_name = "inventory.audit.write_failed",
            error = %error,
            "failed to append activity log entry"
        );
    }
}

fn catalog_changed(state: &AppState, entity: &str, op: &str, id: &str) {
    publish(
        state,
        Channel::Inventory,
        events::CATALOG_CHANGED,
        json!({ "entity": entity, "op": op, "id": id }),
    );
}

fn required(raw: &str, field: &'static str) -> Result<String, ApiError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DomainError::EmptyField(field).into());
    }
    Ok(trimmed.to_owned())
}

// ---- categories ----

#[derive(Debug, Serialize)]
struct CategorySummary {
    #[serde(flatten)]
    category: Category,
    item_count: i64,
    unit_count: i64,
}

#[derive(Debug, Deserialize)]
struct CategoryPayload {
    name: String,
}

async fn list_categories(
    _user: CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<CategorySummary>>, ApiError> {
    let categories =
        SqlCategoryRepository::new(state.db_pool.clone()).list_with_counts().await?;
    Ok(Json(
        categories
            .into_iter()
            .map(|entry| CategorySummary {
                category: entry.category,
                item_count: entry.item_count,
                unit_count: entry.unit_count,
            })
            .collect(),
    ))
}

async fn create_category(
    user: CurrentUser,
    State(state): State<AppState>,
    Json(body): Json<CategoryPayload>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    require_admin(&user)?;
    let name = required(&body.name, "name")?;

    let now = Utc::now();
    let category = Category { id: CategoryId::generate(), name, created_at: now, updated_at: now };
    SqlCategoryRepository::new(state.db_pool.clone()).save(category.clone()).await?;

    record_activity(
        &state,
        ActivityLogEntry::new(
            user.user.id.clone(),
            ActionCode::CreateCategory,
            format!("created category {}", category.name),
        ),
    )
    .await;
    catalog_changed(&state, "category", "created", &category.id.0);

    Ok((StatusCode::CREATED, Json(category)))
}

async fn update_category(
    user: CurrentUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<CategoryPayload>,
) -> Result<Json<Category>, ApiError> {
    require_admin(&user)?;
    let name = required(&body.name, "name")?;

    let repo = SqlCategoryRepository::new(state.db_pool.clone());
    let Some(mut category) = repo.find_by_id(&CategoryId(id.clone())).await? else {
        return Err(ApiError::NotFound(format!("category `{id}` not found")));
    };
    category.name = name;
    category.updated_at = Utc::now();
    repo.save(category.clone()).await?;

    record_activity(
        &state,
        ActivityLogEntry::new(
            user.user.id.clone(),
            ActionCode::UpdateCategory,
            format!("renamed category to {}", category.name),
        ),
    )
    .await;
    catalog_changed(&state, "category", "updated", &category.id.0);

    Ok(Json(category))
}

async fn delete_category(
    user: CurrentUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    require_admin(&user)?;

    let repo = SqlCategoryRepository::new(state.db_pool.clone());
    let category_id = CategoryId(id.clone());
    let Some(category) = repo.find_by_id(&category_id).await? else {
        return Err(ApiError::NotFound(format!("category `{id}` not found")));
    };
    let items = repo.count_items(&category_id).await?;
    if items > 0 {
        return Err(ApiError::Conflict(format!(
            "category {} still has {items} item(s)",
            category.name
        )));
    }
    if repo.delete(&category_id).await? == 0 {
        return Err(ApiError::NotFound(format!("category `{id}` not found")));
    }

    record_activity(
        &state,
        ActivityLogEntry::new(
            user.user.id.clone(),
            ActionCode::DeleteCategory,
            format!("deleted category {}", category.name),
        ),
    )
    .await;
    catalog_changed(&state, "category", "deleted", &category_id.0);

    Ok(StatusCode::NO_CONTENT)
}

// ---- items ----

#[derive(Debug, Serialize)]
struct ItemSummary {
    #[serde(flatten)]
    item: Item,
    unit_count: i64,
}

#[derive(Debug, Deserialize)]
struct ItemQuery {
    category_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateItemPayload {
    name: String,
    category_id: String,
}

#[derive(Debug, Deserialize)]
struct UpdateItemPayload {
    name: Option<String>,
    category_id: Option<String>,
}

async fn list_items(
    _user: CurrentUser,
    Query(query): Query<ItemQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<ItemSummary>>, ApiError> {
    let category_id = query.category_id.map(CategoryId);
    let items = SqlItemRepository::new(state.db_pool.clone())
        .list_with_unit_counts(category_id.as_ref())
        .await?;
    Ok(Json(
        items
            .into_iter()
            .map(|(item, unit_count)| ItemSummary { item, unit_count })
            .collect(),
    ))
}

async fn create_item(
    user: CurrentUser,
    State(state): State<AppState>,
    Json(body): Json<CreateItemPayload>,
) -> Result<(StatusCode, Json<Item>), ApiError> {
    require_admin(&user)?;
    let name = required(&body.name, "name")?;

    let category_id = CategoryId(body.category_id.clone());
    let category = SqlCategoryRepository::new(state.db_pool.clone())
        .find_by_id(&category_id)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("category `{}` not found", body.category_id))
        })?;

    let now = Utc::now();
    let item =
        Item { id: ItemId::generate(), name, category_id, created_at: now, updated_at: now };
    SqlItemRepository::new(state.db_pool.clone()).save(item.clone()).await?;

    record_activity(
        &state,
        ActivityLogEntry::new(
            user.user.id.clone(),
            ActionCode::CreateItem,
            format!("created item {} in {}", item.name, category.name),
        )
        .with_item(item.id.clone()),
    )
    .await;
    catalog_changed(&state, "item", "created", &item.id.0);

    Ok((StatusCode::CREATED, Json(item)))
}

async fn update_item(
    user: CurrentUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<UpdateItemPayload>,
) -> Result<Json<Item>, ApiError> {
    require_admin(&user)?;

    let repo = SqlItemRepository::new(state.db_pool.clone());
    let Some(mut item) = repo.find_by_id(&ItemId(id.clone())).await? else {
        return Err(ApiError::NotFound(format!("item `{id}` not found")));
    };

    if let Some(name) = body.name {
        item.name = required(&name, "name")?;
    }
    if let Some(raw) = body.category_id {
        let category_id = CategoryId(raw.clone());
        if SqlCategoryRepository::new(state.db_pool.clone())
            .find_by_id(&category_id)
            .await?
            .is_none()
        {
            return Err(ApiError::NotFound(format!("category `{raw}` not found")));
        }
        item.category_id = category_id;
    }
    item.updated_at = Utc::now();
    repo.save(item.clone()).await?;

    record_activity(
        &state,
        ActivityLogEntry::new(
            user.user.id.clone(),
            ActionCode::UpdateItem,
            format!("updated item {}", item.name),
        )
        .with_item(item.id.clone()),
    )
    .await;
    catalog_changed(&state, "item", "updated", &item.id.0);

    Ok(Json(item))
}

async fn delete_item(
    user: CurrentUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    require_admin(&user)?;

    let repo = SqlItemRepository::new(state.db_pool.clone());
    let item_id = ItemId(id.clone());
    let Some(item) = repo.find_by_id(&item_id).await? else {
        return Err(ApiError::NotFound(format!("item `{id}` not found")));
    };
    let units = repo.count_units(&item_id).await?;
    if units > 0 {
        return Err(ApiError::Conflict(format!(
            "item {} still has {units} unit(s)",
            item.name
        )));
    }
    if repo.delete(&item_id).await? == 0 {
        return Err(ApiError::NotFound(format!("item `{id}` not found")));
    }

    record_activity(
        &state,
        ActivityLogEntry::new(
            user.user.id.clone(),
            ActionCode::DeleteItem,
            format!("deleted item {}", item.name),
        ),
    )
    .await;
    catalog_changed(&state, "item", "deleted", &item_id.0);

    Ok(StatusCode::NO_CONTENT)
}

// ---- units ----

#[derive(Debug, Deserialize)]
struct UnitQuery {
    item_id: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateUnitPayload {
    serial_number: String,
    #[serde(default)]
    quantity: Option<i64>,
    #[serde(default)]
    low_stock_threshold: Option<i64>,
    #[serde(default)]
    status: Option<UnitStatus>,
}

#[derive(Debug, Deserialize)]
struct AdjustUnitPayload {
    status: Option<UnitStatus>,
    quantity: Option<i64>,
    low_stock_threshold: Option<i64>,
}

fn parse_status(raw: &str) -> Result<UnitStatus, ApiError> {
    raw.parse::<UnitStatus>().map_err(ApiError::Validation)
}

fn non_negative(value: i64, field: &'static str) -> Result<i64, ApiError> {
    if value < 0 {
        return Err(ApiError::Validation(format!("{field} must not be negative")));
    }
    Ok(value)
}

async fn list_item_units(
    _user: CurrentUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<Unit>>, ApiError> {
    let item_id = ItemId(id.clone());
    if SqlItemRepository::new(state.db_pool.clone()).find_by_id(&item_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("item `{id}` not found")));
    }
    let units =
        SqlUnitRepository::new(state.db_pool.clone()).list(Some(&item_id), None).await?;
    Ok(Json(units))
}

async fn list_units(
    _user: CurrentUser,
    Query(query): Query<UnitQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<Unit>>, ApiError> {
    let item_id = query.item_id.map(ItemId);
    let status = query.status.as_deref().map(parse_status).transpose()?;
    let units =
        SqlUnitRepository::new(state.db_pool.clone()).list(item_id.as_ref(), status).await?;
    Ok(Json(units))
}

async fn list_low_stock(
    _user: CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Unit>>, ApiError> {
    let units = SqlUnitRepository::new(state.db_pool.clone()).list_low_stock().await?;
    Ok(Json(units))
}

async fn create_unit(
    user: CurrentUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<CreateUnitPayload>,
) -> Result<(StatusCode, Json<Unit>), ApiError> {
    require_admin(&user)?;

    let item_id = ItemId(id.clone());
    let Some(item) =
        SqlItemRepository::new(state.db_pool.clone()).find_by_id(&item_id).await?
    else {
        return Err(ApiError::NotFound(format!("item `{id}` not found")));
    };

    let serial_number = required(&body.serial_number, "serial_number")?;
    let quantity = non_negative(body.quantity.unwrap_or(1), "quantity")?;
    let low_stock_threshold = non_negative(
        body.low_stock_threshold.unwrap_or(state.default_low_stock_threshold),
        "low_stock_threshold",
    )?;

    let now = Utc::now();
    let unit = Unit {
        id: UnitId::generate(),
        item_id: item.id.clone(),
        serial_number,
        status: body.status.unwrap_or(UnitStatus::Available),
        quantity,
        low_stock_threshold,
        created_at: now,
        updated_at: now,
    };
    SqlUnitRepository::new(state.db_pool.clone()).save(unit.clone()).await?;

    record_activity(
        &state,
        ActivityLogEntry::new(
            user.user.id.clone(),
            ActionCode::CreateUnit,
            format!("created unit {} of {}", unit.serial_number, item.name),
        )
        .with_item(item.id.clone())
        .with_unit(unit.id.clone()),
    )
    .await;
    catalog_changed(&state, "unit", "created", &unit.id.0);

    Ok((StatusCode::CREATED, Json(unit)))
}

fn describe_adjustment(before: &Unit, after: &Unit) -> String {
    let mut changes = Vec::new();
    if before.status != after.status {
        changes.push(format!("status {} -> {}", before.status.as_str(), after.status.as_str()));
    }
    if before.quantity != after.quantity {
        changes.push(format!("quantity {} -> {}", before.quantity, after.quantity));
    }
    if before.low_stock_threshold != after.low_stock_threshold {
        changes.push(format!(
            "threshold {} -> {}",
            before.low_stock_threshold, after.low_stock_threshold
        ));
    }
    if changes.is_empty() {
        return format!("adjusted unit {} (no changes)", after.serial_number);
    }
    format!("adjusted unit {}: {}", after.serial_number, changes.join(", "))
}

async fn adjust_unit(
    user: CurrentUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<AdjustUnitPayload>,
) -> Result<Json<Unit>, ApiError> {
    require_admin(&user)?;

    let repo = SqlUnitRepository::new(state.db_pool.clone());
    let Some(before) = repo.find_by_id(&UnitId(id.clone())).await? else {
        return Err(ApiError::NotFound(format!("unit `{id}` not found")));
    };

    let mut unit = before.clone();
    if let Some(status) = body.status {
        unit.status = status;
    }
    if let Some(quantity) = body.quantity {
        unit.quantity = non_negative(quantity, "quantity")?;
    }
    if let Some(threshold) = body.low_stock_threshold {
        unit.low_stock_threshold = non_negative(threshold, "low_stock_threshold")?;
    }
    unit.updated_at = Utc::now();
    repo.save(unit.clone()).await?;

    record_activity(
        &state,
        ActivityLogEntry::new(
            user.user.id.clone(),
            ActionCode::AdjustStock,
            describe_adjustment(&before, &unit),
        )
        .with_item(unit.item_id.clone())
        .with_unit(unit.id.clone()),
    )
    .await;

    if before.status != unit.status {
        publish(
            &state,
            Channel::Inventory,
            events::STATUS_CHANGED,
            json!({
                "unit_id": unit.id.0,
                "from": before.status,
                "to": unit.status,
            }),
        );
    }
    if !before.is_low_stock() && unit.is_low_stock() {
        let item_name = SqlItemRepository::new(state.db_pool.clone())
            .find_by_id(&unit.item_id)
            .await?
            .map(|item| item.name)
            .unwrap_or_else(|| "unknown item".to_owned());
        announce_low_stock(&state, &unit, &item_name).await;
    }

    Ok(Json(unit))
}

async fn delete_unit(
    user: CurrentUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    require_admin(&user)?;

    let repo = SqlUnitRepository::new(state.db_pool.clone());
    let unit_id = UnitId(id.clone());
    let Some(unit) = repo.find_by_id(&unit_id).await? else {
        return Err(ApiError::NotFound(format!("unit `{id}` not found")));
    };
    if repo.delete(&unit_id).await? == 0 {
        // The guarded delete declined. Re-read to tell a pinned unit apart
        // from one deleted under our feet.
        return match repo.find_by_id(&unit_id).await? {
            Some(_) => Err(ApiError::Conflict(format!(
                "unit {} is referenced by open requests",
                unit.serial_number
            ))),
            None => Err(ApiError::NotFound(format!("unit `{id}` not found"))),
        };
    }

    record_activity(
        &state,
        ActivityLogEntry::new(
            user.user.id.clone(),
            ActionCode::DeleteUnit,
            format!("deleted unit {}", unit.serial_number),
        )
        .with_item(unit.item_id.clone()),
    )
    .await;
    catalog_changed(&state, "unit", "deleted", &unit_id.0);

    Ok(StatusCode::NO_CONTENT)
}
