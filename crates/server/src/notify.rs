//! Persisted notifications and their fan-out to the live channels. The
//! helpers here are deliberately best-effort: a failed insert or publish is
//! traced and swallowed, because the state change that triggered it has
//! already committed.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use stockroom_core::domain::notification::{Notification, NotificationId, NotificationKind};
use stockroom_core::domain::unit::Unit;
use stockroom_core::domain::user::{Role, UserId};
use stockroom_core::notify::{events, Channel, EventEnvelope};
use stockroom_db::repositories::{
    NotificationRepository, SqlNotificationRepository, SqlUserRepository, UserRepository,
};

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/{id}/read", post(mark_read))
        .route("/api/notifications/read-all", post(mark_all_read))
}

/// Fire-and-forget publish to a live channel.
pub fn publish(state: &AppState, channel: Channel, event: &str, payload: serde_json::Value) {
    state.publisher.publish(EventEnvelope::new(channel, event, payload));
}

/// Persist a notification for one user and push it to their private channel.
pub async fn notify_user(
    state: &AppState,
    user_id: &UserId,
    title: &str,
    message: &str,
    kind: NotificationKind,
) {
    let notification = Notification::new(user_id.clone(), title, message, kind);
    if let Err(error) = SqlNotificationRepository::new(state.db_pool.clone())
        .save(notification.clone())
        .await
    {
        warn!(
            event_name = "notify.persist_failed",
            user_id = %user_id,
            error = %error,
            "failed to persist notification"
        );
    }
    let payload = serde_json::to_value(&notification)
        .unwrap_or_else(|_| json!({ "id": notification.id.0 }));
    publish(state, Channel::User(user_id.clone()), events::NOTIFICATION, payload);
}

/// Announce a unit that has just crossed into low stock: a persisted
/// notification per admin plus a `stock:low` event on the admin channel.
pub async fn announce_low_stock(state: &AppState, unit: &Unit, item_name: &str) {
    notify_admins(
        state,
        "Low stock",
        &format!("{item_name} ({}) is down to {}", unit.serial_number, unit.quantity),
        NotificationKind::LowStock,
    )
    .await;
    publish(
        state,
        Channel::Admin,
        events::STOCK_LOW,
        json!({
            "unit_id": unit.id.0,
            "serial_number": unit.serial_number,
            "quantity": unit.quantity,
            "threshold": unit.low_stock_threshold,
        }),
    );
}

/// Same as [`notify_user`], delivered to every admin account.
pub async fn notify_admins(state: &AppState, title: &str, message: &str, kind: NotificationKind) {
    let admins =
        match SqlUserRepository::new(state.db_pool.clone()).list_ids_by_role(Role::Admin).await {
            Ok(admins) => admins,
            Err(error) => {
                warn!(
                    event_name = "notify.admin_lookup_failed",
                    error = %error,
                    "failed to resolve admin accounts"
                );
                return;
            }
        };
    for admin_id in admins {
        notify_user(state, &admin_id, title, message, kind).await;
    }
}

#[derive(Debug, Default, Deserialize)]
struct NotificationQuery {
    #[serde(default)]
    unread: bool,
}

async fn list_notifications(
    user: CurrentUser,
    Query(query): Query<NotificationQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<Notification>>, ApiError> {
    let notifications = SqlNotificationRepository::new(state.db_pool.clone())
        .list_for_user(&user.user.id, query.unread)
        .await?;
    Ok(Json(notifications))
}

async fn mark_read(
    user: CurrentUser,
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let updated = SqlNotificationRepository::new(state.db_pool.clone())
        .mark_read(&NotificationId(id.clone()), &user.user.id)
        .await?;
    if updated == 0 {
        // Covers both a bad id and someone else's notification.
        return Err(ApiError::NotFound(format!("notification `{id}` not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn mark_all_read(
    user: CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let updated = SqlNotificationRepository::new(state.db_pool.clone())
        .mark_all_read(&user.user.id)
        .await?;
    Ok(Json(json!({ "updated": updated })))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::{Path, Query, State};
    use axum::http::StatusCode;

    use stockroom_core::domain::notification::NotificationKind;
    use stockroom_core::domain::user::{Role, User, UserId};
    use stockroom_core::notify::{events, InMemoryPublisher};
    use stockroom_db::repositories::{NotificationRepository, SqlNotificationRepository};
    use stockroom_db::{connect_with_settings, migrations};

    use super::{list_notifications, mark_read, notify_admins, notify_user, NotificationQuery};
    use crate::auth::tests::seed_user;
    use crate::auth::CurrentUser;
    use crate::state::AppState;

    async fn state_with_publisher() -> (AppState, InMemoryPublisher) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let publisher = InMemoryPublisher::default();
        let state = AppState::for_tests(pool, Arc::new(publisher.clone()));
        (state, publisher)
    }

    fn as_current(user: User) -> CurrentUser {
        CurrentUser { user, token: "test-token".to_owned() }
    }

    #[tokio::test]
    async fn notify_user_persists_and_publishes_to_the_private_channel() {
        let (state, publisher) = state_with_publisher().await;
        let user = seed_user(&state, "u-1", Role::User, "pw").await;

        notify_user(&state, &user.id, "Request approved", "2 x ThinkPad", NotificationKind::StatusChange)
            .await;

        let stored = SqlNotificationRepository::new(state.db_pool.clone())
            .list_for_user(&user.id, false)
            .await
            .expect("list");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].title, "Request approved");
        assert!(!stored[0].is_read);

        let published = publisher.events();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].channel, "user-u-1");
        assert_eq!(published[0].event, events::NOTIFICATION);
        assert_eq!(published[0].payload["message"], "2 x ThinkPad");
    }

    #[tokio::test]
    async fn notify_admins_reaches_every_admin_inbox() {
        let (state, publisher) = state_with_publisher().await;
        seed_user(&state, "a-1", Role::Admin, "pw").await;
        seed_user(&state, "a-2", Role::Admin, "pw").await;
        let regular = seed_user(&state, "u-1", Role::User, "pw").await;

        notify_admins(&state, "New request", "Pat requested 1 x Projector", NotificationKind::Request)
            .await;

        let repo = SqlNotificationRepository::new(state.db_pool.clone());
        for admin in ["a-1", "a-2"] {
            let inbox =
                repo.list_for_user(&UserId(admin.to_owned()), true).await.expect("inbox");
            assert_eq!(inbox.len(), 1, "admin {admin} should be notified");
        }
        let regular_inbox = repo.list_for_user(&regular.id, false).await.expect("inbox");
        assert!(regular_inbox.is_empty());

        let channels: Vec<_> =
            publisher.events().into_iter().map(|envelope| envelope.channel).collect();
        assert!(channels.contains(&"user-a-1".to_owned()));
        assert!(channels.contains(&"user-a-2".to_owned()));
    }

    #[tokio::test]
    async fn mark_read_is_scoped_to_the_owner() {
        let (state, _) = state_with_publisher().await;
        let owner = seed_user(&state, "u-1", Role::User, "pw").await;
        let other = seed_user(&state, "u-2", Role::User, "pw").await;

        notify_user(&state, &owner.id, "Hello", "for the owner", NotificationKind::Request).await;
        let stored = SqlNotificationRepository::new(state.db_pool.clone())
            .list_for_user(&owner.id, false)
            .await
            .expect("list");
        let id = stored[0].id.0.clone();

        let rejection = mark_read(as_current(other), Path(id.clone()), State(state.clone()))
            .await
            .expect_err("foreign notification");
        assert_eq!(rejection.status(), StatusCode::NOT_FOUND);

        let status = mark_read(as_current(owner.clone()), Path(id), State(state.clone()))
            .await
            .expect("owner marks read");
        assert_eq!(status, StatusCode::NO_CONTENT);

        let unread = list_notifications(
            as_current(owner),
            Query(NotificationQuery { unread: true }),
            State(state),
        )
        .await
        .expect("unread list");
        assert!(unread.0.is_empty());
    }

    #[tokio::test]
    async fn persistence_failure_still_publishes_the_live_event() {
        let (state, publisher) = state_with_publisher().await;

        // No such user row: the insert violates the foreign key, the live
        // event still goes out.
        notify_user(
            &state,
            &UserId("ghost".to_owned()),
            "Orphan",
            "no user row",
            NotificationKind::Request,
        )
        .await;

        assert_eq!(publisher.events().len(), 1);
        assert_eq!(publisher.events()[0].channel, "user-ghost");
    }
}
