//! Session authentication: login issues an opaque bearer token, every other
//! route resolves it through the [`CurrentUser`] extractor.

use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use stockroom_core::domain::session::Session;
use stockroom_core::domain::user::{Principal, User};
use stockroom_db::repositories::{
    SessionRepository, SqlSessionRepository, SqlUserRepository, UserRepository,
};

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
}

/// The authenticated caller, resolved from the bearer token. Carrying the
/// token lets logout delete exactly the session that authenticated the call.
#[derive(Debug)]
pub struct CurrentUser {
    pub user: User,
    pub token: String,
}

impl CurrentUser {
    pub fn principal(&self) -> Principal {
        Principal::new(self.user.id.clone(), self.user.role)
    }

    pub fn is_admin(&self) -> bool {
        self.principal().is_admin()
    }
}

/// Admin gate for handlers outside the workflow store, which checks roles
/// itself.
pub fn require_admin(user: &CurrentUser) -> Result<(), ApiError> {
    if user.is_admin() {
        return Ok(());
    }
    Err(stockroom_core::DomainError::AdminRequired.into())
}

fn bearer_token(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token.to_owned())
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            return Err(ApiError::Unauthorized("missing bearer token".to_owned()));
        };

        let sessions = SqlSessionRepository::new(state.db_pool.clone());
        let Some(session) = sessions.find_by_token(&token).await? else {
            return Err(ApiError::Unauthorized("invalid session token".to_owned()));
        };
        if session.is_expired(Utc::now()) {
            // Expired rows are reaped lazily, on the request that trips over
            // them.
            let _ = sessions.delete(&token).await;
            return Err(ApiError::Unauthorized("session expired".to_owned()));
        }

        let users = SqlUserRepository::new(state.db_pool.clone());
        let Some(user) = users.find_by_id(&session.user_id).await? else {
            return Err(ApiError::Unauthorized("session user no longer exists".to_owned()));
        };

        Ok(CurrentUser { user, token })
    }
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    token: String,
    expires_at: DateTime<Utc>,
    user: User,
}

async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginPayload>,
) -> Result<Json<LoginResponse>, ApiError> {
    let email = body.email.trim().to_lowercase();
    let users = SqlUserRepository::new(state.db_pool.clone());

    // Unknown email and wrong password are indistinguishable to the caller.
    let Some(user) = users.find_by_email(&email).await? else {
        return Err(ApiError::Unauthorized("invalid credentials".to_owned()));
    };
    if !verify_password(body.password, user.password_hash.clone()).await? {
        warn!(
            event_name = "auth.login.rejected",
            email = %email,
            "login attempt with wrong password"
        );
        return Err(ApiError::Unauthorized("invalid credentials".to_owned()));
    }

    let session = Session::issue(user.id.clone(), state.session_ttl_hours);
    let sessions = SqlSessionRepository::new(state.db_pool.clone());
    sessions.save(session.clone()).await?;

    // Opportunistic cleanup keeps the table from accumulating dead rows
    // without a background task.
    if let Err(error) = sessions.delete_expired(Utc::now()).await {
        warn!(
            event_name = "auth.session.cleanup_failed",
            error = %error,
            "failed to reap expired sessions"
        );
    }

    info!(
        event_name = "auth.login.succeeded",
        user_id = %user.id,
        role = user.role.as_str(),
        "user logged in"
    );

    Ok(Json(LoginResponse {
        token: session.token.0,
        expires_at: session.expires_at,
        user,
    }))
}

/// Bcrypt on the blocking pool; a verify takes tens of milliseconds at
/// production cost.
async fn verify_password(password: String, hash: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash).unwrap_or(false))
        .await
        .map_err(|error| ApiError::Internal(format!("password verification failed: {error}")))
}

async fn logout(user: CurrentUser, State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    SqlSessionRepository::new(state.db_pool.clone()).delete(&user.token).await?;
    info!(event_name = "auth.logout", user_id = %user.user.id, "user logged out");
    Ok(StatusCode::NO_CONTENT)
}

async fn me(user: CurrentUser) -> Json<User> {
    Json(user.user)
}
