//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for registration, login, and logout.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};
use training_core::{domain::NewAccount, ports::PortError, AuthState};
use utoipa::ToSchema;

use crate::web::middleware::session_cookie;
use crate::web::protocol::UserView;
use crate::web::state::{AppState, SignedIn};

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub user: UserView,
    pub expires_at: DateTime<Utc>,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/register - Create a new user account
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created successfully", body = UserView),
        (status = 400, description = "Invalid request"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let account = NewAccount {
        email: req.email,
        password: req.password,
        password_confirm: req.password_confirm,
        first_name: req.first_name,
        last_name: req.last_name,
        birth_date: req.birth_date,
    };

    match state.anonymous_directory().register(&account).await {
        Ok(user) => Ok((StatusCode::CREATED, Json(UserView::from(user)))),
        Err(PortError::Validation(reason)) => Err((
            StatusCode::BAD_REQUEST,
            format!("Failed to create user: {}", reason),
        )),
        Err(e) => {
            error!("Failed to create user: {:?}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create user".to_string(),
            ))
        }
    }
}

/// POST /auth/login - Login with existing account
///
/// Every successful login opens a separate auth session, named by the `session`
/// cookie set on the response.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful, session cookie set", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // 1. Authenticate into a fresh auth state of our own
    let auth = AuthState::new();
    spawn_auth_logger(&auth);
    let user = auth
        .login(state.auth_service.as_ref(), &req.email, &req.password)
        .await
        .map_err(|e| match e {
            PortError::Unauthorized | PortError::NotFound(_) => (
                StatusCode::UNAUTHORIZED,
                "Invalid email or password".to_string(),
            ),
            other => {
                error!("Failed to authenticate: {:?}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Authentication error".to_string(),
                )
            }
        })?;

    let expires_at = auth
        .current()
        .map(|session| session.expires_at)
        .ok_or_else(|| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Authentication error".to_string(),
            )
        })?;

    // 2. Register it under a new session ID
    let session_id = state.sessions.open(auth).await;

    // 3. Create session cookie, living as long as the store's token
    let cookie = format!(
        "session={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        session_id,
        (expires_at - Utc::now()).num_seconds().max(0)
    );

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse {
            user: user.into(),
            expires_at,
        }),
    ))
}

/// POST /auth/logout - Logout and forget the session
///
/// Only the session named by the request's cookie is closed.
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session_id = session_cookie(&headers)
        .ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?;

    if !state.sessions.close(session_id).await {
        return Err((StatusCode::UNAUTHORIZED, "No session found".to_string()));
    }

    let cookie = "session=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0";
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie.to_string())]))
}

/// GET /auth/me - The signed-in user
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "The signed-in user", body = UserView),
        (status = 401, description = "No active session")
    )
)]
pub async fn me_handler(Extension(session): Extension<SignedIn>) -> Json<UserView> {
    Json(session.user.into())
}

/// Logs every sign-in and sign-out of `auth` until the last clone of it is dropped.
pub fn spawn_auth_logger(auth: &AuthState) -> JoinHandle<()> {
    let mut transitions = auth.subscribe();
    tokio::spawn(async move {
        while transitions.changed().await.is_ok() {
            match transitions.borrow_and_update().as_ref() {
                Some(session) => info!(
                    "Signed in as {} until {}",
                    session.user.email, session.expires_at
                ),
                None => info!("Signed out"),
            }
        }
    })
}
