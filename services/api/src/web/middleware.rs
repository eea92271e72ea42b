//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

use crate::web::state::AppState;

/// Reads the auth session id out of the request's `Cookie` header.
pub fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?
        .split(';')
        .find_map(|c| {
            let c = c.trim();
            c.strip_prefix("session=")
        })
        .filter(|id| !id.is_empty())
}

/// Middleware that validates the auth session cookie.
///
/// If it names an open, unexpired session, inserts a `SignedIn` bound to that
/// session into request extensions for handlers to use. Otherwise returns 401
/// Unauthorized; an expired session is closed on the way.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // 1. Parse session ID from cookie
    let session_id = session_cookie(req.headers())
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_string();

    // 2. Look the session up
    let auth = state
        .sessions
        .get(&session_id)
        .await
        .ok_or(StatusCode::UNAUTHORIZED)?;
    if !auth.is_valid() {
        warn!("Auth session expired; signing out");
        state.sessions.close(&session_id).await;
        return Err(StatusCode::UNAUTHORIZED);
    }

    // 3. Bind the workflows to it
    let signed_in = state
        .signed_in(session_id, auth)
        .ok_or(StatusCode::UNAUTHORIZED)?;
    req.extensions_mut().insert(signed_in);

    Ok(next.run(req).await)
}
