pub mod auth;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod search_ws;
pub mod state;

use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

pub use middleware::require_auth;
pub use search_ws::search_ws_handler;
pub use state::{AppState, SignedIn};

/// Builds the API router: the auth endpoints are public, everything else
/// requires a signed-in user.
pub fn router(app_state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me_handler))
        .route(
            "/sessions",
            get(rest::list_sessions_handler).post(rest::create_session_handler),
        )
        .route(
            "/sessions/{id}",
            get(rest::get_session_handler)
                .put(rest::update_session_handler)
                .delete(rest::delete_session_handler),
        )
        .route(
            "/memberships/{id}/complete",
            post(rest::complete_membership_handler),
        )
        .route("/exercises", get(rest::search_exercises_handler))
        .route(
            "/clubs",
            get(rest::list_clubs_handler).post(rest::create_club_handler),
        )
        .route("/clubs/mine", get(rest::my_club_handler))
        .route(
            "/clubs/{id}/groups",
            get(rest::club_groups_handler).post(rest::create_group_handler),
        )
        .route("/groups/{id}", delete(rest::delete_group_handler))
        .route(
            "/groups/{id}/members",
            get(rest::group_members_handler).post(rest::add_group_members_handler),
        )
        .route(
            "/groups/{id}/members/{user_id}",
            delete(rest::remove_group_member_handler),
        )
        .route("/ws/exercise-search", get(search_ws_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(app_state)
}
