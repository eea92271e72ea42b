//! Drives the API router end to end against the in-memory record store.

use api_lib::{
    config::Config,
    web::{self, AppState},
};
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use training_core::{ports::Collection, query::ListQuery};

fn test_state() -> Arc<AppState> {
    let config = Config::from_lookup(|_| None).unwrap();
    Arc::new(AppState::in_memory(Arc::new(config)))
}

/// A client of the router, optionally holding a session cookie.
#[derive(Clone)]
struct Client {
    app: Router,
    session: Option<String>,
}

impl Client {
    fn anonymous(app: &Router) -> Self {
        Self {
            app: app.clone(),
            session: None,
        }
    }

    async fn call(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let (status, _, value) = self.send(method, uri, body).await;
        (status, value)
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Option<String>, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(session) = &self.session {
            builder = builder.header(header::COOKIE, format!("theme=dark; session={}", session));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, set_cookie, value)
    }

    /// Signs in and keeps the session cookie the router hands back.
    async fn login(app: &Router, email: &str, password: &str) -> Self {
        let (status, set_cookie, body) = Self::anonymous(app)
            .send(
                "POST",
                "/auth/login",
                Some(json!({ "email": email, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["email"], email);

        let set_cookie = set_cookie.unwrap();
        assert!(set_cookie.contains("HttpOnly"));
        let session = set_cookie
            .split(';')
            .find_map(|c| c.trim().strip_prefix("session="))
            .unwrap()
            .to_string();
        assert!(!session.is_empty());
        Self {
            app: app.clone(),
            session: Some(session),
        }
    }
}

async fn count(state: &AppState, collection: Collection) -> usize {
    state
        .store()
        .get_all(collection, &ListQuery::new())
        .await
        .unwrap()
        .len()
}

async fn register(app: &Router, email: &str, first_name: &str) {
    let (status, _) = Client::anonymous(app)
        .call(
            "POST",
            "/auth/register",
            Some(json!({
                "email": email,
                "password": "secret123",
                "password_confirm": "secret123",
                "first_name": first_name
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

/// Registers and signs in a coach, and seeds a small catalog and roster.
async fn signed_in() -> (Arc<AppState>, Client) {
    let state = test_state();
    let app = web::router(state.clone());

    register(&app, "coach@club.no", "Kari").await;
    let coach = Client::login(&app, "coach@club.no", "secret123").await;

    let store = state.store();
    for (id, name, name_no) in [
        ("E1", "Barbell Squat", "Knebøy"),
        ("E2", "Bench Press", "Benkpress"),
        ("E3", "Plank", "Planke"),
    ] {
        store
            .create(
                Collection::Exercises,
                json!({ "id": id, "name": name, "nameNO": name_no }),
            )
            .await
            .unwrap();
    }
    for id in ["U1", "U2", "U3"] {
        store
            .create(
                Collection::Users,
                json!({ "id": id, "email": format!("{}@club.no", id.to_lowercase()) }),
            )
            .await
            .unwrap();
    }
    (state, coach)
}

fn session_payload(exercises: &[&str], members: &[&str]) -> Value {
    json!({
        "title": "Leg day",
        "type": "strength",
        "description": "Heavy lower body",
        "start_date": "2024-03-01",
        "end_date": "2024-03-01",
        "points": 10,
        "exercises": exercises
            .iter()
            .map(|id| json!({ "exercise": id }))
            .collect::<Vec<_>>(),
        "members": members,
    })
}

#[tokio::test]
async fn protected_routes_require_sign_in() {
    let app = web::router(test_state());
    let api = Client::anonymous(&app);

    let (status, _) = api.call("GET", "/sessions", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = api.call("GET", "/auth/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let forged = Client {
        app,
        session: Some("00000000-0000-0000-0000-000000000000".to_string()),
    };
    let (status, _) = forged.call("GET", "/auth/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn a_login_does_not_sign_in_other_clients() {
    let (state, coach) = signed_in().await;
    let stranger = Client::anonymous(&coach.app);

    let (status, _) = stranger.call("GET", "/auth/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = stranger.call("GET", "/sessions", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = stranger
        .call("POST", "/sessions", Some(session_payload(&["E1"], &["U1"])))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(count(&state, Collection::Sessions).await, 0);

    // Nor can they sign the coach out.
    let (status, _) = stranger.call("POST", "/auth/logout", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, me) = coach.call("GET", "/auth/me", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "coach@club.no");
}

#[tokio::test]
async fn each_login_acts_as_its_own_user() {
    let (state, kari) = signed_in().await;
    register(&kari.app, "ola@club.no", "Ola").await;
    let ola = Client::login(&kari.app, "ola@club.no", "secret123").await;
    assert_ne!(kari.session, ola.session);
    assert_eq!(state.sessions.len().await, 2);

    let (_, me) = kari.call("GET", "/auth/me", None).await;
    assert_eq!(me["first_name"], "Kari");
    let (_, me) = ola.call("GET", "/auth/me", None).await;
    assert_eq!(me["first_name"], "Ola");

    let (status, _) = kari.call("POST", "/clubs", Some(json!({ "name": "Oslo Turn" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = kari.call("GET", "/clubs/mine", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = ola.call("GET", "/clubs/mine", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Signing one out leaves the other alone.
    let (status, _) = kari.call("POST", "/auth/logout", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = kari.call("GET", "/auth/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = ola.call("GET", "/auth/me", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state.sessions.len().await, 1);
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let (_state, api) = signed_in().await;
    let (status, _) = api.call(
        "POST",
        "/auth/login",
        Some(json!({ "email": "coach@club.no", "password": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_closes_the_protected_routes() {
    let (_state, api) = signed_in().await;

    let (status, me) = api.call("GET", "/auth/me", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["first_name"], "Kari");

    let (status, _) = api.call("POST", "/auth/logout", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = api.call("GET", "/auth/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn session_lifecycle_replaces_dependents() {
    let (state, api) = signed_in().await;

    let (status, created) = api.call(
        "POST",
        "/sessions",
        Some(session_payload(&["E1", "E2"], &["U1"])),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap().to_string();

    let (status, loaded) = api.call("GET", &format!("/sessions/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(loaded["session"]["title"], "Leg day");
    assert_eq!(loaded["lines"][0]["exercise"]["id"], "E1");
    assert_eq!(loaded["lines"][1]["exercise"]["id"], "E2");
    assert_eq!(loaded["lines"][0]["detail"]["set"], 3);
    assert_eq!(loaded["lines"][0]["detail"]["repetition"], 10);
    assert_eq!(loaded["members"][0]["id"], "U1");

    let (status, _) = api.call(
        "PUT",
        &format!("/sessions/{}", id),
        Some(session_payload(&["E3"], &["U2", "U3"])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(count(&state, Collection::ExerciseDetails).await, 1);
    assert_eq!(count(&state, Collection::Memberships).await, 2);

    let (_, loaded) = api.call("GET", &format!("/sessions/{}", id), None).await;
    assert_eq!(loaded["lines"].as_array().unwrap().len(), 1);
    assert_eq!(loaded["lines"][0]["exercise"]["id"], "E3");
    assert_eq!(loaded["members"].as_array().unwrap().len(), 2);

    let (status, _) = api.call("DELETE", &format!("/sessions/{}", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(count(&state, Collection::Sessions).await, 0);
    assert_eq!(count(&state, Collection::ExerciseDetails).await, 0);
    assert_eq!(count(&state, Collection::Memberships).await, 0);

    let (status, body) = api.call("GET", &format!("/sessions/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "Error loading session. Please try again.");
}

#[tokio::test]
async fn incomplete_sessions_write_nothing() {
    let (state, api) = signed_in().await;

    let (status, _) = api.call("POST", "/sessions", Some(session_payload(&["E1"], &[]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = api.call("POST", "/sessions", Some(session_payload(&[], &["U1"]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(count(&state, Collection::Sessions).await, 0);
    assert_eq!(count(&state, Collection::ExerciseDetails).await, 0);
}

#[tokio::test]
async fn listed_memberships_can_be_completed() {
    let (_state, api) = signed_in().await;
    api.call(
        "POST",
        "/sessions",
        Some(session_payload(&["E1"], &["U1", "U2"])),
    )
    .await;

    let (status, sessions) = api.call("GET", "/sessions", None).await;
    assert_eq!(status, StatusCode::OK);
    let overview = &sessions[0];
    assert_eq!(overview["details"].as_array().unwrap().len(), 1);
    let memberships = overview["memberships"].as_array().unwrap();
    assert_eq!(memberships.len(), 2);
    assert_eq!(memberships[0]["completed"], false);

    let membership_id = memberships[0]["id"].as_str().unwrap();
    let (status, completed) = api.call(
        "POST",
        &format!("/memberships/{}/complete", membership_id),
        Some(json!({ "manual_verification": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(completed["completed"], true);
    assert_eq!(completed["manual_verification"], true);
    assert!(completed["completed_at"].is_string());
}

#[tokio::test]
async fn exercise_search_needs_two_characters() {
    let (_state, api) = signed_in().await;

    let (status, hits) = api.call("GET", "/exercises?q=sq", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(hits.as_array().unwrap().len(), 1);
    assert_eq!(hits[0]["name"], "Barbell Squat");

    let (_, hits) = api.call("GET", "/exercises?q=benk", None).await;
    assert_eq!(hits[0]["id"], "E2");

    let (_, hits) = api.call("GET", "/exercises?q=s", None).await;
    assert!(hits.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn clubs_and_groups_are_managed_through_the_directory() {
    let (_state, api) = signed_in().await;

    let (status, _) = api.call("GET", "/clubs/mine", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, club) = api.call("POST", "/clubs", Some(json!({ "name": "Oslo Turn" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let club_id = club["id"].as_str().unwrap().to_string();

    let (_, mine) = api.call("GET", "/clubs/mine", None).await;
    assert_eq!(mine["id"], club_id.as_str());

    let (status, group) = api.call(
        "POST",
        &format!("/clubs/{}/groups", club_id),
        Some(json!({ "name": "Juniors" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let group_id = group["id"].as_str().unwrap().to_string();
    assert_eq!(group["invitation_code"].as_str().unwrap().len(), 6);

    let (_, group) = api.call(
        "POST",
        &format!("/groups/{}/members", group_id),
        Some(json!({ "members": ["U1", "U2", "U1"] })),
    )
    .await;
    assert_eq!(group["members"], json!(["U1", "U2"]));

    let (_, members) = api.call("GET", &format!("/groups/{}/members", group_id), None).await;
    assert_eq!(members.as_array().unwrap().len(), 2);

    let (_, group) = api.call(
        "DELETE",
        &format!("/groups/{}/members/U1", group_id),
        None,
    )
    .await;
    assert_eq!(group["members"], json!(["U2"]));

    let (_, groups) = api.call("GET", &format!("/clubs/{}/groups", club_id), None).await;
    assert_eq!(groups[0]["members"][0]["id"], "U2");

    let (status, _) = api.call("DELETE", &format!("/groups/{}", group_id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn missing_sessions_are_not_found_on_every_method() {
    let (_state, api) = signed_in().await;
    let payload = session_payload(&["E1"], &["U1"]);

    let (status, body) = api.call("PUT", "/sessions/nosuchsession", Some(payload)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "Error saving session. Please try again.");

    let (status, body) = api.call("DELETE", "/sessions/nosuchsession", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "Error deleting session. Please try again.");

    let (status, _) = api
        .call(
            "POST",
            "/memberships/nosuchmembership/complete",
            Some(json!({ "manual_verification": false })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn ids_with_path_separators_stay_inside_their_collection() {
    let (state, api) = signed_in().await;
    let users = count(&state, Collection::Users).await;

    let (status, _) = api
        .call("DELETE", "/sessions/..%2F..%2Fusers%2Frecords%2FU1", None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert_eq!(count(&state, Collection::Users).await, users);
    state
        .store()
        .get_one(Collection::Users, "U1", &[])
        .await
        .unwrap();
}
