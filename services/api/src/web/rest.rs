//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::auth::{self, AuthResponse, LoginRequest, RegisterRequest};
use crate::web::protocol::{
    ClubView, DetailView, ExerciseView, GroupRosterView, GroupView, LineView, MembershipView,
    SessionEditView, SessionOverviewView, SessionView, UserView,
};
use crate::web::state::SignedIn;
use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use training_core::{
    builder::validate_submission,
    domain::{ExerciseDetail, RepetitionUnit, SessionDraft},
    ports::PortError,
    search_exercises, ComposerError,
};
use utoipa::{IntoParams, OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::register_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::me_handler,
        list_sessions_handler,
        create_session_handler,
        get_session_handler,
        update_session_handler,
        delete_session_handler,
        complete_membership_handler,
        search_exercises_handler,
        list_clubs_handler,
        create_club_handler,
        my_club_handler,
        club_groups_handler,
        create_group_handler,
        delete_group_handler,
        group_members_handler,
        add_group_members_handler,
        remove_group_member_handler,
    ),
    components(
        schemas(
            RegisterRequest, LoginRequest, AuthResponse,
            SessionPayload, DetailPayload, SessionIdResponse, CompleteMembershipRequest,
            CreateClubRequest, CreateGroupRequest, AddMembersRequest,
            SessionView, DetailView, MembershipView, ExerciseView, UserView, ClubView,
            GroupView, GroupRosterView, SessionOverviewView, LineView, SessionEditView,
        )
    ),
    tags(
        (name = "Training Planner API", description = "API endpoints for planning and assigning training sessions.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// One exercise line of a submitted session. Omitted counts take the editor defaults.
#[derive(Deserialize, Debug, Clone, ToSchema)]
pub struct DetailPayload {
    pub exercise: String,
    pub set: Option<u32>,
    pub repetition: Option<u32>,
    #[schema(value_type = Option<String>, example = "reps")]
    pub repetition_type: Option<RepetitionUnit>,
}

impl From<DetailPayload> for ExerciseDetail {
    fn from(payload: DetailPayload) -> Self {
        let mut detail = ExerciseDetail::with_defaults(payload.exercise);
        if let Some(set) = payload.set {
            detail.set = set;
        }
        if let Some(repetition) = payload.repetition {
            detail.repetition = repetition;
        }
        if let Some(unit) = payload.repetition_type {
            detail.repetition_type = unit;
        }
        detail
    }
}

/// A complete session as submitted from the editor.
#[derive(Deserialize, Debug, Clone, ToSchema)]
pub struct SessionPayload {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub goal: String,
    /// Defaults to today.
    pub start_date: Option<NaiveDate>,
    /// Defaults to today.
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub points: u32,
    pub group: Option<String>,
    /// Exercise lines in display order.
    #[serde(default)]
    pub exercises: Vec<DetailPayload>,
    /// Ids of the users the session is assigned to.
    #[serde(default)]
    pub members: Vec<String>,
}

impl SessionPayload {
    fn into_parts(self, today: NaiveDate) -> (SessionDraft, Vec<ExerciseDetail>, Vec<String>) {
        let draft = SessionDraft {
            title: self.title,
            kind: self.kind,
            description: self.description,
            goal: self.goal,
            start_date: self.start_date.unwrap_or(today),
            end_date: self.end_date.unwrap_or(today),
            points: self.points,
            group: self.group.filter(|g| !g.is_empty()),
        };
        let details = self.exercises.into_iter().map(Into::into).collect();
        (draft, details, self.members)
    }
}

#[derive(Serialize, ToSchema)]
pub struct SessionIdResponse {
    pub id: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CompleteMembershipRequest {
    #[serde(default)]
    pub manual_verification: bool,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateClubRequest {
    pub name: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateGroupRequest {
    pub name: String,
}

#[derive(Deserialize, ToSchema)]
pub struct AddMembersRequest {
    pub members: Vec<String>,
}

#[derive(Deserialize, IntoParams)]
pub struct SessionListQuery {
    /// Only sessions of this group.
    pub group: Option<String>,
}

#[derive(Deserialize, IntoParams)]
pub struct ExerciseSearchQuery {
    /// Text to match against exercise names. At least two characters.
    #[serde(default)]
    pub q: String,
}

//=========================================================================================
// Error Mapping
//=========================================================================================

/// Maps a session workflow failure onto a status and the generic user-facing message.
fn composer_failure(e: ComposerError) -> (StatusCode, String) {
    let status = match (&e, e.port_error()) {
        (ComposerError::Incomplete(_), _) => StatusCode::BAD_REQUEST,
        (_, Some(PortError::Unauthorized)) => StatusCode::UNAUTHORIZED,
        (_, Some(PortError::NotFound(_))) => StatusCode::NOT_FOUND,
        (_, Some(PortError::Validation(_))) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("Session request failed: {}", e);
    }
    (status, e.user_message())
}

fn port_failure(e: PortError, action: &str) -> (StatusCode, String) {
    let status = match &e {
        PortError::NotFound(_) => StatusCode::NOT_FOUND,
        PortError::Validation(_) => StatusCode::BAD_REQUEST,
        PortError::Unauthorized => StatusCode::UNAUTHORIZED,
        PortError::Transport(_) | PortError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("Failed to {}: {:?}", action, e);
    }
    (status, format!("Failed to {}", action))
}

//=========================================================================================
// Session Handlers
//=========================================================================================

/// List sessions, newest first.
#[utoipa::path(
    get,
    path = "/sessions",
    params(SessionListQuery),
    responses(
        (status = 200, description = "Sessions with their lines and assignments", body = [SessionOverviewView]),
        (status = 401, description = "Not signed in"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_sessions_handler(
    Extension(session): Extension<SignedIn>,
    Query(query): Query<SessionListQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let sessions = session
        .composer
        .list_sessions(query.group.as_deref())
        .await
        .map_err(composer_failure)?;
    let views: Vec<SessionOverviewView> = sessions.into_iter().map(Into::into).collect();
    Ok(Json(views))
}

/// Create a session with its exercise lines and assignments.
///
/// The signed-in user is recorded as the session's creator.
#[utoipa::path(
    post,
    path = "/sessions",
    request_body = SessionPayload,
    responses(
        (status = 201, description = "Session created successfully", body = SessionIdResponse),
        (status = 400, description = "The session is incomplete"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_session_handler(
    Extension(session): Extension<SignedIn>,
    Json(payload): Json<SessionPayload>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let (draft, details, members) = payload.into_parts(Utc::now().date_naive());
    validate_submission(&draft, &details, &members)
        .map_err(|e| composer_failure(e.into()))?;

    let id = session
        .composer
        .create(&draft, &details, &members, Some(&session.user.id))
        .await
        .map_err(composer_failure)?;
    Ok((StatusCode::CREATED, Json(SessionIdResponse { id })))
}

/// Load a session with its exercise lines and assigned users for editing.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    params(("id" = String, Path, description = "The session id.")),
    responses(
        (status = 200, description = "The session, ready for editing", body = SessionEditView),
        (status = 404, description = "Session not found"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn get_session_handler(
    Extension(session): Extension<SignedIn>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let aggregate = session
        .composer
        .load_for_edit(&id)
        .await
        .map_err(composer_failure)?;
    Ok(Json(SessionEditView::from(aggregate)))
}

/// Replace a session's fields, exercise lines and assignments.
#[utoipa::path(
    put,
    path = "/sessions/{id}",
    params(("id" = String, Path, description = "The session id.")),
    request_body = SessionPayload,
    responses(
        (status = 200, description = "Session updated successfully", body = SessionIdResponse),
        (status = 400, description = "The session is incomplete"),
        (status = 404, description = "Session not found"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn update_session_handler(
    Extension(session): Extension<SignedIn>,
    Path(id): Path<String>,
    Json(payload): Json<SessionPayload>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let (draft, details, members) = payload.into_parts(Utc::now().date_naive());
    validate_submission(&draft, &details, &members)
        .map_err(|e| composer_failure(e.into()))?;

    session
        .composer
        .update(&id, &draft, &details, &members)
        .await
        .map_err(composer_failure)?;
    Ok(Json(SessionIdResponse { id }))
}

/// Delete a session along with its exercise lines and assignments.
#[utoipa::path(
    delete,
    path = "/sessions/{id}",
    params(("id" = String, Path, description = "The session id.")),
    responses(
        (status = 204, description = "Session deleted"),
        (status = 404, description = "Session not found"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn delete_session_handler(
    Extension(session): Extension<SignedIn>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    session
        .composer
        .delete(&id)
        .await
        .map_err(composer_failure)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Mark an assignment as completed.
#[utoipa::path(
    post,
    path = "/memberships/{id}/complete",
    params(("id" = String, Path, description = "The membership id.")),
    request_body = CompleteMembershipRequest,
    responses(
        (status = 200, description = "The completed assignment", body = MembershipView),
        (status = 404, description = "Assignment not found"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn complete_membership_handler(
    Extension(session): Extension<SignedIn>,
    Path(id): Path<String>,
    Json(req): Json<CompleteMembershipRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let membership = session
        .composer
        .complete_membership(&id, req.manual_verification)
        .await
        .map_err(composer_failure)?;
    Ok(Json(MembershipView::from(membership)))
}

//=========================================================================================
// Exercise Catalog
//=========================================================================================

/// Search the exercise catalog by name.
#[utoipa::path(
    get,
    path = "/exercises",
    params(ExerciseSearchQuery),
    responses(
        (status = 200, description = "Up to ten matches sorted by name", body = [ExerciseView]),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn search_exercises_handler(
    Extension(session): Extension<SignedIn>,
    Query(query): Query<ExerciseSearchQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let exercises = search_exercises(session.store.as_ref(), &query.q)
        .await
        .map_err(|e| port_failure(e, "fetch exercises"))?;
    let views: Vec<ExerciseView> = exercises.into_iter().map(Into::into).collect();
    Ok(Json(views))
}

//=========================================================================================
// Clubs and Groups
//=========================================================================================

#[utoipa::path(
    get,
    path = "/clubs",
    responses((status = 200, description = "All clubs by name", body = [ClubView]))
)]
pub async fn list_clubs_handler(
    Extension(session): Extension<SignedIn>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let clubs = session
        .directory
        .list_clubs()
        .await
        .map_err(|e| port_failure(e, "fetch clubs"))?;
    let views: Vec<ClubView> = clubs.into_iter().map(Into::into).collect();
    Ok(Json(views))
}

/// Create a club administered by the signed-in user.
#[utoipa::path(
    post,
    path = "/clubs",
    request_body = CreateClubRequest,
    responses((status = 201, description = "Club created", body = ClubView))
)]
pub async fn create_club_handler(
    Extension(session): Extension<SignedIn>,
    Json(req): Json<CreateClubRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let club = session
        .directory
        .create_club(&req.name)
        .await
        .map_err(|e| port_failure(e, "create club"))?;
    Ok((StatusCode::CREATED, Json(ClubView::from(club))))
}

/// The club of the signed-in user.
#[utoipa::path(
    get,
    path = "/clubs/mine",
    responses(
        (status = 200, description = "The user's club", body = ClubView),
        (status = 404, description = "The user has no club")
    )
)]
pub async fn my_club_handler(
    Extension(session): Extension<SignedIn>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let club = session
        .directory
        .user_club()
        .await
        .map_err(|e| port_failure(e, "fetch club"))?
        .ok_or_else(|| (StatusCode::NOT_FOUND, "No club".to_string()))?;
    Ok(Json(ClubView::from(club)))
}

#[utoipa::path(
    get,
    path = "/clubs/{id}/groups",
    params(("id" = String, Path, description = "The club id.")),
    responses((status = 200, description = "The club's groups with their members", body = [GroupRosterView]))
)]
pub async fn club_groups_handler(
    Extension(session): Extension<SignedIn>,
    Path(club_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let groups = session
        .directory
        .club_groups(&club_id)
        .await
        .map_err(|e| port_failure(e, "fetch groups"))?;
    let views: Vec<GroupRosterView> = groups
        .into_iter()
        .map(|(group, members)| GroupRosterView {
            group: group.into(),
            members: members.into_iter().map(Into::into).collect(),
        })
        .collect();
    Ok(Json(views))
}

#[utoipa::path(
    post,
    path = "/clubs/{id}/groups",
    params(("id" = String, Path, description = "The club id.")),
    request_body = CreateGroupRequest,
    responses((status = 201, description = "Group created", body = GroupView))
)]
pub async fn create_group_handler(
    Extension(session): Extension<SignedIn>,
    Path(club_id): Path<String>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let group = session
        .directory
        .create_group(&req.name, &club_id)
        .await
        .map_err(|e| port_failure(e, "create group"))?;
    Ok((StatusCode::CREATED, Json(GroupView::from(group))))
}

#[utoipa::path(
    delete,
    path = "/groups/{id}",
    params(("id" = String, Path, description = "The group id.")),
    responses((status = 204, description = "Group deleted"))
)]
pub async fn delete_group_handler(
    Extension(session): Extension<SignedIn>,
    Path(group_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    session
        .directory
        .delete_group(&group_id)
        .await
        .map_err(|e| port_failure(e, "delete group"))?;
    info!("Deleted group {}", group_id);
    Ok(StatusCode::NO_CONTENT)
}

/// The roster a session's assignees are picked from.
#[utoipa::path(
    get,
    path = "/groups/{id}/members",
    params(("id" = String, Path, description = "The group id.")),
    responses((status = 200, description = "The group's members", body = [UserView]))
)]
pub async fn group_members_handler(
    Extension(session): Extension<SignedIn>,
    Path(group_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let members = session
        .directory
        .group_members(&group_id)
        .await
        .map_err(|e| port_failure(e, "fetch group members"))?;
    let views: Vec<UserView> = members.into_iter().map(Into::into).collect();
    Ok(Json(views))
}

#[utoipa::path(
    post,
    path = "/groups/{id}/members",
    params(("id" = String, Path, description = "The group id.")),
    request_body = AddMembersRequest,
    responses((status = 200, description = "The updated group", body = GroupView))
)]
pub async fn add_group_members_handler(
    Extension(session): Extension<SignedIn>,
    Path(group_id): Path<String>,
    Json(req): Json<AddMembersRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let group = session
        .directory
        .add_members_to_group(&group_id, &req.members)
        .await
        .map_err(|e| port_failure(e, "add group members"))?;
    Ok(Json(GroupView::from(group)))
}

#[utoipa::path(
    delete,
    path = "/groups/{id}/members/{user_id}",
    params(
        ("id" = String, Path, description = "The group id."),
        ("user_id" = String, Path, description = "The member to remove.")
    ),
    responses((status = 200, description = "The updated group", body = GroupView))
)]
pub async fn remove_group_member_handler(
    Extension(session): Extension<SignedIn>,
    Path((group_id, user_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let group = session
        .directory
        .remove_member_from_group(&group_id, &user_id)
        .await
        .map_err(|e| port_failure(e, "remove group member"))?;
    Ok(Json(GroupView::from(group)))
}
