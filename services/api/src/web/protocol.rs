//! services/api/src/web/protocol.rs
//!
//! Defines the shapes exchanged with the browser client: the JSON views of the
//! planner's records returned by the REST endpoints, and the WebSocket message
//! protocol of the live exercise search.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use training_core::domain::{
    Club, DetailLine, Exercise, ExerciseDetail, Group, Membership, RepetitionUnit, Session,
    SessionAggregate, SessionOverview, User,
};
use utoipa::ToSchema;

//=========================================================================================
// Record Views
//=========================================================================================

#[derive(Serialize, Debug, Clone, ToSchema)]
pub struct SessionView {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub goal: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub points: u32,
    pub group: Option<String>,
    /// The coach who created the session.
    pub user: Option<String>,
    /// Exercise line ids in display order.
    pub exercises: Vec<String>,
}

impl From<Session> for SessionView {
    fn from(session: Session) -> Self {
        Self {
            id: session.id,
            title: session.title,
            kind: session.kind,
            description: session.description,
            goal: session.goal,
            start_date: session.start_date,
            end_date: session.end_date,
            points: session.points,
            group: session.group,
            user: session.user,
            exercises: session.exercises,
        }
    }
}

#[derive(Serialize, Debug, Clone, ToSchema)]
pub struct DetailView {
    pub id: Option<String>,
    pub exercise: String,
    pub set: u32,
    pub repetition: u32,
    #[schema(value_type = String, example = "reps")]
    pub repetition_type: RepetitionUnit,
}

impl From<ExerciseDetail> for DetailView {
    fn from(detail: ExerciseDetail) -> Self {
        Self {
            id: detail.id,
            exercise: detail.exercise,
            set: detail.set,
            repetition: detail.repetition,
            repetition_type: detail.repetition_type,
        }
    }
}

#[derive(Serialize, Debug, Clone, ToSchema)]
pub struct MembershipView {
    pub id: Option<String>,
    pub user: String,
    pub session: String,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub manual_verification: bool,
}

impl From<Membership> for MembershipView {
    fn from(membership: Membership) -> Self {
        Self {
            id: membership.id,
            user: membership.user,
            session: membership.session,
            completed: membership.completed,
            completed_at: membership.completed_at,
            manual_verification: membership.manual_verification,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, ToSchema)]
pub struct ExerciseView {
    pub id: String,
    pub name: String,
    pub name_no: String,
    pub category: String,
    pub equipment: String,
    pub level: String,
    pub primary_muscles: String,
    pub secondary_muscles: String,
    pub instructions: String,
    pub images: Vec<String>,
}

impl From<Exercise> for ExerciseView {
    fn from(exercise: Exercise) -> Self {
        Self {
            id: exercise.id,
            name: exercise.name,
            name_no: exercise.name_no,
            category: exercise.category,
            equipment: exercise.equipment,
            level: exercise.level,
            primary_muscles: exercise.primary_muscles,
            secondary_muscles: exercise.secondary_muscles,
            instructions: exercise.instructions,
            images: exercise.images,
        }
    }
}

#[derive(Serialize, Debug, Clone, ToSchema)]
pub struct UserView {
    pub id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub club: Option<String>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            club: user.clubs,
        }
    }
}

#[derive(Serialize, Debug, Clone, ToSchema)]
pub struct ClubView {
    pub id: String,
    pub name: String,
    pub admin: Vec<String>,
}

impl From<Club> for ClubView {
    fn from(club: Club) -> Self {
        Self {
            id: club.id,
            name: club.name,
            admin: club.admin,
        }
    }
}

#[derive(Serialize, Debug, Clone, ToSchema)]
pub struct GroupView {
    pub id: String,
    pub name: String,
    pub club: String,
    pub members: Vec<String>,
    pub invitation_code: String,
}

impl From<Group> for GroupView {
    fn from(group: Group) -> Self {
        Self {
            id: group.id,
            name: group.name,
            club: group.club,
            members: group.members,
            invitation_code: group.invitation_code,
        }
    }
}

/// A group together with its expanded roster.
#[derive(Serialize, Debug, Clone, ToSchema)]
pub struct GroupRosterView {
    pub group: GroupView,
    pub members: Vec<UserView>,
}

/// A session with its lines and assignments, as listed on the overview page.
#[derive(Serialize, Debug, Clone, ToSchema)]
pub struct SessionOverviewView {
    pub session: SessionView,
    pub details: Vec<DetailView>,
    pub memberships: Vec<MembershipView>,
}

impl From<SessionOverview> for SessionOverviewView {
    fn from(overview: SessionOverview) -> Self {
        Self {
            session: overview.session.into(),
            details: overview.details.into_iter().map(Into::into).collect(),
            memberships: overview.memberships.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Serialize, Debug, Clone, ToSchema)]
pub struct LineView {
    pub exercise: ExerciseView,
    pub detail: DetailView,
}

impl From<DetailLine> for LineView {
    fn from(line: DetailLine) -> Self {
        Self {
            exercise: line.exercise.into(),
            detail: line.detail.into(),
        }
    }
}

/// A stored session reassembled for the editor.
#[derive(Serialize, Debug, Clone, ToSchema)]
pub struct SessionEditView {
    pub session: SessionView,
    pub lines: Vec<LineView>,
    pub members: Vec<UserView>,
}

impl From<SessionAggregate> for SessionEditView {
    fn from(aggregate: SessionAggregate) -> Self {
        Self {
            session: aggregate.session.into(),
            lines: aggregate.lines.into_iter().map(Into::into).collect(),
            members: aggregate.members.into_iter().map(Into::into).collect(),
        }
    }
}

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// The structured text messages a client can send over the search socket.
#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// The current text of the search box. Sent on every keystroke.
    Query { text: String },
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// The structured text messages the server can send over the search socket.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Matches for `query`, which was the latest input when they were fetched.
    Results {
        query: String,
        exercises: Vec<ExerciseView>,
    },

    /// Reports a malformed client message.
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_query_message_parses() {
        let msg: ClientMessage =
            serde_json::from_value(json!({ "type": "query", "text": "squ" })).unwrap();
        let ClientMessage::Query { text } = msg;
        assert_eq!(text, "squ");
    }

    #[test]
    fn results_message_is_tagged() {
        let msg = ServerMessage::Results {
            query: "squat".to_string(),
            exercises: vec![ExerciseView::from(Exercise {
                id: "e1".to_string(),
                name: "Squat".to_string(),
                ..Exercise::default()
            })],
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "results");
        assert_eq!(value["query"], "squat");
        assert_eq!(value["exercises"][0]["name"], "Squat");
    }

    #[test]
    fn session_view_keeps_the_type_key() {
        let session: Session = serde_json::from_value(json!({
            "id": "s1",
            "title": "Legs",
            "type": "strength",
            "startDate": "2024-03-01 00:00:00.000Z",
            "endDate": "2024-03-02",
            "group": "",
        }))
        .unwrap();
        let value = serde_json::to_value(SessionView::from(session)).unwrap();
        assert_eq!(value["type"], "strength");
        assert_eq!(value["start_date"], "2024-03-01");
        assert!(value["group"].is_null());
    }
}
