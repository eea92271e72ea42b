//! crates/training_core/src/domain.rs
//!
//! Defines the core data structures of the training planner.
//! Field names on the wire follow the remote store's collection schema, so these
//! structs double as the typed view of a store record.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How the repetition count of an exercise line is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepetitionUnit {
    #[default]
    Reps,
    Seconds,
    Minutes,
}

/// A scheduled bundle of exercises assigned to one or more users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub goal: String,
    #[serde(with = "wire::date")]
    pub start_date: NaiveDate,
    #[serde(with = "wire::date")]
    pub end_date: NaiveDate,
    #[serde(default)]
    pub points: u32,
    /// Ids of the ExerciseDetail records this session owns, in display order.
    #[serde(default)]
    pub exercises: Vec<String>,
    #[serde(default, with = "wire::relation")]
    pub group: Option<String>,
    /// The coach who created the session.
    #[serde(default, with = "wire::relation")]
    pub user: Option<String>,
}

/// The user-editable scalar fields of a Session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDraft {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub goal: String,
    #[serde(with = "wire::date")]
    pub start_date: NaiveDate,
    #[serde(with = "wire::date")]
    pub end_date: NaiveDate,
    #[serde(default)]
    pub points: u32,
    #[serde(default, with = "wire::relation")]
    pub group: Option<String>,
}

impl SessionDraft {
    /// An empty draft whose start and end dates are both `today`.
    pub fn new(today: NaiveDate) -> Self {
        Self {
            title: String::new(),
            kind: String::new(),
            description: String::new(),
            goal: String::new(),
            start_date: today,
            end_date: today,
            points: 0,
            group: None,
        }
    }
}

impl From<&Session> for SessionDraft {
    fn from(session: &Session) -> Self {
        Self {
            title: session.title.clone(),
            kind: session.kind.clone(),
            description: session.description.clone(),
            goal: session.goal.clone(),
            start_date: session.start_date,
            end_date: session.end_date,
            points: session.points,
            group: session.group.clone(),
        }
    }
}

/// One exercise's prescribed sets and repetitions within a Session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub exercise: String,
    pub set: u32,
    pub repetition: u32,
    #[serde(default)]
    pub repetition_type: RepetitionUnit,
    #[serde(default, with = "wire::relation", skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
}

impl ExerciseDetail {
    pub const DEFAULT_SETS: u32 = 3;
    pub const DEFAULT_REPETITIONS: u32 = 10;

    /// A fresh line for `exercise_id` with the default prescription.
    pub fn with_defaults(exercise_id: impl Into<String>) -> Self {
        Self {
            id: None,
            exercise: exercise_id.into(),
            set: Self::DEFAULT_SETS,
            repetition: Self::DEFAULT_REPETITIONS,
            repetition_type: RepetitionUnit::Reps,
            session: None,
        }
    }
}

/// Assignment of one user to one Session, doubling as its completion record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user: String,
    pub session: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(
        rename = "completed_at",
        default,
        with = "wire::timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub manual_verification: bool,
}

impl Membership {
    /// A new, not yet completed assignment.
    pub fn assign(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            id: None,
            user: user_id.into(),
            session: session_id.into(),
            completed: false,
            completed_at: None,
            manual_verification: false,
        }
    }
}

/// Read-only catalog entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Exercise {
    pub id: String,
    pub name: String,
    #[serde(rename = "nameNO")]
    pub name_no: String,
    pub category: String,
    pub equipment: String,
    pub force: String,
    pub level: String,
    pub mechanic: String,
    pub primary_muscles: String,
    pub secondary_muscles: String,
    pub instructions: String,
    pub images: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Club {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub admin: Vec<String>,
}

/// A named subset of a Club's users, targetable for Session assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub name: String,
    pub club: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub invitation_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, with = "wire::relation", skip_serializing_if = "Option::is_none")]
    pub clubs: Option<String>,
}

/// Everything needed to register a new account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
}

/// An authenticated session against the remote store.
#[derive(Clone, PartialEq)]
pub struct AuthSession {
    pub token: String,
    pub user: User,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("token", &"<redacted>")
            .field("user", &self.user)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// An exercise line as shown in the session editor.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailLine {
    pub exercise: Exercise,
    pub detail: ExerciseDetail,
}

/// A stored Session reassembled for editing.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionAggregate {
    pub session: Session,
    pub lines: Vec<DetailLine>,
    pub members: Vec<User>,
}

/// A Session with its dependent rows, as listed on the overview page.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOverview {
    pub session: Session,
    pub details: Vec<ExerciseDetail>,
    pub memberships: Vec<Membership>,
}

/// Serde adapters for the store's wire conventions.
pub(crate) mod wire {
    /// Calendar dates. The store may hand back a full datetime string; only the
    /// leading `YYYY-MM-DD` is significant.
    pub mod date {
        use chrono::NaiveDate;
        use serde::{de::Error, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(date: &NaiveDate, s: S) -> Result<S::Ok, S::Error> {
            s.serialize_str(&date.format("%Y-%m-%d").to_string())
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDate, D::Error> {
            let raw = String::deserialize(d)?;
            let head = raw.get(..10).unwrap_or(&raw);
            NaiveDate::parse_from_str(head, "%Y-%m-%d").map_err(D::Error::custom)
        }
    }

    /// Single relation fields: the store encodes "no relation" as `""`.
    pub mod relation {
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &Option<String>, s: S) -> Result<S::Ok, S::Error> {
            s.serialize_str(value.as_deref().unwrap_or(""))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
            let raw = Option::<String>::deserialize(d)?;
            Ok(raw.filter(|s| !s.is_empty()))
        }
    }

    /// Optional timestamps, written as RFC 3339 and read from either RFC 3339 or
    /// the store's `YYYY-MM-DD HH:MM:SS.sssZ` form. Empty strings mean unset.
    pub mod timestamp {
        use chrono::{DateTime, Utc};
        use serde::{de::Error, Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(ts) => s.serialize_str(&ts.to_rfc3339()),
                None => s.serialize_str(""),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            let raw = Option::<String>::deserialize(d)?;
            match raw.as_deref().map(str::trim) {
                None | Some("") => Ok(None),
                Some(text) => DateTime::parse_from_rfc3339(&text.replacen(' ', "T", 1))
                    .map(|ts| Some(ts.with_timezone(&Utc)))
                    .map_err(D::Error::custom),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn session_reads_store_datetime_strings_and_empty_relations() {
        let session: Session = serde_json::from_value(json!({
            "id": "s1",
            "title": "Leg Day",
            "type": "Strength",
            "startDate": "2024-01-01 00:00:00.000Z",
            "endDate": "2024-01-02",
            "points": 10,
            "exercises": ["d1"],
            "group": "",
        }))
        .unwrap();

        assert_eq!(session.start_date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(session.end_date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(session.group, None);
        assert_eq!(session.user, None);
        assert_eq!(session.description, "");
    }

    #[test]
    fn membership_parses_store_timestamp() {
        let membership: Membership = serde_json::from_value(json!({
            "user": "u1",
            "session": "s1",
            "completed": true,
            "completed_at": "2024-03-05 10:15:00.000Z",
            "manualVerification": true,
        }))
        .unwrap();

        let at = membership.completed_at.unwrap();
        assert_eq!(at.to_rfc3339(), "2024-03-05T10:15:00+00:00");
        assert!(membership.manual_verification);
    }

    #[test]
    fn detail_serializes_unit_in_lowercase_without_id() {
        let value = serde_json::to_value(ExerciseDetail::with_defaults("e1")).unwrap();
        assert_eq!(
            value,
            json!({ "exercise": "e1", "set": 3, "repetition": 10, "repetitionType": "reps" })
        );
    }

    #[test]
    fn auth_session_debug_hides_token() {
        let session = AuthSession {
            token: "secret-token".to_string(),
            user: User {
                id: "u1".to_string(),
                email: "coach@example.com".to_string(),
                first_name: None,
                last_name: None,
                clubs: None,
            },
            expires_at: Utc::now(),
        };
        assert!(!format!("{:?}", session).contains("secret-token"));
    }
}
