//! crates/training_core/src/ports.rs
//!
//! Defines the service contracts (traits) between the training planner's core logic
//! and the remote record store it depends on. The store owns persistence, auth,
//! filtering and relation expansion; the core only ever talks to these traits.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::AuthSession;
use crate::query::ListQuery;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors of the concrete store client.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Rejected by the store: {0}")]
    Validation(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Transport failure: {0}")]
    Transport(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Collections and Records
//=========================================================================================

/// The record collections the planner reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Sessions,
    ExerciseDetails,
    Memberships,
    Exercises,
    Clubs,
    Groups,
    Users,
}

impl Collection {
    pub const ALL: [Collection; 7] = [
        Collection::Sessions,
        Collection::ExerciseDetails,
        Collection::Memberships,
        Collection::Exercises,
        Collection::Clubs,
        Collection::Groups,
        Collection::Users,
    ];

    /// The collection's name in the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Sessions => "sessions",
            Collection::ExerciseDetails => "exercise_detail",
            Collection::Memberships => "user_sessions",
            Collection::Exercises => "exercises",
            Collection::Clubs => "clubs",
            Collection::Groups => "groups",
            Collection::Users => "users",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }

    /// The collection a relation field of this collection points at.
    pub fn relation(&self, field: &str) -> Option<Collection> {
        use Collection::*;
        match (self, field) {
            (Sessions, "exercises") => Some(ExerciseDetails),
            (Sessions, "group") => Some(Groups),
            (Sessions, "user") => Some(Users),
            (ExerciseDetails, "exercise") => Some(Exercises),
            (ExerciseDetails, "session") => Some(Sessions),
            (Memberships, "user") => Some(Users),
            (Memberships, "session") => Some(Sessions),
            (Groups, "club") => Some(Clubs),
            (Groups, "members") => Some(Users),
            (Clubs, "admin") => Some(Users),
            (Users, "clubs") => Some(Clubs),
            _ => None,
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw record as stored remotely: its id, its fields, and any relations
/// resolved through `expand`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub expand: Map<String, Value>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// The record's fields with its id folded back in.
    pub fn to_value(&self) -> Value {
        let mut fields = self.fields.clone();
        fields.insert("id".to_string(), Value::String(self.id.clone()));
        Value::Object(fields)
    }

    /// Decodes the record into a typed domain struct.
    pub fn decode<T: DeserializeOwned>(&self) -> PortResult<T> {
        serde_json::from_value(self.to_value()).map_err(|e| {
            PortError::Unexpected(format!("Malformed record {}: {}", self.id, e))
        })
    }

    /// Decodes a single expanded relation, if the store resolved it.
    pub fn expanded_one<T: DeserializeOwned>(&self, field: &str) -> PortResult<Option<T>> {
        match self.expand.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => decode_value(value).map(Some),
        }
    }

    /// Decodes a multi-valued expanded relation; missing means empty.
    pub fn expanded_many<T: DeserializeOwned>(&self, field: &str) -> PortResult<Vec<T>> {
        match self.expand.get(field) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items.iter().map(decode_value).collect(),
            Some(single) => decode_value(single).map(|item| vec![item]),
        }
    }

    /// Reads a plain string field.
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }
}

fn decode_value<T: DeserializeOwned>(value: &Value) -> PortResult<T> {
    // Expanded relations arrive as full records, so route them through `Record`
    // to keep `id` and nested `expand` handling in one place.
    let record: Record = serde_json::from_value(value.clone())
        .map_err(|e| PortError::Unexpected(format!("Malformed expanded record: {}", e)))?;
    record.decode()
}

/// One page of a list query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPage {
    pub page: u32,
    pub per_page: u32,
    pub total_items: u32,
    pub items: Vec<Record>,
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create(&self, collection: Collection, fields: Value) -> PortResult<Record>;

    async fn update(&self, collection: Collection, id: &str, fields: Value) -> PortResult<Record>;

    async fn delete(&self, collection: Collection, id: &str) -> PortResult<()>;

    async fn get_one(&self, collection: Collection, id: &str, expand: &[&str])
        -> PortResult<Record>;

    async fn get_list(&self, collection: Collection, query: &ListQuery) -> PortResult<RecordPage>;

    /// Fetches every matching record by walking the pages of `query`.
    async fn get_all(&self, collection: Collection, query: &ListQuery) -> PortResult<Vec<Record>> {
        let mut query = query.clone();
        let mut records = Vec::new();
        loop {
            let page = self.get_list(collection, &query).await?;
            let fetched = page.items.len();
            records.extend(page.items);
            let seen = query.page.saturating_mul(query.per_page);
            if fetched == 0 || fetched < query.per_page as usize || seen >= page.total_items {
                return Ok(records);
            }
            query.page += 1;
        }
    }
}

#[async_trait]
pub trait AuthService: Send + Sync {
    /// Exchanges an identity (email) and secret (password) for an auth session.
    async fn authenticate(&self, identity: &str, secret: &str) -> PortResult<AuthSession>;
}
