//! crates/training_core/src/composer.rs
//!
//! Turns the in-memory session aggregate into the ordered sequence of store
//! writes that keeps Sessions, ExerciseDetails and Memberships consistent, and
//! reverses it again for editing.
//!
//! The store has no multi-record transaction. Dependent sets are replaced by
//! deleting and recreating them, and a failure part-way leaves whatever was
//! already written in place; the failure is reported, not repaired.

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::auth::AuthState;
use crate::builder::{Incomplete, SessionBuilder};
use crate::domain::{
    DetailLine, Exercise, ExerciseDetail, Membership, Session, SessionAggregate, SessionDraft,
    SessionOverview, User,
};
use crate::ports::{Collection, PortError, PortResult, Record, RecordStore};
use crate::query::{Filter, ListQuery};

/// Expand key under which a Session's memberships are resolved.
pub const MEMBERSHIPS_OF_SESSION: &str = "user_sessions(session)";

const DEPENDENTS_PAGE_SIZE: u32 = 200;

/// The outcome channel of every session workflow.
#[derive(Debug, thiserror::Error)]
pub enum ComposerError {
    #[error("Session is not ready to submit: {0}")]
    Incomplete(#[from] Incomplete),
    #[error("Error saving session: {0}")]
    Save(#[source] PortError),
    #[error("Error loading session: {0}")]
    Load(#[source] PortError),
    #[error("Error deleting session: {0}")]
    Delete(#[source] PortError),
}

impl ComposerError {
    /// The single notification shown to the user. Store failures are not
    /// distinguished by kind.
    pub fn user_message(&self) -> String {
        match self {
            ComposerError::Incomplete(reason) => format!("Cannot save session: {}.", reason),
            ComposerError::Save(_) => "Error saving session. Please try again.".to_string(),
            ComposerError::Load(_) => "Error loading session. Please try again.".to_string(),
            ComposerError::Delete(_) => "Error deleting session. Please try again.".to_string(),
        }
    }

    /// The underlying store failure, if there was one.
    pub fn port_error(&self) -> Option<&PortError> {
        match self {
            ComposerError::Incomplete(_) => None,
            ComposerError::Save(e) | ComposerError::Load(e) | ComposerError::Delete(e) => Some(e),
        }
    }
}

pub type ComposerResult<T> = Result<T, ComposerError>;

fn to_fields<T: Serialize>(value: &T) -> PortResult<Map<String, Value>> {
    match serde_json::to_value(value) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(other) => Err(PortError::Unexpected(format!(
            "Expected an object payload, got {}",
            other
        ))),
        Err(e) => Err(PortError::Unexpected(e.to_string())),
    }
}

fn dependents_of(session_id: &str) -> ListQuery {
    ListQuery::new()
        .per_page(DEPENDENTS_PAGE_SIZE)
        .filter(Filter::eq("session", session_id))
}

#[derive(Clone)]
pub struct SessionComposer {
    store: Arc<dyn RecordStore>,
    auth: AuthState,
}

impl SessionComposer {
    pub fn new(store: Arc<dyn RecordStore>, auth: AuthState) -> Self {
        Self { store, auth }
    }

    //=====================================================================================
    // Workflows
    //=====================================================================================

    /// Validates the builder and creates or updates its Session. Returns the id.
    pub async fn submit(&self, builder: &SessionBuilder) -> ComposerResult<String> {
        builder.validate()?;
        let details = builder.details();
        let member_ids = builder.member_ids();
        match builder.editing_id() {
            Some(id) => {
                self.update(id, builder.draft(), &details, &member_ids)
                    .await?;
                Ok(id.to_string())
            }
            None => {
                let creator = self.auth.current_user().map(|u| u.id);
                self.create(builder.draft(), &details, &member_ids, creator.as_deref())
                    .await
            }
        }
    }

    /// Creates a Session with its exercise lines and assignments.
    pub async fn create(
        &self,
        draft: &SessionDraft,
        details: &[ExerciseDetail],
        member_ids: &[String],
        creator_id: Option<&str>,
    ) -> ComposerResult<String> {
        self.try_create(draft, details, member_ids, creator_id)
            .await
            .map_err(|e| {
                error!("Error saving session '{}': {}", draft.title, e);
                ComposerError::Save(e)
            })
    }

    /// Rewrites a Session's fields and replaces its lines and assignments.
    pub async fn update(
        &self,
        session_id: &str,
        draft: &SessionDraft,
        details: &[ExerciseDetail],
        member_ids: &[String],
    ) -> ComposerResult<()> {
        self.try_update(session_id, draft, details, member_ids)
            .await
            .map_err(|e| {
                error!("Error saving session {}: {}", session_id, e);
                ComposerError::Save(e)
            })
    }

    /// Removes a Session after its lines and assignments.
    pub async fn delete(&self, session_id: &str) -> ComposerResult<()> {
        self.try_delete(session_id).await.map_err(|e| {
            error!("Error deleting session {}: {}", session_id, e);
            ComposerError::Delete(e)
        })
    }

    /// Reassembles a stored Session for the editor. Any failed fetch aborts the
    /// whole load.
    pub async fn load_for_edit(&self, session_id: &str) -> ComposerResult<SessionAggregate> {
        self.try_load(session_id).await.map_err(|e| {
            error!("Error loading session {}: {}", session_id, e);
            ComposerError::Load(e)
        })
    }

    /// Sessions newest first, optionally limited to one group, with their lines
    /// and memberships.
    pub async fn list_sessions(&self, group_id: Option<&str>) -> ComposerResult<Vec<SessionOverview>> {
        let mut query = ListQuery::new()
            .sort_desc("created")
            .expand("exercises")
            .expand(MEMBERSHIPS_OF_SESSION);
        if let Some(group_id) = group_id {
            query = query.filter(Filter::eq("group", group_id));
        }

        self.try_list(&query).await.map_err(|e| {
            error!("Error fetching sessions: {}", e);
            ComposerError::Load(e)
        })
    }

    /// Marks an assignment as done.
    pub async fn complete_membership(
        &self,
        membership_id: &str,
        manual_verification: bool,
    ) -> ComposerResult<Membership> {
        let fields = json!({
            "completed": true,
            "completed_at": Utc::now().to_rfc3339(),
            "manualVerification": manual_verification,
        });
        self.try_complete(membership_id, fields).await.map_err(|e| {
            error!("Error completing membership {}: {}", membership_id, e);
            ComposerError::Save(e)
        })
    }

    //=====================================================================================
    // Write sequences
    //=====================================================================================

    async fn try_list(&self, query: &ListQuery) -> PortResult<Vec<SessionOverview>> {
        let records = self.store.get_all(Collection::Sessions, query).await?;
        records
            .iter()
            .map(|record| -> PortResult<SessionOverview> {
                Ok(SessionOverview {
                    session: record.decode()?,
                    details: record.expanded_many("exercises")?,
                    memberships: record.expanded_many(MEMBERSHIPS_OF_SESSION)?,
                })
            })
            .collect()
    }

    async fn try_complete(&self, membership_id: &str, fields: Value) -> PortResult<Membership> {
        self.store
            .update(Collection::Memberships, membership_id, fields)
            .await?
            .decode()
    }

    async fn try_create(
        &self,
        draft: &SessionDraft,
        details: &[ExerciseDetail],
        member_ids: &[String],
        creator_id: Option<&str>,
    ) -> PortResult<String> {
        let mut fields = to_fields(draft)?;
        fields.insert("exercises".to_string(), json!([]));
        fields.insert("user".to_string(), json!(creator_id.unwrap_or_default()));

        let session = self
            .store
            .create(Collection::Sessions, Value::Object(fields))
            .await?;
        info!("Created session {} ('{}')", session.id, draft.title);

        self.write_dependents(&session.id, details, member_ids)
            .await?;
        Ok(session.id)
    }

    async fn try_update(
        &self,
        session_id: &str,
        draft: &SessionDraft,
        details: &[ExerciseDetail],
        member_ids: &[String],
    ) -> PortResult<()> {
        self.store
            .update(Collection::Sessions, session_id, Value::Object(to_fields(draft)?))
            .await?;

        let removed_details = self
            .delete_dependents(Collection::ExerciseDetails, session_id)
            .await?;
        let removed_members = self
            .delete_dependents(Collection::Memberships, session_id)
            .await?;
        info!(
            "Cleared {} exercise lines and {} assignments of session {}",
            removed_details, removed_members, session_id
        );

        self.write_dependents(session_id, details, member_ids).await
    }

    async fn try_delete(&self, session_id: &str) -> PortResult<()> {
        self.delete_dependents(Collection::ExerciseDetails, session_id)
            .await?;
        self.delete_dependents(Collection::Memberships, session_id)
            .await?;
        self.store.delete(Collection::Sessions, session_id).await?;
        info!("Deleted session {}", session_id);
        Ok(())
    }

    /// Creates the lines, links them from the Session, then creates the
    /// assignments.
    async fn write_dependents(
        &self,
        session_id: &str,
        details: &[ExerciseDetail],
        member_ids: &[String],
    ) -> PortResult<()> {
        let detail_payloads = details
            .iter()
            .map(|detail| -> PortResult<Value> {
                let mut detail = detail.clone();
                detail.id = None;
                detail.session = Some(session_id.to_string());
                to_fields(&detail).map(Value::Object)
            })
            .collect::<PortResult<Vec<_>>>()?;
        let created = self
            .create_batch(Collection::ExerciseDetails, detail_payloads)
            .await?;

        let detail_ids: Vec<String> = created.into_iter().map(|r| r.id).collect();
        self.store
            .update(
                Collection::Sessions,
                session_id,
                json!({ "exercises": detail_ids }),
            )
            .await?;

        let membership_payloads = member_ids
            .iter()
            .map(|user_id| to_fields(&Membership::assign(user_id, session_id)).map(Value::Object))
            .collect::<PortResult<Vec<_>>>()?;
        self.create_batch(Collection::Memberships, membership_payloads)
            .await?;
        Ok(())
    }

    /// Issues all creates at once and waits for every one of them. Records that
    /// were written stay written even if a sibling fails.
    async fn create_batch(
        &self,
        collection: Collection,
        payloads: Vec<Value>,
    ) -> PortResult<Vec<Record>> {
        let total = payloads.len();
        let results = join_all(
            payloads
                .into_iter()
                .map(|fields| self.store.create(collection, fields)),
        )
        .await;

        let written = results.iter().filter(|r| r.is_ok()).count();
        if written < total {
            warn!(
                "Only {} of {} {} records were written",
                written, total, collection
            );
        }
        results.into_iter().collect()
    }

    async fn delete_dependents(&self, collection: Collection, session_id: &str) -> PortResult<usize> {
        let records = self
            .store
            .get_all(collection, &dependents_of(session_id))
            .await?;
        let results = join_all(
            records
                .iter()
                .map(|record| self.store.delete(collection, &record.id)),
        )
        .await;

        let removed = results.iter().filter(|r| r.is_ok()).count();
        if removed < records.len() {
            warn!(
                "Only {} of {} {} records of session {} were removed",
                removed,
                records.len(),
                collection,
                session_id
            );
        }
        results.into_iter().collect::<PortResult<Vec<()>>>()?;
        Ok(removed)
    }

    //=====================================================================================
    // Hydration
    //=====================================================================================

    async fn try_load(&self, session_id: &str) -> PortResult<SessionAggregate> {
        let session: Session = self
            .store
            .get_one(Collection::Sessions, session_id, &[])
            .await?
            .decode()?;

        let detail_query = dependents_of(session_id).expand("exercise");
        let member_query = dependents_of(session_id).expand("user");
        let (detail_records, member_records) = futures::try_join!(
            self.store.get_all(Collection::ExerciseDetails, &detail_query),
            self.store.get_all(Collection::Memberships, &member_query),
        )?;

        let mut lines = detail_records
            .iter()
            .map(|record| -> PortResult<DetailLine> {
                let detail: ExerciseDetail = record.decode()?;
                let exercise: Exercise = record.expanded_one("exercise")?.ok_or_else(|| {
                    PortError::NotFound(format!(
                        "Exercise {} of line {} not found",
                        detail.exercise, record.id
                    ))
                })?;
                Ok(DetailLine { exercise, detail })
            })
            .collect::<PortResult<Vec<_>>>()?;

        // Lines appear in the order the Session lists them.
        lines.sort_by_key(|line| {
            line.detail
                .id
                .as_ref()
                .and_then(|id| session.exercises.iter().position(|e| e == id))
                .unwrap_or(usize::MAX)
        });

        let members = member_records
            .iter()
            .map(|record| -> PortResult<User> {
                record.expanded_one::<User>("user")?.ok_or_else(|| {
                    PortError::NotFound(format!("User of assignment {} not found", record.id))
                })
            })
            .collect::<PortResult<Vec<_>>>()?;

        Ok(SessionAggregate {
            session,
            lines,
            members,
        })
    }
}
