//! crates/training_core/src/directory.rs
//!
//! Accounts, clubs and groups: the organizational data a coach sets up before
//! sessions can be assigned.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthState;
use crate::domain::{Club, Group, NewAccount, User};
use crate::ports::{Collection, PortError, PortResult, RecordStore};
use crate::query::{Filter, ListQuery};

const INVITATION_CODE_LEN: usize = 6;

/// A short, upper-case code members use to join a group.
pub fn invitation_code() -> String {
    Uuid::new_v4().simple().to_string()[..INVITATION_CODE_LEN].to_uppercase()
}

#[derive(Clone)]
pub struct ClubDirectory {
    store: Arc<dyn RecordStore>,
    auth: AuthState,
}

impl ClubDirectory {
    pub fn new(store: Arc<dyn RecordStore>, auth: AuthState) -> Self {
        Self { store, auth }
    }

    fn signed_in(&self) -> PortResult<User> {
        self.auth.current_user().ok_or(PortError::Unauthorized)
    }

    //=====================================================================================
    // Accounts
    //=====================================================================================

    pub async fn register(&self, account: &NewAccount) -> PortResult<User> {
        let mut fields = serde_json::to_value(account)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        if let Value::Object(map) = &mut fields {
            map.insert("emailVisibility".to_string(), Value::Bool(true));
        }
        let user: User = self.store.create(Collection::Users, fields).await?.decode()?;
        info!("Registered user {}", user.id);
        Ok(user)
    }

    //=====================================================================================
    // Clubs
    //=====================================================================================

    /// Creates a club administered by the signed-in user and points the user at it.
    pub async fn create_club(&self, name: &str) -> PortResult<Club> {
        let user = self.signed_in()?;
        let club: Club = self
            .store
            .create(Collection::Clubs, json!({ "name": name, "admin": [&user.id] }))
            .await?
            .decode()?;
        self.store
            .update(Collection::Users, &user.id, json!({ "clubs": &club.id }))
            .await?;
        info!("Created club {} for user {}", club.id, user.id);
        Ok(club)
    }

    /// The club the signed-in user belongs to, if any.
    pub async fn user_club(&self) -> PortResult<Option<Club>> {
        let Some(user) = self.auth.current_user() else {
            return Ok(None);
        };
        match self
            .store
            .get_one(Collection::Users, &user.id, &["clubs"])
            .await
        {
            Ok(record) => record.expanded_one("clubs"),
            Err(PortError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn list_clubs(&self) -> PortResult<Vec<Club>> {
        let query = ListQuery::new().sort_asc("name");
        self.store
            .get_all(Collection::Clubs, &query)
            .await?
            .iter()
            .map(|r| r.decode())
            .collect()
    }

    //=====================================================================================
    // Groups
    //=====================================================================================

    pub async fn club_groups(&self, club_id: &str) -> PortResult<Vec<(Group, Vec<User>)>> {
        let query = ListQuery::new()
            .filter(Filter::eq("club", club_id))
            .sort_asc("name")
            .expand("members");
        self.store
            .get_all(Collection::Groups, &query)
            .await?
            .iter()
            .map(|r| -> PortResult<(Group, Vec<User>)> {
                Ok((r.decode()?, r.expanded_many("members")?))
            })
            .collect()
    }

    pub async fn create_group(&self, name: &str, club_id: &str) -> PortResult<Group> {
        let group: Group = self
            .store
            .create(
                Collection::Groups,
                json!({
                    "name": name,
                    "club": club_id,
                    "members": [],
                    "invitationCode": invitation_code(),
                }),
            )
            .await?
            .decode()?;
        info!("Created group {} in club {}", group.id, club_id);
        Ok(group)
    }

    pub async fn delete_group(&self, group_id: &str) -> PortResult<()> {
        self.store.delete(Collection::Groups, group_id).await
    }

    /// Adds users to a group; existing members are kept and not duplicated.
    pub async fn add_members_to_group(
        &self,
        group_id: &str,
        member_ids: &[String],
    ) -> PortResult<Group> {
        let group: Group = self
            .store
            .get_one(Collection::Groups, group_id, &[])
            .await?
            .decode()?;
        let mut members = group.members;
        for id in member_ids {
            if !members.contains(id) {
                members.push(id.clone());
            }
        }
        self.store
            .update(Collection::Groups, group_id, json!({ "members": members }))
            .await?
            .decode()
    }

    pub async fn remove_member_from_group(&self, group_id: &str, member_id: &str) -> PortResult<Group> {
        let group: Group = self
            .store
            .get_one(Collection::Groups, group_id, &[])
            .await?
            .decode()?;
        let members: Vec<String> = group
            .members
            .into_iter()
            .filter(|id| id != member_id)
            .collect();
        self.store
            .update(Collection::Groups, group_id, json!({ "members": members }))
            .await?
            .decode()
    }

    /// The users of a group, offered when picking a Session's assignees.
    pub async fn group_members(&self, group_id: &str) -> PortResult<Vec<User>> {
        self.store
            .get_one(Collection::Groups, group_id, &["members"])
            .await?
            .expanded_many("members")
    }
}
