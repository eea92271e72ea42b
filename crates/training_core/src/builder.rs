//! crates/training_core/src/builder.rs
//!
//! The in-memory session editor: a draft Session, its ordered exercise lines and
//! the users it will be assigned to, built up one user action at a time.

use chrono::{NaiveDate, Utc};

use crate::domain::{
    DetailLine, Exercise, ExerciseDetail, SessionAggregate, SessionDraft, User,
};

/// Why a draft cannot be submitted yet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Incomplete {
    #[error("a title is required")]
    MissingTitle,
    #[error("a session type is required")]
    MissingType,
    #[error("at least one exercise is required")]
    NoExercises,
    #[error("at least one member must be assigned")]
    NoMembers,
    #[error("exercise line {0} needs at least one set and one repetition")]
    EmptyLine(usize),
}

/// Checks that a draft, its lines and its assignees form a submittable Session.
pub fn validate_submission(
    draft: &SessionDraft,
    details: &[ExerciseDetail],
    member_ids: &[String],
) -> Result<(), Incomplete> {
    if draft.title.trim().is_empty() {
        return Err(Incomplete::MissingTitle);
    }
    if draft.kind.trim().is_empty() {
        return Err(Incomplete::MissingType);
    }
    if details.is_empty() {
        return Err(Incomplete::NoExercises);
    }
    if member_ids.is_empty() {
        return Err(Incomplete::NoMembers);
    }
    if let Some(index) = details.iter().position(|d| d.set < 1 || d.repetition < 1) {
        return Err(Incomplete::EmptyLine(index));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionBuilder {
    editing: Option<String>,
    draft: SessionDraft,
    lines: Vec<DetailLine>,
    club: Option<String>,
    roster: Vec<User>,
    members: Vec<User>,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::starting_on(Utc::now().date_naive())
    }

    /// An empty builder whose dates default to `today`.
    pub fn starting_on(today: NaiveDate) -> Self {
        Self {
            editing: None,
            draft: SessionDraft::new(today),
            lines: Vec::new(),
            club: None,
            roster: Vec::new(),
            members: Vec::new(),
        }
    }

    /// Populates the builder from a hydrated Session and switches to edit mode.
    pub fn load(&mut self, aggregate: SessionAggregate) {
        self.draft = SessionDraft::from(&aggregate.session);
        self.editing = Some(aggregate.session.id);
        self.lines = aggregate.lines;
        self.members = aggregate.members;
        self.roster.clear();
    }

    /// The id of the stored Session being edited, if any.
    pub fn editing_id(&self) -> Option<&str> {
        self.editing.as_deref()
    }

    pub fn draft(&self) -> &SessionDraft {
        &self.draft
    }

    /// Mutable access to the scalar fields (title, dates, points, ...).
    pub fn edit_draft(&mut self) -> &mut SessionDraft {
        &mut self.draft
    }

    pub fn lines(&self) -> &[DetailLine] {
        &self.lines
    }

    pub fn details(&self) -> Vec<ExerciseDetail> {
        self.lines.iter().map(|l| l.detail.clone()).collect()
    }

    /// Appends a line for `exercise` with the default prescription. The same
    /// exercise may be added more than once.
    pub fn add_exercise(&mut self, exercise: Exercise) {
        let detail = ExerciseDetail::with_defaults(exercise.id.clone());
        self.lines.push(DetailLine { exercise, detail });
    }

    /// Replaces the prescription at `index`; out-of-range indices are ignored.
    pub fn update_detail(&mut self, index: usize, detail: ExerciseDetail) {
        if let Some(line) = self.lines.get_mut(index) {
            line.detail = detail;
        }
    }

    /// Removes the line at `index`; later lines shift down by one.
    pub fn remove_detail(&mut self, index: usize) {
        if index < self.lines.len() {
            self.lines.remove(index);
        }
    }

    pub fn club(&self) -> Option<&str> {
        self.club.as_deref()
    }

    /// Selecting a club invalidates the group and member choices made under the
    /// previous one.
    pub fn set_club(&mut self, club_id: Option<String>) {
        if self.club != club_id {
            self.club = club_id;
            self.draft.group = None;
            self.roster.clear();
            self.members.clear();
        }
    }

    pub fn group(&self) -> Option<&str> {
        self.draft.group.as_deref()
    }

    /// Changing the target group clears the selected members, which must belong
    /// to the chosen group.
    pub fn set_group(&mut self, group_id: Option<String>) {
        if self.draft.group != group_id {
            self.draft.group = group_id;
            self.roster.clear();
            self.members.clear();
        }
    }

    /// The members of the chosen group, offered for selection.
    pub fn set_roster(&mut self, users: Vec<User>) {
        self.roster = users;
    }

    pub fn roster(&self) -> &[User] {
        &self.roster
    }

    pub fn members(&self) -> &[User] {
        &self.members
    }

    pub fn member_ids(&self) -> Vec<String> {
        self.members.iter().map(|u| u.id.clone()).collect()
    }

    /// Replaces the assignee set wholesale.
    pub fn set_members(&mut self, users: Vec<User>) {
        self.members = users;
    }

    /// Checks or unchecks one roster user. The selection keeps roster order.
    /// Returns false if `user_id` is not on the roster.
    pub fn toggle_member(&mut self, user_id: &str) -> bool {
        if !self.roster.iter().any(|u| u.id == user_id) {
            return false;
        }
        let mut selected: Vec<String> = self.member_ids();
        match selected.iter().position(|id| id == user_id) {
            Some(pos) => {
                selected.remove(pos);
            }
            None => selected.push(user_id.to_string()),
        }
        self.members = self
            .roster
            .iter()
            .filter(|u| selected.contains(&u.id))
            .cloned()
            .collect();
        true
    }

    pub fn validate(&self) -> Result<(), Incomplete> {
        validate_submission(&self.draft, &self.details(), &self.member_ids())
    }

    pub fn is_submittable(&self) -> bool {
        self.validate().is_ok()
    }

    /// Back to an empty draft dated today.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}
