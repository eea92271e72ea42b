pub mod auth;
pub mod builder;
pub mod composer;
pub mod directory;
pub mod domain;
pub mod memory_store;
pub mod ports;
pub mod query;
pub mod search;

pub use auth::AuthState;
pub use builder::{validate_submission, Incomplete, SessionBuilder};
pub use composer::{ComposerError, ComposerResult, SessionComposer};
pub use directory::ClubDirectory;
pub use domain::{
    AuthSession, Club, DetailLine, Exercise, ExerciseDetail, Group, Membership, NewAccount,
    RepetitionUnit, Session, SessionAggregate, SessionDraft, SessionOverview, User,
};
pub use memory_store::MemoryRecordStore;
pub use ports::{AuthService, Collection, PortError, PortResult, Record, RecordPage, RecordStore};
pub use query::{Filter, ListQuery};
pub use search::{search_exercises, DebouncedSearch, SearchResults};
