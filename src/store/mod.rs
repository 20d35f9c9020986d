//! Persistence gateway: vote rows, audit history, flagged paths, locked
//! votes.
//!
//! The gateway is a trait seam so state construction can be tested against
//! scratch databases; the shipped implementation is SQLite. All calls are
//! blocking, carry no implicit timeout, and are never retried internally;
//! failures propagate to the caller as `StoreError`.

mod sqlite;

pub use sqlite::SqliteGateway;

use thiserror::Error;

use crate::core::{LocaleKey, PathId, SubmitterId, Timestamp, VoteType};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store schema version mismatch: expected {expected}, got {got}")]
    SchemaVersionMismatch { expected: u32, got: u32 },
    #[error("store connection lock poisoned")]
    Poisoned,
}

/// One persisted vote row. `value: None` is a recorded abstention.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoteRow {
    pub path: PathId,
    pub submitter: SubmitterId,
    pub value: Option<String>,
    pub strength: Option<u32>,
    pub when: Timestamp,
    pub vote_type: VoteType,
}

/// One administratively locked vote.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockedRow {
    pub path: PathId,
    pub value: String,
    pub when: Timestamp,
}

pub trait PersistenceGateway: Send + Sync {
    /// Bulk read of every vote row for a key. Called once per state
    /// construction and again when building export snapshots.
    fn load_votes(&self, key: &LocaleKey) -> Result<Vec<VoteRow>, StoreError>;

    /// Administratively permanent votes for a key.
    fn load_locked(&self, key: &LocaleKey) -> Result<Vec<LockedRow>, StoreError>;

    /// Idempotent vote upsert. The submitter's immediately-prior non-null
    /// value is retained in the history table before being overwritten.
    fn save_vote(
        &self,
        key: &LocaleKey,
        path: PathId,
        submitter: SubmitterId,
        value: Option<&str>,
        strength: Option<u32>,
        vote_type: VoteType,
    ) -> Result<(), StoreError>;

    /// Prior values retained for a (key, path, submitter), for audit.
    fn vote_history(
        &self,
        key: &LocaleKey,
        path: PathId,
        submitter: SubmitterId,
    ) -> Result<Vec<String>, StoreError>;

    fn lock_path(&self, key: &LocaleKey, path: PathId, value: &str) -> Result<(), StoreError>;

    fn unlock_path(&self, key: &LocaleKey, path: PathId) -> Result<(), StoreError>;

    /// Whole flagged-path table; loaded once into the factory's flag cache.
    fn load_flags(&self) -> Result<Vec<(LocaleKey, PathId)>, StoreError>;

    /// Returns false if the flag was already present.
    fn set_flag(
        &self,
        key: &LocaleKey,
        path: PathId,
        submitter: SubmitterId,
    ) -> Result<bool, StoreError>;

    fn clear_flag(&self, key: &LocaleKey, path: PathId) -> Result<(), StoreError>;
}

/// External path interner: canonical path string ⇄ stable small-integer id.
///
/// Paths are never created by this crate; the index is the authority.
pub trait PathIndex: Send + Sync {
    fn id_of(&self, path: &str) -> Option<PathId>;
    fn path_of(&self, id: PathId) -> Option<String>;
}
