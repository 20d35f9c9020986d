//! External collaborator contracts: submitter directory, path visibility,
//! value normalization.

use thiserror::Error;

use crate::core::{LocaleKey, SubmitterId};

/// Override strength that makes a vote "permanent": it locks the path.
pub const PERMANENT_STRENGTH: u32 = 1000;

/// Reserved strength carried by the synthetic system record for a locked
/// path. Not grantable to real submitters.
pub const LOCKING_STRENGTH: u32 = 2000;

/// Who may vote, at what weight, on which keys.
///
/// Backed by an external registry; `refresh` re-reads it after the resolver
/// reports an unknown submitter.
pub trait SubmitterDirectory: Send + Sync {
    /// May this submitter's votes be counted for this key at all?
    /// Rows failing this are skipped during bulk load.
    fn permitted_to_vote(&self, submitter: SubmitterId, key: &LocaleKey) -> bool;

    /// `None` if the submitter may modify the key; otherwise the denial
    /// reason, surfaced in the error.
    fn can_modify(&self, submitter: SubmitterId, key: &LocaleKey) -> Option<String>;

    /// The submitter's default voting weight.
    fn default_strength(&self, submitter: SubmitterId) -> u32;

    /// May this submitter vote with the given override strength?
    fn can_vote_with_strength(&self, submitter: SubmitterId, strength: u32) -> bool;

    /// Elevated rights: voting on hidden paths, abstain-on-new-path, flag
    /// clearing.
    fn is_admin(&self, submitter: SubmitterId) -> bool;

    /// Re-read the backing registry.
    fn refresh(&self);
}

/// Which paths are open for voting at all.
pub trait PathVisibility: Send + Sync {
    /// Hidden or deprecated paths are skipped on bulk load and rejected on
    /// live submission (admins excepted).
    fn visible_for_voting(&self, path: &str, submitter: SubmitterId) -> bool;
}

#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum NormalizeError {
    /// Normalization produced an empty string.
    #[error("normalization of value at `{path}` produced an empty string")]
    EmptiedValue { path: String },
}

/// Input normalization applied to every candidate value.
///
/// Applied on live submission and again to bulk-loaded rows, since the
/// normalization criteria may have changed after a row was written.
pub trait ValueNormalizer: Send + Sync {
    fn normalize(&self, path: &str, value: &str) -> Result<String, NormalizeError>;
}

/// Normalizer that trims surrounding whitespace and nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrimNormalizer;

impl ValueNormalizer for TrimNormalizer {
    fn normalize(&self, path: &str, value: &str) -> Result<String, NormalizeError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(NormalizeError::EmptiedValue { path: path.into() });
        }
        Ok(trimmed.to_string())
    }
}
