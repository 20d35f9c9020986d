//! Core domain types.
//!
//! Module hierarchy follows type dependency order:
//! - time: Timestamp
//! - identity: LocaleKey, SubmitterId, PathId
//! - vote: VoteType, VoteRecord
//! - ledger: VoteLedger
//! - stamp: VersionStamp / StampToken
//! - limits: ValueLimits

pub mod error;
pub mod identity;
pub mod ledger;
pub mod limits;
pub mod stamp;
pub mod time;
pub mod vote;

pub use error::{CoreError, InvalidId};
pub use identity::{LocaleKey, PathId, SubmitterId};
pub use ledger::VoteLedger;
pub use limits::{ValueLimits, MAX_VALUE_LEN, OVERSIZE_VALUE_LEN};
pub use stamp::{StampToken, VersionStamp};
pub use time::Timestamp;
pub use vote::{VoteRecord, VoteType};
