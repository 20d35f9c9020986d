#![forbid(unsafe_code)]

//! Per-locale vote overlay store.
//!
//! Each locale key owns an immutable baseline dataset and a mutable overlay
//! of crowd-submitted candidate values. A pluggable resolver combines
//! baseline and votes into one winning value per path. The crate provides
//! the layered cache around that: softly-cached per-key state, read-through
//! overlay views with a gated write path, monotonic version stamps, and a
//! load/recompute protocol that stays consistent under concurrent
//! submission and re-materialization after eviction.

pub mod config;
pub mod core;
pub mod dataset;
pub mod directory;
pub mod error;
pub mod factory;
pub mod overlay;
pub mod resolver;
pub mod state;
pub mod store;
pub mod telemetry;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

// Re-export the working surface at the crate root.
pub use crate::config::Config;
pub use crate::core::{
    LocaleKey, PathId, StampToken, SubmitterId, Timestamp, ValueLimits, VersionStamp, VoteLedger,
    VoteRecord, VoteType,
};
pub use crate::dataset::{
    BaselineProvider, BaselineSource, ReadableDataset, SimpleDataset, ValueStatus,
};
pub use crate::directory::{
    PathVisibility, SubmitterDirectory, ValueNormalizer, LOCKING_STRENGTH, PERMANENT_STRENGTH,
};
pub use crate::factory::{BallotFactory, BallotFactoryBuilder, FlagCache};
pub use crate::overlay::{OverlayError, OverlaySource};
pub use crate::resolver::{Resolver, ResolverError, ResolverFactory};
pub use crate::state::{PerKeyState, RefreshContext, VoteError};
pub use crate::store::{PathIndex, PersistenceGateway, SqliteGateway, StoreError};
