//! Resolution contract.
//!
//! The resolver is externally supplied and opaque: it takes the baseline
//! value, a fallback value, and the active votes, and yields one winning
//! value with a confidence status. Implementations must be order-independent
//! over `add` calls. Resolvers are reusable scratch objects: `reset` is
//! called before each path and no state is assumed to survive across keys.

use thiserror::Error;

use crate::core::{LocaleKey, SubmitterId, Timestamp};
use crate::dataset::ValueStatus;

#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum ResolverError {
    /// The resolver saw a submitter id missing from its voter directory.
    /// The caller refreshes the directory and retries once; a second
    /// occurrence is fatal for the key.
    #[error("submitter {0} unknown to the resolver")]
    UnknownSubmitter(SubmitterId),
}

pub trait Resolver: Send {
    /// Clear all per-path state for reuse.
    fn reset(&mut self);

    /// Baseline value and its status for the path being resolved.
    fn set_baseline(&mut self, value: Option<&str>, status: ValueStatus);

    /// Inherited/fallback value to consider.
    fn set_fallback(&mut self, value: Option<&str>);

    /// Feed one candidate. The baseline value is fed with no submitter;
    /// votes carry their submitter, override strength, and timestamp.
    fn add(
        &mut self,
        value: Option<&str>,
        submitter: Option<SubmitterId>,
        strength: Option<u32>,
        when: Option<Timestamp>,
    ) -> Result<(), ResolverError>;

    fn winning_value(&self) -> Option<String>;

    fn winning_status(&self) -> ValueStatus;
}

/// Supplies resolvers configured for a key's context.
pub trait ResolverFactory: Send + Sync {
    fn resolver_for(&self, key: &LocaleKey) -> Box<dyn Resolver>;
}
