//! Per-key state: vote ledgers, baseline handle, overlay, version stamp.
//!
//! One instance per locale key, shared by all callers. The instance lock
//! serializes overlay materialization and vote submission; reads of
//! already-resolved data go through the overlay without taking it.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use dashmap::DashMap;
use thiserror::Error;

use crate::core::{
    LocaleKey, PathId, StampToken, SubmitterId, Timestamp, VersionStamp, VoteLedger, VoteType,
};
use crate::dataset::{
    with_confidence, BaselineSource, DatasetError, ReadableDataset, SimpleDataset,
};
use crate::directory::{NormalizeError, LOCKING_STRENGTH, PERMANENT_STRENGTH};
use crate::factory::Collaborators;
use crate::overlay::OverlaySource;
use crate::resolver::{Resolver, ResolverError};
use crate::store::StoreError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VoteError {
    /// The path is not in the key's accepted path set (and the submitter
    /// lacks the admin abstain exception).
    #[error("path `{path}` is not accepted for voting")]
    InvalidPath { path: String },

    #[error("submitter {submitter} cannot modify key `{key}`: {reason}")]
    PermissionDenied {
        submitter: SubmitterId,
        key: LocaleKey,
        reason: String,
    },

    #[error("submitter {submitter} may not vote with strength {strength}")]
    StrengthNotAllowed {
        submitter: SubmitterId,
        strength: u32,
    },

    #[error("value length {len} exceeds limit {limit}")]
    ValueTooLong { len: usize, limit: usize },

    #[error(transparent)]
    Normalization(#[from] NormalizeError),

    #[error("key `{key}` is read-only")]
    ReadOnlyKey { key: LocaleKey },

    /// The resolver rejected a submitter even after a directory refresh.
    /// The key's state must be invalidated and reconstructed.
    #[error("submitter {submitter} unknown to the resolver after retry; key `{key}` needs reconstruction")]
    UnknownSubmitter {
        submitter: SubmitterId,
        key: LocaleKey,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

/// Why a path is being (re)resolved. Controls the empty-ledger shortcut and
/// the refresh path set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshContext {
    /// Bulk load for the cached overlay. An empty ledger cannot change the
    /// outcome here, so resolution is skipped for it.
    Ordinary,
    /// Export snapshot: resolve ledger paths and every baseline path, and
    /// never skip resolution.
    Export,
    /// A vote or abstention was just recorded; resolution must run even on
    /// an empty ledger so a withdrawal clears the previously posted value.
    SingleVote,
}

pub struct PerKeyState {
    key: LocaleKey,
    read_only: bool,
    baseline: Arc<dyn BaselineSource>,
    ledgers: Arc<DashMap<String, VoteLedger>>,
    accepted_paths: RwLock<BTreeSet<String>>,
    stamp: Arc<VersionStamp>,
    /// Materialization cell and mutation lock in one: `None` until the
    /// cached overlay is first built.
    overlay: Mutex<Option<Arc<OverlaySource>>>,
    deps: Arc<Collaborators>,
}

impl PerKeyState {
    pub(crate) fn new(
        key: LocaleKey,
        baseline: Arc<dyn BaselineSource>,
        stamp: Arc<VersionStamp>,
        read_only: bool,
        deps: Arc<Collaborators>,
    ) -> Self {
        let accepted: BTreeSet<String> = baseline.paths().into_iter().collect();
        Self {
            key,
            read_only,
            baseline,
            ledgers: Arc::new(DashMap::new()),
            accepted_paths: RwLock::new(accepted),
            stamp,
            overlay: Mutex::new(None),
            deps,
        }
    }

    pub fn key(&self) -> &LocaleKey {
        &self.key
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn stamp_token(&self) -> StampToken {
        self.stamp.current()
    }

    pub fn baseline(&self) -> &Arc<dyn BaselineSource> {
        &self.baseline
    }

    fn lock_overlay(&self) -> MutexGuard<'_, Option<Arc<OverlaySource>>> {
        match self.overlay.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// The cached resolved view, materialized on first access: baseline is
    /// pulled, persisted votes bulk-loaded, every ledger path resolved.
    pub fn overlay(&self) -> Result<Arc<OverlaySource>, VoteError> {
        let mut cell = self.lock_overlay();
        self.ensure_overlay(&mut cell)
    }

    fn ensure_overlay(
        &self,
        cell: &mut Option<Arc<OverlaySource>>,
    ) -> Result<Arc<OverlaySource>, VoteError> {
        if let Some(overlay) = cell.as_ref() {
            return Ok(overlay.clone());
        }
        let overlay = Arc::new(OverlaySource::new(
            self.key.clone(),
            self.baseline.clone(),
            self.ledgers.clone(),
        ));
        if !self.read_only {
            self.load_votes_into(&overlay, RefreshContext::Ordinary)?;
            self.stamp.next();
        }
        *cell = Some(overlay.clone());
        Ok(overlay)
    }

    /// Uncached snapshot for export: same construction as the cached
    /// overlay, but resolution covers ledger paths and all baseline paths,
    /// so consumers see resolved values even for vote-free paths.
    pub fn build_export_snapshot(&self) -> Result<Arc<OverlaySource>, VoteError> {
        let _cell = self.lock_overlay();
        let overlay = Arc::new(OverlaySource::new(
            self.key.clone(),
            self.baseline.clone(),
            self.ledgers.clone(),
        ));
        if !self.read_only {
            self.load_votes_into(&overlay, RefreshContext::Export)?;
        }
        Ok(overlay)
    }

    /// Every persisted non-null vote as its own proposal entry, qualified by
    /// submitter (and override strength when present). Reads straight from
    /// the gateway; nothing is cached.
    pub fn build_proposed_snapshot(&self) -> Result<SimpleDataset, VoteError> {
        let rows = self.deps.gateway.load_votes(&self.key)?;
        let mut dataset = SimpleDataset::new();
        for row in rows {
            let Some(value) = row.value else { continue };
            let Some(path) = self.deps.paths.path_of(row.path) else {
                tracing::warn!(key = %self.key, id = %row.path, "skipping vote row with unknown path id");
                continue;
            };
            let qualified = match row.strength {
                Some(s) => format!("{path}[@proposed=\"s{}v{s}\"]", row.submitter.get()),
                None => format!("{path}[@proposed=\"s{}\"]", row.submitter.get()),
            };
            dataset.set_value_at_full_path(qualified, value);
        }
        Ok(dataset)
    }

    /// Bulk-load persisted votes and locked votes into the ledgers, then
    /// resolve. Any gateway failure here is fatal to the construction.
    fn load_votes_into(
        &self,
        target: &OverlaySource,
        context: RefreshContext,
    ) -> Result<(), VoteError> {
        let mut applied = 0usize;
        let mut skipped = 0usize;
        for row in self.deps.gateway.load_votes(&self.key)? {
            let Some(path) = self.deps.paths.path_of(row.path) else {
                tracing::warn!(key = %self.key, id = %row.path, "ignoring vote row with unknown path id");
                skipped += 1;
                continue;
            };
            if !self
                .deps
                .directory
                .permitted_to_vote(row.submitter, &self.key)
            {
                skipped += 1;
                continue;
            }
            if !self
                .deps
                .visibility
                .visible_for_voting(&path, row.submitter)
            {
                skipped += 1;
                continue;
            }
            let value = match &row.value {
                Some(raw) => match self.deps.normalizer.normalize(&path, raw) {
                    Ok(v) => Some(v),
                    Err(e) => {
                        tracing::warn!(key = %self.key, %path, "dropping vote at load: {e}");
                        skipped += 1;
                        continue;
                    }
                },
                None => None,
            };
            match self.record_vote(
                &path,
                row.submitter,
                value.as_deref(),
                row.strength,
                row.when,
                row.vote_type,
            ) {
                Ok(()) => applied += 1,
                Err(e) => {
                    tracing::warn!(key = %self.key, %path, "dropping vote at load: {e}");
                    skipped += 1;
                }
            }
        }
        for locked in self.deps.gateway.load_locked(&self.key)? {
            let Some(path) = self.deps.paths.path_of(locked.path) else {
                tracing::warn!(key = %self.key, id = %locked.path, "ignoring locked vote with unknown path id");
                continue;
            };
            match self.record_vote(
                &path,
                SubmitterId::SYSTEM,
                Some(&locked.value),
                Some(LOCKING_STRENGTH),
                locked.when,
                VoteType::Direct,
            ) {
                Ok(()) => applied += 1,
                Err(e) => {
                    tracing::warn!(key = %self.key, %path, "ignoring locked vote: {e}")
                }
            }
        }
        tracing::debug!(key = %self.key, applied, skipped, "loaded votes");

        let mut resolver = self.deps.resolvers.resolver_for(&self.key);
        let mut to_resolve: BTreeSet<String> =
            self.ledgers.iter().map(|e| e.key().clone()).collect();
        if context == RefreshContext::Export {
            to_resolve.extend(self.baseline.paths());
        }
        let mut resolved = 0usize;
        for path in &to_resolve {
            // Per-path resolution failures degrade that path, not the key.
            if let Err(e) = self.refresh_path(target, path, resolver.as_mut(), context) {
                tracing::warn!(key = %self.key, %path, "resolution failed: {e}");
            } else {
                resolved += 1;
            }
        }
        tracing::debug!(key = %self.key, resolved, "resolved paths");
        Ok(())
    }

    /// Recompute the resolved value for one path and install it in `target`.
    fn refresh_path(
        &self,
        target: &OverlaySource,
        path: &str,
        resolver: &mut dyn Resolver,
        context: RefreshContext,
    ) -> Result<(), VoteError> {
        let ledger_empty = self
            .ledgers
            .get(path)
            .map(|l| l.is_empty())
            .unwrap_or(true);
        if context == RefreshContext::Ordinary && ledger_empty {
            // An empty ledger cannot change the ordinary outcome; restore
            // baseline pass-through instead of resolving.
            target.forget(path);
            return Ok(());
        }
        self.configure_resolver(path, resolver)?;
        let status = resolver.winning_status();
        let full_path = with_confidence(
            &self
                .baseline
                .full_path_at(path)
                .unwrap_or_else(|| path.to_string()),
            status,
        );
        match resolver.winning_value().filter(|v| !v.is_empty()) {
            Some(value) => target.apply_resolved(path, Some((full_path, value))),
            None => target.apply_resolved(path, None),
        }
        Ok(())
    }

    /// Feed the resolver for one path: baseline value + status, fallback
    /// value, then every active vote in unspecified order. An unknown
    /// submitter triggers one directory refresh and retry; the second
    /// failure is fatal for the key.
    fn configure_resolver(
        &self,
        path: &str,
        resolver: &mut dyn Resolver,
    ) -> Result<(), VoteError> {
        match self.try_configure_resolver(path, resolver) {
            Ok(()) => Ok(()),
            Err(ResolverError::UnknownSubmitter(first)) => {
                tracing::warn!(key = %self.key, submitter = %first, "unknown submitter; refreshing directory");
                self.deps.directory.refresh();
                match self.try_configure_resolver(path, resolver) {
                    Ok(()) => Ok(()),
                    Err(ResolverError::UnknownSubmitter(submitter)) => {
                        tracing::error!(key = %self.key, %submitter, "unknown submitter after refresh");
                        Err(VoteError::UnknownSubmitter {
                            submitter,
                            key: self.key.clone(),
                        })
                    }
                }
            }
        }
    }

    fn try_configure_resolver(
        &self,
        path: &str,
        resolver: &mut dyn Resolver,
    ) -> Result<(), ResolverError> {
        resolver.reset();
        let baseline_value = self.baseline.value_at(path);
        resolver.set_baseline(baseline_value.as_deref(), self.baseline.status_at(path));
        resolver.add(baseline_value.as_deref(), None, None, None)?;
        resolver.set_fallback(self.baseline.fallback_value_at(path).as_deref());
        if let Some(ledger) = self.ledgers.get(path) {
            for (submitter, record) in ledger.votes() {
                resolver.add(
                    Some(&record.value),
                    Some(submitter),
                    record.strength,
                    Some(record.when),
                )?;
            }
        }
        Ok(())
    }

    /// Submit or withdraw a vote. Validation precedes all mutation;
    /// persistence precedes the ledger update; the path is re-resolved
    /// before this returns, so a read on any thread observes the outcome.
    pub fn submit_vote(
        &self,
        submitter: SubmitterId,
        path: &str,
        value: Option<&str>,
        strength: Option<u32>,
        vote_type: VoteType,
    ) -> Result<(), VoteError> {
        let mut cell = self.lock_overlay();
        let overlay = self.ensure_overlay(&mut cell)?;

        if self.read_only {
            return Err(VoteError::ReadOnlyKey {
                key: self.key.clone(),
            });
        }
        self.check_accepted_path(path, submitter, value)?;
        let value = match value {
            Some(raw) => Some(self.deps.normalizer.normalize(path, raw)?),
            None => None,
        };
        if let Some(reason) = self.deps.directory.can_modify(submitter, &self.key) {
            return Err(VoteError::PermissionDenied {
                submitter,
                key: self.key.clone(),
                reason,
            });
        }
        let strength = self.check_strength(submitter, strength)?;
        if let Some(v) = &value {
            let limit = self.deps.limits.max_len(&self.key, path);
            if v.len() > limit {
                return Err(VoteError::ValueTooLong {
                    len: v.len(),
                    limit,
                });
            }
        }
        let path_id = self
            .deps
            .paths
            .id_of(path)
            .ok_or_else(|| VoteError::InvalidPath { path: path.into() })?;

        tracing::debug!(key = %self.key, %submitter, %path, value = ?value, "vote");
        let old_value = overlay.value_at(path);

        // Persistence strictly precedes the in-memory update: a failed save
        // must leave the ledger exactly as it was.
        self.deps.gateway.save_vote(
            &self.key,
            path_id,
            submitter,
            value.as_deref(),
            strength,
            vote_type,
        )?;

        if !vote_type.is_import()
            && self.deps.flags.is_flagged(&self.key, path_id)?
            && self.deps.directory.is_admin(submitter)
        {
            self.deps.flags.clear(&self.key, path_id)?;
            tracing::debug!(key = %self.key, %path, "flag cleared by vote");
        }

        self.record_vote(
            path,
            submitter,
            value.as_deref(),
            strength,
            Timestamp::now(),
            vote_type,
        )?;

        if strength == Some(PERMANENT_STRENGTH) {
            self.apply_permanent_vote(path, path_id, value.as_deref())?;
        }

        let mut resolver = self.deps.resolvers.resolver_for(&self.key);
        self.refresh_path(&overlay, path, resolver.as_mut(), RefreshContext::SingleVote)?;

        let new_value = overlay.value_at(path);
        if new_value.is_some() && new_value != old_value {
            for listener in &self.deps.change_listeners {
                listener(&self.key, path);
            }
        }
        Ok(())
    }

    /// An override strength equal to the submitter's default level is not an
    /// override at all; anything else must be grantable by the directory,
    /// and the locking strength is reserved for the system submitter.
    fn check_strength(
        &self,
        submitter: SubmitterId,
        strength: Option<u32>,
    ) -> Result<Option<u32>, VoteError> {
        let Some(s) = strength else { return Ok(None) };
        if s == self.deps.directory.default_strength(submitter) {
            return Ok(None);
        }
        if s == LOCKING_STRENGTH || !self.deps.directory.can_vote_with_strength(submitter, s) {
            return Err(VoteError::StrengthNotAllowed {
                submitter,
                strength: s,
            });
        }
        Ok(Some(s))
    }

    /// A permanent vote locks the path to its value; a permanent abstention
    /// unlocks it and clears the permanent slate.
    fn apply_permanent_vote(
        &self,
        path: &str,
        path_id: PathId,
        value: Option<&str>,
    ) -> Result<(), VoteError> {
        match value {
            Some(v) => {
                self.deps.gateway.lock_path(&self.key, path_id, v)?;
                if let Some(ledger) = self.ledgers.get(path) {
                    ledger.set_vote(
                        SubmitterId::SYSTEM,
                        Some(v),
                        Some(LOCKING_STRENGTH),
                        Timestamp::now(),
                        VoteType::Direct,
                    );
                }
                tracing::info!(key = %self.key, %path, "path locked");
            }
            None => {
                self.deps.gateway.unlock_path(&self.key, path_id)?;
                if let Some(ledger) = self.ledgers.get(path) {
                    ledger.remove_matching_strength(LOCKING_STRENGTH);
                    ledger.remove_matching_strength(PERMANENT_STRENGTH);
                }
                tracing::info!(key = %self.key, %path, "path unlocked");
            }
        }
        self.stamp.next();
        Ok(())
    }

    /// Ledger write bottleneck shared by bulk load and live submission.
    fn record_vote(
        &self,
        path: &str,
        submitter: SubmitterId,
        value: Option<&str>,
        strength: Option<u32>,
        when: Timestamp,
        vote_type: VoteType,
    ) -> Result<(), VoteError> {
        self.check_accepted_path(path, submitter, value)?;
        self.ledgers
            .entry(path.to_string())
            .or_default()
            .set_vote(submitter, value, strength, when, vote_type);
        self.stamp.next();
        Ok(())
    }

    /// The path must be in the key's accepted set. As a special exception an
    /// admin may abstain on a path outside it, which adds the path.
    fn check_accepted_path(
        &self,
        path: &str,
        submitter: SubmitterId,
        value: Option<&str>,
    ) -> Result<(), VoteError> {
        {
            let accepted = match self.accepted_paths.read() {
                Ok(a) => a,
                Err(poisoned) => poisoned.into_inner(),
            };
            if accepted.contains(path) {
                return Ok(());
            }
        }
        if value.is_none() && self.deps.directory.is_admin(submitter) {
            let mut accepted = match self.accepted_paths.write() {
                Ok(a) => a,
                Err(poisoned) => poisoned.into_inner(),
            };
            accepted.insert(path.to_string());
            return Ok(());
        }
        Err(VoteError::InvalidPath { path: path.into() })
    }

    // ---- ledger read surface ----

    /// All candidate values known for a path: active votes, displaced
    /// values, and the baseline value.
    pub fn values_for(&self, path: &str) -> BTreeSet<String> {
        let mut values = self
            .ledgers
            .get(path)
            .map(|l| l.candidate_values())
            .unwrap_or_default();
        if let Some(baseline) = self.baseline.value_at(path) {
            values.insert(baseline);
        }
        values
    }

    pub fn voters_for(&self, path: &str, value: &str) -> BTreeSet<SubmitterId> {
        self.ledgers
            .get(path)
            .map(|l| l.voters_for(value))
            .unwrap_or_default()
    }

    pub fn vote_value(&self, submitter: SubmitterId, path: &str) -> Option<String> {
        self.ledgers.get(path).and_then(|l| l.vote_value(submitter))
    }

    pub fn did_vote(&self, submitter: SubmitterId, path: &str) -> bool {
        self.ledgers
            .get(path)
            .map(|l| l.did_vote(submitter))
            .unwrap_or(false)
    }

    pub fn vote_type_of(&self, submitter: SubmitterId, path: &str) -> Option<VoteType> {
        self.ledgers.get(path).and_then(|l| l.vote_type_of(submitter))
    }

    pub fn strengths_by_submitter(
        &self,
        path: &str,
    ) -> std::collections::BTreeMap<SubmitterId, u32> {
        self.ledgers
            .get(path)
            .map(|l| l.strengths_by_submitter())
            .unwrap_or_default()
    }

    pub fn last_modified(&self, path: &str) -> Option<Timestamp> {
        self.ledgers.get(path).and_then(|l| l.last_modified())
    }

    /// Paths with a ledger (possibly emptied by withdrawals).
    pub fn ledger_paths(&self) -> BTreeSet<String> {
        self.ledgers.iter().map(|e| e.key().clone()).collect()
    }
}
