//! Factory: the per-key state cache and the process-wide shared tables.
//!
//! Two structures cover the same keyspace: a bounded recency cache and a
//! weak back-reference registry used to re-adopt instances that fell out of
//! the bounded tier but are still alive. Get-or-create is serialized by a
//! single factory-wide lock so construction (which performs the full bulk
//! load) never runs twice for the same key; warm reads bypass that lock.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, Weak};

use moka::sync::Cache;

use crate::config::Config;
use crate::core::{LocaleKey, PathId, StampToken, SubmitterId, ValueLimits, VersionStamp, VoteType};
use crate::dataset::BaselineProvider;
use crate::directory::{PathVisibility, SubmitterDirectory, TrimNormalizer, ValueNormalizer};
use crate::overlay::OverlaySource;
use crate::resolver::ResolverFactory;
use crate::state::{PerKeyState, VoteError};
use crate::store::{PathIndex, PersistenceGateway, StoreError};

/// Collaborator handles shared by every per-key state.
pub struct Collaborators {
    pub gateway: Arc<dyn PersistenceGateway>,
    pub directory: Arc<dyn SubmitterDirectory>,
    pub visibility: Arc<dyn PathVisibility>,
    pub normalizer: Arc<dyn ValueNormalizer>,
    pub resolvers: Arc<dyn ResolverFactory>,
    pub paths: Arc<dyn PathIndex>,
    pub limits: ValueLimits,
    pub flags: Arc<FlagCache>,
    pub change_listeners: Vec<Box<dyn Fn(&LocaleKey, &str) + Send + Sync>>,
}

/// Process-wide flagged-path set, lazily loaded from the gateway on first
/// access and guarded by its own lock (not the factory lock).
pub struct FlagCache {
    gateway: Arc<dyn PersistenceGateway>,
    flags: Mutex<Option<HashSet<(LocaleKey, PathId)>>>,
}

impl FlagCache {
    fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self {
            gateway,
            flags: Mutex::new(None),
        }
    }

    fn with_loaded<T>(
        &self,
        f: impl FnOnce(&mut HashSet<(LocaleKey, PathId)>) -> T,
    ) -> Result<T, StoreError> {
        let mut guard = self.flags.lock().map_err(|_| StoreError::Poisoned)?;
        if guard.is_none() {
            let loaded: HashSet<_> = self.gateway.load_flags()?.into_iter().collect();
            tracing::debug!(count = loaded.len(), "loaded flagged paths");
            *guard = Some(loaded);
        }
        let set = guard.as_mut().expect("flag set initialized above");
        Ok(f(set))
    }

    pub fn is_flagged(&self, key: &LocaleKey, path: PathId) -> Result<bool, StoreError> {
        self.with_loaded(|set| set.contains(&(key.clone(), path)))
    }

    pub fn have_flags(&self) -> Result<bool, StoreError> {
        self.with_loaded(|set| !set.is_empty())
    }

    /// Returns false if the path was already flagged. The in-memory set is
    /// updated under its lock before the gateway write; a failed write rolls
    /// the set back.
    pub fn set(
        &self,
        key: &LocaleKey,
        path: PathId,
        submitter: SubmitterId,
    ) -> Result<bool, StoreError> {
        let inserted = self.with_loaded(|set| set.insert((key.clone(), path)))?;
        if !inserted {
            return Ok(false);
        }
        match self.gateway.set_flag(key, path, submitter) {
            Ok(_) => Ok(true),
            Err(e) => {
                let _ = self.with_loaded(|set| set.remove(&(key.clone(), path)));
                Err(e)
            }
        }
    }

    pub fn clear(&self, key: &LocaleKey, path: PathId) -> Result<(), StoreError> {
        self.with_loaded(|set| set.remove(&(key.clone(), path)))?;
        self.gateway.clear_flag(key, path)
    }
}

type ConstructionHook = Box<dyn Fn(&Arc<PerKeyState>) + Send + Sync>;

pub struct BallotFactoryBuilder {
    gateway: Arc<dyn PersistenceGateway>,
    baselines: Arc<dyn BaselineProvider>,
    directory: Arc<dyn SubmitterDirectory>,
    resolvers: Arc<dyn ResolverFactory>,
    paths: Arc<dyn PathIndex>,
    visibility: Arc<dyn PathVisibility>,
    normalizer: Arc<dyn ValueNormalizer>,
    config: Config,
    construction_hooks: Vec<ConstructionHook>,
    change_listeners: Vec<Box<dyn Fn(&LocaleKey, &str) + Send + Sync>>,
}

/// Every path visible to everyone; the default oracle.
struct AllVisible;

impl PathVisibility for AllVisible {
    fn visible_for_voting(&self, _path: &str, _submitter: SubmitterId) -> bool {
        true
    }
}

impl BallotFactoryBuilder {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        baselines: Arc<dyn BaselineProvider>,
        directory: Arc<dyn SubmitterDirectory>,
        resolvers: Arc<dyn ResolverFactory>,
        paths: Arc<dyn PathIndex>,
    ) -> Self {
        Self {
            gateway,
            baselines,
            directory,
            resolvers,
            paths,
            visibility: Arc::new(AllVisible),
            normalizer: Arc::new(TrimNormalizer),
            config: Config::default(),
            construction_hooks: Vec::new(),
            change_listeners: Vec::new(),
        }
    }

    pub fn visibility(mut self, visibility: Arc<dyn PathVisibility>) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn normalizer(mut self, normalizer: Arc<dyn ValueNormalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Run after a fresh construction (never on cache hits or re-adoption);
    /// used for warm-up work such as display-name caches.
    pub fn on_construction(
        mut self,
        hook: impl Fn(&Arc<PerKeyState>) + Send + Sync + 'static,
    ) -> Self {
        self.construction_hooks.push(Box::new(hook));
        self
    }

    /// Run when a vote changes a path's resolved value.
    pub fn on_change(mut self, hook: impl Fn(&LocaleKey, &str) + Send + Sync + 'static) -> Self {
        self.change_listeners.push(Box::new(hook));
        self
    }

    pub fn build(self) -> BallotFactory {
        let flags = Arc::new(FlagCache::new(self.gateway.clone()));
        let deps = Arc::new(Collaborators {
            gateway: self.gateway,
            directory: self.directory,
            visibility: self.visibility,
            normalizer: self.normalizer,
            resolvers: self.resolvers,
            paths: self.paths,
            limits: self.config.limits.clone(),
            flags,
            change_listeners: self.change_listeners,
        });
        BallotFactory {
            cache: Cache::new(self.config.cache_capacity),
            registry: Mutex::new(HashMap::new()),
            build_lock: Mutex::new(()),
            stamps: Mutex::new(HashMap::new()),
            read_only_keys: self.config.read_only_keys.clone(),
            baselines: self.baselines,
            hooks: self.construction_hooks,
            deps,
        }
    }
}

pub struct BallotFactory {
    cache: Cache<LocaleKey, Arc<PerKeyState>>,
    registry: Mutex<HashMap<LocaleKey, Weak<PerKeyState>>>,
    build_lock: Mutex<()>,
    stamps: Mutex<HashMap<LocaleKey, Arc<VersionStamp>>>,
    read_only_keys: BTreeSet<LocaleKey>,
    baselines: Arc<dyn BaselineProvider>,
    hooks: Vec<ConstructionHook>,
    deps: Arc<Collaborators>,
}

impl BallotFactory {
    pub fn builder(
        gateway: Arc<dyn PersistenceGateway>,
        baselines: Arc<dyn BaselineProvider>,
        directory: Arc<dyn SubmitterDirectory>,
        resolvers: Arc<dyn ResolverFactory>,
        paths: Arc<dyn PathIndex>,
    ) -> BallotFactoryBuilder {
        BallotFactoryBuilder::new(gateway, baselines, directory, resolvers, paths)
    }

    pub fn is_read_only_key(&self, key: &LocaleKey) -> bool {
        self.read_only_keys.contains(key)
    }

    /// Get-or-create the per-key state.
    ///
    /// Warm path: bounded cache, no factory lock. Cold path, under the
    /// factory lock: re-check the cache, try to re-adopt a still-alive
    /// instance from the weak registry, and only then construct. The bulk
    /// load runs inside the lock so it is paid once per key per generation.
    pub fn ballot(&self, key: &LocaleKey) -> Result<Arc<PerKeyState>, VoteError> {
        if let Some(state) = self.cache.get(key) {
            return Ok(state);
        }
        let _guard = match self.build_lock.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(state) = self.cache.get(key) {
            return Ok(state);
        }
        if let Some(state) = self.adopt_from_registry(key) {
            tracing::debug!(%key, "re-adopted evicted state");
            self.cache.insert(key.clone(), state.clone());
            return Ok(state);
        }

        let baseline = self.baselines.baseline_for(key)?;
        let state = Arc::new(PerKeyState::new(
            key.clone(),
            baseline,
            self.mint_stamp(key),
            self.is_read_only_key(key),
            self.deps.clone(),
        ));
        // Materialize now: construction owns the expensive bulk load.
        state.overlay()?;
        self.cache.insert(key.clone(), state.clone());
        self.lock_registry().insert(key.clone(), Arc::downgrade(&state));
        for hook in &self.hooks {
            hook(&state);
        }
        tracing::info!(%key, "constructed per-key state");
        Ok(state)
    }

    fn adopt_from_registry(&self, key: &LocaleKey) -> Option<Arc<PerKeyState>> {
        let mut registry = self.lock_registry();
        match registry.get(key).and_then(Weak::upgrade) {
            Some(state) => Some(state),
            None => {
                registry.remove(key);
                None
            }
        }
    }

    fn lock_registry(&self) -> std::sync::MutexGuard<'_, HashMap<LocaleKey, Weak<PerKeyState>>> {
        match self.registry.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// The key's stamp, minted on first touch. Stamps outlive eviction so a
    /// reconstructed key continues its sequence.
    pub fn mint_stamp(&self, key: &LocaleKey) -> Arc<VersionStamp> {
        let mut stamps = match self.stamps.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        stamps
            .entry(key.clone())
            .or_insert_with(|| Arc::new(VersionStamp::mint()))
            .clone()
    }

    /// Cached resolved view for a key, read-only.
    pub fn overlay(&self, key: &LocaleKey) -> Result<Arc<OverlaySource>, VoteError> {
        self.ballot(key)?.overlay()
    }

    pub fn submit_vote(
        &self,
        key: &LocaleKey,
        submitter: SubmitterId,
        path: &str,
        value: Option<&str>,
        strength: Option<u32>,
        vote_type: VoteType,
    ) -> Result<(), VoteError> {
        self.ballot(key)?
            .submit_vote(submitter, path, value, strength, vote_type)
    }

    /// Uncached wide-coverage snapshot for export; never enters the cache.
    pub fn build_export_snapshot(&self, key: &LocaleKey) -> Result<Arc<OverlaySource>, VoteError> {
        self.ballot(key)?.build_export_snapshot()
    }

    pub fn build_proposed_snapshot(
        &self,
        key: &LocaleKey,
    ) -> Result<crate::dataset::SimpleDataset, VoteError> {
        self.ballot(key)?.build_proposed_snapshot()
    }

    /// Opaque change token for dependent caches; loads the key if needed.
    pub fn version_stamp(&self, key: &LocaleKey) -> Result<StampToken, VoteError> {
        Ok(self.ballot(key)?.stamp_token())
    }

    pub fn is_flagged(&self, key: &LocaleKey, path: PathId) -> Result<bool, StoreError> {
        self.deps.flags.is_flagged(key, path)
    }

    pub fn set_flag(
        &self,
        key: &LocaleKey,
        path: PathId,
        submitter: SubmitterId,
    ) -> Result<bool, StoreError> {
        self.deps.flags.set(key, path, submitter)
    }

    pub fn clear_flag(&self, key: &LocaleKey, path: PathId) -> Result<(), StoreError> {
        self.deps.flags.clear(key, path)
    }

    pub fn have_flags(&self) -> Result<bool, StoreError> {
        self.deps.flags.have_flags()
    }

    /// Drop both cache tiers for a key. Required after a fatal
    /// `UnknownSubmitter`: the next access reconstructs from persistence.
    pub fn invalidate(&self, key: &LocaleKey) {
        self.cache.invalidate(key);
        self.lock_registry().remove(key);
    }

    /// Keys currently resident in the bounded tier (diagnostics).
    pub fn resident_keys(&self) -> Vec<LocaleKey> {
        self.cache.iter().map(|(k, _)| (*k).clone()).collect()
    }
}
