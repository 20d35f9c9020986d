#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ballotbox::dataset::DatasetError;
use ballotbox::{
    BallotFactory, BaselineProvider, BaselineSource, Config, LocaleKey, PathIndex,
    PersistenceGateway, ReadableDataset, ResolverFactory, SimpleDataset, SqliteGateway,
    SubmitterDirectory, SubmitterId,
};

use super::directory::{TestDirectory, TestPathIndex};
use super::resolver::TallyResolverFactory;

pub const KEY_XX: &str = "xx";
pub const PATH_LANG: &str = "//names/language[@type=\"ko\"]";
pub const PATH_REGION: &str = "//names/region[@type=\"KR\"]";

pub const U1: SubmitterId = SubmitterId::new(100);
pub const U2: SubmitterId = SubmitterId::new(200);
pub const U3: SubmitterId = SubmitterId::new(300);
pub const ADMIN: SubmitterId = SubmitterId::new(42);

pub fn key(s: &str) -> LocaleKey {
    LocaleKey::parse(s).expect("valid key fixture")
}

/// Baseline with "A" at [`PATH_LANG`] and "R" at [`PATH_REGION`].
pub fn basic_baseline() -> SimpleDataset {
    let mut ds = SimpleDataset::new();
    ds.set_value(PATH_LANG, "A");
    ds.set_value(PATH_REGION, "R");
    ds
}

pub struct MemoryBaselines {
    map: HashMap<LocaleKey, Arc<SimpleDataset>>,
}

impl BaselineProvider for MemoryBaselines {
    fn baseline_for(&self, key: &LocaleKey) -> Result<Arc<dyn BaselineSource>, DatasetError> {
        self.map
            .get(key)
            .cloned()
            .map(|ds| ds as Arc<dyn BaselineSource>)
            .ok_or_else(|| DatasetError::MissingBaseline(key.clone()))
    }
}

pub struct Harness {
    pub factory: BallotFactory,
    pub gateway: Arc<SqliteGateway>,
    pub directory: Arc<TestDirectory>,
    pub paths: Arc<TestPathIndex>,
}

pub struct HarnessBuilder {
    baselines: HashMap<LocaleKey, Arc<SimpleDataset>>,
    config: Config,
    gateway: Option<Arc<SqliteGateway>>,
    change_counter: Option<Arc<AtomicUsize>>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            baselines: HashMap::new(),
            config: Config::default(),
            gateway: None,
            change_counter: None,
        }
    }

    pub fn baseline(mut self, key_str: &str, dataset: SimpleDataset) -> Self {
        self.baselines.insert(key(key_str), Arc::new(dataset));
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Reuse an existing gateway (file-backed restarts share one database).
    pub fn gateway(mut self, gateway: Arc<SqliteGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Count resolved-value change notifications.
    pub fn change_counter(mut self, counter: Arc<AtomicUsize>) -> Self {
        self.change_counter = Some(counter);
        self
    }

    pub fn build(self) -> Harness {
        let directory = TestDirectory::new();
        directory.add_voter(U1);
        directory.add_voter(U2);
        directory.add_voter(U3);
        directory.add_admin(ADMIN);

        let paths = TestPathIndex::new();
        for dataset in self.baselines.values() {
            for path in dataset.paths() {
                paths.register(&path);
            }
        }

        let gateway = self
            .gateway
            .unwrap_or_else(|| Arc::new(SqliteGateway::open_in_memory().expect("scratch db")));
        let resolvers = TallyResolverFactory::new(directory.roster());
        let provider = MemoryBaselines {
            map: self.baselines,
        };

        let mut builder = BallotFactory::builder(
            gateway.clone() as Arc<dyn PersistenceGateway>,
            Arc::new(provider),
            directory.clone() as Arc<dyn SubmitterDirectory>,
            resolvers as Arc<dyn ResolverFactory>,
            paths.clone() as Arc<dyn PathIndex>,
        )
        .config(self.config);
        if let Some(counter) = self.change_counter {
            builder = builder.on_change(move |_key, _path| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        Harness {
            factory: builder.build(),
            gateway,
            directory,
            paths,
        }
    }
}

/// One key ("xx"), basic baseline, in-memory storage.
pub fn single_key_harness() -> (Harness, LocaleKey) {
    let harness = HarnessBuilder::new()
        .baseline(KEY_XX, basic_baseline())
        .build();
    (harness, key(KEY_XX))
}
