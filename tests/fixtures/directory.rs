#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use ballotbox::{
    LocaleKey, PathId, PathIndex, PathVisibility, SubmitterDirectory, SubmitterId,
};

#[derive(Clone, Copy, Debug)]
pub struct Member {
    pub admin: bool,
    pub default_strength: u32,
    pub max_strength: u32,
}

/// In-memory submitter directory. The resolver roster is shared with the
/// tally resolver; `refresh` promotes staged submitters into it, modelling a
/// registry re-read after an unknown-submitter failure.
pub struct TestDirectory {
    members: RwLock<HashMap<SubmitterId, Member>>,
    roster: Arc<RwLock<HashSet<SubmitterId>>>,
    staged: RwLock<HashSet<SubmitterId>>,
}

impl TestDirectory {
    pub fn new() -> Arc<Self> {
        let roster: Arc<RwLock<HashSet<SubmitterId>>> =
            Arc::new(RwLock::new([SubmitterId::SYSTEM].into_iter().collect()));
        Arc::new(Self {
            members: RwLock::new(HashMap::new()),
            roster,
            staged: RwLock::new(HashSet::new()),
        })
    }

    pub fn roster(&self) -> Arc<RwLock<HashSet<SubmitterId>>> {
        self.roster.clone()
    }

    pub fn add_member(&self, id: SubmitterId, member: Member) {
        self.members.write().unwrap().insert(id, member);
        self.roster.write().unwrap().insert(id);
    }

    pub fn add_voter(&self, id: SubmitterId) {
        self.add_member(
            id,
            Member {
                admin: false,
                default_strength: 1,
                max_strength: 1,
            },
        );
    }

    pub fn add_admin(&self, id: SubmitterId) {
        self.add_member(
            id,
            Member {
                admin: true,
                default_strength: 4,
                max_strength: ballotbox::PERMANENT_STRENGTH,
            },
        );
    }

    /// Member the directory knows but the resolver roster does not, until
    /// `refresh` runs.
    pub fn add_member_missing_from_roster(&self, id: SubmitterId, member: Member) {
        self.members.write().unwrap().insert(id, member);
        self.staged.write().unwrap().insert(id);
    }

    /// Member absent from the roster that `refresh` will never supply.
    pub fn add_member_permanently_unresolvable(&self, id: SubmitterId, member: Member) {
        self.members.write().unwrap().insert(id, member);
    }
}

impl SubmitterDirectory for TestDirectory {
    fn permitted_to_vote(&self, submitter: SubmitterId, _key: &LocaleKey) -> bool {
        submitter == SubmitterId::SYSTEM || self.members.read().unwrap().contains_key(&submitter)
    }

    fn can_modify(&self, submitter: SubmitterId, _key: &LocaleKey) -> Option<String> {
        if self.members.read().unwrap().contains_key(&submitter) {
            None
        } else {
            Some("not a directory member".to_string())
        }
    }

    fn default_strength(&self, submitter: SubmitterId) -> u32 {
        self.members
            .read()
            .unwrap()
            .get(&submitter)
            .map(|m| m.default_strength)
            .unwrap_or(1)
    }

    fn can_vote_with_strength(&self, submitter: SubmitterId, strength: u32) -> bool {
        self.members
            .read()
            .unwrap()
            .get(&submitter)
            .map(|m| strength <= m.max_strength)
            .unwrap_or(false)
    }

    fn is_admin(&self, submitter: SubmitterId) -> bool {
        self.members
            .read()
            .unwrap()
            .get(&submitter)
            .map(|m| m.admin)
            .unwrap_or(false)
    }

    fn refresh(&self) {
        let mut staged = self.staged.write().unwrap();
        let mut roster = self.roster.write().unwrap();
        for id in staged.drain() {
            roster.insert(id);
        }
    }
}

/// Bidirectional in-memory path interner.
pub struct TestPathIndex {
    by_path: RwLock<HashMap<String, PathId>>,
    by_id: RwLock<HashMap<PathId, String>>,
    next: AtomicU32,
}

impl TestPathIndex {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            by_path: RwLock::new(HashMap::new()),
            by_id: RwLock::new(HashMap::new()),
            next: AtomicU32::new(1),
        })
    }

    pub fn id_of_or_panic(&self, path: &str) -> PathId {
        self.by_path
            .read()
            .unwrap()
            .get(path)
            .copied()
            .expect("path registered in fixture index")
    }

    pub fn register(&self, path: &str) -> PathId {
        if let Some(id) = self.by_path.read().unwrap().get(path) {
            return *id;
        }
        let id = PathId::new(self.next.fetch_add(1, Ordering::SeqCst));
        self.by_path.write().unwrap().insert(path.to_string(), id);
        self.by_id.write().unwrap().insert(id, path.to_string());
        id
    }
}

impl PathIndex for TestPathIndex {
    fn id_of(&self, path: &str) -> Option<PathId> {
        self.by_path.read().unwrap().get(path).copied()
    }

    fn path_of(&self, id: PathId) -> Option<String> {
        self.by_id.read().unwrap().get(&id).cloned()
    }
}

/// Visibility oracle hiding an explicit set of paths from non-admins.
pub struct HiddenPaths {
    pub hidden: RwLock<HashSet<String>>,
    pub directory: Arc<TestDirectory>,
}

impl PathVisibility for HiddenPaths {
    fn visible_for_voting(&self, path: &str, submitter: SubmitterId) -> bool {
        !self.hidden.read().unwrap().contains(path) || self.directory.is_admin(submitter)
    }
}
