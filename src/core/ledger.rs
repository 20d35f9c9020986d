//! Per-(key, path) vote ledger.
//!
//! One slot per submitter, last-write-wins. Concurrent submitters touch
//! disjoint slots, so the map needs no external lock; the owning state still
//! serializes the persist-then-update voting sequence.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use dashmap::DashMap;

use super::identity::SubmitterId;
use super::time::Timestamp;
use super::vote::{VoteRecord, VoteType};

/// All active votes for one path within one locale key, plus the set of
/// "other" known candidate values not currently backed by an active vote
/// (displaced and withdrawn vote values land here).
#[derive(Debug, Default)]
pub struct VoteLedger {
    records: DashMap<SubmitterId, VoteRecord>,
    other_values: RwLock<BTreeSet<String>>,
}

impl VoteLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert or withdraw the submitter's vote. `None` withdraws.
    ///
    /// The previous value, when different from the new one, stays known as
    /// an "other" candidate value.
    pub fn set_vote(
        &self,
        submitter: SubmitterId,
        value: Option<&str>,
        strength: Option<u32>,
        when: Timestamp,
        vote_type: VoteType,
    ) {
        match value {
            Some(v) => {
                let prior = self
                    .records
                    .insert(submitter, VoteRecord::new(v, strength, when, vote_type));
                if let Some(prior) = prior {
                    if prior.value != v {
                        self.remember_other(prior.value);
                    }
                }
            }
            None => {
                if let Some((_, prior)) = self.records.remove(&submitter) {
                    self.remember_other(prior.value);
                }
            }
        }
    }

    /// Bulk-remove every record carrying exactly this override strength.
    ///
    /// Used to retract administratively-placed votes (locking, permanent).
    pub fn remove_matching_strength(&self, strength: u32) {
        self.records.retain(|_, rec| rec.strength != Some(strength));
    }

    /// Submitters currently voting for exactly this value.
    pub fn voters_for(&self, value: &str) -> BTreeSet<SubmitterId> {
        self.records
            .iter()
            .filter(|entry| entry.value().value == value)
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn vote_value(&self, submitter: SubmitterId) -> Option<String> {
        self.records.get(&submitter).map(|rec| rec.value.clone())
    }

    pub fn did_vote(&self, submitter: SubmitterId) -> bool {
        self.records.contains_key(&submitter)
    }

    pub fn vote_type_of(&self, submitter: SubmitterId) -> Option<VoteType> {
        self.records.get(&submitter).map(|rec| rec.vote_type)
    }

    /// Override strengths per submitter, omitting default-strength votes.
    pub fn strengths_by_submitter(&self) -> BTreeMap<SubmitterId, u32> {
        self.records
            .iter()
            .filter_map(|entry| entry.value().strength.map(|s| (*entry.key(), s)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Max timestamp across active records; absent when the ledger is empty.
    pub fn last_modified(&self) -> Option<Timestamp> {
        self.records.iter().map(|entry| entry.value().when).max()
    }

    /// Snapshot of all active votes.
    pub fn votes(&self) -> Vec<(SubmitterId, VoteRecord)> {
        self.records
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    /// Active vote values plus the "other" known candidates.
    pub fn candidate_values(&self) -> BTreeSet<String> {
        let mut values: BTreeSet<String> = self
            .records
            .iter()
            .map(|entry| entry.value().value.clone())
            .collect();
        if let Ok(others) = self.other_values.read() {
            values.extend(others.iter().cloned());
        }
        values
    }

    pub fn remember_other(&self, value: String) {
        if let Ok(mut others) = self.other_values.write() {
            others.insert(value);
        }
    }
}
