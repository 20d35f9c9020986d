#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock};

use ballotbox::{
    LocaleKey, Resolver, ResolverError, ResolverFactory, SubmitterId, Timestamp, ValueStatus,
};

/// Weight-tally resolver: each vote adds its strength (default 1) to its
/// value; the baseline value enters as a zero-weight candidate. Highest
/// total wins, ties break to the lexicographically smallest value, so the
/// outcome is independent of feed order.
pub struct TallyResolver {
    roster: Arc<RwLock<HashSet<SubmitterId>>>,
    baseline: Option<String>,
    baseline_status: ValueStatus,
    fallback: Option<String>,
    tallies: BTreeMap<String, u64>,
}

impl TallyResolver {
    fn new(roster: Arc<RwLock<HashSet<SubmitterId>>>) -> Self {
        Self {
            roster,
            baseline: None,
            baseline_status: ValueStatus::Missing,
            fallback: None,
            tallies: BTreeMap::new(),
        }
    }

    fn winner(&self) -> Option<(&String, u64)> {
        self.tallies
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(v, w)| (v, *w))
    }
}

impl Resolver for TallyResolver {
    fn reset(&mut self) {
        self.baseline = None;
        self.baseline_status = ValueStatus::Missing;
        self.fallback = None;
        self.tallies.clear();
    }

    fn set_baseline(&mut self, value: Option<&str>, status: ValueStatus) {
        self.baseline = value.map(str::to_string);
        self.baseline_status = status;
    }

    fn set_fallback(&mut self, value: Option<&str>) {
        self.fallback = value.map(str::to_string);
    }

    fn add(
        &mut self,
        value: Option<&str>,
        submitter: Option<SubmitterId>,
        strength: Option<u32>,
        _when: Option<Timestamp>,
    ) -> Result<(), ResolverError> {
        if let Some(id) = submitter {
            if !self.roster.read().unwrap().contains(&id) {
                return Err(ResolverError::UnknownSubmitter(id));
            }
        }
        let Some(value) = value else { return Ok(()) };
        let weight = match submitter {
            Some(_) => u64::from(strength.unwrap_or(1)),
            None => 0,
        };
        *self.tallies.entry(value.to_string()).or_insert(0) += weight;
        Ok(())
    }

    fn winning_value(&self) -> Option<String> {
        self.winner().map(|(v, _)| v.clone())
    }

    fn winning_status(&self) -> ValueStatus {
        match self.winner() {
            None => ValueStatus::Missing,
            Some((value, 0)) => {
                if Some(value) == self.baseline.as_ref() {
                    self.baseline_status
                } else {
                    ValueStatus::Unconfirmed
                }
            }
            Some((_, w)) if w >= 8 => ValueStatus::Approved,
            Some((_, w)) if w >= 4 => ValueStatus::Contributed,
            Some((_, w)) if w >= 2 => ValueStatus::Provisional,
            Some(_) => ValueStatus::Unconfirmed,
        }
    }
}

pub struct TallyResolverFactory {
    roster: Arc<RwLock<HashSet<SubmitterId>>>,
}

impl TallyResolverFactory {
    pub fn new(roster: Arc<RwLock<HashSet<SubmitterId>>>) -> Arc<Self> {
        Arc::new(Self { roster })
    }
}

impl ResolverFactory for TallyResolverFactory {
    fn resolver_for(&self, _key: &LocaleKey) -> Box<dyn Resolver> {
        Box::new(TallyResolver::new(self.roster.clone()))
    }
}
