//! Read-through overlay view: resolved vote entries over a frozen baseline.
//!
//! Reads consult the resolved entries first and pass through to the baseline
//! for paths without one. The public write surface always refuses; the only
//! sanctioned write path is the internal resolution refresh driven by the
//! owning per-key state.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use thiserror::Error;

use crate::core::{LocaleKey, Timestamp, VoteLedger};
use crate::dataset::{BaselineSource, ReadableDataset};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OverlayError {
    /// This view is read-only; mutation happens through vote submission.
    #[error("read-only dataset view")]
    ReadOnly,
}

/// One resolved overlay slot.
///
/// `Cleared` masks the baseline: the ledger resolved to no value, which is
/// not the same as having no entry (where the baseline passes through).
#[derive(Clone, Debug, PartialEq, Eq)]
enum OverlayEntry {
    Value { full_path: String, value: String },
    Cleared,
}

/// Resolved view over baseline + vote ledgers for one key.
pub struct OverlaySource {
    key: LocaleKey,
    baseline: Arc<dyn BaselineSource>,
    ledgers: Arc<DashMap<String, VoteLedger>>,
    entries: RwLock<BTreeMap<String, OverlayEntry>>,
}

impl OverlaySource {
    pub(crate) fn new(
        key: LocaleKey,
        baseline: Arc<dyn BaselineSource>,
        ledgers: Arc<DashMap<String, VoteLedger>>,
    ) -> Self {
        Self {
            key,
            baseline,
            ledgers,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn key(&self) -> &LocaleKey {
        &self.key
    }

    /// External mutation is never sanctioned; votes are the write path.
    pub fn put_value(&self, _path: &str, _value: &str) -> Result<(), OverlayError> {
        Err(OverlayError::ReadOnly)
    }

    pub fn remove_value(&self, _path: &str) -> Result<(), OverlayError> {
        Err(OverlayError::ReadOnly)
    }

    pub fn set_annotations(&self, _path: &str, _annotations: &str) -> Result<(), OverlayError> {
        Err(OverlayError::ReadOnly)
    }

    /// Install the outcome of a resolution refresh for one path.
    ///
    /// `Some((full_path, value))` stores the winner at its qualified path;
    /// `None` clears the slot, masking any baseline value.
    pub(crate) fn apply_resolved(&self, path: &str, resolved: Option<(String, String)>) {
        let mut entries = match self.entries.write() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        match resolved {
            Some((full_path, value)) => {
                entries.insert(path.to_string(), OverlayEntry::Value { full_path, value });
            }
            None => {
                entries.insert(path.to_string(), OverlayEntry::Cleared);
            }
        }
    }

    /// Drop the overlay slot entirely, restoring baseline pass-through.
    pub(crate) fn forget(&self, path: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(path);
        }
    }
}

impl ReadableDataset for OverlaySource {
    fn value_at(&self, path: &str) -> Option<String> {
        let entries = self.entries.read().ok()?;
        match entries.get(path) {
            Some(OverlayEntry::Value { value, .. }) => Some(value.clone()),
            Some(OverlayEntry::Cleared) => None,
            None => self.baseline.value_at(path),
        }
    }

    fn full_path_at(&self, path: &str) -> Option<String> {
        let entries = self.entries.read().ok()?;
        match entries.get(path) {
            Some(OverlayEntry::Value { full_path, .. }) => Some(full_path.clone()),
            Some(OverlayEntry::Cleared) => None,
            None => self.baseline.full_path_at(path),
        }
    }

    fn last_modified_at(&self, path: &str) -> Option<Timestamp> {
        self.ledgers.get(path).and_then(|l| l.last_modified())
    }

    fn paths(&self) -> Vec<String> {
        let mut set: BTreeSet<String> = self.baseline.paths().into_iter().collect();
        if let Ok(entries) = self.entries.read() {
            for (path, entry) in entries.iter() {
                match entry {
                    OverlayEntry::Value { .. } => {
                        set.insert(path.clone());
                    }
                    OverlayEntry::Cleared => {
                        set.remove(path);
                    }
                }
            }
        }
        set.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::SimpleDataset;

    fn overlay_over(baseline: SimpleDataset) -> OverlaySource {
        OverlaySource::new(
            LocaleKey::parse("xx").unwrap(),
            Arc::new(baseline),
            Arc::new(DashMap::new()),
        )
    }

    #[test]
    fn passes_through_baseline_when_no_entry() {
        let mut base = SimpleDataset::new();
        base.set_value("//a", "A");
        let ov = overlay_over(base);
        assert_eq!(ov.value_at("//a").as_deref(), Some("A"));
        assert_eq!(ov.full_path_at("//a").as_deref(), Some("//a"));
    }

    #[test]
    fn resolved_entry_shadows_baseline() {
        let mut base = SimpleDataset::new();
        base.set_value("//a", "A");
        let ov = overlay_over(base);
        ov.apply_resolved("//a", Some(("//a[@confidence=\"contributed\"]".into(), "B".into())));
        assert_eq!(ov.value_at("//a").as_deref(), Some("B"));
        assert_eq!(
            ov.full_path_at("//a").as_deref(),
            Some("//a[@confidence=\"contributed\"]")
        );
    }

    #[test]
    fn cleared_entry_masks_baseline() {
        let mut base = SimpleDataset::new();
        base.set_value("//a", "A");
        let ov = overlay_over(base);
        ov.apply_resolved("//a", None);
        assert_eq!(ov.value_at("//a"), None);
        assert!(!ov.paths().contains(&"//a".to_string()));
    }

    #[test]
    fn public_writes_refuse() {
        let ov = overlay_over(SimpleDataset::new());
        assert_eq!(ov.put_value("//a", "A"), Err(OverlayError::ReadOnly));
        assert_eq!(ov.remove_value("//a"), Err(OverlayError::ReadOnly));
        assert_eq!(ov.set_annotations("//a", "n"), Err(OverlayError::ReadOnly));
    }

    #[test]
    fn paths_unions_baseline_and_resolved() {
        let mut base = SimpleDataset::new();
        base.set_value("//a", "A");
        let ov = overlay_over(base);
        ov.apply_resolved("//b", Some(("//b".into(), "B".into())));
        let paths = ov.paths();
        assert!(paths.contains(&"//a".to_string()));
        assert!(paths.contains(&"//b".to_string()));
    }
}
