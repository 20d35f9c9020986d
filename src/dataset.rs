//! Dataset read surface shared by baselines and overlays.
//!
//! A dataset maps distinguishing paths to values. Stored full paths may carry
//! a confidence qualifier reflecting the resolution status of the value at
//! that path.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{LocaleKey, Timestamp};

/// Confidence of a resolved or baseline value.
///
/// Every status maps 1:1 to a path qualifier except `Approved` and `Missing`,
/// which both produce the bare path. There is no "missing" qualifier, so a
/// missing winner collapses into the top confidence form; see DESIGN.md for
/// why that collapse is kept as-is.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ValueStatus {
    #[default]
    Approved,
    Contributed,
    Provisional,
    Unconfirmed,
    Missing,
}

impl ValueStatus {
    /// Qualifier segment for stored full paths; `None` means bare path.
    pub fn qualifier(self) -> Option<&'static str> {
        match self {
            ValueStatus::Approved | ValueStatus::Missing => None,
            ValueStatus::Contributed => Some("contributed"),
            ValueStatus::Provisional => Some("provisional"),
            ValueStatus::Unconfirmed => Some("unconfirmed"),
        }
    }
}

/// Remove any confidence qualifier from a full path.
pub fn strip_confidence(path: &str) -> String {
    match path.find("[@confidence=\"") {
        None => path.to_string(),
        Some(start) => {
            let tail = &path[start..];
            match tail.find(']') {
                Some(end) => {
                    let mut out = String::with_capacity(path.len());
                    out.push_str(&path[..start]);
                    out.push_str(&tail[end + 1..]);
                    out
                }
                None => path.to_string(),
            }
        }
    }
}

/// Append the qualifier for `status` to `path` (after stripping any existing
/// one). `Approved` and `Missing` yield the bare path.
pub fn with_confidence(path: &str, status: ValueStatus) -> String {
    let base = strip_confidence(path);
    match status.qualifier() {
        None => base,
        Some(q) => format!("{base}[@confidence=\"{q}\"]"),
    }
}

/// Read API shared by baseline and overlay datasets.
pub trait ReadableDataset: Send + Sync {
    /// Resolved value at a distinguishing path.
    fn value_at(&self, path: &str) -> Option<String>;

    /// Stored full path (possibly confidence-qualified) for a path.
    fn full_path_at(&self, path: &str) -> Option<String>;

    /// When the value at this path last changed, if known.
    fn last_modified_at(&self, path: &str) -> Option<Timestamp>;

    /// Snapshot of all distinguishing paths with a value.
    fn paths(&self) -> Vec<String>;
}

/// A frozen baseline dataset: the read surface plus the resolver inputs.
pub trait BaselineSource: ReadableDataset {
    /// Confidence of the baseline value at this path.
    fn status_at(&self, path: &str) -> ValueStatus;

    /// Inherited/fallback value the resolver should consider.
    fn fallback_value_at(&self, path: &str) -> Option<String>;
}

/// Supplies the frozen baseline for each key.
pub trait BaselineProvider: Send + Sync {
    fn baseline_for(&self, key: &LocaleKey) -> Result<Arc<dyn BaselineSource>, DatasetError>;
}

#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum DatasetError {
    #[error("no baseline dataset for key `{0}`")]
    MissingBaseline(LocaleKey),
}

#[derive(Clone, Debug, Default)]
struct SimpleEntry {
    value: String,
    full_path: Option<String>,
    status: ValueStatus,
    fallback: Option<String>,
}

/// In-memory dataset. Serves as the test baseline and as the target for
/// export and proposed-value snapshots.
#[derive(Clone, Debug, Default)]
pub struct SimpleDataset {
    entries: BTreeMap<String, SimpleEntry>,
}

impl SimpleDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_value(&mut self, path: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let path = path.into();
        let entry = self.entries.entry(path).or_default();
        entry.value = value.into();
        self
    }

    /// Store a value at a (possibly qualified) full path; the distinguishing
    /// path is the full path with the qualifier stripped.
    pub fn set_value_at_full_path(
        &mut self,
        full_path: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        let full_path = full_path.into();
        let path = strip_confidence(&full_path);
        let entry = self.entries.entry(path).or_default();
        entry.value = value.into();
        entry.full_path = Some(full_path);
        self
    }

    pub fn set_status(&mut self, path: &str, status: ValueStatus) -> &mut Self {
        if let Some(entry) = self.entries.get_mut(path) {
            entry.status = status;
        }
        self
    }

    pub fn set_fallback(&mut self, path: &str, fallback: impl Into<String>) -> &mut Self {
        if let Some(entry) = self.entries.get_mut(path) {
            entry.fallback = Some(fallback.into());
        }
        self
    }

    pub fn remove(&mut self, path: &str) {
        self.entries.remove(path);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl ReadableDataset for SimpleDataset {
    fn value_at(&self, path: &str) -> Option<String> {
        self.entries.get(path).map(|e| e.value.clone())
    }

    fn full_path_at(&self, path: &str) -> Option<String> {
        self.entries
            .get(path)
            .map(|e| e.full_path.clone().unwrap_or_else(|| path.to_string()))
    }

    fn last_modified_at(&self, _path: &str) -> Option<Timestamp> {
        None
    }

    fn paths(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

impl BaselineSource for SimpleDataset {
    fn status_at(&self, path: &str) -> ValueStatus {
        self.entries
            .get(path)
            .map(|e| e.status)
            .unwrap_or(ValueStatus::Missing)
    }

    fn fallback_value_at(&self, path: &str) -> Option<String> {
        self.entries.get(path).and_then(|e| e.fallback.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualifier_roundtrip() {
        let p = "//names/language[@type=\"ko\"]";
        let q = with_confidence(p, ValueStatus::Provisional);
        assert_eq!(q, format!("{p}[@confidence=\"provisional\"]"));
        assert_eq!(strip_confidence(&q), p);
    }

    #[test]
    fn approved_and_missing_produce_bare_path() {
        let p = "//numbers/symbol";
        assert_eq!(with_confidence(p, ValueStatus::Approved), p);
        assert_eq!(with_confidence(p, ValueStatus::Missing), p);
    }

    #[test]
    fn requalifying_replaces_existing_qualifier() {
        let p = "//x[@confidence=\"unconfirmed\"]";
        assert_eq!(
            with_confidence(p, ValueStatus::Contributed),
            "//x[@confidence=\"contributed\"]"
        );
    }

    #[test]
    fn strip_keeps_trailing_attributes() {
        let p = "//x[@confidence=\"contributed\"][@numbers=\"std\"]";
        assert_eq!(strip_confidence(p), "//x[@numbers=\"std\"]");
    }

    #[test]
    fn simple_dataset_reads_back() {
        let mut ds = SimpleDataset::new();
        ds.set_value("//a", "A");
        ds.set_value_at_full_path("//b[@confidence=\"contributed\"]", "B");
        assert_eq!(ds.value_at("//a").as_deref(), Some("A"));
        assert_eq!(ds.full_path_at("//a").as_deref(), Some("//a"));
        assert_eq!(ds.value_at("//b").as_deref(), Some("B"));
        assert_eq!(
            ds.full_path_at("//b").as_deref(),
            Some("//b[@confidence=\"contributed\"]")
        );
        assert_eq!(ds.status_at("//missing"), ValueStatus::Missing);
    }
}
