//! Vote records and vote provenance.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::time::Timestamp;

/// How a vote entered the system.
///
/// Codes are persisted; do not renumber. Unrecognized codes decode to
/// `Unknown` rather than failing the row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteType {
    Direct,
    BulkUpload,
    AutoImport,
    ManualImport,
    Unknown,
}

impl VoteType {
    pub const fn code(self) -> i64 {
        match self {
            VoteType::Direct => 1,
            VoteType::BulkUpload => 2,
            VoteType::AutoImport => 3,
            VoteType::ManualImport => 4,
            VoteType::Unknown => 0,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            1 => VoteType::Direct,
            2 => VoteType::BulkUpload,
            3 => VoteType::AutoImport,
            4 => VoteType::ManualImport,
            _ => VoteType::Unknown,
        }
    }

    /// Imported votes do not trigger follow-on side effects (flag clearing,
    /// change listeners beyond the resolved value itself).
    pub fn is_import(self) -> bool {
        matches!(self, VoteType::AutoImport | VoteType::ManualImport)
    }
}

impl fmt::Display for VoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VoteType::Direct => "direct",
            VoteType::BulkUpload => "bulk_upload",
            VoteType::AutoImport => "auto_import",
            VoteType::ManualImport => "manual_import",
            VoteType::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One submitter's active vote on one (key, path).
///
/// Absence of a record is the abstention state; there is no "null vote"
/// record. `strength` is an override voting weight, `None` for the
/// submitter's default level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub value: String,
    pub strength: Option<u32>,
    pub when: Timestamp,
    pub vote_type: VoteType,
}

impl VoteRecord {
    pub fn new(
        value: impl Into<String>,
        strength: Option<u32>,
        when: Timestamp,
        vote_type: VoteType,
    ) -> Self {
        Self {
            value: value.into(),
            strength,
            when,
            vote_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vote_type_codes_roundtrip() {
        for vt in [
            VoteType::Direct,
            VoteType::BulkUpload,
            VoteType::AutoImport,
            VoteType::ManualImport,
            VoteType::Unknown,
        ] {
            assert_eq!(VoteType::from_code(vt.code()), vt);
        }
    }

    #[test]
    fn unrecognized_code_decodes_to_unknown() {
        assert_eq!(VoteType::from_code(99), VoteType::Unknown);
        assert_eq!(VoteType::from_code(-3), VoteType::Unknown);
    }
}
