//! Time primitives.
//!
//! Wall-clock milliseconds only. Vote timestamps come from the submission
//! path or from persisted rows; ordering between them is advisory, not causal.

use serde::{Deserialize, Serialize};

/// Wall clock instant in milliseconds since the Unix epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self(ms)
    }

    pub const fn as_millis(self) -> u64 {
        self.0
    }
}
