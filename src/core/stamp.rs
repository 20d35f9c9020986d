//! Per-key version stamps.
//!
//! Dependent caches hold a [`StampToken`] and compare it against the key's
//! current stamp to detect "something changed". Values are drawn from one
//! process-wide counter, so every minted value is globally unique and every
//! stamp is strictly increasing; values are never reused.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_STAMP: AtomicU64 = AtomicU64::new(1);

/// Opaque comparison token read off a [`VersionStamp`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StampToken(u64);

/// Monotonic per-key change counter.
#[derive(Debug)]
pub struct VersionStamp {
    current: AtomicU64,
}

impl VersionStamp {
    pub fn mint() -> Self {
        let stamp = Self {
            current: AtomicU64::new(0),
        };
        stamp.next();
        stamp
    }

    /// Advance to a fresh, globally unique value.
    pub fn next(&self) -> StampToken {
        let value = NEXT_STAMP.fetch_add(1, Ordering::Relaxed);
        self.current.store(value, Ordering::Release);
        StampToken(value)
    }

    pub fn current(&self) -> StampToken {
        StampToken(self.current.load(Ordering::Acquire))
    }
}

impl fmt::Display for StampToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
