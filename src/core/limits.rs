//! Per-key value size limits.
//!
//! Every value has a default length ceiling. Keys belonging to configured
//! "oversize" families get a larger ceiling for one path prefix (large
//! character-set inventories need it; everything else does not).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::identity::LocaleKey;

/// Default max length accepted for any value.
pub const MAX_VALUE_LEN: usize = 4096;

/// Max length for the oversize path prefix in oversize-family keys.
pub const OVERSIZE_VALUE_LEN: usize = 8192;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueLimits {
    pub default_max: usize,
    /// Path prefix granted the larger ceiling.
    pub oversize_prefix: Option<String>,
    pub oversize_max: usize,
    /// Key families (matched on the first `_`-separated segment) whose
    /// members get the oversize ceiling for `oversize_prefix`.
    pub oversize_families: BTreeSet<String>,
}

impl Default for ValueLimits {
    fn default() -> Self {
        Self {
            default_max: MAX_VALUE_LEN,
            oversize_prefix: None,
            oversize_max: OVERSIZE_VALUE_LEN,
            oversize_families: BTreeSet::new(),
        }
    }
}

impl ValueLimits {
    /// Expected ceiling for a value at `path` within `key`.
    pub fn max_len(&self, key: &LocaleKey, path: &str) -> usize {
        if let Some(prefix) = &self.oversize_prefix {
            if path.starts_with(prefix.as_str()) && self.in_oversize_family(key) {
                return self.oversize_max;
            }
        }
        self.default_max
    }

    fn in_oversize_family(&self, key: &LocaleKey) -> bool {
        let family = key.as_str().split('_').next().unwrap_or_default();
        self.oversize_families.contains(family)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> ValueLimits {
        ValueLimits {
            oversize_prefix: Some("//chars/inventory".into()),
            oversize_families: ["zh".to_string(), "ja".to_string()].into(),
            ..ValueLimits::default()
        }
    }

    #[test]
    fn default_ceiling_applies_everywhere_else() {
        let l = limits();
        let key = LocaleKey::parse("de").unwrap();
        assert_eq!(l.max_len(&key, "//chars/inventory"), MAX_VALUE_LEN);
        let zh = LocaleKey::parse("zh_Hant").unwrap();
        assert_eq!(l.max_len(&zh, "//names/language"), MAX_VALUE_LEN);
    }

    #[test]
    fn oversize_family_gets_larger_ceiling_on_prefix() {
        let l = limits();
        for k in ["zh", "zh_Hant", "ja"] {
            let key = LocaleKey::parse(k).unwrap();
            assert_eq!(l.max_len(&key, "//chars/inventory/std"), OVERSIZE_VALUE_LEN);
        }
    }
}
