//! Config loading and persistence.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{LocaleKey, ValueLimits};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database holding votes, history, flags, and locked paths.
    pub storage_path: PathBuf,
    /// Bounded tier size of the per-key state cache.
    pub cache_capacity: u64,
    pub limits: ValueLimits,
    /// Keys that refuse all vote submission.
    pub read_only_keys: BTreeSet<LocaleKey>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("ballotbox.db"),
            cache_capacity: 64,
            limits: ValueLimits::default(),
            read_only_keys: BTreeSet::new(),
        }
    }
}

pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_or_init(path: &Path) -> Config {
    if path.exists() {
        match load(path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                tracing::warn!("config load failed, using defaults: {e}");
                return Config::default();
            }
        }
    }

    let cfg = Config::default();
    if let Err(e) = write_config(path, &cfg) {
        tracing::warn!("failed to write default config: {e}");
    }
    cfg
}

pub fn write_config(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|source| ConfigError::Write {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let contents = toml::to_string_pretty(cfg)?;
    atomic_write(path, contents.as_bytes())
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<(), ConfigError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let temp = tempfile::NamedTempFile::new_in(dir).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(temp.path(), data).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    temp.persist(path).map_err(|e| ConfigError::Write {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ballotbox.toml");
        let mut cfg = Config::default();
        cfg.cache_capacity = 7;
        cfg.storage_path = PathBuf::from("/var/lib/ballotbox/votes.db");
        cfg.read_only_keys
            .insert(LocaleKey::parse("root").expect("valid key"));
        cfg.limits.oversize_prefix = Some("//chars/inventory".into());
        cfg.limits.oversize_families.insert("zh".into());

        write_config(&path, &cfg).expect("write config");
        let loaded = load(&path).expect("load config");
        assert_eq!(loaded.cache_capacity, 7);
        assert_eq!(loaded.storage_path, cfg.storage_path);
        assert!(loaded
            .read_only_keys
            .contains(&LocaleKey::parse("root").expect("valid key")));
        assert_eq!(
            loaded.limits.oversize_prefix.as_deref(),
            Some("//chars/inventory")
        );
    }

    #[test]
    fn load_or_init_writes_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ballotbox.toml");
        let cfg = load_or_init(&path);
        assert_eq!(cfg.cache_capacity, Config::default().cache_capacity);
        assert!(path.exists());
    }
}
