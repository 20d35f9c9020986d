//! SQLite persistence gateway.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};

use crate::core::{LocaleKey, PathId, SubmitterId, Timestamp, VoteType};

use super::{LockedRow, PersistenceGateway, StoreError, VoteRow};

const SCHEMA_VERSION: u32 = 1;
const BUSY_TIMEOUT_MS: u64 = 5_000;

/// Gateway over one SQLite database holding the vote, history, flag, and
/// locked-path tables. A single connection serialized behind a mutex;
/// persistence calls are blocking by contract.
pub struct SqliteGateway {
    conn: Mutex<Connection>,
}

impl SqliteGateway {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::setup(Connection::open(path)?)
    }

    /// Private scratch database, for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::setup(Connection::open_in_memory()?)
    }

    fn setup(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))?;
        let version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        match version {
            0 => {
                conn.execute_batch(
                    "BEGIN;
                     CREATE TABLE IF NOT EXISTS votes (
                         locale    TEXT    NOT NULL,
                         path      INTEGER NOT NULL,
                         submitter INTEGER NOT NULL,
                         value     TEXT,
                         strength  INTEGER,
                         vote_type INTEGER NOT NULL,
                         last_mod  INTEGER NOT NULL,
                         PRIMARY KEY (locale, submitter, path)
                     );
                     CREATE UNIQUE INDEX IF NOT EXISTS votes_by_path
                         ON votes (locale, path, submitter);
                     CREATE TABLE IF NOT EXISTS vote_history (
                         locale    TEXT    NOT NULL,
                         path      INTEGER NOT NULL,
                         submitter INTEGER NOT NULL,
                         value     TEXT    NOT NULL,
                         PRIMARY KEY (locale, path, submitter, value)
                     );
                     CREATE TABLE IF NOT EXISTS flagged_paths (
                         locale    TEXT    NOT NULL,
                         path      INTEGER NOT NULL,
                         submitter INTEGER NOT NULL,
                         last_mod  INTEGER NOT NULL,
                         PRIMARY KEY (locale, path)
                     );
                     CREATE TABLE IF NOT EXISTS locked_paths (
                         locale    TEXT    NOT NULL,
                         path      INTEGER NOT NULL,
                         value     TEXT    NOT NULL,
                         last_mod  INTEGER NOT NULL,
                         PRIMARY KEY (locale, path)
                     );
                     COMMIT;",
                )?;
                conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            }
            v if v == SCHEMA_VERSION => {}
            got => {
                return Err(StoreError::SchemaVersionMismatch {
                    expected: SCHEMA_VERSION,
                    got,
                })
            }
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn now_ms() -> i64 {
        Timestamp::now().as_millis() as i64
    }
}

impl PersistenceGateway for SqliteGateway {
    fn load_votes(&self, key: &LocaleKey) -> Result<Vec<VoteRow>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let mut stmt = conn.prepare_cached(
            "SELECT path, submitter, value, strength, last_mod, vote_type
             FROM votes WHERE locale = ?1",
        )?;
        let rows = stmt.query_map(params![key.as_str()], |row| {
            Ok(VoteRow {
                path: PathId::new(row.get(0)?),
                submitter: SubmitterId::new(row.get(1)?),
                value: row.get(2)?,
                strength: row.get(3)?,
                when: Timestamp(row.get::<_, u64>(4)?),
                vote_type: VoteType::from_code(row.get(5)?),
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn load_locked(&self, key: &LocaleKey) -> Result<Vec<LockedRow>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let mut stmt = conn.prepare_cached(
            "SELECT path, value, last_mod FROM locked_paths WHERE locale = ?1",
        )?;
        let rows = stmt.query_map(params![key.as_str()], |row| {
            Ok(LockedRow {
                path: PathId::new(row.get(0)?),
                value: row.get(1)?,
                when: Timestamp(row.get::<_, u64>(2)?),
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn save_vote(
        &self,
        key: &LocaleKey,
        path: PathId,
        submitter: SubmitterId,
        value: Option<&str>,
        strength: Option<u32>,
        vote_type: VoteType,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let tx = conn.transaction()?;
        // Write-before-overwrite: the prior non-null value goes to history
        // inside the same transaction as the upsert.
        tx.execute(
            "INSERT OR IGNORE INTO vote_history (locale, path, submitter, value)
             SELECT locale, path, submitter, value FROM votes
             WHERE locale = ?1 AND path = ?2 AND submitter = ?3 AND value IS NOT NULL",
            params![key.as_str(), path.get(), submitter.get()],
        )?;
        tx.execute(
            "INSERT INTO votes (locale, path, submitter, value, strength, vote_type, last_mod)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (locale, submitter, path) DO UPDATE SET
                 value = excluded.value,
                 strength = excluded.strength,
                 vote_type = excluded.vote_type,
                 last_mod = excluded.last_mod",
            params![
                key.as_str(),
                path.get(),
                submitter.get(),
                value,
                strength,
                vote_type.code(),
                Self::now_ms(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn vote_history(
        &self,
        key: &LocaleKey,
        path: PathId,
        submitter: SubmitterId,
    ) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let mut stmt = conn.prepare_cached(
            "SELECT value FROM vote_history
             WHERE locale = ?1 AND path = ?2 AND submitter = ?3 ORDER BY value",
        )?;
        let rows = stmt.query_map(
            params![key.as_str(), path.get(), submitter.get()],
            |row| row.get(0),
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn lock_path(&self, key: &LocaleKey, path: PathId, value: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute(
            "INSERT INTO locked_paths (locale, path, value, last_mod)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (locale, path) DO UPDATE SET
                 value = excluded.value,
                 last_mod = excluded.last_mod",
            params![key.as_str(), path.get(), value, Self::now_ms()],
        )?;
        Ok(())
    }

    fn unlock_path(&self, key: &LocaleKey, path: PathId) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute(
            "DELETE FROM locked_paths WHERE locale = ?1 AND path = ?2",
            params![key.as_str(), path.get()],
        )?;
        Ok(())
    }

    fn load_flags(&self) -> Result<Vec<(LocaleKey, PathId)>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let mut stmt = conn.prepare_cached("SELECT locale, path FROM flagged_paths")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, PathId::new(row.get(1)?)))
        })?;
        let mut flags = Vec::new();
        for row in rows {
            let (raw, path) = row?;
            match LocaleKey::parse(raw) {
                Ok(key) => flags.push((key, path)),
                Err(e) => tracing::warn!("skipping flag row with bad locale: {e}"),
            }
        }
        Ok(flags)
    }

    fn set_flag(
        &self,
        key: &LocaleKey,
        path: PathId,
        submitter: SubmitterId,
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO flagged_paths (locale, path, submitter, last_mod)
             VALUES (?1, ?2, ?3, ?4)",
            params![key.as_str(), path.get(), submitter.get(), Self::now_ms()],
        )?;
        Ok(changed > 0)
    }

    fn clear_flag(&self, key: &LocaleKey, path: PathId) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute(
            "DELETE FROM flagged_paths WHERE locale = ?1 AND path = ?2",
            params![key.as_str(), path.get()],
        )?;
        Ok(())
    }
}

impl SqliteGateway {
    /// Latest persisted vote row for one slot, if any. Test/diagnostic aid.
    pub fn vote_row(
        &self,
        key: &LocaleKey,
        path: PathId,
        submitter: SubmitterId,
    ) -> Result<Option<VoteRow>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let mut stmt = conn.prepare_cached(
            "SELECT path, submitter, value, strength, last_mod, vote_type
             FROM votes WHERE locale = ?1 AND path = ?2 AND submitter = ?3",
        )?;
        let row = stmt
            .query_row(params![key.as_str(), path.get(), submitter.get()], |row| {
                Ok(VoteRow {
                    path: PathId::new(row.get(0)?),
                    submitter: SubmitterId::new(row.get(1)?),
                    value: row.get(2)?,
                    strength: row.get(3)?,
                    when: Timestamp(row.get::<_, u64>(4)?),
                    vote_type: VoteType::from_code(row.get(5)?),
                })
            })
            .optional()?;
        Ok(row)
    }
}
