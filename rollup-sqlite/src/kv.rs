// Sensor Rollup SQLite - Durable state and history
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Changelog-backed state store
//!
//! Every `put` appends a row to the `state_changelog` table and updates an
//! in-memory view. `commit` records the last durable offset. Opening the
//! database discards rows past that offset and replays the rest to rebuild
//! the view, which is the same recovery a restarted worker performs.

use std::collections::HashMap;
use std::path::Path;

use rollup::KeyValueStore;
use rusqlite::{params, Connection};

use crate::error::Result;

/// SQLite implementation of [`KeyValueStore`]
#[derive(Debug)]
pub struct SqliteKeyValueStore {
    conn: Connection,
    view: HashMap<String, Vec<u8>>,
    committed: i64,
}

impl SqliteKeyValueStore {
    /// Open (or create) a store at `path` and replay its committed changelog
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn)
    }

    /// Open a throwaway in-memory store
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS state_changelog (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT NOT NULL,
                value BLOB NOT NULL
            );
            CREATE TABLE IF NOT EXISTS state_commit (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                committed INTEGER NOT NULL
            );
            INSERT OR IGNORE INTO state_commit (id, committed) VALUES (1, 0);",
        )?;

        let mut store = Self {
            conn,
            view: HashMap::new(),
            committed: 0,
        };
        store.replay()?;
        Ok(store)
    }

    fn replay(&mut self) -> Result<()> {
        self.committed = self
            .conn
            .query_row("SELECT committed FROM state_commit WHERE id = 1", [], |row| {
                row.get(0)
            })?;

        let discarded = self.conn.execute(
            "DELETE FROM state_changelog WHERE seq > ?1",
            params![self.committed],
        )?;
        if discarded > 0 {
            log::warn!("Discarded {} uncommitted changelog entries", discarded);
        }

        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM state_changelog ORDER BY seq ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;

        let mut view = HashMap::new();
        let mut applied = 0usize;
        for row in rows {
            let (key, value) = row?;
            if value.is_empty() {
                view.remove(&key);
            } else {
                view.insert(key, value);
            }
            applied += 1;
        }
        drop(stmt);

        log::info!(
            "Replayed {} changelog entries into {} keys (committed offset {})",
            applied,
            view.len(),
            self.committed
        );
        self.view = view;
        Ok(())
    }

    /// Mark every write so far as durable, returning the committed offset
    pub fn commit(&mut self) -> Result<i64> {
        let last: Option<i64> =
            self.conn
                .query_row("SELECT MAX(seq) FROM state_changelog", [], |row| row.get(0))?;
        self.committed = last.unwrap_or(0);
        self.conn.execute(
            "UPDATE state_commit SET committed = ?1 WHERE id = 1",
            params![self.committed],
        )?;
        Ok(self.committed)
    }

    /// Last committed changelog offset
    pub fn committed_offset(&self) -> i64 {
        self.committed
    }

    /// Drop superseded committed entries, keeping the latest write per key
    ///
    /// Keys whose latest committed write is a tombstone are removed
    /// entirely.
    pub fn compact(&mut self) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let superseded = tx.execute(
            "DELETE FROM state_changelog
             WHERE seq <= ?1
               AND seq NOT IN (
                   SELECT MAX(seq) FROM state_changelog
                   WHERE seq <= ?1 GROUP BY key
               )",
            params![self.committed],
        )?;
        let tombstones = tx.execute(
            "DELETE FROM state_changelog WHERE seq <= ?1 AND length(value) = 0",
            params![self.committed],
        )?;
        tx.commit()?;

        let removed = superseded + tombstones;
        log::info!("Compacted {} changelog entries", removed);
        Ok(removed)
    }

    /// Number of rows in the changelog table
    pub fn changelog_len(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM state_changelog", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.view.len()
    }

    /// Check if no live key exists
    pub fn is_empty(&self) -> bool {
        self.view.is_empty()
    }

    fn append(&mut self, key: &str, value: &[u8]) -> Result<()> {
        self.conn.execute(
            "INSERT INTO state_changelog (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

impl KeyValueStore for SqliteKeyValueStore {
    fn get(&self, key: &str) -> rollup::Result<Option<Vec<u8>>> {
        Ok(self.view.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: Vec<u8>) -> rollup::Result<()> {
        self.append(key, &value)?;
        if value.is_empty() {
            self.view.remove(key);
        } else {
            self.view.insert(key.to_string(), value);
        }
        Ok(())
    }
}
