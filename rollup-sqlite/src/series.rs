// Sensor Rollup SQLite - Durable state and history
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Time-series tables
//!
//! One table per record kind, keyed by `(identifier, timestamp)` with a
//! descending timestamp index. Writes upsert, so a record re-emitted at the
//! same timestamp replaces the earlier one.

use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rollup::{AggregatedRecord, HistoryRecord, Measurement, RecordSink, Timestamp, TimeSeriesStore};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};

use crate::error::{Result, SqliteStoreError};

/// A record kind that maps onto one SQLite table
pub trait SeriesRow: HistoryRecord + Sized {
    /// Table name
    const TABLE: &'static str;

    /// Column list shared by inserts and selects
    const COLUMNS: &'static str;

    /// Column definitions after `identifier` and `timestamp`
    const VALUE_COLUMNS_DDL: &'static str;

    /// Upsert this record
    fn insert(&self, conn: &Connection) -> rusqlite::Result<usize>;

    /// Rebuild a record from a row selected with [`SeriesRow::COLUMNS`]
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

impl SeriesRow for Measurement {
    const TABLE: &'static str = "active_power";
    const COLUMNS: &'static str = "identifier, timestamp, value";
    const VALUE_COLUMNS_DDL: &'static str = "value REAL NOT NULL";

    fn insert(&self, conn: &Connection) -> rusqlite::Result<usize> {
        conn.execute(
            "INSERT OR REPLACE INTO active_power (identifier, timestamp, value)
             VALUES (?1, ?2, ?3)",
            params![self.identifier, self.timestamp, self.value],
        )
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Measurement {
            identifier: row.get(0)?,
            timestamp: row.get(1)?,
            value: row.get(2)?,
        })
    }
}

impl SeriesRow for AggregatedRecord {
    const TABLE: &'static str = "aggregated_active_power";
    const COLUMNS: &'static str = "identifier, timestamp, min, max, count, sum, average";
    const VALUE_COLUMNS_DDL: &'static str = "min REAL NOT NULL,
                max REAL NOT NULL,
                count INTEGER NOT NULL,
                sum REAL NOT NULL,
                average REAL";

    fn insert(&self, conn: &Connection) -> rusqlite::Result<usize> {
        let count = i64::try_from(self.count)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        conn.execute(
            "INSERT OR REPLACE INTO aggregated_active_power
                 (identifier, timestamp, min, max, count, sum, average)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                self.identifier,
                self.timestamp,
                self.min,
                self.max,
                count,
                self.sum,
                self.average,
            ],
        )
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let count = u64::try_from(row.get::<_, i64>(4)?)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Integer, Box::new(e)))?;
        Ok(AggregatedRecord {
            identifier: row.get(0)?,
            timestamp: row.get(1)?,
            min: row.get(2)?,
            max: row.get(3)?,
            count,
            sum: row.get(5)?,
            average: row.get(6)?,
        })
    }
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// SQLite-backed [`TimeSeriesStore`]
///
/// The connection sits behind a mutex so a repository over this store can be
/// shared between reader threads.
#[derive(Debug)]
pub struct SqliteTimeSeries<R> {
    conn: Mutex<Connection>,
    _row: PhantomData<fn() -> R>,
}

impl<R: SeriesRow> SqliteTimeSeries<R> {
    /// Open (or create) the table for `R` in the database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn)
    }

    /// Open the table in a throwaway in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                identifier TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                {values},
                PRIMARY KEY (identifier, timestamp)
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_latest
                ON {table} (identifier, timestamp DESC);",
            table = R::TABLE,
            values = R::VALUE_COLUMNS_DDL,
        ))?;
        log::info!("Time-series table '{}' ready", R::TABLE);

        Ok(Self {
            conn: Mutex::new(conn),
            _row: PhantomData,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| SqliteStoreError::LockPoisoned)
    }

    fn query(&self, sql: &str, identifier: &str, bound: i64) -> Result<Vec<R>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![identifier, bound], R::from_row)?;
        let records = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn query_limited(&self, sql: &str, identifier: &str, after: Timestamp, limit: usize) -> Result<Vec<R>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![identifier, after, sql_limit(limit)], R::from_row)?;
        let records = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Total rows in the table
    pub fn len(&self) -> Result<usize> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", R::TABLE), [], |row| {
            row.get(0)
        })?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    /// Check if the table has no rows
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl<R: SeriesRow> TimeSeriesStore<R> for SqliteTimeSeries<R> {
    fn append(&mut self, record: R) -> rollup::Result<()> {
        let conn = self.lock()?;
        record.insert(&conn).map_err(SqliteStoreError::from)?;
        Ok(())
    }

    fn range_after(&self, identifier: &str, after: Timestamp) -> rollup::Result<Vec<R>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE identifier = ?1 AND timestamp > ?2 ORDER BY timestamp ASC",
            R::COLUMNS,
            R::TABLE
        );
        Ok(self.query(&sql, identifier, after)?)
    }

    fn latest(&self, identifier: &str, count: usize) -> rollup::Result<Vec<R>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE identifier = ?1 ORDER BY timestamp DESC LIMIT ?2",
            R::COLUMNS,
            R::TABLE
        );
        Ok(self.query(&sql, identifier, sql_limit(count))?)
    }

    fn earliest_after(
        &self,
        identifier: &str,
        after: Timestamp,
        limit: usize,
    ) -> rollup::Result<Vec<R>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE identifier = ?1 AND timestamp > ?2
             ORDER BY timestamp ASC LIMIT ?3",
            R::COLUMNS,
            R::TABLE
        );
        Ok(self.query_limited(&sql, identifier, after, limit)?)
    }
}

impl RecordSink for SqliteTimeSeries<AggregatedRecord> {
    fn emit(&mut self, record: AggregatedRecord) -> rollup::Result<()> {
        self.append(record)
    }
}
