//! Durable cache backend
//!
//! A single SQLite file with two tables: `memory` for TTL entries and
//! `analysis_history` for one row per completed analysis. Timestamps are unix
//! milliseconds.

use super::{system_clock, AnalysisHistory, CacheStats, CacheStore, Clock, HistoryEntry, HistoryRecord};
use crate::errors::StoreError;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS memory (
    key        TEXT PRIMARY KEY,
    value      TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    expires_at INTEGER
);

CREATE TABLE IF NOT EXISTS analysis_history (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_url     TEXT NOT NULL,
    branch       TEXT NOT NULL,
    analyzed_at  INTEGER NOT NULL,
    total_issues INTEGER NOT NULL,
    critical     INTEGER NOT NULL,
    high         INTEGER NOT NULL,
    summary      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_analysis_history_repo
    ON analysis_history (repo_url, analyzed_at);
"#;

pub struct SqliteStore {
    conn: Connection,
    hits: u64,
    misses: u64,
    clock: Clock,
}

impl SqliteStore {
    /// Open (or create) the database file and apply the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        let store = Self::from_connection(conn, system_clock())?;
        tracing::debug!(path = %path.display(), "sqlite cache initialized");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?, system_clock())
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn from_connection(conn: Connection, clock: Clock) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn,
            hits: 0,
            misses: 0,
            clock,
        })
    }

    fn now_millis(&self) -> i64 {
        (self.clock)().timestamp_millis()
    }
}

impl CacheStore for SqliteStore {
    fn get(&mut self, key: &str) -> Result<Option<Value>, StoreError> {
        let row: Option<(String, Option<i64>)> = self
            .conn
            .query_row(
                "SELECT value, expires_at FROM memory WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((raw, expires_at)) = row else {
            self.misses += 1;
            return Ok(None);
        };

        if expires_at.is_some_and(|expires_at| self.now_millis() > expires_at) {
            self.conn
                .execute("DELETE FROM memory WHERE key = ?1", params![key])?;
            self.misses += 1;
            return Ok(None);
        }

        self.hits += 1;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn set(&mut self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), StoreError> {
        let created_at = self.now_millis();
        let expires_at = ttl.map(|ttl| created_at + ttl.num_milliseconds());
        let raw = serde_json::to_string(&value)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO memory (key, value, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![key, raw, created_at, expires_at],
        )?;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<bool, StoreError> {
        let removed = self
            .conn
            .execute("DELETE FROM memory WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.conn.execute("DELETE FROM memory", [])?;
        Ok(())
    }

    fn stats(&self) -> Result<CacheStats, StoreError> {
        let total: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM memory", [], |row| row.get(0))?;
        Ok(CacheStats::new(total.max(0) as usize, self.hits, self.misses))
    }

    fn history(&mut self) -> Option<&mut dyn AnalysisHistory> {
        Some(self)
    }
}

impl AnalysisHistory for SqliteStore {
    fn record(&mut self, record: &HistoryRecord) -> Result<i64, StoreError> {
        let summary = serde_json::to_string(&record.summary)?;
        self.conn.execute(
            "INSERT INTO analysis_history \
             (repo_url, branch, analyzed_at, total_issues, critical, high, summary) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.repo_url,
                record.branch,
                self.now_millis(),
                record.total_issues as i64,
                record.critical as i64,
                record.high as i64,
                summary,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn recent(&self, repo_url: &str, limit: usize) -> Result<Vec<HistoryEntry>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, repo_url, branch, analyzed_at, total_issues, critical, high, summary \
             FROM analysis_history WHERE repo_url = ?1 \
             ORDER BY analyzed_at DESC, id DESC LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![repo_url, limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, repo_url, branch, analyzed_at, total, critical, high, summary) = row?;
            entries.push(HistoryEntry {
                id,
                repo_url,
                branch,
                analyzed_at: DateTime::<Utc>::from_timestamp_millis(analyzed_at).unwrap_or_default(),
                total_issues: total.max(0) as usize,
                critical: critical.max(0) as usize,
                high: high.max(0) as usize,
                summary: serde_json::from_str(&summary)?,
            });
        }
        Ok(entries)
    }
}
