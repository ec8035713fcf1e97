//! Key-value cache with per-entry TTL
//!
//! Two backends share the [`CacheStore`] contract: [`MemoryStore`] lives for
//! the process, [`SqliteStore`] survives restarts and also records analysis
//! history. The backend is chosen once from configuration via [`open_store`].
//!
//! # Error Handling
//!
//! Cache operations are best-effort from the pipeline's point of view: a
//! failing `get` is treated as a miss and a failing `set` is logged and
//! ignored. Expired entries are only evicted when they are read.

mod sqlite;

pub use sqlite::SqliteStore;

use crate::errors::StoreError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

/// Source of "now" for expiry checks. Swappable in tests.
pub type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

fn system_clock() -> Clock {
    Box::new(Utc::now)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Memory,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Sqlite => "sqlite",
            StoreBackend::Memory => "memory",
        }
    }
}

/// Hit/miss counters for one store instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_keys: usize,
    pub hits: u64,
    pub misses: u64,
    /// Percentage with one decimal, 0.0 before the first lookup
    pub hit_rate: f64,
}

impl CacheStats {
    pub fn new(total_keys: usize, hits: u64, misses: u64) -> Self {
        let lookups = hits + misses;
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            (hits as f64 / lookups as f64 * 1000.0).round_ties_even() / 10.0
        };
        Self {
            total_keys,
            hits,
            misses,
            hit_rate,
        }
    }
}

/// Contract shared by every cache backend.
pub trait CacheStore: Send {
    /// Look up a live entry. Expired entries are evicted and count as a miss.
    fn get(&mut self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Insert or replace. `ttl = None` never expires.
    fn set(&mut self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Returns whether an entry was removed.
    fn delete(&mut self, key: &str) -> Result<bool, StoreError>;

    fn clear(&mut self) -> Result<(), StoreError>;

    fn stats(&self) -> Result<CacheStats, StoreError>;

    /// Analysis history, for backends that keep one.
    fn history(&mut self) -> Option<&mut dyn AnalysisHistory> {
        None
    }
}

/// One analysis run to append to the history table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub repo_url: String,
    pub branch: String,
    pub total_issues: usize,
    pub critical: usize,
    pub high: usize,
    pub summary: Value,
}

/// A stored history row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub repo_url: String,
    pub branch: String,
    pub analyzed_at: DateTime<Utc>,
    pub total_issues: usize,
    pub critical: usize,
    pub high: usize,
    pub summary: Value,
}

/// Append-only log of past analyses.
pub trait AnalysisHistory {
    fn record(&mut self, record: &HistoryRecord) -> Result<i64, StoreError>;

    /// Most recent first.
    fn recent(&self, repo_url: &str, limit: usize) -> Result<Vec<HistoryEntry>, StoreError>;
}

/// Open the configured backend. `db_path` is ignored for the memory store.
pub fn open_store(backend: StoreBackend, db_path: &Path) -> Result<Box<dyn CacheStore>, StoreError> {
    match backend {
        StoreBackend::Memory => Ok(Box::new(MemoryStore::new())),
        StoreBackend::Sqlite => Ok(Box::new(SqliteStore::open(db_path)?)),
    }
}

struct MemoryEntry {
    value: Value,
    created_at: DateTime<Utc>,
    ttl: Option<Duration>,
}

impl MemoryEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.ttl
            .is_some_and(|ttl| now.signed_duration_since(self.created_at) > ttl)
    }
}

/// Volatile in-process store
pub struct MemoryStore {
    entries: HashMap<String, MemoryEntry>,
    hits: u64,
    misses: u64,
    clock: Clock,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self {
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
            clock,
        }
    }
}

impl CacheStore for MemoryStore {
    fn get(&mut self, key: &str) -> Result<Option<Value>, StoreError> {
        let now = (self.clock)();
        let expired = match self.entries.get(key) {
            None => {
                self.misses += 1;
                return Ok(None);
            }
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            self.entries.remove(key);
            self.misses += 1;
            return Ok(None);
        }

        self.hits += 1;
        Ok(self.entries.get(key).map(|entry| entry.value.clone()))
    }

    fn set(&mut self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), StoreError> {
        let created_at = (self.clock)();
        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                value,
                created_at,
                ttl,
            },
        );
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.remove(key).is_some())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.entries.clear();
        Ok(())
    }

    fn stats(&self) -> Result<CacheStats, StoreError> {
        Ok(CacheStats::new(self.entries.len(), self.hits, self.misses))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    /// A clock the test can move forward.
    pub(crate) fn manual_clock() -> (Clock, Arc<Mutex<DateTime<Utc>>>) {
        let now = Arc::new(Mutex::new(Utc::now()));
        let handle = Arc::clone(&now);
        let clock: Clock = Box::new(move || *handle.lock().unwrap());
        (clock, now)
    }

    #[test]
    fn test_set_then_get_round_trips() {
        let mut store = MemoryStore::new();
        store.set("k", json!({"a": 1}), None).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(json!({"a": 1})));
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let (clock, now) = manual_clock();
        let mut store = MemoryStore::with_clock(clock);
        store
            .set("short", json!("v"), Some(Duration::seconds(1)))
            .unwrap();
        assert_eq!(store.get("short").unwrap(), Some(json!("v")));

        *now.lock().unwrap() += Duration::seconds(2);
        assert_eq!(store.get("short").unwrap(), None);
        // Evicted on read
        assert_eq!(store.stats().unwrap().total_keys, 0);
    }

    #[test]
    fn test_entry_at_exact_ttl_is_still_live() {
        let (clock, now) = manual_clock();
        let mut store = MemoryStore::with_clock(clock);
        store.set("k", json!(1), Some(Duration::seconds(10))).unwrap();
        *now.lock().unwrap() += Duration::seconds(10);
        assert_eq!(store.get("k").unwrap(), Some(json!(1)));
    }

    #[test]
    fn test_no_ttl_never_expires() {
        let (clock, now) = manual_clock();
        let mut store = MemoryStore::with_clock(clock);
        store.set("forever", json!(true), None).unwrap();
        *now.lock().unwrap() += Duration::days(3650);
        assert_eq!(store.get("forever").unwrap(), Some(json!(true)));
    }

    #[test]
    fn test_stats_after_one_hit_and_one_miss() {
        let mut store = MemoryStore::new();
        store.set("k", json!(1), None).unwrap();
        store.get("k").unwrap();
        store.get("missing").unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, 50.0);
        assert_eq!(stats.total_keys, 1);
    }

    #[test]
    fn test_expired_read_counts_as_miss() {
        let (clock, now) = manual_clock();
        let mut store = MemoryStore::with_clock(clock);
        store.set("k", json!(1), Some(Duration::seconds(1))).unwrap();
        *now.lock().unwrap() += Duration::seconds(5);
        store.get("k").unwrap();
        let stats = store.stats().unwrap();
        assert_eq!((stats.hits, stats.misses), (0, 1));
    }

    #[test]
    fn test_hit_rate_rounds_to_one_decimal() {
        assert_eq!(CacheStats::new(0, 1, 2).hit_rate, 33.3);
        assert_eq!(CacheStats::new(0, 2, 1).hit_rate, 66.7);
        assert_eq!(CacheStats::new(0, 0, 0).hit_rate, 0.0);
    }

    #[test]
    fn test_delete_and_clear() {
        let mut store = MemoryStore::new();
        store.set("a", json!(1), None).unwrap();
        store.set("b", json!(2), None).unwrap();
        assert!(store.delete("a").unwrap());
        assert!(!store.delete("a").unwrap());
        store.clear().unwrap();
        assert_eq!(store.get("b").unwrap(), None);
    }

    #[test]
    fn test_memory_store_has_no_history() {
        let mut store = MemoryStore::new();
        assert!(store.history().is_none());
    }

    #[test]
    fn test_open_store_memory_backend() {
        let mut store = open_store(StoreBackend::Memory, Path::new("/nonexistent/db.sqlite")).unwrap();
        store.set("k", json!("v"), None).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(json!("v")));
    }
}
