//! Key-value store contract and backends
//!
//! Reducer state lives in a shared key-value store: string keys, JSON values.
//! No transactional guarantees are offered or assumed. Partitioning between
//! reducers and students happens entirely in the key namespace.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::config::{KvsBackend, KvsConfig};
use crate::{Error, Result};

mod memory;
#[cfg(feature = "sqlx")]
mod sqlite;

pub use memory::MemoryKvs;
#[cfg(feature = "sqlx")]
pub use sqlite::SqliteKvs;

/// Asynchronous key-value store
#[async_trait]
pub trait Kvs: Send + Sync {
    /// Fetch a value, `None` if the key was never set
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store a value, replacing any previous one
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Enumerate every key in the store
    ///
    /// This can be slow on large stores. Meant for debugging and queries.
    async fn keys(&self) -> Result<Vec<String>>;
}

/// Open the backend selected by configuration
pub async fn open_kvs(config: &KvsConfig) -> Result<Arc<dyn Kvs>> {
    match config.backend {
        KvsBackend::Memory => {
            info!("Using in-memory key-value store");
            Ok(Arc::new(MemoryKvs::new()))
        }
        #[cfg(feature = "sqlx")]
        KvsBackend::Sqlite => {
            let path = config.database_path.as_ref().ok_or_else(|| {
                Error::Config("kvs.database_path is required for the sqlite backend".to_string())
            })?;
            Ok(Arc::new(SqliteKvs::open(path).await?))
        }
        #[cfg(not(feature = "sqlx"))]
        KvsBackend::Sqlite => Err(Error::Config(
            "sqlite backend not compiled in (enable the `sqlx` feature)".to_string(),
        )),
    }
}

/// Hit/miss counters for reducer state lookups
///
/// A hit is a lookup that found prior internal state; a miss is a lookup that
/// had to initialise a new key.
#[derive(Debug, Default)]
pub struct CachePerformance {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CachePerformance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_memory_backend() {
        let kvs = open_kvs(&KvsConfig::default()).await.unwrap();
        kvs.set("k", Value::from(1)).await.unwrap();
        assert_eq!(kvs.get("k").await.unwrap(), Some(Value::from(1)));
    }

    #[tokio::test]
    async fn test_sqlite_backend_requires_path() {
        let config = KvsConfig {
            backend: KvsBackend::Sqlite,
            database_path: None,
        };
        let result = open_kvs(&config).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_cache_performance_counts() {
        let perf = CachePerformance::new();
        perf.record_hit();
        perf.record_hit();
        perf.record_miss();
        assert_eq!(perf.hits(), 2);
        assert_eq!(perf.misses(), 1);
    }
}
