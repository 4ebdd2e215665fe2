//! Agent Cache
//!
//! Short-lived read-through cache for directory lookups. Redis in
//! production, an in-process TTL map when no Redis URL is configured.
//! Cache failures are never fatal to a lookup.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;

/// Default maximum entries held by the in-process cache
const DEFAULT_MAX_ENTRIES: usize = 10_000;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Key for a cached agent profile
pub fn agent_key(agent_id: &impl std::fmt::Display) -> String {
    format!("agent:{agent_id}")
}

#[async_trait]
pub trait AgentCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;
}

/// Read and decode a JSON value
pub async fn get_json<T: DeserializeOwned>(
    cache: &dyn AgentCache,
    key: &str,
) -> Result<Option<T>, CacheError> {
    match cache.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Encode and store a JSON value
pub async fn set_json<T: Serialize + ?Sized>(
    cache: &dyn AgentCache,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<(), CacheError> {
    let raw = serde_json::to_string(value)?;
    cache.set_ex(key, &raw, ttl).await
}

// ============================================================================
// Redis
// ============================================================================

/// Redis-backed cache. The connection manager reconnects on its own, so a
/// Redis outage only degrades lookups to cache misses.
#[derive(Clone)]
pub struct RedisAgentCache {
    conn: ConnectionManager,
}

impl RedisAgentCache {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl AgentCache for RedisAgentCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

// ============================================================================
// In-process
// ============================================================================

#[derive(Debug, Clone)]
struct CachedValue {
    value: String,
    /// Insertion order, used for eviction
    sequence: u64,
    expires_at: Instant,
}

impl CachedValue {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-memory TTL cache with a bounded entry count
pub struct InMemoryAgentCache {
    entries: RwLock<HashMap<String, CachedValue>>,
    max_entries: usize,
    sequence: AtomicU64,
}

impl Default for InMemoryAgentCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl InMemoryAgentCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
            sequence: AtomicU64::new(0),
        }
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    fn evict_oldest(entries: &mut HashMap<String, CachedValue>, count: usize) {
        let mut by_age: Vec<(&String, u64)> =
            entries.iter().map(|(k, v)| (k, v.sequence)).collect();
        by_age.sort_by_key(|(_, sequence)| *sequence);

        let victims: Vec<String> = by_age
            .into_iter()
            .take(count)
            .map(|(k, _)| k.clone())
            .collect();
        for key in victims {
            entries.remove(&key);
        }
    }
}

#[async_trait]
impl AgentCache for InMemoryAgentCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.write().await;

        if !entries.contains_key(key) && entries.len() >= self.max_entries {
            entries.retain(|_, v| !v.is_expired());
            if entries.len() >= self.max_entries {
                let excess = entries.len() - self.max_entries + 1;
                Self::evict_oldest(&mut entries, excess);
            }
        }

        entries.insert(
            key.to_string(),
            CachedValue {
                value: value.to_string(),
                sequence,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }
}
