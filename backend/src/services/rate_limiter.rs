//! Rate Limiter Service
//!
//! Per-client request limiting using a sliding window of time buckets.
//! Clients are keyed by their peer address.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors that can occur during rate limiting
#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Rate limit exceeded for client '{client}'. Retry after {retry_after} seconds")]
    RateLimited { client: String, retry_after: u64 },
}

/// Window configuration shared by every client
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests allowed in the window
    pub max_requests: u32,
    /// Window duration in seconds
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window_secs: 60,
        }
    }
}

/// Time bucket for tracking requests in a sliding window
#[derive(Debug, Clone)]
struct TimeBucket {
    start_time: DateTime<Utc>,
    count: u32,
}

#[derive(Debug, Clone, Default)]
struct ClientState {
    buckets: Vec<TimeBucket>,
}

/// Rate Limiter Service
///
/// Each client has independent state; one client exhausting its quota never
/// affects another.
#[derive(Debug, Clone)]
pub struct RateLimiterService {
    config: RateLimitConfig,
    state: Arc<RwLock<HashMap<String, ClientState>>>,
    /// Granularity of tracking, in seconds
    bucket_size_secs: u64,
}

impl Default for RateLimiterService {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

impl RateLimiterService {
    pub fn new(config: RateLimitConfig) -> Self {
        // Ten buckets per window, at least one second each
        let bucket_size_secs = (config.window_secs / 10).max(1);
        Self::with_bucket_size(config, bucket_size_secs)
    }

    pub fn with_bucket_size(config: RateLimitConfig, bucket_size_secs: u64) -> Self {
        Self {
            config,
            state: Arc::new(RwLock::new(HashMap::new())),
            bucket_size_secs: bucket_size_secs.max(1),
        }
    }

    /// Check if a request is allowed and record it if so
    pub async fn check_and_record(&self, client: &str) -> Result<(), RateLimitError> {
        self.check_and_record_at(client, Utc::now()).await
    }

    async fn check_and_record_at(
        &self,
        client: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RateLimitError> {
        let window = Duration::seconds(self.config.window_secs as i64);
        let mut state = self.state.write().await;
        let client_state = state.entry(client.to_string()).or_default();

        let window_start = now - window;
        client_state.buckets.retain(|b| b.start_time > window_start);

        let current_count: u32 = client_state.buckets.iter().map(|b| b.count).sum();

        if current_count >= self.config.max_requests {
            let retry_after = match client_state.buckets.first() {
                Some(oldest) => (oldest.start_time + window - now).num_seconds().max(1) as u64,
                None => self.config.window_secs,
            };

            return Err(RateLimitError::RateLimited {
                client: client.to_string(),
                retry_after,
            });
        }

        let bucket_start = self.bucket_start(now);
        match client_state
            .buckets
            .iter_mut()
            .find(|b| b.start_time == bucket_start)
        {
            Some(bucket) => bucket.count += 1,
            None => client_state.buckets.push(TimeBucket {
                start_time: bucket_start,
                count: 1,
            }),
        }

        Ok(())
    }

    /// Start of the bucket containing `time`
    fn bucket_start(&self, time: DateTime<Utc>) -> DateTime<Utc> {
        let size = self.bucket_size_secs as i64;
        let start = (time.timestamp() / size) * size;
        DateTime::from_timestamp(start, 0).unwrap_or(time)
    }

    /// Requests counted against a client in the current window
    pub async fn current_count(&self, client: &str) -> u32 {
        let window_start = Utc::now() - Duration::seconds(self.config.window_secs as i64);
        let state = self.state.read().await;

        state
            .get(client)
            .map(|s| {
                s.buckets
                    .iter()
                    .filter(|b| b.start_time > window_start)
                    .map(|b| b.count)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Drop state for clients with no requests in the current window
    pub async fn prune(&self) -> usize {
        let window_start = Utc::now() - Duration::seconds(self.config.window_secs as i64);
        let mut state = self.state.write().await;
        let before = state.len();
        state.retain(|_, s| s.buckets.iter().any(|b| b.start_time > window_start));
        before - state.len()
    }
}
