//! Agent Directory
//!
//! Lookup and listing of agents. A single lookup tries the cache, then the
//! local store, then the on-chain registry; only store results are cached.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{
    Agent, AgentFilter, AgentId, AgentLookup, AgentPage, AgentProfile, AgentSummary, NewAgent,
    PageRequest, Pagination,
};
use crate::services::agent_cache::{self, AgentCache};
use crate::services::agent_store::{AgentStore, StoreError};
use crate::services::ledger::AgentLedger;

/// How long a store-sourced profile stays cached
pub const AGENT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Verification records embedded in a profile
pub const RECENT_VERIFICATIONS_LIMIT: i64 = 10;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Agent not found: {0}")]
    NotFound(AgentId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct AgentDirectoryService {
    store: Arc<dyn AgentStore>,
    cache: Option<Arc<dyn AgentCache>>,
    ledger: Option<Arc<dyn AgentLedger>>,
    cache_ttl: Duration,
}

impl AgentDirectoryService {
    pub fn new(store: Arc<dyn AgentStore>) -> Self {
        Self {
            store,
            cache: None,
            ledger: None,
            cache_ttl: AGENT_CACHE_TTL,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn AgentCache>, ttl: Duration) -> Self {
        self.cache = Some(cache);
        self.cache_ttl = ttl;
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn AgentLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Resolve a single agent
    pub async fn get_agent(&self, agent_id: &AgentId) -> Result<AgentLookup, DirectoryError> {
        let key = agent_cache::agent_key(agent_id);

        if let Some(profile) = self.cached_profile(&key).await {
            debug!(agent_id = %agent_id, "Agent cache hit");
            return Ok(AgentLookup::Database(Box::new(profile)));
        }

        if let Some(agent) = self.store.fetch_agent(agent_id).await? {
            let profile = self.load_profile(agent).await?;
            self.cache_profile(&key, &profile).await;
            return Ok(AgentLookup::Database(Box::new(profile)));
        }

        if let Some(ledger) = &self.ledger {
            match ledger.get_agent(agent_id).await {
                Ok(Some(chain_agent)) => return Ok(AgentLookup::Blockchain(chain_agent)),
                Ok(None) => {}
                Err(e) => {
                    warn!(agent_id = %agent_id, error = %e, "Ledger lookup failed");
                }
            }
        }

        Err(DirectoryError::NotFound(*agent_id))
    }

    /// Filtered page of agents, highest reputation first
    pub async fn list_agents(
        &self,
        filter: &AgentFilter,
        page: PageRequest,
        now: DateTime<Utc>,
    ) -> Result<AgentPage, DirectoryError> {
        let (rows, total) = self.store.list_agents(filter, &page, now).await?;

        let agents = rows
            .into_iter()
            .map(|(agent, stats)| AgentSummary {
                currently_verified: agent.is_currently_verified(now),
                agent,
                stats,
            })
            .collect();

        Ok(AgentPage {
            agents,
            pagination: Pagination::new(page, total),
        })
    }

    /// Create a local agent mirroring an on-chain registration
    pub async fn create_agent(&self, agent: NewAgent) -> Result<Agent, DirectoryError> {
        Ok(self.store.insert_agent(&agent, Utc::now()).await?)
    }

    async fn load_profile(&self, agent: Agent) -> Result<AgentProfile, DirectoryError> {
        let stats = self.store.fetch_stats(&agent.agent_id).await?;
        let verifications = self
            .store
            .recent_verifications(&agent.agent_id, RECENT_VERIFICATIONS_LIMIT)
            .await?;
        Ok(AgentProfile {
            agent,
            stats,
            verifications,
        })
    }

    async fn cached_profile(&self, key: &str) -> Option<AgentProfile> {
        let cache = self.cache.as_deref()?;
        match agent_cache::get_json(cache, key).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(key, error = %e, "Agent cache read failed");
                None
            }
        }
    }

    async fn cache_profile(&self, key: &str, profile: &AgentProfile) {
        let Some(cache) = self.cache.as_deref() else {
            return;
        };
        if let Err(e) = agent_cache::set_json(cache, key, profile, self.cache_ttl).await {
            warn!(key, error = %e, "Agent cache write failed");
        }
    }
}
