//! Reputation Ledger
//!
//! Applies signed deltas to an agent's reputation score (0 to 10000) and
//! keeps an append-only history of every mutation. The score write and its
//! history row commit together or not at all, and concurrent adjustments of
//! the same agent are serialized by the store's per-agent lock.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use crate::models::{AgentId, ReputationHistoryEntry, MAX_REPUTATION, MIN_REPUTATION};
use crate::services::agent_store::{AgentStore, StoreError};

/// Most recent history entries returned by `history`
pub const REPUTATION_HISTORY_LIMIT: i64 = 100;

/// Reason recorded for adjustments made through the public API
pub const API_UPDATE_REASON: &str = "API update";

#[derive(Debug, Error)]
pub enum ReputationError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Agent not found: {0}")]
    AgentNotFound(AgentId),
}

/// Apply `delta` to `current`, saturating at the score bounds
pub fn clamp_score(current: i32, delta: i64) -> i32 {
    let raw = i64::from(current).saturating_add(delta);
    // Bounded, so the narrowing cast is exact
    raw.clamp(i64::from(MIN_REPUTATION), i64::from(MAX_REPUTATION)) as i32
}

/// Outcome of a committed adjustment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReputationAdjustment {
    pub agent_id: AgentId,
    pub previous_score: i32,
    pub new_score: i32,
    /// Delta as requested
    pub delta: i64,
    pub entry: ReputationHistoryEntry,
}

impl ReputationAdjustment {
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.entry.timestamp
    }
}

#[derive(Clone)]
pub struct ReputationService {
    store: Arc<dyn AgentStore>,
}

impl ReputationService {
    pub fn new(store: Arc<dyn AgentStore>) -> Self {
        Self { store }
    }

    /// Adjust an agent's score, recording `API_UPDATE_REASON`
    pub async fn adjust_reputation(
        &self,
        agent_id: &AgentId,
        delta: i64,
    ) -> Result<ReputationAdjustment, ReputationError> {
        self.adjust_reputation_with_reason(agent_id, delta, API_UPDATE_REASON)
            .await
    }

    pub async fn adjust_reputation_with_reason(
        &self,
        agent_id: &AgentId,
        delta: i64,
        reason: &str,
    ) -> Result<ReputationAdjustment, ReputationError> {
        let mut unit = self
            .store
            .begin_reputation_unit(agent_id)
            .await?
            .ok_or(ReputationError::AgentNotFound(*agent_id))?;

        let previous_score = unit.current_score();
        let new_score = clamp_score(previous_score, delta);
        let now = Utc::now();

        unit.write_score(new_score).await?;
        let entry = unit.append_history(new_score, delta, reason, now).await?;
        unit.commit().await?;

        info!(
            agent_id = %agent_id,
            previous_score,
            new_score,
            delta,
            reason,
            "Reputation updated"
        );

        Ok(ReputationAdjustment {
            agent_id: *agent_id,
            previous_score,
            new_score,
            delta,
            entry,
        })
    }

    /// Most recent entries, newest first. Empty for unknown agents.
    pub async fn history(
        &self,
        agent_id: &AgentId,
    ) -> Result<Vec<ReputationHistoryEntry>, ReputationError> {
        Ok(self
            .store
            .reputation_history(agent_id, REPUTATION_HISTORY_LIMIT)
            .await?)
    }
}
