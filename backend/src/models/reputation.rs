use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::agent::AgentId;

/// One reputation mutation. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReputationHistoryEntry {
    pub id: i64,
    pub agent_id: AgentId,
    /// Score after the mutation, already clamped
    pub score: i32,
    /// Delta as requested, before clamping
    pub delta: i64,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Request payload for POST /reputation/update
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateReputationRequest {
    pub agent_id: AgentId,
    pub delta: i64,
}

/// Response payload for POST /reputation/update
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReputationResponse {
    pub agent_id: AgentId,
    pub new_score: i32,
    pub delta: i64,
    pub timestamp: DateTime<Utc>,
}

/// Response payload for GET /agents/{agentId}/reputation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReputationHistoryResponse {
    pub agent_id: AgentId,
    pub history: Vec<ReputationHistoryEntry>,
}
