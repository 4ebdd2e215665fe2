use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::agent::AgentId;

/// Trailing window in which a passing verification keeps an agent verified
pub const VERIFICATION_WINDOW_DAYS: i64 = 30;

/// Whether an agent counts as verified at `now`.
///
/// Derived on every read and never persisted.
pub fn is_currently_verified(last_verified: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match last_verified {
        Some(at) => at > now - Duration::days(VERIFICATION_WINDOW_DAYS),
        None => false,
    }
}

/// Outcome of one external verification check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub score: i32,
    pub passed: bool,
    #[serde(rename = "reportURI")]
    pub report_uri: String,
    pub checks: serde_json::Value,
}

/// Persisted verification attempt, pass or fail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRecord {
    pub id: i64,
    pub agent_id: AgentId,
    pub score: i32,
    pub passed: bool,
    #[serde(rename = "reportURI")]
    pub report_uri: String,
    pub checks: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Request payload for POST /verify
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RecordVerificationRequest {
    pub agent_id: AgentId,
    pub score: i32,
    pub passed: bool,
    #[serde(rename = "reportURI")]
    pub report_uri: String,
    pub checks: serde_json::Value,
}

impl RecordVerificationRequest {
    pub fn into_parts(self) -> (AgentId, VerificationResult) {
        (
            self.agent_id,
            VerificationResult {
                score: self.score,
                passed: self.passed,
                report_uri: self.report_uri,
                checks: self.checks,
            },
        )
    }
}

/// Acknowledgement returned by POST /verify
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationAck {
    pub agent_id: AgentId,
    pub verified: bool,
    pub score: i32,
    pub timestamp: DateTime<Utc>,
}

/// Response payload for GET /agents/{agentId}/verifications
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationHistoryResponse {
    pub agent_id: AgentId,
    pub verifications: Vec<VerificationRecord>,
}
