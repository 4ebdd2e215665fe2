//! Verification Recorder
//!
//! Persists every verification attempt, pass or fail. A pass also moves the
//! agent's `last_verified` forward; whether an agent is currently verified
//! is never stored, only derived at read time.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info};

use crate::models::{AgentId, VerificationAck, VerificationRecord, VerificationResult};
use crate::services::agent_store::{AgentStore, StoreError};

pub use crate::models::is_currently_verified;

/// Most recent verification records returned by `history`
pub const VERIFICATION_HISTORY_LIMIT: i64 = 10;

/// Upper bound on a report URI
pub const MAX_REPORT_URI_LENGTH: usize = 2048;

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("Invalid verification result: {0}")]
    InvalidResult(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(AgentId),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for VerificationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AgentNotFound(id) => VerificationError::AgentNotFound(id),
            other => VerificationError::Store(other),
        }
    }
}

#[derive(Clone)]
pub struct VerificationRecorder {
    store: Arc<dyn AgentStore>,
}

impl VerificationRecorder {
    pub fn new(store: Arc<dyn AgentStore>) -> Self {
        Self { store }
    }

    pub async fn record_verification(
        &self,
        agent_id: &AgentId,
        result: VerificationResult,
    ) -> Result<VerificationAck, VerificationError> {
        validate_result(&result)?;

        let now = Utc::now();
        let record = self.store.insert_verification(agent_id, &result, now).await?;

        if record.passed {
            // The attempt itself stays recorded even if this fails
            if let Err(e) = self.store.mark_verified(agent_id, now).await {
                error!(
                    agent_id = %agent_id,
                    verification_id = record.id,
                    error = %e,
                    "Failed to update last verification time"
                );
                return Err(e.into());
            }
        }

        info!(
            agent_id = %agent_id,
            verification_id = record.id,
            passed = record.passed,
            score = record.score,
            "Verification recorded"
        );

        Ok(VerificationAck {
            agent_id: *agent_id,
            verified: record.passed,
            score: record.score,
            timestamp: record.timestamp,
        })
    }

    /// Newest first. Empty for unknown agents.
    pub async fn history(
        &self,
        agent_id: &AgentId,
    ) -> Result<Vec<VerificationRecord>, VerificationError> {
        Ok(self
            .store
            .recent_verifications(agent_id, VERIFICATION_HISTORY_LIMIT)
            .await?)
    }
}

fn validate_result(result: &VerificationResult) -> Result<(), VerificationError> {
    if result.score < 0 {
        return Err(VerificationError::InvalidResult(
            "score must not be negative".to_string(),
        ));
    }
    if result.report_uri.trim().is_empty() {
        return Err(VerificationError::InvalidResult(
            "reportURI must not be empty".to_string(),
        ));
    }
    if result.report_uri.len() > MAX_REPORT_URI_LENGTH {
        return Err(VerificationError::InvalidResult(format!(
            "reportURI must be at most {MAX_REPORT_URI_LENGTH} bytes"
        )));
    }
    if !(result.checks.is_object() || result.checks.is_array()) {
        return Err(VerificationError::InvalidResult(
            "checks must be an object or an array".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::InMemoryAgentStore;
    use crate::test_support::{agent_id, seed_agent};
    use chrono::Duration;
    use serde_json::json;

    fn result(passed: bool) -> VerificationResult {
        VerificationResult {
            score: 87,
            passed,
            report_uri: "ipfs://QmReport".to_string(),
            checks: json!({"latency": "ok", "sandbox": passed}),
        }
    }

    #[tokio::test]
    async fn test_pass_marks_agent_verified() {
        let store = Arc::new(InMemoryAgentStore::new());
        let id = seed_agent(store.as_ref(), 1, 0, &[]).await;
        let recorder = VerificationRecorder::new(store.clone());

        let ack = recorder.record_verification(&id, result(true)).await.unwrap();
        assert!(ack.verified);
        assert_eq!(ack.score, 87);

        let agent = store.fetch_agent(&id).await.unwrap().unwrap();
        assert_eq!(agent.last_verified, Some(ack.timestamp));
        assert!(agent.is_currently_verified(Utc::now()));
    }

    #[tokio::test]
    async fn test_failure_is_recorded_without_touching_last_verified() {
        let store = Arc::new(InMemoryAgentStore::new());
        let id = seed_agent(store.as_ref(), 1, 0, &[]).await;
        let earlier = Utc::now() - Duration::days(3);
        store.mark_verified(&id, earlier).await.unwrap();
        let recorder = VerificationRecorder::new(store.clone());

        let ack = recorder.record_verification(&id, result(false)).await.unwrap();
        assert!(!ack.verified);

        let agent = store.fetch_agent(&id).await.unwrap().unwrap();
        assert_eq!(agent.last_verified, Some(earlier));

        let history = recorder.history(&id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(!history[0].passed);
        assert_eq!(history[0].checks["sandbox"], false);
    }

    #[tokio::test]
    async fn test_unknown_agent() {
        let store = Arc::new(InMemoryAgentStore::new());
        let recorder = VerificationRecorder::new(store);
        let err = recorder
            .record_verification(&agent_id(5), result(true))
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::AgentNotFound(_)));
    }

    #[tokio::test]
    async fn test_rejects_malformed_results() {
        let store = Arc::new(InMemoryAgentStore::new());
        let id = seed_agent(store.as_ref(), 1, 0, &[]).await;
        let recorder = VerificationRecorder::new(store.clone());

        let mut negative = result(true);
        negative.score = -1;
        let mut blank_uri = result(true);
        blank_uri.report_uri = " ".to_string();
        let mut long_uri = result(true);
        long_uri.report_uri = format!("ipfs://{}", "a".repeat(MAX_REPORT_URI_LENGTH));
        let mut scalar_checks = result(true);
        scalar_checks.checks = json!("all good");

        for bad in [negative, blank_uri, long_uri, scalar_checks] {
            let err = recorder.record_verification(&id, bad).await.unwrap_err();
            assert!(matches!(err, VerificationError::InvalidResult(_)));
        }
        assert!(recorder.history(&id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_failure_surfaces_but_keeps_record() {
        let store = Arc::new(InMemoryAgentStore::new());
        let id = seed_agent(store.as_ref(), 1, 0, &[]).await;
        let recorder = VerificationRecorder::new(store.clone());

        store.fail_next_mark_verified();
        let err = recorder.record_verification(&id, result(true)).await.unwrap_err();
        assert!(matches!(err, VerificationError::Store(_)));

        assert_eq!(recorder.history(&id).await.unwrap().len(), 1);
        let agent = store.fetch_agent(&id).await.unwrap().unwrap();
        assert_eq!(agent.last_verified, None);
    }

    #[tokio::test]
    async fn test_history_is_capped_and_newest_first() {
        let store = Arc::new(InMemoryAgentStore::new());
        let id = seed_agent(store.as_ref(), 1, 0, &[]).await;
        let recorder = VerificationRecorder::new(store.clone());

        for score in 0..12 {
            let mut r = result(score % 2 == 0);
            r.score = score;
            recorder.record_verification(&id, r).await.unwrap();
        }

        let history = recorder.history(&id).await.unwrap();
        assert_eq!(history.len(), VERIFICATION_HISTORY_LIMIT as usize);
        assert_eq!(history[0].score, 11);
        assert!(history.windows(2).all(|w| w[0].id > w[1].id));
    }

    #[test]
    fn test_currently_verified_reexport() {
        let now = Utc::now();
        assert!(is_currently_verified(Some(now - Duration::days(1)), now));
    }
}
