use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::info;

use crate::models::{AgentMetadata, PendingRegistration, RegisterAgentRequest, RegistrationReceipt};
use crate::services::agent_store::{AgentStore, StoreError};

const MAX_NAME_LENGTH: usize = 128;
const MAX_SKILLS: usize = 32;
const MAX_SKILL_LENGTH: usize = 64;

/// Errors that can occur while submitting a registration
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for RegistrationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => RegistrationError::Conflict(msg),
            other => RegistrationError::Store(other),
        }
    }
}

/// Records registration intents until the on-chain registration is indexed
#[derive(Clone)]
pub struct RegistrationService {
    store: Arc<dyn AgentStore>,
}

impl RegistrationService {
    pub fn new(store: Arc<dyn AgentStore>) -> Self {
        Self { store }
    }

    pub async fn submit(
        &self,
        request: RegisterAgentRequest,
        submitted_by: &str,
    ) -> Result<RegistrationReceipt, RegistrationError> {
        let metadata = AgentMetadata::from(request.metadata);
        validate_metadata(&metadata)?;

        let pending = PendingRegistration {
            agent_id: request.agent_id,
            owner: request.owner,
            metadata,
            tier: request.tier,
            submitted_by: submitted_by.to_string(),
            submitted_at: Utc::now(),
        };
        self.store.insert_pending_registration(&pending).await?;

        info!(
            agent_id = %pending.agent_id,
            owner = %pending.owner,
            tier = pending.tier,
            submitted_by,
            "Registration submitted"
        );

        Ok(RegistrationReceipt::pending(pending.agent_id))
    }
}

fn validate_metadata(metadata: &AgentMetadata) -> Result<(), RegistrationError> {
    if let Some(name) = &metadata.name {
        // Name must be 1-128 characters
        if name.trim().is_empty() || name.chars().count() > MAX_NAME_LENGTH {
            return Err(RegistrationError::InvalidMetadata(format!(
                "name must be 1-{MAX_NAME_LENGTH} characters"
            )));
        }
    }

    if metadata.skills.len() > MAX_SKILLS {
        return Err(RegistrationError::InvalidMetadata(format!(
            "at most {MAX_SKILLS} skills are allowed"
        )));
    }
    if let Some(bad) = metadata
        .skills
        .iter()
        .find(|s| s.trim().is_empty() || s.chars().count() > MAX_SKILL_LENGTH)
    {
        return Err(RegistrationError::InvalidMetadata(format!(
            "skill {bad:?} must be 1-{MAX_SKILL_LENGTH} characters"
        )));
    }

    Ok(())
}
