use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::agent::{AgentId, AgentMetadata, WalletAddress};

/// Request payload for POST /agents
///
/// The registration itself happens on the registry contract; this only
/// records the intent until the on-chain event is indexed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RegisterAgentRequest {
    pub agent_id: AgentId,
    pub owner: WalletAddress,
    pub metadata: RegistrationMetadata,
    pub tier: u8,
}

/// Metadata accepted on POST /agents. Stricter than what is stored:
/// unknown keys are rejected.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RegistrationMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub tier: Option<serde_json::Value>,
}

impl From<RegistrationMetadata> for AgentMetadata {
    fn from(metadata: RegistrationMetadata) -> Self {
        Self {
            name: metadata.name,
            description: metadata.description,
            avatar: metadata.avatar,
            skills: metadata.skills,
            tier: metadata.tier,
            extra: serde_json::Map::new(),
        }
    }
}

/// Off-ledger registration awaiting its on-chain counterpart
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRegistration {
    pub agent_id: AgentId,
    pub owner: WalletAddress,
    pub metadata: AgentMetadata,
    pub tier: u8,
    /// Subject of the bearer token that submitted it
    pub submitted_by: String,
    pub submitted_at: DateTime<Utc>,
}

/// Response payload for POST /agents
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationReceipt {
    pub message: String,
    pub agent_id: AgentId,
    pub status: String,
    pub note: String,
}

impl RegistrationReceipt {
    pub fn pending(agent_id: AgentId) -> Self {
        Self {
            message: "Agent registration submitted".to_string(),
            agent_id,
            status: "pending".to_string(),
            note: "On-chain registration required".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_metadata_rejects_unknown_fields() {
        let ok: RegistrationMetadata =
            serde_json::from_value(serde_json::json!({"name": "scout", "skills": ["rust"]}))
                .unwrap();
        assert!(AgentMetadata::from(ok).has_skill("rust"));

        let err = serde_json::from_value::<RegistrationMetadata>(
            serde_json::json!({"name": "x", "rank": 1}),
        );
        assert!(err.is_err());
    }
}
