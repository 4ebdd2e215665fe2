use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::verification::{is_currently_verified, VerificationRecord};

/// Lowest reputation score an agent can hold
pub const MIN_REPUTATION: i32 = 0;
/// Highest reputation score an agent can hold
pub const MAX_REPUTATION: i32 = 10_000;

/// 32-byte agent identifier (the registry's `bytes32` key).
///
/// Accepts `0x` followed by 64 hex digits in any case and always renders
/// as lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentId([u8; 32]);

impl AgentId {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for AgentId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| format!("Invalid agent id: {s}. Expected 0x followed by 64 hex digits"))?;

        let mut bytes = [0u8; 32];
        hex::decode_to_slice(digits, &mut bytes).map_err(|_| {
            format!("Invalid agent id: {s}. Expected 0x followed by 64 hex digits")
        })?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for AgentId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AgentId> for String {
    fn from(id: AgentId) -> Self {
        id.to_string()
    }
}

/// Wallet address that owns an agent (`0x` + 40 hex digits, stored lowercase)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WalletAddress(String);

impl WalletAddress {
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(format!("0x{}", hex::encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0[2..].bytes().all(|b| b == b'0')
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for WalletAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = s.len() == 42
            && (s.starts_with("0x") || s.starts_with("0X"))
            && s[2..].bytes().all(|b| b.is_ascii_hexdigit());
        if !valid {
            return Err(format!(
                "Invalid wallet address: {s}. Expected 0x followed by 40 hex digits"
            ));
        }
        Ok(Self(format!("0x{}", s[2..].to_ascii_lowercase())))
    }
}

impl TryFrom<String> for WalletAddress {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WalletAddress> for String {
    fn from(address: WalletAddress) -> Self {
        address.0
    }
}

/// Lifecycle status of an agent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentStatus {
    #[default]
    Active,
    Suspended,
    /// Subscription lapsed on-chain
    Expired,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Suspended => "Suspended",
            Self::Expired => "Expired",
        }
    }

    /// Map the registry contract's `uint8` status code
    pub fn from_chain_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Active),
            1 => Some(Self::Suspended),
            2 => Some(Self::Expired),
            _ => None,
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(Self::Active),
            "Suspended" => Ok(Self::Suspended),
            "Expired" => Ok(Self::Expired),
            _ => Err(format!(
                "Invalid status: {s}. Valid values are: Active, Suspended, Expired"
            )),
        }
    }
}

/// Descriptive attributes of an agent, as stored.
///
/// Rows are written by the chain indexer as well as this service, so any
/// key outside the known ones is kept in `extra` and written back as-is.
/// `tier` mirrors a `uint256` on-chain and may arrive as a number or a
/// string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AgentMetadata {
    pub fn has_skill(&self, skill: &str) -> bool {
        self.skills.iter().any(|s| s == skill)
    }
}

/// Agent record held in the local data store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub agent_id: AgentId,
    pub owner: WalletAddress,
    pub metadata: AgentMetadata,
    pub reputation_score: i32,
    pub status: AgentStatus,
    pub last_verified: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    /// Verified within the trailing window as of `now`
    pub fn is_currently_verified(&self, now: DateTime<Utc>) -> bool {
        is_currently_verified(self.last_verified, now)
    }
}

/// Input for creating an agent that mirrors an on-chain registration
#[derive(Debug, Clone)]
pub struct NewAgent {
    pub agent_id: AgentId,
    pub owner: WalletAddress,
    pub metadata: AgentMetadata,
    pub status: AgentStatus,
}

impl NewAgent {
    pub fn new(agent_id: AgentId, owner: WalletAddress, metadata: AgentMetadata) -> Self {
        Self {
            agent_id,
            owner,
            metadata,
            status: AgentStatus::Active,
        }
    }
}

/// Aggregate job statistics for an agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStats {
    pub total_jobs: i64,
    pub completed_jobs: i64,
    pub rating: Option<f64>,
}

/// Full local profile returned by a directory lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProfile {
    #[serde(flatten)]
    pub agent: Agent,
    pub stats: Option<AgentStats>,
    /// Most recent verification records, newest first
    pub verifications: Vec<VerificationRecord>,
}

/// Agent as reported by the registry contract's `getAgent` accessor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainAgent {
    pub agent_id: AgentId,
    pub owner: WalletAddress,
    #[serde(rename = "metadataURI")]
    pub metadata_uri: String,
    pub reputation_score: i32,
    pub status: AgentStatus,
}

/// Result of a directory lookup, tagged with where it came from
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", content = "agent", rename_all = "lowercase")]
pub enum AgentLookup {
    Database(Box<AgentProfile>),
    Blockchain(ChainAgent),
}

impl AgentLookup {
    pub fn source(&self) -> &'static str {
        match self {
            Self::Database(_) => "database",
            Self::Blockchain(_) => "blockchain",
        }
    }

    pub fn agent_id(&self) -> &AgentId {
        match self {
            Self::Database(profile) => &profile.agent.agent_id,
            Self::Blockchain(agent) => &agent.agent_id,
        }
    }

    pub fn reputation_score(&self) -> i32 {
        match self {
            Self::Database(profile) => profile.agent.reputation_score,
            Self::Blockchain(agent) => agent.reputation_score,
        }
    }
}

/// Listing row: agent plus stats and the read-time verification flag
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    #[serde(flatten)]
    pub agent: Agent,
    pub stats: Option<AgentStats>,
    pub currently_verified: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "0x1111111111111111111111111111111111111111111111111111111111111111";

    #[test]
    fn test_agent_id_round_trips_lowercase() {
        let upper = format!("0x{}", "AB".repeat(32));
        let id: AgentId = upper.parse().unwrap();
        assert_eq!(id.to_string(), format!("0x{}", "ab".repeat(32)));
    }

    #[test]
    fn test_agent_id_rejects_malformed() {
        let too_long = format!("{ID}00");
        for bad in [
            "",
            "0x",
            "1111111111111111111111111111111111111111111111111111111111111111",
            "0x11",
            "0xzz11111111111111111111111111111111111111111111111111111111111111",
            too_long.as_str(),
        ] {
            assert!(bad.parse::<AgentId>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_agent_id_serde_as_string() {
        let id: AgentId = ID.parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{ID}\""));
        let back: AgentId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<AgentId>("\"nope\"").is_err());
    }

    #[test]
    fn test_wallet_address_validation() {
        let addr: WalletAddress = "0xABCDEF0123456789abcdef0123456789ABCDEF01".parse().unwrap();
        assert_eq!(addr.as_str(), "0xabcdef0123456789abcdef0123456789abcdef01");
        assert!(!addr.is_zero());
        assert!(WalletAddress::from_bytes([0u8; 20]).is_zero());
        assert!("0x1234".parse::<WalletAddress>().is_err());
        assert!("abcdef0123456789abcdef0123456789abcdef0123".parse::<WalletAddress>().is_err());
    }

    #[test]
    fn test_status_parsing_and_chain_codes() {
        assert_eq!("Active".parse::<AgentStatus>().unwrap(), AgentStatus::Active);
        assert_eq!("Suspended".parse::<AgentStatus>().unwrap(), AgentStatus::Suspended);
        assert!("active".parse::<AgentStatus>().is_err());
        assert_eq!(AgentStatus::from_chain_code(0), Some(AgentStatus::Active));
        assert_eq!(AgentStatus::from_chain_code(2), Some(AgentStatus::Expired));
        assert_eq!(AgentStatus::from_chain_code(7), None);
        assert_eq!(AgentStatus::default(), AgentStatus::Active);
    }

    #[test]
    fn test_metadata_keeps_unknown_keys() {
        let stored = serde_json::json!({
            "name": "scout",
            "skills": ["rust"],
            "tier": 2,
            "version": "2",
            "links": {"site": "https://scout.example"}
        });
        let metadata: AgentMetadata = serde_json::from_value(stored.clone()).unwrap();
        assert!(metadata.has_skill("rust"));
        assert!(!metadata.has_skill("go"));
        assert_eq!(metadata.tier, Some(serde_json::json!(2)));
        assert_eq!(metadata.extra["version"], "2");

        assert_eq!(serde_json::to_value(&metadata).unwrap(), stored);
    }

    #[test]
    fn test_lookup_serializes_with_source_tag() {
        let lookup = AgentLookup::Blockchain(ChainAgent {
            agent_id: ID.parse().unwrap(),
            owner: WalletAddress::from_bytes([0x22; 20]),
            metadata_uri: "ipfs://meta".to_string(),
            reputation_score: 4200,
            status: AgentStatus::Active,
        });

        let json = serde_json::to_value(&lookup).unwrap();
        assert_eq!(json["source"], "blockchain");
        assert_eq!(json["agent"]["metadataURI"], "ipfs://meta");
        assert_eq!(json["agent"]["reputationScore"], 4200);
        assert_eq!(lookup.source(), "blockchain");
    }
}
