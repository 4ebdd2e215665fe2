//! Registry Ledger Client
//!
//! Read-only access to the on-chain agent registry. The directory falls
//! back to the ledger when an agent has not been indexed locally yet.
//!
//! `getAgent(bytes32)` returns `(bytes32 agentId, address owner,
//! string metadataURI, uint256 reputationScore, uint8 status)`, ABI-encoded
//! as five head words followed by the string tail.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use thiserror::Error;
use tracing::debug;

use crate::models::{AgentId, AgentStatus, ChainAgent, WalletAddress, MAX_REPUTATION};

const GET_AGENT_SIGNATURE: &str = "getAgent(bytes32)";

/// ABI word size
const WORD: usize = 32;

/// JSON-RPC code nodes use for execution reverts
const EXECUTION_REVERTED: i64 = 3;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger transport error: {0}")]
    Transport(String),

    #[error("Ledger RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Ledger response decode error: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for LedgerError {
    fn from(err: reqwest::Error) -> Self {
        LedgerError::Transport(err.to_string())
    }
}

#[async_trait]
pub trait AgentLedger: Send + Sync {
    /// `None` when the registry has no such agent
    async fn get_agent(&self, agent_id: &AgentId) -> Result<Option<ChainAgent>, LedgerError>;
}

// ============================================================================
// ABI codec
// ============================================================================

/// First four bytes of the Keccak-256 hash of a function signature
pub fn function_selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&hash[..4]);
    selector
}

/// Calldata for `getAgent(bytes32)`
pub fn encode_get_agent(agent_id: &AgentId) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + WORD);
    data.extend_from_slice(&function_selector(GET_AGENT_SIGNATURE));
    data.extend_from_slice(agent_id.as_bytes());
    data
}

/// Decode `getAgent` return data. Returns `None` for the registry's empty
/// record (zero id or zero owner).
pub fn decode_get_agent(
    requested: &AgentId,
    data: &[u8],
) -> Result<Option<ChainAgent>, LedgerError> {
    if data.is_empty() {
        return Ok(None);
    }
    if data.len() < 5 * WORD {
        return Err(LedgerError::Decode(format!(
            "expected at least {} bytes, got {}",
            5 * WORD,
            data.len()
        )));
    }

    let agent_id = AgentId::from_bytes(word_at(data, 0)?);

    let owner_word = word_at(data, 1)?;
    if owner_word[..12].iter().any(|b| *b != 0) {
        return Err(LedgerError::Decode("owner is not a valid address".to_string()));
    }
    let mut owner_bytes = [0u8; 20];
    owner_bytes.copy_from_slice(&owner_word[12..]);
    let owner = WalletAddress::from_bytes(owner_bytes);

    if agent_id.is_zero() || owner.is_zero() {
        return Ok(None);
    }
    if &agent_id != requested {
        return Err(LedgerError::Decode(format!(
            "registry answered for {agent_id}, expected {requested}"
        )));
    }

    let metadata_offset = small_uint(&word_at(data, 2)?, "metadataURI offset")?;
    let metadata_uri = decode_string(data, metadata_offset)?;

    let raw_score = small_uint(&word_at(data, 3)?, "reputationScore")?;
    let reputation_score = i32::try_from(raw_score)
        .ok()
        .filter(|s| *s <= MAX_REPUTATION)
        .ok_or_else(|| {
            LedgerError::Decode(format!("reputationScore {raw_score} out of range"))
        })?;

    let raw_status = small_uint(&word_at(data, 4)?, "status")?;
    let status = u8::try_from(raw_status)
        .ok()
        .and_then(AgentStatus::from_chain_code)
        .ok_or_else(|| LedgerError::Decode(format!("unknown status code {raw_status}")))?;

    Ok(Some(ChainAgent {
        agent_id,
        owner,
        metadata_uri,
        reputation_score,
        status,
    }))
}

fn word_at(data: &[u8], index: usize) -> Result<[u8; WORD], LedgerError> {
    index
        .checked_mul(WORD)
        .and_then(|start| Some(start..start.checked_add(WORD)?))
        .and_then(|range| data.get(range))
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| LedgerError::Decode(format!("missing word {index}")))
}

/// Unsigned word that must fit in a `u64`
fn small_uint(word: &[u8; WORD], field: &str) -> Result<u64, LedgerError> {
    if word[..WORD - 8].iter().any(|b| *b != 0) {
        return Err(LedgerError::Decode(format!("{field} overflows")));
    }
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&word[WORD - 8..]);
    Ok(u64::from_be_bytes(tail))
}

fn decode_string(data: &[u8], offset: u64) -> Result<String, LedgerError> {
    let offset = usize::try_from(offset)
        .map_err(|_| LedgerError::Decode("string offset overflows".to_string()))?;
    if offset % WORD != 0 {
        return Err(LedgerError::Decode("string offset is not word aligned".to_string()));
    }

    let length = small_uint(&word_at(data, offset / WORD)?, "string length")?;
    let length = usize::try_from(length)
        .map_err(|_| LedgerError::Decode("string length overflows".to_string()))?;

    let bytes = offset
        .checked_add(WORD)
        .and_then(|start| Some(start..start.checked_add(length)?))
        .and_then(|range| data.get(range))
        .ok_or_else(|| LedgerError::Decode("string runs past end of data".to_string()))?;

    String::from_utf8(bytes.to_vec())
        .map_err(|_| LedgerError::Decode("metadataURI is not UTF-8".to_string()))
}

// ============================================================================
// JSON-RPC client
// ============================================================================

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    fn is_revert(&self) -> bool {
        self.code == EXECUTION_REVERTED || self.message.to_ascii_lowercase().contains("revert")
    }
}

/// Ledger backed by an Ethereum JSON-RPC endpoint
pub struct RpcAgentLedger {
    client: Client,
    rpc_url: String,
    contract_address: WalletAddress,
    request_id: AtomicU64,
}

impl RpcAgentLedger {
    pub fn new(
        rpc_url: impl Into<String>,
        contract_address: WalletAddress,
        timeout: Duration,
    ) -> Result<Self, LedgerError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            rpc_url: rpc_url.into(),
            contract_address,
            request_id: AtomicU64::new(1),
        })
    }

    async fn eth_call(&self, calldata: &[u8]) -> Result<Option<Vec<u8>>, LedgerError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = RpcRequest {
            jsonrpc: "2.0",
            id,
            method: "eth_call",
            params: serde_json::json!([
                {
                    "to": self.contract_address.as_str(),
                    "data": format!("0x{}", hex::encode(calldata)),
                },
                "latest"
            ]),
        };

        debug!(id, contract = %self.contract_address, "Ledger eth_call");

        let response: RpcResponse = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = response.error {
            if err.is_revert() {
                return Ok(None);
            }
            return Err(LedgerError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        let result = response
            .result
            .ok_or_else(|| LedgerError::Decode("response has neither result nor error".to_string()))?;
        let digits = result.strip_prefix("0x").unwrap_or(&result);
        let bytes = hex::decode(digits)
            .map_err(|e| LedgerError::Decode(format!("result is not hex: {e}")))?;
        Ok(Some(bytes))
    }
}

#[async_trait]
impl AgentLedger for RpcAgentLedger {
    async fn get_agent(&self, agent_id: &AgentId) -> Result<Option<ChainAgent>, LedgerError> {
        match self.eth_call(&encode_get_agent(agent_id)).await? {
            Some(data) => decode_get_agent(agent_id, &data),
            None => Ok(None),
        }
    }
}

// ============================================================================
// Fixed ledger
// ============================================================================

/// In-process ledger with a fixed set of agents, for tests and local runs
/// without a chain
#[derive(Debug, Default)]
pub struct StaticAgentLedger {
    agents: HashMap<AgentId, ChainAgent>,
    unreachable: bool,
}

impl StaticAgentLedger {
    pub fn new(agents: impl IntoIterator<Item = ChainAgent>) -> Self {
        Self {
            agents: agents.into_iter().map(|a| (a.agent_id, a)).collect(),
            unreachable: false,
        }
    }

    /// Every lookup fails with a transport error
    pub fn unreachable() -> Self {
        Self {
            agents: HashMap::new(),
            unreachable: true,
        }
    }
}

#[async_trait]
impl AgentLedger for StaticAgentLedger {
    async fn get_agent(&self, agent_id: &AgentId) -> Result<Option<ChainAgent>, LedgerError> {
        if self.unreachable {
            return Err(LedgerError::Transport("connection refused".to_string()));
        }
        Ok(self.agents.get(agent_id).cloned())
    }
}
