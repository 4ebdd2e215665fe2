//! Shared fixtures for unit and HTTP tests

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::config::Config;
use crate::models::{AgentId, AgentMetadata, NewAgent, WalletAddress};
use crate::services::{
    issue_token, AgentCache, AgentLedger, AgentStore, AuthClaims, InMemoryAgentStore,
    ORACLE_ROLE,
};
use crate::AppState;

pub const TEST_JWT_SECRET: &str = "test-secret-for-hs256-tokens-0123456789";

pub fn agent_id(n: u8) -> AgentId {
    AgentId::from_bytes([n; 32])
}

pub fn metadata(name: &str, skills: &[&str]) -> AgentMetadata {
    AgentMetadata {
        name: Some(name.to_string()),
        skills: skills.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

/// Insert agent `n` with the given score and skills
pub async fn seed_agent(store: &dyn AgentStore, n: u8, score: i32, skills: &[&str]) -> AgentId {
    let id = agent_id(n);
    store
        .insert_agent(
            &NewAgent::new(
                id,
                WalletAddress::from_bytes([n; 20]),
                metadata(&format!("agent-{n}"), skills),
            ),
            Utc::now(),
        )
        .await
        .expect("seed agent");

    if score != 0 {
        let mut unit = store
            .begin_reputation_unit(&id)
            .await
            .expect("begin unit")
            .expect("seeded agent exists");
        unit.write_score(score).await.expect("write score");
        unit.commit().await.expect("commit");
    }
    id
}

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://unused".to_string(),
        database_max_connections: 1,
        host: "127.0.0.1".to_string(),
        port: 0,
        redis_url: None,
        agent_cache_ttl_secs: 300,
        rpc_url: None,
        contract_address: None,
        ledger_timeout_secs: 1,
        jwt_secret: TEST_JWT_SECRET.to_string(),
        require_oracle_role: true,
        rate_limit_max_requests: 1_000,
        rate_limit_window_secs: 60,
    }
}

pub fn test_state(
    config: Config,
    store: Arc<InMemoryAgentStore>,
    cache: Option<Arc<dyn AgentCache>>,
    ledger: Option<Arc<dyn AgentLedger>>,
) -> AppState {
    AppState::new(config, store, cache, ledger).expect("test state")
}

pub fn token_with_roles(sub: &str, roles: &[&str]) -> String {
    issue_token(TEST_JWT_SECRET, &AuthClaims::new(sub, roles, Duration::hours(1)))
        .expect("issue token")
}

pub fn oracle_token() -> String {
    token_with_roles("oracle-service", &[ORACLE_ROLE])
}

pub fn caller_token() -> String {
    token_with_roles("agent-operator", &[])
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {token}"))
}
