pub mod agent_cache;
pub mod agent_store;
pub mod auth;
pub mod directory;
pub mod ledger;
pub mod memory_store;
pub mod rate_limiter;
pub mod registration;
pub mod reputation;
pub mod verification;


#[cfg(test)]
mod reputation_tests;

pub use agent_cache::{AgentCache, CacheError, InMemoryAgentCache, RedisAgentCache};
pub use agent_store::{AgentStore, PgAgentStore, ReputationUnit, StoreError};
pub use auth::{
    issue_token, AuthClaims, AuthError, AuthenticatedCaller, JwtVerifier, ORACLE_ROLE,
};
pub use directory::{AgentDirectoryService, DirectoryError, AGENT_CACHE_TTL};
pub use ledger::{AgentLedger, LedgerError, RpcAgentLedger, StaticAgentLedger};
pub use memory_store::InMemoryAgentStore;
pub use rate_limiter::{RateLimitConfig, RateLimitError, RateLimiterService};
pub use registration::{RegistrationError, RegistrationService};
pub use reputation::{
    clamp_score, ReputationAdjustment, ReputationError, ReputationService, API_UPDATE_REASON,
    REPUTATION_HISTORY_LIMIT,
};
pub use verification::{VerificationError, VerificationRecorder, VERIFICATION_HISTORY_LIMIT};
