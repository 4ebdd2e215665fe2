//! VerifiedAgent - directory, reputation ledger and verification records
//! for AI agents registered on-chain.
//!
//! This library provides the core services, models and HTTP handlers; the
//! binary wires them to Postgres, Redis and the registry contract.

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::Config;
pub use error::AppError;

use services::{
    AgentCache, AgentDirectoryService, AgentLedger, AgentStore, AuthError, JwtVerifier,
    RateLimitConfig, RateLimiterService, RegistrationService, ReputationService,
    VerificationRecorder,
};

/// Application state shared across handlers
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn AgentStore>,
    pub cache: Option<Arc<dyn AgentCache>>,
    pub ledger: Option<Arc<dyn AgentLedger>>,
    pub auth: JwtVerifier,
    pub rate_limiter: RateLimiterService,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn AgentStore>,
        cache: Option<Arc<dyn AgentCache>>,
        ledger: Option<Arc<dyn AgentLedger>>,
    ) -> Result<Self, AuthError> {
        let auth = JwtVerifier::new(&config.jwt_secret)?;
        let rate_limiter = RateLimiterService::new(RateLimitConfig {
            max_requests: config.rate_limit_max_requests,
            window_secs: config.rate_limit_window_secs,
        });

        Ok(Self {
            config,
            store,
            cache,
            ledger,
            auth,
            rate_limiter,
        })
    }

    pub fn directory(&self) -> AgentDirectoryService {
        let mut directory = AgentDirectoryService::new(Arc::clone(&self.store));
        if let Some(cache) = &self.cache {
            directory = directory.with_cache(Arc::clone(cache), self.config.agent_cache_ttl());
        }
        if let Some(ledger) = &self.ledger {
            directory = directory.with_ledger(Arc::clone(ledger));
        }
        directory
    }

    pub fn reputation(&self) -> ReputationService {
        ReputationService::new(Arc::clone(&self.store))
    }

    pub fn verifications(&self) -> VerificationRecorder {
        VerificationRecorder::new(Arc::clone(&self.store))
    }

    pub fn registrations(&self) -> RegistrationService {
        RegistrationService::new(Arc::clone(&self.store))
    }
}
