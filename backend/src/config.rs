use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,
    /// Maximum database connections in pool
    pub database_max_connections: u32,
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Redis URL for the directory cache; in-process cache when unset
    pub redis_url: Option<String>,
    /// Directory cache TTL in seconds (default: 300 = 5 minutes)
    pub agent_cache_ttl_secs: u64,
    /// JSON-RPC endpoint of the chain hosting the registry contract
    pub rpc_url: Option<String>,
    /// Registry contract address; ledger fallback is disabled when unset
    pub contract_address: Option<String>,
    /// Timeout for a single ledger RPC call in seconds
    pub ledger_timeout_secs: u64,
    /// HS256 secret for bearer tokens
    pub jwt_secret: String,
    /// Require the `oracle` role on reputation updates
    pub require_oracle_role: bool,
    /// Requests allowed per client per window
    pub rate_limit_max_requests: u32,
    /// Rate limit window in seconds
    pub rate_limit_window_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = required("DATABASE_URL")?;
        let jwt_secret = required("JWT_SECRET")?;

        Ok(Self {
            database_url,
            database_max_connections: parsed_or("DATABASE_MAX_CONNECTIONS", 10)?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parsed_or("PORT", 3000)?,
            redis_url: optional("REDIS_URL"),
            agent_cache_ttl_secs: parsed_or("AGENT_CACHE_TTL_SECS", 300)?,
            rpc_url: optional("RPC_URL"),
            contract_address: optional("CONTRACT_ADDRESS"),
            ledger_timeout_secs: parsed_or("LEDGER_TIMEOUT_SECS", 10)?,
            jwt_secret,
            require_oracle_role: parsed_or("REQUIRE_ORACLE_ROLE", true)?,
            rate_limit_max_requests: parsed_or("RATE_LIMIT_MAX_REQUESTS", 100)?,
            rate_limit_window_secs: parsed_or("RATE_LIMIT_WINDOW_SECS", 60)?,
        })
    }

    pub fn agent_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.agent_cache_ttl_secs)
    }

    pub fn ledger_timeout(&self) -> Duration {
        Duration::from_secs(self.ledger_timeout_secs)
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingEnvVar(key))
}

fn optional(key: &'static str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(key)),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parsed_or_falls_back_to_default() {
        assert_eq!(
            parsed_or::<u16>("VERIFIEDAGENT_TEST_UNSET_PORT", 3000).unwrap(),
            3000
        );
    }

    #[test]
    fn test_parsed_or_rejects_garbage() {
        env::set_var("VERIFIEDAGENT_TEST_BAD_BOOL", "maybe");
        let err = parsed_or::<bool>("VERIFIEDAGENT_TEST_BAD_BOOL", true).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue("VERIFIEDAGENT_TEST_BAD_BOOL")));
        env::remove_var("VERIFIEDAGENT_TEST_BAD_BOOL");
    }

    #[test]
    fn test_optional_ignores_blank_values() {
        env::set_var("VERIFIEDAGENT_TEST_BLANK", "  ");
        assert_eq!(optional("VERIFIEDAGENT_TEST_BLANK"), None);
        env::remove_var("VERIFIEDAGENT_TEST_BLANK");
    }
}
