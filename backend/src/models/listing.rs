//! Agent listing query, filter and pagination types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::agent::{AgentStatus, AgentSummary, MAX_REPUTATION, MIN_REPUTATION};
use super::verification::VERIFICATION_WINDOW_DAYS;

/// Query parameters for GET /agents, as received
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ListAgentsQuery {
    #[serde(default)]
    pub skill: Option<String>,
    #[serde(default)]
    pub min_reputation: Option<i32>,
    #[serde(default)]
    pub verified_only: Option<bool>,
    /// Exact status match (default: Active)
    #[serde(default)]
    pub status: Option<String>,
    /// 1-indexed page number (default: 1)
    #[serde(default)]
    pub page: Option<i64>,
    /// Page size (default: 20, max: 100)
    #[serde(default)]
    pub limit: Option<i64>,
}

impl ListAgentsQuery {
    /// Validate into a filter and a page request
    pub fn into_filter(self) -> Result<(AgentFilter, PageRequest), String> {
        let status = match self.status.as_deref() {
            Some(s) => s.parse::<AgentStatus>()?,
            None => AgentStatus::default(),
        };

        if let Some(min) = self.min_reputation {
            if !(MIN_REPUTATION..=MAX_REPUTATION).contains(&min) {
                return Err(format!(
                    "minReputation must be between {MIN_REPUTATION} and {MAX_REPUTATION}"
                ));
            }
        }

        let skill = match self.skill {
            Some(s) if s.trim().is_empty() => {
                return Err("skill must not be empty".to_string());
            }
            other => other,
        };

        let page = PageRequest::new(self.page, self.limit)?;

        Ok((
            AgentFilter {
                status,
                min_reputation: self.min_reputation,
                skill,
                verified_only: self.verified_only.unwrap_or(false),
            },
            page,
        ))
    }
}

/// Validated listing filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentFilter {
    pub status: AgentStatus,
    /// Inclusive lower bound on reputation score
    pub min_reputation: Option<i32>,
    /// Agent's skill list must contain this value
    pub skill: Option<String>,
    /// Only agents verified within the trailing window
    pub verified_only: bool,
}

impl AgentFilter {
    /// Earliest `lastVerified` that still passes the verified-only filter
    pub fn verified_since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.verified_only
            .then(|| now - Duration::days(VERIFICATION_WINDOW_DAYS))
    }
}

/// Validated 1-indexed page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    pub const DEFAULT_PAGE: i64 = 1;
    pub const DEFAULT_LIMIT: i64 = 20;
    pub const MAX_LIMIT: i64 = 100;

    pub fn new(page: Option<i64>, limit: Option<i64>) -> Result<Self, String> {
        let page = page.unwrap_or(Self::DEFAULT_PAGE);
        let limit = limit.unwrap_or(Self::DEFAULT_LIMIT);

        if page < 1 {
            return Err("page must be at least 1".to_string());
        }
        if !(1..=Self::MAX_LIMIT).contains(&limit) {
            return Err(format!("limit must be between 1 and {}", Self::MAX_LIMIT));
        }
        Ok(Self { page, limit })
    }

    /// Number of rows to skip
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: Self::DEFAULT_PAGE,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

/// Pagination block of a listing response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub pages: i64,
}

impl Pagination {
    pub fn new(request: PageRequest, total: i64) -> Self {
        Self {
            page: request.page,
            limit: request.limit,
            total,
            pages: (total + request.limit - 1) / request.limit,
        }
    }
}

/// Response payload for GET /agents
#[derive(Debug, Clone, Serialize)]
pub struct AgentPage {
    pub agents: Vec<AgentSummary>,
    pub pagination: Pagination,
}
