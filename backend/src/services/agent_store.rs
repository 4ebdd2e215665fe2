//! Agent Store
//!
//! Persistence seam shared by the directory, the reputation ledger and the
//! verification recorder. `PgAgentStore` is the production backend; the
//! in-memory backend lives in `memory_store`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;

use crate::models::{
    Agent, AgentFilter, AgentId, AgentMetadata, AgentStats, NewAgent, PageRequest,
    PendingRegistration, ReputationHistoryEntry, VerificationRecord, VerificationResult,
};

/// Postgres error code for foreign key violations
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Agent not found: {0}")]
    AgentNotFound(AgentId),

    #[error("{0}")]
    Conflict(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// A single agent's reputation read-modify-write, held open until
/// `commit`. Dropping the unit without committing discards every write
/// made through it, and the agent stays locked against other units for the
/// unit's whole lifetime.
#[async_trait]
pub trait ReputationUnit: Send {
    fn agent_id(&self) -> &AgentId;

    /// Score as read when the unit was opened
    fn current_score(&self) -> i32;

    async fn write_score(&mut self, score: i32) -> Result<(), StoreError>;

    async fn append_history(
        &mut self,
        score: i32,
        delta: i64,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<ReputationHistoryEntry, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Relational store for agents and their append-only records
#[async_trait]
pub trait AgentStore: Send + Sync {
    /// Cheap round trip used by the health probe
    async fn ping(&self) -> Result<(), StoreError>;

    /// Fails with `Conflict` when the id is already taken
    async fn insert_agent(&self, agent: &NewAgent, at: DateTime<Utc>) -> Result<Agent, StoreError>;

    async fn fetch_agent(&self, agent_id: &AgentId) -> Result<Option<Agent>, StoreError>;

    async fn fetch_stats(&self, agent_id: &AgentId) -> Result<Option<AgentStats>, StoreError>;

    async fn put_stats(&self, agent_id: &AgentId, stats: &AgentStats) -> Result<(), StoreError>;

    /// One page of matching agents, highest score first, plus the total
    /// number of matches
    async fn list_agents(
        &self,
        filter: &AgentFilter,
        page: &PageRequest,
        now: DateTime<Utc>,
    ) -> Result<(Vec<(Agent, Option<AgentStats>)>, i64), StoreError>;

    /// Newest first
    async fn recent_verifications(
        &self,
        agent_id: &AgentId,
        limit: i64,
    ) -> Result<Vec<VerificationRecord>, StoreError>;

    /// Newest first
    async fn reputation_history(
        &self,
        agent_id: &AgentId,
        limit: i64,
    ) -> Result<Vec<ReputationHistoryEntry>, StoreError>;

    /// Lock the agent's score for an atomic adjustment. `None` when the
    /// agent does not exist.
    async fn begin_reputation_unit(
        &self,
        agent_id: &AgentId,
    ) -> Result<Option<Box<dyn ReputationUnit>>, StoreError>;

    /// Fails with `AgentNotFound` when the agent does not exist
    async fn insert_verification(
        &self,
        agent_id: &AgentId,
        result: &VerificationResult,
        at: DateTime<Utc>,
    ) -> Result<VerificationRecord, StoreError>;

    async fn mark_verified(&self, agent_id: &AgentId, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Fails with `Conflict` when the agent is already registered or
    /// already pending
    async fn insert_pending_registration(
        &self,
        registration: &PendingRegistration,
    ) -> Result<(), StoreError>;
}

// ============================================================================
// Postgres
// ============================================================================

const AGENT_COLUMNS: &str =
    "a.agent_id, a.owner, a.metadata, a.reputation_score, a.status, a.last_verified, a.created_at";

/// Filter shared by the listing and its count. Binds: $1 status,
/// $2 min score, $3 skill, $4 verified-since.
const LISTING_WHERE: &str = r#"
    WHERE a.status = $1
      AND ($2::INTEGER IS NULL OR a.reputation_score >= $2)
      AND ($3::TEXT IS NULL OR a.metadata -> 'skills' ? $3)
      AND ($4::TIMESTAMPTZ IS NULL OR a.last_verified > $4)
"#;

/// Postgres-backed store
#[derive(Debug, Clone)]
pub struct PgAgentStore {
    pool: PgPool,
}

impl PgAgentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AgentStore for PgAgentStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_agent(&self, agent: &NewAgent, at: DateTime<Utc>) -> Result<Agent, StoreError> {
        let metadata = metadata_to_json(&agent.metadata)?;

        let result = sqlx::query(
            r#"
            INSERT INTO agents (agent_id, owner, metadata, reputation_score, status, created_at)
            VALUES ($1, $2, $3, 0, $4, $5)
            ON CONFLICT (agent_id) DO NOTHING
            "#,
        )
        .bind(agent.agent_id.to_string())
        .bind(agent.owner.as_str())
        .bind(&metadata)
        .bind(agent.status.as_str())
        .bind(at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "Agent already exists: {}",
                agent.agent_id
            )));
        }

        Ok(Agent {
            agent_id: agent.agent_id,
            owner: agent.owner.clone(),
            metadata: agent.metadata.clone(),
            reputation_score: 0,
            status: agent.status,
            last_verified: None,
            created_at: at,
        })
    }

    async fn fetch_agent(&self, agent_id: &AgentId) -> Result<Option<Agent>, StoreError> {
        let row = sqlx::query_as::<_, AgentRow>(&format!(
            "SELECT {AGENT_COLUMNS} FROM agents a WHERE a.agent_id = $1"
        ))
        .bind(agent_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Agent::try_from).transpose()
    }

    async fn fetch_stats(&self, agent_id: &AgentId) -> Result<Option<AgentStats>, StoreError> {
        let row = sqlx::query_as::<_, StatsRow>(
            r#"
            SELECT total_jobs, completed_jobs, rating
            FROM agent_stats
            WHERE agent_id = $1
            "#,
        )
        .bind(agent_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(StatsRow::into_stats))
    }

    async fn put_stats(&self, agent_id: &AgentId, stats: &AgentStats) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO agent_stats (agent_id, total_jobs, completed_jobs, rating)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (agent_id) DO UPDATE
            SET total_jobs = $2, completed_jobs = $3, rating = $4
            "#,
        )
        .bind(agent_id.to_string())
        .bind(stats.total_jobs)
        .bind(stats.completed_jobs)
        .bind(stats.rating)
        .execute(&self.pool)
        .await
        .map_err(|e| map_missing_agent(e, agent_id))?;

        Ok(())
    }

    async fn list_agents(
        &self,
        filter: &AgentFilter,
        page: &PageRequest,
        now: DateTime<Utc>,
    ) -> Result<(Vec<(Agent, Option<AgentStats>)>, i64), StoreError> {
        let verified_since = filter.verified_since(now);

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM agents a {LISTING_WHERE}"
        ))
        .bind(filter.status.as_str())
        .bind(filter.min_reputation)
        .bind(filter.skill.as_deref())
        .bind(verified_since)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query_as::<_, AgentWithStatsRow>(&format!(
            r#"
            SELECT {AGENT_COLUMNS}, s.total_jobs, s.completed_jobs, s.rating
            FROM agents a
            LEFT JOIN agent_stats s ON s.agent_id = a.agent_id
            {LISTING_WHERE}
            ORDER BY a.reputation_score DESC, a.agent_id ASC
            LIMIT $5 OFFSET $6
            "#
        ))
        .bind(filter.status.as_str())
        .bind(filter.min_reputation)
        .bind(filter.skill.as_deref())
        .bind(verified_since)
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let agents = rows
            .into_iter()
            .map(|row| {
                let stats = row.stats.into_stats();
                Agent::try_from(row.agent).map(|agent| (agent, stats))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok((agents, total))
    }

    async fn recent_verifications(
        &self,
        agent_id: &AgentId,
        limit: i64,
    ) -> Result<Vec<VerificationRecord>, StoreError> {
        let rows = sqlx::query_as::<_, VerificationRow>(
            r#"
            SELECT id, agent_id, score, passed, report_uri, checks, recorded_at
            FROM verifications
            WHERE agent_id = $1
            ORDER BY recorded_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(agent_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(VerificationRecord::try_from).collect()
    }

    async fn reputation_history(
        &self,
        agent_id: &AgentId,
        limit: i64,
    ) -> Result<Vec<ReputationHistoryEntry>, StoreError> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT id, agent_id, score, delta, reason, recorded_at
            FROM reputation_history
            WHERE agent_id = $1
            ORDER BY recorded_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(agent_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ReputationHistoryEntry::try_from).collect()
    }

    async fn begin_reputation_unit(
        &self,
        agent_id: &AgentId,
    ) -> Result<Option<Box<dyn ReputationUnit>>, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Row lock serializes concurrent adjustments of the same agent
        let current: Option<i32> = sqlx::query_scalar(
            r#"
            SELECT reputation_score
            FROM agents
            WHERE agent_id = $1
            FOR UPDATE
            "#,
        )
        .bind(agent_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;

        Ok(current.map(|current_score| {
            Box::new(PgReputationUnit {
                tx,
                agent_id: *agent_id,
                current_score,
            }) as Box<dyn ReputationUnit>
        }))
    }

    async fn insert_verification(
        &self,
        agent_id: &AgentId,
        result: &VerificationResult,
        at: DateTime<Utc>,
    ) -> Result<VerificationRecord, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO verifications (agent_id, score, passed, report_uri, checks, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(agent_id.to_string())
        .bind(result.score)
        .bind(result.passed)
        .bind(&result.report_uri)
        .bind(&result.checks)
        .bind(at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_missing_agent(e, agent_id))?;

        Ok(VerificationRecord {
            id,
            agent_id: *agent_id,
            score: result.score,
            passed: result.passed,
            report_uri: result.report_uri.clone(),
            checks: result.checks.clone(),
            timestamp: at,
        })
    }

    async fn mark_verified(&self, agent_id: &AgentId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE agents SET last_verified = $1 WHERE agent_id = $2")
            .bind(at)
            .bind(agent_id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AgentNotFound(*agent_id));
        }
        Ok(())
    }

    async fn insert_pending_registration(
        &self,
        registration: &PendingRegistration,
    ) -> Result<(), StoreError> {
        let metadata = metadata_to_json(&registration.metadata)?;
        let agent_id = registration.agent_id.to_string();

        let mut tx = self.pool.begin().await?;

        let registered: Option<String> =
            sqlx::query_scalar("SELECT agent_id FROM agents WHERE agent_id = $1")
                .bind(&agent_id)
                .fetch_optional(&mut *tx)
                .await?;

        if registered.is_some() {
            return Err(StoreError::Conflict(format!(
                "Agent already registered: {agent_id}"
            )));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO pending_registrations
                (agent_id, owner, metadata, tier, submitted_by, submitted_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (agent_id) DO NOTHING
            "#,
        )
        .bind(&agent_id)
        .bind(registration.owner.as_str())
        .bind(&metadata)
        .bind(i16::from(registration.tier))
        .bind(&registration.submitted_by)
        .bind(registration.submitted_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "Registration already pending: {agent_id}"
            )));
        }

        tx.commit().await?;
        Ok(())
    }
}

/// Open transaction holding the agent's row lock
struct PgReputationUnit {
    tx: Transaction<'static, Postgres>,
    agent_id: AgentId,
    current_score: i32,
}

#[async_trait]
impl ReputationUnit for PgReputationUnit {
    fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    fn current_score(&self) -> i32 {
        self.current_score
    }

    async fn write_score(&mut self, score: i32) -> Result<(), StoreError> {
        sqlx::query("UPDATE agents SET reputation_score = $1 WHERE agent_id = $2")
            .bind(score)
            .bind(self.agent_id.to_string())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn append_history(
        &mut self,
        score: i32,
        delta: i64,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<ReputationHistoryEntry, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO reputation_history (agent_id, score, delta, reason, recorded_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(self.agent_id.to_string())
        .bind(score)
        .bind(delta)
        .bind(reason)
        .bind(at)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(ReputationHistoryEntry {
            id,
            agent_id: self.agent_id,
            score,
            delta,
            reason: reason.to_string(),
            timestamp: at,
        })
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

fn metadata_to_json(metadata: &AgentMetadata) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(metadata).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn map_missing_agent(err: sqlx::Error, agent_id: &AgentId) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(FOREIGN_KEY_VIOLATION) => {
            StoreError::AgentNotFound(*agent_id)
        }
        _ => StoreError::Database(err),
    }
}

fn parse_agent_id(raw: &str) -> Result<AgentId, StoreError> {
    raw.parse().map_err(StoreError::Corrupt)
}

/// Internal row type for agent queries
#[derive(Debug, sqlx::FromRow)]
struct AgentRow {
    agent_id: String,
    owner: String,
    metadata: serde_json::Value,
    reputation_score: i32,
    status: String,
    last_verified: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AgentRow> for Agent {
    type Error = StoreError;

    fn try_from(row: AgentRow) -> Result<Self, Self::Error> {
        Ok(Agent {
            agent_id: parse_agent_id(&row.agent_id)?,
            owner: row.owner.parse().map_err(StoreError::Corrupt)?,
            metadata: serde_json::from_value(row.metadata).map_err(|e| {
                StoreError::Corrupt(format!("metadata of {}: {e}", row.agent_id))
            })?,
            reputation_score: row.reputation_score,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            last_verified: row.last_verified,
            created_at: row.created_at,
        })
    }
}

/// Internal row type for stats queries; nullable to fit the listing's
/// LEFT JOIN
#[derive(Debug, sqlx::FromRow)]
struct StatsRow {
    total_jobs: Option<i64>,
    completed_jobs: Option<i64>,
    rating: Option<f64>,
}

impl StatsRow {
    fn into_stats(self) -> Option<AgentStats> {
        match (self.total_jobs, self.completed_jobs) {
            (Some(total_jobs), Some(completed_jobs)) => Some(AgentStats {
                total_jobs,
                completed_jobs,
                rating: self.rating,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AgentWithStatsRow {
    #[sqlx(flatten)]
    agent: AgentRow,
    #[sqlx(flatten)]
    stats: StatsRow,
}

/// Internal row type for verification queries
#[derive(Debug, sqlx::FromRow)]
struct VerificationRow {
    id: i64,
    agent_id: String,
    score: i32,
    passed: bool,
    report_uri: String,
    checks: serde_json::Value,
    recorded_at: DateTime<Utc>,
}

impl TryFrom<VerificationRow> for VerificationRecord {
    type Error = StoreError;

    fn try_from(row: VerificationRow) -> Result<Self, Self::Error> {
        Ok(VerificationRecord {
            id: row.id,
            agent_id: parse_agent_id(&row.agent_id)?,
            score: row.score,
            passed: row.passed,
            report_uri: row.report_uri,
            checks: row.checks,
            timestamp: row.recorded_at,
        })
    }
}

/// Internal row type for reputation history queries
#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
    id: i64,
    agent_id: String,
    score: i32,
    delta: i64,
    reason: String,
    recorded_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for ReputationHistoryEntry {
    type Error = StoreError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        Ok(ReputationHistoryEntry {
            id: row.id,
            agent_id: parse_agent_id(&row.agent_id)?,
            score: row.score,
            delta: row.delta,
            reason: row.reason,
            timestamp: row.recorded_at,
        })
    }
}
