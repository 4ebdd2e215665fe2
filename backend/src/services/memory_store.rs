//! In-process `AgentStore`
//!
//! Backs the service and HTTP tests and local runs without Postgres.
//! A reputation unit holds the store-wide lock until it commits or drops,
//! so adjustments are serialized exactly like the row lock in Postgres.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::agent_store::{AgentStore, ReputationUnit, StoreError};
use crate::models::{
    Agent, AgentFilter, AgentId, AgentStats, NewAgent, PageRequest, PendingRegistration,
    ReputationHistoryEntry, VerificationRecord, VerificationResult,
};

#[derive(Debug, Default)]
struct MemoryState {
    agents: BTreeMap<AgentId, Agent>,
    stats: HashMap<AgentId, AgentStats>,
    history: Vec<ReputationHistoryEntry>,
    verifications: Vec<VerificationRecord>,
    pending: HashMap<AgentId, PendingRegistration>,
    next_history_id: i64,
    next_verification_id: i64,
}

/// One-shot failure switches for exercising error paths
#[derive(Debug, Default)]
struct Faults {
    offline: AtomicBool,
    history_append: AtomicBool,
    mark_verified: AtomicBool,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryAgentStore {
    state: Arc<Mutex<MemoryState>>,
    faults: Arc<Faults>,
}

impl InMemoryAgentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation fails with `Unavailable` while set
    pub fn set_offline(&self, offline: bool) {
        self.faults.offline.store(offline, Ordering::SeqCst);
    }

    /// The next history append inside a reputation unit fails
    pub fn fail_next_history_append(&self) {
        self.faults.history_append.store(true, Ordering::SeqCst);
    }

    /// The next `mark_verified` call fails
    pub fn fail_next_mark_verified(&self) {
        self.faults.mark_verified.store(true, Ordering::SeqCst);
    }

    /// All pending registrations, for assertions
    pub async fn pending_registrations(&self) -> Vec<PendingRegistration> {
        let state = self.state.lock().await;
        state.pending.values().cloned().collect()
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.faults.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store offline".to_string()));
        }
        Ok(())
    }
}

fn take_fault(flag: &AtomicBool, what: &str) -> Result<(), StoreError> {
    if flag.swap(false, Ordering::SeqCst) {
        return Err(StoreError::Unavailable(format!("injected {what} failure")));
    }
    Ok(())
}

fn matches_filter(agent: &Agent, filter: &AgentFilter, now: DateTime<Utc>) -> bool {
    if agent.status != filter.status {
        return false;
    }
    if let Some(min) = filter.min_reputation {
        if agent.reputation_score < min {
            return false;
        }
    }
    if let Some(skill) = &filter.skill {
        if !agent.metadata.has_skill(skill) {
            return false;
        }
    }
    match filter.verified_since(now) {
        Some(since) => agent.last_verified.is_some_and(|at| at > since),
        None => true,
    }
}

#[async_trait]
impl AgentStore for InMemoryAgentStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.check_online()
    }

    async fn insert_agent(&self, agent: &NewAgent, at: DateTime<Utc>) -> Result<Agent, StoreError> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        if state.agents.contains_key(&agent.agent_id) {
            return Err(StoreError::Conflict(format!(
                "Agent already exists: {}",
                agent.agent_id
            )));
        }

        let created = Agent {
            agent_id: agent.agent_id,
            owner: agent.owner.clone(),
            metadata: agent.metadata.clone(),
            reputation_score: 0,
            status: agent.status,
            last_verified: None,
            created_at: at,
        };
        state.agents.insert(agent.agent_id, created.clone());
        Ok(created)
    }

    async fn fetch_agent(&self, agent_id: &AgentId) -> Result<Option<Agent>, StoreError> {
        self.check_online()?;
        let state = self.state.lock().await;
        Ok(state.agents.get(agent_id).cloned())
    }

    async fn fetch_stats(&self, agent_id: &AgentId) -> Result<Option<AgentStats>, StoreError> {
        self.check_online()?;
        let state = self.state.lock().await;
        Ok(state.stats.get(agent_id).cloned())
    }

    async fn put_stats(&self, agent_id: &AgentId, stats: &AgentStats) -> Result<(), StoreError> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        if !state.agents.contains_key(agent_id) {
            return Err(StoreError::AgentNotFound(*agent_id));
        }
        state.stats.insert(*agent_id, stats.clone());
        Ok(())
    }

    async fn list_agents(
        &self,
        filter: &AgentFilter,
        page: &PageRequest,
        now: DateTime<Utc>,
    ) -> Result<(Vec<(Agent, Option<AgentStats>)>, i64), StoreError> {
        self.check_online()?;
        let state = self.state.lock().await;

        // BTreeMap iteration is already agent_id ascending; the stable sort
        // keeps that as the tie-break
        let mut matching: Vec<&Agent> = state
            .agents
            .values()
            .filter(|agent| matches_filter(agent, filter, now))
            .collect();
        matching.sort_by(|a, b| b.reputation_score.cmp(&a.reputation_score));

        let total = matching.len() as i64;
        let rows = matching
            .into_iter()
            .skip(page.offset().try_into().unwrap_or(usize::MAX))
            .take(page.limit.try_into().unwrap_or(0))
            .map(|agent| (agent.clone(), state.stats.get(&agent.agent_id).cloned()))
            .collect();

        Ok((rows, total))
    }

    async fn recent_verifications(
        &self,
        agent_id: &AgentId,
        limit: i64,
    ) -> Result<Vec<VerificationRecord>, StoreError> {
        self.check_online()?;
        let state = self.state.lock().await;
        let mut records: Vec<VerificationRecord> = state
            .verifications
            .iter()
            .filter(|r| &r.agent_id == agent_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        records.truncate(limit.try_into().unwrap_or(0));
        Ok(records)
    }

    async fn reputation_history(
        &self,
        agent_id: &AgentId,
        limit: i64,
    ) -> Result<Vec<ReputationHistoryEntry>, StoreError> {
        self.check_online()?;
        let state = self.state.lock().await;
        let mut entries: Vec<ReputationHistoryEntry> = state
            .history
            .iter()
            .filter(|e| &e.agent_id == agent_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        entries.truncate(limit.try_into().unwrap_or(0));
        Ok(entries)
    }

    async fn begin_reputation_unit(
        &self,
        agent_id: &AgentId,
    ) -> Result<Option<Box<dyn ReputationUnit>>, StoreError> {
        self.check_online()?;
        let guard = Arc::clone(&self.state).lock_owned().await;

        let Some(current_score) = guard.agents.get(agent_id).map(|a| a.reputation_score) else {
            return Ok(None);
        };

        Ok(Some(Box::new(MemoryReputationUnit {
            guard,
            faults: Arc::clone(&self.faults),
            agent_id: *agent_id,
            current_score,
            staged_score: None,
            staged_history: Vec::new(),
        })))
    }

    async fn insert_verification(
        &self,
        agent_id: &AgentId,
        result: &VerificationResult,
        at: DateTime<Utc>,
    ) -> Result<VerificationRecord, StoreError> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        if !state.agents.contains_key(agent_id) {
            return Err(StoreError::AgentNotFound(*agent_id));
        }

        state.next_verification_id += 1;
        let record = VerificationRecord {
            id: state.next_verification_id,
            agent_id: *agent_id,
            score: result.score,
            passed: result.passed,
            report_uri: result.report_uri.clone(),
            checks: result.checks.clone(),
            timestamp: at,
        };
        state.verifications.push(record.clone());
        Ok(record)
    }

    async fn mark_verified(&self, agent_id: &AgentId, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.check_online()?;
        take_fault(&self.faults.mark_verified, "mark_verified")?;
        let mut state = self.state.lock().await;
        let agent = state
            .agents
            .get_mut(agent_id)
            .ok_or(StoreError::AgentNotFound(*agent_id))?;
        agent.last_verified = Some(at);
        Ok(())
    }

    async fn insert_pending_registration(
        &self,
        registration: &PendingRegistration,
    ) -> Result<(), StoreError> {
        self.check_online()?;
        let mut state = self.state.lock().await;
        let agent_id = registration.agent_id;
        if state.agents.contains_key(&agent_id) {
            return Err(StoreError::Conflict(format!(
                "Agent already registered: {agent_id}"
            )));
        }
        if state.pending.contains_key(&agent_id) {
            return Err(StoreError::Conflict(format!(
                "Registration already pending: {agent_id}"
            )));
        }
        state.pending.insert(agent_id, registration.clone());
        Ok(())
    }
}

/// Writes are staged and only applied on commit
struct MemoryReputationUnit {
    guard: OwnedMutexGuard<MemoryState>,
    faults: Arc<Faults>,
    agent_id: AgentId,
    current_score: i32,
    staged_score: Option<i32>,
    staged_history: Vec<ReputationHistoryEntry>,
}

#[async_trait]
impl ReputationUnit for MemoryReputationUnit {
    fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    fn current_score(&self) -> i32 {
        self.current_score
    }

    async fn write_score(&mut self, score: i32) -> Result<(), StoreError> {
        self.staged_score = Some(score);
        Ok(())
    }

    async fn append_history(
        &mut self,
        score: i32,
        delta: i64,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<ReputationHistoryEntry, StoreError> {
        take_fault(&self.faults.history_append, "history append")?;

        let entry = ReputationHistoryEntry {
            id: self.guard.next_history_id + self.staged_history.len() as i64 + 1,
            agent_id: self.agent_id,
            score,
            delta,
            reason: reason.to_string(),
            timestamp: at,
        };
        self.staged_history.push(entry.clone());
        Ok(entry)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryReputationUnit {
            mut guard,
            agent_id,
            staged_score,
            staged_history,
            ..
        } = *self;

        if let Some(score) = staged_score {
            let agent = guard
                .agents
                .get_mut(&agent_id)
                .ok_or(StoreError::AgentNotFound(agent_id))?;
            agent.reputation_score = score;
        }
        guard.next_history_id += staged_history.len() as i64;
        guard.history.extend(staged_history);
        Ok(())
    }
}
