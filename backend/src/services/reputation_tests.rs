//! Reputation ledger tests
//!
//! Run against the in-memory store; the Postgres variants at the bottom
//! need DATABASE_URL and are ignored by default.

#[cfg(test)]
mod ledger_properties {
    use std::sync::Arc;

    use proptest::prelude::*;

    use crate::models::{MAX_REPUTATION, MIN_REPUTATION};
    use crate::services::{
        clamp_score, AgentStore, InMemoryAgentStore, ReputationError, ReputationService,
        API_UPDATE_REASON,
    };
    use crate::test_support::{agent_id, seed_agent};

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime")
    }

    fn delta_strategy() -> impl Strategy<Value = i64> {
        prop_oneof![
            -20_000i64..20_000,
            Just(i64::MAX),
            Just(i64::MIN),
            Just(0),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        /// Score stays in bounds and every call leaves exactly one history row
        #[test]
        fn score_bounded_and_history_complete(
            initial in MIN_REPUTATION..=MAX_REPUTATION,
            deltas in prop::collection::vec(delta_strategy(), 1..40)
        ) {
            let (scores, history, final_score) = runtime().block_on(async {
                let store = Arc::new(InMemoryAgentStore::new());
                let id = seed_agent(store.as_ref(), 1, initial, &[]).await;
                let service = ReputationService::new(store.clone());

                let mut scores = Vec::new();
                for delta in &deltas {
                    let adjustment = service.adjust_reputation(&id, *delta).await.unwrap();
                    scores.push((adjustment.previous_score, adjustment.new_score));
                }
                let history = service.history(&id).await.unwrap();
                let agent = store.fetch_agent(&id).await.unwrap().unwrap();
                (scores, history, agent.reputation_score)
            });

            prop_assert_eq!(history.len(), deltas.len());
            for (delta, (previous, new)) in deltas.iter().zip(&scores) {
                prop_assert!((MIN_REPUTATION..=MAX_REPUTATION).contains(new));
                prop_assert_eq!(*new, clamp_score(*previous, *delta));
            }
            // History is newest first
            prop_assert_eq!(history[0].score, final_score);
            prop_assert!(history.iter().all(|e| e.reason == API_UPDATE_REASON));
        }
    }

    #[tokio::test]
    async fn test_unknown_agent_is_not_found() {
        let store = Arc::new(InMemoryAgentStore::new());
        let service = ReputationService::new(store);

        let err = service.adjust_reputation(&agent_id(9), 10).await.unwrap_err();
        assert!(matches!(err, ReputationError::AgentNotFound(id) if id == agent_id(9)));
    }

    #[tokio::test]
    async fn test_history_for_unknown_agent_is_empty() {
        let store = Arc::new(InMemoryAgentStore::new());
        let service = ReputationService::new(store);
        assert!(service.history(&agent_id(9)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_history_append_leaves_score_untouched() {
        let store = Arc::new(InMemoryAgentStore::new());
        let id = seed_agent(store.as_ref(), 1, 5_000, &[]).await;
        let service = ReputationService::new(store.clone());
        service.adjust_reputation(&id, 100).await.unwrap();

        store.fail_next_history_append();
        let err = service.adjust_reputation(&id, 2_500).await.unwrap_err();
        assert!(matches!(err, ReputationError::Store(_)));

        let agent = store.fetch_agent(&id).await.unwrap().unwrap();
        assert_eq!(agent.reputation_score, 5_100);
        let history = service.history(&id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].score, 5_100);

        // The store recovers once the fault is consumed
        let adjustment = service.adjust_reputation(&id, 2_500).await.unwrap();
        assert_eq!(adjustment.new_score, 7_600);
    }

    #[tokio::test]
    async fn test_history_records_requested_delta_not_applied_delta() {
        let store = Arc::new(InMemoryAgentStore::new());
        let id = seed_agent(store.as_ref(), 1, 9_900, &[]).await;
        let service = ReputationService::new(store);

        let adjustment = service.adjust_reputation(&id, 500).await.unwrap();
        assert_eq!(adjustment.new_score, MAX_REPUTATION);
        assert_eq!(adjustment.entry.delta, 500);
        assert_eq!(adjustment.entry.score, MAX_REPUTATION);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adjustments_serialize() {
        let store = Arc::new(InMemoryAgentStore::new());
        let initial = 5_000;
        let id = seed_agent(store.as_ref(), 1, initial, &[]).await;
        let service = ReputationService::new(store.clone());

        let deltas: Vec<i64> = (0..32)
            .map(|i| if i % 3 == 0 { -900 } else { 700 })
            .collect();

        let handles: Vec<_> = deltas
            .iter()
            .map(|delta| {
                let service = service.clone();
                let delta = *delta;
                tokio::spawn(async move { service.adjust_reputation(&id, delta).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let mut history = service.history(&id).await.unwrap();
        assert_eq!(history.len(), deltas.len());

        // Replaying the committed order must reproduce every recorded score
        history.sort_by_key(|e| e.id);
        let mut score = initial;
        for entry in &history {
            score = clamp_score(score, entry.delta);
            assert_eq!(entry.score, score);
        }

        let agent = store.fetch_agent(&id).await.unwrap().unwrap();
        assert_eq!(agent.reputation_score, score);
    }
}

#[cfg(test)]
mod postgres_tests {
    use std::sync::Arc;

    use chrono::Utc;
    use sqlx::PgPool;

    use crate::models::{AgentId, NewAgent, WalletAddress};
    use crate::services::{AgentStore, PgAgentStore, ReputationService};

    /// Returns None when no database is configured
    async fn try_create_test_pool() -> Option<PgPool> {
        let _ = dotenvy::from_filename("backend/.env");
        let _ = dotenvy::dotenv();

        let database_url = std::env::var("DATABASE_URL").ok()?;
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(8)
            .connect(&database_url)
            .await
            .ok()?;
        sqlx::migrate!("./migrations").run(&pool).await.ok()?;
        Some(pool)
    }

    fn random_agent_id() -> AgentId {
        let mut bytes = [0u8; 32];
        bytes[..16].copy_from_slice(uuid::Uuid::new_v4().as_bytes());
        bytes[16..].copy_from_slice(uuid::Uuid::new_v4().as_bytes());
        AgentId::from_bytes(bytes)
    }

    async fn cleanup(pool: &PgPool, agent_id: &AgentId) {
        for table in ["reputation_history", "verifications", "agent_stats", "agents"] {
            let _ = sqlx::query(&format!("DELETE FROM {table} WHERE agent_id = $1"))
                .bind(agent_id.to_string())
                .execute(pool)
                .await;
        }
    }

    #[ignore]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adjustments_hold_row_lock() {
        let Some(pool) = try_create_test_pool().await else {
            eprintln!("Skipping test: database not available");
            return;
        };
        let store = Arc::new(PgAgentStore::new(pool.clone()));
        let id = random_agent_id();
        store
            .insert_agent(
                &NewAgent::new(id, WalletAddress::from_bytes([7; 20]), Default::default()),
                Utc::now(),
            )
            .await
            .expect("insert agent");

        let service = ReputationService::new(store.clone());
        let handles: Vec<_> = (0..20)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move { service.adjust_reputation(&id, 100).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().expect("adjust");
        }

        let agent = store.fetch_agent(&id).await.unwrap().unwrap();
        assert_eq!(agent.reputation_score, 2_000);
        let history = service.history(&id).await.unwrap();
        assert_eq!(history.len(), 20);

        cleanup(&pool, &id).await;
    }

    #[ignore]
    #[tokio::test]
    async fn dropped_unit_rolls_back() {
        let Some(pool) = try_create_test_pool().await else {
            eprintln!("Skipping test: database not available");
            return;
        };
        let store = PgAgentStore::new(pool.clone());
        let id = random_agent_id();
        store
            .insert_agent(
                &NewAgent::new(id, WalletAddress::from_bytes([7; 20]), Default::default()),
                Utc::now(),
            )
            .await
            .expect("insert agent");

        {
            let mut unit = store.begin_reputation_unit(&id).await.unwrap().unwrap();
            unit.write_score(9_000).await.unwrap();
            unit.append_history(9_000, 9_000, "test", Utc::now()).await.unwrap();
        }

        let agent = store.fetch_agent(&id).await.unwrap().unwrap();
        assert_eq!(agent.reputation_score, 0);
        assert!(store.reputation_history(&id, 10).await.unwrap().is_empty());

        cleanup(&pool, &id).await;
    }
}
