//! HTTP tests for the agent directory routes
//!
//! Served from the in-memory store, so they run without Postgres.

#[cfg(test)]
mod http_integration_tests {
    use std::sync::Arc;

    use actix_web::http::StatusCode;
    use actix_web::{test, web, App};
    use serde_json::{json, Value};

    use crate::handlers::configure_routes;
    use crate::models::{AgentStatus, ChainAgent, WalletAddress};
    use crate::services::{AgentLedger, InMemoryAgentStore, StaticAgentLedger};
    use crate::test_support::{
        agent_id, bearer, caller_token, seed_agent, test_config, test_state,
    };

    async fn seeded_store(scores: &[i32]) -> Arc<InMemoryAgentStore> {
        let store = Arc::new(InMemoryAgentStore::new());
        for (i, score) in scores.iter().enumerate() {
            seed_agent(store.as_ref(), i as u8 + 1, *score, &["rust"]).await;
        }
        store
    }

    fn registration_body(n: u8) -> Value {
        json!({
            "agentId": agent_id(n).to_string(),
            "owner": WalletAddress::from_bytes([n; 20]).to_string(),
            "metadata": { "name": format!("agent-{n}"), "skills": ["rust"] },
            "tier": 1
        })
    }

    #[actix_rt::test]
    async fn test_list_agents_orders_by_reputation() {
        let store = seeded_store(&[5_000, 10_000, 0]).await;
        let state = test_state(test_config(), store, None, None);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/agents").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        let scores: Vec<i64> = body["data"]["agents"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["reputationScore"].as_i64().unwrap())
            .collect();
        assert_eq!(scores, vec![10_000, 5_000, 0]);
        assert_eq!(body["data"]["pagination"]["total"], 3);
        assert!(body["meta"]["request_id"].is_string());
    }

    #[actix_rt::test]
    async fn test_list_agents_min_reputation_filter() {
        let store = seeded_store(&[5_000, 10_000, 0]).await;
        let state = test_state(test_config(), store, None, None);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/agents?minReputation=6000")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        let agents = body["data"]["agents"].as_array().unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0]["reputationScore"], 10_000);
        assert_eq!(agents[0]["currentlyVerified"], false);
    }

    #[actix_rt::test]
    async fn test_list_agents_second_page() {
        let store = seeded_store(&[5_000, 10_000, 0]).await;
        let state = test_state(test_config(), store, None, None);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/agents?limit=1&page=2")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        let agents = body["data"]["agents"].as_array().unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0]["agentId"], agent_id(1).to_string());
        assert_eq!(body["data"]["pagination"]["pages"], 3);
        assert_eq!(body["data"]["pagination"]["page"], 2);
    }

    #[actix_rt::test]
    async fn test_list_agents_rejects_bad_query() {
        let state = test_state(test_config(), seeded_store(&[]).await, None, None);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure_routes),
        )
        .await;

        for uri in [
            "/agents?limit=0",
            "/agents?limit=101",
            "/agents?page=0",
            "/agents?minReputation=20000",
            "/agents?status=Retired",
            "/agents?sort=name",
            "/agents?limit=abc",
        ] {
            let req = test::TestRequest::get().uri(uri).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{uri}");
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["error"]["code"], "VALIDATION_ERROR", "{uri}");
        }
    }

    #[actix_rt::test]
    async fn test_get_agent_from_database() {
        let store = seeded_store(&[7_700]).await;
        let state = test_state(test_config(), store, None, None);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri(&format!("/agents/{}", agent_id(1)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["source"], "database");
        assert_eq!(body["data"]["agent"]["reputationScore"], 7_700);
        assert_eq!(body["data"]["agent"]["status"], "Active");
        assert!(body["data"]["agent"]["verifications"].is_array());
    }

    #[actix_rt::test]
    async fn test_get_agent_falls_back_to_blockchain() {
        let ledger: Arc<dyn AgentLedger> = Arc::new(StaticAgentLedger::new([ChainAgent {
            agent_id: agent_id(9),
            owner: WalletAddress::from_bytes([9; 20]),
            metadata_uri: "ipfs://agent-9".to_string(),
            reputation_score: 2_500,
            status: AgentStatus::Active,
        }]));
        let state = test_state(test_config(), seeded_store(&[]).await, None, Some(ledger));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri(&format!("/agents/{}", agent_id(9)))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["data"]["source"], "blockchain");
        assert_eq!(body["data"]["agent"]["metadataURI"], "ipfs://agent-9");
        assert_eq!(body["data"]["agent"]["reputationScore"], 2_500);
    }

    #[actix_rt::test]
    async fn test_get_agent_not_found_and_malformed_id() {
        let state = test_state(test_config(), seeded_store(&[]).await, None, None);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri(&format!("/agents/{}", agent_id(4)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["code"], "NOT_FOUND");

        let req = test::TestRequest::get().uri("/agents/0x1234").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_rt::test]
    async fn test_history_routes_for_unknown_agent_are_empty() {
        let state = test_state(test_config(), seeded_store(&[]).await, None, None);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get()
            .uri(&format!("/agents/{}/reputation", agent_id(6)))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["history"], json!([]));

        let req = test::TestRequest::get()
            .uri(&format!("/agents/{}/verifications", agent_id(6)))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["verifications"], json!([]));
    }

    #[actix_rt::test]
    async fn test_register_agent_requires_token() {
        let store = seeded_store(&[]).await;
        let state = test_state(test_config(), store.clone(), None, None);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/agents")
            .set_json(registration_body(5))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(store.pending_registrations().await.is_empty());
    }

    #[actix_rt::test]
    async fn test_register_agent_then_duplicate() {
        let store = seeded_store(&[]).await;
        let state = test_state(test_config(), store.clone(), None, None);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/agents")
            .insert_header(bearer(&caller_token()))
            .set_json(registration_body(5))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["status"], "pending");
        assert_eq!(body["data"]["agentId"], agent_id(5).to_string());

        let pending = store.pending_registrations().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].submitted_by, "agent-operator");

        // Pending registrations stay out of the directory
        let req = test::TestRequest::get()
            .uri(&format!("/agents/{}", agent_id(5)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::post()
            .uri("/agents")
            .insert_header(bearer(&caller_token()))
            .set_json(registration_body(5))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[actix_rt::test]
    async fn test_register_agent_rejects_unknown_fields() {
        let state = test_state(test_config(), seeded_store(&[]).await, None, None);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure_routes),
        )
        .await;

        let mut body = registration_body(5);
        body["reputationScore"] = json!(10_000);
        let req = test::TestRequest::post()
            .uri("/agents")
            .insert_header(bearer(&caller_token()))
            .set_json(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_rt::test]
    async fn test_rate_limit_returns_429() {
        let mut config = test_config();
        config.rate_limit_max_requests = 2;
        let state = test_state(config, seeded_store(&[1]).await, None, None);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure_routes),
        )
        .await;

        for _ in 0..2 {
            let req = test::TestRequest::get().uri("/agents").to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::OK);
        }

        let req = test::TestRequest::get().uri("/agents").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(resp.headers().contains_key("Retry-After"));

        // Health is not rate limited
        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_rt::test]
    async fn test_health_reports_database_status() {
        let store = seeded_store(&[]).await;
        let mut config = test_config();
        config.contract_address = Some("0x5fbdb2315678afecb367f032d93f642f64180aa3".to_string());
        let state = test_state(config, store.clone(), None, None);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure_routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["database"], "connected");
        assert_eq!(
            body["contract"],
            "0x5fbdb2315678afecb367f032d93f642f64180aa3"
        );

        store.set_offline(true);
        let req = test::TestRequest::get().uri("/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["database"], "disconnected");
    }
}
