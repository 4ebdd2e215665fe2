use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use verifiedagent::models::WalletAddress;
use verifiedagent::services::{
    AgentCache, AgentLedger, InMemoryAgentCache, PgAgentStore, RedisAgentCache, RpcAgentLedger,
};
use verifiedagent::{handlers, AppState, Config};

/// How often idle rate-limit windows are dropped
const RATE_LIMIT_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

async fn build_cache(config: &Config) -> Arc<dyn AgentCache> {
    if let Some(url) = &config.redis_url {
        match RedisAgentCache::connect(url).await {
            Ok(cache) => {
                info!("Redis directory cache connected");
                return Arc::new(cache);
            }
            Err(e) => {
                warn!("Redis unavailable: {}. Falling back to in-process cache.", e);
            }
        }
    }
    Arc::new(InMemoryAgentCache::default())
}

fn build_ledger(config: &Config) -> anyhow::Result<Option<Arc<dyn AgentLedger>>> {
    let (Some(rpc_url), Some(contract)) = (&config.rpc_url, &config.contract_address) else {
        warn!("RPC_URL or CONTRACT_ADDRESS not set. Ledger fallback disabled.");
        return Ok(None);
    };

    let contract: WalletAddress = contract
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))
        .context("Invalid CONTRACT_ADDRESS")?;
    let ledger = RpcAgentLedger::new(rpc_url.clone(), contract.clone(), config.ledger_timeout())
        .context("Failed to build ledger client")?;

    info!(contract = %contract, "Registry ledger fallback enabled");
    Ok(Some(Arc::new(ledger)))
}

/// Periodically drop expired rate-limit windows until shutdown
fn spawn_rate_limit_pruner(state: web::Data<AppState>) -> watch::Sender<bool> {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        let mut timer = tokio::time::interval(RATE_LIMIT_PRUNE_INTERVAL);
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let removed = state.rate_limiter.prune().await;
                    if removed > 0 {
                        tracing::debug!(removed, "Pruned idle rate limit windows");
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    });

    shutdown_tx
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "verifiedagent=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    info!("Starting VerifiedAgent server on {}:{}", config.host, config.port);

    let db_pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to create database pool")?;

    info!("Database connection pool established");

    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .context("Failed to run database migrations")?;

    info!("Database migrations completed");

    let cache = build_cache(&config).await;
    let ledger = build_ledger(&config)?;
    let store = Arc::new(PgAgentStore::new(db_pool.clone()));

    let server_addr = format!("{}:{}", config.host, config.port);
    let app_state = web::Data::new(
        AppState::new(config, store, Some(cache), ledger).context("Invalid auth configuration")?,
    );

    let pruner = spawn_rate_limit_pruner(app_state.clone());

    let state = app_state.clone();
    HttpServer::new(move || {
        // The browser frontend is served from another origin
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .supports_credentials()
            .max_age(3600);

        App::new()
            .app_data(state.clone())
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(handlers::configure_routes)
    })
    .bind(&server_addr)
    .with_context(|| format!("Failed to bind {server_addr}"))?
    .run()
    .await?;

    info!("Shutting down");
    let _ = pruner.send(true);
    db_pool.close().await;

    Ok(())
}
