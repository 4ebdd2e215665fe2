use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Connected,
    Disconnected,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub contract: Option<String>,
    pub database: ComponentStatus,
}

/// GET /health
///
/// Liveness probe. Always answers 200; a failing database is reported
/// in the body rather than the status code.
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let database = match state.store.ping().await {
        Ok(()) => ComponentStatus::Connected,
        Err(e) => {
            tracing::warn!(error = %e, "Health check could not reach the database");
            ComponentStatus::Disconnected
        }
    };

    HttpResponse::Ok().json(HealthReport {
        status: "ok",
        timestamp: Utc::now(),
        contract: state.config.contract_address.clone(),
        database,
    })
}

/// Configure health routes
pub fn configure_health_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health));
}
