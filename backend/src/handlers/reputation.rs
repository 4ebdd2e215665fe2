use actix_web::{web, HttpResponse};

use super::ApiResponse;
use crate::error::AppError;
use crate::models::{UpdateReputationRequest, UpdateReputationResponse};
use crate::services::{AuthenticatedCaller, ReputationError, ORACLE_ROLE};
use crate::AppState;

/// POST /reputation/update
///
/// Apply a signed delta to an agent's score. Requires the `oracle` role
/// unless role enforcement is switched off in configuration.
pub async fn update_reputation(
    state: web::Data<AppState>,
    caller: AuthenticatedCaller,
    body: web::Json<UpdateReputationRequest>,
) -> Result<HttpResponse, AppError> {
    if state.config.require_oracle_role {
        caller.claims().require_role(ORACLE_ROLE)?;
    }

    let request = body.into_inner();
    let adjustment = state
        .reputation()
        .adjust_reputation(&request.agent_id, request.delta)
        .await
        .map_err(|e| match e {
            ReputationError::AgentNotFound(id) => {
                AppError::NotFound(format!("Agent not found: {id}"))
            }
            ReputationError::Store(e) => e.into(),
        })?;

    tracing::debug!(
        agent_id = %adjustment.agent_id,
        caller = caller.subject(),
        "Reputation update accepted"
    );

    Ok(HttpResponse::Ok().json(ApiResponse::new(UpdateReputationResponse {
        agent_id: adjustment.agent_id,
        new_score: adjustment.new_score,
        delta: adjustment.delta,
        timestamp: adjustment.timestamp(),
    })))
}

/// Configure reputation routes
pub fn configure_reputation_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/reputation/update", web::post().to(update_reputation));
}
