use actix_web::{web, HttpResponse};
use chrono::Utc;

use super::{parse_agent_id, ApiResponse};
use crate::error::AppError;
use crate::models::{
    ListAgentsQuery, RegisterAgentRequest, ReputationHistoryResponse, VerificationHistoryResponse,
};
use crate::services::{
    AuthenticatedCaller, DirectoryError, RegistrationError, ReputationError, VerificationError,
};
use crate::AppState;

fn directory_error(e: DirectoryError) -> AppError {
    match e {
        DirectoryError::NotFound(id) => AppError::NotFound(format!("Agent not found: {id}")),
        DirectoryError::Store(e) => e.into(),
    }
}

/// GET /agents/{agentId}
///
/// Local profile when indexed, otherwise the on-chain record.
pub async fn get_agent(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let agent_id = parse_agent_id(&path)?;

    let lookup = state
        .directory()
        .get_agent(&agent_id)
        .await
        .map_err(directory_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(lookup)))
}

/// GET /agents
pub async fn list_agents(
    state: web::Data<AppState>,
    query: web::Query<ListAgentsQuery>,
) -> Result<HttpResponse, AppError> {
    let (filter, page) = query.into_inner().into_filter().map_err(AppError::Validation)?;

    let agents = state
        .directory()
        .list_agents(&filter, page, Utc::now())
        .await
        .map_err(directory_error)?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(agents)))
}

/// POST /agents
///
/// Records a registration intent. The agent only appears in the directory
/// once its on-chain registration is indexed.
pub async fn register_agent(
    state: web::Data<AppState>,
    caller: AuthenticatedCaller,
    body: web::Json<RegisterAgentRequest>,
) -> Result<HttpResponse, AppError> {
    let receipt = state
        .registrations()
        .submit(body.into_inner(), caller.subject())
        .await
        .map_err(|e| match e {
            RegistrationError::InvalidMetadata(msg) => AppError::Validation(msg),
            RegistrationError::Conflict(msg) => AppError::Conflict(msg),
            RegistrationError::Store(e) => e.into(),
        })?;

    Ok(HttpResponse::Created().json(ApiResponse::new(receipt)))
}

/// GET /agents/{agentId}/reputation
///
/// Reputation history, newest first.
pub async fn get_agent_reputation(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let agent_id = parse_agent_id(&path)?;

    let history = state
        .reputation()
        .history(&agent_id)
        .await
        .map_err(|e| match e {
            ReputationError::AgentNotFound(id) => {
                AppError::NotFound(format!("Agent not found: {id}"))
            }
            ReputationError::Store(e) => e.into(),
        })?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(ReputationHistoryResponse {
        agent_id,
        history,
    })))
}

/// GET /agents/{agentId}/verifications
pub async fn get_agent_verifications(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let agent_id = parse_agent_id(&path)?;

    let verifications = state
        .verifications()
        .history(&agent_id)
        .await
        .map_err(|e| match e {
            VerificationError::AgentNotFound(id) => {
                AppError::NotFound(format!("Agent not found: {id}"))
            }
            VerificationError::InvalidResult(msg) => AppError::Validation(msg),
            VerificationError::Store(e) => e.into(),
        })?;

    Ok(HttpResponse::Ok().json(ApiResponse::new(VerificationHistoryResponse {
        agent_id,
        verifications,
    })))
}

/// Configure agent routes
pub fn configure_agent_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/agents")
            .route("", web::get().to(list_agents))
            .route("", web::post().to(register_agent))
            .route("/{agentId}", web::get().to(get_agent))
            .route("/{agentId}/reputation", web::get().to(get_agent_reputation))
            .route("/{agentId}/verifications", web::get().to(get_agent_verifications)),
    );
}
