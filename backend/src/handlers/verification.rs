use actix_web::{web, HttpResponse};

use super::ApiResponse;
use crate::error::AppError;
use crate::models::RecordVerificationRequest;
use crate::services::{AuthenticatedCaller, VerificationError};
use crate::AppState;

/// POST /verify
///
/// Record the outcome of an external verification run.
pub async fn record_verification(
    state: web::Data<AppState>,
    caller: AuthenticatedCaller,
    body: web::Json<RecordVerificationRequest>,
) -> Result<HttpResponse, AppError> {
    let (agent_id, result) = body.into_inner().into_parts();
    let ack = state
        .verifications()
        .record_verification(&agent_id, result)
        .await
        .map_err(|e| match e {
            VerificationError::InvalidResult(msg) => AppError::Validation(msg),
            VerificationError::AgentNotFound(id) => {
                AppError::NotFound(format!("Agent not found: {id}"))
            }
            VerificationError::Store(e) => e.into(),
        })?;

    tracing::debug!(agent_id = %agent_id, verifier = caller.subject(), "Verification accepted");

    Ok(HttpResponse::Ok().json(ApiResponse::new(ack)))
}

/// Configure verification routes
pub fn configure_verification_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/verify", web::post().to(record_verification));
}
