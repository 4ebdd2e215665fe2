use actix_web::body::{EitherBody, MessageBody};
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::middleware::{from_fn, Next};
use actix_web::{web, Error, ResponseError};
use serde::Serialize;

use crate::error::AppError;
use crate::models::AgentId;
use crate::AppState;

pub mod agents;
pub mod health;
pub mod reputation;
pub mod verification;

#[cfg(test)]
mod agents_http_tests;



pub use agents::configure_agent_routes;
pub use health::configure_health_routes;
pub use reputation::configure_reputation_routes;
pub use verification::configure_verification_routes;

/// Standard API response wrapper
#[derive(Serialize)]
pub(crate) struct ApiResponse<T: Serialize> {
    data: T,
    meta: ResponseMeta,
}

#[derive(Serialize)]
struct ResponseMeta {
    request_id: String,
}

impl<T: Serialize> ApiResponse<T> {
    pub(crate) fn new(data: T) -> Self {
        Self {
            data,
            meta: ResponseMeta {
                request_id: uuid::Uuid::new_v4().to_string(),
            },
        }
    }
}

/// Malformed JSON bodies go through the standard error envelope
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(64 * 1024)
        .error_handler(|err, _req| AppError::Validation(err.to_string()).into())
}

/// Malformed query strings go through the standard error envelope
pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| AppError::Validation(err.to_string()).into())
}

/// Parse an `{agentId}` path segment
pub(crate) fn parse_agent_id(raw: &str) -> Result<AgentId, AppError> {
    raw.parse().map_err(AppError::Validation)
}

/// Count every request against the caller's quota before any extractor
/// runs, so rejected and unauthenticated calls use up the window too
pub async fn rate_limit<B: MessageBody>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<EitherBody<B>>, Error> {
    let Some(state) = req.app_data::<web::Data<AppState>>().cloned() else {
        return next.call(req).await.map(ServiceResponse::map_into_left_body);
    };

    let client = req
        .peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    if let Err(err) = state.rate_limiter.check_and_record(&client).await {
        let response = AppError::from(err).error_response();
        return Ok(req.into_response(response).map_into_right_body());
    }

    next.call(req).await.map(ServiceResponse::map_into_left_body)
}

/// Register extractor configs and every route. Health checks sit outside
/// the rate limit.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .app_data(query_config())
        .configure(configure_health_routes)
        .service(
            web::scope("")
                .wrap(from_fn(rate_limit))
                .configure(configure_agent_routes)
                .configure(configure_reputation_routes)
                .configure(configure_verification_routes),
        );
}
