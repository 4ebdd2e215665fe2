//! Bearer Token Authentication
//!
//! HS256 JWTs carrying a subject and a role list. Write endpoints take an
//! `AuthenticatedCaller`, which rejects the request before the handler runs
//! when the token is missing or invalid.

use std::future::{ready, Ready};

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::AppError;
use crate::AppState;

/// Role allowed to adjust reputation scores
pub const ORACLE_ROLE: &str = "oracle";

/// Shortest accepted HS256 secret, in bytes
pub const MIN_SECRET_LENGTH: usize = 32;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Authorization header must be 'Bearer <token>'")]
    InvalidTokenFormat,

    #[error("Token expired")]
    TokenExpired,

    #[error("Token validation failed: {0}")]
    ValidationFailed(String),

    #[error("Missing required role: {0}")]
    MissingRole(&'static str),

    #[error("JWT secret must be at least {min} bytes, got {actual}")]
    SecretTooShort { min: usize, actual: usize },
}

/// Claims carried by a bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthClaims {
    pub sub: String,
    /// Expiration (Unix seconds)
    pub exp: u64,
    /// Issued at (Unix seconds)
    pub iat: u64,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl AuthClaims {
    /// Claims issued now and valid for `ttl`
    pub fn new(sub: impl Into<String>, roles: &[&str], ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: sub.into(),
            iat: now.timestamp().max(0) as u64,
            exp: (now + ttl).timestamp().max(0) as u64,
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn require_role(&self, role: &'static str) -> Result<(), AuthError> {
        if self.has_role(role) {
            Ok(())
        } else {
            Err(AuthError::MissingRole(role))
        }
    }
}

/// Validates HS256 bearer tokens
#[derive(Clone)]
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier").finish_non_exhaustive()
    }
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Result<Self, AuthError> {
        check_secret(secret)?;
        Ok(Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        })
    }

    pub fn verify(&self, token: &str) -> Result<AuthClaims, AuthError> {
        decode::<AuthClaims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::ValidationFailed(e.to_string()),
            })
    }

    /// Verify the `Authorization` header of a request
    pub fn verify_request(&self, req: &HttpRequest) -> Result<AuthClaims, AuthError> {
        let token = extract_bearer_token(req)?;
        self.verify(token)
    }
}

/// Sign claims with an HS256 secret
pub fn issue_token(secret: &str, claims: &AuthClaims) -> Result<String, AuthError> {
    check_secret(secret)?;
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AuthError::ValidationFailed(e.to_string()))
}

fn check_secret(secret: &str) -> Result<(), AuthError> {
    if secret.len() < MIN_SECRET_LENGTH {
        return Err(AuthError::SecretTooShort {
            min: MIN_SECRET_LENGTH,
            actual: secret.len(),
        });
    }
    Ok(())
}

/// Expected format: "Bearer <token>", scheme case-insensitive
fn extract_bearer_token(req: &HttpRequest) -> Result<&str, AuthError> {
    let header = req
        .headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?;
    let value = header.to_str().map_err(|_| AuthError::InvalidTokenFormat)?;

    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("Bearer") && !token.trim().is_empty() => {
            Ok(token.trim())
        }
        _ => Err(AuthError::InvalidTokenFormat),
    }
}

/// Verified claims of the caller, extracted from the `Authorization` header
///
/// ```rust,ignore
/// pub async fn handler(caller: AuthenticatedCaller) -> Result<HttpResponse, AppError> {
///     let subject = caller.subject();
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthenticatedCaller(pub AuthClaims);

impl AuthenticatedCaller {
    pub fn claims(&self) -> &AuthClaims {
        &self.0
    }

    pub fn subject(&self) -> &str {
        &self.0.sub
    }
}

impl FromRequest for AuthenticatedCaller {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let Some(state) = req.app_data::<web::Data<AppState>>() else {
            tracing::error!("AppState not configured in app data");
            return ready(Err(AppError::Internal(
                "Authentication service not configured".to_string(),
            )));
        };

        let result = state.auth.verify_request(req).map(AuthenticatedCaller);
        if let Err(e) = &result {
            debug!(error = %e, path = req.path(), "Rejected bearer token");
        }
        ready(result.map_err(AppError::from))
    }
}
