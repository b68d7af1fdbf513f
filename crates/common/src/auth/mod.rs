//! Authentication utilities
//!
//! Provides:
//! - Owner session JWT issuing and validation
//! - `AuthContext` extractor for owner routes
//! - `PortalToken` extractor for anonymous portal routes

use crate::errors::{AppError, Result};
use axum::{
    extract::{FromRef, FromRequestParts, Query},
    http::request::Parts,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Authenticated owner, available to handlers
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Owner (practitioner) id from the identity provider
    pub owner_id: Uuid,

    /// Request ID for tracing
    pub request_id: String,
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (owner user ID)
    pub sub: String,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    pub iat: i64,
}

/// Longest session a token may be issued for (30 days)
pub const MAX_SESSION_SECS: u64 = 30 * 24 * 60 * 60;

/// JWT token manager
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration_secs: i64,
}

impl JwtManager {
    /// Create a new JWT manager with the given secret.
    /// The lifetime is clamped to `1..=MAX_SESSION_SECS`.
    pub fn new(secret: &str, expiration_secs: u64) -> Self {
        let expiration_secs = expiration_secs.clamp(1, MAX_SESSION_SECS);
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiration_secs: expiration_secs as i64,
        }
    }

    /// Generate a session token for an owner
    pub fn generate_token(&self, owner_id: Uuid) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.expiration_secs);

        let claims = JwtClaims {
            sub: owner_id.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| AppError::Internal {
            message: format!("Failed to generate token: {}", e),
        })
    }

    /// Validate a session token and return the owner id it names
    pub fn validate_token(&self, token: &str) -> Result<Uuid> {
        let claims = decode::<JwtClaims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::ExpiredToken,
                _ => AppError::InvalidToken,
            })?;

        Uuid::parse_str(&claims.sub).map_err(|_| AppError::InvalidToken)
    }
}

/// Extract the token from an `Authorization: Bearer ...` header value
pub fn extract_bearer(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn request_id(parts: &Parts) -> String {
    parts
        .headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Axum extractor for AuthContext
impl<S> FromRequestParts<S> for AuthContext
where
    Arc<JwtManager>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized {
                message: "Missing Authorization header".to_string(),
            })?;

        let token = extract_bearer(auth_header).ok_or_else(|| AppError::Unauthorized {
            message: "Expected a bearer token".to_string(),
        })?;

        let jwt = Arc::<JwtManager>::from_ref(state);
        let owner_id = jwt.validate_token(token)?;

        Ok(AuthContext {
            owner_id,
            request_id: request_id(parts),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct PortalQuery {
    token: Option<String>,
}

/// Raw portal token from `?token=` or the `x-portal-token` header
///
/// Never rejects; an absent token comes through empty and is refused by
/// the gate as missing.
#[derive(Debug, Clone, Default)]
pub struct PortalToken(pub String);

impl<S> FromRequestParts<S> for PortalToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        let from_query = Query::<PortalQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(q)| q.token);

        let token = from_query.or_else(|| {
            parts
                .headers
                .get("x-portal-token")
                .and_then(|v| v.to_str().ok())
                .map(String::from)
        });

        Ok(PortalToken(token.unwrap_or_default()))
    }
}
