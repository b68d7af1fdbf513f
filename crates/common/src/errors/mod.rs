//! Error types for Casedesk services
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for portal access and entitlement failures
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,

    // Authentication errors (2xxx)
    Unauthorized,
    InvalidToken,
    ExpiredToken,

    // Authorization errors (3xxx)
    AccessDenied,
    AccessExpired,
    UpgradeRequired,

    // Resource errors (4xxx)
    CaseNotFound,
    ClientNotFound,
    GrantNotFound,
    ConversationNotFound,
    ConversationClosed,

    // Rate limiting (6xxx)
    RateLimited,
    QuotaExhausted,

    // Database errors (7xxx)
    DatabaseError,
    ConnectionError,

    // External service errors (8xxx)
    UpstreamError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,

    // Service unavailable
    ServiceUnavailable,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,

            // Auth (2xxx)
            ErrorCode::Unauthorized => 2001,
            ErrorCode::InvalidToken => 2002,
            ErrorCode::ExpiredToken => 2003,

            // Authz (3xxx)
            ErrorCode::AccessDenied => 3001,
            ErrorCode::AccessExpired => 3002,
            ErrorCode::UpgradeRequired => 3003,

            // Resources (4xxx)
            ErrorCode::CaseNotFound => 4001,
            ErrorCode::ClientNotFound => 4002,
            ErrorCode::GrantNotFound => 4003,
            ErrorCode::ConversationNotFound => 4004,
            ErrorCode::ConversationClosed => 4005,

            // Rate limits (6xxx)
            ErrorCode::RateLimited => 6001,
            ErrorCode::QuotaExhausted => 6002,

            // Database (7xxx)
            ErrorCode::DatabaseError => 7001,
            ErrorCode::ConnectionError => 7002,

            // External (8xxx)
            ErrorCode::UpstreamError => 8001,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,

            ErrorCode::ServiceUnavailable => 9999,
        }
    }
}

/// Reasons a portal token is refused.
///
/// The display strings are what an anonymous visitor sees; they never say
/// more than "missing", "invalid" or "expired".
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessError {
    #[error("Invalid or missing access token")]
    Missing,

    #[error("Invalid or expired access link")]
    InvalidOrRevoked,

    #[error("This access link has expired")]
    Expired,

    #[error("The portal is temporarily unavailable. Please try again.")]
    Unavailable,
}

/// Failures while evaluating an owner's entitlements
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntitlementError {
    #[error("Entitlements unavailable: {message}")]
    Unavailable { message: String },
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    // Authentication errors
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Invalid session token")]
    InvalidToken,

    #[error("Session token expired")]
    ExpiredToken,

    // Authorization errors
    #[error("{0}")]
    Access(#[from] AccessError),

    #[error("{0}")]
    Entitlement(#[from] EntitlementError),

    #[error("Your {tier} plan does not allow this: {limit}")]
    UpgradeRequired { tier: String, limit: String },

    // Resource errors
    #[error("Case not found: {id}")]
    CaseNotFound { id: String },

    #[error("Client not found: {id}")]
    ClientNotFound { id: String },

    #[error("Portal grant not found: {id}")]
    GrantNotFound { id: String },

    #[error("Intake conversation not found: {id}")]
    ConversationNotFound { id: String },

    #[error("Intake conversation {id} is already completed")]
    ConversationClosed { id: String },

    // Rate limiting
    #[error("Rate limit exceeded. Please try again in a moment.")]
    RateLimited,

    #[error("AI credits exhausted. Please add funds to continue.")]
    QuotaExhausted,

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // External service errors
    #[error("Upstream error: {message}")]
    Upstream { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::Unauthorized { .. } => ErrorCode::Unauthorized,
            AppError::InvalidToken => ErrorCode::InvalidToken,
            AppError::ExpiredToken => ErrorCode::ExpiredToken,
            AppError::Access(AccessError::Missing) => ErrorCode::Unauthorized,
            AppError::Access(AccessError::InvalidOrRevoked) => ErrorCode::AccessDenied,
            AppError::Access(AccessError::Expired) => ErrorCode::AccessExpired,
            AppError::Access(AccessError::Unavailable) => ErrorCode::ServiceUnavailable,
            AppError::Entitlement(EntitlementError::Unavailable { .. }) => {
                ErrorCode::ServiceUnavailable
            }
            AppError::UpgradeRequired { .. } => ErrorCode::UpgradeRequired,
            AppError::CaseNotFound { .. } => ErrorCode::CaseNotFound,
            AppError::ClientNotFound { .. } => ErrorCode::ClientNotFound,
            AppError::GrantNotFound { .. } => ErrorCode::GrantNotFound,
            AppError::ConversationNotFound { .. } => ErrorCode::ConversationNotFound,
            AppError::ConversationClosed { .. } => ErrorCode::ConversationClosed,
            AppError::RateLimited => ErrorCode::RateLimited,
            AppError::QuotaExhausted => ErrorCode::QuotaExhausted,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::Upstream { .. } => ErrorCode::UpstreamError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::ServiceUnavailable { .. } => ErrorCode::ServiceUnavailable,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,

            // 401 Unauthorized
            AppError::Unauthorized { .. }
            | AppError::InvalidToken
            | AppError::ExpiredToken
            | AppError::Access(AccessError::Missing) => StatusCode::UNAUTHORIZED,

            // 402 Payment Required
            AppError::QuotaExhausted => StatusCode::PAYMENT_REQUIRED,

            // 403 Forbidden
            AppError::UpgradeRequired { .. }
            | AppError::Access(AccessError::InvalidOrRevoked)
            | AppError::Access(AccessError::Expired) => StatusCode::FORBIDDEN,

            // 404 Not Found
            AppError::CaseNotFound { .. }
            | AppError::ClientNotFound { .. }
            | AppError::GrantNotFound { .. }
            | AppError::ConversationNotFound { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::ConversationClosed { .. } => StatusCode::CONFLICT,

            // 429 Too Many Requests
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::Database(_)
            | AppError::DatabaseConnection { .. }
            | AppError::Internal { .. }
            | AppError::Configuration { .. }
            | AppError::Serialization(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::Upstream { .. } | AppError::HttpClient(_) => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            AppError::Access(AccessError::Unavailable)
            | AppError::Entitlement(_)
            | AppError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Extra structured context for the response body
    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::UpgradeRequired { tier, limit } => Some(serde_json::json!({
                "tier": tier,
                "limit": limit,
            })),
            AppError::Validation {
                field: Some(field), ..
            } => Some(serde_json::json!({ "field": field })),
            _ => None,
        }
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                numeric_code = code.as_code(),
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                numeric_code = code.as_code(),
                status = status.as_u16(),
                "Client error"
            );
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                details: self.details(),
                request_id: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}
