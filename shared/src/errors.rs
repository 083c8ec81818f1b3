//! # Application Error Types
//!
//! Unified error handling for the gateway with automatic HTTP conversion.
//!
//! ## Design Philosophy
//!
//! Services return typed errors; the transport glue translates them. No
//! service formats protocol-specific responses directly. Each variant maps
//! to exactly one HTTP status code and one machine-readable error code.
//!
//! ## Error Categories
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          ApiError Categories                             │
//! ├─────────────────────────┬───────────────────┬────────────────────────────┤
//! │ Authentication (401)    │ Authorization(403)│ Validation (400)           │
//! ├─────────────────────────┼───────────────────┼────────────────────────────┤
//! │ InvalidCredentials      │ InsufficientScope │ ValidationError            │
//! │ TokenExpired            │ AccessDenied      │ BadRequest                 │
//! │ InvalidToken            │                   │ InvalidApplication         │
//! │ MissingAuth             │                   │                            │
//! │ PasswordExpired         │                   │                            │
//! ├─────────────────────────┴───────────────────┴────────────────────────────┤
//! │ Lockout (423)  │ Resources (404,409) │ Rate (429)  │ Server (500, 503)   │
//! ├────────────────┼─────────────────────┼─────────────┼─────────────────────┤
//! │ AccountLocked  │ NotFound            │ RateLimited │ DatabaseError       │
//! │                │ Conflict            │             │ RedisError          │
//! │                │                     │             │ InternalError       │
//! │                │                     │             │ ServiceUnavailable  │
//! └────────────────┴─────────────────────┴─────────────┴─────────────────────┘
//! ```
//!
//! OAuth protocol failures are a distinguished family: they are rendered in
//! the RFC 6749 §5.2 JSON shape (`error`, `error_description`) instead of
//! the standard envelope, because OAuth clients parse that shape.
//!
//! ## HTTP Response Format
//!
//! Non-OAuth errors are serialized to a consistent JSON format:
//!
//! ```json
//! {
//!   "code": "ACCOUNT_LOCKED",
//!   "message": "Account locked",
//!   "details": { "locked_until": "2024-01-15T10:30:00Z" },
//!   "timestamp": "2024-01-15T10:30:00Z"
//! }
//! ```
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use shared::errors::{ApiError, ApiResult};
//!
//! async fn get_user(id: Uuid) -> ApiResult<User> {
//!     repo.find_by_id(id)
//!         .await?
//!         .ok_or(ApiError::NotFound { resource: format!("user:{}", id) })
//! }
//! ```

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::ValidationErrors;

// =============================================================================
// Type Aliases
// =============================================================================

/// Result type alias for handlers and services.
pub type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// OAuth Protocol Errors (RFC 6749 / 8628 / OIDC)
// =============================================================================

/// OAuth 2.0 / OIDC protocol error codes.
///
/// These are wire-observable strings defined by RFC 6749 §5.2 (token
/// endpoint), RFC 6749 §4.1.2.1 (authorization endpoint), RFC 8628 §3.5
/// (device grant polling), and OIDC Core §3.1.2.6 (`login_required`,
/// `consent_required`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OAuthErrorKind {
    /// Malformed or incomplete OAuth request.
    InvalidRequest,
    /// Client authentication failed (unknown client, bad secret).
    InvalidClient,
    /// Bad code / refresh token / PKCE verifier / redirect mismatch.
    InvalidGrant,
    /// Client is not allowed to use this grant or is inactive.
    UnauthorizedClient,
    /// Grant type is not supported by this server or client.
    UnsupportedGrantType,
    /// Response type is not supported by the authorization endpoint.
    UnsupportedResponseType,
    /// A requested scope is unknown or exceeds the client's allowance.
    InvalidScope,
    /// The resource owner or server denied the request.
    AccessDenied,
    /// Device grant: the user has not completed authorization yet.
    AuthorizationPending,
    /// Device grant: client is polling faster than `interval` allows.
    SlowDown,
    /// Device grant: the device code has expired.
    ExpiredToken,
    /// `prompt=none` was requested but no session is active.
    LoginRequired,
    /// Consent is required but missing (or `prompt=consent`).
    ConsentRequired,
    /// Token exchange: the redeeming application is not the bound target.
    InvalidTarget,
}

impl OAuthErrorKind {
    /// Returns the wire-format error code string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::UnsupportedResponseType => "unsupported_response_type",
            Self::InvalidScope => "invalid_scope",
            Self::AccessDenied => "access_denied",
            Self::AuthorizationPending => "authorization_pending",
            Self::SlowDown => "slow_down",
            Self::ExpiredToken => "expired_token",
            Self::LoginRequired => "login_required",
            Self::ConsentRequired => "consent_required",
            Self::InvalidTarget => "invalid_target",
        }
    }

    /// HTTP status for the token-style endpoints.
    ///
    /// RFC 6749 §5.2: token endpoint errors are 400, except failed client
    /// authentication which is 401. `access_denied` surfaces as 403 when it
    /// reaches the caller as a direct response (device polling).
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidClient => StatusCode::UNAUTHORIZED,
            Self::AccessDenied => StatusCode::FORBIDDEN,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// RFC 6749 §5.2 error body.
#[derive(Debug, Serialize, Deserialize)]
pub struct OAuthErrorResponse {
    /// Error code (e.g. `invalid_grant`)
    pub error: String,
    /// Human-readable description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

// =============================================================================
// Main Error Enum
// =============================================================================

/// Application error type with automatic HTTP status mapping.
///
/// Each variant represents a specific error condition and maps to an
/// appropriate HTTP status code. The `#[error]` attribute defines the
/// error message format.
#[derive(Debug, Error)]
pub enum ApiError {
    // =========================================================================
    // Authentication Errors (401 Unauthorized)
    // =========================================================================
    // The caller is not authenticated or the presented credential is invalid.
    // Messages never distinguish "unknown identity" from "wrong secret".

    /// Wrong password / bad token / unknown API key.
    /// Returns 401 Unauthorized.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// JWT access token has expired.
    /// Returns 401 Unauthorized.
    #[error("Token expired")]
    TokenExpired,

    /// Token is malformed, has an invalid signature, or fails a claim check.
    /// Returns 401 Unauthorized.
    #[error("Invalid token")]
    InvalidToken,

    /// Request doesn't include any credential.
    /// Returns 401 Unauthorized.
    #[error("Missing authentication")]
    MissingAuth,

    /// The account's password has passed `password_expires_at` and must be
    /// rotated before sign-in succeeds.
    /// Returns 401 Unauthorized with code `PASSWORD_EXPIRED`.
    #[error("Password expired")]
    PasswordExpired,

    // =========================================================================
    // Account Lockout (423 Locked)
    // =========================================================================

    /// Account temporarily locked due to too many failed sign-in attempts.
    /// Returns 423 Locked with `locked_until` in details.
    #[error("Account locked")]
    AccountLocked {
        /// When the account will be automatically unlocked
        until: Option<chrono::DateTime<chrono::Utc>>,
    },

    // =========================================================================
    // Authorization Errors (403 Forbidden)
    // =========================================================================
    // Authenticated, but the credential lacks the required capability.

    /// The API key or token lacks the scope the operation requires.
    /// Returns 403 Forbidden.
    #[error("Insufficient scope")]
    InsufficientScope {
        /// The scope that would have been required
        required: String,
    },

    /// The caller may not access this specific resource (tenant boundary,
    /// banned profile, ownership check).
    /// Returns 403 Forbidden.
    #[error("Access denied")]
    AccessDenied,

    // =========================================================================
    // Validation Errors (400 Bad Request)
    // =========================================================================

    /// Request body failed validation rules.
    /// Contains field-level errors from the `validator` crate.
    #[error("Validation error")]
    ValidationError(#[from] ValidationErrors),

    /// Generic bad request with custom message.
    #[error("Invalid input: {message}")]
    BadRequest {
        /// Human-readable description of what's wrong
        message: String,
    },

    /// A token carries an `application_id` claim that does not match the
    /// caller-supplied application. Rejected regardless of signature
    /// validity.
    /// Returns 400 Bad Request with code `INVALID_APPLICATION`.
    #[error("Invalid application")]
    InvalidApplication,

    // =========================================================================
    // Resource Errors (404 Not Found, 409 Conflict)
    // =========================================================================

    /// Requested resource doesn't exist.
    #[error("Resource not found: {resource}")]
    NotFound {
        /// Resource identifier (e.g., "user:123", "application:abc")
        resource: String,
    },

    /// Action would violate a uniqueness constraint (email/username/phone,
    /// application name, client_id).
    #[error("Resource already exists: {resource}")]
    Conflict {
        /// Description of the conflict (e.g., "email already registered")
        resource: String,
    },

    // =========================================================================
    // Rate Limiting (429 Too Many Requests)
    // =========================================================================

    /// OTP send, login, or device-code poll exceeded its window limit.
    /// Returns 429 with `retry_after_seconds` in details.
    #[error("Rate limited")]
    RateLimited {
        /// Seconds until the client can retry
        retry_after_seconds: u64,
    },

    // =========================================================================
    // OAuth Protocol Errors (RFC 6749 shape)
    // =========================================================================

    /// OAuth 2.0 / OIDC protocol failure. Rendered as the RFC 6749 §5.2
    /// JSON body instead of the standard envelope.
    #[error("OAuth error: {}", kind.as_str())]
    OAuth {
        /// Protocol error code
        kind: OAuthErrorKind,
        /// Description included as `error_description`
        description: String,
    },

    // =========================================================================
    // Server Errors (500 Internal Server Error, 503 Service Unavailable)
    // =========================================================================
    // Logged as errors; details are NOT exposed to clients.

    /// PostgreSQL query failed.
    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),

    /// Redis operation failed.
    #[error("Redis error")]
    RedisError(#[from] redis::RedisError),

    /// Unspecified internal error. Use as last resort.
    #[error("Internal server error")]
    InternalError {
        /// Internal message for logging (not exposed to client)
        message: String,
    },

    /// A required subsystem (cache, delivery provider) is down.
    #[error("Service unavailable")]
    ServiceUnavailable {
        /// Name of the unavailable subsystem
        service: String,
    },
}

impl ApiError {
    /// Shorthand constructor for OAuth protocol errors.
    pub fn oauth(kind: OAuthErrorKind, description: impl Into<String>) -> Self {
        Self::OAuth {
            kind,
            description: description.into(),
        }
    }

    /// Shorthand for the most common OAuth failure.
    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::oauth(OAuthErrorKind::InvalidGrant, description)
    }

    /// Returns a machine-readable error code.
    ///
    /// These codes are stable and can be used by API clients for
    /// programmatic error handling. OAuth variants use their RFC wire code.
    pub fn error_code(&self) -> &'static str {
        match self {
            // Authentication
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::MissingAuth => "MISSING_AUTH",
            Self::PasswordExpired => "PASSWORD_EXPIRED",
            // Lockout
            Self::AccountLocked { .. } => "ACCOUNT_LOCKED",
            // Authorization
            Self::InsufficientScope { .. } => "INSUFFICIENT_SCOPE",
            Self::AccessDenied => "ACCESS_DENIED",
            // Validation
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::BadRequest { .. } => "BAD_REQUEST",
            Self::InvalidApplication => "INVALID_APPLICATION",
            // Resources
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Conflict { .. } => "CONFLICT",
            // Rate limiting
            Self::RateLimited { .. } => "RATE_LIMITED",
            // OAuth
            Self::OAuth { kind, .. } => kind.as_str(),
            // Server
            Self::DatabaseError(_) => "DATABASE_ERROR",
            Self::RedisError(_) => "REDIS_ERROR",
            Self::InternalError { .. } => "INTERNAL_ERROR",
            Self::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
        }
    }

    /// Returns the HTTP status code for this error.
    ///
    /// This is the source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 401 Unauthorized - authentication required or failed
            Self::InvalidCredentials
            | Self::TokenExpired
            | Self::InvalidToken
            | Self::MissingAuth
            | Self::PasswordExpired => StatusCode::UNAUTHORIZED,

            // 423 Locked - too many failed attempts
            Self::AccountLocked { .. } => StatusCode::LOCKED,

            // 403 Forbidden - authenticated but not authorized
            Self::InsufficientScope { .. } | Self::AccessDenied => StatusCode::FORBIDDEN,

            // 400 Bad Request - client sent invalid data
            Self::ValidationError(_) | Self::BadRequest { .. } | Self::InvalidApplication => {
                StatusCode::BAD_REQUEST
            }

            // 404 / 409
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,

            // 429 Too Many Requests
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // OAuth protocol errors carry their own mapping
            Self::OAuth { kind, .. } => kind.status_code(),

            // 5xx
            Self::DatabaseError(_) | Self::RedisError(_) | Self::InternalError { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Returns `true` if this is a server-side error (5xx).
    ///
    /// Server errors are logged at ERROR level and never expose internal
    /// details to clients; client errors (4xx) are logged at WARN level.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::DatabaseError(_)
                | Self::RedisError(_)
                | Self::InternalError { .. }
                | Self::ServiceUnavailable { .. }
        )
    }
}

// =============================================================================
// Response Structure
// =============================================================================

/// Standard error response body for non-OAuth endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code for programmatic handling
    pub code: String,

    /// Human-readable message (for debugging, not for user display)
    pub message: String,

    /// Additional error details (varies by error type).
    /// - ValidationError: field-level errors
    /// - RateLimited: `retry_after_seconds`
    /// - AccountLocked: `locked_until`
    /// - InsufficientScope: `required_scope`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// When the error occurred (ISO 8601 format)
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorResponse {
    /// Creates a new error response from an `ApiError`.
    pub fn new(error: &ApiError) -> Self {
        let details = match error {
            ApiError::ValidationError(errors) => {
                Some(serde_json::to_value(errors).unwrap_or_default())
            }
            ApiError::RateLimited {
                retry_after_seconds,
            } => Some(serde_json::json!({ "retry_after_seconds": retry_after_seconds })),
            ApiError::AccountLocked { until } => {
                Some(serde_json::json!({ "locked_until": until }))
            }
            ApiError::InsufficientScope { required } => {
                Some(serde_json::json!({ "required_scope": required }))
            }
            // Server errors: never expose internals
            ApiError::DatabaseError(_)
            | ApiError::RedisError(_)
            | ApiError::InternalError { .. } => None,
            _ => None,
        };

        Self {
            code: error.error_code().to_string(),
            message: error.to_string(),
            details,
            timestamp: chrono::Utc::now(),
        }
    }
}

// =============================================================================
// Actix-web Integration
// =============================================================================

/// Allows returning `ApiError` directly from handlers.
///
/// OAuth variants render the RFC 6749 §5.2 body; everything else renders
/// the standard [`ErrorResponse`] envelope. Rate-limit responses carry a
/// `Retry-After` header.
impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.status_code()
    }

    fn error_response(&self) -> HttpResponse {
        if self.is_server_error() {
            tracing::error!(error = %self, code = self.error_code(), "request failed");
        } else {
            tracing::warn!(error = %self, code = self.error_code(), "request rejected");
        }

        match self {
            Self::OAuth { kind, description } => {
                HttpResponse::build(self.status_code()).json(OAuthErrorResponse {
                    error: kind.as_str().to_string(),
                    error_description: Some(description.clone()),
                })
            }
            Self::RateLimited {
                retry_after_seconds,
            } => HttpResponse::build(self.status_code())
                .insert_header(("Retry-After", retry_after_seconds.to_string()))
                .json(ErrorResponse::new(self)),
            _ => HttpResponse::build(self.status_code()).json(ErrorResponse::new(self)),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_errors_return_401() {
        assert_eq!(
            ApiError::InvalidCredentials.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::TokenExpired.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::InvalidToken.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::MissingAuth.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_account_locked_returns_423() {
        let err = ApiError::AccountLocked {
            until: Some(chrono::Utc::now()),
        };
        assert_eq!(err.status_code(), StatusCode::LOCKED);
        assert_eq!(err.error_code(), "ACCOUNT_LOCKED");
    }

    #[test]
    fn test_authorization_errors_return_403() {
        let err = ApiError::InsufficientScope {
            required: "users:read".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::AccessDenied.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_resource_errors() {
        assert_eq!(
            ApiError::NotFound {
                resource: "user".to_string()
            }
            .status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Conflict {
                resource: "email".to_string()
            }
            .status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_rate_limited_returns_429() {
        let err = ApiError::RateLimited {
            retry_after_seconds: 60,
        };
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.error_code(), "RATE_LIMITED");
    }

    #[test]
    fn test_oauth_errors_use_rfc_codes() {
        let err = ApiError::invalid_grant("authorization code already used");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code(), "invalid_grant");

        let err = ApiError::oauth(OAuthErrorKind::InvalidClient, "unknown client");
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);

        let err = ApiError::oauth(OAuthErrorKind::SlowDown, "polling too fast");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code(), "slow_down");
    }

    #[test]
    fn test_invalid_application_is_rejected_as_bad_request() {
        assert_eq!(
            ApiError::InvalidApplication.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::InvalidApplication.error_code(), "INVALID_APPLICATION");
    }

    #[test]
    fn test_server_errors_are_flagged() {
        assert!(ApiError::InternalError {
            message: "test".to_string()
        }
        .is_server_error());
        assert!(ApiError::ServiceUnavailable {
            service: "redis".to_string()
        }
        .is_server_error());
        assert!(!ApiError::InvalidCredentials.is_server_error());
        assert!(!ApiError::invalid_grant("x").is_server_error());
    }

    #[test]
    fn test_error_response_includes_timestamp() {
        let error = ApiError::InvalidCredentials;
        let response = ErrorResponse::new(&error);

        let now = chrono::Utc::now();
        let diff = now - response.timestamp;
        assert!(diff.num_seconds() < 60);
    }

    #[test]
    fn test_error_response_details_for_lockout() {
        let until = chrono::Utc::now();
        let response = ErrorResponse::new(&ApiError::AccountLocked { until: Some(until) });
        let details = response.details.expect("lockout carries details");
        assert!(details.get("locked_until").is_some());
    }
}
