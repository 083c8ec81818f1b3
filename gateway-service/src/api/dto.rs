//! # Data Transfer Objects
//!
//! The API contract of the first-party surface: request validation via
//! the `validator` derive, camelCase JSON for JavaScript consumers.
//!
//! ## Validation Rules
//!
//! | Field | Rules |
//! |--------------|-----------------------------------------------------|
//! | `email` | Valid email format, max 255 chars |
//! | `username` | Custom username rules (3-64, alphanumeric start) |
//! | `password` | 10-128 chars (strength rules enforced in the service) |
//! | `identifier` | Non-blank |
//! | `code` | Exactly 6 chars for OTPs |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::Session;
use shared::validation::validators;

// =============================================================================
// REGISTRATION & LOGIN
// =============================================================================

/// Request body for password registration.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    /// User's email address
    #[validate(email(message = "Invalid email format"))]
    #[validate(length(max = 255, message = "Email too long"))]
    pub email: String,

    /// Desired username
    #[validate(custom(function = "validators::valid_username"))]
    pub username: String,

    /// Plain text password (strength-checked in the service)
    #[validate(length(min = 10, max = 128, message = "Password must be 10-128 characters"))]
    pub password: String,

    /// Optional phone number (normalized to E.164)
    pub phone: Option<String>,
}

/// Request body for sign-in. The identifier may be an email, username,
/// or phone number.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Email, username, or phone
    #[validate(custom(function = "validators::not_blank"))]
    pub identifier: String,

    /// Plain text password
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,

    /// Optional tenant scope for the issued tokens
    pub application_id: Option<Uuid>,
}

/// Request body completing a 2FA-gated sign-in.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorRequest {
    /// Opaque challenge token from the first sign-in step
    #[validate(custom(function = "validators::not_blank"))]
    pub two_factor_token: String,

    /// Current TOTP code
    #[validate(length(min = 6, max = 6, message = "Code must be 6 digits"))]
    pub totp_code: String,
}

// =============================================================================
// PASSWORDLESS REGISTRATION
// =============================================================================

/// Request body starting a passwordless registration.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PasswordlessInitRequest {
    /// Register by email (mutually exclusive with phone)
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,

    /// Register by phone (mutually exclusive with email)
    pub phone: Option<String>,

    /// Desired username
    #[validate(custom(function = "validators::valid_username"))]
    pub username: String,

    /// Optional tenant the registration belongs to
    pub application_id: Option<Uuid>,
}

/// Request body completing a passwordless registration.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PasswordlessCompleteRequest {
    /// The identifier the code was sent to
    #[validate(custom(function = "validators::not_blank"))]
    pub identifier: String,

    /// The 6-digit OTP
    #[validate(length(min = 6, max = 6, message = "Code must be 6 digits"))]
    pub code: String,
}

// =============================================================================
// TOKENS & SESSIONS
// =============================================================================

/// Request body for token refresh.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    /// The refresh token to rotate
    #[validate(custom(function = "validators::not_blank"))]
    pub refresh_token: String,
}

/// Request body for sign-out.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    /// The refresh token whose session ends
    #[validate(custom(function = "validators::not_blank"))]
    pub refresh_token: String,
}

/// Request body for all-devices sign-out.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LogoutAllRequest {
    /// Session to keep alive (usually the current one)
    pub except_session_id: Option<Uuid>,
}

/// Request body for password change.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    /// The password being replaced
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,

    /// The replacement
    #[validate(length(min = 10, max = 128, message = "Password must be 10-128 characters"))]
    pub new_password: String,
}

/// Request body issuing a new API key.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateApiKeyRequest {
    /// Operator-facing label
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    /// Scope labels the key grants (`all` for the wildcard)
    #[validate(length(min = 1, message = "At least one scope is required"))]
    pub scopes: Vec<String>,

    /// Optional tenant binding
    pub application_id: Option<Uuid>,

    /// Optional expiry
    pub expires_at: Option<DateTime<Utc>>,
}

/// One API key in the listing (plaintext long gone; the prefix remains
/// for identification).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyDto {
    /// Key id (revocation handle)
    pub api_key_id: Uuid,
    /// Label
    pub name: String,
    /// First 12 chars of the plaintext
    pub key_prefix: String,
    /// Granted scopes
    pub scopes: Vec<String>,
    /// Tenant binding
    pub application_id: Option<Uuid>,
    /// Revocation flag
    pub is_active: bool,
    /// Expiry
    pub expires_at: Option<DateTime<Utc>>,
    /// Last successful validation (best-effort)
    pub last_used_at: Option<DateTime<Utc>>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl From<crate::domain::ApiKey> for ApiKeyDto {
    fn from(key: crate::domain::ApiKey) -> Self {
        Self {
            api_key_id: key.api_key_id,
            name: key.name,
            key_prefix: key.key_prefix,
            scopes: key.scopes.0,
            application_id: key.application_id,
            is_active: key.is_active,
            expires_at: key.expires_at,
            last_used_at: key.last_used_at,
            created_at: key.created_at,
        }
    }
}

/// Request body completing TOTP enrollment.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TotpEnableRequest {
    /// A current code from the authenticator app
    #[validate(length(min = 6, max = 6, message = "Code must be 6 digits"))]
    pub code: String,
}

// =============================================================================
// RESPONSES
// =============================================================================

/// Sign-in response: tokens, or a 2FA challenge.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponseDto {
    /// Distinguished response flag: the sign-in is fine, a second factor
    /// is pending
    pub requires_2fa: bool,

    /// Challenge token to present with the TOTP code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub two_factor_token: Option<String>,

    /// Tokens + profile when no second factor is needed
    #[serde(flatten)]
    pub auth: Option<crate::service::auth_service::AuthResponse>,
}

/// One session in the device-management listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDto {
    /// Session id (revocation handle)
    pub session_id: Uuid,
    /// Display label ("Chrome on macOS")
    pub session_name: String,
    /// Device class
    pub device_type: String,
    /// Operating system
    pub device_os: String,
    /// Browser / client
    pub device_browser: String,
    /// IP at issuance
    pub ip_address: Option<String>,
    /// Last refresh or activity touch
    pub last_active_at: DateTime<Utc>,
    /// Hard expiry
    pub expires_at: DateTime<Utc>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl From<Session> for SessionDto {
    fn from(session: Session) -> Self {
        Self {
            session_id: session.session_id,
            session_name: session.session_name,
            device_type: session.device_type,
            device_os: session.device_os,
            device_browser: session.device_browser,
            ip_address: session.ip_address,
            last_active_at: session.last_active_at,
            expires_at: session.expires_at,
            created_at: session.created_at,
        }
    }
}

/// Generic acknowledgement body.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    /// Human-readable confirmation
    pub message: String,
}

/// Health check body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "healthy" or "degraded"
    pub status: String,
    /// Service identifier
    pub service: String,
    /// Current server time, RFC 3339
    pub timestamp: String,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_validation() {
        let ok = RegisterRequest {
            email: "alice@example.com".to_string(),
            username: "alice".to_string(),
            password: "SecurePass123!".to_string(),
            phone: None,
        };
        assert!(ok.validate().is_ok());

        let bad_email = RegisterRequest {
            email: "not-an-email".to_string(),
            ..ok.clone()
        };
        assert!(bad_email.validate().is_err());

        let short_password = RegisterRequest {
            password: "short".to_string(),
            ..ok.clone()
        };
        assert!(short_password.validate().is_err());

        let bad_username = RegisterRequest {
            username: "_x".to_string(),
            ..ok
        };
        assert!(bad_username.validate().is_err());
    }

    #[test]
    fn test_login_request_accepts_any_identifier_kind() {
        for identifier in ["alice@example.com", "alice", "+15551234567"] {
            let request = LoginRequest {
                identifier: identifier.to_string(),
                password: "pw".to_string(),
                application_id: None,
            };
            assert!(request.validate().is_ok(), "{} rejected", identifier);
        }
    }

    #[test]
    fn test_otp_code_length_enforced() {
        let request = PasswordlessCompleteRequest {
            identifier: "bob@example.com".to_string(),
            code: "12345".to_string(),
        };
        assert!(request.validate().is_err());

        let request = PasswordlessCompleteRequest {
            identifier: "bob@example.com".to_string(),
            code: "123456".to_string(),
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_camel_case_wire_format() {
        let json = r#"{"refreshToken":"abc"}"#;
        let request: RefreshTokenRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.refresh_token, "abc");
    }
}
