//! # One-Time PIN Entities
//!
//! Hashed-at-rest OTP rows plus the cache-resident pending-registration
//! blob of the two-step passwordless flow.
//!
//! ## Single-Use Invariant
//!
//! A successful verification marks the row `used` **and** invalidates all
//! unused sibling codes of the same `(identity, type)` in one statement, so
//! an older code cannot be replayed after a newer one verified.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// =============================================================================
// OTP TYPE
// =============================================================================

/// Purpose of an OTP code. Rate limits and verification are keyed by
/// `(identity, type)`, so a login code cannot satisfy a password reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpType {
    /// Prove ownership of an email/phone on an existing account
    Verification,
    /// Password reset flow
    PasswordReset,
    /// Second factor during password sign-in
    TwoFactor,
    /// Passwordless sign-in
    Login,
    /// Passwordless registration (init/complete)
    Registration,
}

impl OtpType {
    /// String form stored in the `otp_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Verification => "verification",
            Self::PasswordReset => "password_reset",
            Self::TwoFactor => "2fa",
            Self::Login => "login",
            Self::Registration => "registration",
        }
    }

    /// Parses the stored column value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "verification" => Some(Self::Verification),
            "password_reset" => Some(Self::PasswordReset),
            "2fa" => Some(Self::TwoFactor),
            "login" => Some(Self::Login),
            "registration" => Some(Self::Registration),
            _ => None,
        }
    }
}

// =============================================================================
// OTP IDENTITY
// =============================================================================

/// The out-of-band identity a code was delivered to. Exactly one of
/// email/phone is populated on the row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtpIdentity {
    /// Normalized email address
    Email(String),
    /// Normalized E.164 phone number
    Phone(String),
}

impl OtpIdentity {
    /// The raw identity string, for cache keys and delivery.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Email(s) | Self::Phone(s) => s,
        }
    }

    /// Email column value for the row.
    pub fn email(&self) -> Option<&str> {
        match self {
            Self::Email(s) => Some(s),
            Self::Phone(_) => None,
        }
    }

    /// Phone column value for the row.
    pub fn phone(&self) -> Option<&str> {
        match self {
            Self::Phone(s) => Some(s),
            Self::Email(_) => None,
        }
    }
}

// =============================================================================
// OTP ROW
// =============================================================================

/// Stored OTP (`otps` table). Exactly one of `email`/`phone` is set.
#[derive(Debug, Clone, FromRow)]
pub struct Otp {
    /// Unique identifier
    pub otp_id: Uuid,
    /// Delivery email, mutually exclusive with `phone`
    pub email: Option<String>,
    /// Delivery phone, mutually exclusive with `email`
    pub phone: Option<String>,
    /// HMAC digest of the 6-digit code
    pub code_hash: String,
    /// Purpose, see [`OtpType`]
    pub otp_type: String,
    /// Set on successful verification or sibling invalidation
    pub used: bool,
    /// Codes expire 10 minutes after issuance by default
    pub expires_at: DateTime<Utc>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Data for inserting an OTP row.
#[derive(Debug, Clone)]
pub struct NewOtp {
    /// Delivery identity
    pub identity: OtpIdentity,
    /// HMAC digest of the generated code
    pub code_hash: String,
    /// Purpose
    pub otp_type: OtpType,
    /// Expiry timestamp
    pub expires_at: DateTime<Utc>,
}

// =============================================================================
// PENDING REGISTRATION
// =============================================================================

/// Cache-resident blob of a passwordless registration in flight.
///
/// Stored at `reg:{identifier}` with a TTL equal to the OTP lifetime.
/// Losing it is acceptable — the user re-initiates the flow. Completing
/// registration reads **and deletes** the blob atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRegistration {
    /// Normalized email, when registering by email
    pub email: Option<String>,
    /// Normalized phone, when registering by phone
    pub phone: Option<String>,
    /// Desired username
    pub username: String,
    /// Tenant the registration arrived through, if any
    pub application_id: Option<Uuid>,
    /// When the init step ran
    pub initiated_at: DateTime<Utc>,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_otp_type_round_trip() {
        for t in [
            OtpType::Verification,
            OtpType::PasswordReset,
            OtpType::TwoFactor,
            OtpType::Login,
            OtpType::Registration,
        ] {
            assert_eq!(OtpType::parse(t.as_str()), Some(t));
        }
        assert_eq!(OtpType::parse("bogus"), None);
    }

    #[test]
    fn test_two_factor_wire_name() {
        // Stored as "2fa", not "two_factor"
        assert_eq!(OtpType::TwoFactor.as_str(), "2fa");
    }

    #[test]
    fn test_identity_columns_are_exclusive() {
        let email = OtpIdentity::Email("alice@example.com".to_string());
        assert_eq!(email.email(), Some("alice@example.com"));
        assert_eq!(email.phone(), None);

        let phone = OtpIdentity::Phone("+15551234567".to_string());
        assert_eq!(phone.phone(), Some("+15551234567"));
        assert_eq!(phone.email(), None);
    }

    #[test]
    fn test_pending_registration_serializes_for_cache() {
        let blob = PendingRegistration {
            email: Some("bob@example.com".to_string()),
            phone: None,
            username: "bob".to_string(),
            application_id: None,
            initiated_at: Utc::now(),
        };

        let json = serde_json::to_string(&blob).unwrap();
        let back: PendingRegistration = serde_json::from_str(&json).unwrap();
        assert_eq!(back.email.as_deref(), Some("bob@example.com"));
        assert_eq!(back.username, "bob");
    }
}
