//! # User Entities
//!
//! The directory half of the data model: user accounts, the lockout
//! counter, and the password reuse history.
//!
//! ```text
//! ┌─────────────────────┐        ┌────────────────────────┐
//! │        User         │ 1    1 │    AccountLockout      │
//! ├─────────────────────┤────────├────────────────────────┤
//! │ - user_id (PK)      │        │ - user_id (PK/FK)      │
//! │ - email (unique)    │        │ - failed_attempts      │
//! │ - username (unique) │        │ - locked_until         │
//! │ - phone (unique?)   │        └────────────────────────┘
//! │ - password_hash     │ 1    N ┌────────────────────────┐
//! │ - totp_secret       │────────│    PasswordHistory     │
//! │ - is_active         │        └────────────────────────┘
//! └─────────────────────┘
//! ```
//!
//! ## Security Considerations
//!
//! - **Never expose `password_hash` or `totp_secret`**: use [`UserProfile`]
//!   for API responses
//! - **Deactivation** halts login and token refresh; it does **not**
//!   retroactively invalidate already-issued access tokens — that requires
//!   blacklisting

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// =============================================================================
// ACCOUNT TYPE
// =============================================================================

/// Whether an account belongs to a person or a machine.
///
/// Service accounts can hold API keys and roles but never complete
/// interactive flows (password login, OTP, consent screens).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    /// Interactive end user
    Human,
    /// Machine identity (bots, workers)
    Service,
}

impl AccountType {
    /// String form stored in the `account_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Service => "service",
        }
    }

    /// Parses the stored column value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "human" => Some(Self::Human),
            "service" => Some(Self::Service),
            _ => None,
        }
    }
}

// =============================================================================
// USER ENTITY
// =============================================================================

/// Complete user record as stored in the `users` table.
///
/// Contains sensitive fields; convert to [`UserProfile`] before any API
/// response.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    /// Unique identifier (UUID v4)
    pub user_id: Uuid,
    /// Email address, unique, normalized to lowercase
    pub email: String,
    /// Username, unique
    pub username: String,
    /// Phone number in E.164, unique when present
    pub phone: Option<String>,
    /// Argon2id hash in PHC format. Empty-string sentinel is never used:
    /// passwordless accounts hold NULL.
    pub password_hash: Option<String>,
    /// "human" or "service"
    pub account_type: String,
    /// Whether the email was proven via OTP or verification link
    pub email_verified: bool,
    /// Whether the phone was proven via OTP
    pub phone_verified: bool,
    /// Base32 TOTP secret, present once 2FA enrollment starts
    pub totp_secret: Option<String>,
    /// True only after the user confirmed one valid TOTP code
    pub totp_enabled: bool,
    /// Forces a password rotation when in the past
    pub password_expires_at: Option<DateTime<Utc>>,
    /// Deactivated accounts cannot sign in or refresh
    pub is_active: bool,
    /// Timestamp of last successful sign-in
    pub last_login_at: Option<DateTime<Utc>>,
    /// Account creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Account type as an enum; unknown stored values collapse to `Human`,
    /// which is the more restrictive interpretation for machine flows.
    pub fn account_type(&self) -> AccountType {
        AccountType::parse(&self.account_type).unwrap_or(AccountType::Human)
    }

    /// Whether the password has passed its expiry.
    pub fn password_is_expired(&self, now: DateTime<Utc>) -> bool {
        self.password_expires_at.is_some_and(|at| at <= now)
    }
}

// =============================================================================
// USER PROFILE (SAFE FOR API RESPONSES)
// =============================================================================

/// Public user view without credential material.
///
/// Serialized as camelCase for JavaScript/TypeScript consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Unique user identifier
    pub user_id: Uuid,
    /// Email address
    pub email: String,
    /// Username
    pub username: String,
    /// Phone number, if any
    pub phone: Option<String>,
    /// "human" or "service"
    pub account_type: String,
    /// Email verification status
    pub email_verified: bool,
    /// Phone verification status
    pub phone_verified: bool,
    /// Whether a second factor is required at sign-in
    pub totp_enabled: bool,
    /// Account active flag
    pub is_active: bool,
    /// Last sign-in timestamp
    pub last_login_at: Option<DateTime<Utc>>,
    /// Account creation timestamp
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    /// Strips `password_hash` and `totp_secret`.
    fn from(user: User) -> Self {
        Self {
            user_id: user.user_id,
            email: user.email,
            username: user.username,
            phone: user.phone,
            account_type: user.account_type,
            email_verified: user.email_verified,
            phone_verified: user.phone_verified,
            totp_enabled: user.totp_enabled,
            is_active: user.is_active,
            last_login_at: user.last_login_at,
            created_at: user.created_at,
        }
    }
}

// =============================================================================
// CREATION DTO
// =============================================================================

/// Data required to create a user. The password, when present, must be
/// pre-hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Normalized email
    pub email: String,
    /// Username
    pub username: String,
    /// Normalized E.164 phone
    pub phone: Option<String>,
    /// Argon2id PHC string; NULL for passwordless accounts
    pub password_hash: Option<String>,
    /// "human" or "service"
    pub account_type: AccountType,
    /// Set true when registration proved possession (OTP)
    pub email_verified: bool,
    /// Set true when registration proved possession via SMS
    pub phone_verified: bool,
}

// =============================================================================
// ACCOUNT LOCKOUT
// =============================================================================

/// Persistent failed-attempt counter backing the lockout policy.
///
/// One row per user, created on first failure. A successful sign-in (or
/// `reset_after` of quiet) deletes it.
#[derive(Debug, Clone, FromRow)]
pub struct AccountLockout {
    /// User the counter belongs to
    pub user_id: Uuid,
    /// Consecutive failures within the reset window
    pub failed_attempts: i32,
    /// Timestamp of the latest failure
    pub last_failed_attempt: DateTime<Utc>,
    /// When set and in the future, sign-in fails with `account_locked`
    pub locked_until: Option<DateTime<Utc>>,
}

impl AccountLockout {
    /// Whether the account is locked at `now`.
    ///
    /// Checked **before** password verification so timing does not
    /// distinguish a locked account from a wrong password.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }
}

// =============================================================================
// PASSWORD HISTORY
// =============================================================================

/// A previously used password hash, kept to block reuse of the last N
/// passwords on change.
#[derive(Debug, Clone, FromRow)]
pub struct PasswordHistory {
    /// Row id
    pub history_id: Uuid,
    /// Owner
    pub user_id: Uuid,
    /// The retired Argon2id hash
    pub password_hash: String,
    /// When this hash was rotated out
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_user() -> User {
        User {
            user_id: Uuid::new_v4(),
            email: "alice@example.com".to_string(),
            username: "alice".to_string(),
            phone: None,
            password_hash: Some("$argon2id$...".to_string()),
            account_type: "human".to_string(),
            email_verified: true,
            phone_verified: false,
            totp_secret: None,
            totp_enabled: false,
            password_expires_at: None,
            is_active: true,
            last_login_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_account_type_round_trip() {
        assert_eq!(AccountType::parse("human"), Some(AccountType::Human));
        assert_eq!(AccountType::parse("service"), Some(AccountType::Service));
        assert_eq!(AccountType::parse("robot"), None);
        assert_eq!(AccountType::Service.as_str(), "service");
    }

    #[test]
    fn test_unknown_account_type_defaults_to_human() {
        let mut user = sample_user();
        user.account_type = "mystery".to_string();
        assert_eq!(user.account_type(), AccountType::Human);
    }

    #[test]
    fn test_password_expiry() {
        let now = Utc::now();
        let mut user = sample_user();

        assert!(!user.password_is_expired(now));

        user.password_expires_at = Some(now - Duration::days(1));
        assert!(user.password_is_expired(now));

        user.password_expires_at = Some(now + Duration::days(30));
        assert!(!user.password_is_expired(now));
    }

    #[test]
    fn test_profile_strips_credentials() {
        let user = sample_user();
        let json = serde_json::to_value(UserProfile::from(user)).unwrap();

        assert!(json.get("passwordHash").is_none());
        assert!(json.get("password_hash").is_none());
        assert!(json.get("totpSecret").is_none());
        assert_eq!(json["email"], "alice@example.com");
    }

    #[test]
    fn test_lockout_window() {
        let now = Utc::now();
        let mut lockout = AccountLockout {
            user_id: Uuid::new_v4(),
            failed_attempts: 5,
            last_failed_attempt: now,
            locked_until: Some(now + Duration::minutes(15)),
        };
        assert!(lockout.is_locked(now));

        lockout.locked_until = Some(now - Duration::seconds(1));
        assert!(!lockout.is_locked(now));

        lockout.locked_until = None;
        assert!(!lockout.is_locked(now));
    }
}
