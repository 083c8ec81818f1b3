//! # Session Ledger Entities
//!
//! Refresh tokens materialized as device-bound sessions, plus the
//! access-token blacklist rows.
//!
//! ## Session Lifecycle
//!
//! ```text
//! issue tokens ──► Session { revoked_at: NULL }
//!       │
//!       ├── refresh ──► old row revoked, new row created (rotation)
//!       ├── sign-out ──► revoked_at = NOW()  (monotone)
//!       └── expiry ──► swept by the cleanup job
//! ```
//!
//! Revocation is monotone: once `revoked_at` is set it never clears, and
//! concurrent revocations are idempotent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// =============================================================================
// SESSION
// =============================================================================

/// One refresh-token-backed session (`sessions` table).
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    /// Unique identifier
    pub session_id: Uuid,
    /// Owning user
    pub user_id: Uuid,
    /// HMAC digest of the refresh token envelope
    pub token_hash: String,
    /// `jti` of the paired access token, blacklisted on revocation
    pub access_token_jti: Uuid,
    /// Tenant scope of the token pair, if any
    pub application_id: Option<Uuid>,
    /// Device class: desktop / mobile / tablet / bot / unknown
    pub device_type: String,
    /// Operating system as reported by the user agent
    pub device_os: String,
    /// Browser or client name
    pub device_browser: String,
    /// Client IP at issuance
    pub ip_address: Option<String>,
    /// Raw User-Agent header
    pub user_agent: Option<String>,
    /// Human-readable label ("Chrome on macOS")
    pub session_name: String,
    /// Bumped on refresh and activity touches
    pub last_active_at: DateTime<Utc>,
    /// Hard expiry, mirrors the refresh token TTL
    pub expires_at: DateTime<Utc>,
    /// Monotone revocation marker
    pub revoked_at: Option<DateTime<Utc>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Valid ⇔ not revoked ∧ not expired.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

/// Data for recording a session at token issuance.
#[derive(Debug, Clone)]
pub struct NewSession {
    /// Owning user
    pub user_id: Uuid,
    /// HMAC digest of the refresh token
    pub token_hash: String,
    /// `jti` of the paired access token
    pub access_token_jti: Uuid,
    /// Tenant scope
    pub application_id: Option<Uuid>,
    /// Device class
    pub device_type: String,
    /// Operating system
    pub device_os: String,
    /// Browser / client
    pub device_browser: String,
    /// Client IP
    pub ip_address: Option<String>,
    /// Raw User-Agent
    pub user_agent: Option<String>,
    /// Display label
    pub session_name: String,
    /// Expiry matching the refresh TTL
    pub expires_at: DateTime<Utc>,
}

// =============================================================================
// DEVICE INFO
// =============================================================================

/// Device context derived from request metadata, captured on every session.
///
/// Built by the transport layers (HTTP handlers and the RPC interceptor)
/// from `User-Agent`, `X-Forwarded-For`, and the client headers; the
/// session ledger persists its fields verbatim.
#[derive(Debug, Clone, Default)]
pub struct DeviceInfo {
    /// Device class: desktop / mobile / tablet / bot / unknown
    pub device_type: String,
    /// Operating system
    pub os: String,
    /// Browser or client name
    pub browser: String,
    /// Client IP, when known
    pub ip_address: Option<String>,
    /// Raw User-Agent header
    pub user_agent: Option<String>,
}

impl DeviceInfo {
    /// Human-readable session label ("Chrome on macOS").
    pub fn session_name(&self) -> String {
        match (self.browser.as_str(), self.os.as_str()) {
            ("unknown", "unknown") => "Unknown device".to_string(),
            (browser, "unknown") => browser.to_string(),
            ("unknown", os) => os.to_string(),
            (browser, os) => format!("{} on {}", browser, os),
        }
    }
}

// =============================================================================
// SESSION STATS
// =============================================================================

/// Aggregated counts over a user's active sessions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    /// Total active sessions
    pub total: i64,
    /// Active sessions grouped by device class
    pub by_device_type: Vec<SessionStatsBucket>,
    /// Active sessions grouped by OS
    pub by_os: Vec<SessionStatsBucket>,
    /// Active sessions grouped by browser
    pub by_browser: Vec<SessionStatsBucket>,
}

/// One `(label, count)` aggregation bucket.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SessionStatsBucket {
    /// Group label (e.g. "desktop", "macOS", "Chrome")
    pub label: String,
    /// Number of active sessions in the group
    pub count: i64,
}

// =============================================================================
// TOKEN BLACKLIST
// =============================================================================

/// Authoritative blacklist row (`token_blacklist` table).
///
/// The cache holds a fast-path copy; when the cache is down, this table
/// decides (fail closed). Rows self-expire via the cleanup sweeper.
#[derive(Debug, Clone, FromRow)]
pub struct BlacklistEntry {
    /// The blacklisted access token's `jti` (hashed token id)
    pub token_hash: String,
    /// Owner, when known (bulk sign-out sets it)
    pub user_id: Option<Uuid>,
    /// Natural expiry of the blacklisted token
    pub expires_at: DateTime<Utc>,
    /// When the entry was added
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_session() -> Session {
        let now = Utc::now();
        Session {
            session_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token_hash: "digest".to_string(),
            access_token_jti: Uuid::new_v4(),
            application_id: None,
            device_type: "desktop".to_string(),
            device_os: "macOS".to_string(),
            device_browser: "Chrome".to_string(),
            ip_address: Some("203.0.113.7".to_string()),
            user_agent: Some("Mozilla/5.0".to_string()),
            session_name: "Chrome on macOS".to_string(),
            last_active_at: now,
            expires_at: now + Duration::days(7),
            revoked_at: None,
            created_at: now,
        }
    }

    #[test]
    fn test_fresh_session_is_valid() {
        let session = sample_session();
        assert!(session.is_valid(Utc::now()));
    }

    #[test]
    fn test_revoked_session_is_invalid() {
        let mut session = sample_session();
        session.revoked_at = Some(Utc::now());
        assert!(!session.is_valid(Utc::now()));
    }

    #[test]
    fn test_expired_session_is_invalid() {
        let mut session = sample_session();
        session.expires_at = Utc::now() - Duration::seconds(1);
        assert!(!session.is_valid(Utc::now()));
    }
}
