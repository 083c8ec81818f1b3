//! # Domain Events
//!
//! Structured audit events emitted by the services. The gateway is only
//! the **producer**: events are serialized and handed to the emitter,
//! whose current sink is the structured log stream. Downstream audit
//! persistence is an external concern.
//!
//! ## Available Events
//!
//! | Event | Trigger |
//! |--------------------|-----------------------------------|
//! | `user.registered` | Registration (password or passwordless) completed |
//! | `user.login` | Successful sign-in |
//! | `user.login_failed` | Failed sign-in attempt |
//! | `user.locked` | Lockout threshold reached |
//! | `token.refreshed` | Refresh rotation succeeded |
//! | `token.reuse_detected` | A rotated refresh token was presented again |
//! | `session.revoked` | Sign-out or selective revocation |
//! | `otp.sent` / `otp.verified` | OTP lifecycle |
//! | `api_key.created` / `api_key.revoked` | API key lifecycle |
//! | `oauth.code_issued` / `oauth.tokens_issued` | Authorization server activity |
//! | `exchange.created` / `exchange.redeemed` | Cross-application token exchange |

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

// =============================================================================
// BASE EVENT TRAIT
// =============================================================================

/// Common interface for all domain events.
pub trait DomainEvent: Serialize + Send + Sync {
    /// Event type name for routing/filtering (e.g. `user.login`).
    fn event_type(&self) -> &'static str;

    /// When the event occurred.
    fn occurred_at(&self) -> DateTime<Utc>;
}

// =============================================================================
// EVENT EMITTER
// =============================================================================

/// Hands events to the configured sink.
///
/// The sink is the structured log stream; audit persistence subscribes to
/// it externally. Emission is infallible by design — a failing audit sink
/// must never fail the authentication path.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventEmitter;

impl EventEmitter {
    /// Emits one event.
    pub fn emit<E: DomainEvent>(&self, event: &E) {
        match serde_json::to_string(event) {
            Ok(payload) => {
                tracing::info!(
                    target: "audit",
                    event = event.event_type(),
                    payload = %payload,
                    "domain event"
                );
            }
            Err(e) => {
                tracing::warn!(event = event.event_type(), error = %e, "unserializable domain event");
            }
        }
    }
}

/// Declares an event struct and its `DomainEvent` impl in one place.
macro_rules! domain_event {
    ($(#[$doc:meta])* $name:ident, $event_type:literal { $($(#[$fdoc:meta])* $field:ident: $ty:ty),* $(,)? }) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Serialize)]
        pub struct $name {
            $($(#[$fdoc])* pub $field: $ty,)*
            /// When the event occurred
            pub occurred_at: DateTime<Utc>,
        }

        impl DomainEvent for $name {
            fn event_type(&self) -> &'static str {
                $event_type
            }

            fn occurred_at(&self) -> DateTime<Utc> {
                self.occurred_at
            }
        }
    };
}

// =============================================================================
// ACCOUNT EVENTS
// =============================================================================

domain_event!(
    /// A new user completed registration.
    UserRegistered, "user.registered" {
        /// The new account
        user_id: Uuid,
        /// Registered email
        email: String,
        /// Whether the flow was passwordless (OTP-proven)
        passwordless: bool,
        /// Tenant the registration arrived through
        application_id: Option<Uuid>,
    }
);

domain_event!(
    /// Successful sign-in.
    UserLoggedIn, "user.login" {
        /// The account
        user_id: Uuid,
        /// Client IP, when known
        ip_address: Option<String>,
        /// Session recorded for this sign-in
        session_id: Uuid,
    }
);

domain_event!(
    /// Failed sign-in attempt (wrong password, unknown identity is not
    /// distinguished).
    LoginFailed, "user.login_failed" {
        /// The targeted account, when it exists
        user_id: Option<Uuid>,
        /// Presented identifier (normalized)
        identifier: String,
        /// Client IP, when known
        ip_address: Option<String>,
    }
);

domain_event!(
    /// The lockout threshold was reached.
    AccountLocked, "user.locked" {
        /// The locked account
        user_id: Uuid,
        /// When the lock expires
        locked_until: DateTime<Utc>,
    }
);

// =============================================================================
// TOKEN & SESSION EVENTS
// =============================================================================

domain_event!(
    /// Refresh rotation succeeded.
    TokenRefreshed, "token.refreshed" {
        /// The account
        user_id: Uuid,
        /// The replaced session
        old_session_id: Uuid,
        /// The replacement session
        new_session_id: Uuid,
    }
);

domain_event!(
    /// A rotated refresh token was presented again; the whole family was
    /// revoked.
    TokenReuseDetected, "token.reuse_detected" {
        /// The affected account
        user_id: Uuid,
        /// How many sessions were revoked in response
        sessions_revoked: u64,
    }
);

domain_event!(
    /// One or more sessions were revoked.
    SessionRevoked, "session.revoked" {
        /// The account
        user_id: Uuid,
        /// Number of sessions affected
        count: u64,
        /// "sign_out", "sign_out_all", "reuse_detected", "password_changed"
        reason: String,
    }
);

// =============================================================================
// OTP EVENTS
// =============================================================================

domain_event!(
    /// An OTP was generated and queued for delivery.
    OtpSent, "otp.sent" {
        /// Delivery identity (email or phone, normalized)
        identity: String,
        /// Code purpose
        otp_type: String,
    }
);

domain_event!(
    /// An OTP verified successfully.
    OtpVerified, "otp.verified" {
        /// Delivery identity
        identity: String,
        /// Code purpose
        otp_type: String,
    }
);

// =============================================================================
// API KEY EVENTS
// =============================================================================

domain_event!(
    /// An API key was issued.
    ApiKeyCreated, "api_key.created" {
        /// Key row id
        api_key_id: Uuid,
        /// Owning user
        user_id: Uuid,
        /// Identification prefix (never the plaintext)
        key_prefix: String,
    }
);

domain_event!(
    /// An API key was revoked.
    ApiKeyRevoked, "api_key.revoked" {
        /// Key row id
        api_key_id: Uuid,
        /// Owning user
        user_id: Uuid,
    }
);

// =============================================================================
// OAUTH EVENTS
// =============================================================================

domain_event!(
    /// The authorization endpoint issued a code.
    OAuthCodeIssued, "oauth.code_issued" {
        /// Receiving client
        client_id: String,
        /// Authorizing user
        user_id: Uuid,
        /// Granted scopes (space-delimited)
        scope: String,
    }
);

domain_event!(
    /// The token endpoint issued tokens.
    OAuthTokensIssued, "oauth.tokens_issued" {
        /// Receiving client
        client_id: String,
        /// Resource owner; NULL for client credentials
        user_id: Option<Uuid>,
        /// Grant type used
        grant_type: String,
    }
);

// =============================================================================
// TOKEN EXCHANGE EVENTS
// =============================================================================

domain_event!(
    /// A cross-application exchange code was minted.
    ExchangeCreated, "exchange.created" {
        /// The subject user
        user_id: Uuid,
        /// Application the token was issued for
        source_application_id: Uuid,
        /// Application the code targets
        target_application_id: Uuid,
    }
);

domain_event!(
    /// An exchange code was redeemed for a target-scoped token pair.
    ExchangeRedeemed, "exchange.redeemed" {
        /// The subject user
        user_id: Uuid,
        /// Redeeming application
        target_application_id: Uuid,
    }
);

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_types_are_namespaced() {
        let event = UserLoggedIn {
            user_id: Uuid::new_v4(),
            ip_address: None,
            session_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
        };
        assert_eq!(event.event_type(), "user.login");
    }

    #[test]
    fn test_events_serialize() {
        let event = TokenReuseDetected {
            user_id: Uuid::new_v4(),
            sessions_revoked: 3,
            occurred_at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["sessions_revoked"], 3);
        assert!(json["occurred_at"].is_string());
    }

    #[test]
    fn test_emitter_never_panics() {
        let emitter = EventEmitter;
        emitter.emit(&OtpSent {
            identity: "alice@example.com".to_string(),
            otp_type: "registration".to_string(),
            occurred_at: Utc::now(),
        });
    }
}
