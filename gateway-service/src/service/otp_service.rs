//! # OTP Service
//!
//! Generate → hash → store → deliver → verify, with per-identity rate
//! limits and single-use semantics.
//!
//! ## Flow
//!
//! ```text
//! send(identity, type)
//!   ├── RateLimiter: count sends in window, else rate_limited
//!   ├── generate 6-digit code (CSPRNG, uniform)
//!   ├── insert row { code_hash: HMAC(code), expires_at: now + TTL }
//!   └── MessagingService: deliver via email/SMS profile
//!
//! verify(identity, type, code)
//!   ├── find newest unused row matching HMAC(code)
//!   ├── consume: used = TRUE + invalidate siblings (single statement race)
//!   └── failure never discloses whether identity or code was wrong
//! ```

use chrono::{Duration as ChronoDuration, Utc};
use shared::config::OtpConfig;
use shared::crypto::{self, TokenHasher};
use shared::errors::ApiError;
use uuid::Uuid;

use crate::domain::events::{EventEmitter, OtpSent, OtpVerified};
use crate::domain::{NewOtp, OtpIdentity, OtpType};
use crate::repository::OtpRepository;
use crate::service::messaging::{MessageKind, MessagingService};
use crate::service::RateLimiter;

/// One-time PIN orchestration.
#[derive(Clone)]
pub struct OtpService {
    repository: OtpRepository,
    hasher: TokenHasher,
    messaging: MessagingService,
    rate_limiter: RateLimiter,
    config: OtpConfig,
    events: EventEmitter,
}

impl OtpService {
    /// Creates the service over its collaborators.
    pub fn new(
        repository: OtpRepository,
        hasher: TokenHasher,
        messaging: MessagingService,
        rate_limiter: RateLimiter,
        config: OtpConfig,
    ) -> Self {
        Self {
            repository,
            hasher,
            messaging,
            rate_limiter,
            config,
            events: EventEmitter,
        }
    }

    /// The configured code lifetime.
    pub fn ttl(&self) -> ChronoDuration {
        ChronoDuration::seconds(self.config.ttl_seconds as i64)
    }

    // =========================================================================
    // SEND
    // =========================================================================

    /// Generates and delivers a code to an identity.
    ///
    /// # Errors
    ///
    /// - `ApiError::RateLimited` when the send window is exhausted
    /// - `ApiError::ServiceUnavailable` when delivery fails
    pub async fn send(
        &self,
        identity: &OtpIdentity,
        otp_type: OtpType,
        application_id: Option<Uuid>,
    ) -> Result<(), ApiError> {
        self.rate_limiter
            .check_otp_send(otp_type.as_str(), identity.as_str())
            .await?;

        let code = crypto::generate_otp_code();
        let expires_at = Utc::now() + self.ttl();

        self.repository
            .create(NewOtp {
                identity: identity.clone(),
                code_hash: self.hasher.hash(&code),
                otp_type,
                expires_at,
            })
            .await?;

        let ttl_minutes = (self.config.ttl_seconds / 60).max(1).to_string();
        let vars: &[(&str, &str)] = &[("code", &code), ("ttl_minutes", &ttl_minutes)];

        match identity {
            OtpIdentity::Email(email) => {
                self.messaging
                    .send_email(application_id, email, MessageKind::OtpCode, vars)
                    .await?;
            }
            OtpIdentity::Phone(phone) => {
                self.messaging
                    .send_sms(phone, MessageKind::OtpCode, vars)
                    .await?;
            }
        }

        self.events.emit(&OtpSent {
            identity: identity.as_str().to_string(),
            otp_type: otp_type.as_str().to_string(),
            occurred_at: Utc::now(),
        });

        Ok(())
    }

    // =========================================================================
    // VERIFY
    // =========================================================================

    /// Verifies a code.
    ///
    /// Single-use: success consumes the row and invalidates unused
    /// siblings of the same `(identity, type)`. The same
    /// `invalid_credentials` covers wrong code, expired code, and unknown
    /// identity — callers must not learn which.
    pub async fn verify(
        &self,
        identity: &OtpIdentity,
        otp_type: OtpType,
        code: &str,
    ) -> Result<(), ApiError> {
        // Lookup goes by the hash itself, so comparison cost does not
        // depend on how close the guess was
        let code_hash = self.hasher.hash(code);

        let otp = self
            .repository
            .find_matching(identity, otp_type, &code_hash)
            .await?
            .ok_or(ApiError::InvalidCredentials)?;

        let consumed = self.repository.consume(otp.otp_id, identity, otp_type).await?;
        if !consumed {
            // A concurrent verifier won the row
            return Err(ApiError::InvalidCredentials);
        }

        self.events.emit(&OtpVerified {
            identity: identity.as_str().to_string(),
            otp_type: otp_type.as_str().to_string(),
            occurred_at: Utc::now(),
        });

        Ok(())
    }
}

impl std::fmt::Debug for OtpService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtpService").finish_non_exhaustive()
    }
}
