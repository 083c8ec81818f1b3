//! # Token Exchange Service
//!
//! Cross-application single sign-on: mints a short-lived opaque code
//! binding `(user, source_app, target_app)` and redeems it for a token
//! pair scoped to the target application.
//!
//! ## Why Cache-Resident
//!
//! Exchange codes live at most 60 seconds and are single-use; they exist
//! only at `exchange:{code}` in the cache. `GETDEL` makes redemption
//! atomic, and losing a code under a cache restart merely forces the
//! source application to mint a new one.

use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use shared::config::OAuthConfig;
use shared::crypto;
use shared::errors::{ApiError, OAuthErrorKind};
use shared::redis_client::{keys, RedisClient};
use uuid::Uuid;

use crate::domain::events::{EventEmitter, ExchangeCreated, ExchangeRedeemed};
use crate::domain::DeviceInfo;
use crate::repository::UserRepository;
use crate::service::auth_service::AuthResponse;
use crate::service::{ApplicationService, AuthService, TokenService};

/// Cache payload behind an exchange code.
#[derive(Debug, Serialize, Deserialize)]
struct ExchangePayload {
    user_id: Uuid,
    source_app_id: Uuid,
    target_app_id: Uuid,
}

/// Result of minting an exchange code.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeCode {
    /// The opaque single-use code
    pub code: String,
    /// Hard expiry (≤ 60 s out)
    pub expires_at: DateTime<Utc>,
    /// First registered callback of the target application, when any
    pub target_redirect_url: Option<String>,
}

/// Cross-application token exchange.
#[derive(Clone)]
pub struct TokenExchangeService {
    users: UserRepository,
    tokens: TokenService,
    applications: ApplicationService,
    auth: AuthService,
    redis: RedisClient,
    config: OAuthConfig,
    events: EventEmitter,
}

impl TokenExchangeService {
    /// Creates the service over its collaborators.
    pub fn new(
        users: UserRepository,
        tokens: TokenService,
        applications: ApplicationService,
        auth: AuthService,
        redis: RedisClient,
        config: OAuthConfig,
    ) -> Self {
        Self {
            users,
            tokens,
            applications,
            auth,
            redis,
            config,
            events: EventEmitter,
        }
    }

    // =========================================================================
    // CREATE
    // =========================================================================

    /// Mints an exchange code for a validated access token.
    ///
    /// `source_app_id` comes from the **authenticated context** (the
    /// caller's application secret), never from the request body.
    pub async fn create_exchange(
        &self,
        access_token: &str,
        target_app_id: Uuid,
        source_app_id: Uuid,
    ) -> Result<ExchangeCode, ApiError> {
        // The token must verify against the source application's scope
        let claims = self
            .tokens
            .validate_access(access_token, Some(source_app_id))
            .await?;

        let target = self.applications.resolve_active(target_app_id).await?;

        // The user must be admitted by the target tenant (auto-provisions
        // the profile, honors bans)
        self.applications
            .get_or_create_profile(claims.sub, target_app_id)
            .await?;

        let code = crypto::generate_token();
        let ttl_seconds = self.config.exchange_code_ttl_seconds.min(60);
        let expires_at = Utc::now() + ChronoDuration::seconds(ttl_seconds as i64);

        self.redis
            .set(
                &keys::exchange(&code),
                &ExchangePayload {
                    user_id: claims.sub,
                    source_app_id,
                    target_app_id,
                },
                Some(Duration::from_secs(ttl_seconds)),
            )
            .await?;

        self.events.emit(&ExchangeCreated {
            user_id: claims.sub,
            source_application_id: source_app_id,
            target_application_id: target_app_id,
            occurred_at: Utc::now(),
        });

        Ok(ExchangeCode {
            code,
            expires_at,
            target_redirect_url: target.callback_urls.0.first().cloned(),
        })
    }

    // =========================================================================
    // REDEEM
    // =========================================================================

    /// Redeems a code for a token pair scoped to the target application.
    ///
    /// `redeeming_app_id` comes from the authenticated context. Only the
    /// bound target may redeem; redemption is single-use via `GETDEL`.
    pub async fn redeem_exchange(
        &self,
        code: &str,
        redeeming_app_id: Uuid,
        device: &DeviceInfo,
    ) -> Result<AuthResponse, ApiError> {
        let payload: ExchangePayload = self
            .redis
            .get_del(&keys::exchange(code))
            .await?
            .ok_or_else(|| ApiError::invalid_grant("unknown or expired exchange code"))?;

        if payload.target_app_id != redeeming_app_id {
            return Err(ApiError::oauth(
                OAuthErrorKind::InvalidTarget,
                "exchange code is bound to a different application",
            ));
        }

        let user = self
            .users
            .find_by_id(payload.user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| ApiError::invalid_grant("account is not active"))?;

        let response = self
            .auth
            .issue_for(&user, Some(payload.target_app_id), device)
            .await?;

        self.events.emit(&ExchangeRedeemed {
            user_id: user.user_id,
            target_application_id: payload.target_app_id,
            occurred_at: Utc::now(),
        });

        Ok(response)
    }
}

impl std::fmt::Debug for TokenExchangeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenExchangeService").finish_non_exhaustive()
    }
}
