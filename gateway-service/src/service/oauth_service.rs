//! # OAuth 2.0 / OIDC Provider Service
//!
//! The authorization server: authorization endpoint state machine, token
//! endpoint (all supported grants), introspection (RFC 7662), revocation
//! (RFC 7009), UserInfo, discovery, and the device grant (RFC 8628).
//!
//! ## Token Shapes
//!
//! | Grant | Access token | Refresh token |
//! |-------|--------------|---------------|
//! | authorization_code / device / password | RS256 JWT (user identity + roles, `application_id` = client's tenant) | opaque, hashed row |
//! | client_credentials | opaque, hashed row (no user) | none |
//!
//! Every user-bound issuance also records a session ledger row so the
//! device-management surface sees OAuth sessions alongside first-party
//! ones.
//!
//! ## Serialization Points
//!
//! Code redemption and device transitions are conditional row updates in
//! the repository; this service only interprets their outcomes. A replayed
//! authorization code revokes everything minted from its first redemption.

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use shared::auth::jwt::TokenSubject;
use shared::crypto;
use shared::errors::{ApiError, OAuthErrorKind};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::events::{EventEmitter, OAuthCodeIssued, OAuthTokensIssued};
use crate::domain::{
    AuthorizationCode, ClientType, DeviceCodeStatus, DeviceInfo, GrantType, NewAuthorizationCode,
    NewDeviceCode, NewOAuthAccessToken, NewOAuthRefreshToken, NewSession, OAuthClient, User,
};
use crate::repository::{
    CodeRedemption, OAuthClientRepository, OAuthTokenRepository, RefreshRotation,
    SessionRepository, UserRepository,
};
use crate::service::{RateLimiter, RbacService, TokenService};

// =============================================================================
// REQUEST / RESPONSE TYPES
// =============================================================================

/// Parsed authorization endpoint request.
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    /// `code` is supported; anything else fails
    pub response_type: String,
    /// Requesting client
    pub client_id: String,
    /// Must exactly match a registered URI
    pub redirect_uri: String,
    /// Space-delimited requested scopes; empty falls back to defaults
    pub scope: Option<String>,
    /// Opaque client state, echoed back
    pub state: Option<String>,
    /// PKCE challenge
    pub code_challenge: Option<String>,
    /// "S256" or "plain" (defaults to "plain" when a challenge is present)
    pub code_challenge_method: Option<String>,
    /// OIDC nonce
    pub nonce: Option<String>,
    /// "none" / "consent" / absent
    pub prompt: Option<String>,
}

/// Authorization endpoint outcome, interpreted by the HTTP glue.
#[derive(Debug)]
pub enum AuthorizeOutcome {
    /// Success: redirect back with `code` (+ `state`).
    Redirect {
        /// Where to send the user agent
        redirect_uri: String,
        /// The freshly minted authorization code (plaintext)
        code: String,
        /// Echoed state
        state: Option<String>,
    },
    /// A consent prompt must be shown before a code can be issued.
    ConsentRequired {
        /// The client asking
        client_id: String,
        /// Scopes the user would grant
        scopes: Vec<String>,
    },
    /// No authenticated session: the glue redirects to the login UI.
    LoginRequired,
}

/// Token endpoint request (form-decoded by the glue).
#[derive(Debug, Clone, Default)]
pub struct TokenRequest {
    /// Wire grant type identifier
    pub grant_type: String,
    /// authorization_code grant
    pub code: Option<String>,
    /// authorization_code grant
    pub redirect_uri: Option<String>,
    /// PKCE verifier
    pub code_verifier: Option<String>,
    /// refresh_token grant
    pub refresh_token: Option<String>,
    /// Optional scope narrowing / client_credentials scopes
    pub scope: Option<String>,
    /// device_code grant
    pub device_code: Option<String>,
    /// password grant
    pub username: Option<String>,
    /// password grant
    pub password: Option<String>,
    /// Body client authentication
    pub client_id: Option<String>,
    /// Body client authentication
    pub client_secret: Option<String>,
}

/// RFC 6749 token endpoint success body.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    /// The access token (JWT or opaque)
    pub access_token: String,
    /// Always "Bearer"
    pub token_type: &'static str,
    /// Seconds until the access token expires
    pub expires_in: i64,
    /// Refresh token for user-bound grants
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// OIDC ID token when `openid` was granted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Space-delimited granted scopes
    pub scope: String,
}

/// RFC 7662 introspection body.
#[derive(Debug, Serialize)]
pub struct IntrospectionResponse {
    /// Whether the token is currently good for anything
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<&'static str>,
}

impl IntrospectionResponse {
    /// The RFC-mandated "tell them nothing" response.
    pub fn inactive() -> Self {
        Self {
            active: false,
            scope: None,
            client_id: None,
            username: None,
            sub: None,
            exp: None,
            token_type: None,
        }
    }
}

/// RFC 8628 device authorization response.
#[derive(Debug, Serialize)]
pub struct DeviceAuthorizationResponse {
    /// Opaque code the device polls with
    pub device_code: String,
    /// Human-typable `XXXX-XXXX` code
    pub user_code: String,
    /// Where the user enters the code
    pub verification_uri: String,
    /// Verification URI with the code pre-filled
    pub verification_uri_complete: String,
    /// Seconds until the grant expires
    pub expires_in: i64,
    /// Minimum seconds between polls
    pub interval: i64,
}

/// OIDC discovery document (subset the gateway implements).
#[derive(Debug, Serialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub introspection_endpoint: String,
    pub revocation_endpoint: String,
    pub userinfo_endpoint: String,
    pub device_authorization_endpoint: String,
    pub end_session_endpoint: String,
    pub jwks_uri: String,
    pub response_types_supported: Vec<&'static str>,
    pub grant_types_supported: Vec<&'static str>,
    pub scopes_supported: Vec<&'static str>,
    pub code_challenge_methods_supported: Vec<&'static str>,
    pub id_token_signing_alg_values_supported: Vec<&'static str>,
    pub token_endpoint_auth_methods_supported: Vec<&'static str>,
}

// =============================================================================
// PKCE
// =============================================================================

/// Verifies a PKCE verifier against the bound challenge.
///
/// `S256`: `base64url(SHA256(verifier)) == challenge`, compared in
/// constant time. `plain`: direct constant-time equality.
pub fn verify_pkce(method: &str, challenge: &str, verifier: &str) -> bool {
    match method {
        "S256" => {
            let digest = Sha256::digest(verifier.as_bytes());
            let computed = URL_SAFE_NO_PAD.encode(digest);
            crypto::constant_time_compare(&computed, challenge)
        }
        "plain" => crypto::constant_time_compare(verifier, challenge),
        _ => false,
    }
}

// =============================================================================
// SERVICE
// =============================================================================

/// The authorization server.
#[derive(Clone)]
pub struct OAuthService {
    clients: OAuthClientRepository,
    grants: OAuthTokenRepository,
    users: UserRepository,
    sessions: SessionRepository,
    tokens: TokenService,
    rbac: RbacService,
    rate_limiter: RateLimiter,
    auth_code_ttl_seconds: u64,
    device_code_ttl_seconds: u64,
    device_poll_interval_seconds: u64,
    device_verification_uri: String,
    events: EventEmitter,
}

impl OAuthService {
    /// Creates the service over its collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        clients: OAuthClientRepository,
        grants: OAuthTokenRepository,
        users: UserRepository,
        sessions: SessionRepository,
        tokens: TokenService,
        rbac: RbacService,
        rate_limiter: RateLimiter,
        oauth_config: &shared::config::OAuthConfig,
    ) -> Self {
        Self {
            clients,
            grants,
            users,
            sessions,
            tokens,
            rbac,
            rate_limiter,
            // Authorization codes live at most ten minutes
            auth_code_ttl_seconds: oauth_config.authorization_code_ttl_seconds.min(600),
            device_code_ttl_seconds: oauth_config.device_code_ttl_seconds,
            device_poll_interval_seconds: oauth_config.device_poll_interval_seconds,
            device_verification_uri: oauth_config.device_verification_uri.clone(),
            events: EventEmitter,
        }
    }

    // =========================================================================
    // AUTHORIZATION ENDPOINT
    // =========================================================================

    /// Runs the authorization endpoint state machine for an optionally
    /// authenticated user.
    pub async fn authorize(
        &self,
        request: &AuthorizeRequest,
        user: Option<&User>,
    ) -> Result<AuthorizeOutcome, ApiError> {
        let client = self.resolve_client(&request.client_id).await?;
        if !client.is_active {
            return Err(ApiError::oauth(
                OAuthErrorKind::UnauthorizedClient,
                "client is not active",
            ));
        }

        // Exact-match only: no wildcarding, no path normalization. A
        // mismatch is returned directly, never via redirect.
        if !client.allows_redirect_uri(&request.redirect_uri) {
            return Err(ApiError::oauth(
                OAuthErrorKind::InvalidRequest,
                "redirect_uri is not registered for this client",
            ));
        }

        if request.response_type != "code" {
            return Err(ApiError::oauth(
                OAuthErrorKind::UnsupportedResponseType,
                "only response_type=code is supported",
            ));
        }

        if !client.allows_grant(GrantType::AuthorizationCode) {
            return Err(ApiError::oauth(
                OAuthErrorKind::UnauthorizedClient,
                "client may not use the authorization code grant",
            ));
        }

        // PKCE: mandatory for public clients and require_pkce clients
        let challenge_method = match (&request.code_challenge, &request.code_challenge_method) {
            (Some(_), Some(method)) if method == "S256" || method == "plain" => {
                Some(method.clone())
            }
            (Some(_), Some(_)) => {
                return Err(ApiError::oauth(
                    OAuthErrorKind::InvalidRequest,
                    "code_challenge_method must be S256 or plain",
                ))
            }
            // RFC 7636 §4.3: method defaults to plain
            (Some(_), None) => Some("plain".to_string()),
            (None, _) if client.pkce_required() => {
                return Err(ApiError::oauth(
                    OAuthErrorKind::InvalidRequest,
                    "code_challenge is required for this client",
                ))
            }
            (None, _) => None,
        };

        let scopes = self.resolve_scopes(&client, request.scope.as_deref())?;

        let prompt = request.prompt.as_deref();

        let Some(user) = user else {
            if prompt == Some("none") {
                // Redirect-style error, not a 4xx: the glue maps
                // login_required onto the redirect URI
                return Err(ApiError::oauth(
                    OAuthErrorKind::LoginRequired,
                    "no active session",
                ));
            }
            return Ok(AuthorizeOutcome::LoginRequired);
        };

        // Consent: required by client policy without a covering grant, or
        // forced by prompt=consent
        let needs_consent = if prompt == Some("consent") {
            true
        } else if client.require_consent {
            let consents = self.clients.find_consents(user.user_id, &client.client_id).await?;
            !consents.iter().any(|c| c.covers(&scopes))
        } else {
            false
        };

        if needs_consent {
            if prompt == Some("none") {
                return Err(ApiError::oauth(
                    OAuthErrorKind::ConsentRequired,
                    "consent is required",
                ));
            }
            return Ok(AuthorizeOutcome::ConsentRequired {
                client_id: client.client_id.clone(),
                scopes,
            });
        }

        // Mint the code: opaque plaintext out, HMAC digest at rest
        let code = crypto::generate_token();
        let scope = scopes.join(" ");
        let expires_at = Utc::now() + ChronoDuration::seconds(self.auth_code_ttl_seconds as i64);

        self.grants
            .create_code(NewAuthorizationCode {
                code_hash: self.tokens.hasher().hash(&code),
                client_id: client.client_id.clone(),
                user_id: user.user_id,
                redirect_uri: request.redirect_uri.clone(),
                scope: scope.clone(),
                code_challenge: request.code_challenge.clone(),
                code_challenge_method: challenge_method,
                nonce: request.nonce.clone(),
                expires_at,
            })
            .await?;

        info!(client_id = %client.client_id, user_id = %user.user_id, "authorization code issued");
        self.events.emit(&OAuthCodeIssued {
            client_id: client.client_id.clone(),
            user_id: user.user_id,
            scope,
            occurred_at: Utc::now(),
        });

        Ok(AuthorizeOutcome::Redirect {
            redirect_uri: request.redirect_uri.clone(),
            code,
            state: request.state.clone(),
        })
    }

    /// Authenticates a client presented outside the token endpoint
    /// (introspection, revocation).
    pub async fn verify_client(
        &self,
        client_id: &str,
        client_secret: Option<&str>,
    ) -> Result<OAuthClient, ApiError> {
        let request = TokenRequest {
            client_id: Some(client_id.to_string()),
            client_secret: client_secret.map(str::to_string),
            ..TokenRequest::default()
        };
        self.authenticate_client(&request, None).await
    }

    /// Records a consent grant after the user approved the prompt.
    pub async fn grant_consent(
        &self,
        user_id: Uuid,
        client_id: &str,
        scopes: &[String],
    ) -> Result<(), ApiError> {
        self.clients.grant_consent(user_id, client_id, scopes).await?;
        Ok(())
    }

    // =========================================================================
    // TOKEN ENDPOINT
    // =========================================================================

    /// Token endpoint dispatch over `grant_type`.
    ///
    /// `basic_auth` carries HTTP Basic client credentials when present;
    /// body credentials are the fallback.
    pub async fn token(
        &self,
        request: &TokenRequest,
        basic_auth: Option<(String, String)>,
        device: &DeviceInfo,
    ) -> Result<TokenResponse, ApiError> {
        let client = self.authenticate_client(request, basic_auth).await?;

        let grant = GrantType::parse(&request.grant_type).ok_or_else(|| {
            ApiError::oauth(
                OAuthErrorKind::UnsupportedGrantType,
                format!("unsupported grant_type {}", request.grant_type),
            )
        })?;

        if !client.allows_grant(grant) {
            return Err(ApiError::oauth(
                OAuthErrorKind::UnauthorizedClient,
                "client may not use this grant type",
            ));
        }

        let response = match grant {
            GrantType::AuthorizationCode => {
                self.grant_authorization_code(&client, request, device).await?
            }
            GrantType::RefreshToken => self.grant_refresh(&client, request, device).await?,
            GrantType::ClientCredentials => self.grant_client_credentials(&client, request).await?,
            GrantType::DeviceCode => self.grant_device_code(&client, request, device).await?,
            GrantType::Password => {
                return Err(ApiError::oauth(
                    OAuthErrorKind::UnauthorizedClient,
                    "the password grant is only available through the first-party flow",
                ))
            }
        };

        self.events.emit(&OAuthTokensIssued {
            client_id: client.client_id.clone(),
            user_id: None,
            grant_type: grant.as_str().to_string(),
            occurred_at: Utc::now(),
        });

        Ok(response)
    }

    /// Like [`Self::token`], but with a first-party password-grant hook:
    /// the glue calls this variant with a credential verifier closure
    /// result when `grant_type=password` arrives for a first-party client.
    pub async fn token_with_password_user(
        &self,
        request: &TokenRequest,
        basic_auth: Option<(String, String)>,
        user: User,
        device: &DeviceInfo,
    ) -> Result<TokenResponse, ApiError> {
        let client = self.authenticate_client(request, basic_auth).await?;

        if !client.first_party || !client.allows_grant(GrantType::Password) {
            return Err(ApiError::oauth(
                OAuthErrorKind::UnauthorizedClient,
                "client may not use the password grant",
            ));
        }

        let scopes = self.resolve_scopes(&client, request.scope.as_deref())?;
        let response = self
            .mint_user_tokens(&client, &user, &scopes, None, None, device)
            .await?;

        self.events.emit(&OAuthTokensIssued {
            client_id: client.client_id.clone(),
            user_id: Some(user.user_id),
            grant_type: GrantType::Password.as_str().to_string(),
            occurred_at: Utc::now(),
        });

        Ok(response)
    }

    /// `authorization_code` grant: single-use redemption, redirect and
    /// PKCE verification, token minting.
    async fn grant_authorization_code(
        &self,
        client: &OAuthClient,
        request: &TokenRequest,
        device: &DeviceInfo,
    ) -> Result<TokenResponse, ApiError> {
        let code = request
            .code
            .as_deref()
            .ok_or_else(|| ApiError::oauth(OAuthErrorKind::InvalidRequest, "code is required"))?;

        let code_row = match self.grants.redeem_code(&self.tokens.hasher().hash(code)).await? {
            CodeRedemption::Redeemed(row) => row,
            CodeRedemption::Replayed(row) => {
                // Second redemption: refuse AND kill the first redemption's
                // tokens
                let revoked = self.grants.revoke_tokens_for_code(row.code_id).await?;
                warn!(
                    client_id = %row.client_id,
                    tokens_revoked = revoked,
                    "authorization code replay"
                );
                return Err(ApiError::invalid_grant("authorization code already used"));
            }
            CodeRedemption::Expired | CodeRedemption::Unknown => {
                return Err(ApiError::invalid_grant("invalid authorization code"));
            }
        };

        self.validate_redeemed_code(client, request, &code_row)?;

        let user = self
            .users
            .find_by_id(code_row.user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| ApiError::invalid_grant("account is not active"))?;

        let scopes: Vec<String> = code_row.scope.split_whitespace().map(str::to_string).collect();

        self.mint_user_tokens(
            client,
            &user,
            &scopes,
            Some(code_row.code_id),
            code_row.nonce.clone(),
            device,
        )
        .await
    }

    /// Pure checks over a freshly redeemed code: client binding, redirect
    /// binding, PKCE relation.
    fn validate_redeemed_code(
        &self,
        client: &OAuthClient,
        request: &TokenRequest,
        code_row: &AuthorizationCode,
    ) -> Result<(), ApiError> {
        if code_row.client_id != client.client_id {
            return Err(ApiError::invalid_grant("code was issued to another client"));
        }

        match request.redirect_uri.as_deref() {
            Some(uri) if uri == code_row.redirect_uri => {}
            _ => {
                return Err(ApiError::invalid_grant(
                    "redirect_uri does not match the authorization request",
                ))
            }
        }

        if let (Some(challenge), Some(method)) =
            (&code_row.code_challenge, &code_row.code_challenge_method)
        {
            let verifier = request.code_verifier.as_deref().ok_or_else(|| {
                ApiError::invalid_grant("code_verifier is required")
            })?;
            if !verify_pkce(method, challenge, verifier) {
                return Err(ApiError::invalid_grant("PKCE verification failed"));
            }
        }

        Ok(())
    }

    /// `refresh_token` grant: rotation with reuse handling; scope may
    /// narrow, never widen.
    async fn grant_refresh(
        &self,
        client: &OAuthClient,
        request: &TokenRequest,
        device: &DeviceInfo,
    ) -> Result<TokenResponse, ApiError> {
        let presented = request.refresh_token.as_deref().ok_or_else(|| {
            ApiError::oauth(OAuthErrorKind::InvalidRequest, "refresh_token is required")
        })?;
        let old_hash = self.tokens.hasher().hash(presented);

        let old = match self.grants.rotate_refresh(&old_hash).await? {
            RefreshRotation::Rotated(row) => row,
            RefreshRotation::Invalid => {
                // Reuse of an already-rotated token kills its family
                if let Some(stale) = self.grants.find_refresh_by_hash(&old_hash).await? {
                    warn!(client_id = %stale.client_id, "oauth refresh token reuse");
                    self.grants.revoke_refresh_cascade(&stale).await?;
                }
                return Err(ApiError::invalid_grant("invalid refresh token"));
            }
        };

        if old.client_id != client.client_id {
            return Err(ApiError::invalid_grant("token was issued to another client"));
        }

        let user_id = old
            .user_id
            .ok_or_else(|| ApiError::invalid_grant("refresh token carries no user"))?;
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| ApiError::invalid_grant("account is not active"))?;

        // Scope may narrow, never widen
        let old_scopes = old.scopes();
        let scopes = match request.scope.as_deref() {
            Some(requested) => {
                let requested: Vec<String> =
                    requested.split_whitespace().map(str::to_string).collect();
                if !requested.iter().all(|s| old_scopes.contains(s)) {
                    return Err(ApiError::oauth(
                        OAuthErrorKind::InvalidScope,
                        "scope may not exceed the original grant",
                    ));
                }
                requested
            }
            None => old_scopes,
        };

        // The old pair's session leaves the ledger with it
        self.sessions.revoke_by_hash(&old_hash).await?;

        self.mint_user_tokens(client, &user, &scopes, old.auth_code_id, None, device)
            .await
    }

    /// `client_credentials` grant: machine tokens without a user.
    async fn grant_client_credentials(
        &self,
        client: &OAuthClient,
        request: &TokenRequest,
    ) -> Result<TokenResponse, ApiError> {
        if client.client_type() != ClientType::Confidential {
            return Err(ApiError::oauth(
                OAuthErrorKind::UnauthorizedClient,
                "client_credentials requires a confidential client",
            ));
        }

        let scopes = self.resolve_scopes(client, request.scope.as_deref())?;
        let scope = scopes.join(" ");

        // Opaque token: there is no user identity to carry, so the row is
        // the token's entire substance
        let access_token = crypto::generate_token();
        let expires_at =
            Utc::now() + ChronoDuration::seconds(client.access_token_ttl_seconds);

        self.grants
            .create_access_token(NewOAuthAccessToken {
                token_hash: self.tokens.hasher().hash(&access_token),
                client_id: client.client_id.clone(),
                user_id: None,
                scope: scope.clone(),
                expires_at,
                auth_code_id: None,
            })
            .await?;

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer",
            expires_in: client.access_token_ttl_seconds,
            refresh_token: None,
            id_token: None,
            scope,
        })
    }

    /// Device grant polling (RFC 8628 §3.4/§3.5).
    async fn grant_device_code(
        &self,
        client: &OAuthClient,
        request: &TokenRequest,
        device: &DeviceInfo,
    ) -> Result<TokenResponse, ApiError> {
        let presented = request.device_code.as_deref().ok_or_else(|| {
            ApiError::oauth(OAuthErrorKind::InvalidRequest, "device_code is required")
        })?;
        let device_hash = self.tokens.hasher().hash(presented);

        let row = self
            .grants
            .find_device_by_hash(&device_hash)
            .await?
            .filter(|r| r.client_id == client.client_id)
            .ok_or_else(|| ApiError::invalid_grant("unknown device code"))?;

        // Poll pacing rides on the cache; a second poll inside the
        // interval loses the SET NX race
        let interval = Duration::from_secs(row.interval_seconds.max(1) as u64);
        if !self
            .rate_limiter
            .device_poll_allowed(&device_hash, interval)
            .await?
        {
            return Err(ApiError::oauth(
                OAuthErrorKind::SlowDown,
                "polling faster than the advertised interval",
            ));
        }

        if row.expires_at <= Utc::now() && row.status() == DeviceCodeStatus::Pending {
            self.grants.expire_device(row.device_code_id).await?;
            return Err(ApiError::oauth(
                OAuthErrorKind::ExpiredToken,
                "device code expired",
            ));
        }

        match row.status() {
            DeviceCodeStatus::Pending => Err(ApiError::oauth(
                OAuthErrorKind::AuthorizationPending,
                "authorization is pending",
            )),
            DeviceCodeStatus::Denied => Err(ApiError::oauth(
                OAuthErrorKind::AccessDenied,
                "the user denied the request",
            )),
            DeviceCodeStatus::Expired | DeviceCodeStatus::Consumed => Err(ApiError::oauth(
                OAuthErrorKind::ExpiredToken,
                "device code expired",
            )),
            DeviceCodeStatus::Authorized => {
                // Terminal consumption is conditional; a racing poll loses
                let consumed = self
                    .grants
                    .consume_device(&device_hash)
                    .await?
                    .ok_or_else(|| ApiError::invalid_grant("device code already redeemed"))?;

                let user_id = consumed
                    .user_id
                    .ok_or_else(|| ApiError::invalid_grant("device code carries no user"))?;
                let user = self
                    .users
                    .find_by_id(user_id)
                    .await?
                    .filter(|u| u.is_active)
                    .ok_or_else(|| ApiError::invalid_grant("account is not active"))?;

                let scopes: Vec<String> =
                    consumed.scope.split_whitespace().map(str::to_string).collect();

                self.mint_user_tokens(client, &user, &scopes, None, None, device)
                    .await
            }
        }
    }

    // =========================================================================
    // DEVICE AUTHORIZATION ENDPOINT
    // =========================================================================

    /// Starts a device grant (RFC 8628 §3.1/§3.2).
    pub async fn device_authorize(
        &self,
        client_id: &str,
        scope: Option<&str>,
    ) -> Result<DeviceAuthorizationResponse, ApiError> {
        let client = self.resolve_client(client_id).await?;
        if !client.is_active || !client.allows_grant(GrantType::DeviceCode) {
            return Err(ApiError::oauth(
                OAuthErrorKind::UnauthorizedClient,
                "client may not use the device grant",
            ));
        }

        let scopes = self.resolve_scopes(&client, scope)?;

        let device_code = crypto::generate_token();
        let user_code = crypto::generate_user_code();
        let expires_at = Utc::now() + ChronoDuration::seconds(self.device_code_ttl_seconds as i64);

        self.grants
            .create_device_code(NewDeviceCode {
                device_code_hash: self.tokens.hasher().hash(&device_code),
                user_code: user_code.clone(),
                client_id: client.client_id.clone(),
                scope: scopes.join(" "),
                verification_uri: self.device_verification_uri.clone(),
                interval_seconds: self.device_poll_interval_seconds as i32,
                expires_at,
            })
            .await?;

        let verification_uri_complete =
            format!("{}?user_code={}", self.device_verification_uri, user_code);

        Ok(DeviceAuthorizationResponse {
            device_code,
            user_code,
            verification_uri: self.device_verification_uri.clone(),
            verification_uri_complete,
            expires_in: self.device_code_ttl_seconds as i64,
            interval: self.device_poll_interval_seconds as i64,
        })
    }

    /// The signed-in user approves a device grant by its user code.
    pub async fn approve_device(&self, user_code: &str, user_id: Uuid) -> Result<(), ApiError> {
        let row = self
            .grants
            .find_pending_by_user_code(user_code)
            .await?
            .ok_or_else(|| ApiError::NotFound {
                resource: "device code".to_string(),
            })?;

        if !self.grants.approve_device(row.device_code_id, user_id).await? {
            // Lost the race against denial or expiry
            return Err(ApiError::Conflict {
                resource: "device code".to_string(),
            });
        }

        Ok(())
    }

    /// The signed-in user declines a device grant.
    pub async fn deny_device(&self, user_code: &str) -> Result<(), ApiError> {
        let row = self
            .grants
            .find_pending_by_user_code(user_code)
            .await?
            .ok_or_else(|| ApiError::NotFound {
                resource: "device code".to_string(),
            })?;

        self.grants.deny_device(row.device_code_id).await?;
        Ok(())
    }

    // =========================================================================
    // INTROSPECTION & REVOCATION
    // =========================================================================

    /// RFC 7662: resolve a presented token as JWT or hashed opaque and
    /// report its state. Any failure collapses to `{active: false}`.
    pub async fn introspect(&self, token: &str) -> Result<IntrospectionResponse, ApiError> {
        // JWT access token path: signature + expiry + blacklist
        if let Ok(claims) = self.tokens.validate_access(token, None).await {
            // A matching ledger row must also be live (revocation wins)
            let row = self
                .grants
                .find_access_by_hash(&self.tokens.hasher().hash(token))
                .await?;
            if let Some(row) = &row {
                if !row.is_usable(Utc::now()) {
                    return Ok(IntrospectionResponse::inactive());
                }
            }

            return Ok(IntrospectionResponse {
                active: true,
                scope: row.map(|r| r.scope),
                client_id: None,
                username: Some(claims.username),
                sub: Some(claims.sub.to_string()),
                exp: Some(claims.exp),
                token_type: Some("access_token"),
            });
        }

        let hash = self.tokens.hasher().hash(token);
        let now = Utc::now();

        // Opaque access token (client credentials)
        if let Some(row) = self.grants.find_access_by_hash(&hash).await? {
            if row.is_usable(now) {
                return Ok(IntrospectionResponse {
                    active: true,
                    scope: Some(row.scope),
                    client_id: Some(row.client_id),
                    username: None,
                    sub: row.user_id.map(|u| u.to_string()),
                    exp: Some(row.expires_at.timestamp()),
                    token_type: Some("access_token"),
                });
            }
            return Ok(IntrospectionResponse::inactive());
        }

        // Opaque refresh token
        if let Some(row) = self.grants.find_refresh_by_hash(&hash).await? {
            if row.is_usable(now) {
                return Ok(IntrospectionResponse {
                    active: true,
                    scope: Some(row.scope),
                    client_id: Some(row.client_id),
                    username: None,
                    sub: row.user_id.map(|u| u.to_string()),
                    exp: Some(row.expires_at.timestamp()),
                    token_type: Some("refresh_token"),
                });
            }
        }

        Ok(IntrospectionResponse::inactive())
    }

    /// RFC 7009: revoke whatever the token turns out to be. Always
    /// succeeds once the client is authenticated.
    pub async fn revoke(&self, token: &str) -> Result<(), ApiError> {
        let hash = self.tokens.hasher().hash(token);

        if let Some(refresh) = self.grants.find_refresh_by_hash(&hash).await? {
            self.grants.revoke_refresh_cascade(&refresh).await?;
            self.sessions.revoke_by_hash(&hash).await?;
            return Ok(());
        }

        if let Some(access) = self.grants.find_access_by_hash(&hash).await? {
            self.grants.revoke_access_token(access.token_id).await?;
        }

        // JWT access tokens are additionally blacklisted by jti until
        // natural expiry
        if let Ok(claims) = self.tokens.jwt().validate_access_token(token) {
            let expires_at = DateTime::<Utc>::from_timestamp(claims.exp, 0).unwrap_or_else(Utc::now);
            self.tokens
                .blacklist_jti(claims.jti, Some(claims.sub), expires_at)
                .await?;
        }

        Ok(())
    }

    // =========================================================================
    // USERINFO & DISCOVERY
    // =========================================================================

    /// OIDC UserInfo: identity claims filtered by the granted scopes.
    pub async fn userinfo(&self, access_token: &str) -> Result<serde_json::Value, ApiError> {
        let claims = self.tokens.validate_access(access_token, None).await?;

        let user = self
            .users
            .find_by_id(claims.sub)
            .await?
            .ok_or(ApiError::InvalidToken)?;

        // Scope comes from the token's ledger row; tokens minted outside
        // OAuth (first-party) expose only the basic subject
        let scopes: Vec<String> = self
            .grants
            .find_access_by_hash(&self.tokens.hasher().hash(access_token))
            .await?
            .map(|row| row.scope.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        let has = |s: &str| scopes.iter().any(|x| x == s);

        let mut body = serde_json::json!({ "sub": user.user_id.to_string() });
        if has("email") {
            body["email"] = serde_json::json!(user.email);
            body["email_verified"] = serde_json::json!(user.email_verified);
        }
        if has("profile") {
            body["preferred_username"] = serde_json::json!(user.username);
        }
        if has("phone") {
            if let Some(phone) = &user.phone {
                body["phone_number"] = serde_json::json!(phone);
                body["phone_number_verified"] = serde_json::json!(user.phone_verified);
            }
        }

        Ok(body)
    }

    /// The discovery document under `/.well-known/openid-configuration`.
    pub fn discovery(&self) -> DiscoveryDocument {
        let issuer = self.tokens.jwt().issuer().trim_end_matches('/').to_string();

        DiscoveryDocument {
            authorization_endpoint: format!("{}/oauth2/authorize", issuer),
            token_endpoint: format!("{}/oauth2/token", issuer),
            introspection_endpoint: format!("{}/oauth2/introspect", issuer),
            revocation_endpoint: format!("{}/oauth2/revoke", issuer),
            userinfo_endpoint: format!("{}/oauth2/userinfo", issuer),
            device_authorization_endpoint: format!("{}/oauth2/device/code", issuer),
            end_session_endpoint: format!("{}/oauth2/logout", issuer),
            jwks_uri: format!("{}/.well-known/jwks.json", issuer),
            issuer,
            response_types_supported: vec!["code"],
            grant_types_supported: vec![
                "authorization_code",
                "refresh_token",
                "client_credentials",
                "urn:ietf:params:oauth:grant-type:device_code",
                "password",
            ],
            scopes_supported: vec!["openid", "profile", "email", "phone", "offline_access"],
            code_challenge_methods_supported: vec!["S256", "plain"],
            id_token_signing_alg_values_supported: vec!["RS256"],
            token_endpoint_auth_methods_supported: vec![
                "client_secret_basic",
                "client_secret_post",
            ],
        }
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    async fn resolve_client(&self, client_id: &str) -> Result<OAuthClient, ApiError> {
        self.clients
            .find_by_client_id(client_id)
            .await?
            .ok_or_else(|| ApiError::oauth(OAuthErrorKind::InvalidClient, "unknown client"))
    }

    /// Authenticates the token-endpoint caller: HTTP Basic first, body
    /// credentials second. Confidential clients must prove their secret;
    /// public clients only name themselves.
    async fn authenticate_client(
        &self,
        request: &TokenRequest,
        basic_auth: Option<(String, String)>,
    ) -> Result<OAuthClient, ApiError> {
        let (client_id, secret) = match basic_auth {
            Some((id, secret)) => (id, Some(secret)),
            None => (
                request.client_id.clone().ok_or_else(|| {
                    ApiError::oauth(OAuthErrorKind::InvalidClient, "client authentication required")
                })?,
                request.client_secret.clone(),
            ),
        };

        let client = self.resolve_client(&client_id).await?;
        if !client.is_active {
            return Err(ApiError::oauth(
                OAuthErrorKind::InvalidClient,
                "client is not active",
            ));
        }

        match client.client_type() {
            ClientType::Confidential => {
                let (Some(secret), Some(stored)) = (secret, &client.client_secret_hash) else {
                    return Err(ApiError::oauth(
                        OAuthErrorKind::InvalidClient,
                        "client secret required",
                    ));
                };
                if !self.tokens.hasher().verify(&secret, stored) {
                    return Err(ApiError::oauth(
                        OAuthErrorKind::InvalidClient,
                        "client authentication failed",
                    ));
                }
            }
            ClientType::Public => {
                // Public clients cannot hold secrets; identification only
            }
        }

        Ok(client)
    }

    /// Requested scopes → granted scopes: fall back to the client's
    /// defaults, refuse anything outside the allowance.
    fn resolve_scopes(
        &self,
        client: &OAuthClient,
        requested: Option<&str>,
    ) -> Result<Vec<String>, ApiError> {
        let scopes: Vec<String> = match requested {
            Some(raw) if !raw.trim().is_empty() => {
                raw.split_whitespace().map(str::to_string).collect()
            }
            _ => client.default_scopes.0.clone(),
        };

        if !client.allows_scopes(&scopes) {
            return Err(ApiError::oauth(
                OAuthErrorKind::InvalidScope,
                "a requested scope is not allowed for this client",
            ));
        }

        Ok(scopes)
    }

    /// Mints the full user-bound token set: JWT access token (tenant-bound
    /// to the client's application), opaque refresh token, optional ID
    /// token, ledger rows, and a session.
    async fn mint_user_tokens(
        &self,
        client: &OAuthClient,
        user: &User,
        scopes: &[String],
        auth_code_id: Option<Uuid>,
        nonce: Option<String>,
        device: &DeviceInfo,
    ) -> Result<TokenResponse, ApiError> {
        let scope = scopes.join(" ");
        let now = Utc::now();

        let roles = self
            .rbac
            .get_user_role_names(user.user_id, Some(client.application_id))
            .await?;
        let subject = TokenSubject {
            user_id: user.user_id,
            email: user.email.clone(),
            username: user.username.clone(),
            roles,
            is_active: user.is_active,
            application_id: Some(client.application_id),
        };

        let access_token = self
            .tokens
            .jwt()
            .generate_access_token(&subject, Some(client.access_token_ttl_seconds as u64))?;
        let access_claims = self.tokens.jwt().validate_access_token(&access_token)?;
        let access_expires_at = now + ChronoDuration::seconds(client.access_token_ttl_seconds);

        let access_row = self
            .grants
            .create_access_token(NewOAuthAccessToken {
                token_hash: self.tokens.hasher().hash(&access_token),
                client_id: client.client_id.clone(),
                user_id: Some(user.user_id),
                scope: scope.clone(),
                expires_at: access_expires_at,
                auth_code_id,
            })
            .await?;

        let refresh_token = crypto::generate_token();
        let refresh_expires_at = now + ChronoDuration::seconds(client.refresh_token_ttl_seconds);
        let refresh_hash = self.tokens.hasher().hash(&refresh_token);

        self.grants
            .create_refresh_token(NewOAuthRefreshToken {
                token_hash: refresh_hash.clone(),
                client_id: client.client_id.clone(),
                user_id: Some(user.user_id),
                scope: scope.clone(),
                expires_at: refresh_expires_at,
                access_token_id: Some(access_row.token_id),
                auth_code_id,
            })
            .await?;

        // The ledger sees OAuth sessions alongside first-party ones
        self.sessions
            .create(NewSession {
                user_id: user.user_id,
                token_hash: refresh_hash,
                access_token_jti: access_claims.jti,
                application_id: Some(client.application_id),
                device_type: device.device_type.clone(),
                device_os: device.os.clone(),
                device_browser: device.browser.clone(),
                ip_address: device.ip_address.clone(),
                user_agent: device.user_agent.clone(),
                session_name: device.session_name(),
                expires_at: refresh_expires_at,
            })
            .await?;

        let id_token = if scopes.iter().any(|s| s == "openid") {
            Some(self.tokens.jwt().mint_id_token(
                user.user_id,
                &client.client_id,
                nonce,
                scopes,
                client.id_token_ttl_seconds as u64,
                (&user.email, user.email_verified),
                &user.username,
                user.phone.as_deref(),
            )?)
        } else {
            None
        };

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer",
            expires_in: client.access_token_ttl_seconds,
            refresh_token: Some(refresh_token),
            id_token,
            scope,
        })
    }
}

impl std::fmt::Debug for OAuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthService").finish_non_exhaustive()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 7636 Appendix B test vector
    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    #[test]
    fn test_pkce_s256_rfc_vector() {
        assert!(verify_pkce("S256", CHALLENGE, VERIFIER));
    }

    #[test]
    fn test_pkce_s256_rejects_tampered_verifier() {
        assert!(!verify_pkce("S256", CHALLENGE, "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXl"));
        assert!(!verify_pkce("S256", CHALLENGE, ""));
    }

    #[test]
    fn test_pkce_plain_is_direct_equality() {
        assert!(verify_pkce("plain", "abc-123", "abc-123"));
        assert!(!verify_pkce("plain", "abc-123", "abc-124"));
        // plain never applies the S256 relation
        assert!(!verify_pkce("plain", CHALLENGE, VERIFIER));
    }

    #[test]
    fn test_pkce_unknown_method_fails() {
        assert!(!verify_pkce("S512", CHALLENGE, VERIFIER));
        assert!(!verify_pkce("", "x", "x"));
    }

    #[test]
    fn test_inactive_introspection_carries_nothing() {
        let body = serde_json::to_value(IntrospectionResponse::inactive()).unwrap();
        assert_eq!(body, serde_json::json!({ "active": false }));
    }
}
