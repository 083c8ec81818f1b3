//! # Authentication Service
//!
//! Core business logic for credential flows:
//! - Password sign-up / sign-in (with lockout and optional TOTP)
//! - Two-step passwordless registration (OTP-proven)
//! - Refresh rotation with reuse detection
//! - Sign-out (single and all-devices) with access-token blacklisting
//! - Password change with history enforcement
//!
//! ## Security Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Token Architecture                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  Access token (JWT, 15 min)          Refresh token (JWT envelope, 7 d)  │
//! │  stateless verification              HMAC(envelope) keys a session row  │
//! │  revocable only via blacklist        revocable via session ledger       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Error Discipline
//!
//! Credential failures never distinguish "unknown identity" from "wrong
//! secret". The lockout check runs **before** password verification so
//! timing does not reveal the lock state.

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use shared::auth::jwt::TokenPair;
use shared::auth::password::{PasswordHasher, PasswordValidator};
use shared::auth::totp::TotpVerifier;
use shared::config::{LockoutConfig, OAuthConfig};
use shared::crypto::{self, SecretBox};
use shared::errors::ApiError;
use shared::redis_client::{keys, RedisClient};
use shared::validation::{classify_identifier, LoginIdentifier};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::events::{
    AccountLocked, EventEmitter, LoginFailed, SessionRevoked, TokenReuseDetected, TokenRefreshed,
    UserLoggedIn, UserRegistered,
};
use crate::domain::{
    AccountType, DeviceInfo, NewUser, OtpIdentity, OtpType, PendingRegistration, User, UserProfile,
};
use crate::repository::{SessionRepository, SessionRotation, UserRepository};
use crate::service::{OtpService, RateLimiter, RbacService, TokenService};

/// Default role granted to self-registered users.
const DEFAULT_ROLE: &str = "user";

// =============================================================================
// RESPONSE TYPES
// =============================================================================

/// Response returned after successful authentication.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    /// Access and refresh tokens
    #[serde(flatten)]
    pub tokens: TokenPair,
    /// User profile (safe for clients)
    pub user: UserProfile,
    /// The session backing the refresh token
    pub session_id: Uuid,
}

/// Sign-in outcome: either tokens, or a second-factor challenge.
#[derive(Debug)]
pub enum LoginOutcome {
    /// Credentials accepted, tokens issued.
    Success(Box<AuthResponse>),
    /// Password accepted, TOTP required. The opaque token binds the
    /// challenge to the user for up to five minutes.
    TwoFactorRequired {
        /// Present together with the TOTP code to finish sign-in
        two_factor_token: String,
    },
}

/// Cache payload behind a pending 2FA challenge token.
#[derive(Debug, Serialize, Deserialize)]
struct TwoFactorChallenge {
    user_id: Uuid,
    application_id: Option<Uuid>,
}

// =============================================================================
// SERVICE
// =============================================================================

/// Authentication flows coordinator.
#[derive(Clone)]
pub struct AuthService {
    users: UserRepository,
    sessions: SessionRepository,
    tokens: TokenService,
    otp: OtpService,
    rbac: RbacService,
    rate_limiter: RateLimiter,
    password_hasher: PasswordHasher,
    secret_box: SecretBox,
    redis: RedisClient,
    lockout: LockoutConfig,
    oauth: OAuthConfig,
    events: EventEmitter,
}

impl AuthService {
    /// Creates the service over its collaborators.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        users: UserRepository,
        sessions: SessionRepository,
        tokens: TokenService,
        otp: OtpService,
        rbac: RbacService,
        rate_limiter: RateLimiter,
        password_hasher: PasswordHasher,
        secret_box: SecretBox,
        redis: RedisClient,
        lockout: LockoutConfig,
        oauth: OAuthConfig,
    ) -> Self {
        Self {
            users,
            sessions,
            tokens,
            otp,
            rbac,
            rate_limiter,
            password_hasher,
            secret_box,
            redis,
            lockout,
            oauth,
            events: EventEmitter,
        }
    }

    // =========================================================================
    // REGISTRATION (password)
    // =========================================================================

    /// Registers a user with a password.
    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
        phone: Option<String>,
        device: &DeviceInfo,
        application_id: Option<Uuid>,
    ) -> Result<AuthResponse, ApiError> {
        if let Err(problems) = PasswordValidator::validate(password) {
            return Err(ApiError::BadRequest {
                message: problems.join("; "),
            });
        }

        let email = shared::validation::normalize_email(email);
        let phone = match phone {
            Some(p) => Some(shared::validation::normalize_phone(&p)?),
            None => None,
        };

        let password_hash = self.password_hasher.hash(password)?;

        let user = self
            .users
            .create(NewUser {
                email: email.clone(),
                username: username.to_string(),
                phone,
                password_hash: Some(password_hash),
                account_type: AccountType::Human,
                email_verified: false,
                phone_verified: false,
            })
            .await?;

        self.grant_default_role(user.user_id).await;

        info!(user_id = %user.user_id, "user registered");

        let response = self.issue_for(&user, application_id, device).await?;

        self.events.emit(&UserRegistered {
            user_id: user.user_id,
            email,
            passwordless: false,
            application_id,
            occurred_at: Utc::now(),
        });

        Ok(response)
    }

    /// Creates a user on behalf of a trusted RPC caller, without issuing
    /// tokens (machine provisioning, directory sync).
    pub async fn create_user(
        &self,
        email: &str,
        username: &str,
        password: Option<&str>,
        phone: Option<String>,
        account_type: AccountType,
    ) -> Result<UserProfile, ApiError> {
        let password_hash = match password {
            Some(p) => {
                if let Err(problems) = PasswordValidator::validate(p) {
                    return Err(ApiError::BadRequest {
                        message: problems.join("; "),
                    });
                }
                Some(self.password_hasher.hash(p)?)
            }
            None => None,
        };

        let phone = match phone {
            Some(p) => Some(shared::validation::normalize_phone(&p)?),
            None => None,
        };

        let user = self
            .users
            .create(NewUser {
                email: shared::validation::normalize_email(email),
                username: username.to_string(),
                phone,
                password_hash,
                account_type,
                email_verified: false,
                phone_verified: false,
            })
            .await?;

        self.grant_default_role(user.user_id).await;

        info!(user_id = %user.user_id, "user provisioned via rpc");

        Ok(user.into())
    }

    // =========================================================================
    // PASSWORD SIGN-IN
    // =========================================================================

    /// Verifies an identifier/password pair, applying rate limits, the
    /// lockout policy, and account-state checks.
    ///
    /// Shared by the first-party sign-in flow and the OAuth password
    /// grant. Returns the authenticated user; the caller decides what to
    /// mint.
    pub async fn verify_password_credentials(
        &self,
        identifier: &str,
        password: &str,
        device: &DeviceInfo,
    ) -> Result<User, ApiError> {
        let identifier = classify_identifier(identifier)?;
        let identifier_str = identifier_display(&identifier);

        self.rate_limiter.check_login_attempt(&identifier_str).await?;

        let Some(user) = self.users.find_by_identifier(&identifier).await? else {
            // Same error as a wrong password: no enumeration
            warn!(identifier = %identifier_str, "sign-in for unknown identifier");
            self.emit_login_failed(None, &identifier_str, device);
            return Err(ApiError::InvalidCredentials);
        };

        // Lock state is decided before touching the password so the two
        // rejection paths are timing-indistinguishable
        let now = Utc::now();
        if let Some(lockout) = self.users.find_lockout(user.user_id).await? {
            if lockout.is_locked(now) {
                return Err(ApiError::AccountLocked {
                    until: lockout.locked_until,
                });
            }
        }

        let password_ok = match &user.password_hash {
            Some(hash) => self.password_hasher.verify(password, hash)?,
            None => false, // passwordless account, no password sign-in
        };

        if !password_ok {
            self.register_failure(&user, &identifier_str, device).await?;
            return Err(ApiError::InvalidCredentials);
        }

        if !user.is_active {
            return Err(ApiError::InvalidCredentials);
        }

        if user.password_is_expired(now) {
            return Err(ApiError::PasswordExpired);
        }

        self.users.clear_lockout(user.user_id).await?;

        // Parameter drift: re-hash with the current cost on success
        if let Some(hash) = &user.password_hash {
            if self.password_hasher.needs_rehash(hash) {
                let rehashed = self.password_hasher.hash(password)?;
                self.users.update_password(user.user_id, &rehashed).await?;
            }
        }

        self.users.update_last_login(user.user_id).await?;

        Ok(user)
    }

    /// Authenticates a user by identifier (email, username, or phone) and
    /// password.
    pub async fn login(
        &self,
        identifier: &str,
        password: &str,
        device: &DeviceInfo,
        application_id: Option<Uuid>,
    ) -> Result<LoginOutcome, ApiError> {
        let user = self
            .verify_password_credentials(identifier, password, device)
            .await?;

        if user.totp_enabled {
            let two_factor_token = self.mint_two_factor_token(&user, application_id).await?;
            return Ok(LoginOutcome::TwoFactorRequired { two_factor_token });
        }

        let response = self.issue_for(&user, application_id, device).await?;

        info!(user_id = %user.user_id, "user signed in");
        self.events.emit(&UserLoggedIn {
            user_id: user.user_id,
            ip_address: device.ip_address.clone(),
            session_id: response.session_id,
            occurred_at: Utc::now(),
        });

        Ok(LoginOutcome::Success(Box::new(response)))
    }

    /// Completes a sign-in that required a second factor.
    pub async fn login_two_factor(
        &self,
        two_factor_token: &str,
        totp_code: &str,
        device: &DeviceInfo,
    ) -> Result<AuthResponse, ApiError> {
        // Single-use challenge: GETDEL means a second submission of the
        // same token fails even with the right code
        let challenge: TwoFactorChallenge = self
            .redis
            .get_del(&keys::two_factor(two_factor_token))
            .await?
            .ok_or(ApiError::InvalidCredentials)?;

        let user = self
            .users
            .find_by_id(challenge.user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or(ApiError::InvalidCredentials)?;

        // TOTP secrets rest encrypted; decrypt just-in-time
        let secret = user
            .totp_secret
            .as_deref()
            .map(|blob| self.secret_box.decrypt(blob))
            .transpose()?
            .ok_or(ApiError::InvalidCredentials)?;

        if !TotpVerifier::verify(&secret, totp_code)? {
            self.emit_login_failed(Some(user.user_id), &user.email, device);
            return Err(ApiError::InvalidCredentials);
        }

        let response = self
            .issue_for(&user, challenge.application_id, device)
            .await?;

        info!(user_id = %user.user_id, "user signed in (2fa)");
        self.events.emit(&UserLoggedIn {
            user_id: user.user_id,
            ip_address: device.ip_address.clone(),
            session_id: response.session_id,
            occurred_at: Utc::now(),
        });

        Ok(response)
    }

    // =========================================================================
    // TOTP ENROLLMENT
    // =========================================================================

    /// Starts TOTP enrollment: generates a secret, stores it encrypted,
    /// and returns the provisioning URI for the authenticator app.
    ///
    /// `totp_enabled` stays false until [`Self::totp_enable`] sees one
    /// valid code.
    pub async fn totp_setup(&self, user_id: Uuid) -> Result<(String, String), ApiError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| ApiError::NotFound {
                resource: format!("user:{}", user_id),
            })?;

        let secret = TotpVerifier::generate_secret()?;
        let uri = TotpVerifier::provisioning_uri(&secret, "AuthGateway", &user.email);

        let encrypted = self.secret_box.encrypt(&secret)?;
        self.users.set_totp_secret(user_id, &encrypted).await?;

        Ok((secret, uri))
    }

    /// Completes TOTP enrollment once the user proves possession.
    pub async fn totp_enable(&self, user_id: Uuid, code: &str) -> Result<(), ApiError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| ApiError::NotFound {
                resource: format!("user:{}", user_id),
            })?;

        let secret = user
            .totp_secret
            .as_deref()
            .map(|blob| self.secret_box.decrypt(blob))
            .transpose()?
            .ok_or(ApiError::BadRequest {
                message: "TOTP enrollment was not started".to_string(),
            })?;

        if !TotpVerifier::verify(&secret, code)? {
            return Err(ApiError::InvalidCredentials);
        }

        self.users.set_totp_enabled(user_id, true).await?;

        info!(user_id = %user_id, "totp enabled");

        Ok(())
    }

    // =========================================================================
    // PASSWORDLESS REGISTRATION (two-step)
    // =========================================================================

    /// Step 1: records the pending registration and sends the OTP.
    ///
    /// An unverified pending slot for the same identifier is simply
    /// overwritten; only an **active** account blocks the flow.
    pub async fn passwordless_init(
        &self,
        email: Option<String>,
        phone: Option<String>,
        username: &str,
        application_id: Option<Uuid>,
    ) -> Result<(), ApiError> {
        let identity = match (&email, &phone) {
            (Some(e), None) => OtpIdentity::Email(shared::validation::normalize_email(e)),
            (None, Some(p)) => OtpIdentity::Phone(shared::validation::normalize_phone(p)?),
            _ => {
                return Err(ApiError::BadRequest {
                    message: "Exactly one of email or phone is required".to_string(),
                })
            }
        };

        let existing = match &identity {
            OtpIdentity::Email(e) => self.users.find_by_email(e).await?,
            OtpIdentity::Phone(p) => self.users.find_by_phone(p).await?,
        };
        if existing.is_some_and(|u| u.is_active) {
            return Err(ApiError::Conflict {
                resource: "identifier".to_string(),
            });
        }

        let blob = PendingRegistration {
            email: identity.email().map(str::to_string),
            phone: identity.phone().map(str::to_string),
            username: username.to_string(),
            application_id,
            initiated_at: Utc::now(),
        };

        let ttl = Duration::from_secs(self.otp.ttl().num_seconds() as u64);
        self.redis
            .set(&keys::pending_registration(identity.as_str()), &blob, Some(ttl))
            .await?;

        self.otp
            .send(&identity, OtpType::Registration, application_id)
            .await?;

        Ok(())
    }

    /// Step 2: verifies the OTP and promotes the pending blob to a user.
    ///
    /// A missing blob and a failed OTP return the **same** error; callers
    /// learn only "invalid or expired".
    pub async fn passwordless_complete(
        &self,
        identifier: &str,
        code: &str,
        device: &DeviceInfo,
    ) -> Result<AuthResponse, ApiError> {
        let invalid = || ApiError::BadRequest {
            message: "Invalid or expired code".to_string(),
        };

        let identity = match classify_identifier(identifier)? {
            LoginIdentifier::Email(e) => OtpIdentity::Email(e),
            LoginIdentifier::Phone(p) => OtpIdentity::Phone(p),
            LoginIdentifier::Username(_) => return Err(invalid()),
        };

        self.otp
            .verify(&identity, OtpType::Registration, code)
            .await
            .map_err(|e| match e {
                ApiError::InvalidCredentials => invalid(),
                other => other,
            })?;

        // Read-and-delete: completing twice cannot mint two accounts
        let blob: PendingRegistration = self
            .redis
            .get_del(&keys::pending_registration(identity.as_str()))
            .await?
            .ok_or_else(invalid)?;

        let user = self
            .users
            .create(NewUser {
                email: blob.email.clone().unwrap_or_default(),
                username: blob.username,
                phone: blob.phone.clone(),
                password_hash: None,
                account_type: AccountType::Human,
                // The OTP proved possession of the delivery identity
                email_verified: blob.email.is_some(),
                phone_verified: blob.phone.is_some(),
            })
            .await?;

        self.grant_default_role(user.user_id).await;

        let response = self.issue_for(&user, blob.application_id, device).await?;

        info!(user_id = %user.user_id, "passwordless registration completed");
        self.events.emit(&UserRegistered {
            user_id: user.user_id,
            email: user.email.clone(),
            passwordless: true,
            application_id: blob.application_id,
            occurred_at: Utc::now(),
        });

        Ok(response)
    }

    // =========================================================================
    // REFRESH
    // =========================================================================

    /// Rotates a refresh token into a new pair.
    ///
    /// Presenting an already-rotated token is **reuse**: the entire session
    /// family of that user is revoked and the paired access tokens are
    /// blacklisted.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        device: &DeviceInfo,
    ) -> Result<AuthResponse, ApiError> {
        let claims = self
            .tokens
            .jwt()
            .validate_refresh_token(refresh_token)
            .map_err(|_| ApiError::invalid_grant("invalid refresh token"))?;

        let user = self
            .users
            .find_by_id(claims.sub)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| ApiError::invalid_grant("account is not active"))?;

        // Mint the replacement first; the rotation transaction either
        // installs it or discards it
        let roles = self
            .rbac
            .get_user_role_names(user.user_id, claims.application_id)
            .await?;
        let subject = shared::auth::jwt::TokenSubject {
            user_id: user.user_id,
            email: user.email.clone(),
            username: user.username.clone(),
            roles,
            is_active: user.is_active,
            application_id: claims.application_id,
        };
        let new_tokens = self.tokens.jwt().generate_tokens(&subject)?;
        let new_claims = self.tokens.jwt().validate_access_token(&new_tokens.access_token)?;

        let old_hash = self.tokens.hasher().hash(refresh_token);
        let expires_at = Utc::now()
            + ChronoDuration::seconds(self.tokens.jwt().refresh_token_ttl_seconds() as i64);

        let rotation = self
            .sessions
            .rotate(
                &old_hash,
                crate::domain::NewSession {
                    user_id: user.user_id,
                    token_hash: self.tokens.hasher().hash(&new_tokens.refresh_token),
                    access_token_jti: new_claims.jti,
                    application_id: claims.application_id,
                    device_type: device.device_type.clone(),
                    device_os: device.os.clone(),
                    device_browser: device.browser.clone(),
                    ip_address: device.ip_address.clone(),
                    user_agent: device.user_agent.clone(),
                    session_name: device.session_name(),
                    expires_at,
                },
            )
            .await?;

        match rotation {
            SessionRotation::Rotated { revoked, current } => {
                self.sessions.touch_activity(current.session_id).await?;

                self.events.emit(&TokenRefreshed {
                    user_id: user.user_id,
                    old_session_id: revoked.session_id,
                    new_session_id: current.session_id,
                    occurred_at: Utc::now(),
                });

                Ok(AuthResponse {
                    tokens: new_tokens,
                    user: user.into(),
                    session_id: current.session_id,
                })
            }
            SessionRotation::Reused { session } => {
                warn!(user_id = %session.user_id, "refresh token reuse detected");

                let revoked = self
                    .sessions
                    .revoke_all_for_user(session.user_id, None)
                    .await?;
                self.tokens
                    .blacklist_sessions_access_tokens(&revoked)
                    .await?;

                self.events.emit(&TokenReuseDetected {
                    user_id: session.user_id,
                    sessions_revoked: revoked.len() as u64,
                    occurred_at: Utc::now(),
                });

                Err(ApiError::invalid_grant("refresh token reuse detected"))
            }
            SessionRotation::Unknown => Err(ApiError::invalid_grant("unknown refresh token")),
        }
    }

    // =========================================================================
    // SIGN-OUT
    // =========================================================================

    /// Revokes the presented session and blacklists its paired access
    /// token until natural expiry.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), ApiError> {
        let token_hash = self.tokens.hasher().hash(refresh_token);

        if let Some(session) = self.sessions.revoke_by_hash(&token_hash).await? {
            self.tokens
                .blacklist_sessions_access_tokens(std::slice::from_ref(&session))
                .await?;

            info!(user_id = %session.user_id, session_id = %session.session_id, "user signed out");
            self.events.emit(&SessionRevoked {
                user_id: session.user_id,
                count: 1,
                reason: "sign_out".to_string(),
                occurred_at: Utc::now(),
            });
        }

        // Revoking an unknown/already-revoked token is a no-op, not an error
        Ok(())
    }

    /// Revokes all of a user's sessions, optionally sparing the current
    /// one, and cascade-blacklists the paired access tokens.
    pub async fn logout_all(
        &self,
        user_id: Uuid,
        except_session_id: Option<Uuid>,
    ) -> Result<u64, ApiError> {
        let revoked = self
            .sessions
            .revoke_all_for_user(user_id, except_session_id)
            .await?;
        self.tokens.blacklist_sessions_access_tokens(&revoked).await?;

        info!(user_id = %user_id, count = revoked.len(), "bulk sign-out");
        self.events.emit(&SessionRevoked {
            user_id,
            count: revoked.len() as u64,
            reason: "sign_out_all".to_string(),
            occurred_at: Utc::now(),
        });

        Ok(revoked.len() as u64)
    }

    // =========================================================================
    // PASSWORD CHANGE
    // =========================================================================

    /// Changes a password, refusing reuse of the last N hashes, and
    /// revokes every session.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), ApiError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| ApiError::NotFound {
                resource: format!("user:{}", user_id),
            })?;

        let current_hash = user
            .password_hash
            .as_deref()
            .ok_or(ApiError::InvalidCredentials)?;

        if !self.password_hasher.verify(current_password, current_hash)? {
            return Err(ApiError::InvalidCredentials);
        }

        if let Err(problems) = PasswordValidator::validate(new_password) {
            return Err(ApiError::BadRequest {
                message: problems.join("; "),
            });
        }

        // Reuse check: the new password must not verify against any of the
        // last N hashes (including the current one)
        let mut recent = self
            .users
            .recent_password_hashes(user_id, self.oauth.password_history_depth)
            .await?;
        recent.push(current_hash.to_string());
        for old_hash in &recent {
            if self.password_hasher.verify(new_password, old_hash)? {
                return Err(ApiError::BadRequest {
                    message: "Password was used recently".to_string(),
                });
            }
        }

        let new_hash = self.password_hasher.hash(new_password)?;
        self.users.add_password_history(user_id, current_hash).await?;
        self.users.update_password(user_id, &new_hash).await?;

        // A changed password invalidates every standing session
        let revoked = self.sessions.revoke_all_for_user(user_id, None).await?;
        self.tokens.blacklist_sessions_access_tokens(&revoked).await?;

        info!(user_id = %user_id, "password changed");
        self.events.emit(&SessionRevoked {
            user_id,
            count: revoked.len() as u64,
            reason: "password_changed".to_string(),
            occurred_at: Utc::now(),
        });

        Ok(())
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    /// Issues a token pair + session for a user, with roles resolved in
    /// the tenant scope.
    pub async fn issue_for(
        &self,
        user: &User,
        application_id: Option<Uuid>,
        device: &DeviceInfo,
    ) -> Result<AuthResponse, ApiError> {
        let roles = self
            .rbac
            .get_user_role_names(user.user_id, application_id)
            .await?;

        let (tokens, session) = self
            .tokens
            .issue_pair(user, roles, application_id, device)
            .await?;

        Ok(AuthResponse {
            tokens,
            user: user.clone().into(),
            session_id: session.session_id,
        })
    }

    /// Grants the default role, tolerating a missing seed row.
    async fn grant_default_role(&self, user_id: Uuid) {
        if let Err(e) = self.rbac.assign_role(user_id, DEFAULT_ROLE, None).await {
            warn!(user_id = %user_id, error = %e, "default role not granted");
        }
    }

    /// Mints the opaque cache-resident 2FA challenge token.
    async fn mint_two_factor_token(
        &self,
        user: &User,
        application_id: Option<Uuid>,
    ) -> Result<String, ApiError> {
        let token = crypto::generate_token();
        let ttl = Duration::from_secs(self.oauth.two_factor_token_ttl_seconds);

        self.redis
            .set(
                &keys::two_factor(&token),
                &TwoFactorChallenge {
                    user_id: user.user_id,
                    application_id,
                },
                Some(ttl),
            )
            .await?;

        Ok(token)
    }

    /// Records a failed attempt and locks the account at the threshold.
    async fn register_failure(
        &self,
        user: &User,
        identifier: &str,
        device: &DeviceInfo,
    ) -> Result<(), ApiError> {
        let window_start =
            Utc::now() - ChronoDuration::seconds(self.lockout.reset_after_seconds as i64);
        let lockout = self
            .users
            .record_failed_attempt(user.user_id, window_start)
            .await?;

        self.emit_login_failed(Some(user.user_id), identifier, device);

        if lockout.failed_attempts >= self.lockout.max_failed_attempts {
            let locked_until =
                Utc::now() + ChronoDuration::seconds(self.lockout.duration_seconds as i64);
            self.users.lock_account(user.user_id, locked_until).await?;

            warn!(user_id = %user.user_id, attempts = lockout.failed_attempts, "account locked");
            self.events.emit(&AccountLocked {
                user_id: user.user_id,
                locked_until,
                occurred_at: Utc::now(),
            });
        }

        Ok(())
    }

    fn emit_login_failed(&self, user_id: Option<Uuid>, identifier: &str, device: &DeviceInfo) {
        self.events.emit(&LoginFailed {
            user_id,
            identifier: identifier.to_string(),
            ip_address: device.ip_address.clone(),
            occurred_at: Utc::now(),
        });
    }
}

/// Normalized display form of a classified identifier, for events and
/// rate-limit keys.
fn identifier_display(identifier: &LoginIdentifier) -> String {
    match identifier {
        LoginIdentifier::Email(s) | LoginIdentifier::Phone(s) | LoginIdentifier::Username(s) => {
            s.clone()
        }
    }
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService").finish_non_exhaustive()
    }
}
