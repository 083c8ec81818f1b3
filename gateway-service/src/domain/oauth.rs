//! # OAuth 2.0 / OIDC Entities
//!
//! Everything the authorization server persists: registered clients,
//! authorization codes, opaque access/refresh token rows, consent grants,
//! and device codes.
//!
//! ## Token Relationships
//!
//! ```text
//! AuthorizationCode ──mints──► OAuthAccessToken ◄──pairs── OAuthRefreshToken
//!        │                          ▲                            │
//!        │ auth_code_id             │ access_token_id            │
//!        └──────────────────────────┴────────────────────────────┘
//! ```
//!
//! `auth_code_id` links minted tokens back to their code so a replayed
//! code can cascade-revoke the tokens from its first redemption. Revoking
//! a refresh token revokes the access tokens minted from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

// =============================================================================
// CLIENT TYPE
// =============================================================================

/// Confidentiality class of an OAuth client (RFC 6749 §2.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    /// Can hold a secret (backend services); authenticates with secret or
    /// HTTP basic
    Confidential,
    /// Cannot hold a secret (SPAs, native apps); must use PKCE
    Public,
}

impl ClientType {
    /// String form stored in the `client_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confidential => "confidential",
            Self::Public => "public",
        }
    }

    /// Parses the stored column value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "confidential" => Some(Self::Confidential),
            "public" => Some(Self::Public),
            _ => None,
        }
    }
}

// =============================================================================
// GRANT TYPE
// =============================================================================

/// Supported OAuth grant types, keyed by their wire identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    /// `authorization_code` (+ PKCE)
    AuthorizationCode,
    /// `refresh_token`
    RefreshToken,
    /// `client_credentials`
    ClientCredentials,
    /// `urn:ietf:params:oauth:grant-type:device_code`
    DeviceCode,
    /// `password` — first-party clients only, explicitly enabled
    Password,
}

impl GrantType {
    /// The `grant_type` request parameter value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
            Self::ClientCredentials => "client_credentials",
            Self::DeviceCode => "urn:ietf:params:oauth:grant-type:device_code",
            Self::Password => "password",
        }
    }

    /// Parses a `grant_type` request parameter.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "authorization_code" => Some(Self::AuthorizationCode),
            "refresh_token" => Some(Self::RefreshToken),
            "client_credentials" => Some(Self::ClientCredentials),
            "urn:ietf:params:oauth:grant-type:device_code" => Some(Self::DeviceCode),
            "password" => Some(Self::Password),
            _ => None,
        }
    }
}

// =============================================================================
// OAUTH CLIENT
// =============================================================================

/// Registered OAuth client (`oauth_clients` table).
#[derive(Debug, Clone, FromRow)]
pub struct OAuthClient {
    /// Public client identifier, unique
    pub client_id: String,
    /// Owning tenant
    pub application_id: Uuid,
    /// HMAC digest of the client secret; NULL for public clients
    pub client_secret_hash: Option<String>,
    /// "confidential" or "public"
    pub client_type: String,
    /// Exact-match redirect URIs (no wildcards, no normalization)
    pub redirect_uris: Json<Vec<String>>,
    /// Grant types this client may use
    pub allowed_grant_types: Json<Vec<String>>,
    /// Scopes this client may request
    pub allowed_scopes: Json<Vec<String>>,
    /// Scopes granted when the request names none
    pub default_scopes: Json<Vec<String>>,
    /// Access token TTL override, seconds
    pub access_token_ttl_seconds: i64,
    /// Refresh token TTL override, seconds
    pub refresh_token_ttl_seconds: i64,
    /// ID token TTL, seconds
    pub id_token_ttl_seconds: i64,
    /// When true, the authorization endpoint demands PKCE even for
    /// confidential clients
    pub require_pkce: bool,
    /// When true, a covering consent row must exist before code issuance
    pub require_consent: bool,
    /// First-party clients may use the password grant when enabled
    pub first_party: bool,
    /// Optional owning user
    pub owner_user_id: Option<Uuid>,
    /// Inactive clients fail authorization with `unauthorized_client`
    pub is_active: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

impl OAuthClient {
    /// Client type as an enum; unknown stored values collapse to `Public`,
    /// the stricter interpretation (forces PKCE, refuses secret auth).
    pub fn client_type(&self) -> ClientType {
        ClientType::parse(&self.client_type).unwrap_or(ClientType::Public)
    }

    /// Whether PKCE is mandatory for this client.
    pub fn pkce_required(&self) -> bool {
        self.require_pkce || self.client_type() == ClientType::Public
    }

    /// Whether a redirect URI exactly matches a registered one.
    pub fn allows_redirect_uri(&self, uri: &str) -> bool {
        self.redirect_uris.0.iter().any(|u| u == uri)
    }

    /// Whether the client may use a grant type.
    pub fn allows_grant(&self, grant: GrantType) -> bool {
        self.allowed_grant_types.0.iter().any(|g| g == grant.as_str())
    }

    /// Whether every requested scope is within the client's allowance.
    pub fn allows_scopes(&self, requested: &[String]) -> bool {
        requested
            .iter()
            .all(|s| self.allowed_scopes.0.iter().any(|a| a == s))
    }
}

// =============================================================================
// AUTHORIZATION CODE
// =============================================================================

/// Single-use authorization code (`authorization_codes` table).
///
/// Redemption flips `used` under a conditional update; the database is the
/// serialization point, so concurrent redemptions collapse to at most one
/// success.
#[derive(Debug, Clone, FromRow)]
pub struct AuthorizationCode {
    /// Unique identifier
    pub code_id: Uuid,
    /// HMAC digest of the opaque code
    pub code_hash: String,
    /// Issuing client
    pub client_id: String,
    /// Authorizing user
    pub user_id: Uuid,
    /// Redirect URI bound at authorization time, must match at redemption
    pub redirect_uri: String,
    /// Space-delimited granted scopes
    pub scope: String,
    /// PKCE challenge, when the flow used PKCE
    pub code_challenge: Option<String>,
    /// "S256" or "plain"
    pub code_challenge_method: Option<String>,
    /// OIDC nonce echoed into the ID token
    pub nonce: Option<String>,
    /// Single-use marker
    pub used: bool,
    /// TTL ≤ 10 minutes
    pub expires_at: DateTime<Utc>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Data for minting an authorization code.
#[derive(Debug, Clone)]
pub struct NewAuthorizationCode {
    /// HMAC digest of the opaque code
    pub code_hash: String,
    /// Issuing client
    pub client_id: String,
    /// Authorizing user
    pub user_id: Uuid,
    /// Bound redirect URI
    pub redirect_uri: String,
    /// Space-delimited scopes
    pub scope: String,
    /// PKCE challenge
    pub code_challenge: Option<String>,
    /// PKCE method
    pub code_challenge_method: Option<String>,
    /// OIDC nonce
    pub nonce: Option<String>,
    /// Expiry
    pub expires_at: DateTime<Utc>,
}

// =============================================================================
// OAUTH TOKENS
// =============================================================================

/// Opaque access token row (`oauth_access_tokens` table).
///
/// JWT access tokens are stateless; rows exist for tokens minted to OAuth
/// clients so revocation and introspection can consult the ledger.
#[derive(Debug, Clone, FromRow)]
pub struct OAuthAccessToken {
    /// Unique identifier
    pub token_id: Uuid,
    /// HMAC digest of the token (its `jti` for JWTs)
    pub token_hash: String,
    /// Issuing client
    pub client_id: String,
    /// Resource owner; NULL for client-credentials tokens
    pub user_id: Option<Uuid>,
    /// Space-delimited scopes
    pub scope: String,
    /// Revocation flag
    pub is_active: bool,
    /// Natural expiry
    pub expires_at: DateTime<Utc>,
    /// Revocation timestamp
    pub revoked_at: Option<DateTime<Utc>>,
    /// Authorization code that minted this token, for replay cascade
    pub auth_code_id: Option<Uuid>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl OAuthAccessToken {
    /// Active ⇔ flag set ∧ not revoked ∧ not expired.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.revoked_at.is_none() && self.expires_at > now
    }
}

/// Data for recording an issued access token.
#[derive(Debug, Clone)]
pub struct NewOAuthAccessToken {
    /// HMAC digest of the token
    pub token_hash: String,
    /// Issuing client
    pub client_id: String,
    /// Resource owner
    pub user_id: Option<Uuid>,
    /// Space-delimited scopes
    pub scope: String,
    /// Expiry
    pub expires_at: DateTime<Utc>,
    /// Minting code, if any
    pub auth_code_id: Option<Uuid>,
}

/// Opaque refresh token row (`oauth_refresh_tokens` table).
///
/// Rotation: using a refresh token revokes it and issues a new pair.
/// Revoking a refresh token revokes all access tokens minted from it.
#[derive(Debug, Clone, FromRow)]
pub struct OAuthRefreshToken {
    /// Unique identifier
    pub token_id: Uuid,
    /// HMAC digest of the opaque token
    pub token_hash: String,
    /// Issuing client
    pub client_id: String,
    /// Resource owner
    pub user_id: Option<Uuid>,
    /// Space-delimited scopes; refreshes may narrow, never widen
    pub scope: String,
    /// Revocation flag
    pub is_active: bool,
    /// Natural expiry
    pub expires_at: DateTime<Utc>,
    /// Revocation timestamp
    pub revoked_at: Option<DateTime<Utc>>,
    /// Paired access token
    pub access_token_id: Option<Uuid>,
    /// Minting code, for replay cascade
    pub auth_code_id: Option<Uuid>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl OAuthRefreshToken {
    /// Active ⇔ flag set ∧ not revoked ∧ not expired.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.revoked_at.is_none() && self.expires_at > now
    }

    /// Scope labels as a vector.
    pub fn scopes(&self) -> Vec<String> {
        self.scope.split_whitespace().map(str::to_string).collect()
    }
}

/// Data for recording an issued refresh token.
#[derive(Debug, Clone)]
pub struct NewOAuthRefreshToken {
    /// HMAC digest of the opaque token
    pub token_hash: String,
    /// Issuing client
    pub client_id: String,
    /// Resource owner
    pub user_id: Option<Uuid>,
    /// Space-delimited scopes
    pub scope: String,
    /// Expiry
    pub expires_at: DateTime<Utc>,
    /// Paired access token
    pub access_token_id: Option<Uuid>,
    /// Minting code, if any
    pub auth_code_id: Option<Uuid>,
}

// =============================================================================
// USER CONSENT
// =============================================================================

/// A user's consent grant to a client (`user_consents` table).
///
/// A client with `require_consent` must hold a non-revoked row covering
/// **all** requested scopes before code issuance (unless `prompt=consent`
/// forces a fresh prompt).
#[derive(Debug, Clone, FromRow)]
pub struct UserConsent {
    /// Unique identifier
    pub consent_id: Uuid,
    /// Granting user
    pub user_id: Uuid,
    /// Receiving client
    pub client_id: String,
    /// Scopes covered by this grant
    pub scopes: Json<Vec<String>>,
    /// When granted
    pub granted_at: DateTime<Utc>,
    /// When revoked, if ever
    pub revoked_at: Option<DateTime<Utc>>,
}

impl UserConsent {
    /// Whether this grant is live and covers every requested scope.
    pub fn covers(&self, requested: &[String]) -> bool {
        self.revoked_at.is_none()
            && requested.iter().all(|s| self.scopes.0.iter().any(|g| g == s))
    }
}

// =============================================================================
// DEVICE CODE
// =============================================================================

/// Device authorization grant state machine (RFC 8628).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceCodeStatus {
    /// Waiting for the user to enter the user code
    Pending,
    /// User approved; next poll mints tokens
    Authorized,
    /// User declined (terminal)
    Denied,
    /// TTL elapsed (terminal)
    Expired,
    /// Tokens were minted; the code is finished (terminal)
    Consumed,
}

impl DeviceCodeStatus {
    /// String form stored in the `status` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Authorized => "authorized",
            Self::Denied => "denied",
            Self::Expired => "expired",
            Self::Consumed => "consumed",
        }
    }

    /// Parses the stored column value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "authorized" => Some(Self::Authorized),
            "denied" => Some(Self::Denied),
            "expired" => Some(Self::Expired),
            "consumed" => Some(Self::Consumed),
            _ => None,
        }
    }
}

/// Device grant record (`device_codes` table).
///
/// State transitions run through conditional updates (`WHERE status =
/// 'pending'`), so approval/denial races collapse to one winner.
#[derive(Debug, Clone, FromRow)]
pub struct DeviceCode {
    /// Unique identifier
    pub device_code_id: Uuid,
    /// HMAC digest of the device code the client polls with
    pub device_code_hash: String,
    /// Human-typable `XXXX-XXXX` code, unique among live grants
    pub user_code: String,
    /// Requesting client
    pub client_id: String,
    /// Approving user, set at authorization
    pub user_id: Option<Uuid>,
    /// Space-delimited requested scopes
    pub scope: String,
    /// Current state, see [`DeviceCodeStatus`]
    pub status: String,
    /// URL shown to the user
    pub verification_uri: String,
    /// Minimum seconds between polls
    pub interval_seconds: i32,
    /// Expiry of the whole grant
    pub expires_at: DateTime<Utc>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl DeviceCode {
    /// Status as an enum; unknown stored values read as `Expired`, the
    /// terminal dead state.
    pub fn status(&self) -> DeviceCodeStatus {
        DeviceCodeStatus::parse(&self.status).unwrap_or(DeviceCodeStatus::Expired)
    }
}

/// Data for starting a device grant.
#[derive(Debug, Clone)]
pub struct NewDeviceCode {
    /// HMAC digest of the device code
    pub device_code_hash: String,
    /// Human-typable user code
    pub user_code: String,
    /// Requesting client
    pub client_id: String,
    /// Space-delimited scopes
    pub scope: String,
    /// Verification URL
    pub verification_uri: String,
    /// Poll interval, seconds
    pub interval_seconds: i32,
    /// Expiry
    pub expires_at: DateTime<Utc>,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_client() -> OAuthClient {
        OAuthClient {
            client_id: "webapp".to_string(),
            application_id: Uuid::new_v4(),
            client_secret_hash: Some("digest".to_string()),
            client_type: "confidential".to_string(),
            redirect_uris: Json(vec!["https://app.example.com/cb".to_string()]),
            allowed_grant_types: Json(vec![
                "authorization_code".to_string(),
                "refresh_token".to_string(),
            ]),
            allowed_scopes: Json(vec![
                "openid".to_string(),
                "email".to_string(),
                "profile".to_string(),
            ]),
            default_scopes: Json(vec!["openid".to_string()]),
            access_token_ttl_seconds: 900,
            refresh_token_ttl_seconds: 604800,
            id_token_ttl_seconds: 300,
            require_pkce: false,
            require_consent: false,
            first_party: true,
            owner_user_id: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_grant_type_wire_identifiers() {
        assert_eq!(GrantType::parse("authorization_code"), Some(GrantType::AuthorizationCode));
        assert_eq!(
            GrantType::parse("urn:ietf:params:oauth:grant-type:device_code"),
            Some(GrantType::DeviceCode)
        );
        assert_eq!(GrantType::parse("implicit"), None);
        assert_eq!(
            GrantType::DeviceCode.as_str(),
            "urn:ietf:params:oauth:grant-type:device_code"
        );
    }

    #[test]
    fn test_redirect_uri_exact_match_only() {
        let client = sample_client();
        assert!(client.allows_redirect_uri("https://app.example.com/cb"));
        // No path normalization, no prefixes, no wildcarding
        assert!(!client.allows_redirect_uri("https://app.example.com/cb/"));
        assert!(!client.allows_redirect_uri("https://app.example.com/cb?x=1"));
        assert!(!client.allows_redirect_uri("https://app.example.com"));
    }

    #[test]
    fn test_public_clients_always_require_pkce() {
        let mut client = sample_client();
        assert!(!client.pkce_required());

        client.client_type = "public".to_string();
        assert!(client.pkce_required());

        client.client_type = "confidential".to_string();
        client.require_pkce = true;
        assert!(client.pkce_required());
    }

    #[test]
    fn test_unknown_client_type_is_treated_as_public() {
        let mut client = sample_client();
        client.client_type = "mystery".to_string();
        assert_eq!(client.client_type(), ClientType::Public);
        assert!(client.pkce_required());
    }

    #[test]
    fn test_scope_allowance() {
        let client = sample_client();
        assert!(client.allows_scopes(&["openid".to_string(), "email".to_string()]));
        assert!(!client.allows_scopes(&["openid".to_string(), "admin".to_string()]));
        assert!(client.allows_scopes(&[]));
    }

    #[test]
    fn test_consent_coverage() {
        let consent = UserConsent {
            consent_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            client_id: "webapp".to_string(),
            scopes: Json(vec!["openid".to_string(), "email".to_string()]),
            granted_at: Utc::now(),
            revoked_at: None,
        };

        assert!(consent.covers(&["openid".to_string()]));
        assert!(consent.covers(&["openid".to_string(), "email".to_string()]));
        // Must cover ALL requested scopes
        assert!(!consent.covers(&["openid".to_string(), "profile".to_string()]));
    }

    #[test]
    fn test_revoked_consent_covers_nothing() {
        let consent = UserConsent {
            consent_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            client_id: "webapp".to_string(),
            scopes: Json(vec!["openid".to_string()]),
            granted_at: Utc::now(),
            revoked_at: Some(Utc::now()),
        };
        assert!(!consent.covers(&["openid".to_string()]));
    }

    #[test]
    fn test_device_code_status_round_trip() {
        for s in [
            DeviceCodeStatus::Pending,
            DeviceCodeStatus::Authorized,
            DeviceCodeStatus::Denied,
            DeviceCodeStatus::Expired,
            DeviceCodeStatus::Consumed,
        ] {
            assert_eq!(DeviceCodeStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(DeviceCodeStatus::parse("limbo"), None);
    }

    #[test]
    fn test_refresh_token_scope_split() {
        let token = OAuthRefreshToken {
            token_id: Uuid::new_v4(),
            token_hash: "digest".to_string(),
            client_id: "webapp".to_string(),
            user_id: Some(Uuid::new_v4()),
            scope: "openid email profile".to_string(),
            is_active: true,
            expires_at: Utc::now() + chrono::Duration::days(7),
            revoked_at: None,
            access_token_id: None,
            auth_code_id: None,
            created_at: Utc::now(),
        };
        assert_eq!(token.scopes(), vec!["openid", "email", "profile"]);
        assert!(token.is_usable(Utc::now()));
    }
}
