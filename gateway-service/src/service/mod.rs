//! # Service Layer
//!
//! Business logic of the gateway, one service per concern:
//!
//! | Service | Concern |
//! |---------|---------|
//! | [`TokenService`] | Issue token pairs + sessions, validate access tokens (blacklist, tenant binding) |
//! | [`AuthService`] | Sign-up, sign-in (+2FA, lockout), passwordless init/complete, refresh, sign-out |
//! | [`OtpService`] | Generate → hash → store → deliver → verify one-time PINs |
//! | [`ApiKeyService`] | Issue, validate, scope-check, revoke API keys |
//! | [`OAuthService`] | Authorization server: authorize/token/introspect/revoke/userinfo/discovery |
//! | [`RbacService`] | Role and permission resolution |
//! | [`TokenExchangeService`] | Cross-application token exchange |
//! | [`SessionService`] | Session ledger queries and revocation |
//! | [`ApplicationService`] | Tenant resolution and per-app profiles |
//! | [`MessagingService`] | Email/SMS façade with template rendering |
//! | [`RateLimiter`] | Sliding-window counters over the cache |
//! | [`cleanup`] | Background sweepers for expired rows |
//!
//! Services return [`shared::errors::ApiError`]; the transport glue
//! (`api`, `rpc`) maps them to protocol responses.

pub mod api_key_service;
pub mod application_service;
pub mod auth_service;
pub mod cleanup;
pub mod messaging;
pub mod oauth_service;
pub mod otp_service;
pub mod rate_limit;
pub mod rbac_service;
pub mod session_service;
pub mod token_exchange_service;
pub mod token_service;

pub use api_key_service::ApiKeyService;
pub use application_service::ApplicationService;
pub use auth_service::AuthService;
pub use messaging::MessagingService;
pub use oauth_service::OAuthService;
pub use otp_service::OtpService;
pub use rate_limit::RateLimiter;
pub use rbac_service::RbacService;
pub use session_service::SessionService;
pub use token_exchange_service::TokenExchangeService;
pub use token_service::TokenService;
