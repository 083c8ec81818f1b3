//! # Identity Domain
//!
//! Persistent entities and domain events of the gateway, grouped by area:
//!
//! | Module | Entities |
//! |--------|----------|
//! | [`user`] | `User`, `UserProfile`, `AccountLockout`, `PasswordHistory` |
//! | [`application`] | `Application`, `UserApplicationProfile`, `EmailProfile` |
//! | [`rbac`] | `Role`, `Permission` |
//! | [`api_key`] | `ApiKey` |
//! | [`session`] | `Session`, `SessionStats`, `BlacklistEntry` |
//! | [`otp`] | `Otp`, `OtpType`, `PendingRegistration` |
//! | [`oauth`] | `OAuthClient`, `AuthorizationCode`, `OAuthAccessToken`, `OAuthRefreshToken`, `UserConsent`, `DeviceCode` |
//! | [`events`] | `DomainEvent` + audit event structs |
//!
//! Entities map 1:1 to database tables via sqlx `FromRow`. Fields holding
//! enumerated values (account type, client type, device-code status) are
//! stored as text columns; the matching Rust enums live next to the entity
//! and carry the parsing/encoding helpers.

pub mod api_key;
pub mod application;
pub mod events;
pub mod oauth;
pub mod otp;
pub mod rbac;
pub mod session;
pub mod user;

pub use api_key::{ApiKey, NewApiKey};
pub use application::{Application, EmailProfile, NewApplication, UserApplicationProfile};
pub use oauth::{
    AuthorizationCode, ClientType, DeviceCode, DeviceCodeStatus, GrantType, NewAuthorizationCode,
    NewDeviceCode, NewOAuthAccessToken, NewOAuthRefreshToken, OAuthAccessToken, OAuthClient,
    OAuthRefreshToken, UserConsent,
};
pub use otp::{NewOtp, Otp, OtpIdentity, OtpType, PendingRegistration};
pub use rbac::{Permission, Role};
pub use session::{BlacklistEntry, DeviceInfo, NewSession, Session, SessionStats, SessionStatsBucket};
pub use user::{AccountLockout, AccountType, NewUser, PasswordHistory, User, UserProfile};
