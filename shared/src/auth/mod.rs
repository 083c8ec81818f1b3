//! # Authentication Primitives
//!
//! Credential verification building blocks shared by every service:
//!
//! | Module | Purpose | Key Types |
//! |--------|---------|-----------|
//! | [`jwt`] | RS256 token minting/validation + JWKS | [`jwt::JwtService`], [`jwt::Claims`] |
//! | [`password`] | Argon2id hashing and strength rules | [`password::PasswordHasher`] |
//! | [`totp`] | RFC 6238 time-based one-time passwords | [`totp::TotpVerifier`] |
//!
//! Opaque-credential hashing and random generation live in
//! [`crate::crypto`]; this module covers the primitives that carry
//! identity semantics.

pub mod jwt;
pub mod password;
pub mod totp;

pub use jwt::{Claims, JwtService, TokenPair, TokenType};
pub use password::PasswordHasher;
