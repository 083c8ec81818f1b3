//! # Auth Gateway - Shared Library
//!
//! Core shared functionality for the auth gateway workspace.
//!
//! This crate carries everything that is not identity business logic: the
//! configuration layer, the error taxonomy, database and cache clients,
//! structured logging, request validation, and the cryptographic toolbox
//! (password KDF, token hashing, JWT signing, TOTP).
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    gateway-service                          │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────────┐ ┌─────────────┐   │
//! │  │   api   │ │   rpc   │ │  services   │ │ repositories│   │
//! │  └────┬────┘ └────┬────┘ └──────┬──────┘ └──────┬──────┘   │
//! │       │           │             │               │          │
//! │       └───────────┴──────┬──────┴───────────────┘          │
//! │                          │                                  │
//! │                 ┌────────▼────────┐                         │
//! │                 │  shared crate   │ ◄── You are here        │
//! │                 └─────────────────┘                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose | Key Types |
//! |--------|---------|-----------|
//! | [`config`] | Environment-based configuration | [`AppConfig`] |
//! | [`errors`] | Standardized error handling | [`ApiError`], [`ApiResult`] |
//! | [`auth`] | JWT tokens, password hashing, TOTP | [`auth::jwt::JwtService`], [`auth::password::PasswordHasher`] |
//! | [`crypto`] | Token hashing, credential generation, secret box | [`crypto::TokenHasher`], [`crypto::SecretBox`] |
//! | [`database`] | PostgreSQL connection pool | [`database::create_pool`] |
//! | [`redis_client`] | Redis for cache, counters, single-use codes | [`redis_client::RedisClient`] |
//! | [`tracing_config`] | Structured logging setup | [`tracing_config::init_tracing`] |
//! | [`validation`] | Request validation and identifier normalization | [`validation::validate_request`] |
//!
//! ## Design Decisions
//!
//! 1. **Single source of truth**: credential formats, hashing, and
//!    normalization live here so the service layer cannot drift
//! 2. **Security first**: auth and crypto follow OWASP guidelines
//! 3. **Observable by default**: structured logging and tracing built-in

pub mod auth;
pub mod config;
pub mod crypto;
pub mod database;
pub mod errors;
pub mod redis_client;
pub mod tracing_config;
pub mod validation;

// Re-exports for convenience - import commonly used types directly from `shared`
pub use config::AppConfig;
pub use errors::{ApiError, ApiResult, OAuthErrorKind};
