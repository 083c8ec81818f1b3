//! # Auth Gateway Service
//!
//! Multi-tenant authentication and authorization gateway: issues,
//! validates, and revokes credentials for many logically isolated
//! applications sharing one user directory.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 Transport Layer (api/, rpc/)                    │
//! │  ┌──────────────┐  ┌───────────────┐  ┌─────────────────────┐   │
//! │  │ public HTTP  │  │ OAuth / OIDC  │  │ internal RPC +      │   │
//! │  │ auth flows   │  │ endpoints     │  │ interceptor chain   │   │
//! │  └──────┬───────┘  └──────┬────────┘  └──────────┬──────────┘   │
//! └─────────┼─────────────────┼──────────────────────┼──────────────┘
//!           ▼                 ▼                      ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Service Layer (service/)                     │
//! │  auth · oauth · otp · api keys · rbac · sessions · exchange ·   │
//! │  applications · messaging · rate limits · cleanup               │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │   Repository Layer (repository/)  +  Domain Layer (domain/)     │
//! │   PostgreSQL (authoritative)   ·   Redis (TTL'd fast state)     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Surfaces
//!
//! | Surface | Mount | Authentication |
//! |---------|-------|----------------|
//! | First-party auth | `/api/v1/auth/*` | none / Bearer access token |
//! | OAuth / OIDC | `/oauth2/*`, `/.well-known/*` | per RFC |
//! | Internal RPC | `/rpc/v1/{Method}` | `agw_` API key or `app_` secret |
//!
//! ## Security Features
//!
//! - Argon2id password hashing with rehash-on-drift
//! - RS256 token signing with `kid` rotation and published JWKS
//! - Every opaque credential HMAC-hashed at rest with a server pepper
//! - Refresh rotation with reuse detection and family revocation
//! - Persistent account lockout + cache-windowed rate limits
//! - Deny-by-default method allow-list on the RPC plane

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use shared::auth::jwt::JwtService;
use shared::auth::password::PasswordHasher;
use shared::config::AppConfig;
use shared::crypto::{SecretBox, TokenHasher};
use shared::redis_client::RedisClient;
use shared::{database, tracing_config};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

mod api;
mod domain;
mod repository;
mod rpc;
mod service;

use repository::{
    ApiKeyRepository, ApplicationRepository, BlacklistRepository, OAuthClientRepository,
    OAuthTokenRepository, OtpRepository, RbacRepository, SessionRepository, UserRepository,
};
use rpc::RpcInterceptor;
use service::cleanup::{self, CleanupTargets};
use service::messaging::LoggingSender;
use service::{
    ApiKeyService, ApplicationService, AuthService, MessagingService, OAuthService, OtpService,
    RateLimiter, RbacService, SessionService, TokenExchangeService, TokenService,
};

/// Shared application state injected into all request handlers.
///
/// Wrapped in [`actix_web::web::Data`]; every field is cheaply cloneable
/// (Arc-based pools and clients).
pub struct AppState {
    /// PostgreSQL pool, for health checks
    pub db_pool: PgPool,
    /// Redis client, for health checks
    pub redis: RedisClient,
    /// Service name reported by `/health`
    pub service_name: String,
    /// Token issuance + validation (blacklist, tenant binding)
    pub token_service: TokenService,
    /// Credential flows (sign-in, passwordless, refresh, sign-out)
    pub auth_service: AuthService,
    /// The authorization server
    pub oauth_service: OAuthService,
    /// One-time PIN orchestration
    pub otp_service: OtpService,
    /// Role/permission resolution
    pub rbac_service: RbacService,
    /// Session ledger queries and revocation
    pub session_service: SessionService,
    /// Tenant resolution and per-app profiles
    pub application_service: ApplicationService,
    /// Email/SMS façade
    pub messaging_service: MessagingService,
    /// Cross-application token exchange
    pub token_exchange_service: TokenExchangeService,
    /// API key lifecycle
    pub api_key_service: ApiKeyService,
    /// RPC authentication/authorization chain
    pub rpc_interceptor: RpcInterceptor,
    /// Direct directory reads for thin handlers
    pub user_repository: UserRepository,
    /// Direct client reads for the RPC surface
    pub oauth_client_repository: OAuthClientRepository,
}

/// Application entry point.
///
/// # Initialization Sequence
///
/// 1. Load configuration from environment variables
/// 2. Initialize structured logging/tracing
/// 3. Create the PostgreSQL pool and Redis client
/// 4. Parse key material (signing keys, pepper, secret box) — fail fast
/// 5. Instantiate repositories and services
/// 6. Spawn the cleanup sweeper
/// 7. Configure and start the HTTP server
///
/// Critical initialization errors abort startup (`expect`); the service
/// must not come up half-wired.
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // ─────────────────────────────────────────────────────────────────────
    // Step 1-2: configuration and tracing
    // ─────────────────────────────────────────────────────────────────────
    let config = AppConfig::from_env().expect("Failed to load configuration");
    tracing_config::init_tracing(&config.service_name, config.is_production());

    info!(
        service = %config.service_name,
        host = %config.server.host,
        port = %config.server.port,
        "Starting auth gateway"
    );

    // ─────────────────────────────────────────────────────────────────────
    // Step 3: stores
    // ─────────────────────────────────────────────────────────────────────
    let db_pool = database::create_pool(&config.database)
        .await
        .expect("Failed to create database pool");
    let redis = RedisClient::new(&config.redis)
        .await
        .expect("Failed to connect to Redis");

    // ─────────────────────────────────────────────────────────────────────
    // Step 4: key material (misconfiguration must fail startup)
    // ─────────────────────────────────────────────────────────────────────
    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()).expect("Invalid signing keys"));
    let token_hasher = TokenHasher::new(&config.security.token_pepper);
    let secret_box =
        SecretBox::new(&config.security.secret_encryption_key).expect("Invalid encryption key");
    let password_hasher = PasswordHasher::new();

    // ─────────────────────────────────────────────────────────────────────
    // Step 5: repositories and services
    // ─────────────────────────────────────────────────────────────────────
    let user_repository = UserRepository::new(db_pool.clone());
    let application_repository = ApplicationRepository::new(db_pool.clone());
    let rbac_repository = RbacRepository::new(db_pool.clone());
    let api_key_repository = ApiKeyRepository::new(db_pool.clone());
    let session_repository = SessionRepository::new(db_pool.clone());
    let otp_repository = OtpRepository::new(db_pool.clone());
    let oauth_client_repository = OAuthClientRepository::new(db_pool.clone());
    let oauth_token_repository = OAuthTokenRepository::new(db_pool.clone());
    let blacklist_repository = BlacklistRepository::new(db_pool.clone());

    let token_service = TokenService::new(
        jwt_service.clone(),
        token_hasher.clone(),
        session_repository.clone(),
        blacklist_repository.clone(),
        redis.clone(),
    );
    let rbac_service = RbacService::new(rbac_repository);
    let rate_limiter = RateLimiter::new(redis.clone(), config.otp.clone());
    let messaging_service = MessagingService::new(
        application_repository.clone(),
        Arc::new(LoggingSender),
        Arc::new(LoggingSender),
    );
    let otp_service = OtpService::new(
        otp_repository.clone(),
        token_hasher.clone(),
        messaging_service.clone(),
        rate_limiter.clone(),
        config.otp.clone(),
    );
    let api_key_service = ApiKeyService::new(api_key_repository, token_hasher.clone());
    let application_service =
        ApplicationService::new(application_repository.clone(), token_hasher.clone());
    let auth_service = AuthService::new(
        user_repository.clone(),
        session_repository.clone(),
        token_service.clone(),
        otp_service.clone(),
        rbac_service.clone(),
        rate_limiter.clone(),
        password_hasher,
        secret_box,
        redis.clone(),
        config.lockout.clone(),
        config.oauth.clone(),
    );
    let oauth_service = OAuthService::new(
        oauth_client_repository.clone(),
        oauth_token_repository.clone(),
        user_repository.clone(),
        session_repository.clone(),
        token_service.clone(),
        rbac_service.clone(),
        rate_limiter.clone(),
        &config.oauth,
    );
    let session_service = SessionService::new(session_repository.clone(), token_service.clone());
    let token_exchange_service = TokenExchangeService::new(
        user_repository.clone(),
        token_service.clone(),
        application_service.clone(),
        auth_service.clone(),
        redis.clone(),
        config.oauth.clone(),
    );
    let rpc_interceptor = RpcInterceptor::new(
        api_key_service.clone(),
        application_service.clone(),
        user_repository.clone(),
    );

    // ─────────────────────────────────────────────────────────────────────
    // Step 6: background sweepers
    // ─────────────────────────────────────────────────────────────────────
    cleanup::spawn_sweeper(CleanupTargets {
        otps: otp_repository,
        blacklist: blacklist_repository,
        sessions: session_repository,
        oauth: oauth_token_repository,
    });

    let app_state = web::Data::new(AppState {
        db_pool: db_pool.clone(),
        redis,
        service_name: config.service_name.clone(),
        token_service,
        auth_service,
        oauth_service,
        otp_service,
        rbac_service,
        session_service,
        application_service,
        messaging_service,
        token_exchange_service,
        api_key_service,
        rpc_interceptor,
        user_repository,
        oauth_client_repository,
    });

    // ─────────────────────────────────────────────────────────────────────
    // Step 7: HTTP server
    // ─────────────────────────────────────────────────────────────────────
    let server_host = config.server.host.clone();
    let server_port = config.server.port;
    let workers = config.server.workers;

    info!("Server listening on {}:{}", server_host, server_port);

    let mut server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin() // TODO: restrict to tenant callback origins in production
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            // Middleware stack (first added = last executed)
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .wrap(tracing_actix_web::TracingLogger::default())
            // Shared state
            .app_data(app_state.clone())
            // Public HTTP + OAuth surfaces
            .configure(api::routes::configure)
            // Internal RPC surface
            .configure(rpc::routes::configure)
    })
    .bind((server_host, server_port))?;

    if workers > 0 {
        server = server.workers(workers);
    }

    server.run().await
}
