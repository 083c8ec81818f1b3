//! # Route Configuration
//!
//! ```text
//! /
//! ├── health                                  GET  → health_check
//! │
//! ├── .well-known/
//! │   ├── openid-configuration                GET  → discovery
//! │   └── jwks.json                           GET  → jwks
//! │
//! ├── oauth2/
//! │   ├── authorize                           GET  → authorize
//! │   ├── token                               POST → token
//! │   ├── introspect                          POST → introspect
//! │   ├── revoke                              POST → revoke
//! │   ├── userinfo                            GET  → userinfo
//! │   ├── consent                             POST → consent
//! │   ├── device/code                         POST → device_code
//! │   ├── device/approve                      POST → device_approve
//! │   ├── device/deny                         POST → device_deny
//! │   └── logout                              POST → end_session
//! │
//! └── api/v1/auth/
//!     ├── register                            POST → register
//!     ├── login                               POST → login
//!     ├── login/2fa                           POST → login_two_factor
//!     ├── passwordless/init                   POST → passwordless_init
//!     ├── passwordless/complete               POST → passwordless_complete
//!     ├── refresh                             POST → refresh_token
//!     ├── logout                              POST → logout
//!     ├── logout-all                          POST → logout_all
//!     ├── password/change                     POST → change_password
//!     ├── me                                  GET  → get_profile
//!     ├── sessions                            GET  → list_sessions
//!     └── sessions/{id}                       DELETE → revoke_session
//! ```
//!
//! The internal RPC surface mounts separately; see
//! [`crate::rpc::routes`].

use actix_web::web;

use super::{handlers, oauth_handlers};

/// Configures the public HTTP routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        // ─────────────────────────────────────────────────────────────────
        // Health Check
        // ─────────────────────────────────────────────────────────────────
        .route("/health", web::get().to(handlers::health_check))
        // ─────────────────────────────────────────────────────────────────
        // OIDC Discovery
        // ─────────────────────────────────────────────────────────────────
        .route(
            "/.well-known/openid-configuration",
            web::get().to(oauth_handlers::discovery),
        )
        .route("/.well-known/jwks.json", web::get().to(oauth_handlers::jwks))
        // ─────────────────────────────────────────────────────────────────
        // OAuth 2.0 / OIDC
        // ─────────────────────────────────────────────────────────────────
        .service(
            web::scope("/oauth2")
                .route("/authorize", web::get().to(oauth_handlers::authorize))
                .route("/token", web::post().to(oauth_handlers::token))
                .route("/introspect", web::post().to(oauth_handlers::introspect))
                .route("/revoke", web::post().to(oauth_handlers::revoke))
                .route("/userinfo", web::get().to(oauth_handlers::userinfo))
                .route("/consent", web::post().to(oauth_handlers::consent))
                .route("/device/code", web::post().to(oauth_handlers::device_code))
                .route(
                    "/device/approve",
                    web::post().to(oauth_handlers::device_approve),
                )
                .route("/device/deny", web::post().to(oauth_handlers::device_deny))
                .route("/logout", web::post().to(oauth_handlers::end_session)),
        )
        // ─────────────────────────────────────────────────────────────────
        // First-Party Auth API v1
        // ─────────────────────────────────────────────────────────────────
        .service(
            web::scope("/api/v1/auth")
                // Public routes (no authentication required)
                .route("/register", web::post().to(handlers::register))
                .route("/login", web::post().to(handlers::login))
                .route("/login/2fa", web::post().to(handlers::login_two_factor))
                .route(
                    "/passwordless/init",
                    web::post().to(handlers::passwordless_init),
                )
                .route(
                    "/passwordless/complete",
                    web::post().to(handlers::passwordless_complete),
                )
                .route("/refresh", web::post().to(handlers::refresh_token))
                .route("/logout", web::post().to(handlers::logout))
                // Protected routes (Bearer access token)
                .route("/logout-all", web::post().to(handlers::logout_all))
                .route("/2fa/setup", web::post().to(handlers::totp_setup))
                .route("/2fa/enable", web::post().to(handlers::totp_enable))
                .route("/api-keys", web::post().to(handlers::create_api_key))
                .route("/api-keys", web::get().to(handlers::list_api_keys))
                .route(
                    "/api-keys/{id}",
                    web::delete().to(handlers::revoke_api_key),
                )
                .route(
                    "/password/change",
                    web::post().to(handlers::change_password),
                )
                .route("/me", web::get().to(handlers::get_profile))
                .route("/sessions", web::get().to(handlers::list_sessions))
                .route(
                    "/sessions/{id}",
                    web::delete().to(handlers::revoke_session),
                ),
        );
}
