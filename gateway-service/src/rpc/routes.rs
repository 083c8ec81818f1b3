//! # RPC Route Configuration
//!
//! A single parameterized route: every method is `POST /rpc/v1/{Method}`.
//! The dispatcher (not the router) is where methods exist or don't —
//! combined with the allow-list, an unknown `{Method}` is authenticated,
//! then denied, and never reaches handler code.

use actix_web::web;

use super::handlers;

/// Mounts the RPC surface.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/rpc/v1/{method}", web::post().to(handlers::dispatch));
}
