//! # Public HTTP Surface
//!
//! End-user-facing endpoints:
//!
//! | Area | Paths |
//! |------|-------|
//! | Health | `GET /health` |
//! | First-party auth | `/api/v1/auth/*` |
//! | Sessions | `/api/v1/auth/sessions*` |
//! | OAuth / OIDC | `/oauth2/*`, `/.well-known/*` |
//!
//! Handlers translate protocol requests into service calls and map typed
//! errors back to status codes; OAuth endpoints additionally speak the
//! RFC 6749 error shape (handled by the error type itself).

pub mod dto;
pub mod handlers;
pub mod oauth_handlers;
pub mod routes;
