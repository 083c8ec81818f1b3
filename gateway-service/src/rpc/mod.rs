//! # Internal RPC Surface
//!
//! Service-to-service methods under `POST /rpc/v1/{Method}`, guarded by
//! the interceptor chain:
//!
//! ```text
//! request ──► extract context (headers → ClientInfo/DeviceInfo)
//!         ──► authenticate (x-api-key / Bearer; `agw_` vs `app_` prefix)
//!         ──► authorize (static {method → scope} table, DENY BY DEFAULT)
//!         ──► dispatch to the method handler
//! ```
//!
//! The allow-list in [`scope_map`] is **the** safety invariant of this
//! plane: adding a new method requires adding a table entry, and every
//! unmapped method is refused before its handler exists.

pub mod context;
pub mod handlers;
pub mod interceptor;
pub mod routes;
pub mod scope_map;

pub use context::{ClientInfo, RequestContext};
pub use interceptor::{CallerIdentity, RpcInterceptor};
