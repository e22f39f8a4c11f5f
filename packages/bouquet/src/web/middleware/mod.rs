//! Request middleware. Suggested wiring, outermost last:
//!
//! ```ignore
//! App::new()
//!     .wrap(ensure_authenticated())
//!     .wrap(ensure_csrf_protected(&web_config))
//!     .wrap(ensure_trace_protected(&web_config))
//!     .wrap(EnsureNocache)
//!     .wrap(RequestTrace)
//!     .wrap(StructuredLogger)
//! ```
//!
//! `RequestTrace` must sit outside the guards so their rejections are rendered
//! with the request's trace id.

pub mod guard;
pub mod nocache;
pub mod request_trace;
pub mod structured_logger;

pub use guard::{
    ensure_authenticated, ensure_csrf_protected, ensure_trace_protected, new_csrf_cookie,
    RequestGuard, CSRF_COOKIE,
};
pub use nocache::EnsureNocache;
pub use request_trace::{RequestTrace, REQUEST_ID_HEADER};
pub use structured_logger::StructuredLogger;
