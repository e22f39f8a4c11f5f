#![deny(clippy::wildcard_imports)]
#![cfg_attr(test, allow(clippy::wildcard_imports))]

//! Request-aware Postgres access plus the small web, mail and SQL Server
//! helpers an actix application around it needs.

pub mod config;
pub mod error;
pub mod logging;
pub mod mailjet;
pub mod mssql;
pub mod pg;
pub mod telemetry;
pub mod web;

pub use config::db::PgConfig;
pub use config::mailjet::MailjetConfig;
pub use config::mssql::MssqlConfig;
pub use config::web::WebConfig;
pub use config::ConfigError;
pub use error::AppError;
pub use mailjet::{MailjetClient, MailjetError, SendRequest};
pub use mssql::{MssqlError, MssqlPool};
pub use pg::{
    ContextPart, PgError, PgStore, RequestContext, RoleSource, SettingsMap, Statement,
    DEFAULT_CONTEXT_PARTS,
};
pub use telemetry::init_tracing;
pub use web::middleware::{
    ensure_authenticated, ensure_csrf_protected, ensure_trace_protected, EnsureNocache,
    RequestTrace, StructuredLogger,
};
pub use web::setup::configure_error_handling;
pub use web::{remote_address, AuthenticatedUser, ContextWithBody, SessionId};

#[cfg(test)]
#[ctor::ctor]
fn init_test_logging() {
    bouquet_test_support::logging::init();
}
