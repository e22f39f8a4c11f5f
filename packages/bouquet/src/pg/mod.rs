//! Postgres helpers that carry web request context into the database.
//!
//! A request is snapshotted into a [`RequestContext`], flattened into
//! `request.*` settings, and applied with `set_config(..., true)` plus
//! `set local role` inside the same transaction as the caller's statement.
//! Policies and defaults on the database side read them back with
//! `current_setting('request.header.x-request-id', true)`.

pub mod client;
pub mod context;
pub mod error;
pub mod scalar;
pub mod settings;
pub mod statement;
pub mod store;
pub mod txn;

pub use client::{SessionConnection, TrackedClient};
pub use context::{ContextPart, RequestContext, RoleSource};
pub use error::{PgError, Stage};
pub use scalar::{Scalar, SettingsMap};
pub use settings::{
    build_settings_statement, extract_settings, split_for_transaction, SettingsStatement,
    TransactionSettings, ROLE_KEY,
};
pub use statement::{escape_identifier, Statement};
pub use store::{PgStore, DEFAULT_CONTEXT_PARTS};
