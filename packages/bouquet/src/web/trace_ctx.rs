//! Task-local trace id for the request being served.
//!
//! `RequestTrace` scopes every request's future with its id, so error responses
//! and log lines can pick it up without threading it through handler arguments.

use tokio::task_local;

task_local! {
    static TRACE_ID: String;
}

/// The current request's trace id, or `"unknown"` outside of a request.
pub fn trace_id() -> String {
    current().unwrap_or_else(|| "unknown".to_string())
}

pub fn current() -> Option<String> {
    TRACE_ID.try_with(String::clone).ok()
}

/// Run a future with `trace_id` as the current trace id.
pub async fn with_trace_id<F, R>(trace_id: String, future: F) -> R
where
    F: std::future::Future<Output = R>,
{
    TRACE_ID.scope(trace_id, future).await
}

/// Synchronous counterpart of [`with_trace_id`].
pub fn sync_with_trace_id<F, R>(trace_id: String, f: F) -> R
where
    F: FnOnce() -> R,
{
    TRACE_ID.sync_scope(trace_id, f)
}
