//! Error logging with request context attached.

pub mod pii;

use std::error::Error as StdError;

use actix_web::{HttpMessage, HttpRequest};
use serde::Serialize;
use tracing::error as log_error;

use crate::web::{remote_address, SessionId};

pub use pii::{redact, redact_header, Redacted};

/// What an error log line says about the request that triggered it.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RequestInfo {
    #[serde(rename = "request-id")]
    pub request_id: Option<String>,
    pub ip: Option<String>,
    pub ua: Option<String>,
    pub method: String,
    #[serde(rename = "originalUrl")]
    pub original_url: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    #[serde(rename = "sessionID")]
    pub session_id: Option<String>,
    pub protocol: String,
    pub host: String,
}

impl RequestInfo {
    pub fn from_http_request(req: &HttpRequest) -> Self {
        let header = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        let mut headers: Vec<(String, String)> = req
            .headers()
            .iter()
            .map(|(name, value)| {
                let value = String::from_utf8_lossy(value.as_bytes());
                (name.as_str().to_string(), redact_header(name.as_str(), &value))
            })
            .collect();
        headers.sort();

        let conn = req.connection_info();
        Self {
            request_id: header("x-request-id"),
            ip: remote_address(req),
            ua: header("user-agent"),
            method: req.method().to_string(),
            original_url: req.uri().to_string(),
            query: Some(req.query_string())
                .filter(|q| !q.is_empty())
                .map(str::to_string),
            headers,
            session_id: req.extensions().get::<SessionId>().map(|s| s.0.clone()),
            protocol: conn.scheme().to_string(),
            host: conn.host().to_string(),
        }
    }
}

/// `err`'s message followed by the messages of its sources, outermost first.
pub fn error_chain(err: &dyn StdError) -> Vec<String> {
    std::iter::successors(Some(err), |e: &&dyn StdError| (*e).source())
        .map(ToString::to_string)
        .collect()
}

/// Logs one error event: the message, then the request, then the error chain.
pub fn error(message: &str, err: Option<&dyn StdError>, request: Option<&RequestInfo>) {
    let chain = err.map(error_chain).unwrap_or_default();
    let request = request.and_then(|info| serde_json::to_string(info).ok());

    log_error!(
        error.message = chain.first().map(String::as_str).unwrap_or(""),
        request = request.as_deref().unwrap_or(""),
        error.chain = ?chain,
        "{message}"
    );
}
