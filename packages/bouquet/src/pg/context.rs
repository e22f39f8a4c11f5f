//! Request data that can be propagated into a database transaction.
//!
//! `RequestContext` is a read-only snapshot of the parts of an inbound request
//! that may become session settings. It is decoupled from actix so that
//! background jobs and tests can build one by hand.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use actix_web::{web, HttpMessage, HttpRequest};
use serde_json::{Map, Value};

use crate::web::{AuthenticatedUser, SessionId};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestContext {
    pub method: String,
    pub protocol: String,
    pub host: String,
    /// Path plus query string, as received.
    pub original_url: String,
    /// Lowercased header names with their (joined) values.
    pub headers: Vec<(String, String)>,
    pub user: Option<Map<String, Value>>,
    pub query: Map<String, Value>,
    pub params: Map<String, Value>,
    pub body: Option<Map<String, Value>>,
    pub session_id: Option<String>,
}

impl RequestContext {
    pub fn new(
        method: impl Into<String>,
        protocol: impl Into<String>,
        host: impl Into<String>,
        original_url: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into(),
            protocol: protocol.into(),
            host: host.into(),
            original_url: original_url.into(),
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .push((name.into().to_ascii_lowercase(), value.into()));
        self
    }

    pub fn with_query(mut self, query: Map<String, Value>) -> Self {
        self.query = query;
        self
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    pub fn with_user(mut self, user: Map<String, Value>) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_body(mut self, body: Map<String, Value>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Snapshot an actix request.
    ///
    /// Headers are sorted by name so the resulting settings do not depend on
    /// header map iteration order. Repeated query keys become JSON arrays.
    pub fn from_http_request(req: &HttpRequest) -> Self {
        let conn = req.connection_info();

        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in req.headers().iter() {
            grouped
                .entry(name.as_str().to_string())
                .or_default()
                .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
        }
        let headers = grouped
            .into_iter()
            .map(|(name, values)| (name, values.join(", ")))
            .collect();

        let mut query = Map::new();
        if let Ok(pairs) = web::Query::<Vec<(String, String)>>::from_query(req.query_string()) {
            for (key, value) in pairs.into_inner() {
                match query.get_mut(&key) {
                    Some(Value::Array(values)) => values.push(Value::String(value)),
                    Some(existing) => {
                        let first = existing.take();
                        *existing = Value::Array(vec![first, Value::String(value)]);
                    }
                    None => {
                        query.insert(key, Value::String(value));
                    }
                }
            }
        }

        let params = req
            .match_info()
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();

        let extensions = req.extensions();
        let user = extensions.get::<AuthenticatedUser>().map(|u| u.0.clone());
        let session_id = extensions.get::<SessionId>().map(|s| s.0.clone());

        Self {
            method: req.method().as_str().to_string(),
            protocol: conn.scheme().to_string(),
            host: conn.host().to_string(),
            original_url: req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| req.path().to_string()),
            headers,
            user,
            query,
            params,
            body: None,
            session_id,
        }
    }

    /// First value of a header, by lowercase name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn full_url(&self) -> String {
        format!("{}://{}{}", self.protocol, self.host, self.original_url)
    }
}

/// A facet of the request that can be turned into session settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextPart {
    Headers,
    User,
    Query,
    Params,
    Body,
    Session,
    FullUrl,
    Method,
}

impl ContextPart {
    /// Name segment used in `request.<segment>[.<key>]`.
    pub fn setting_segment(self) -> &'static str {
        match self {
            ContextPart::Headers => "header",
            ContextPart::User => "user",
            ContextPart::Query => "query",
            ContextPart::Params => "params",
            ContextPart::Body => "body",
            ContextPart::Session => "session",
            ContextPart::FullUrl => "fullUrl",
            ContextPart::Method => "method",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownContextPart(pub String);

impl fmt::Display for UnknownContextPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown request context part '{}'", self.0)
    }
}

impl std::error::Error for UnknownContextPart {}

impl FromStr for ContextPart {
    type Err = UnknownContextPart;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "headers" => Ok(ContextPart::Headers),
            "user" => Ok(ContextPart::User),
            "query" => Ok(ContextPart::Query),
            "params" => Ok(ContextPart::Params),
            "body" => Ok(ContextPart::Body),
            "session" => Ok(ContextPart::Session),
            "fullUrl" => Ok(ContextPart::FullUrl),
            "method" => Ok(ContextPart::Method),
            other => Err(UnknownContextPart(other.to_string())),
        }
    }
}

type ResolveFn = dyn Fn(&RequestContext) -> String + Send + Sync;

/// Where the transaction role comes from.
#[derive(Clone)]
pub enum RoleSource {
    Static(String),
    Resolver(Arc<ResolveFn>),
}

impl RoleSource {
    pub fn resolver<F>(f: F) -> Self
    where
        F: Fn(&RequestContext) -> String + Send + Sync + 'static,
    {
        RoleSource::Resolver(Arc::new(f))
    }

    /// `<prefix><user.field>`, or `<prefix><fallback>` when there is no user
    /// or the field is not a string.
    pub fn from_user_field(prefix: &str, field: &str, fallback: &str) -> Self {
        let prefix = prefix.to_string();
        let field = field.to_string();
        let fallback = fallback.to_string();
        Self::resolver(move |ctx| {
            let name = ctx
                .user
                .as_ref()
                .and_then(|u| u.get(&field))
                .and_then(Value::as_str)
                .unwrap_or(&fallback);
            format!("{prefix}{name}")
        })
    }

    pub fn resolve(&self, ctx: &RequestContext) -> String {
        match self {
            RoleSource::Static(role) => role.clone(),
            RoleSource::Resolver(f) => f(ctx),
        }
    }
}

impl fmt::Debug for RoleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleSource::Static(role) => f.debug_tuple("Static").field(role).finish(),
            RoleSource::Resolver(_) => f.write_str("Resolver(..)"),
        }
    }
}

impl From<&str> for RoleSource {
    fn from(role: &str) -> Self {
        RoleSource::Static(role.to_string())
    }
}

impl From<String> for RoleSource {
    fn from(role: String) -> Self {
        RoleSource::Static(role)
    }
}
