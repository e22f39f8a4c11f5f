//! actix-web integration: request extensions, middleware and error wiring.

pub mod middleware;
pub mod setup;
pub mod trace_ctx;

use std::future::{ready, Ready};

use actix_web::dev::Payload;
use actix_web::{web, Error as ActixError, FromRequest, HttpMessage, HttpRequest};
use futures_util::future::LocalBoxFuture;
use serde_json::{Map, Value};

use crate::error::AppError;
use crate::pg::RequestContext;

/// The signed-in user, inserted into request extensions by the application's
/// authentication layer. Its fields become `request.user.*` settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedUser(pub Map<String, Value>);

/// Identifier of the caller's session, inserted by the session layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionId(pub String);

/// Trace id assigned by `RequestTrace`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

/// Best-effort client address: `x-forwarded-for`, then the connection's real ip, then the peer.
pub fn remote_address(req: &HttpRequest) -> Option<String> {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        return Some(forwarded.to_string());
    }

    if let Some(ip) = req.connection_info().realip_remote_addr() {
        return Some(ip.to_string());
    }

    req.peer_addr().map(|addr| addr.ip().to_string())
}

impl FromRequest for RequestContext {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Ok(RequestContext::from_http_request(req)))
    }
}

/// A [`RequestContext`] with the JSON object body attached, for handlers that
/// propagate `request.body.*` settings. Rejects bodies that are not JSON objects.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextWithBody(pub RequestContext);

impl ContextWithBody {
    pub fn into_inner(self) -> RequestContext {
        self.0
    }
}

impl FromRequest for ContextWithBody {
    type Error = ActixError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let ctx = RequestContext::from_http_request(req);
        let body = web::Json::<Map<String, Value>>::from_request(req, payload);
        Box::pin(async move {
            let body = body.await?;
            Ok(ContextWithBody(ctx.with_body(body.into_inner())))
        })
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthenticatedUser>()
                .cloned()
                .ok_or(AppError::Unauthorized),
        )
    }
}
