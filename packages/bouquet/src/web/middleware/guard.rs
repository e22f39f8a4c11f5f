//! Request guards: middleware that either passes a request through untouched
//! or rejects it with an `AppError` before it reaches the handler.

use std::future::{ready, Ready};
use std::sync::Arc;

use actix_web::cookie::{Cookie, SameSite};
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::Method;
use actix_web::{web, Error as ActixError, HttpMessage};
use futures_util::future::LocalBoxFuture;
use tracing::debug;
use uuid::Uuid;

use crate::config::web::WebConfig;
use crate::error::AppError;
use crate::web::AuthenticatedUser;

/// Cookie holding the CSRF token; clients echo it in a header or `_csrf` query parameter.
pub const CSRF_COOKIE: &str = "_csrf";
const CSRF_HEADERS: [&str; 3] = ["csrf-token", "x-csrf-token", "x-xsrf-token"];
const CSRF_QUERY_PARAM: &str = "_csrf";

type Check = dyn Fn(&ServiceRequest) -> Result<(), AppError> + Send + Sync;

#[derive(Clone)]
pub struct RequestGuard {
    name: &'static str,
    check: Arc<Check>,
}

impl RequestGuard {
    pub fn new<F>(name: &'static str, check: F) -> Self
    where
        F: Fn(&ServiceRequest) -> Result<(), AppError> + Send + Sync + 'static,
    {
        Self {
            name,
            check: Arc::new(check),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequestGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = ActixError;
    type InitError = ();
    type Transform = RequestGuardMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestGuardMiddleware {
            service,
            name: self.name,
            check: Arc::clone(&self.check),
        }))
    }
}

pub struct RequestGuardMiddleware<S> {
    service: S,
    name: &'static str,
    check: Arc<Check>,
}

impl<S, B> Service<ServiceRequest> for RequestGuardMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = ActixError;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if let Err(err) = (self.check)(&req) {
            debug!(guard = self.name, path = req.path(), code = err.code(), "request rejected");
            return Box::pin(ready(Err(err.into())));
        }

        Box::pin(self.service.call(req))
    }
}

/// Rejects requests without an `AuthenticatedUser` (401 `server.401`).
pub fn ensure_authenticated() -> RequestGuard {
    RequestGuard::new("ensure_authenticated", |req| {
        if req.extensions().contains::<AuthenticatedUser>() {
            Ok(())
        } else {
            Err(AppError::Unauthorized)
        }
    })
}

/// Rejects `TRACE` requests when protection is enabled (405 `server.405`).
pub fn ensure_trace_protected(config: &WebConfig) -> RequestGuard {
    let enabled = config.with_protection;
    RequestGuard::new("ensure_trace_protected", move |req| {
        if enabled && req.method() == Method::TRACE {
            Err(AppError::MethodNotAllowed)
        } else {
            Ok(())
        }
    })
}

/// Double-submit CSRF check when protection is enabled.
///
/// Every method except `HEAD` and `OPTIONS` must echo the `_csrf` cookie value.
pub fn ensure_csrf_protected(config: &WebConfig) -> RequestGuard {
    let enabled = config.with_protection;
    RequestGuard::new("ensure_csrf_protected", move |req| {
        if enabled {
            check_csrf(req)
        } else {
            Ok(())
        }
    })
}

fn check_csrf(req: &ServiceRequest) -> Result<(), AppError> {
    if req.method() == Method::HEAD || req.method() == Method::OPTIONS {
        return Ok(());
    }

    let expected = req
        .cookie(CSRF_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(AppError::InvalidCsrfToken)?;

    let presented = CSRF_HEADERS
        .iter()
        .find_map(|name| req.headers().get(*name).and_then(|v| v.to_str().ok()))
        .map(str::to_string)
        .or_else(|| {
            web::Query::<Vec<(String, String)>>::from_query(req.query_string())
                .ok()
                .and_then(|q| {
                    q.into_inner()
                        .into_iter()
                        .find(|(k, _)| k == CSRF_QUERY_PARAM)
                        .map(|(_, v)| v)
                })
        });

    match presented {
        Some(token) if constant_time_eq(token.as_bytes(), expected.as_bytes()) => Ok(()),
        _ => Err(AppError::InvalidCsrfToken),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// A fresh CSRF cookie. Readable by scripts so the client can echo it back.
pub fn new_csrf_cookie() -> Cookie<'static> {
    Cookie::build(CSRF_COOKIE, Uuid::new_v4().simple().to_string())
        .path("/")
        .same_site(SameSite::Strict)
        .http_only(false)
        .finish()
}
