//! Assigns every request a trace id and runs it inside a `request` span.
//!
//! A well-formed inbound `x-request-id` is adopted so ids line up across
//! services; otherwise a fresh uuid is generated. The id is stored as a
//! [`RequestId`] extension, scoped as the task-local trace id for the request
//! future, and echoed back in the `x-request-id` response header.
//!
//! Errors raised by inner middleware are rendered here, inside the scope, and
//! passed on as pre-built responses so their problem bodies carry the right
//! trace id however far out they are finally written.

use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::error::InternalError;
use actix_web::http::header;
use actix_web::{Error as ActixError, HttpMessage};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::web::{trace_ctx, RequestId};

pub const REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_INBOUND_ID_LEN: usize = 128;

pub struct RequestTrace;

impl<S, B> Transform<S, ServiceRequest> for RequestTrace
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = ActixError;
    type InitError = ();
    type Transform = RequestTraceMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestTraceMiddleware { service }))
    }
}

pub struct RequestTraceMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for RequestTraceMiddleware<S>
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
        let trace_id = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|id| is_acceptable_id(id))
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        req.extensions_mut().insert(RequestId(trace_id.clone()));

        let span = info_span!(
            "request",
            trace_id = %trace_id,
            method = %req.method(),
            path = %req.path()
        );

        let fut = trace_ctx::sync_with_trace_id(trace_id.clone(), || self.service.call(req));
        let header_value = header::HeaderValue::from_str(&trace_id)
            .unwrap_or_else(|_| header::HeaderValue::from_static("invalid-trace-id"));
        let header_name = header::HeaderName::from_static(REQUEST_ID_HEADER);

        Box::pin(
            trace_ctx::with_trace_id(trace_id, async move {
                match fut.await {
                    Ok(mut res) => {
                        res.headers_mut().insert(header_name, header_value);
                        Ok(res)
                    }
                    Err(err) => {
                        let mut rendered = err.error_response();
                        rendered.headers_mut().insert(header_name, header_value);
                        Err(InternalError::from_response(err, rendered).into())
                    }
                }
            })
            .instrument(span),
        )
    }
}

fn is_acceptable_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_INBOUND_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.')
}
