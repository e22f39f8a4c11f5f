//! Disables client and proxy caching on every response.

use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header;
use actix_web::Error as ActixError;
use futures_util::future::{ready, LocalBoxFuture, Ready};

pub struct EnsureNocache;

impl<S, B> Transform<S, ServiceRequest> for EnsureNocache
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = ActixError;
    type InitError = ();
    type Transform = EnsureNocacheMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(EnsureNocacheMiddleware { service }))
    }
}

pub struct EnsureNocacheMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for EnsureNocacheMiddleware<S>
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
        let fut = self.service.call(req);

        Box::pin(async move {
            let mut res = fut.await?;
            let headers = res.headers_mut();

            headers.insert(
                header::HeaderName::from_static("surrogate-control"),
                header::HeaderValue::from_static("no-store"),
            );
            headers.insert(
                header::CACHE_CONTROL,
                header::HeaderValue::from_static(
                    "no-store, no-cache, must-revalidate, proxy-revalidate",
                ),
            );
            headers.insert(header::PRAGMA, header::HeaderValue::from_static("no-cache"));
            headers.insert(header::EXPIRES, header::HeaderValue::from_static("0"));

            Ok(res)
        })
    }
}
