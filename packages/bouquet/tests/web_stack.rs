//! The full middleware stack as an application wires it.

mod common;

use actix_web::body::MessageBody;
use actix_web::cookie::Cookie;
use actix_web::dev::{Service, ServiceResponse};
use actix_web::http::{Method, StatusCode};
use actix_web::{test, web, App, HttpMessage, HttpResponse};
use bouquet::config::web::WebConfig;
use bouquet::web::middleware::{
    ensure_authenticated, ensure_csrf_protected, ensure_trace_protected, EnsureNocache,
    RequestTrace, StructuredLogger, CSRF_COOKIE,
};
use bouquet::web::setup::configure_error_handling;
use bouquet::{AuthenticatedUser, RequestContext};
use bouquet_test_support::{assert_problem_details, assert_problem_response};
use serde_json::{json, Map, Value};

async fn me(ctx: RequestContext) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "method": ctx.method,
        "user": ctx.user,
        "params": ctx.params,
    }))
}

async fn ping() -> HttpResponse {
    HttpResponse::Ok().body("pong")
}

macro_rules! app {
    ($config:expr) => {{
        let config: WebConfig = $config;
        test::init_service(
            App::new()
                .service(
                    web::scope("/api")
                        .wrap(ensure_authenticated())
                        .route("/me/{section}", web::get().to(me)),
                )
                .route("/ping", web::route().to(ping))
                .configure(configure_error_handling)
                .wrap(ensure_csrf_protected(&config))
                .wrap(ensure_trace_protected(&config))
                .wrap_fn(|req, srv| {
                    let user = req
                        .headers()
                        .get("x-test-user")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    if let Some(id) = user {
                        let mut fields = Map::new();
                        fields.insert("id".to_string(), Value::String(id));
                        req.extensions_mut().insert(AuthenticatedUser(fields));
                    }
                    srv.call(req)
                })
                .wrap(EnsureNocache)
                .wrap(RequestTrace)
                .wrap(StructuredLogger),
        )
        .await
    }};
}

/// The response a client would see: middleware errors are rendered the way
/// the server renders them.
async fn respond<S, R, B>(app: &S, req: R) -> HttpResponse
where
    S: Service<R, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody + 'static,
{
    match test::try_call_service(app, req).await {
        Ok(res) => res.into_parts().1.map_into_boxed_body(),
        Err(err) => err.error_response(),
    }
}

fn protected() -> WebConfig {
    WebConfig {
        with_protection: true,
        ..WebConfig::default()
    }
}

#[actix_web::test]
async fn test_unknown_route_is_404_problem() {
    common::init_logging();
    let app = app!(WebConfig::default());

    let resp = test::call_service(&app, test::TestRequest::get().uri("/nope").to_request()).await;
    assert!(resp.headers().contains_key("x-request-id"));
    assert_eq!(
        resp.headers().get("pragma").and_then(|v| v.to_str().ok()),
        Some("no-cache")
    );
    assert_problem_details(resp, StatusCode::NOT_FOUND, "NOT_FOUND", "server.404").await;
}

#[actix_web::test]
async fn test_api_requires_user() {
    common::init_logging();
    let app = app!(WebConfig::default());

    let resp = respond(&app, test::TestRequest::get().uri("/api/me/profile").to_request()).await;
    assert_problem_response(resp, StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "server.401").await;
}

#[actix_web::test]
async fn test_context_reaches_handler() {
    common::init_logging();
    let app = app!(WebConfig::default());

    let req = test::TestRequest::get()
        .uri("/api/me/profile")
        .insert_header(("x-test-user", "42"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["method"], "GET");
    assert_eq!(body["user"]["id"], "42");
    assert_eq!(body["params"]["section"], "profile");
}

#[actix_web::test]
async fn test_protection_rejects_trace_and_missing_csrf() {
    common::init_logging();
    let app = app!(protected());

    let trace = test::TestRequest::default()
        .method(Method::TRACE)
        .uri("/ping")
        .to_request();
    let resp = respond(&app, trace).await;
    assert_problem_response(
        resp,
        StatusCode::METHOD_NOT_ALLOWED,
        "METHOD_NOT_ALLOWED",
        "server.405",
    )
    .await;

    let post = test::TestRequest::post().uri("/ping").to_request();
    let resp = respond(&app, post).await;
    assert_problem_response(
        resp,
        StatusCode::FORBIDDEN,
        "INVALID_CSRF_TOKEN",
        "server.security.invalid-csrf-token",
    )
    .await;
}

#[actix_web::test]
async fn test_protection_accepts_matching_csrf() {
    common::init_logging();
    let app = app!(protected());

    let post = test::TestRequest::post()
        .uri("/ping")
        .cookie(Cookie::new(CSRF_COOKIE, "tok"))
        .insert_header(("x-csrf-token", "tok"))
        .to_request();
    let resp = test::call_service(&app, post).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("cache-control").and_then(|v| v.to_str().ok()),
        Some("no-store, no-cache, must-revalidate, proxy-revalidate")
    );
}

#[actix_web::test]
async fn test_inbound_request_id_is_echoed_in_errors() {
    common::init_logging();
    let app = app!(WebConfig::default());

    let req = test::TestRequest::get()
        .uri("/api/me/x")
        .insert_header(("x-request-id", "edge-42"))
        .to_request();
    let resp = respond(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        resp.headers().get("x-request-id").and_then(|v| v.to_str().ok()),
        Some("edge-42")
    );
    assert_eq!(
        resp.headers().get("x-trace-id").and_then(|v| v.to_str().ok()),
        Some("edge-42")
    );
}
