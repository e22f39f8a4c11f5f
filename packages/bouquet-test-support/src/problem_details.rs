//! Assertions on `application/problem+json` error responses.

use actix_web::body::{self, MessageBody};
use actix_web::dev::ServiceResponse;
use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ProblemDetailsLike {
    #[serde(rename = "type")]
    type_: String,
    status: u16,
    detail: String,
    code: String,
    trace_id: String,
}

/// Checks status, code and detail key, and that the body's `trace_id`
/// matches the `x-trace-id` header.
pub async fn assert_problem_details<B>(
    resp: ServiceResponse<B>,
    expected_status: StatusCode,
    expected_code: &str,
    expected_detail: &str,
) where
    B: MessageBody,
{
    let (_, resp) = resp.into_parts();
    assert_problem_response(resp, expected_status, expected_code, expected_detail).await;
}

/// Same checks on a bare response, e.g. one rendered from a middleware error.
pub async fn assert_problem_response<B>(
    resp: HttpResponse<B>,
    expected_status: StatusCode,
    expected_code: &str,
    expected_detail: &str,
) where
    B: MessageBody,
{
    assert_eq!(resp.status(), expected_status);

    let trace_header = resp
        .headers()
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .expect("x-trace-id header should be present");

    let body = body::to_bytes(resp.into_body())
        .await
        .map_err(Into::<Box<dyn std::error::Error>>::into)
        .expect("body should be readable");
    let problem: ProblemDetailsLike =
        serde_json::from_slice(&body).expect("body should be problem details json");

    assert_eq!(problem.trace_id, trace_header);
    assert_eq!(problem.status, expected_status.as_u16());
    assert_eq!(problem.code, expected_code);
    assert_eq!(problem.detail, expected_detail);
    assert!(problem.type_.starts_with("/errors/"));
}
