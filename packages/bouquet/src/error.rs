use actix_web::error::ResponseError;
use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::config::ConfigError;
use crate::mailjet::MailjetError;
use crate::pg::PgError;
use crate::web::trace_ctx;

#[derive(Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub type_: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    pub code: String,
    pub trace_id: String,
}

/// Errors surfaced at the HTTP boundary.
///
/// Details of the `server.*` form are message keys for the client to translate.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found")]
    NotFound,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Invalid CSRF token")]
    InvalidCsrfToken,
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Bad request: {detail}")]
    BadRequest { code: &'static str, detail: String },
    #[error("Database error: {detail}")]
    Db { detail: String },
    #[error("Database unavailable: {detail}")]
    DbUnavailable { detail: String },
    #[error("Mail delivery failed: {detail}")]
    Mail { detail: String },
    #[error("Configuration error: {detail}")]
    Config { detail: String },
    #[error("Internal error: {detail}")]
    Internal { detail: String },
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound => "NOT_FOUND",
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::InvalidCsrfToken => "INVALID_CSRF_TOKEN",
            AppError::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            AppError::BadRequest { code, .. } => *code,
            AppError::Db { .. } => "DB_ERROR",
            AppError::DbUnavailable { .. } => "DB_UNAVAILABLE",
            AppError::Mail { .. } => "MAIL_ERROR",
            AppError::Config { .. } => "CONFIG_ERROR",
            AppError::Internal { .. } => "INTERNAL",
        }
    }

    pub fn detail(&self) -> String {
        match self {
            AppError::NotFound => "server.404".to_string(),
            AppError::Unauthorized => "server.401".to_string(),
            AppError::InvalidCsrfToken => "server.security.invalid-csrf-token".to_string(),
            AppError::MethodNotAllowed => "server.405".to_string(),
            AppError::BadRequest { detail, .. }
            | AppError::Db { detail }
            | AppError::DbUnavailable { detail }
            | AppError::Mail { detail }
            | AppError::Config { detail }
            | AppError::Internal { detail } => detail.clone(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::InvalidCsrfToken => StatusCode::FORBIDDEN,
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::Db { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::DbUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Mail { .. } => StatusCode::BAD_GATEWAY,
            AppError::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn bad_request(code: &'static str, detail: String) -> Self {
        Self::BadRequest { code, detail }
    }

    pub fn internal(detail: String) -> Self {
        Self::Internal { detail }
    }

    fn humanize_code(code: &str) -> String {
        code.split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    None => String::new(),
                    Some(first) => first
                        .to_uppercase()
                        .chain(chars.flat_map(char::to_lowercase))
                        .collect(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Server messages stay in the logs; clients get a fixed key.
impl From<PgError> for AppError {
    fn from(e: PgError) -> Self {
        match e {
            PgError::Acquire(_) => {
                error!(error = %e, "database unavailable");
                AppError::DbUnavailable {
                    detail: "server.db.unavailable".to_string(),
                }
            }
            PgError::Config(config) => AppError::from(config),
            PgError::Statement { .. } | PgError::Commit(_) | PgError::InvalidRole { .. } => {
                error!(
                    error = %e,
                    stage = ?e.stage(),
                    sqlstate = ?e.db_code(),
                    "database statement failed"
                );
                AppError::Db {
                    detail: "server.db.error".to_string(),
                }
            }
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::Config {
            detail: e.to_string(),
        }
    }
}

impl From<MailjetError> for AppError {
    fn from(e: MailjetError) -> Self {
        AppError::Mail {
            detail: e.to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        self.status()
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status();
        let code = self.code();
        let trace_id = trace_ctx::trace_id();

        let problem_details = ProblemDetails {
            type_: format!("/errors/{}", code.to_lowercase().replace('_', "-")),
            title: Self::humanize_code(code),
            status: status.as_u16(),
            detail: self.detail(),
            code: code.to_string(),
            trace_id: trace_id.clone(),
        };

        HttpResponse::build(status)
            .content_type("application/problem+json")
            .insert_header(("x-trace-id", trace_id))
            .json(problem_details)
    }
}

#[cfg(test)]
mod tests {
    use actix_web::body::to_bytes;
    use serde_json::Value;

    use super::*;

    #[test]
    fn test_humanize_code() {
        assert_eq!(AppError::humanize_code("INVALID_CSRF_TOKEN"), "Invalid Csrf Token");
        assert_eq!(AppError::humanize_code("NOT_FOUND"), "Not Found");
    }

    #[test]
    fn test_statuses() {
        assert_eq!(AppError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::InvalidCsrfToken.status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::MethodNotAllowed.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn test_pg_acquire_maps_to_unavailable() {
        let err = AppError::from(PgError::Acquire(sqlx::Error::PoolTimedOut));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.code(), "DB_UNAVAILABLE");
        assert_eq!(err.detail(), "server.db.unavailable");
        assert!(!err.detail().contains("timed out"));
    }

    #[test]
    fn test_pg_statement_detail_is_fixed() {
        let err = AppError::from(PgError::Statement {
            stage: crate::pg::Stage::Execute,
            source: sqlx::Error::Protocol("relation \"secret_table\" does not exist".to_string()),
        });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.detail(), "server.db.error");

        let err = AppError::from(PgError::InvalidRole {
            role: "app_admin\0".to_string(),
        });
        assert_eq!(err.detail(), "server.db.error");
    }

    #[actix_web::test]
    async fn test_problem_details_body() {
        let response = trace_ctx::with_trace_id("trace-1".to_string(), async {
            AppError::Unauthorized.error_response()
        })
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get("x-trace-id").and_then(|v| v.to_str().ok()),
            Some("trace-1")
        );

        let body = to_bytes(response.into_body()).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["detail"], "server.401");
        assert_eq!(json["code"], "UNAUTHORIZED");
        assert_eq!(json["trace_id"], "trace-1");
        assert_eq!(json["status"], 401);
    }
}
