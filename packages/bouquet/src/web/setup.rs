use actix_web::web;

use crate::error::AppError;

/// Routes every unmatched request to a `server.404` problem response.
///
/// Register last, after the application's own routes and services.
pub fn configure_error_handling(cfg: &mut web::ServiceConfig) {
    cfg.default_service(web::to(not_found));
}

async fn not_found() -> Result<&'static str, AppError> {
    Err(AppError::NotFound)
}
