use actix_web::{HttpResponse, Result};

use super::types::HealthResponse;

/// Health check endpoint
///
/// # Errors
/// Returns an error if health status cannot be determined
pub async fn health() -> Result<HttpResponse> {
    let response = HealthResponse {
        status: "ok".to_string(),
        message: format!("Passvote wallet {} is running", crate::VERSION),
    };
    Ok(HttpResponse::Ok().json(response))
}
