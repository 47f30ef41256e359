use actix_web::{HttpResponse, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

/// Health check endpoint
///
/// # Errors
/// Never fails; the `Result` matches the other handlers' signatures
pub async fn health() -> Result<HttpResponse> {
    let response = HealthResponse {
        status: "ok".to_string(),
        message: "u2frs U2F server is running".to_string(),
    };
    Ok(HttpResponse::Ok().json(response))
}
