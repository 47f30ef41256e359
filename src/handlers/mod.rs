// HTTP request handlers for the U2F demo server
pub mod health;
pub mod origin;
pub mod state;
pub mod u2f;


use actix_web::web;

// Re-export the main handler functions
pub use health::health;
pub use state::U2fState;
pub use u2f::{bind, enroll, error_to_response, sign, verify, UserQuery, VerifyResponse};

/// Register the demo routes
pub fn configure_services(cfg: &mut web::ServiceConfig) {
    cfg.route("/enroll", web::get().to(enroll))
        .route("/bind", web::post().to(bind))
        .route("/sign", web::post().to(sign))
        .route("/verify", web::post().to(verify))
        .route("/ping", web::get().to(health));
}
