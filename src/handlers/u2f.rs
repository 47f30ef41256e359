// U2F demo endpoints: enroll, bind, sign and verify
use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::origin::request_app_id;
use super::state::U2fState;
use crate::settings::ServerSettings;
use crate::u2f::U2fError;
use crate::utils::LoggingHelper;

/// User name used when the request does not name one
pub const DEFAULT_USERNAME: &str = "user";

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    #[serde(default = "default_username")]
    pub username: String,
}

fn default_username() -> String {
    DEFAULT_USERNAME.to_string()
}

/// Body returned by a successful `/verify`
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub key_handle: String,
    pub touch: bool,
    pub counter: u32,
}

/// Map an engine error to a JSON error response
#[must_use]
pub fn error_to_response(error: &U2fError) -> HttpResponse {
    let body = json!({
        "error": error.code(),
        "message": error.to_string(),
    });
    match error {
        U2fError::InvalidSignature => HttpResponse::Unauthorized().json(body),
        U2fError::PossibleClone { .. } | U2fError::UntrustedAttestation(_) => {
            HttpResponse::Forbidden().json(body)
        }
        U2fError::Internal(_) => HttpResponse::InternalServerError().json(json!({
            "error": error.code(),
            "message": "An internal error occurred"
        })),
        _ => HttpResponse::BadRequest().json(body),
    }
}

fn unknown_user_response(username: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(json!({
        "error": "unknown_user",
        "message": format!("No enrollment has been started for user {username}")
    }))
}

fn already_registered_response(username: &str) -> HttpResponse {
    HttpResponse::Conflict().json(json!({
        "error": "device_already_registered",
        "message": format!("This key handle is already registered for user {username}")
    }))
}

/// Begin enrolling a device
///
/// Creates the user on first use and returns the registration request for
/// `u2f.register`. Any earlier pending enrollment is replaced.
pub async fn enroll(
    req: HttpRequest,
    query: web::Query<UserQuery>,
    state: web::Data<U2fState>,
    settings: web::Data<ServerSettings>,
) -> HttpResponse {
    let app_id = request_app_id(&req, &settings);
    let username = &query.username;

    state.registry.ensure_user(username);
    let devices = state.registry.list(username);

    match state.service.start_registration(username, &app_id, &devices) {
        Ok(challenge) => HttpResponse::Ok().json(challenge),
        Err(e) => {
            LoggingHelper::log_operation_failed("Enrollment start", username, &e);
            error_to_response(&e)
        }
    }
}

/// Complete enrollment with the `u2f.register` response body
pub async fn bind(
    req: HttpRequest,
    query: web::Query<UserQuery>,
    body: String,
    state: web::Data<U2fState>,
    settings: web::Data<ServerSettings>,
) -> HttpResponse {
    let app_id = request_app_id(&req, &settings);
    let username = &query.username;

    if !state.registry.contains_user(username) {
        return unknown_user_response(username);
    }

    match state.service.finish_registration(username, &app_id, &body) {
        Ok(registration) => {
            let key_handle = &registration.device.key_handle;
            if state
                .registry
                .list(username)
                .iter()
                .any(|device| &device.key_handle == key_handle)
            {
                LoggingHelper::log_duplicate_device(username, &registration.device);
                return already_registered_response(username);
            }
            LoggingHelper::log_device_enrolled(username, &registration);
            state.registry.append(username, registration.device);
            HttpResponse::Ok().json(true)
        }
        Err(e) => {
            LoggingHelper::log_operation_failed("Enrollment", username, &e);
            error_to_response(&e)
        }
    }
}

/// Begin a sign-in against every device the user has enrolled
///
/// A non-empty request body is the data to sign: its SHA-256 becomes the
/// challenge. Without a body the challenge is random.
pub async fn sign(
    req: HttpRequest,
    query: web::Query<UserQuery>,
    body: web::Bytes,
    state: web::Data<U2fState>,
    settings: web::Data<ServerSettings>,
) -> HttpResponse {
    let app_id = request_app_id(&req, &settings);
    let username = &query.username;

    if !state.registry.contains_user(username) {
        return unknown_user_response(username);
    }
    let devices = state.registry.list(username);

    let data = (!body.is_empty()).then_some(&body[..]);

    match state
        .service
        .start_authentication(username, &app_id, &devices, data)
    {
        Ok(challenge) => HttpResponse::Ok().json(challenge),
        Err(e) => {
            LoggingHelper::log_operation_failed("Sign-in start", username, &e);
            error_to_response(&e)
        }
    }
}

/// Complete a sign-in with the `u2f.sign` response body
///
/// On success the device's new counter is written back to the registry.
pub async fn verify(
    req: HttpRequest,
    query: web::Query<UserQuery>,
    body: String,
    state: web::Data<U2fState>,
    settings: web::Data<ServerSettings>,
) -> HttpResponse {
    let app_id = request_app_id(&req, &settings);
    let username = &query.username;

    if !state.registry.contains_user(username) {
        return unknown_user_response(username);
    }
    let devices = state.registry.list(username);

    match state
        .service
        .finish_authentication(username, &app_id, &body, &devices)
    {
        Ok(authentication) => {
            if !state.registry.update_counter(
                username,
                &authentication.device.key_handle,
                authentication.counter,
            ) {
                let error = U2fError::Internal("device vanished before its counter was saved".into());
                LoggingHelper::log_operation_failed("Sign-in", username, &error);
                return error_to_response(&error);
            }
            LoggingHelper::log_authenticated(username, &authentication);
            HttpResponse::Ok().json(VerifyResponse {
                key_handle: authentication.device.key_handle_b64(),
                touch: authentication.user_presence,
                counter: authentication.counter,
            })
        }
        Err(e) => {
            LoggingHelper::log_operation_failed("Sign-in", username, &e);
            error_to_response(&e)
        }
    }
}
