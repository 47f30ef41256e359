//! HTTP request builders for testing handlers
//!
//! Builds requests for the demo routes the way a browser running u2f-api.js
//! would send them: a `Host` header, a `username` query parameter and the raw
//! U2F response JSON as the body.

use actix_web::http::Method;
use actix_web::{test, HttpRequest};

use super::constants::{TEST_HOST, TEST_USER};

/// Builder for creating HTTP requests for testing
pub struct RequestBuilder {
    method: Method,
    path: String,
    username: Option<String>,
    headers: Vec<(String, String)>,
    body: Option<String>,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestBuilder {
    /// Create a new GET request builder for `/` with the test host
    #[must_use]
    pub fn new() -> Self {
        Self {
            method: Method::GET,
            path: "/".to_string(),
            username: None,
            headers: vec![("Host".to_string(), TEST_HOST.to_string())],
            body: None,
        }
    }

    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    #[must_use]
    pub fn path(mut self, path: &str) -> Self {
        self.path = path.to_string();
        self
    }

    /// Set the `username` query parameter
    #[must_use]
    pub fn username(mut self, username: &str) -> Self {
        self.username = Some(username.to_string());
        self
    }

    /// Add a header, replacing any previous value with the same name
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Remove a header
    #[must_use]
    pub fn without_header(mut self, name: &str) -> Self {
        self.headers
            .retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
        self
    }

    /// Set the raw request body
    #[must_use]
    pub fn body(mut self, body: &str) -> Self {
        self.body = Some(body.to_string());
        self
    }

    fn uri(&self) -> String {
        match &self.username {
            Some(username) => format!("{}?username={username}", self.path),
            None => self.path.clone(),
        }
    }

    /// Build a `TestRequest` for `test::call_service`
    #[must_use]
    pub fn to_test_request(self) -> test::TestRequest {
        let mut req = test::TestRequest::default()
            .method(self.method.clone())
            .uri(&self.uri());

        for (name, value) in self.headers {
            req = req.insert_header((name, value));
        }

        if let Some(body) = self.body {
            req = req
                .insert_header(("Content-Type", "application/json"))
                .set_payload(body);
        }

        req
    }

    /// Build the final `HttpRequest`
    #[must_use]
    pub fn build(self) -> HttpRequest {
        self.to_test_request().to_http_request()
    }
}

/// Quick builders for the demo routes
impl RequestBuilder {
    /// `GET /enroll?username=...`
    #[must_use]
    pub fn enroll(username: &str) -> test::TestRequest {
        Self::new().path("/enroll").username(username).to_test_request()
    }

    /// `POST /bind?username=...` with the registration response
    #[must_use]
    pub fn bind(username: &str, response: &str) -> test::TestRequest {
        Self::new()
            .method(Method::POST)
            .path("/bind")
            .username(username)
            .body(response)
            .to_test_request()
    }

    /// `POST /sign?username=...`
    #[must_use]
    pub fn sign(username: &str) -> test::TestRequest {
        Self::new()
            .method(Method::POST)
            .path("/sign")
            .username(username)
            .to_test_request()
    }

    /// `POST /sign?username=...` with data for the token to sign
    #[must_use]
    pub fn sign_data(username: &str, data: &str) -> test::TestRequest {
        Self::new()
            .method(Method::POST)
            .path("/sign")
            .username(username)
            .body(data)
            .to_test_request()
    }

    /// `POST /verify?username=...` with the authentication response
    #[must_use]
    pub fn verify(username: &str, response: &str) -> test::TestRequest {
        Self::new()
            .method(Method::POST)
            .path("/verify")
            .username(username)
            .body(response)
            .to_test_request()
    }

    /// `GET /enroll` for the default user
    #[must_use]
    pub fn enroll_default() -> test::TestRequest {
        Self::enroll(TEST_USER)
    }
}
