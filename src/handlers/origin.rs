//! Relying party identity derivation
//!
//! The app id must equal, byte for byte, the `origin` the browser writes into
//! the client data. Browsers omit the port when it is the scheme's default,
//! so the derived origin does too.

use actix_web::http::header;
use actix_web::HttpRequest;

use crate::settings::ServerSettings;

/// Default port for a scheme, if it has one
fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "https" => Some(443),
        "http" => Some(80),
        _ => None,
    }
}

/// Build `scheme://host[:port]`
///
/// The `Host` header is used verbatim when present, since it already holds
/// whatever port the browser addressed. Without it the server name is used
/// and the port appended unless it is the default for `scheme`.
#[must_use]
pub fn derive_origin(
    scheme: &str,
    host_header: Option<&str>,
    server_name: &str,
    server_port: u16,
) -> String {
    let host = match host_header.map(str::trim).filter(|h| !h.is_empty()) {
        Some(host) => host.to_string(),
        None if default_port(scheme) == Some(server_port) => server_name.to_string(),
        None => format!("{server_name}:{server_port}"),
    };
    format!("{scheme}://{host}")
}

/// Origin of an inbound request
///
/// The scheme comes from actix's connection info, which honours `Forwarded`
/// and `X-Forwarded-Proto` from a terminating proxy.
#[must_use]
pub fn request_origin(req: &HttpRequest, settings: &ServerSettings) -> String {
    let connection = req.connection_info();
    let host_header = req
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| req.uri().authority().map(actix_web::http::uri::Authority::as_str));

    derive_origin(
        connection.scheme(),
        host_header,
        &settings.application.host,
        settings.application.port,
    )
}

/// App id for a request: the configured one, otherwise the request origin
#[must_use]
pub fn request_app_id(req: &HttpRequest, settings: &ServerSettings) -> String {
    settings
        .u2f
        .app_id
        .clone()
        .unwrap_or_else(|| request_origin(req, settings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RequestBuilder;

    #[test]
    fn test_host_header_is_used_verbatim() {
        assert_eq!(
            derive_origin("https", Some("example.com"), "ignored", 9999),
            "https://example.com"
        );
        assert_eq!(
            derive_origin("http", Some("localhost:8081"), "ignored", 80),
            "http://localhost:8081"
        );
    }

    #[test]
    fn test_default_ports_are_omitted() {
        assert_eq!(derive_origin("https", None, "example.com", 443), "https://example.com");
        assert_eq!(derive_origin("http", None, "example.com", 80), "http://example.com");
    }

    #[test]
    fn test_non_default_ports_are_kept() {
        assert_eq!(
            derive_origin("https", None, "example.com", 8443),
            "https://example.com:8443"
        );
        assert_eq!(derive_origin("http", None, "localhost", 8081), "http://localhost:8081");
        // 443 is not the default for plain http
        assert_eq!(derive_origin("http", None, "example.com", 443), "http://example.com:443");
        assert_eq!(derive_origin("https", None, "example.com", 80), "https://example.com:80");
    }

    #[test]
    fn test_empty_host_header_falls_back_to_server_name() {
        assert_eq!(derive_origin("http", Some(""), "localhost", 8081), "http://localhost:8081");
    }

    #[test]
    fn test_request_origin_from_host_header() {
        let req = RequestBuilder::new().header("Host", "login.example.com:8443").build();
        assert_eq!(
            request_origin(&req, &ServerSettings::default()),
            "http://login.example.com:8443"
        );
    }

    #[test]
    fn test_request_origin_without_host_uses_settings() {
        let req = RequestBuilder::new().without_header("Host").build();
        assert_eq!(
            request_origin(&req, &ServerSettings::default()),
            "http://localhost:8081"
        );
    }

    #[test]
    fn test_request_origin_behind_tls_proxy() {
        let req = RequestBuilder::new()
            .header("Host", "example.com")
            .header("X-Forwarded-Proto", "https")
            .build();
        assert_eq!(
            request_origin(&req, &ServerSettings::default()),
            "https://example.com"
        );
    }

    #[test]
    fn test_configured_app_id_wins() {
        let mut settings = ServerSettings::default();
        settings.u2f.app_id = Some("https://u2f.example.com".to_string());
        let req = RequestBuilder::new().build();
        assert_eq!(request_app_id(&req, &settings), "https://u2f.example.com");

        settings.u2f.app_id = None;
        assert_eq!(request_app_id(&req, &settings), "http://example.com");
    }
}
