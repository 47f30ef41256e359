#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use u2frs::{configure_services, settings::ServerSettings, utils::LoggingHelper, U2fState};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Settings first: the log level may come from Settings.toml or .env
    let settings = ServerSettings::load()
        .map_err(|e| std::io::Error::other(format!("Failed to load settings: {e:#}")))?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(settings.logging.level.as_str()),
    )
    .init();

    let state = U2fState::with_logging(&settings)
        .map_err(|e| std::io::Error::other(format!("Failed to initialize U2F: {e}")))?;

    start_server(state, settings).await
}

/// Start the HTTP server
///
/// # Errors
///
/// Returns an error if:
/// - Server binding fails
/// - Server fails to start
async fn start_server(state: U2fState, settings: ServerSettings) -> std::io::Result<()> {
    let bind_address = settings.get_bind_address();
    LoggingHelper::log_startup(&settings);
    print_startup_info(&bind_address);

    let state = web::Data::new(state);
    let cors_origins = settings.get_cors_origins();

    HttpServer::new(move || {
        let cors_origins = cors_origins.clone();
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _| {
                cors_origins
                    .iter()
                    .any(|allowed| allowed == origin.to_str().unwrap_or(""))
            })
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec!["Content-Type", "Accept"])
            .max_age(3600);

        App::new()
            .app_data(state.clone())
            .app_data(web::Data::new(settings.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .configure(configure_services)
    })
    .bind(&bind_address)?
    .run()
    .await
}

fn print_startup_info(bind_address: &str) {
    println!("Starting u2frs U2F server on http://{bind_address}");
    println!();
    println!("U2F endpoints (all take ?username=, default \"user\"):");
    println!("  GET  /enroll - Start device enrollment");
    println!("  POST /bind   - Complete enrollment with the u2f.register response");
    println!("  POST /sign   - Start authentication");
    println!("  POST /verify - Complete authentication with the u2f.sign response");
    println!();
    println!("System endpoints:");
    println!("  GET  /ping   - Health check");
}
