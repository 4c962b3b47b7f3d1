//! `paygate-server` binary entry point, grounded on
//! `tempo-x402-facilitator::main`: load env, build CORS/rate-limit
//! middleware, bootstrap the shared state, serve.

use actix_cors::Cors;
use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{web, App, HttpServer};

use paygate_server::{config::ServerConfig, routes, state};

fn build_cors(origins: &[String]) -> Cors {
    if origins.is_empty() {
        Cors::default()
            .allowed_origin_fn(|origin, _| {
                origin
                    .to_str()
                    .map(|o| o == "http://localhost" || o.starts_with("http://localhost:"))
                    .unwrap_or(false)
            })
            .allow_any_method()
            .allow_any_header()
            .max_age(3600)
    } else {
        let mut cors = Cors::default();
        for origin in origins {
            cors = cors.allowed_origin(origin);
        }
        cors.allow_any_method().allow_any_header().max_age(3600)
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = ServerConfig::from_env();

    if config.metrics_token.is_none() {
        tracing::warn!("METRICS_TOKEN not set — /metrics will return 403 until it is configured");
    }

    let port = config.port;
    let rate_limit_rpm = config.rate_limit_rpm;
    let cors_origins = config.allowed_origins.clone();

    let app_state = web::Data::new(state::bootstrap(&config));

    tracing::info!("paygate-server listening on http://0.0.0.0:{port}");
    tracing::info!("  GET  /health");
    tracing::info!("  GET  /supported");
    tracing::info!("  GET  /metrics");
    tracing::info!("  POST /auth/verify");
    tracing::info!("  POST /payments/init");
    tracing::info!("  POST /payments/{{id}}/transition");

    let governor_conf = GovernorConfigBuilder::default()
        .requests_per_minute(rate_limit_rpm)
        .finish()
        .expect("failed to build rate limiter config");

    HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&cors_origins))
            .wrap(Governor::new(&governor_conf))
            .app_data(app_state.clone())
            .app_data(web::JsonConfig::default().limit(65_536))
            .service(routes::health)
            .service(routes::supported)
            .service(routes::metrics_endpoint)
            .service(routes::auth_verify)
            .service(routes::init_payment)
            .service(routes::transition_payment)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
