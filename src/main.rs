mod auth;
mod config;
mod error;
mod middleware;
mod schema;
mod services;
mod state;
mod tls;
mod utils;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpResponse, HttpServer};
use diesel::r2d2::{self, ConnectionManager};
use diesel::PgConnection;
use dotenv::dotenv;
use rustls::crypto::{ring::default_provider, CryptoProvider};
use rustls::ServerConfig;
use std::env;

use crate::{
    config::MonitorRules,
    middleware::rate_limit::IpLimiter,
    services::alerts::{webhook::WebhookDispatcher, AlertDispatcher, AuditLogDispatcher},
    services::events::db::PgEventStore,
    services::events::EventStore,
    services::monitor::SecurityMonitor,
    services::roster::db::PgRoster,
    services::{events, metrics, patterns},
    state::AppState,
    utils::logger,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    logger::init();

    CryptoProvider::install_default(default_provider()).expect("install rustls provider");

    let https_port: u16 = env::var("HTTPS_PORT")
        .unwrap_or_else(|_| "9443".into())
        .parse()
        .expect("HTTPS_PORT must be a number");

    // -------- pool Diesel -------------------------------------------------------
    let url = env::var("DATABASE_URL").unwrap_or_else(|_| {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            env::var("DB_USER").unwrap_or_else(|_| "postgres".into()),
            env::var("DB_PASS").unwrap_or_default(),
            env::var("DB_HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            env::var("DB_PORT").unwrap_or_else(|_| "5432".into()),
            env::var("DB_NAME").unwrap_or_else(|_| "cad_ai_platform".into()),
        )
    });
    let pool = r2d2::Pool::builder()
        .build(ConnectionManager::<PgConnection>::new(url))
        .expect("DB pool");

    // -------- engine wiring -----------------------------------------------------
    let store: Arc<dyn EventStore> = Arc::new(PgEventStore::new(pool.clone()));
    let roster = Arc::new(PgRoster::new(pool.clone()));
    let dispatcher: Arc<dyn AlertDispatcher> = match env::var("ALERT_WEBHOOK_URL") {
        Ok(url) => Arc::new(WebhookDispatcher::new(url)),
        Err(_) => Arc::new(AuditLogDispatcher::new(store.clone())),
    };
    let monitor = Arc::new(SecurityMonitor::new(
        store,
        MonitorRules::default(),
        dispatcher,
        roster,
    ));
    let state = AppState { monitor };

    // -------- TLS config --------------------------------------------------------
    let tls_cfg: ServerConfig = tls::rustls_config().expect("TLS config");

    fn build_cors() -> Cors {
        Cors::default()
            .allowed_origin("http://localhost:3000")
            .allowed_origin("http://localhost:5173")
            .allow_any_method()
            .allow_any_header()
            .supports_credentials()
            .max_age(3600)
    }

    // -------- app factory -------------------------------------------------------
    let limiter = IpLimiter::default();
    let make_app = {
        let state = state.clone();
        move || {
            App::new()
                .app_data(web::Data::new(state.clone()))
                .wrap(limiter.clone())
                .wrap(build_cors())
                .wrap(Logger::default())
                .route("/health", web::get().to(HttpResponse::Ok))
                .configure(events::handler::ingest)
                .configure(events::handler::dashboard)
                .configure(events::handler::ops)
                .configure(metrics::handler::config)
                .configure(patterns::handler::config)
        }
    };

    // -------- HTTPS -------------------------------------------------------------
    HttpServer::new(make_app)
        .bind_rustls_0_23(("0.0.0.0", https_port), tls_cfg)?
        .run()
        .await
}
