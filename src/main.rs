mod automation;
mod config;
mod db;
mod db_storage;
mod effects;
mod errors;
mod follow_up;
mod handlers;
mod inventory;
mod journey;
mod matching;
mod messaging;
mod models;
mod preferences;
mod price_alerts;
mod scoring;
mod webhook_handler;
mod webhook_models;

use axum::{
    routing::{get, post},
    Router,
};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::automation::Automation;
use crate::config::Config;
use crate::db::Database;
use crate::messaging::WhatsAppClient;

/// Main entry point for the application.
///
/// Initializes logging, configuration, the database pool, the webhook dedup
/// cache, and the WhatsApp client, then starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_dealer_crm=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    // Initialize database connection pool
    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    // Dedup cache for webhook message ids (5 minute TTL, 10k max entries);
    // the platform redelivers events it considers unacknowledged
    let processed_messages_cache = Cache::builder()
        .time_to_live(Duration::from_secs(300))
        .max_capacity(10_000)
        .build();
    tracing::info!("Webhook message dedup cache initialized");

    // Initialize WhatsApp Cloud API client
    let whatsapp = match WhatsAppClient::new(&config) {
        Ok(client) => {
            tracing::info!(
                "WhatsApp client initialized: {}",
                config.whatsapp_api_base_url
            );
            client
        }
        Err(e) => {
            anyhow::bail!("Failed to initialize WhatsApp client: {}", e);
        }
    };

    // Automation orchestrator owns the stores and the messaging client
    let automation = Arc::new(Automation::new(
        db.pool.clone(),
        whatsapp.clone(),
        config.clone(),
    ));

    // Build application state
    let app_state = Arc::new(crate::handlers::AppState {
        db: db.pool.clone(),
        config: config.clone(),
        whatsapp,
        automation,
        processed_messages_cache,
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .unwrap(),
    );

    // Build protected routes with security layers
    let protected_routes = Router::new()
        // WhatsApp webhook (verification handshake + inbound events)
        .route(
            "/api/v1/webhooks/whatsapp",
            get(webhook_handler::verify_webhook).post(webhook_handler::receive_webhook),
        )
        // Periodic trigger boundary (hourly/daily automation)
        .route("/api/v1/automation/run", post(handlers::run_automation))
        // Operational endpoints
        .route("/api/v1/leads", get(handlers::list_leads))
        .route("/api/v1/leads/:id", get(handlers::get_lead))
        .route("/api/v1/vehicles/matches", get(handlers::vehicle_matches))
        .layer(
            ServiceBuilder::new()
                // Request size limit: 5MB max payload (prevents memory exhaustion)
                .layer(RequestBodyLimitLayer::new(5 * 1024 * 1024))
                // Rate limiting: 10 req/sec per IP, burst of 20
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Build final app with health check (bypasses rate limiting)
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
