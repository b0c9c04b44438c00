use event_bus::topology::rating_delivery_events;
use event_bus::{Domain, EventPublisher, MessagingClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use rating_rs::{
    config::Config, db, events::DeliveryCompletedHandler, repo::PgRatingRepo, router, AppState,
};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Starting rating service...");

    let config = Config::from_env().expect("Failed to load configuration from environment");

    tracing::info!(
        host = %config.host,
        port = config.port,
        bus_type = ?config.bus.bus_type,
        "Configuration loaded"
    );

    tracing::info!("Connecting to database...");
    let pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to initialize database");
    let repo = Arc::new(PgRatingRepo::new(pool));

    let client = MessagingClient::new(
        Domain::Rating,
        config.bus.connector(),
        config.bus.reconnect_delay,
    );
    client
        .subscribe(rating_delivery_events(), Arc::new(DeliveryCompletedHandler))
        .await
        .expect("Failed to register delivery subscription");
    client.open();
    let publisher = EventPublisher::new(client.clone());

    let app = router(AppState { repo, publisher }).layer(
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
    );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Invalid HOST/PORT");
    tracing::info!("Rating service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .expect("Server failed to start");

    client.close().await;
}
