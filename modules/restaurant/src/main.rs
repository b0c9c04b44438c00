use event_bus::topology::restaurant_rating_events;
use event_bus::{Domain, EventPublisher, MessagingClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use restaurant_rs::{
    config::Config, db, events::RatingAverageHandler, repo::PgRestaurantRepo, router, AppState,
};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    // Initialize tracing/logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Starting restaurant service...");

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
    let repo = Arc::new(PgRestaurantRepo::new(pool));

    // Broker connection is supervised in the background; HTTP starts regardless
    let client = MessagingClient::new(
        Domain::Restaurant,
        config.bus.connector(),
        config.bus.reconnect_delay,
    );
    let publisher = EventPublisher::new(client.clone());

    client
        .subscribe(
            restaurant_rating_events(),
            Arc::new(RatingAverageHandler::new(repo.clone(), publisher.clone())),
        )
        .await
        .expect("Failed to register rating subscription");
    client.open();

    let app = router(AppState { repo, publisher }).layer(
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
    );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Invalid HOST/PORT");
    tracing::info!("Restaurant service listening on {}", addr);

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
