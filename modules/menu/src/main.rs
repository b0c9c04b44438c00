use event_bus::{Domain, EventPublisher, MessagingClient};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use menu_rs::{config::Config, db, repo::PgMenuRepo, router, AppState};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Starting menu service...");

    let config = Config::from_env().expect("Failed to load configuration from environment");

    tracing::info!(
        host = %config.host,
        port = config.port,
        bus_type = ?config.bus.bus_type,
        "Configuration loaded"
    );

    let pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to initialize database");
    let repo = Arc::new(PgMenuRepo::new(pool));

    // Publish-only: the menu service reacts to nothing
    let client = MessagingClient::new(Domain::Menu, config.bus.connector(), config.bus.reconnect_delay);
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
    tracing::info!("Menu service listening on {}", addr);

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
