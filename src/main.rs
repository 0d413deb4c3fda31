use tracing_subscriber::EnvFilter;

use whiteboard::app::{AppState, build_router};
use whiteboard::core::auth::{JwtConfig, JwtService};
use whiteboard::core::config::Config;
use whiteboard::core::db::{DbConfig, create_pool_with_migrations};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file (if exists)
    let _ = dotenvy::dotenv();

    // RUST_LOG overrides the default filter
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load application config from environment variables
    let config = Config::from_env();

    // Log config status (without revealing secrets)
    tracing::info!(
        "Config loaded: database_from_env={}, jwt_secret={}, idle_timeout={}",
        config.has_database(),
        config.has_jwt_secret(),
        config.has_idle_timeout()
    );

    let pool = create_pool_with_migrations(&DbConfig::new(&config.database_url)).await?;
    tracing::info!("Database ready");

    let jwt_service = JwtService::new(JwtConfig::from_env_or_dev()?);

    let app = build_router(AppState::new(pool, jwt_service, &config));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    tracing::info!("Live sessions: ws://{}/ws/{{session_key}}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
