use anyhow::Context;
use autoreach::bootstrap;
use autoreach::config::Config;
use autoreach::infrastructure::http::router::build_router;
use autoreach::infrastructure::observability;
use autoreach::infrastructure::persistence::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let _guard = observability::init(&config)
        .map_err(|e| anyhow::anyhow!("Failed to initialize observability: {}", e))?;
    tracing::info!("Configuration loaded");

    let db = Database::connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection established");

    db.run_migrations()
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Database migrations applied");

    // Build application state (and start background services)
    let state = bootstrap::build_app_state(db, &config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to build application state: {}", e))?;

    let app = build_router(state);

    let addr = config.server_address();
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
