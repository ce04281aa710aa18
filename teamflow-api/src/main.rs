//! # TeamFlow API Server
//!
//! REST API for team, project, and task management with an activity audit
//! log and realtime event fan-out over WebSocket.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p teamflow-api
//! ```

use std::sync::Arc;
use std::time::Duration;

use teamflow_api::app::{build_router, AppState};
use teamflow_api::config::Config;
use teamflow_api::mailer::TracingMailer;
use teamflow_api::realtime::RealtimeHub;
use teamflow_shared::db;
use teamflow_shared::models::activity::Activity;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "teamflow_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "TeamFlow API Server v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config::from_env()?;

    let pool = db::create_pool(db::DatabaseConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        ..Default::default()
    })
    .await?;
    db::run_migrations(&pool).await?;

    // Hourly retention purge; Postgres has no TTL index.
    let purge_pool = pool.clone();
    let retention_days = config.activity_retention_days;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            match Activity::purge_older_than(&purge_pool, retention_days).await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "Purged expired activity records"),
                Err(err) => tracing::error!("Activity purge failed: {}", err),
            }
        }
    });

    let addr = format!("{}:{}", config.api.host, config.api.port);
    let state = AppState::new(pool, config, RealtimeHub::new(), Arc::new(TracingMailer));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
