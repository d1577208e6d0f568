use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use infra::clock::SystemClock;
use infra::db;
use infra::store::{BookingStore, MemoryStore, PgStore};

use api::app::build_router;
use api::config::AppConfig;
use api::gql::build_schema;
use api::services::spawn_sweeper_service;
use api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let store: Arc<dyn BookingStore> = match &config.database_url {
        Some(url) => {
            let pool = db::connect(url, config.max_db_connections).await?;
            db::migrate(&pool).await?;
            tracing::info!("Connected to Postgres");
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; running on the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let state = AppState::new(store, Arc::new(SystemClock), &config.auth);

    spawn_sweeper_service(
        state.clone(),
        config.sweep_interval,
        config.renewal_reminder_lead,
    );

    // Build GraphQL schema from the gql module
    let schema = build_schema(state.clone());
    let app = build_router(state, schema);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
