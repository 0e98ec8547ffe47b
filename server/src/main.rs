//! Tidemark Server - multi-tenant server of record for offline-first sync.
//!
//! This server accepts pushed mutation batches from devices, appends them
//! idempotently to per-tenant change logs, and fans changes back out through
//! checkpointed, visibility-filtered pulls.

mod auth;
mod config;
mod db;
mod error;
mod handlers;
mod locks;
mod routes;

use crate::config::Config;
use crate::db::Pool;
use crate::locks::TenantLocks;
use axum::Router;
use std::sync::Arc;
use tidemark_engine::scope::{ScopePolicy, Visibility};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub config: Arc<Config>,
    pub policy: Arc<ScopePolicy>,
    pub tenant_locks: Arc<TenantLocks>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tidemark_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Tidemark server on {}:{}", config.host, config.port);

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;

    // Run migrations
    tracing::info!("Running database migrations...");
    db::run_migrations(&pool).await?;

    // Build application state
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        policy: Arc::new(default_scope_policy()),
        tenant_locks: Arc::new(TenantLocks::new()),
    };

    // Build router
    let app = Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// The scope layout served by this deployment.
/// In a real installation this would be loaded from per-tenant configuration.
fn default_scope_policy() -> ScopePolicy {
    ScopePolicy::default()
        .with_scope("shared", Visibility::Shared, ["notes", "tasks"])
        .with_scope("personal", Visibility::OwnerOnly, ["profiles", "activity"])
}
