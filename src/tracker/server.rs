use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;

use super::api::{self, AppState};
use super::db::SqliteStore;
use super::models::User;
use super::store::{MemoryStore, RecordStore, StoreHandle};

/// Configuration for the tracker server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub in_memory: bool,
    pub dev_mode: bool,
    pub undo_capacity: usize,
    pub users: Vec<User>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3150,
            db_path: PathBuf::from(".jobtrack/jobtrack.db"),
            in_memory: false,
            dev_mode: false,
            undo_capacity: 100,
            users: Vec::new(),
        }
    }
}

/// Build the full application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    api::api_router().with_state(state)
}

/// Open the configured store and seed the configured users into it.
pub fn open_store(config: &ServerConfig) -> Result<StoreHandle> {
    let mut store: Box<dyn RecordStore> = if config.in_memory {
        Box::new(MemoryStore::new())
    } else {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }
        Box::new(
            SqliteStore::new(&config.db_path).context("Failed to initialize tracker database")?,
        )
    };
    for user in &config.users {
        store
            .add_user(user)
            .with_context(|| format!("Failed to seed user {}", user.id))?;
    }
    Ok(StoreHandle::from_boxed(store))
}

/// Start the tracker server.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let store = open_store(&config)?;
    let state = Arc::new(AppState::new(store, config.undo_capacity));

    let mut app = build_router(state);
    if config.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(
        addr = %local_addr,
        in_memory = config.in_memory,
        db = %config.db_path.display(),
        "job tracker listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
