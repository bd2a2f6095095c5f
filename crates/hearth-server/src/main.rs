//! # hearth-server
//!
//! HTTP backend for the Hearth messenger.
//!
//! This binary provides three independent, stateless handlers:
//! - **`/auth`** upserts a user after third-party sign-in
//! - **`/chats`** lists, creates and "deletes" (timestamp-touches) chats
//! - **`/upload-avatar`** stores a base64 image in the object bucket and
//!   returns its CDN URL
//!
//! Handlers share nothing in memory: each request opens its own database
//! connection and all durable state lives in SQLite and the object store.

mod api;
mod config;
mod error;
mod extract;
mod handlers;
mod object_store;

use std::sync::Arc;

use hearth_store::Database;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::object_store::ObjectStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("info,hearth_server=debug,hearth_store=info")
            }),
        )
        .init();

    info!("Starting Hearth server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Prepare storage
    // -----------------------------------------------------------------------

    // Schema migrations run once here; request handlers only connect.
    let db_path = config.database_path.clone();
    tokio::task::spawn_blocking(move || Database::open_at(&db_path).map(drop)).await??;

    let objects = Arc::new(ObjectStore::from_config(&config).await?);

    let http_addr = config.http_addr;
    let app_state = AppState {
        config: Arc::new(config),
        objects,
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
