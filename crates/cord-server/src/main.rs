//! # cord-server
//!
//! Webhook receiver for a Cord project.
//!
//! This binary provides:
//! - **Webhook verification** of `X-Cord-Timestamp` / `X-Cord-Signature`
//!   against the project secret
//! - **A mirror thread store** kept up to date from `thread-message-added`
//!   deliveries through the client feed pipeline
//! - **A notification inbox** fed by `notification-created` deliveries
//! - **REST API** (axum) for health checks and read-only views of both

mod api;
mod config;
mod error;
mod receiver;

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cord_client::{FeedConfig, NotificationInbox, ThreadFeed, ThreadStore};
use cord_shared::types::Viewer;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::receiver::WebhookMirror;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,cord_server=debug")),
        )
        .init();

    info!("Starting Cord webhook receiver v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");
    if config.project_secret.is_empty() {
        warn!("CORD_PROJECT_SECRET is not set, every webhook will be refused");
    }

    // -----------------------------------------------------------------------
    // 3. Initialize the mirror store and inbox
    // -----------------------------------------------------------------------
    let viewer = Viewer::new(config.viewer_id.clone(), config.viewer_id.clone());
    let store = Arc::new(ThreadStore::new(viewer));
    let inbox = Arc::new(RwLock::new(NotificationInbox::new()));

    let (commands_tx, commands_rx) = mpsc::channel(config.feed_buffer);
    let feed_config = FeedConfig {
        buffer: config.feed_buffer,
        ..FeedConfig::default()
    };
    let feed = ThreadFeed::new(store.clone(), feed_config, commands_tx);

    let (webhooks_tx, webhooks_rx) = mpsc::channel(config.feed_buffer);
    let app_state = AppState {
        config: Arc::new(config.clone()),
        webhooks: webhooks_tx,
        store,
        inbox: inbox.clone(),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------
    tokio::spawn(receiver::drain_commands(commands_rx));
    tokio::spawn(WebhookMirror::new(feed, inbox).run(webhooks_rx));

    // -----------------------------------------------------------------------
    // 5. Run the HTTP server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
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
