use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use cord_client::{InboxSummary, NotificationInbox, ThreadStore};
use cord_shared::constants::{HEADER_SIGNATURE, HEADER_TIMESTAMP};
use cord_shared::protocol::{ThreadFilter, ThreadSummary};
use cord_shared::webhook::{ValidateOptions, WebhookDelivery, WebhookEvent};

use crate::config::ServerConfig;
use crate::error::ServerError;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub webhooks: mpsc::Sender<WebhookEvent>,
    pub store: Arc<ThreadStore>,
    pub inbox: Arc<RwLock<NotificationInbox>>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/webhook", post(receive_webhook))
        .route("/threads", get(list_threads))
        .route("/notifications/summary", get(notification_summary))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookResponse {
    accepted: bool,
    #[serde(rename = "type")]
    event_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ThreadsResponse {
    version: u64,
    threads: Vec<ThreadSummary>,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Verify, decode and enqueue one delivery. Never waits on the mirror: the
/// sender expects an answer within a few seconds.
async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ServerError> {
    if state.config.project_secret.is_empty() {
        return Err(ServerError::NotConfigured);
    }

    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    let options = ValidateOptions {
        accept_age: state.config.webhook_accept_age,
    };

    let envelope = WebhookDelivery::receive(body.to_vec(), header(HEADER_TIMESTAMP), header(HEADER_SIGNATURE))
        .verify(&state.config.project_secret, &options)
        .map_err(|e| {
            warn!(error = %e, "Webhook delivery rejected");
            ServerError::from(e)
        })?
        .parse()
        .map_err(|e| {
            warn!(error = %e, "Webhook body rejected");
            ServerError::from(e)
        })?;

    let event_type = envelope.event.type_tag();
    if let WebhookEvent::UrlVerification(payload) = envelope.event {
        info!("Webhook URL verified");
        return Ok(Json(WebhookResponse {
            accepted: true,
            event_type,
            message: Some(payload.message),
        }));
    }

    state.webhooks.try_send(envelope.event).map_err(|e| match e {
        mpsc::error::TrySendError::Full(_) => {
            warn!(event = event_type, "Webhook queue full");
            ServerError::QueueFull
        }
        mpsc::error::TrySendError::Closed(_) => ServerError::QueueClosed,
    })?;

    info!(event = event_type, project_id = ?envelope.project_id, "Webhook accepted");
    Ok(Json(WebhookResponse {
        accepted: true,
        event_type,
        message: None,
    }))
}

async fn list_threads(State(state): State<AppState>) -> Json<ThreadsResponse> {
    let snapshot = state.store.snapshot();
    let threads = snapshot
        .threads_matching(state.store.viewer(), &ThreadFilter::default())
        .iter()
        .map(|thread| thread.summary())
        .collect();
    Json(ThreadsResponse {
        version: snapshot.version,
        threads,
    })
}

async fn notification_summary(State(state): State<AppState>) -> Json<InboxSummary> {
    Json(state.inbox.read().await.summary())
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
