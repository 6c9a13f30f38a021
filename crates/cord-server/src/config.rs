//! Server configuration loaded from environment variables.
//!
//! Every setting has a default so the receiver starts with zero
//! configuration for local development. Invalid values are logged and the
//! default is kept.

use std::net::SocketAddr;
use std::time::Duration;

use cord_shared::constants::DEFAULT_WEBHOOK_ACCEPT_AGE_SECS;

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Project secret webhook deliveries are signed with.
    /// Env: `CORD_PROJECT_SECRET`
    /// Default: empty (every delivery is refused).
    pub project_secret: String,

    /// Maximum clock distance accepted on a delivery timestamp.
    /// Env: `WEBHOOK_ACCEPT_AGE_SECS`
    /// Default: `300`
    pub webhook_accept_age: Duration,

    /// Capacity of the queue between the webhook handler and the mirror.
    /// Env: `FEED_BUFFER`
    /// Default: `256`
    pub feed_buffer: usize,

    /// External user ID the mirror store is kept for.
    /// Env: `VIEWER_ID`
    /// Default: `webhook-receiver`
    pub viewer_id: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            project_secret: String::new(),
            webhook_accept_age: Duration::from_secs(DEFAULT_WEBHOOK_ACCEPT_AGE_SECS),
            feed_buffer: 256,
            viewer_id: "webhook-receiver".to_string(),
        }
    }
}

// The secret never reaches the logs.
impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("project_secret_set", &!self.project_secret.is_empty())
            .field("webhook_accept_age", &self.webhook_accept_age)
            .field("feed_buffer", &self.feed_buffer)
            .field("viewer_id", &self.viewer_id)
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default"),
            }
        }

        if let Some(secret) = lookup("CORD_PROJECT_SECRET") {
            config.project_secret = secret;
        }

        if let Some(val) = lookup("WEBHOOK_ACCEPT_AGE_SECS") {
            match val.parse::<u64>() {
                Ok(secs) => config.webhook_accept_age = Duration::from_secs(secs),
                Err(_) => tracing::warn!(
                    value = %val,
                    "Invalid WEBHOOK_ACCEPT_AGE_SECS, using default"
                ),
            }
        }

        if let Some(val) = lookup("FEED_BUFFER") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.feed_buffer = n,
                _ => tracing::warn!(value = %val, "Invalid FEED_BUFFER, using default"),
            }
        }

        if let Some(viewer) = lookup("VIEWER_ID") {
            if !viewer.is_empty() {
                config.viewer_id = viewer;
            }
        }

        config
    }
}
