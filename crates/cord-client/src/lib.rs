//! # cord-client
//!
//! Client side of Cord thread sync: the owned [`ThreadStore`], the
//! [`ThreadFeed`] that applies server-pushed events to it, local-first
//! [`Commands`], and the viewer's [`NotificationInbox`].

pub mod commands;
pub mod error;
pub mod events;
pub mod feed;
pub mod notifications;
pub mod state;

use tracing_subscriber::{fmt, EnvFilter};

pub use commands::{ClientCommand, Commands, NewThread, OptimisticMessage, OptimisticUndo};
pub use error::ClientError;
pub use events::StoreEvent;
pub use feed::{FeedConfig, FeedEvent, FeedOutcome, FeedStats, ThreadFeed};
pub use notifications::{InboxSummary, NotificationInbox};
pub use state::ThreadStore;

/// Install a `tracing` subscriber for applications embedding the client.
/// `RUST_LOG` overrides the default filter. Does nothing if a subscriber is
/// already set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("cord_client=debug,cord_store=info,warn"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
