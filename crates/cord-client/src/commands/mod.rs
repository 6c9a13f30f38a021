//! Local-first thread operations.
//!
//! Each operation applies its optimistic update to the [`ThreadStore`]
//! immediately and forwards a [`ClientCommand`] to the transport task, which
//! owns the connection to the Cord backend. Sub-modules group the
//! operations by domain.

pub mod messaging;
pub mod threads;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use cord_shared::constants::OPTIMISTIC_ID_PREFIX;
use cord_shared::protocol::ThreadFilter;
use cord_shared::types::{GroupId, Location, MessageId, ReactionId, ThreadId};
use cord_store::Message;

use crate::error::ClientError;
use crate::state::ThreadStore;

pub use messaging::{OptimisticMessage, OptimisticUndo};

/// Thread to create alongside the first message sent to an unknown external
/// thread ID.
#[derive(Debug, Clone, PartialEq)]
pub struct NewThread {
    pub name: String,
    pub location: Location,
    pub group_id: Option<GroupId>,
}

/// Commands sent *from* the client to the transport task.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    /// Load a thread the feed mentioned but the store does not hold.
    FetchThread { thread_id: ThreadId },
    SendMessage {
        external_thread_id: String,
        message: Message,
        create_thread: Option<NewThread>,
    },
    AddReaction {
        message_id: MessageId,
        unicode_reaction: String,
    },
    RemoveReaction {
        message_id: MessageId,
        reaction_id: ReactionId,
    },
    MarkThreadSeen { thread_id: ThreadId },
    MarkThreadsSeen { filter: ThreadFilter, seen: bool },
    SetResolved { thread_id: ThreadId, resolved: bool },
    SetSubscribed { thread_id: ThreadId, subscribed: bool },
}

/// Entry point for every local-first operation.
pub struct Commands {
    store: Arc<ThreadStore>,
    outbound: mpsc::Sender<ClientCommand>,
    optimistic_counter: AtomicU64,
}

impl Commands {
    pub fn new(store: Arc<ThreadStore>, outbound: mpsc::Sender<ClientCommand>) -> Self {
        Self {
            store,
            outbound,
            optimistic_counter: AtomicU64::new(1),
        }
    }

    pub fn store(&self) -> &Arc<ThreadStore> {
        &self.store
    }

    async fn send(&self, command: ClientCommand) -> Result<(), ClientError> {
        self.outbound
            .send(command)
            .await
            .map_err(|_| ClientError::ChannelClosed)
    }

    fn next_optimistic_id(&self) -> String {
        let n = self.optimistic_counter.fetch_add(1, Ordering::Relaxed);
        format!("{OPTIMISTIC_ID_PREFIX}{n}")
    }
}
