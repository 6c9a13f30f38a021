use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use cord_shared::protocol::ThreadFilter;
use cord_shared::types::ThreadId;
use cord_store::{Action, MergeMessageOptions, Message, ThreadProperties, ThreadsState};

use super::{ClientCommand, Commands};
use crate::error::ClientError;

impl Commands {
    /// Mark one thread as seen by the viewer.
    pub async fn mark_thread_seen(&self, thread_id: &ThreadId) -> Result<(), ClientError> {
        let state = self.store.snapshot();
        match state.thread(thread_id) {
            Some(thread) => {
                self.store.dispatch(Action::MarkThreadsSeen {
                    viewer: self.store.viewer().clone(),
                    external_thread_id: Some(thread.external_id.clone()),
                    filter: ThreadFilter::default(),
                    seen: true,
                });
            }
            None => debug!(thread_id = %thread_id, "Marking unloaded thread seen"),
        }

        self.send(ClientCommand::MarkThreadSeen {
            thread_id: thread_id.clone(),
        })
        .await
    }

    /// Mark every loaded thread matching `filter`, then ask the server to do
    /// the same for threads the client has not loaded.
    pub async fn mark_threads_seen(&self, filter: ThreadFilter, seen: bool) -> Result<(), ClientError> {
        self.mark_threads_seen_locally(None, filter.clone(), seen);
        self.send(ClientCommand::MarkThreadsSeen { filter, seen }).await
    }

    /// Local-only variant used when the server already knows, e.g. when the
    /// change arrived from another tab.
    pub fn mark_threads_seen_locally(
        &self,
        external_thread_id: Option<String>,
        filter: ThreadFilter,
        seen: bool,
    ) -> Arc<ThreadsState> {
        self.store.dispatch(Action::MarkThreadsSeen {
            viewer: self.store.viewer().clone(),
            external_thread_id,
            filter,
            seen,
        })
    }

    pub async fn set_resolved(
        &self,
        thread_id: &ThreadId,
        resolved: bool,
        update_server: bool,
    ) -> Result<(), ClientError> {
        self.store.dispatch(Action::SetProperties {
            thread_id: thread_id.clone(),
            properties: ThreadProperties {
                resolved: Some(resolved),
                resolved_timestamp: Some(resolved.then(Utc::now)),
                ..Default::default()
            },
        });
        info!(thread_id = %thread_id, resolved, "Thread resolution changed");

        if !update_server {
            return Ok(());
        }
        self.send(ClientCommand::SetResolved {
            thread_id: thread_id.clone(),
            resolved,
        })
        .await
    }

    pub async fn set_subscribed(&self, thread_id: &ThreadId, subscribed: bool) -> Result<(), ClientError> {
        self.store.dispatch(Action::SetSubscribed {
            thread_id: thread_id.clone(),
            subscribed,
        });
        self.send(ClientCommand::SetSubscribed {
            thread_id: thread_id.clone(),
            subscribed,
        })
        .await
    }

    /// Rename a thread locally. The name reaches the server with the next
    /// message sent to it.
    pub fn set_name(&self, thread_id: &ThreadId, name: impl Into<String>) -> Arc<ThreadsState> {
        self.store.dispatch(Action::SetProperties {
            thread_id: thread_id.clone(),
            properties: ThreadProperties {
                name: Some(name.into()),
                ..Default::default()
            },
        })
    }

    /// Apply one page of history fetched from the server.
    ///
    /// `older_messages_count` is the server's count of messages older than
    /// the page, including the thread's root, which the client always holds.
    pub fn apply_loaded_messages(
        &self,
        thread_id: &ThreadId,
        messages: Vec<Message>,
        older_messages_count: u32,
    ) -> Result<Arc<ThreadsState>, ClientError> {
        if self.store.snapshot().thread(thread_id).is_none() {
            return Err(ClientError::ThreadNotFound(thread_id.to_string()));
        }

        let mut actions = Vec::with_capacity(messages.len() + 2);
        if let Some(first) = messages.first() {
            actions.push(Action::AddFirstMessageOfLoad {
                thread_id: thread_id.clone(),
                message_id: first.id.clone(),
            });
        }
        let loaded = messages.len();
        actions.extend(messages.into_iter().map(|message| Action::MergeMessage {
            thread_id: thread_id.clone(),
            message,
            options: MergeMessageOptions::history(),
        }));
        actions.push(Action::SetOlderMessagesCount {
            thread_id: thread_id.clone(),
            older_messages_count: older_messages_count.saturating_sub(1),
        });

        debug!(thread_id = %thread_id, loaded, older_messages_count, "Applying loaded messages");
        Ok(self.store.dispatch_all(actions))
    }

    /// Put the most recently active threads first. Returns the new order; the
    /// store is only touched when the order changes.
    pub fn reorder_threads(&self) -> Vec<ThreadId> {
        let state = self.store.snapshot();
        let ordered = state.ordered_by_latest_activity();
        if !ordered.iter().eq(state.thread_ids.iter()) {
            self.store.dispatch(Action::SetThreadIds {
                thread_ids: ordered.clone(),
            });
        }
        ordered
    }
}
