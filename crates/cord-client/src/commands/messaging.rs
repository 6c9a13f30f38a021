use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use cord_shared::types::{externalize_id, MessageId, Metadata, ReactionId, ThreadId, UserRef};
use cord_store::{Action, MergeMessageOptions, Message, Reaction};

use super::{ClientCommand, Commands, NewThread};
use crate::error::ClientError;
use crate::state::ThreadStore;

/// A message the viewer is sending, before the server has seen it.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimisticMessage {
    /// Client-generated internal ID; the server keeps it.
    pub id: MessageId,
    pub external_id: Option<String>,
    pub content: serde_json::Value,
    pub url: Option<String>,
    pub metadata: Metadata,
    pub create_thread: Option<NewThread>,
}

impl OptimisticMessage {
    pub fn new(content: serde_json::Value) -> Self {
        Self {
            id: MessageId::new(Uuid::new_v4().to_string()),
            external_id: None,
            content,
            url: None,
            metadata: Metadata::new(),
            create_thread: None,
        }
    }

    pub fn creating_thread(mut self, thread: NewThread) -> Self {
        self.create_thread = Some(thread);
        self
    }
}

/// Reverts an optimistic message if the server rejects it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimisticUndo {
    /// Nothing was applied locally.
    Nothing,
    RemoveMessage {
        thread_id: ThreadId,
        message_id: MessageId,
    },
    RemoveThread {
        thread_id: ThreadId,
    },
}

impl OptimisticUndo {
    pub fn action(&self) -> Option<Action> {
        match self {
            OptimisticUndo::Nothing => None,
            OptimisticUndo::RemoveMessage {
                thread_id,
                message_id,
            } => Some(Action::RemoveMessage {
                thread_id: thread_id.clone(),
                message_id: message_id.clone(),
            }),
            OptimisticUndo::RemoveThread { thread_id } => Some(Action::RemoveThread {
                thread_id: thread_id.clone(),
            }),
        }
    }

    pub fn undo(self, store: &ThreadStore) {
        if let Some(action) = self.action() {
            debug!(action = action.tag(), "Reverting optimistic update");
            store.dispatch(action);
        }
    }
}

impl Commands {
    /// Show `draft` in the store right away and hand it to the transport.
    ///
    /// An external thread ID the store does not know is only created
    /// locally when `draft.create_thread` is set; otherwise the message is
    /// sent without a local echo. If the transport is gone the local change
    /// is reverted before the error is returned.
    pub async fn merge_optimistic_message(
        &self,
        external_thread_id: &str,
        draft: OptimisticMessage,
    ) -> Result<OptimisticUndo, ClientError> {
        let viewer = self.store.viewer();
        let state = self.store.snapshot();
        let existing = state
            .thread_by_external_id(external_thread_id)
            .map(|thread| thread.id.clone());

        let thread_id = match &existing {
            Some(id) => id.clone(),
            None => ThreadId::new(self.next_optimistic_id()),
        };
        let mut message = Message::new(
            draft.id.as_str(),
            thread_id.clone(),
            UserRef::new(viewer.user_id.as_str(), viewer.external_id.as_str()),
            Utc::now(),
        );
        message.external_id = draft
            .external_id
            .clone()
            .unwrap_or_else(|| externalize_id(draft.id.as_str()));
        message.content = draft.content;
        message.url = draft.url;
        message.metadata = draft.metadata;
        message.seen = true;

        let undo = match (existing, &draft.create_thread) {
            (Some(thread_id), _) => {
                self.store.dispatch(Action::MergeMessage {
                    thread_id: thread_id.clone(),
                    message: message.clone(),
                    options: MergeMessageOptions::new_message(true),
                });
                OptimisticUndo::RemoveMessage {
                    thread_id,
                    message_id: message.id.clone(),
                }
            }
            (None, Some(new_thread)) => {
                self.store.dispatch(Action::AddThread {
                    thread_id: thread_id.clone(),
                    external_id: external_thread_id.to_string(),
                    group_id: new_thread.group_id.clone(),
                    name: new_thread.name.clone(),
                    location: new_thread.location.clone(),
                    message: message.clone(),
                });
                OptimisticUndo::RemoveThread { thread_id }
            }
            (None, None) => {
                debug!(external_thread_id, "Thread not loaded, sending without local echo");
                OptimisticUndo::Nothing
            }
        };

        let sent = self
            .send(ClientCommand::SendMessage {
                external_thread_id: external_thread_id.to_string(),
                message,
                create_thread: draft.create_thread,
            })
            .await;
        if let Err(e) = sent {
            warn!(external_thread_id, error = %e, "Send failed, reverting optimistic message");
            undo.undo(&self.store);
            return Err(e);
        }
        Ok(undo)
    }

    pub async fn add_reaction(
        &self,
        thread_id: &ThreadId,
        message_id: &MessageId,
        unicode_reaction: &str,
    ) -> Result<(), ClientError> {
        let reaction = Reaction {
            id: ReactionId::new(Uuid::new_v4().to_string()),
            unicode_reaction: unicode_reaction.to_string(),
            user_id: self.store.viewer().user_id.clone(),
            timestamp: Utc::now(),
        };
        self.store.dispatch(Action::AddReaction {
            thread_id: thread_id.clone(),
            message_id: message_id.clone(),
            reaction,
        });
        info!(message_id = %message_id, emoji = unicode_reaction, "Reaction added");

        self.send(ClientCommand::AddReaction {
            message_id: message_id.clone(),
            unicode_reaction: unicode_reaction.to_string(),
        })
        .await
    }

    /// Remove the viewer's `unicode_reaction` from a message. Does nothing if
    /// the viewer has not reacted with it.
    pub async fn remove_reaction(
        &self,
        thread_id: &ThreadId,
        message_id: &MessageId,
        unicode_reaction: &str,
    ) -> Result<(), ClientError> {
        let state = self.store.snapshot();
        let message = state
            .message(thread_id, message_id)
            .ok_or_else(|| ClientError::MessageNotFound(message_id.to_string()))?;
        let viewer_id = &self.store.viewer().user_id;
        let Some(reaction) = message
            .reactions
            .iter()
            .find(|r| r.unicode_reaction == unicode_reaction && &r.user_id == viewer_id)
        else {
            return Ok(());
        };

        let reaction_id = reaction.id.clone();
        self.store.dispatch(Action::RemoveReaction {
            thread_id: thread_id.clone(),
            message_id: message_id.clone(),
            reaction_id: reaction_id.clone(),
        });
        info!(message_id = %message_id, emoji = unicode_reaction, "Reaction removed");

        self.send(ClientCommand::RemoveReaction {
            message_id: message_id.clone(),
            reaction_id,
        })
        .await
    }
}
