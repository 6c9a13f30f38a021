use cord_shared::protocol::ThreadFilter;
use cord_shared::types::{GroupId, Location, MessageId, ReactionId, ThreadId, UserRef, Viewer};

use crate::models::{
    Message, MessageUpdate, Participant, Reaction, ThreadProperties, ThreadSnapshot,
};

/// How a server snapshot is combined with a thread already in the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergeMode {
    /// Merge the snapshot's messages into the local list.
    #[default]
    Reconcile,
    /// Take the snapshot's messages as the whole list.
    Replace,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeMessageOptions {
    pub viewer_is_author: bool,
    /// Only a new message moves the counters; re-delivered or paginated
    /// history does not.
    pub is_new_message: bool,
}

impl MergeMessageOptions {
    pub fn new_message(viewer_is_author: bool) -> Self {
        Self {
            viewer_is_author,
            is_new_message: true,
        }
    }

    pub fn history() -> Self {
        Self::default()
    }
}

/// Every state transition the store knows about. [`crate::reduce`] handles
/// each variant in exactly one arm.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    AddThread {
        thread_id: ThreadId,
        external_id: String,
        group_id: Option<GroupId>,
        name: String,
        location: Location,
        message: Message,
    },
    SetThreads {
        threads: Vec<ThreadSnapshot>,
    },
    MergeThread {
        thread: ThreadSnapshot,
        mode: MergeMode,
    },
    RemoveThread {
        thread_id: ThreadId,
    },
    MergeMessage {
        thread_id: ThreadId,
        message: Message,
        options: MergeMessageOptions,
    },
    RemoveMessage {
        thread_id: ThreadId,
        message_id: MessageId,
    },
    SetMessages {
        thread_id: ThreadId,
        messages: Vec<Message>,
    },
    UpdateMessage {
        thread_id: ThreadId,
        message_id: MessageId,
        update: MessageUpdate,
    },
    AppendMessageContent {
        thread_id: ThreadId,
        message_id: MessageId,
        appended_content: String,
    },
    AddReaction {
        thread_id: ThreadId,
        message_id: MessageId,
        reaction: Reaction,
    },
    RemoveReaction {
        thread_id: ThreadId,
        message_id: MessageId,
        reaction_id: ReactionId,
    },
    SetProperties {
        thread_id: ThreadId,
        properties: ThreadProperties,
    },
    SetSubscribed {
        thread_id: ThreadId,
        subscribed: bool,
    },
    SetTypingUsers {
        thread_id: ThreadId,
        typing_users: Vec<UserRef>,
    },
    MergeParticipant {
        thread_id: ThreadId,
        participant: Participant,
    },
    /// Mark one thread (by external ID) or every thread matching `filter`.
    MarkThreadsSeen {
        viewer: Viewer,
        external_thread_id: Option<String>,
        filter: ThreadFilter,
        seen: bool,
    },
    SetThreadIds {
        thread_ids: Vec<ThreadId>,
    },
    SetOlderMessagesCount {
        thread_id: ThreadId,
        older_messages_count: u32,
    },
    AddFirstMessageOfLoad {
        thread_id: ThreadId,
        message_id: MessageId,
    },
    AddExternalIdMapping {
        external_thread_id: String,
        thread_id: ThreadId,
    },
    SetDraftMessageInComposer {
        draft: bool,
    },
}

impl Action {
    /// Stable name for logs and change notifications.
    pub fn tag(&self) -> &'static str {
        match self {
            Action::AddThread { .. } => "add-thread",
            Action::SetThreads { .. } => "set-threads",
            Action::MergeThread { .. } => "merge-thread",
            Action::RemoveThread { .. } => "remove-thread",
            Action::MergeMessage { .. } => "merge-message",
            Action::RemoveMessage { .. } => "remove-message",
            Action::SetMessages { .. } => "set-messages",
            Action::UpdateMessage { .. } => "update-message",
            Action::AppendMessageContent { .. } => "append-message-content",
            Action::AddReaction { .. } => "add-reaction",
            Action::RemoveReaction { .. } => "remove-reaction",
            Action::SetProperties { .. } => "set-properties",
            Action::SetSubscribed { .. } => "set-subscribed",
            Action::SetTypingUsers { .. } => "set-typing-users",
            Action::MergeParticipant { .. } => "merge-participant",
            Action::MarkThreadsSeen { .. } => "mark-threads-seen",
            Action::SetThreadIds { .. } => "set-thread-ids",
            Action::SetOlderMessagesCount { .. } => "set-older-messages-count",
            Action::AddFirstMessageOfLoad { .. } => "add-first-message-of-load",
            Action::AddExternalIdMapping { .. } => "add-external-id-mapping",
            Action::SetDraftMessageInComposer { .. } => "set-draft-message-in-composer",
        }
    }

    /// The single thread this action targets, if it targets one.
    pub fn thread_id(&self) -> Option<&ThreadId> {
        match self {
            Action::AddThread { thread_id, .. }
            | Action::RemoveThread { thread_id }
            | Action::MergeMessage { thread_id, .. }
            | Action::RemoveMessage { thread_id, .. }
            | Action::SetMessages { thread_id, .. }
            | Action::UpdateMessage { thread_id, .. }
            | Action::AppendMessageContent { thread_id, .. }
            | Action::AddReaction { thread_id, .. }
            | Action::RemoveReaction { thread_id, .. }
            | Action::SetProperties { thread_id, .. }
            | Action::SetSubscribed { thread_id, .. }
            | Action::SetTypingUsers { thread_id, .. }
            | Action::MergeParticipant { thread_id, .. }
            | Action::SetOlderMessagesCount { thread_id, .. }
            | Action::AddFirstMessageOfLoad { thread_id, .. }
            | Action::AddExternalIdMapping { thread_id, .. } => Some(thread_id),
            Action::MergeThread { thread, .. } => Some(&thread.id),
            Action::SetThreads { .. }
            | Action::MarkThreadsSeen { .. }
            | Action::SetThreadIds { .. }
            | Action::SetDraftMessageInComposer { .. } => None,
        }
    }
}
