//! Applies server-pushed events to the thread store.
//!
//! Each event goes through the same pipeline:
//!
//! 1. **Pre-filter.** Decide relevance against the live filter, using the
//!    thread summary the event carries, else the thread already loaded. An
//!    event for a thread that is neither summarised nor loaded triggers a
//!    [`ClientCommand::FetchThread`] instead of being applied.
//! 2. **Apply.** Map the event to store actions and dispatch them as one step.
//! 3. **Confirm.** Re-run the filter against the merged thread and evict it
//!    from the store if it no longer matches.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use cord_shared::protocol::{ThreadFilter, ThreadSummary};
use cord_shared::types::{MessageId, ReactionId, ThreadId, UserRef, Viewer};
use cord_store::{
    thread_matches_filter, Action, MergeMessageOptions, MergeMode, Message, MessageUpdate,
    Participant, Reaction, Thread, ThreadProperties, ThreadSnapshot, ThreadsState,
};

use crate::commands::ClientCommand;
use crate::error::ClientError;
use crate::state::ThreadStore;

/// A change pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FeedEvent {
    ThreadAdded {
        thread: ThreadSnapshot,
    },
    ThreadMerged {
        thread: ThreadSnapshot,
    },
    #[serde(rename_all = "camelCase")]
    ThreadRemoved {
        #[serde(rename = "threadID")]
        thread_id: ThreadId,
        #[serde(default)]
        summary: Option<ThreadSummary>,
    },
    #[serde(rename_all = "camelCase")]
    MessageMerged {
        #[serde(rename = "threadID")]
        thread_id: ThreadId,
        message: Message,
        #[serde(default)]
        summary: Option<ThreadSummary>,
    },
    #[serde(rename_all = "camelCase")]
    MessageRemoved {
        #[serde(rename = "threadID")]
        thread_id: ThreadId,
        #[serde(rename = "messageID")]
        message_id: MessageId,
        #[serde(default)]
        summary: Option<ThreadSummary>,
    },
    #[serde(rename_all = "camelCase")]
    MessageUpdated {
        #[serde(rename = "threadID")]
        thread_id: ThreadId,
        #[serde(rename = "messageID")]
        message_id: MessageId,
        update: MessageUpdate,
        #[serde(default)]
        summary: Option<ThreadSummary>,
    },
    #[serde(rename_all = "camelCase")]
    ReactionAdded {
        #[serde(rename = "threadID")]
        thread_id: ThreadId,
        #[serde(rename = "messageID")]
        message_id: MessageId,
        reaction: Reaction,
        #[serde(default)]
        summary: Option<ThreadSummary>,
    },
    #[serde(rename_all = "camelCase")]
    ReactionRemoved {
        #[serde(rename = "threadID")]
        thread_id: ThreadId,
        #[serde(rename = "messageID")]
        message_id: MessageId,
        #[serde(rename = "reactionID")]
        reaction_id: ReactionId,
        #[serde(default)]
        summary: Option<ThreadSummary>,
    },
    #[serde(rename_all = "camelCase")]
    ThreadPropertiesUpdated {
        #[serde(rename = "threadID")]
        thread_id: ThreadId,
        properties: ThreadProperties,
        #[serde(default)]
        summary: Option<ThreadSummary>,
    },
    #[serde(rename_all = "camelCase")]
    SubscribedSet {
        #[serde(rename = "threadID")]
        thread_id: ThreadId,
        subscribed: bool,
        #[serde(default)]
        summary: Option<ThreadSummary>,
    },
    #[serde(rename_all = "camelCase")]
    TypingUsersUpdated {
        #[serde(rename = "threadID")]
        thread_id: ThreadId,
        typing_users: Vec<UserRef>,
        #[serde(default)]
        summary: Option<ThreadSummary>,
    },
    #[serde(rename_all = "camelCase")]
    ParticipantMerged {
        #[serde(rename = "threadID")]
        thread_id: ThreadId,
        participant: Participant,
        #[serde(default)]
        summary: Option<ThreadSummary>,
    },
    #[serde(rename_all = "camelCase")]
    ThreadIdsSet {
        #[serde(rename = "threadIDs")]
        thread_ids: Vec<ThreadId>,
    },
    #[serde(rename_all = "camelCase")]
    OlderMessagesCountSet {
        #[serde(rename = "threadID")]
        thread_id: ThreadId,
        older_messages_count: u32,
        #[serde(default)]
        summary: Option<ThreadSummary>,
    },
}

impl FeedEvent {
    pub fn thread_id(&self) -> Option<&ThreadId> {
        match self {
            FeedEvent::ThreadAdded { thread } | FeedEvent::ThreadMerged { thread } => {
                Some(&thread.id)
            }
            FeedEvent::ThreadRemoved { thread_id, .. }
            | FeedEvent::MessageMerged { thread_id, .. }
            | FeedEvent::MessageRemoved { thread_id, .. }
            | FeedEvent::MessageUpdated { thread_id, .. }
            | FeedEvent::ReactionAdded { thread_id, .. }
            | FeedEvent::ReactionRemoved { thread_id, .. }
            | FeedEvent::ThreadPropertiesUpdated { thread_id, .. }
            | FeedEvent::SubscribedSet { thread_id, .. }
            | FeedEvent::TypingUsersUpdated { thread_id, .. }
            | FeedEvent::ParticipantMerged { thread_id, .. }
            | FeedEvent::OlderMessagesCountSet { thread_id, .. } => Some(thread_id),
            FeedEvent::ThreadIdsSet { .. } => None,
        }
    }

    /// The filter-relevant view of the thread as of this event, if the
    /// event carries one.
    pub fn summary(&self) -> Option<ThreadSummary> {
        match self {
            FeedEvent::ThreadAdded { thread } | FeedEvent::ThreadMerged { thread } => {
                Some(thread.summary())
            }
            FeedEvent::ThreadRemoved { summary, .. }
            | FeedEvent::MessageMerged { summary, .. }
            | FeedEvent::MessageRemoved { summary, .. }
            | FeedEvent::MessageUpdated { summary, .. }
            | FeedEvent::ReactionAdded { summary, .. }
            | FeedEvent::ReactionRemoved { summary, .. }
            | FeedEvent::ThreadPropertiesUpdated { summary, .. }
            | FeedEvent::SubscribedSet { summary, .. }
            | FeedEvent::TypingUsersUpdated { summary, .. }
            | FeedEvent::ParticipantMerged { summary, .. }
            | FeedEvent::OlderMessagesCountSet { summary, .. } => summary.clone(),
            FeedEvent::ThreadIdsSet { .. } => None,
        }
    }

    /// The store actions this event stands for.
    pub fn into_actions(self, viewer: &Viewer) -> Vec<Action> {
        let action = match self {
            FeedEvent::ThreadAdded { thread } | FeedEvent::ThreadMerged { thread } => {
                Action::MergeThread {
                    thread,
                    mode: MergeMode::Reconcile,
                }
            }
            FeedEvent::ThreadRemoved { thread_id, .. } => Action::RemoveThread { thread_id },
            FeedEvent::MessageMerged {
                thread_id, message, ..
            } => Action::MergeMessage {
                options: MergeMessageOptions::new_message(viewer.is_author_of(&message.source)),
                thread_id,
                message,
            },
            FeedEvent::MessageRemoved {
                thread_id,
                message_id,
                ..
            } => Action::RemoveMessage {
                thread_id,
                message_id,
            },
            FeedEvent::MessageUpdated {
                thread_id,
                message_id,
                update,
                ..
            } => Action::UpdateMessage {
                thread_id,
                message_id,
                update,
            },
            FeedEvent::ReactionAdded {
                thread_id,
                message_id,
                reaction,
                ..
            } => Action::AddReaction {
                thread_id,
                message_id,
                reaction,
            },
            FeedEvent::ReactionRemoved {
                thread_id,
                message_id,
                reaction_id,
                ..
            } => Action::RemoveReaction {
                thread_id,
                message_id,
                reaction_id,
            },
            FeedEvent::ThreadPropertiesUpdated {
                thread_id,
                properties,
                ..
            } => Action::SetProperties {
                thread_id,
                properties,
            },
            FeedEvent::SubscribedSet {
                thread_id,
                subscribed,
                ..
            } => Action::SetSubscribed {
                thread_id,
                subscribed,
            },
            FeedEvent::TypingUsersUpdated {
                thread_id,
                typing_users,
                ..
            } => Action::SetTypingUsers {
                thread_id,
                typing_users,
            },
            FeedEvent::ParticipantMerged {
                thread_id,
                participant,
                ..
            } => Action::MergeParticipant {
                thread_id,
                participant,
            },
            FeedEvent::ThreadIdsSet { thread_ids } => Action::SetThreadIds { thread_ids },
            FeedEvent::OlderMessagesCountSet {
                thread_id,
                older_messages_count,
                ..
            } => Action::SetOlderMessagesCount {
                thread_id,
                older_messages_count,
            },
        };
        vec![action]
    }
}

/// What the feed did with one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedOutcome {
    Applied,
    /// Not relevant to the live filter.
    Ignored,
    /// The thread is unknown locally; a fetch was requested.
    FetchRequested(ThreadId),
    /// The thread no longer matches the live filter and was dropped.
    Evicted(ThreadId),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub applied: u64,
    pub ignored: u64,
    pub fetch_requested: u64,
    pub evicted: u64,
    pub failed: u64,
}

impl FeedStats {
    fn record(&mut self, outcome: &FeedOutcome) {
        match outcome {
            FeedOutcome::Applied => self.applied += 1,
            FeedOutcome::Ignored => self.ignored += 1,
            FeedOutcome::FetchRequested(_) => self.fetch_requested += 1,
            FeedOutcome::Evicted(_) => self.evicted += 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Live filter the store is kept in line with.
    pub filter: ThreadFilter,
    /// Capacity of the event channel handed out by [`ThreadFeed::channel`].
    pub buffer: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            filter: ThreadFilter::default(),
            buffer: 256,
        }
    }
}

enum Relevance {
    Apply,
    Ignore,
    Evict(ThreadId),
    Fetch(ThreadId),
}

pub struct ThreadFeed {
    store: Arc<ThreadStore>,
    config: FeedConfig,
    commands: mpsc::Sender<ClientCommand>,
}

impl ThreadFeed {
    pub fn new(
        store: Arc<ThreadStore>,
        config: FeedConfig,
        commands: mpsc::Sender<ClientCommand>,
    ) -> Self {
        Self {
            store,
            config,
            commands,
        }
    }

    /// A bounded event channel sized from the config. Feed the sender from
    /// the transport and hand the receiver to [`ThreadFeed::run_channel`].
    pub fn channel(&self) -> (mpsc::Sender<FeedEvent>, mpsc::Receiver<FeedEvent>) {
        mpsc::channel(self.config.buffer.max(1))
    }

    pub fn filter(&self) -> &ThreadFilter {
        &self.config.filter
    }

    pub fn store(&self) -> &Arc<ThreadStore> {
        &self.store
    }

    /// Run one event through the pipeline.
    pub async fn apply(&self, event: FeedEvent) -> Result<FeedOutcome, ClientError> {
        let viewer = self.store.viewer().clone();
        let state = self.store.snapshot();

        match self.relevance(&state, &viewer, &event) {
            Relevance::Apply => {}
            Relevance::Ignore => {
                debug!(thread_id = ?event.thread_id(), "Feed event outside live filter");
                return Ok(FeedOutcome::Ignored);
            }
            Relevance::Evict(thread_id) => {
                self.store.dispatch(Action::RemoveThread {
                    thread_id: thread_id.clone(),
                });
                debug!(thread_id = %thread_id, "Thread left live filter");
                return Ok(FeedOutcome::Evicted(thread_id));
            }
            Relevance::Fetch(thread_id) => {
                self.commands
                    .send(ClientCommand::FetchThread {
                        thread_id: thread_id.clone(),
                    })
                    .await
                    .map_err(|_| ClientError::ChannelClosed)?;
                debug!(thread_id = %thread_id, "Unknown thread, fetch requested");
                return Ok(FeedOutcome::FetchRequested(thread_id));
            }
        }

        let touched = event.thread_id().cloned();
        let state = self.store.dispatch_all(event.into_actions(&viewer));

        if let Some(thread_id) = touched {
            if let Some(thread) = state.thread(&thread_id) {
                if !thread_matches_filter::<Thread>(thread, &viewer, &self.config.filter) {
                    self.store.dispatch(Action::RemoveThread {
                        thread_id: thread_id.clone(),
                    });
                    debug!(thread_id = %thread_id, "Merged thread left live filter");
                    return Ok(FeedOutcome::Evicted(thread_id));
                }
            }
        }
        Ok(FeedOutcome::Applied)
    }

    /// Drain `events` in delivery order.
    pub async fn run<S>(&self, events: S) -> FeedStats
    where
        S: Stream<Item = FeedEvent>,
    {
        let mut events = std::pin::pin!(events);
        let mut stats = FeedStats::default();

        while let Some(event) = events.next().await {
            match self.apply(event).await {
                Ok(outcome) => stats.record(&outcome),
                Err(e) => {
                    warn!(error = %e, "Failed to apply feed event");
                    stats.failed += 1;
                }
            }
        }

        info!(
            applied = stats.applied,
            ignored = stats.ignored,
            fetch_requested = stats.fetch_requested,
            evicted = stats.evicted,
            failed = stats.failed,
            "Feed ended"
        );
        stats
    }

    pub async fn run_channel(&self, mut events: mpsc::Receiver<FeedEvent>) -> FeedStats {
        let stream = futures::stream::poll_fn(move |cx| events.poll_recv(cx));
        self.run(stream).await
    }

    fn relevance(&self, state: &ThreadsState, viewer: &Viewer, event: &FeedEvent) -> Relevance {
        let filter = &self.config.filter;
        let Some(thread_id) = event.thread_id() else {
            return Relevance::Apply;
        };
        let loaded = state.thread(thread_id);

        if let FeedEvent::ThreadRemoved { .. } = event {
            return if loaded.is_some() {
                Relevance::Apply
            } else {
                Relevance::Ignore
            };
        }

        let matches = match (event.summary(), loaded) {
            (Some(summary), _) => thread_matches_filter(&summary, viewer, filter),
            (None, Some(thread)) => thread_matches_filter::<Thread>(thread, viewer, filter),
            (None, None) => return Relevance::Fetch(thread_id.clone()),
        };

        let creates_thread = matches!(
            event,
            FeedEvent::ThreadAdded { .. } | FeedEvent::ThreadMerged { .. }
        );
        match (matches, loaded.is_some()) {
            (true, true) => Relevance::Apply,
            (true, false) if creates_thread => Relevance::Apply,
            (true, false) => Relevance::Fetch(thread_id.clone()),
            (false, true) => Relevance::Evict(thread_id.clone()),
            (false, false) => Relevance::Ignore,
        }
    }
}
