//! Applies verified webhook events to the mirror store and the inbox.
//!
//! Webhook payloads only carry external IDs, so the mirror store uses the
//! external ID as the thread and message ID as well.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use cord_client::{ClientCommand, ClientError, FeedEvent, FeedOutcome, NotificationInbox, ThreadFeed};
use cord_shared::core_data::{CoreMessageData, CoreThreadData};
use cord_shared::types::{GroupId, ThreadId, UserId, UserRef, Viewer};
use cord_shared::webhook::{ThreadMessageAddedPayload, WebhookEvent};
use cord_store::{Message, Participant, ThreadSnapshot};

/// Consumer side of the webhook queue.
pub struct WebhookMirror {
    feed: ThreadFeed,
    inbox: Arc<RwLock<NotificationInbox>>,
}

impl WebhookMirror {
    pub fn new(feed: ThreadFeed, inbox: Arc<RwLock<NotificationInbox>>) -> Self {
        Self { feed, inbox }
    }

    pub async fn handle(&self, event: WebhookEvent) -> Result<(), ClientError> {
        match event {
            WebhookEvent::ThreadMessageAdded(payload) => {
                let viewer = self.feed.store().viewer().clone();
                let event = thread_event(*payload, &viewer);
                let thread_id = event.thread_id().cloned();
                let outcome = self.feed.apply(event).await?;
                match outcome {
                    FeedOutcome::Applied => {
                        info!(thread_id = ?thread_id, "Mirrored thread-message-added");
                    }
                    other => debug!(thread_id = ?thread_id, outcome = ?other, "Webhook not mirrored"),
                }
            }
            WebhookEvent::NotificationCreated(payload) => {
                let line = payload.notification.summary_line();
                if self.inbox.write().await.insert(*payload) {
                    info!(notification = %line, "Notification received");
                }
            }
            WebhookEvent::UrlVerification(_) => {
                debug!("url-verification reached the queue, ignoring");
            }
        }
        Ok(())
    }

    /// Drain the webhook queue until every sender is gone.
    pub async fn run(self, mut events: mpsc::Receiver<WebhookEvent>) {
        while let Some(event) = events.recv().await {
            let tag = event.type_tag();
            if let Err(e) = self.handle(event).await {
                warn!(event = tag, error = %e, "Failed to apply webhook");
            }
        }
        info!("Webhook queue closed");
    }
}

/// The mirror has no upstream to fetch from; requests are only logged.
pub async fn drain_commands(mut commands: mpsc::Receiver<ClientCommand>) {
    while let Some(command) = commands.recv().await {
        debug!(?command, "No upstream for client command");
    }
}

/// The feed event a `thread-message-added` delivery stands for: a merge of
/// the thread with the new message included.
pub fn thread_event(payload: ThreadMessageAddedPayload, viewer: &Viewer) -> FeedEvent {
    let mut thread = thread_snapshot(payload.thread, viewer);
    let mut message = mirror_message(payload.message);
    if let Some(author) = payload.author {
        message.source.display_name = Some(author.best_name().to_string());
    }
    thread.messages = vec![message];
    FeedEvent::ThreadMerged { thread }
}

fn thread_snapshot(thread: CoreThreadData, viewer: &Viewer) -> ThreadSnapshot {
    let mut snapshot = ThreadSnapshot::new(thread.id.clone(), thread.id);
    snapshot.group_id = thread.group_id.map(GroupId::new);
    snapshot.name = thread.name;
    snapshot.url = thread.url;
    snapshot.location = thread.location;
    snapshot.metadata = thread.metadata;

    snapshot.all_messages_count = thread.total;
    snapshot.messages_count_excluding_deleted = thread.total.saturating_sub(thread.deleted_messages);
    snapshot.user_messages_count = thread.user_messages;
    snapshot.action_messages_count = thread.action_messages;
    snapshot.reply_count = thread.total.saturating_sub(1);

    snapshot.resolved = thread.resolved;
    snapshot.resolved_timestamp = thread.resolved_timestamp;
    snapshot.subscribed = thread.subscribers.iter().any(|s| *s == viewer.external_id);
    snapshot.viewer_is_thread_participant = thread
        .participants
        .iter()
        .any(|p| p.user_id.as_deref() == Some(viewer.external_id.as_str()));
    snapshot.mentioned = thread.mentioned.into_iter().map(UserId::new).collect();
    snapshot.replying_user_ids = thread.repliers.into_iter().map(UserId::new).collect();
    snapshot.action_message_replying_user_ids = thread
        .action_message_repliers
        .into_iter()
        .map(UserId::new)
        .collect();
    snapshot.participants = thread
        .participants
        .into_iter()
        .filter_map(|p| {
            let user_id = p.user_id?;
            let mut participant = Participant::new(user_id.clone(), p.last_seen_timestamp);
            participant.external_id = Some(user_id);
            participant.display_name = p.display_name;
            Some(participant)
        })
        .collect();
    snapshot.typing_users = thread
        .typing
        .into_iter()
        .map(|id| UserRef::new(id.clone(), id))
        .collect();
    snapshot.extra_classnames = thread.extra_classnames;
    snapshot
}

fn mirror_message(data: CoreMessageData) -> Message {
    let mut message = Message::new(
        data.id.clone(),
        ThreadId::new(data.thread_id),
        UserRef::new(data.author_id.clone(), data.author_id),
        data.created_timestamp,
    );
    message.external_id = data.id;
    message.message_type = data.message_type;
    message.content = data.content;
    message.url = data.url;
    message.metadata = data.metadata;
    message.deleted_timestamp = data.deleted_timestamp;
    message.last_updated_timestamp = data.updated_timestamp;
    message
}
