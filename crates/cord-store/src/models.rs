//! Domain models held by the in-memory thread store.
//!
//! [`Message`] and [`ThreadSnapshot`] are wire shapes (serde, camelCase).
//! [`Thread`] is the stored form: its message list and participant set are
//! persistent collections, so cloning a thread to update it shares structure
//! with the previous version.

use chrono::{DateTime, Utc};
use imbl::{OrdMap, OrdSet, Vector};
use serde::{Deserialize, Deserializer, Serialize};

use cord_shared::protocol::ThreadSummary;
use cord_shared::types::{
    externalize_id, GroupId, Location, MessageId, MessageType, Metadata, ReactionId, ThreadId,
    UserId, UserRef,
};

/// Deserialize a present field (even `null`) as `Some`, so that
/// `Option<Option<T>>` can tell "clear" from "leave alone".
pub(crate) fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

// ---------------------------------------------------------------------------
// Reaction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub id: ReactionId,
    pub unicode_reaction: String,
    #[serde(rename = "userID")]
    pub user_id: UserId,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single authored entry in a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    #[serde(rename = "externalID")]
    pub external_id: String,
    #[serde(rename = "threadID")]
    pub thread_id: ThreadId,
    pub timestamp: DateTime<Utc>,
    /// Author.
    pub source: UserRef,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// Opaque structured document.
    #[serde(default)]
    pub content: serde_json::Value,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    #[serde(default)]
    pub seen: bool,
    #[serde(default)]
    pub deleted_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_updated_timestamp: Option<DateTime<Utc>>,
}

impl Message {
    /// A user message with empty content. The external ID defaults to the
    /// externalised internal ID.
    pub fn new(
        id: impl Into<String>,
        thread_id: ThreadId,
        source: UserRef,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let id = MessageId::new(id);
        Self {
            external_id: externalize_id(id.as_str()),
            id,
            thread_id,
            timestamp,
            source,
            message_type: MessageType::UserMessage,
            content: serde_json::Value::Array(Vec::new()),
            url: None,
            metadata: Metadata::new(),
            reactions: Vec::new(),
            seen: false,
            deleted_timestamp: None,
            last_updated_timestamp: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_timestamp.is_some()
    }

    pub fn is_action_message(&self) -> bool {
        self.message_type == MessageType::ActionMessage
    }
}

/// Partial update of a message. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageUpdate {
    #[serde(default)]
    pub content: Option<serde_json::Value>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub seen: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub deleted_timestamp: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub url: Option<Option<String>>,
    #[serde(default)]
    pub last_updated_timestamp: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Participant
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    #[serde(rename = "userID")]
    pub user_id: UserId,
    #[serde(default, rename = "externalID")]
    pub external_id: Option<String>,
    #[serde(default)]
    pub last_seen_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl Participant {
    pub fn new(user_id: impl Into<String>, last_seen_timestamp: Option<DateTime<Utc>>) -> Self {
        Self {
            user_id: UserId::new(user_id),
            external_id: None,
            last_seen_timestamp,
            display_name: None,
        }
    }
}

/// Union `incoming` into `participants` by user ID. The incoming entry wins
/// except that the more recent `last_seen_timestamp` is kept.
pub(crate) fn union_participant(
    participants: &mut OrdMap<UserId, Participant>,
    incoming: Participant,
) {
    let merged = match participants.get(&incoming.user_id) {
        Some(existing) => Participant {
            last_seen_timestamp: existing.last_seen_timestamp.max(incoming.last_seen_timestamp),
            ..incoming
        },
        None => incoming,
    };
    participants.insert(merged.user_id.clone(), merged);
}

// ---------------------------------------------------------------------------
// Thread properties patch
// ---------------------------------------------------------------------------

/// Partial update of thread properties. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadProperties {
    #[serde(default)]
    pub resolved: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub resolved_timestamp: Option<Option<DateTime<Utc>>>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub url: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub extra_classnames: Option<Option<String>>,
    #[serde(default)]
    pub location: Option<Location>,
}

// ---------------------------------------------------------------------------
// Thread snapshot (wire form)
// ---------------------------------------------------------------------------

/// A thread as delivered by the server: authoritative for everything except
/// the messages it does not include.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSnapshot {
    pub id: ThreadId,
    #[serde(rename = "externalID")]
    pub external_id: String,
    #[serde(default, rename = "groupID")]
    pub group_id: Option<GroupId>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub all_messages_count: u32,
    #[serde(default)]
    pub messages_count_excluding_deleted: u32,
    #[serde(default)]
    pub user_messages_count: u32,
    #[serde(default)]
    pub action_messages_count: u32,
    #[serde(default)]
    pub reply_count: u32,
    #[serde(default)]
    pub new_messages_count: u32,
    #[serde(default, rename = "firstUnseenMessageID")]
    pub first_unseen_message_id: Option<MessageId>,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub resolved_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub subscribed: bool,
    #[serde(default)]
    pub viewer_is_thread_participant: bool,
    #[serde(default)]
    pub mentioned: Vec<UserId>,
    #[serde(default, rename = "replyingUserIDs")]
    pub replying_user_ids: Vec<UserId>,
    #[serde(default, rename = "actionMessageReplyingUserIDs")]
    pub action_message_replying_user_ids: Vec<UserId>,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub typing_users: Vec<UserRef>,
    #[serde(default)]
    pub extra_classnames: Option<String>,
}

impl ThreadSnapshot {
    /// A snapshot with no messages and default state.
    pub fn new(id: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            id: ThreadId::new(id),
            external_id: external_id.into(),
            group_id: None,
            name: String::new(),
            url: None,
            location: Location::new(),
            metadata: Metadata::new(),
            messages: Vec::new(),
            all_messages_count: 0,
            messages_count_excluding_deleted: 0,
            user_messages_count: 0,
            action_messages_count: 0,
            reply_count: 0,
            new_messages_count: 0,
            first_unseen_message_id: None,
            resolved: false,
            resolved_timestamp: None,
            subscribed: false,
            viewer_is_thread_participant: false,
            mentioned: Vec::new(),
            replying_user_ids: Vec::new(),
            action_message_replying_user_ids: Vec::new(),
            participants: Vec::new(),
            typing_users: Vec::new(),
            extra_classnames: None,
        }
    }

    pub fn summary(&self) -> ThreadSummary {
        ThreadSummary {
            id: self.id.clone(),
            external_id: self.external_id.clone(),
            group_id: self.group_id.clone(),
            location: self.location.clone(),
            metadata: self.metadata.clone(),
            resolved: self.resolved,
            subscribed: self.subscribed,
            mentioned: self.mentioned.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Thread (stored form)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Thread {
    pub id: ThreadId,
    pub external_id: String,
    pub group_id: Option<GroupId>,
    pub name: String,
    pub url: Option<String>,
    pub location: Location,
    pub metadata: Metadata,
    /// Ascending by timestamp; the root message is always kept.
    pub messages: Vector<Message>,
    pub all_messages_count: u32,
    pub messages_count_excluding_deleted: u32,
    pub user_messages_count: u32,
    pub action_messages_count: u32,
    pub reply_count: u32,
    pub new_messages_count: u32,
    pub first_unseen_message_id: Option<MessageId>,
    pub has_new_messages: bool,
    /// Messages on the server older than the oldest loaded reply.
    pub older_messages_count: u32,
    /// Messages that start a batch load.
    pub first_message_ids_of_load: OrdSet<MessageId>,
    pub resolved: bool,
    pub resolved_timestamp: Option<DateTime<Utc>>,
    pub subscribed: bool,
    pub viewer_is_thread_participant: bool,
    pub mentioned: Vec<UserId>,
    pub replying_user_ids: Vec<UserId>,
    pub action_message_replying_user_ids: Vec<UserId>,
    pub participants: OrdMap<UserId, Participant>,
    pub typing_users: Vec<UserRef>,
    pub extra_classnames: Option<String>,
}

impl Thread {
    pub fn from_snapshot(snapshot: ThreadSnapshot) -> Self {
        let mut messages = snapshot.messages;
        messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        let all_messages_count = snapshot.all_messages_count.max(messages.len() as u32);
        let older_messages_count = all_messages_count.saturating_sub(messages.len() as u32);

        let mut first_message_ids_of_load = OrdSet::new();
        if let Some(first) = messages.first() {
            first_message_ids_of_load.insert(first.id.clone());
        }

        let mut participants = OrdMap::new();
        for participant in snapshot.participants {
            union_participant(&mut participants, participant);
        }

        Self {
            id: snapshot.id,
            external_id: snapshot.external_id,
            group_id: snapshot.group_id,
            name: snapshot.name,
            url: snapshot.url,
            location: snapshot.location,
            metadata: snapshot.metadata,
            messages: messages.into_iter().collect(),
            all_messages_count,
            messages_count_excluding_deleted: snapshot.messages_count_excluding_deleted,
            user_messages_count: snapshot.user_messages_count,
            action_messages_count: snapshot.action_messages_count,
            reply_count: snapshot.reply_count,
            new_messages_count: snapshot.new_messages_count,
            first_unseen_message_id: snapshot.first_unseen_message_id,
            has_new_messages: snapshot.new_messages_count > 0,
            older_messages_count,
            first_message_ids_of_load,
            resolved: snapshot.resolved,
            resolved_timestamp: snapshot.resolved_timestamp,
            subscribed: snapshot.subscribed,
            viewer_is_thread_participant: snapshot.viewer_is_thread_participant,
            mentioned: snapshot.mentioned,
            replying_user_ids: snapshot.replying_user_ids,
            action_message_replying_user_ids: snapshot.action_message_replying_user_ids,
            participants,
            typing_users: snapshot.typing_users,
            extra_classnames: snapshot.extra_classnames,
        }
    }

    /// Index of the message with `id`, scanning from the newest end. Recent
    /// messages are the ones that get re-delivered, so this usually stops
    /// after a comparison or two; worst case it is linear.
    pub fn position_from_end(&self, id: &MessageId) -> Option<usize> {
        (0..self.messages.len())
            .rev()
            .find(|&index| self.messages[index].id == *id)
    }

    pub fn message(&self, id: &MessageId) -> Option<&Message> {
        self.position_from_end(id).map(|index| &self.messages[index])
    }

    /// Timestamp of the newest loaded message.
    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.messages.last().map(|m| m.timestamp)
    }

    pub fn summary(&self) -> ThreadSummary {
        ThreadSummary {
            id: self.id.clone(),
            external_id: self.external_id.clone(),
            group_id: self.group_id.clone(),
            location: self.location.clone(),
            metadata: self.metadata.clone(),
            resolved: self.resolved,
            subscribed: self.subscribed,
            mentioned: self.mentioned.clone(),
        }
    }
}

/// Index at which a message with `timestamp` goes so that the list stays
/// ascending and equal timestamps keep their arrival order.
pub(crate) fn insertion_index(messages: &Vector<Message>, timestamp: &DateTime<Utc>) -> usize {
    let (mut lo, mut hi) = (0, messages.len());
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if messages[mid].timestamp <= *timestamp {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

/// Append `id` unless already present.
pub(crate) fn push_unique(ids: &mut Vec<UserId>, id: &UserId) {
    if !ids.contains(id) {
        ids.push(id.clone());
    }
}
