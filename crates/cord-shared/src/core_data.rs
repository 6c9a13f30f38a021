//! Externally visible thread, message and user shapes, as delivered in
//! webhook payloads and notification attachments. All IDs here are
//! external IDs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Location, MessageType, Metadata};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientUserData {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub secondary_display_name: Option<String>,
    #[serde(default, rename = "profilePictureURL")]
    pub profile_picture_url: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl ClientUserData {
    /// Best name to show for the user, falling back to the ID.
    pub fn best_name(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.name.as_deref())
            .or(self.short_name.as_deref())
            .unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreParticipant {
    #[serde(rename = "userID")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub last_seen_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreMessageData {
    pub id: String,
    #[serde(rename = "threadID")]
    pub thread_id: String,
    #[serde(rename = "authorID")]
    pub author_id: String,
    #[serde(default, rename = "groupID")]
    pub group_id: Option<String>,
    #[serde(default)]
    pub content: serde_json::Value,
    #[serde(default)]
    pub plaintext: String,
    #[serde(default)]
    pub url: Option<String>,
    pub created_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub deleted_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreThreadData {
    pub id: String,
    #[serde(default, rename = "groupID")]
    pub group_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub user_messages: u32,
    #[serde(default)]
    pub action_messages: u32,
    #[serde(default)]
    pub deleted_messages: u32,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub resolved_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub participants: Vec<CoreParticipant>,
    #[serde(default)]
    pub subscribers: Vec<String>,
    #[serde(default)]
    pub mentioned: Vec<String>,
    #[serde(default)]
    pub repliers: Vec<String>,
    #[serde(default)]
    pub action_message_repliers: Vec<String>,
    #[serde(default)]
    pub typing: Vec<String>,
    #[serde(default)]
    pub extra_classnames: Option<String>,
}
