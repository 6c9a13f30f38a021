use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core_data::{ClientUserData, CoreMessageData, CoreThreadData};
use crate::types::Metadata;

/// One node of a notification header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HeaderNode {
    Text {
        text: String,
        #[serde(default)]
        bold: bool,
    },
    User {
        #[serde(rename = "userID")]
        user_id: String,
        user: ClientUserData,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NotificationAttachment {
    Url { url: String },
    Message { message: CoreMessageData },
    Thread { thread: CoreThreadData },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadStatus {
    Unread,
    Read,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreNotification {
    pub id: String,
    #[serde(default, rename = "senderUserIDs")]
    pub sender_user_ids: Vec<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub header: Vec<HeaderNode>,
    #[serde(default)]
    pub attachment: Option<NotificationAttachment>,
    pub read_status: ReadStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub extra_classnames: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl CoreNotification {
    pub fn is_unread(&self) -> bool {
        self.read_status == ReadStatus::Unread
    }

    /// Flatten the header into plain text, rendering users by name.
    pub fn header_text(&self) -> String {
        self.header
            .iter()
            .map(|node| match node {
                HeaderNode::Text { text, .. } => text.as_str(),
                HeaderNode::User { user, .. } => user.best_name(),
            })
            .collect()
    }

    /// External ID of the thread this notification points at, if any.
    pub fn thread_id(&self) -> Option<&str> {
        match self.attachment.as_ref()? {
            NotificationAttachment::Message { message } => Some(&message.thread_id),
            NotificationAttachment::Thread { thread } => Some(&thread.id),
            NotificationAttachment::Url { .. } => None,
        }
    }

    /// One-line rendering for logs.
    pub fn summary_line(&self) -> String {
        let status = if self.is_unread() { "unread" } else { "read" };
        match self.thread_id() {
            Some(thread_id) => format!("[{status}] {} ({thread_id})", self.header_text()),
            None => format!("[{status}] {}", self.header_text()),
        }
    }
}

/// Body of a `notification-created` webhook event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationCreatedPayload {
    #[serde(rename = "recipientUserID")]
    pub recipient_user_id: String,
    #[serde(flatten)]
    pub notification: CoreNotification,
}
