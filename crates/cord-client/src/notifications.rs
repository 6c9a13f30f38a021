//! Viewer notification inbox fed by `notification-created` deliveries.

use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use cord_shared::notification::{CoreNotification, NotificationCreatedPayload, ReadStatus};

/// Counts exposed to status endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxSummary {
    pub total: usize,
    pub unread: usize,
    pub latest: Option<String>,
}

/// Notifications for one recipient, newest first.
#[derive(Debug, Default)]
pub struct NotificationInbox {
    recipient: Option<String>,
    notifications: Vec<CoreNotification>,
    ids: HashSet<String>,
}

impl NotificationInbox {
    /// An inbox accepting notifications for any recipient.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_recipient(recipient: impl Into<String>) -> Self {
        Self {
            recipient: Some(recipient.into()),
            ..Self::default()
        }
    }

    /// Store a delivered notification. Redeliveries and notifications for
    /// another recipient are dropped; returns whether it was stored.
    pub fn insert(&mut self, payload: NotificationCreatedPayload) -> bool {
        if let Some(recipient) = &self.recipient {
            if *recipient != payload.recipient_user_id {
                debug!(recipient = %payload.recipient_user_id, "Notification for another recipient");
                return false;
            }
        }

        let notification = payload.notification;
        if !self.ids.insert(notification.id.clone()) {
            debug!(notification_id = %notification.id, "Duplicate notification ignored");
            return false;
        }

        let index = self
            .notifications
            .partition_point(|existing| existing.timestamp > notification.timestamp);
        self.notifications.insert(index, notification);
        true
    }

    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }

    pub fn unread_count(&self) -> usize {
        self.notifications.iter().filter(|n| n.is_unread()).count()
    }

    pub fn get(&self, id: &str) -> Option<&CoreNotification> {
        self.notifications.iter().find(|n| n.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CoreNotification> + '_ {
        self.notifications.iter()
    }

    /// Returns false if the notification is unknown or already read.
    pub fn mark_read(&mut self, id: &str) -> bool {
        match self.notifications.iter_mut().find(|n| n.id == id) {
            Some(notification) if notification.is_unread() => {
                notification.read_status = ReadStatus::Read;
                true
            }
            _ => false,
        }
    }

    pub fn mark_all_read(&mut self) -> usize {
        let mut marked = 0;
        for notification in self.notifications.iter_mut().filter(|n| n.is_unread()) {
            notification.read_status = ReadStatus::Read;
            marked += 1;
        }
        marked
    }

    pub fn summary(&self) -> InboxSummary {
        InboxSummary {
            total: self.len(),
            unread: self.unread_count(),
            latest: self.notifications.first().map(CoreNotification::summary_line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(id: &str, recipient: &str, ts: &str) -> NotificationCreatedPayload {
        serde_json::from_value(serde_json::json!({
            "recipientUserID": recipient,
            "id": id,
            "header": [{ "type": "text", "text": format!("notification {id}") }],
            "readStatus": "unread",
            "timestamp": ts,
        }))
        .unwrap()
    }

    #[test]
    fn test_insert_dedupes_by_id() {
        let mut inbox = NotificationInbox::new();
        assert!(inbox.insert(payload("n1", "bob", "2024-01-01T00:00:00Z")));
        assert!(!inbox.insert(payload("n1", "bob", "2024-01-01T00:00:00Z")));
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox.unread_count(), 1);
    }

    #[test]
    fn test_newest_first() {
        let mut inbox = NotificationInbox::new();
        inbox.insert(payload("old", "bob", "2024-01-01T00:00:00Z"));
        inbox.insert(payload("new", "bob", "2024-01-02T00:00:00Z"));
        inbox.insert(payload("mid", "bob", "2024-01-01T12:00:00Z"));

        let ids: Vec<&str> = inbox.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
        assert_eq!(inbox.summary().latest.as_deref(), Some("[unread] notification new"));
    }

    #[test]
    fn test_recipient_filter() {
        let mut inbox = NotificationInbox::for_recipient("bob");
        assert!(!inbox.insert(payload("n1", "carol", "2024-01-01T00:00:00Z")));
        assert!(inbox.is_empty());
    }

    #[test]
    fn test_mark_read() {
        let mut inbox = NotificationInbox::new();
        inbox.insert(payload("n1", "bob", "2024-01-01T00:00:00Z"));
        inbox.insert(payload("n2", "bob", "2024-01-02T00:00:00Z"));

        assert!(inbox.mark_read("n1"));
        assert!(!inbox.mark_read("n1"));
        assert!(!inbox.mark_read("missing"));
        assert_eq!(inbox.unread_count(), 1);

        assert_eq!(inbox.mark_all_read(), 1);
        assert_eq!(
            inbox.summary(),
            InboxSummary {
                total: 2,
                unread: 0,
                latest: Some("[read] notification n2".into()),
            }
        );
    }
}
