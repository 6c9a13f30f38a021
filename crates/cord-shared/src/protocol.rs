use serde::{Deserialize, Serialize};

use crate::core_data::CoreThreadData;
use crate::types::{
    GroupId, Location, Metadata, ResolvedStatus, ThreadId, UserId, ViewerThreadStatus,
};

/// Location dimension of a filter: a bare location (exact match) or a
/// location with an explicit `partialMatch` flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocationFilter {
    Options {
        value: Location,
        #[serde(default, rename = "partialMatch")]
        partial_match: bool,
    },
    Exact(Location),
}

impl LocationFilter {
    pub fn exact(value: Location) -> Self {
        Self::Options {
            value,
            partial_match: false,
        }
    }

    pub fn partial(value: Location) -> Self {
        Self::Options {
            value,
            partial_match: true,
        }
    }

    pub fn value(&self) -> &Location {
        match self {
            Self::Options { value, .. } | Self::Exact(value) => value,
        }
    }

    pub fn partial_match(&self) -> bool {
        match self {
            Self::Options { partial_match, .. } => *partial_match,
            Self::Exact(_) => false,
        }
    }
}

/// One viewer status or several; several match if any of them holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ViewerStatuses {
    One(ViewerThreadStatus),
    Many(Vec<ViewerThreadStatus>),
}

impl ViewerStatuses {
    pub fn as_slice(&self) -> &[ViewerThreadStatus] {
        match self {
            Self::One(status) => std::slice::from_ref(status),
            Self::Many(statuses) => statuses,
        }
    }
}

/// Declarative thread filter, as accepted by list queries and live
/// subscriptions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadFilter {
    #[serde(default, rename = "groupID", skip_serializing_if = "Option::is_none")]
    pub group_id: Option<GroupId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_status: Option<ResolvedStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer: Option<ViewerStatuses>,
}

impl ThreadFilter {
    pub fn is_empty(&self) -> bool {
        self.group_id.is_none()
            && self.location.is_none()
            && self.metadata.is_none()
            && self.resolved_status.is_none()
            && self.viewer.is_none()
    }
}

/// The subset of a thread a filter looks at. Pushed events carry one so the
/// receiver can decide relevance before it holds the full thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSummary {
    pub id: ThreadId,
    #[serde(rename = "externalID")]
    pub external_id: String,
    #[serde(default, rename = "groupID")]
    pub group_id: Option<GroupId>,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub subscribed: bool,
    #[serde(default)]
    pub mentioned: Vec<UserId>,
}

impl ThreadSummary {
    /// Summarise a webhook thread for `viewer_external_id`. Webhook payloads
    /// only carry external IDs, so the external ID doubles as the thread ID.
    pub fn from_core(thread: &CoreThreadData, viewer_external_id: &str) -> Self {
        Self {
            id: ThreadId::new(thread.id.clone()),
            external_id: thread.id.clone(),
            group_id: thread.group_id.clone().map(GroupId::new),
            location: thread.location.clone(),
            metadata: thread.metadata.clone(),
            resolved: thread.resolved,
            subscribed: thread.subscribers.iter().any(|s| s == viewer_external_id),
            mentioned: thread.mentioned.iter().cloned().map(UserId::new).collect(),
        }
    }
}
