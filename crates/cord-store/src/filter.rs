//! Declarative thread filter evaluation.
//!
//! The same evaluator runs before an event is applied (against the summary
//! the event carries) and after (against the merged thread), so both
//! decisions are made by one function over the [`FilterSubject`] trait.

use cord_shared::protocol::{ThreadFilter, ThreadSummary};
use cord_shared::types::{
    metadata_contains, GroupId, Location, Metadata, ResolvedStatus, UserId, Viewer,
    ViewerThreadStatus,
};

use crate::models::Thread;

/// The properties of a thread a filter can look at.
pub trait FilterSubject {
    fn group_id(&self) -> Option<&GroupId>;
    fn location(&self) -> &Location;
    fn metadata(&self) -> &Metadata;
    fn resolved(&self) -> bool;
    fn viewer_subscribed(&self) -> bool;
    fn mentions(&self, user: &UserId) -> bool;
}

impl FilterSubject for Thread {
    fn group_id(&self) -> Option<&GroupId> {
        self.group_id.as_ref()
    }

    fn location(&self) -> &Location {
        &self.location
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn resolved(&self) -> bool {
        self.resolved
    }

    fn viewer_subscribed(&self) -> bool {
        self.subscribed
    }

    fn mentions(&self, user: &UserId) -> bool {
        self.mentioned.contains(user)
    }
}

impl FilterSubject for ThreadSummary {
    fn group_id(&self) -> Option<&GroupId> {
        self.group_id.as_ref()
    }

    fn location(&self) -> &Location {
        &self.location
    }

    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn resolved(&self) -> bool {
        self.resolved
    }

    fn viewer_subscribed(&self) -> bool {
        self.subscribed
    }

    fn mentions(&self, user: &UserId) -> bool {
        self.mentioned.contains(user)
    }
}

/// Whether `thread` satisfies every dimension `filter` sets.
///
/// Dimensions are ANDed. Inside `viewer` the listed statuses are ORed; an
/// empty list constrains nothing. A resolved status of `Any` constrains
/// nothing.
pub fn thread_matches_filter<T>(thread: &T, viewer: &Viewer, filter: &ThreadFilter) -> bool
where
    T: FilterSubject + ?Sized,
{
    if filter.is_empty() {
        return true;
    }

    if let Some(group_id) = &filter.group_id {
        if thread.group_id() != Some(group_id) {
            return false;
        }
    }

    if let Some(metadata) = &filter.metadata {
        if !metadata_contains(thread.metadata(), metadata) {
            return false;
        }
    }

    if let Some(location) = &filter.location {
        let matched = if location.partial_match() {
            thread.location().contains(location.value())
        } else {
            thread.location() == location.value()
        };
        if !matched {
            return false;
        }
    }

    match filter.resolved_status {
        None | Some(ResolvedStatus::Any) => {}
        Some(ResolvedStatus::Resolved) if !thread.resolved() => return false,
        Some(ResolvedStatus::Unresolved) if thread.resolved() => return false,
        Some(_) => {}
    }

    if let Some(statuses) = &filter.viewer {
        let statuses = statuses.as_slice();
        let any = statuses.iter().any(|status| match status {
            ViewerThreadStatus::Subscribed => thread.viewer_subscribed(),
            ViewerThreadStatus::Mentioned => thread.mentions(&viewer.user_id),
        });
        if !statuses.is_empty() && !any {
            return false;
        }
    }

    true
}
