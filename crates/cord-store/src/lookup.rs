//! Read-only projections over a [`ThreadsState`].

use std::collections::BTreeSet;
use std::sync::Arc;

use cord_shared::protocol::ThreadFilter;
use cord_shared::types::{extract_internal_id, Location, MessageId, ThreadId, Viewer};

use crate::filter::thread_matches_filter;
use crate::models::{Message, Thread};
use crate::state::ThreadsState;

impl ThreadsState {
    pub fn thread(&self, id: &ThreadId) -> Option<&Arc<Thread>> {
        self.threads.get(id)
    }

    /// Resolve an external thread ID to an internal one. A `cord:<id>` ID
    /// names the internal ID directly; anything else goes through the
    /// external ID map, which includes preallocated mappings for threads
    /// that are not loaded.
    pub fn internal_thread_id(&self, external_id: &str) -> Option<ThreadId> {
        match extract_internal_id(external_id) {
            Some(internal) => Some(ThreadId::from(internal)),
            None => self.external_id_map.get(external_id).cloned(),
        }
    }

    pub fn thread_by_external_id(&self, external_id: &str) -> Option<&Arc<Thread>> {
        self.internal_thread_id(external_id)
            .and_then(|id| self.threads.get(&id))
    }

    pub fn thread_by_external_message_id(&self, external_message_id: &str) -> Option<&Arc<Thread>> {
        if let Some(thread) = self
            .message_external_id_map
            .get(external_message_id)
            .and_then(|id| self.threads.get(id))
        {
            return Some(thread);
        }

        let message_id = MessageId::from(extract_internal_id(external_message_id)?);
        self.thread_ids
            .iter()
            .filter_map(|id| self.threads.get(id))
            .find(|thread| thread.position_from_end(&message_id).is_some())
    }

    pub fn message(&self, thread_id: &ThreadId, message_id: &MessageId) -> Option<&Message> {
        self.threads.get(thread_id)?.message(message_id)
    }

    pub fn message_by_external_id(&self, external_message_id: &str) -> Option<&Message> {
        let thread = self.thread_by_external_message_id(external_message_id)?;
        let internal = extract_internal_id(external_message_id).map(MessageId::from);
        thread.messages.iter().rev().find(|message| {
            message.external_id == external_message_id || Some(&message.id) == internal.as_ref()
        })
    }

    /// Threads at `location`, in display order. A partial match returns
    /// every thread whose location contains `location`.
    pub fn thread_ids_at_location(&self, location: &Location, partial_match: bool) -> Vec<ThreadId> {
        if partial_match {
            return self
                .ordered_threads()
                .filter(|thread| thread.location.contains(location))
                .map(|thread| thread.id.clone())
                .collect();
        }

        let Some(ids) = self.location_index.get(&location.canonical_key()) else {
            return Vec::new();
        };
        self.thread_ids
            .iter()
            .filter(|id| ids.contains(*id))
            .cloned()
            .collect()
    }

    pub fn thread_ids_with_undeleted_messages(&self) -> Vec<ThreadId> {
        self.ordered_threads()
            .filter(|thread| thread.messages_count_excluding_deleted > 0)
            .map(|thread| thread.id.clone())
            .collect()
    }

    pub fn thread_ids_with_messages_including_deleted(&self) -> Vec<ThreadId> {
        self.ordered_threads()
            .filter(|thread| thread.all_messages_count > 0)
            .map(|thread| thread.id.clone())
            .collect()
    }

    pub fn resolved_thread_ids(&self) -> Vec<ThreadId> {
        self.ordered_threads()
            .filter(|thread| thread.resolved)
            .map(|thread| thread.id.clone())
            .collect()
    }

    /// Display order re-sorted by newest message first. Threads with no
    /// loaded messages go last; ties keep their display order.
    pub fn ordered_by_latest_activity(&self) -> Vec<ThreadId> {
        let mut threads: Vec<&Arc<Thread>> = self.ordered_threads().collect();
        threads.sort_by(|a, b| b.latest_timestamp().cmp(&a.latest_timestamp()));
        threads.into_iter().map(|thread| thread.id.clone()).collect()
    }

    /// Every internal thread ID a live subscriber has to watch, including
    /// preallocated ones.
    pub fn subscribed_thread_ids(&self) -> BTreeSet<ThreadId> {
        self.external_id_map.values().cloned().collect()
    }

    /// Threads matching `filter` for `viewer`, in display order.
    pub fn threads_matching(&self, viewer: &Viewer, filter: &ThreadFilter) -> Vec<Arc<Thread>> {
        self.ordered_threads()
            .filter(|thread| thread_matches_filter::<Thread>(thread, viewer, filter))
            .cloned()
            .collect()
    }

    fn ordered_threads(&self) -> impl Iterator<Item = &Arc<Thread>> + '_ {
        self.thread_ids.iter().filter_map(|id| self.threads.get(id))
    }
}
