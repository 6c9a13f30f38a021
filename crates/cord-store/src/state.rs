use std::sync::Arc;

use imbl::{HashMap, HashSet, OrdSet, Vector};
use serde::{Deserialize, Serialize};

use cord_shared::types::ThreadId;

use crate::models::Thread;

/// Where the thread list is being shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadsLocation {
    Chat,
    Inbox,
    #[default]
    Elsewhere,
}

/// One version of the client's view of every loaded thread.
///
/// Cloning is cheap: all collections are persistent and threads are shared
/// behind `Arc`. A reduction clones the state, replaces the touched thread's
/// `Arc` and leaves every other thread pointer-equal to the previous
/// version.
#[derive(Debug, Clone, Default)]
pub struct ThreadsState {
    pub threads: HashMap<ThreadId, Arc<Thread>>,
    /// Display order.
    pub thread_ids: Vector<ThreadId>,
    /// Optimistically created threads the server has not confirmed yet.
    pub local_only_thread_ids: HashSet<ThreadId>,
    /// External thread ID to internal ID. May hold preallocated entries for
    /// threads that are not loaded.
    pub external_id_map: HashMap<String, ThreadId>,
    pub message_external_id_map: HashMap<String, ThreadId>,
    /// `Location::canonical_key()` to the threads at that location.
    pub location_index: HashMap<String, OrdSet<ThreadId>>,
    pub location: ThreadsLocation,
    pub draft_message_in_composer: bool,
    pub version: u64,
}

/// Where a newly inserted thread goes in the display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placement {
    Front,
    Back,
}

impl ThreadsState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn contains(&self, id: &ThreadId) -> bool {
        self.threads.contains_key(id)
    }

    /// Insert a thread that is not yet in the store and index it.
    pub(crate) fn insert_thread(&mut self, thread: impl Into<Arc<Thread>>, placement: Placement) {
        let thread: Arc<Thread> = thread.into();
        let id = thread.id.clone();
        if self.threads.contains_key(&id) {
            self.remove_thread(&id);
        }

        self.index_thread(&thread);
        match placement {
            Placement::Front => self.thread_ids.push_front(id.clone()),
            Placement::Back => self.thread_ids.push_back(id.clone()),
        }
        self.threads.insert(id, thread);
    }

    /// Drop a thread and every index entry pointing at it.
    pub(crate) fn remove_thread(&mut self, id: &ThreadId) -> Option<Arc<Thread>> {
        let thread = self.threads.remove(id)?;

        self.thread_ids.retain(|existing| existing != id);
        self.local_only_thread_ids.remove(id);
        self.unindex_location(&thread.location.canonical_key(), id);
        self.external_id_map.retain(|_, target| target != id);
        self.unindex_message_external_ids(
            id,
            thread.messages.iter().map(|m| m.external_id.clone()),
        );
        Some(thread)
    }

    /// Drop message external-ID entries that still point at `id`.
    pub(crate) fn unindex_message_external_ids<I>(&mut self, id: &ThreadId, external_ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        for external_id in external_ids {
            if self.message_external_id_map.get(&external_id) == Some(id) {
                self.message_external_id_map.remove(&external_id);
            }
        }
    }

    /// Copy-on-write update of one thread. Keeps the location index in step
    /// with the thread's location. Returns `false` if the thread is unknown.
    pub(crate) fn update_thread<F>(&mut self, id: &ThreadId, update: F) -> bool
    where
        F: FnOnce(&mut Thread),
    {
        let Some(current) = self.threads.get(id) else {
            return false;
        };
        let mut thread = Thread::clone(current);
        let old_key = thread.location.canonical_key();

        update(&mut thread);

        let new_key = thread.location.canonical_key();
        if old_key != new_key {
            self.unindex_location(&old_key, id);
            self.location_index
                .entry(new_key)
                .or_insert_with(OrdSet::new)
                .insert(id.clone());
        }
        self.threads.insert(id.clone(), Arc::new(thread));
        true
    }

    /// Remove every thread, keeping preallocated external-ID mappings that
    /// do not point at a loaded thread.
    pub(crate) fn clear_threads(&mut self) {
        let loaded = &self.threads;
        let preallocated: HashMap<String, ThreadId> = self
            .external_id_map
            .iter()
            .filter(|(_, id)| !loaded.contains_key(*id))
            .map(|(ext, id)| (ext.clone(), id.clone()))
            .collect();

        self.threads = HashMap::new();
        self.thread_ids = Vector::new();
        self.local_only_thread_ids = HashSet::new();
        self.external_id_map = preallocated;
        self.message_external_id_map = HashMap::new();
        self.location_index = HashMap::new();
    }

    fn index_thread(&mut self, thread: &Thread) {
        self.external_id_map
            .insert(thread.external_id.clone(), thread.id.clone());
        for message in thread.messages.iter() {
            self.message_external_id_map
                .insert(message.external_id.clone(), thread.id.clone());
        }
        self.location_index
            .entry(thread.location.canonical_key())
            .or_insert_with(OrdSet::new)
            .insert(thread.id.clone());
    }

    fn unindex_location(&mut self, key: &str, id: &ThreadId) {
        let now_empty = match self.location_index.get_mut(key) {
            Some(ids) => {
                ids.remove(id);
                ids.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.location_index.remove(key);
        }
    }
}
