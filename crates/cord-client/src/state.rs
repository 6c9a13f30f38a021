//! The client-side thread store.
//!
//! [`ThreadStore`] owns the current [`ThreadsState`] version. Readers either
//! take a snapshot (an `Arc` that never changes underneath them) or
//! subscribe to the `watch` channel to be woken on every new version.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::trace;

use cord_shared::types::Viewer;
use cord_store::{reduce, Action, ThreadsState};

use crate::events::StoreEvent;

const EVENT_CAPACITY: usize = 256;

/// Single owner of the thread state for one viewer.
///
/// Every mutation goes through [`ThreadStore::dispatch`]; the reduction and
/// the publication of the new version happen under the channel's lock, so
/// concurrent dispatches are applied one after the other and no reader sees
/// a half-applied action.
pub struct ThreadStore {
    /// The user the store is kept for. Decides authorship and viewer-relative
    /// filter dimensions.
    viewer: Viewer,

    state_tx: watch::Sender<Arc<ThreadsState>>,

    events_tx: broadcast::Sender<StoreEvent>,
}

impl ThreadStore {
    pub fn new(viewer: Viewer) -> Self {
        Self::with_state(viewer, ThreadsState::new())
    }

    pub fn with_state(viewer: Viewer, state: ThreadsState) -> Self {
        let (state_tx, _) = watch::channel(Arc::new(state));
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            viewer,
            state_tx,
            events_tx,
        }
    }

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    /// The current version.
    pub fn snapshot(&self) -> Arc<ThreadsState> {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ThreadsState>> {
        self.state_tx.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<StoreEvent> {
        self.events_tx.subscribe()
    }

    /// Apply one action and publish the resulting version.
    pub fn dispatch(&self, action: Action) -> Arc<ThreadsState> {
        self.dispatch_all(vec![action])
    }

    /// Apply several actions as one step. Subscribers are woken once, after
    /// the last action.
    pub fn dispatch_all(&self, actions: Vec<Action>) -> Arc<ThreadsState> {
        let mut published = Vec::with_capacity(actions.len());
        let mut next = Arc::default();

        self.state_tx.send_modify(|current| {
            let mut state = ThreadsState::clone(current);
            for action in actions {
                let event_action = action.tag();
                let thread_id = action.thread_id().cloned();
                state = reduce(&state, action);
                published.push(StoreEvent {
                    action: event_action,
                    thread_id,
                    version: state.version,
                });
            }
            next = Arc::new(state);
            *current = Arc::clone(&next);
        });

        for event in published {
            trace!(action = event.action, version = event.version, "Dispatched");
            // No receivers is fine.
            let _ = self.events_tx.send(event);
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cord_shared::types::{Location, ThreadId, UserRef};
    use cord_store::Message;

    fn store() -> ThreadStore {
        ThreadStore::new(Viewer::new("alice", "alice"))
    }

    fn add_thread(id: &str) -> Action {
        Action::AddThread {
            thread_id: ThreadId::from(id),
            external_id: format!("ext-{id}"),
            group_id: None,
            name: String::new(),
            location: Location::new(),
            message: Message::new(
                format!("{id}-root"),
                ThreadId::from(id),
                UserRef::new("alice", "alice"),
                chrono::Utc::now(),
            ),
        }
    }

    #[tokio::test]
    async fn test_dispatch_publishes_version_and_event() {
        let store = store();
        let mut watcher = store.subscribe();
        let mut events = store.events();

        let state = store.dispatch(add_thread("t"));
        assert_eq!(state.version, 1);

        watcher.changed().await.unwrap();
        assert_eq!(watcher.borrow().version, 1);

        let event = events.recv().await.unwrap();
        assert_eq!(event.action, "add-thread");
        assert_eq!(event.thread_id, Some(ThreadId::from("t")));
        assert_eq!(event.version, 1);
    }

    #[tokio::test]
    async fn test_snapshots_are_immutable() {
        let store = store();
        let before = store.snapshot();
        store.dispatch(add_thread("t"));

        assert!(before.is_empty());
        assert_eq!(store.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_all_emits_one_event_per_action() {
        let store = store();
        let mut events = store.events();

        let state = store.dispatch_all(vec![add_thread("a"), add_thread("b")]);
        assert_eq!(state.version, 2);
        assert_eq!(events.recv().await.unwrap().version, 1);
        assert_eq!(events.recv().await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_concurrent_dispatches_are_serialised() {
        let store = Arc::new(store());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.dispatch(add_thread(&format!("t{i}")));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let state = store.snapshot();
        assert_eq!(state.version, 16);
        assert_eq!(state.len(), 16);
    }
}
