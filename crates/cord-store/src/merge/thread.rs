use std::sync::Arc;

use tracing::debug;

use crate::actions::MergeMode;
use crate::models::{insertion_index, union_participant, Thread, ThreadSnapshot};
use crate::state::{Placement, ThreadsState};

/// Merge a server snapshot into the store.
///
/// An unknown thread is inserted as is. A known thread takes the snapshot's
/// scalar fields, keeps the union of both participant sets and, unless
/// `mode` is [`MergeMode::Replace`], keeps local messages the snapshot does
/// not carry. A local-only thread holding the same external ID is dropped in
/// favour of the server's thread.
pub(crate) fn merge_thread_into(state: &mut ThreadsState, snapshot: ThreadSnapshot, mode: MergeMode) {
    let incoming = Thread::from_snapshot(snapshot);

    if let Some(placeholder) = state.external_id_map.get(&incoming.external_id).cloned() {
        if placeholder != incoming.id && state.local_only_thread_ids.contains(&placeholder) {
            debug!(
                thread_id = %incoming.id,
                optimistic_id = %placeholder,
                "Server thread replaces optimistic thread"
            );
            state.remove_thread(&placeholder);
        }
    }
    state.local_only_thread_ids.remove(&incoming.id);

    let Some(existing) = state.threads.get(&incoming.id).map(Arc::clone) else {
        state.insert_thread(incoming, Placement::Front);
        return;
    };

    let merged = reconcile(&existing, incoming, mode);
    let dropped: Vec<String> = existing
        .messages
        .iter()
        .filter(|old| !merged.messages.iter().any(|m| m.external_id == old.external_id))
        .map(|old| old.external_id.clone())
        .collect();
    state.unindex_message_external_ids(&merged.id, dropped);
    if existing.external_id != merged.external_id
        && state.external_id_map.get(&existing.external_id) == Some(&merged.id)
    {
        state.external_id_map.remove(&existing.external_id);
    }
    for message in merged.messages.iter() {
        state
            .message_external_id_map
            .insert(message.external_id.clone(), merged.id.clone());
    }
    let thread_id = merged.id.clone();
    let external_id = merged.external_id.clone();
    state.update_thread(&thread_id, move |thread| *thread = merged);
    state.external_id_map.insert(external_id, thread_id);
}

/// Combine a stored thread with a newer server snapshot of it.
pub(crate) fn reconcile(existing: &Thread, incoming: Thread, mode: MergeMode) -> Thread {
    let mut merged = incoming;

    let mut participants = existing.participants.clone();
    for participant in merged.participants.values().cloned() {
        union_participant(&mut participants, participant);
    }
    merged.participants = participants;

    match mode {
        MergeMode::Replace => {
            if let Some(root) = existing.messages.front() {
                if merged.position_from_end(&root.id).is_none()
                    && merged.messages.front().map_or(true, |m| m.timestamp >= root.timestamp)
                {
                    merged.messages.push_front(root.clone());
                }
            }
        }
        MergeMode::Reconcile => {
            let mut messages = existing.messages.clone();
            for message in merged.messages.iter().cloned() {
                let existing_index = (0..messages.len())
                    .rev()
                    .find(|&index| messages[index].id == message.id);
                match existing_index {
                    Some(index) => {
                        messages.set(index, message);
                    }
                    None => {
                        let index = insertion_index(&messages, &message.timestamp);
                        messages.insert(index, message);
                    }
                }
            }
            merged.messages = messages;
            merged.first_message_ids_of_load = existing
                .first_message_ids_of_load
                .clone()
                .union(merged.first_message_ids_of_load);
        }
    }

    let loaded = merged.messages.len() as u32;
    merged.all_messages_count = merged.all_messages_count.max(loaded);
    merged.older_messages_count = merged.all_messages_count.saturating_sub(loaded);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Message, Participant};
    use chrono::{DateTime, TimeZone, Utc};
    use cord_shared::types::{Location, ThreadId, UserId, UserRef};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn message(id: &str, secs: i64) -> Message {
        Message::new(id, ThreadId::from("t"), UserRef::new("bob", "bob"), at(secs))
    }

    fn snapshot(messages: Vec<Message>) -> ThreadSnapshot {
        let mut snapshot = ThreadSnapshot::new("t", "ext-t");
        snapshot.all_messages_count = messages.len() as u32;
        snapshot.messages = messages;
        snapshot
    }

    fn ids(state: &ThreadsState) -> Vec<String> {
        state.threads[&ThreadId::from("t")]
            .messages
            .iter()
            .map(|m| m.id.to_string())
            .collect()
    }

    #[test]
    fn test_unknown_thread_is_inserted() {
        let mut state = ThreadsState::new();
        merge_thread_into(&mut state, snapshot(vec![message("root", 0)]), MergeMode::Reconcile);

        assert!(state.contains(&ThreadId::from("t")));
        assert_eq!(state.external_id_map["ext-t"], ThreadId::from("t"));
        assert_eq!(state.message_external_id_map["cord:root"], ThreadId::from("t"));
    }

    #[test]
    fn test_reconcile_keeps_local_messages() {
        let mut state = ThreadsState::new();
        merge_thread_into(
            &mut state,
            snapshot(vec![message("root", 0), message("local", 30)]),
            MergeMode::Reconcile,
        );

        let mut newer = snapshot(vec![message("root", 0), message("m1", 10)]);
        newer.resolved = true;
        newer.name = "Renamed".into();
        merge_thread_into(&mut state, newer, MergeMode::Reconcile);

        let thread = &state.threads[&ThreadId::from("t")];
        assert_eq!(ids(&state), vec!["root", "m1", "local"]);
        assert_eq!(thread.all_messages_count, 3);
        assert!(thread.resolved);
        assert_eq!(thread.name, "Renamed");
    }

    #[test]
    fn test_replace_drops_local_messages_but_keeps_root() {
        let mut state = ThreadsState::new();
        merge_thread_into(
            &mut state,
            snapshot(vec![message("root", 0), message("local", 30)]),
            MergeMode::Reconcile,
        );

        merge_thread_into(&mut state, snapshot(vec![message("m1", 10)]), MergeMode::Replace);
        assert_eq!(ids(&state), vec!["root", "m1"]);
    }

    #[test]
    fn test_replace_drops_stale_message_index() {
        let mut state = ThreadsState::new();
        merge_thread_into(
            &mut state,
            snapshot(vec![message("root", 0), message("local", 30)]),
            MergeMode::Reconcile,
        );
        assert_eq!(state.message_external_id_map["cord:local"], ThreadId::from("t"));

        merge_thread_into(&mut state, snapshot(vec![message("m1", 10)]), MergeMode::Replace);
        assert!(!state.message_external_id_map.contains_key("cord:local"));
        assert_eq!(state.message_external_id_map["cord:root"], ThreadId::from("t"));
        assert_eq!(state.message_external_id_map["cord:m1"], ThreadId::from("t"));
    }

    #[test]
    fn test_external_id_change_drops_old_mapping() {
        let mut state = ThreadsState::new();
        merge_thread_into(&mut state, snapshot(vec![message("root", 0)]), MergeMode::Reconcile);

        let mut renamed = ThreadSnapshot::new("t", "ext-renamed");
        renamed.messages = vec![message("root", 0)];
        merge_thread_into(&mut state, renamed, MergeMode::Reconcile);

        assert!(!state.external_id_map.contains_key("ext-t"));
        assert_eq!(state.external_id_map["ext-renamed"], ThreadId::from("t"));
        assert_eq!(state.threads[&ThreadId::from("t")].external_id, "ext-renamed");
    }

    #[test]
    fn test_participants_union_keeps_recent_seen() {
        let mut state = ThreadsState::new();
        let mut first = snapshot(vec![message("root", 0)]);
        first.participants = vec![
            Participant::new("alice", Some(at(100))),
            Participant::new("bob", Some(at(10))),
        ];
        merge_thread_into(&mut state, first, MergeMode::Reconcile);

        let mut second = snapshot(vec![message("root", 0)]);
        second.participants = vec![Participant::new("alice", Some(at(50)))];
        merge_thread_into(&mut state, second, MergeMode::Reconcile);

        let thread = &state.threads[&ThreadId::from("t")];
        assert_eq!(thread.participants.len(), 2);
        assert_eq!(
            thread.participants[&UserId::from("alice")].last_seen_timestamp,
            Some(at(100))
        );
    }

    #[test]
    fn test_server_thread_replaces_optimistic_placeholder() {
        let mut state = ThreadsState::new();
        let mut optimistic = ThreadSnapshot::new("optimistic-1", "ext-t");
        optimistic.location = Location::new().with("page", "home");
        state.insert_thread(Thread::from_snapshot(optimistic), Placement::Front);
        state
            .local_only_thread_ids
            .insert(ThreadId::from("optimistic-1"));

        let mut server = snapshot(vec![message("root", 0)]);
        server.location = Location::new().with("page", "home");
        merge_thread_into(&mut state, server, MergeMode::Reconcile);

        assert!(!state.contains(&ThreadId::from("optimistic-1")));
        assert!(state.local_only_thread_ids.is_empty());
        assert_eq!(state.external_id_map["ext-t"], ThreadId::from("t"));
        assert_eq!(state.thread_ids.len(), 1);

        let key = Location::new().with("page", "home").canonical_key();
        assert_eq!(state.location_index[&key].len(), 1);
    }

    #[test]
    fn test_siblings_are_untouched() {
        let mut state = ThreadsState::new();
        merge_thread_into(&mut state, snapshot(vec![message("root", 0)]), MergeMode::Reconcile);
        merge_thread_into(&mut state, ThreadSnapshot::new("other", "ext-other"), MergeMode::Reconcile);
        let before = state.clone();

        let mut newer = snapshot(vec![message("root", 0)]);
        newer.subscribed = true;
        merge_thread_into(&mut state, newer, MergeMode::Reconcile);

        let other = ThreadId::from("other");
        assert!(Arc::ptr_eq(&before.threads[&other], &state.threads[&other]));
        assert!(!Arc::ptr_eq(
            &before.threads[&ThreadId::from("t")],
            &state.threads[&ThreadId::from("t")]
        ));
    }
}
