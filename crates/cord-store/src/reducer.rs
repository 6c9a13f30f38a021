use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, trace, warn};

use cord_shared::protocol::ThreadFilter;
use cord_shared::types::{MessageId, ThreadId, Viewer};

use crate::actions::Action;
use crate::merge::message::merge_message_into;
use crate::merge::thread::merge_thread_into;
use crate::models::{
    union_participant, Message, MessageUpdate, Thread, ThreadProperties, ThreadSnapshot,
};
use crate::state::{Placement, ThreadsState};

/// Apply one action and return the next state version.
///
/// Reductions never fail. An action naming a thread or message that is not
/// loaded leaves the state as it was, apart from `version`.
pub fn reduce(state: &ThreadsState, action: Action) -> ThreadsState {
    let mut next = state.clone();
    next.version = state.version.wrapping_add(1);

    let tag = action.tag();
    trace!(action = tag, version = next.version, "Reducing");

    match action {
        Action::AddThread {
            thread_id,
            external_id,
            group_id,
            name,
            location,
            message,
        } => {
            if next.contains(&thread_id) {
                debug!(thread_id = %thread_id, "add-thread for existing thread ignored");
                return next;
            }
            let mut snapshot = ThreadSnapshot::new(thread_id.as_str(), external_id);
            snapshot.group_id = group_id;
            snapshot.name = name;
            snapshot.location = location;
            snapshot.all_messages_count = 1;
            snapshot.messages_count_excluding_deleted = u32::from(!message.is_deleted());
            if message.is_action_message() {
                snapshot.action_messages_count = 1;
                snapshot.action_message_replying_user_ids = vec![message.source.id.clone()];
            } else {
                snapshot.user_messages_count = 1;
            }
            snapshot.replying_user_ids = vec![message.source.id.clone()];
            snapshot.subscribed = true;
            snapshot.viewer_is_thread_participant = true;
            snapshot.messages = vec![message];

            next.insert_thread(Thread::from_snapshot(snapshot), Placement::Front);
            next.local_only_thread_ids.insert(thread_id);
        }
        Action::SetThreads { threads } => set_threads(&mut next, threads),
        Action::MergeThread { thread, mode } => merge_thread_into(&mut next, thread, mode),
        Action::RemoveThread { thread_id } => {
            if next.remove_thread(&thread_id).is_none() {
                debug!(thread_id = %thread_id, action = tag, "Unknown thread");
            }
        }
        Action::MergeMessage {
            thread_id,
            message,
            options,
        } => {
            merge_message_into(&mut next, &thread_id, message, options);
        }
        Action::RemoveMessage {
            thread_id,
            message_id,
        } => remove_message(&mut next, &thread_id, &message_id),
        Action::SetMessages {
            thread_id,
            messages,
        } => set_messages(&mut next, &thread_id, messages),
        Action::UpdateMessage {
            thread_id,
            message_id,
            update,
        } => with_message(&mut next, &thread_id, &message_id, tag, |thread, index| {
            update_message(thread, index, update)
        }),
        Action::AppendMessageContent {
            thread_id,
            message_id,
            appended_content,
        } => with_message(&mut next, &thread_id, &message_id, tag, |thread, index| {
            let mut message = thread.messages[index].clone();
            if append_text(&mut message.content, &appended_content) {
                thread.messages.set(index, message);
            } else {
                warn!(message_id = %message.id, "Message content has no text node to append to");
            }
        }),
        Action::AddReaction {
            thread_id,
            message_id,
            reaction,
        } => with_message(&mut next, &thread_id, &message_id, tag, |thread, index| {
            let mut message = thread.messages[index].clone();
            let duplicate = message.reactions.iter().any(|existing| {
                existing.id == reaction.id
                    || (existing.user_id == reaction.user_id
                        && existing.unicode_reaction == reaction.unicode_reaction)
            });
            if !duplicate {
                message.reactions.push(reaction);
                thread.messages.set(index, message);
            }
        }),
        Action::RemoveReaction {
            thread_id,
            message_id,
            reaction_id,
        } => with_message(&mut next, &thread_id, &message_id, tag, |thread, index| {
            let mut message = thread.messages[index].clone();
            message.reactions.retain(|reaction| reaction.id != reaction_id);
            thread.messages.set(index, message);
        }),
        Action::SetProperties {
            thread_id,
            properties,
        } => with_thread(&mut next, &thread_id, tag, |thread| {
            set_properties(thread, properties)
        }),
        Action::SetSubscribed {
            thread_id,
            subscribed,
        } => with_thread(&mut next, &thread_id, tag, |thread| {
            thread.subscribed = subscribed;
        }),
        Action::SetTypingUsers {
            thread_id,
            typing_users,
        } => with_thread(&mut next, &thread_id, tag, |thread| {
            thread.typing_users = typing_users;
        }),
        Action::MergeParticipant {
            thread_id,
            participant,
        } => with_thread(&mut next, &thread_id, tag, |thread| {
            union_participant(&mut thread.participants, participant);
        }),
        Action::MarkThreadsSeen {
            viewer,
            external_thread_id,
            filter,
            seen,
        } => mark_threads_seen(&mut next, &viewer, external_thread_id.as_deref(), &filter, seen),
        Action::SetThreadIds { thread_ids } => set_thread_ids(&mut next, thread_ids),
        Action::SetOlderMessagesCount {
            thread_id,
            older_messages_count,
        } => with_thread(&mut next, &thread_id, tag, |thread| {
            thread.older_messages_count = older_messages_count;
        }),
        Action::AddFirstMessageOfLoad {
            thread_id,
            message_id,
        } => with_thread(&mut next, &thread_id, tag, |thread| {
            thread.first_message_ids_of_load.insert(message_id);
        }),
        Action::AddExternalIdMapping {
            external_thread_id,
            thread_id,
        } => {
            next.external_id_map.insert(external_thread_id, thread_id);
        }
        Action::SetDraftMessageInComposer { draft } => {
            next.draft_message_in_composer = draft;
        }
    }

    next
}

fn with_thread<F>(state: &mut ThreadsState, thread_id: &ThreadId, tag: &'static str, update: F)
where
    F: FnOnce(&mut Thread),
{
    if !state.update_thread(thread_id, update) {
        debug!(thread_id = %thread_id, action = tag, "Unknown thread");
    }
}

/// Run `update` with the index of `message_id`, if both the thread and the
/// message are loaded.
fn with_message<F>(
    state: &mut ThreadsState,
    thread_id: &ThreadId,
    message_id: &MessageId,
    tag: &'static str,
    update: F,
) where
    F: FnOnce(&mut Thread, usize),
{
    let Some(index) = state
        .threads
        .get(thread_id)
        .and_then(|thread| thread.position_from_end(message_id))
    else {
        debug!(thread_id = %thread_id, message_id = %message_id, action = tag, "Unknown message");
        return;
    };
    state.update_thread(thread_id, |thread| update(thread, index));
}

fn set_threads(state: &mut ThreadsState, threads: Vec<ThreadSnapshot>) {
    let covered: HashSet<&str> = threads.iter().map(|t| t.external_id.as_str()).collect();
    let retained: Vec<Arc<Thread>> = state
        .thread_ids
        .iter()
        .filter(|id| state.local_only_thread_ids.contains(*id))
        .filter_map(|id| state.threads.get(id))
        .filter(|thread| !covered.contains(thread.external_id.as_str()))
        .cloned()
        .collect();

    state.clear_threads();
    for thread in retained {
        let id = thread.id.clone();
        state.insert_thread(thread, Placement::Back);
        state.local_only_thread_ids.insert(id);
    }
    for snapshot in threads {
        state.insert_thread(Thread::from_snapshot(snapshot), Placement::Back);
    }
}

fn remove_message(state: &mut ThreadsState, thread_id: &ThreadId, message_id: &MessageId) {
    let mut removed_external_id = None;
    with_message(state, thread_id, message_id, "remove-message", |thread, index| {
        // Only messages at or after the first unseen one were counted as new.
        let first_unseen_index = thread
            .first_unseen_message_id
            .as_ref()
            .and_then(|id| thread.position_from_end(id));
        let removed = thread.messages.remove(index);

        thread.all_messages_count = thread.all_messages_count.saturating_sub(1);
        if removed.is_action_message() {
            thread.action_messages_count = thread.action_messages_count.saturating_sub(1);
        } else {
            thread.user_messages_count = thread.user_messages_count.saturating_sub(1);
        }
        if !removed.is_deleted() {
            thread.messages_count_excluding_deleted =
                thread.messages_count_excluding_deleted.saturating_sub(1);
        }
        if index > 0 {
            thread.reply_count = thread.reply_count.saturating_sub(1);
        }
        let was_counted = first_unseen_index.is_some_and(|first| index >= first);
        if was_counted && !removed.seen {
            thread.new_messages_count = thread.new_messages_count.saturating_sub(1);
        }
        if thread.first_unseen_message_id.as_ref() == Some(&removed.id) {
            thread.first_unseen_message_id = thread
                .messages
                .iter()
                .skip(index)
                .find(|m| !m.seen && !m.is_deleted())
                .map(|m| m.id.clone());
            if thread.first_unseen_message_id.is_none() {
                thread.new_messages_count = 0;
            }
        }
        if thread.new_messages_count == 0 {
            thread.first_unseen_message_id = None;
        }
        thread.has_new_messages = thread.new_messages_count > 0;
        thread.first_message_ids_of_load.remove(&removed.id);

        removed_external_id = Some(removed.external_id);
    });

    if let Some(external_id) = removed_external_id {
        if state.message_external_id_map.get(&external_id) == Some(thread_id) {
            state.message_external_id_map.remove(&external_id);
        }
    }
}

fn set_messages(state: &mut ThreadsState, thread_id: &ThreadId, mut messages: Vec<Message>) {
    messages.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

    let mut dropped = Vec::new();
    let updated = state.update_thread(thread_id, |thread| {
        if let Some(root) = thread.messages.front() {
            if !messages.iter().any(|m| m.id == root.id) {
                messages.insert(0, root.clone());
            }
        }
        dropped = thread
            .messages
            .iter()
            .filter(|old| !messages.iter().any(|m| m.external_id == old.external_id))
            .map(|old| old.external_id.clone())
            .collect();
        thread.messages = messages.iter().cloned().collect();

        let loaded = thread.messages.len() as u32;
        thread.all_messages_count = thread.all_messages_count.max(loaded);
        thread.older_messages_count = thread.all_messages_count.saturating_sub(loaded);
    });
    if !updated {
        debug!(thread_id = %thread_id, action = "set-messages", "Unknown thread");
        return;
    }

    state.unindex_message_external_ids(thread_id, dropped);
    for message in messages {
        state
            .message_external_id_map
            .insert(message.external_id, thread_id.clone());
    }
}

fn update_message(thread: &mut Thread, index: usize, update: MessageUpdate) {
    let mut message = thread.messages[index].clone();
    let was_deleted = message.is_deleted();

    if let Some(content) = update.content {
        message.content = content;
    }
    if let Some(metadata) = update.metadata {
        message.metadata = metadata;
    }
    if let Some(seen) = update.seen {
        message.seen = seen;
    }
    if let Some(deleted_timestamp) = update.deleted_timestamp {
        message.deleted_timestamp = deleted_timestamp;
    }
    if let Some(url) = update.url {
        message.url = url;
    }
    if let Some(last_updated) = update.last_updated_timestamp {
        message.last_updated_timestamp = Some(last_updated);
    }

    match (was_deleted, message.is_deleted()) {
        (false, true) => {
            thread.messages_count_excluding_deleted =
                thread.messages_count_excluding_deleted.saturating_sub(1);
        }
        (true, false) => thread.messages_count_excluding_deleted += 1,
        _ => {}
    }
    thread.messages.set(index, message);
}

/// Append `text` to the last text node of a structured message document.
fn append_text(content: &mut Value, text: &str) -> bool {
    match content {
        Value::String(existing) => {
            existing.push_str(text);
            true
        }
        Value::Array(nodes) => nodes.iter_mut().rev().any(|node| append_text(node, text)),
        Value::Object(node) => {
            if let Some(Value::String(existing)) = node.get_mut("text") {
                existing.push_str(text);
                return true;
            }
            node.get_mut("children")
                .map_or(false, |children| append_text(children, text))
        }
        _ => false,
    }
}

fn set_properties(thread: &mut Thread, properties: ThreadProperties) {
    if let Some(resolved) = properties.resolved {
        thread.resolved = resolved;
    }
    if let Some(resolved_timestamp) = properties.resolved_timestamp {
        thread.resolved_timestamp = resolved_timestamp;
    }
    if let Some(name) = properties.name {
        thread.name = name;
    }
    if let Some(metadata) = properties.metadata {
        thread.metadata = metadata;
    }
    if let Some(url) = properties.url {
        thread.url = url;
    }
    if let Some(extra_classnames) = properties.extra_classnames {
        thread.extra_classnames = extra_classnames;
    }
    if let Some(location) = properties.location {
        thread.location = location;
    }
}

fn mark_threads_seen(
    state: &mut ThreadsState,
    viewer: &Viewer,
    external_thread_id: Option<&str>,
    filter: &ThreadFilter,
    seen: bool,
) {
    let targets: Vec<ThreadId> = match external_thread_id {
        Some(external_id) => state
            .thread_by_external_id(external_id)
            .map(|thread| vec![thread.id.clone()])
            .unwrap_or_default(),
        None => state
            .threads_matching(viewer, filter)
            .iter()
            .map(|thread| thread.id.clone())
            .collect(),
    };
    if targets.is_empty() {
        debug!(external_thread_id, "mark-threads-seen matched no thread");
    }

    for thread_id in targets {
        state.update_thread(&thread_id, |thread| {
            if seen {
                thread.new_messages_count = 0;
                thread.first_unseen_message_id = None;
                thread.has_new_messages = false;
            } else {
                thread.new_messages_count = thread.messages_count_excluding_deleted;
                thread.first_unseen_message_id = thread
                    .messages
                    .iter()
                    .find(|m| !m.is_deleted())
                    .map(|m| m.id.clone());
                thread.has_new_messages = true;
            }
            for index in 0..thread.messages.len() {
                if thread.messages[index].seen != seen {
                    let mut message = thread.messages[index].clone();
                    message.seen = seen;
                    thread.messages.set(index, message);
                }
            }
        });
    }
}

fn set_thread_ids(state: &mut ThreadsState, thread_ids: Vec<ThreadId>) {
    let mut seen = HashSet::new();
    let mut ordered: imbl::Vector<ThreadId> = thread_ids
        .into_iter()
        .filter(|id| state.threads.contains_key(id) && seen.insert(id.clone()))
        .collect();
    for id in state.thread_ids.iter() {
        if !seen.contains(id) {
            ordered.push_back(id.clone());
        }
    }
    state.thread_ids = ordered;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{MergeMessageOptions, MergeMode};
    use crate::models::{Participant, Reaction};
    use chrono::{DateTime, TimeZone, Utc};
    use cord_shared::types::{Location, ReactionId, UserId, UserRef};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn message(thread: &str, id: &str, author: &str, secs: i64) -> Message {
        Message::new(id, ThreadId::from(thread), UserRef::new(author, author), at(secs))
    }

    fn add_thread(state: &ThreadsState, id: &str, ext: &str) -> ThreadsState {
        reduce(
            state,
            Action::AddThread {
                thread_id: ThreadId::from(id),
                external_id: ext.into(),
                group_id: None,
                name: format!("Thread {id}"),
                location: Location::new().with("page", "home"),
                message: message(id, &format!("{id}-root"), "alice", 0),
            },
        )
    }

    fn merge(state: &ThreadsState, thread: &str, m: Message, viewer_is_author: bool) -> ThreadsState {
        reduce(
            state,
            Action::MergeMessage {
                thread_id: ThreadId::from(thread),
                message: m,
                options: MergeMessageOptions::new_message(viewer_is_author),
            },
        )
    }

    fn get<'a>(state: &'a ThreadsState, id: &str) -> &'a Thread {
        state.threads[&ThreadId::from(id)].as_ref()
    }

    #[test]
    fn test_reduce_bumps_version() {
        let state = ThreadsState::new();
        let next = reduce(&state, Action::SetDraftMessageInComposer { draft: true });
        assert_eq!(next.version, 1);
        assert!(next.draft_message_in_composer);
        assert!(!state.draft_message_in_composer);
    }

    #[test]
    fn test_add_thread_creates_local_only_thread() {
        let state = add_thread(&ThreadsState::new(), "t", "ext-t");
        let thread = get(&state, "t");

        assert_eq!(thread.all_messages_count, 1);
        assert_eq!(thread.reply_count, 0);
        assert!(thread.subscribed);
        assert!(state.local_only_thread_ids.contains(&ThreadId::from("t")));
        assert_eq!(state.external_id_map["ext-t"], ThreadId::from("t"));
        assert_eq!(state.message_external_id_map["cord:t-root"], ThreadId::from("t"));

        let again = add_thread(&state, "t", "ext-other");
        assert!(Arc::ptr_eq(&state.threads[&ThreadId::from("t")], &again.threads[&ThreadId::from("t")]));
        assert!(!again.external_id_map.contains_key("ext-other"));
    }

    #[test]
    fn test_unknown_thread_actions_are_noops() {
        let state = add_thread(&ThreadsState::new(), "t", "ext-t");
        let missing = ThreadId::from("missing");
        let actions = vec![
            Action::RemoveThread { thread_id: missing.clone() },
            Action::SetSubscribed { thread_id: missing.clone(), subscribed: false },
            Action::RemoveMessage { thread_id: missing.clone(), message_id: MessageId::from("x") },
            Action::RemoveMessage { thread_id: ThreadId::from("t"), message_id: MessageId::from("x") },
            Action::SetMessages { thread_id: missing.clone(), messages: vec![] },
            Action::SetOlderMessagesCount { thread_id: missing.clone(), older_messages_count: 3 },
        ];

        for action in actions {
            let next = reduce(&state, action);
            assert_eq!(next.version, state.version + 1);
            assert_eq!(next.len(), 1);
            assert!(Arc::ptr_eq(&state.threads[&ThreadId::from("t")], &next.threads[&ThreadId::from("t")]));
        }
    }

    #[test]
    fn test_sibling_threads_stay_pointer_equal() {
        let state = add_thread(&ThreadsState::new(), "a", "ext-a");
        let state = add_thread(&state, "b", "ext-b");

        let next = merge(&state, "a", message("a", "m1", "bob", 10), false);
        assert!(Arc::ptr_eq(&state.threads[&ThreadId::from("b")], &next.threads[&ThreadId::from("b")]));
        assert!(!Arc::ptr_eq(&state.threads[&ThreadId::from("a")], &next.threads[&ThreadId::from("a")]));
    }

    #[test]
    fn test_counters_after_replies_and_viewer_reply() {
        // Root by alice, two replies by bob, then the viewer (alice) replies.
        let state = add_thread(&ThreadsState::new(), "t", "ext-t");
        let state = merge(&state, "t", message("t", "m1", "bob", 10), false);
        let state = merge(&state, "t", message("t", "m2", "bob", 20), false);

        let thread = get(&state, "t");
        assert_eq!(thread.all_messages_count, 3);
        assert_eq!(thread.reply_count, 2);
        assert_eq!(thread.new_messages_count, 2);
        assert_eq!(thread.first_unseen_message_id, Some(MessageId::from("m1")));

        let state = merge(&state, "t", message("t", "m3", "alice", 30), true);
        let thread = get(&state, "t");
        assert_eq!(thread.all_messages_count, 4);
        assert_eq!(thread.reply_count, 3);
        assert_eq!(thread.new_messages_count, 0);
        assert_eq!(thread.first_unseen_message_id, None);
        assert_eq!(
            thread.replying_user_ids,
            vec![UserId::from("alice"), UserId::from("bob")]
        );
    }

    #[test]
    fn test_remove_message_adjusts_counters() {
        let state = add_thread(&ThreadsState::new(), "t", "ext-t");
        let state = merge(&state, "t", message("t", "m1", "bob", 10), false);
        let state = merge(&state, "t", message("t", "m2", "bob", 20), false);

        let state = reduce(
            &state,
            Action::RemoveMessage {
                thread_id: ThreadId::from("t"),
                message_id: MessageId::from("m1"),
            },
        );
        let thread = get(&state, "t");
        assert_eq!(thread.messages.len(), 2);
        assert_eq!(thread.all_messages_count, 2);
        assert_eq!(thread.reply_count, 1);
        assert_eq!(thread.messages_count_excluding_deleted, 2);
        assert_eq!(thread.new_messages_count, 1);
        assert_eq!(thread.first_unseen_message_id, Some(MessageId::from("m2")));
        assert!(!state.message_external_id_map.contains_key("cord:m1"));
    }

    fn remove(state: &ThreadsState, thread: &str, id: &str) -> ThreadsState {
        reduce(
            state,
            Action::RemoveMessage {
                thread_id: ThreadId::from(thread),
                message_id: MessageId::from(id),
            },
        )
    }

    #[test]
    fn test_remove_history_message_keeps_unread() {
        let state = add_thread(&ThreadsState::new(), "t", "ext-t");
        let state = reduce(
            &state,
            Action::MergeMessage {
                thread_id: ThreadId::from("t"),
                message: message("t", "old", "bob", 5),
                options: MergeMessageOptions::history(),
            },
        );
        let state = merge(&state, "t", message("t", "m1", "bob", 10), false);
        assert_eq!(get(&state, "t").new_messages_count, 1);

        let state = remove(&state, "t", "old");
        let thread = get(&state, "t");
        assert_eq!(thread.new_messages_count, 1);
        assert!(thread.has_new_messages);
        assert_eq!(thread.first_unseen_message_id, Some(MessageId::from("m1")));
    }

    #[test]
    fn test_remove_own_message_keeps_unread() {
        let state = add_thread(&ThreadsState::new(), "t", "ext-t");
        let state = merge(&state, "t", message("t", "m1", "bob", 10), false);
        let state = merge(&state, "t", message("t", "mine", "alice", 20), true);
        let state = merge(&state, "t", message("t", "m2", "bob", 30), false);

        let state = remove(&state, "t", "mine");
        let thread = get(&state, "t");
        assert_eq!(thread.new_messages_count, 1);
        assert!(thread.has_new_messages);
        assert_eq!(thread.first_unseen_message_id, Some(MessageId::from("m2")));
    }

    #[test]
    fn test_remove_last_unread_clears_first_unseen() {
        let state = add_thread(&ThreadsState::new(), "t", "ext-t");
        let state = merge(&state, "t", message("t", "m1", "bob", 10), false);

        let state = remove(&state, "t", "m1");
        let thread = get(&state, "t");
        assert_eq!(thread.new_messages_count, 0);
        assert!(!thread.has_new_messages);
        assert_eq!(thread.first_unseen_message_id, None);
    }

    #[test]
    fn test_set_messages_drops_stale_message_index() {
        let state = add_thread(&ThreadsState::new(), "t", "ext-t");
        let state = merge(&state, "t", message("t", "local", "bob", 30), false);
        assert_eq!(state.message_external_id_map["cord:local"], ThreadId::from("t"));

        let state = reduce(
            &state,
            Action::SetMessages {
                thread_id: ThreadId::from("t"),
                messages: vec![message("t", "m1", "bob", 10)],
            },
        );
        assert!(!state.message_external_id_map.contains_key("cord:local"));
        assert_eq!(state.message_external_id_map["cord:t-root"], ThreadId::from("t"));
        assert_eq!(state.message_external_id_map["cord:m1"], ThreadId::from("t"));
    }

    #[test]
    fn test_set_messages_keeps_root() {
        let state = add_thread(&ThreadsState::new(), "t", "ext-t");
        let state = reduce(
            &state,
            Action::SetMessages {
                thread_id: ThreadId::from("t"),
                messages: vec![message("t", "m2", "bob", 20), message("t", "m1", "bob", 10)],
            },
        );

        let ids: Vec<&str> = get(&state, "t").messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["t-root", "m1", "m2"]);
        assert_eq!(get(&state, "t").all_messages_count, 3);
        assert_eq!(state.message_external_id_map["cord:m2"], ThreadId::from("t"));
    }

    #[test]
    fn test_update_message_tracks_deletion() {
        let state = add_thread(&ThreadsState::new(), "t", "ext-t");
        let state = merge(&state, "t", message("t", "m1", "bob", 10), false);
        let delete = |state: &ThreadsState, deleted: Option<DateTime<Utc>>| {
            reduce(
                state,
                Action::UpdateMessage {
                    thread_id: ThreadId::from("t"),
                    message_id: MessageId::from("m1"),
                    update: MessageUpdate {
                        deleted_timestamp: Some(deleted),
                        ..Default::default()
                    },
                },
            )
        };

        let deleted = delete(&state, Some(at(50)));
        assert_eq!(get(&deleted, "t").messages_count_excluding_deleted, 1);
        assert!(get(&deleted, "t").messages[1].is_deleted());

        let twice = delete(&deleted, Some(at(60)));
        assert_eq!(get(&twice, "t").messages_count_excluding_deleted, 1);

        let restored = delete(&twice, None);
        assert_eq!(get(&restored, "t").messages_count_excluding_deleted, 2);
    }

    #[test]
    fn test_append_message_content_extends_last_text_node() {
        let state = add_thread(&ThreadsState::new(), "t", "ext-t");
        let mut m = message("t", "bot-1", "bot", 10);
        m.content = serde_json::json!([
            { "type": "p", "children": [{ "text": "Hello" }] },
            { "type": "p", "children": [{ "text": "Wor" }] }
        ]);
        let state = merge(&state, "t", m, false);

        let state = reduce(
            &state,
            Action::AppendMessageContent {
                thread_id: ThreadId::from("t"),
                message_id: MessageId::from("bot-1"),
                appended_content: "ld".into(),
            },
        );
        let content = &get(&state, "t").messages[1].content;
        assert_eq!(content[1]["children"][0]["text"], "World");
        assert_eq!(content[0]["children"][0]["text"], "Hello");
    }

    #[test]
    fn test_append_to_unexpected_content_is_noop() {
        let state = add_thread(&ThreadsState::new(), "t", "ext-t");
        let next = reduce(
            &state,
            Action::AppendMessageContent {
                thread_id: ThreadId::from("t"),
                message_id: MessageId::from("t-root"),
                appended_content: "x".into(),
            },
        );
        assert_eq!(get(&next, "t"), get(&state, "t"));
    }

    #[test]
    fn test_reactions_are_idempotent() {
        let state = add_thread(&ThreadsState::new(), "t", "ext-t");
        let reaction = |id: &str| Reaction {
            id: ReactionId::from(id),
            unicode_reaction: "👍".into(),
            user_id: UserId::from("bob"),
            timestamp: at(5),
        };
        let add = |state: &ThreadsState, r: Reaction| {
            reduce(
                state,
                Action::AddReaction {
                    thread_id: ThreadId::from("t"),
                    message_id: MessageId::from("t-root"),
                    reaction: r,
                },
            )
        };

        let state = add(&state, reaction("r1"));
        let state = add(&state, reaction("r1"));
        let state = add(&state, reaction("r2"));
        assert_eq!(get(&state, "t").messages[0].reactions.len(), 1);

        let state = reduce(
            &state,
            Action::RemoveReaction {
                thread_id: ThreadId::from("t"),
                message_id: MessageId::from("t-root"),
                reaction_id: ReactionId::from("r1"),
            },
        );
        assert!(get(&state, "t").messages[0].reactions.is_empty());
    }

    #[test]
    fn test_set_properties_reindexes_location() {
        let state = add_thread(&ThreadsState::new(), "t", "ext-t");
        let docs = Location::new().with("page", "docs");
        let state = reduce(
            &state,
            Action::SetProperties {
                thread_id: ThreadId::from("t"),
                properties: ThreadProperties {
                    resolved: Some(true),
                    resolved_timestamp: Some(Some(at(99))),
                    location: Some(docs.clone()),
                    ..Default::default()
                },
            },
        );

        assert!(get(&state, "t").resolved);
        assert_eq!(state.thread_ids_at_location(&docs, false), vec![ThreadId::from("t")]);
        assert!(state
            .thread_ids_at_location(&Location::new().with("page", "home"), false)
            .is_empty());
    }

    #[test]
    fn test_mark_threads_seen_by_filter_and_unseen() {
        let viewer = Viewer::new("alice", "alice");
        let state = add_thread(&ThreadsState::new(), "a", "ext-a");
        let state = add_thread(&state, "b", "ext-b");
        let state = merge(&state, "a", message("a", "a1", "bob", 10), false);
        let state = merge(&state, "b", message("b", "b1", "bob", 10), false);

        let seen = reduce(
            &state,
            Action::MarkThreadsSeen {
                viewer: viewer.clone(),
                external_thread_id: None,
                filter: ThreadFilter::default(),
                seen: true,
            },
        );
        for id in ["a", "b"] {
            assert_eq!(get(&seen, id).new_messages_count, 0);
            assert!(!get(&seen, id).has_new_messages);
            assert!(get(&seen, id).messages.iter().all(|m| m.seen));
        }

        let unseen = reduce(
            &seen,
            Action::MarkThreadsSeen {
                viewer,
                external_thread_id: Some("ext-a".into()),
                filter: ThreadFilter::default(),
                seen: false,
            },
        );
        let a = get(&unseen, "a");
        assert!(a.has_new_messages);
        assert_eq!(a.new_messages_count, 2);
        assert_eq!(a.first_unseen_message_id, Some(MessageId::from("a-root")));
        assert!(Arc::ptr_eq(&seen.threads[&ThreadId::from("b")], &unseen.threads[&ThreadId::from("b")]));
    }

    #[test]
    fn test_set_threads_keeps_uncovered_local_threads() {
        let state = add_thread(&ThreadsState::new(), "opt-1", "ext-1");
        let state = add_thread(&state, "opt-2", "ext-2");

        let mut server = ThreadSnapshot::new("srv-1", "ext-1");
        server.messages = vec![message("srv-1", "s1", "alice", 0)];
        let state = reduce(&state, Action::SetThreads { threads: vec![server] });

        assert!(!state.contains(&ThreadId::from("opt-1")));
        assert!(state.contains(&ThreadId::from("opt-2")));
        assert!(state.local_only_thread_ids.contains(&ThreadId::from("opt-2")));
        assert_eq!(
            state.thread_ids.iter().cloned().collect::<Vec<_>>(),
            vec![ThreadId::from("opt-2"), ThreadId::from("srv-1")]
        );
        assert_eq!(state.external_id_map["ext-1"], ThreadId::from("srv-1"));
    }

    #[test]
    fn test_set_thread_ids_keeps_every_loaded_thread() {
        let state = add_thread(&ThreadsState::new(), "a", "ext-a");
        let state = add_thread(&state, "b", "ext-b");
        let state = add_thread(&state, "c", "ext-c");

        let state = reduce(
            &state,
            Action::SetThreadIds {
                thread_ids: vec![ThreadId::from("a"), ThreadId::from("zzz"), ThreadId::from("a")],
            },
        );
        assert_eq!(
            state.thread_ids.iter().cloned().collect::<Vec<_>>(),
            vec![ThreadId::from("a"), ThreadId::from("c"), ThreadId::from("b")]
        );
    }

    #[test]
    fn test_merge_participant_and_small_setters() {
        let state = add_thread(&ThreadsState::new(), "t", "ext-t");
        let id = ThreadId::from("t");
        let state = reduce(
            &state,
            Action::MergeParticipant {
                thread_id: id.clone(),
                participant: Participant::new("bob", Some(at(10))),
            },
        );
        let state = reduce(&state, Action::SetSubscribed { thread_id: id.clone(), subscribed: false });
        let state = reduce(
            &state,
            Action::SetTypingUsers { thread_id: id.clone(), typing_users: vec![UserRef::new("bob", "bob")] },
        );
        let state = reduce(
            &state,
            Action::AddFirstMessageOfLoad { thread_id: id.clone(), message_id: MessageId::from("t-root") },
        );
        let state = reduce(
            &state,
            Action::AddExternalIdMapping { external_thread_id: "later".into(), thread_id: ThreadId::from("pre") },
        );

        let thread = get(&state, "t");
        assert_eq!(thread.participants.len(), 1);
        assert!(!thread.subscribed);
        assert_eq!(thread.typing_users.len(), 1);
        assert!(thread.first_message_ids_of_load.contains(&MessageId::from("t-root")));
        assert_eq!(state.internal_thread_id("later"), Some(ThreadId::from("pre")));
    }

    #[test]
    fn test_merge_thread_action_replaces_optimistic_thread() {
        let state = add_thread(&ThreadsState::new(), "optimistic-1", "ext-t");
        let mut server = ThreadSnapshot::new("t", "ext-t");
        server.messages = vec![message("t", "root", "alice", 0)];
        let state = reduce(
            &state,
            Action::MergeThread { thread: server, mode: MergeMode::Reconcile },
        );

        assert_eq!(state.len(), 1);
        assert_eq!(state.thread_by_external_id("ext-t").map(|t| t.id.clone()), Some(ThreadId::from("t")));
        assert!(state.local_only_thread_ids.is_empty());
    }
}
