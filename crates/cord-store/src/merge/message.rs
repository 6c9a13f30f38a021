use tracing::debug;

use cord_shared::types::ThreadId;

use crate::actions::MergeMessageOptions;
use crate::models::{insertion_index, push_unique, Message, Thread};
use crate::state::ThreadsState;

/// Merge one message into its thread.
///
/// A message already present (by internal ID) is replaced in place and
/// nothing else changes. Otherwise it is inserted in timestamp order, after
/// any messages with the same timestamp. An update that arrives before its
/// insert is therefore treated as the insert, and the later insert as the
/// update.
pub(crate) fn merge_message_into(
    state: &mut ThreadsState,
    thread_id: &ThreadId,
    message: Message,
    options: MergeMessageOptions,
) -> bool {
    let external_id = message.external_id.clone();
    let merged = state.update_thread(thread_id, |thread| {
        merge_into_thread(thread, message, options);
    });

    if merged {
        state
            .message_external_id_map
            .insert(external_id, thread_id.clone());
    } else {
        debug!(thread_id = %thread_id, "merge-message for unknown thread ignored");
    }
    merged
}

/// Returns `true` if the message was inserted rather than replaced.
pub(crate) fn merge_into_thread(
    thread: &mut Thread,
    message: Message,
    options: MergeMessageOptions,
) -> bool {
    if let Some(index) = thread.position_from_end(&message.id) {
        thread.messages.set(index, message);
        return false;
    }

    let author = message.source.id.clone();
    let message_id = message.id.clone();
    let is_action = message.is_action_message();

    let index = insertion_index(&thread.messages, &message.timestamp);
    thread.messages.insert(index, message);

    if options.is_new_message {
        thread.all_messages_count += 1;
        if thread.all_messages_count > 1 {
            thread.reply_count += 1;
        }
        if is_action {
            thread.action_messages_count += 1;
        } else {
            thread.user_messages_count += 1;
        }
        thread.messages_count_excluding_deleted += 1;

        if options.viewer_is_author {
            thread.new_messages_count = 0;
            thread.first_unseen_message_id = None;
            thread.has_new_messages = false;
        } else {
            thread.new_messages_count += 1;
            thread.first_unseen_message_id.get_or_insert(message_id);
            thread.has_new_messages = true;
        }
    }

    push_unique(&mut thread.replying_user_ids, &author);
    if is_action {
        push_unique(&mut thread.action_message_replying_user_ids, &author);
    }

    thread.all_messages_count = thread.all_messages_count.max(thread.messages.len() as u32);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ThreadSnapshot;
    use crate::state::Placement;
    use chrono::{DateTime, TimeZone, Utc};
    use cord_shared::types::{MessageId, MessageType, UserId, UserRef};
    use rand::seq::SliceRandom;
    use std::sync::Arc;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn message(id: &str, author: &str, secs: i64) -> Message {
        Message::new(id, ThreadId::from("t"), UserRef::new(author, author), at(secs))
    }

    fn state_with_root() -> ThreadsState {
        let mut snapshot = ThreadSnapshot::new("t", "ext-t");
        snapshot.messages = vec![message("root", "alice", 0)];
        snapshot.all_messages_count = 1;
        snapshot.user_messages_count = 1;
        snapshot.messages_count_excluding_deleted = 1;
        snapshot.replying_user_ids = vec![UserId::from("alice")];

        let mut state = ThreadsState::new();
        state.insert_thread(Thread::from_snapshot(snapshot), Placement::Back);
        state
    }

    fn thread(state: &ThreadsState) -> Arc<Thread> {
        state.threads[&ThreadId::from("t")].clone()
    }

    fn ids(thread: &Thread) -> Vec<String> {
        thread.messages.iter().map(|m| m.id.to_string()).collect()
    }

    #[test]
    fn test_new_message_from_other_user_counts_as_unseen() {
        let mut state = state_with_root();
        let inserted = merge_message_into(
            &mut state,
            &ThreadId::from("t"),
            message("m1", "bob", 10),
            MergeMessageOptions::new_message(false),
        );
        assert!(inserted);

        let t = thread(&state);
        assert_eq!(t.all_messages_count, 2);
        assert_eq!(t.reply_count, 1);
        assert_eq!(t.user_messages_count, 2);
        assert_eq!(t.messages_count_excluding_deleted, 2);
        assert_eq!(t.new_messages_count, 1);
        assert_eq!(t.first_unseen_message_id, Some(MessageId::from("m1")));
        assert!(t.has_new_messages);
        assert_eq!(
            t.replying_user_ids,
            vec![UserId::from("alice"), UserId::from("bob")]
        );
        assert_eq!(state.message_external_id_map["cord:m1"], ThreadId::from("t"));
    }

    #[test]
    fn test_first_unseen_keeps_earliest() {
        let mut state = state_with_root();
        let id = ThreadId::from("t");
        merge_message_into(&mut state, &id, message("m1", "bob", 10), MergeMessageOptions::new_message(false));
        merge_message_into(&mut state, &id, message("m2", "bob", 20), MergeMessageOptions::new_message(false));

        let t = thread(&state);
        assert_eq!(t.new_messages_count, 2);
        assert_eq!(t.first_unseen_message_id, Some(MessageId::from("m1")));
    }

    #[test]
    fn test_viewer_authored_message_resets_unseen() {
        let mut state = state_with_root();
        let id = ThreadId::from("t");
        merge_message_into(&mut state, &id, message("m1", "bob", 10), MergeMessageOptions::new_message(false));
        merge_message_into(&mut state, &id, message("m2", "alice", 20), MergeMessageOptions::new_message(true));

        let t = thread(&state);
        assert_eq!(t.new_messages_count, 0);
        assert_eq!(t.first_unseen_message_id, None);
        assert!(!t.has_new_messages);
        assert_eq!(t.all_messages_count, 3);
    }

    #[test]
    fn test_duplicate_merge_is_idempotent() {
        let mut state = state_with_root();
        let id = ThreadId::from("t");
        let m = message("m1", "bob", 10);
        merge_message_into(&mut state, &id, m.clone(), MergeMessageOptions::new_message(false));
        let once = thread(&state);

        merge_message_into(&mut state, &id, m, MergeMessageOptions::new_message(false));
        let twice = thread(&state);

        assert_eq!(*once, *twice);
    }

    #[test]
    fn test_duplicate_replaces_in_place() {
        let mut state = state_with_root();
        let id = ThreadId::from("t");
        merge_message_into(&mut state, &id, message("m1", "bob", 10), MergeMessageOptions::new_message(false));
        merge_message_into(&mut state, &id, message("m2", "bob", 20), MergeMessageOptions::new_message(false));

        let mut edited = message("m1", "bob", 10);
        edited.content = serde_json::json!([{ "type": "p", "children": [{ "text": "edited" }] }]);
        merge_message_into(&mut state, &id, edited.clone(), MergeMessageOptions::new_message(false));

        let t = thread(&state);
        assert_eq!(ids(&t), vec!["root", "m1", "m2"]);
        assert_eq!(t.messages[1].content, edited.content);
        assert_eq!(t.all_messages_count, 3);
    }

    #[test]
    fn test_history_merge_does_not_move_counters() {
        let mut state = state_with_root();
        merge_message_into(
            &mut state,
            &ThreadId::from("t"),
            message("old", "bob", 5),
            MergeMessageOptions::history(),
        );

        let t = thread(&state);
        assert_eq!(t.reply_count, 0);
        assert_eq!(t.new_messages_count, 0);
        assert_eq!(t.all_messages_count, 2);
        assert_eq!(ids(&t), vec!["root", "old"]);
    }

    #[test]
    fn test_history_insert_keeps_reply_count() {
        // History raises the loaded total, only the new reply counts as one.
        let mut state = state_with_root();
        let id = ThreadId::from("t");
        merge_message_into(&mut state, &id, message("old", "bob", 5), MergeMessageOptions::history());
        merge_message_into(
            &mut state,
            &id,
            message("m1", "bob", 10),
            MergeMessageOptions::new_message(false),
        );

        let t = thread(&state);
        assert_eq!(ids(&t), vec!["root", "old", "m1"]);
        assert_eq!(t.all_messages_count, 3);
        assert_eq!(t.reply_count, 1);
        assert_eq!(t.new_messages_count, 1);
        assert_eq!(t.first_unseen_message_id, Some(MessageId::from("m1")));
    }

    #[test]
    fn test_equal_timestamps_keep_arrival_order() {
        let mut state = state_with_root();
        let id = ThreadId::from("t");
        for name in ["x", "y", "z"] {
            merge_message_into(&mut state, &id, message(name, "bob", 10), MergeMessageOptions::new_message(false));
        }
        assert_eq!(ids(&thread(&state)), vec!["root", "x", "y", "z"]);
    }

    #[test]
    fn test_any_arrival_order_yields_sorted_list() {
        let mut rng = rand::thread_rng();
        let mut batch: Vec<Message> = (1..=40)
            .map(|i| message(&format!("m{i:02}"), "bob", i))
            .collect();

        for _ in 0..20 {
            batch.shuffle(&mut rng);
            let mut state = state_with_root();
            for m in &batch {
                merge_message_into(&mut state, &ThreadId::from("t"), m.clone(), MergeMessageOptions::new_message(false));
            }

            let t = thread(&state);
            let timestamps: Vec<_> = t.messages.iter().map(|m| m.timestamp).collect();
            let mut sorted = timestamps.clone();
            sorted.sort();
            assert_eq!(timestamps, sorted);
            assert_eq!(t.all_messages_count, 41);
            assert_eq!(t.reply_count, 40);
        }
    }

    #[test]
    fn test_update_before_insert_is_treated_as_insert() {
        let mut state = state_with_root();
        let id = ThreadId::from("t");

        let mut update = message("m1", "bob", 10);
        update.content = serde_json::json!("updated");
        merge_message_into(&mut state, &id, update.clone(), MergeMessageOptions::history());

        merge_message_into(&mut state, &id, message("m1", "bob", 10), MergeMessageOptions::new_message(false));

        let t = thread(&state);
        assert_eq!(t.messages.len(), 2);
        assert_eq!(t.reply_count, 0);
        assert_eq!(t.new_messages_count, 0);
        assert_eq!(t.messages[1].content, serde_json::Value::Array(vec![]));
    }

    #[test]
    fn test_action_message_tracks_action_repliers() {
        let mut state = state_with_root();
        let mut m = message("a1", "bot", 10);
        m.message_type = MessageType::ActionMessage;
        merge_message_into(&mut state, &ThreadId::from("t"), m, MergeMessageOptions::new_message(false));

        let t = thread(&state);
        assert_eq!(t.action_messages_count, 1);
        assert_eq!(t.user_messages_count, 1);
        assert_eq!(t.action_message_replying_user_ids, vec![UserId::from("bot")]);
    }

    #[test]
    fn test_unknown_thread_is_noop() {
        let mut state = state_with_root();
        let before = state.clone();
        let merged = merge_message_into(
            &mut state,
            &ThreadId::from("missing"),
            message("m1", "bob", 10),
            MergeMessageOptions::new_message(false),
        );
        assert!(!merged);
        assert!(Arc::ptr_eq(
            &before.threads[&ThreadId::from("t")],
            &state.threads[&ThreadId::from("t")]
        ));
        assert!(!state.message_external_id_map.contains_key("cord:m1"));
    }
}
