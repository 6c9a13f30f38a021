//! Message and thread merge algorithms.
//!
//! Both run through [`crate::reduce`]; the functions here are shorthands
//! for dispatching the matching action against a state value.

pub(crate) mod message;
pub(crate) mod thread;

use cord_shared::types::ThreadId;

use crate::actions::{Action, MergeMessageOptions, MergeMode};
use crate::models::{Message, ThreadSnapshot};
use crate::reducer::reduce;
use crate::state::ThreadsState;

pub fn merge_message(
    state: &ThreadsState,
    thread_id: &ThreadId,
    message: Message,
    options: MergeMessageOptions,
) -> ThreadsState {
    reduce(
        state,
        Action::MergeMessage {
            thread_id: thread_id.clone(),
            message,
            options,
        },
    )
}

pub fn merge_thread(state: &ThreadsState, snapshot: ThreadSnapshot, mode: MergeMode) -> ThreadsState {
    reduce(
        state,
        Action::MergeThread {
            thread: snapshot,
            mode,
        },
    )
}
