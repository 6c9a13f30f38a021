use serde::Serialize;

use cord_shared::types::ThreadId;

/// Emitted on the store's broadcast channel after every dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreEvent {
    /// Tag of the action that produced this version.
    pub action: &'static str,
    #[serde(rename = "threadID")]
    pub thread_id: Option<ThreadId>,
    pub version: u64,
}
