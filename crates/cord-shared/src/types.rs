use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::INTERNAL_ID_PREFIX;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

opaque_id!(
    /// Internal thread identifier, stable for the lifetime of the thread.
    ThreadId
);
opaque_id!(
    /// Internal message identifier.
    MessageId
);
opaque_id!(
    /// Internal user identifier.
    UserId
);
opaque_id!(ReactionId);
opaque_id!(
    /// Group (organization) a thread belongs to, by external ID.
    GroupId
);

/// Returns the internal ID named by an externalised ID (`cord:<id>`), if any.
pub fn extract_internal_id(external_id: &str) -> Option<&str> {
    external_id
        .strip_prefix(INTERNAL_ID_PREFIX)
        .filter(|id| !id.is_empty())
}

/// Builds the externalised form of an internal ID.
pub fn externalize_id(id: &str) -> String {
    format!("{INTERNAL_ID_PREFIX}{id}")
}

/// Reference to a user as it appears on messages and participants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub id: UserId,
    pub external_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl UserRef {
    pub fn new(id: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            id: UserId::new(id),
            external_id: external_id.into(),
            display_name: None,
        }
    }
}

/// The user on whose behalf the local store is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewer {
    pub user_id: UserId,
    pub external_id: String,
}

impl Viewer {
    pub fn new(user_id: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            user_id: UserId::new(user_id),
            external_id: external_id.into(),
        }
    }

    /// Authorship is decided on external IDs, which survive optimistic
    /// messages whose internal author ID is not known yet.
    pub fn is_author_of(&self, author: &UserRef) -> bool {
        author.external_id == self.external_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    UserMessage,
    ActionMessage,
}

/// A single value inside a [`Location`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocationValue {
    Bool(bool),
    Number(serde_json::Number),
    String(String),
}

impl From<&LocationValue> for serde_json::Value {
    fn from(v: &LocationValue) -> Self {
        match v {
            LocationValue::Bool(b) => serde_json::Value::Bool(*b),
            LocationValue::Number(n) => serde_json::Value::Number(n.clone()),
            LocationValue::String(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl From<&str> for LocationValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<i64> for LocationValue {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<i32> for LocationValue {
    fn from(n: i32) -> Self {
        Self::Number(n.into())
    }
}

impl From<bool> for LocationValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Flat structured key describing where a thread lives in the host app.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(pub BTreeMap<String, LocationValue>);

impl Location {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<LocationValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True iff every key/value pair of `other` is present in `self`.
    pub fn contains(&self, other: &Location) -> bool {
        other
            .0
            .iter()
            .all(|(key, value)| self.0.get(key) == Some(value))
    }

    /// Deterministic JSON rendering, keys in sorted order.
    pub fn canonical_key(&self) -> String {
        let map: serde_json::Map<String, serde_json::Value> = self
            .0
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
            .collect();
        serde_json::Value::Object(map).to_string()
    }
}

/// Developer-supplied flat metadata attached to threads and messages.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// True iff every entry of `filter` is present with an equal value in `metadata`.
pub fn metadata_contains(metadata: &Metadata, filter: &Metadata) -> bool {
    filter
        .iter()
        .all(|(key, value)| metadata.get(key) == Some(value))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolvedStatus {
    #[default]
    Any,
    Resolved,
    Unresolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewerThreadStatus {
    Subscribed,
    Mentioned,
}
