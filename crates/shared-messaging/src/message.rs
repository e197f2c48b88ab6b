//! # Message Envelope
//!
//! The immutable payload + metadata carrier every query and result is built on.
//!
//! ## Immutability
//!
//! - `with_metadata` / `and_metadata` / `with_payload` return new messages.
//! - A message handed to an interceptor stage is never mutated in place, so the
//!   same message may be observed by concurrent stages without locking.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Opaque message identifier used for correlation and tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generate a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from string
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }

    /// Get the underlying UUID
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for MessageId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// String-keyed message metadata.
///
/// Ordered so that logs and serialized forms are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetaData(BTreeMap<String, String>);

impl MetaData {
    /// Empty metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata holding a single entry.
    pub fn with(key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut map = BTreeMap::new();
        map.insert(key.into(), value.into());
        Self(map)
    }

    /// Look up a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// New metadata with the entries of `other` added, overriding on conflict.
    #[must_use]
    pub fn merged_with(&self, other: &MetaData) -> Self {
        let mut map = self.0.clone();
        map.extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MetaData {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Generic immutable message: identifier, payload and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericMessage {
    id: MessageId,
    payload: Value,
    metadata: MetaData,
}

impl GenericMessage {
    /// Wrap a payload in a new message with empty metadata.
    #[must_use]
    pub fn new(payload: Value) -> Self {
        Self::with_parts(MessageId::new(), payload, MetaData::new())
    }

    /// Build a message from explicit parts.
    #[must_use]
    pub fn with_parts(id: MessageId, payload: Value, metadata: MetaData) -> Self {
        Self {
            id,
            payload,
            metadata,
        }
    }

    /// Serialize a typed payload into a message.
    pub fn from_payload<T: Serialize>(payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::to_value(payload)?))
    }

    #[must_use]
    pub fn id(&self) -> MessageId {
        self.id
    }

    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    #[must_use]
    pub fn metadata(&self) -> &MetaData {
        &self.metadata
    }

    /// Take the payload out of the message.
    #[must_use]
    pub fn into_payload(self) -> Value {
        self.payload
    }

    /// Copy of this message whose metadata is replaced by `metadata`.
    #[must_use]
    pub fn with_metadata(&self, metadata: MetaData) -> Self {
        Self {
            id: self.id,
            payload: self.payload.clone(),
            metadata,
        }
    }

    /// Copy of this message with `metadata` merged over the existing entries.
    #[must_use]
    pub fn and_metadata(&self, metadata: &MetaData) -> Self {
        Self {
            id: self.id,
            payload: self.payload.clone(),
            metadata: self.metadata.merged_with(metadata),
        }
    }

    /// Copy of this message carrying a different payload.
    #[must_use]
    pub fn with_payload(&self, payload: Value) -> Self {
        Self {
            id: self.id,
            payload,
            metadata: self.metadata.clone(),
        }
    }
}
