//! In-memory entry log.
//!
//! This is the data the cluster replicates. Entries are only ever appended on
//! the leader; followers swap their whole log for the leader's copy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque file attached to an entry.
///
/// `bytes` travels as a base64 string; every heartbeat carries it again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// A single log entry.
///
/// `index` is the entry's position in the log, assigned when the leader
/// appends it. `created_at` is informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub index: u64,
    pub content: String,
    #[serde(default)]
    pub attachment: Option<Attachment>,
    pub created_at: DateTime<Utc>,
}

/// Ordered sequence of entries.
///
/// The last index is derived from the length, so it can never drift from
/// the entries it describes: `last_index() == len() - 1`, or `-1` when empty.
#[derive(Debug, Clone, Default)]
pub struct LogStore {
    entries: Vec<Entry>,
}

impl LogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_index(&self) -> i64 {
        self.entries.len() as i64 - 1
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    #[cfg(test)]
    pub fn get(&self, index: u64) -> Option<&Entry> {
        self.entries.get(usize::try_from(index).ok()?)
    }

    /// Appends a new entry at `last_index() + 1` and returns a copy of it.
    pub fn append(&mut self, content: String, attachment: Option<Attachment>) -> Entry {
        let entry = Entry {
            index: self.entries.len() as u64,
            content,
            attachment,
            created_at: Utc::now(),
        };
        self.entries.push(entry.clone());
        entry
    }

    /// Replaces the whole log with `entries`.
    pub fn replace(&mut self, entries: Vec<Entry>) {
        self.entries = entries;
    }
}
