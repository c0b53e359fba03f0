//! Store paths and JSON navigation
//!
//! Layout of one room:
//!
//! ```text
//! rooms/{code}/queue/{itemId}      -> QueueItem
//! rooms/{code}/now                 -> NowPlaying | absent
//! rooms/{code}/control             -> { paused }
//! rooms/{code}/skipVotes/{voter}   -> true
//! rooms/{code}/presence/{clientId} -> { name, ts }
//! rooms/{code}/chat/{messageId}    -> { name, text, ts }
//! rooms/{code}/meta                -> RoomMeta
//! rooms/{code}/applied/{requestId} -> { outcome, ts }
//! ```

use partydj_util::{sanitize_key, RoomCode};
use serde_json::{Map, Value};
use std::fmt;

use crate::{StoreError, StoreResult};

pub const ROOMS: &str = "rooms";
pub const QUEUE: &str = "queue";
pub const NOW: &str = "now";
pub const CONTROL: &str = "control";
pub const SKIP_VOTES: &str = "skipVotes";
pub const PRESENCE: &str = "presence";
pub const CHAT: &str = "chat";
pub const META: &str = "meta";
pub const APPLIED: &str = "applied";

/// A location in the store. Always starts with `rooms/{code}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorePath {
    room: RoomCode,
    rest: Vec<String>,
}

impl StorePath {
    /// Root of one room
    pub fn room(code: &RoomCode) -> Self {
        Self {
            room: code.clone(),
            rest: Vec::new(),
        }
    }

    /// Descend one level; the key is sanitized
    pub fn child(&self, key: &str) -> Self {
        let mut rest = self.rest.clone();
        rest.push(sanitize_key(key));
        Self {
            room: self.room.clone(),
            rest,
        }
    }

    /// Parse `rooms/{code}/a/b`
    pub fn parse(text: &str) -> StoreResult<Self> {
        let mut parts = text.split('/').filter(|p| !p.is_empty());
        if parts.next() != Some(ROOMS) {
            return Err(StoreError::InvalidPath(text.to_string()));
        }
        let room = parts
            .next()
            .and_then(RoomCode::parse)
            .ok_or_else(|| StoreError::InvalidPath(text.to_string()))?;
        Ok(Self {
            room,
            rest: parts.map(sanitize_key).collect(),
        })
    }

    pub fn room_code(&self) -> &RoomCode {
        &self.room
    }

    /// Segments below the room root
    pub fn rest(&self) -> &[String] {
        &self.rest
    }

    pub fn is_room_root(&self) -> bool {
        self.rest.is_empty()
    }

    /// Whether `other` is this path or lies beneath it
    pub fn contains(&self, other: &StorePath) -> bool {
        self.room == other.room && other.rest.starts_with(&self.rest)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", ROOMS, self.room)?;
        for segment in &self.rest {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

/// Value at `rest` beneath `doc`
pub fn value_at<'a>(doc: &'a Value, rest: &[String]) -> Option<&'a Value> {
    rest.iter().try_fold(doc, |node, key| node.get(key.as_str()))
}

/// Write `value` at `rest`, creating objects along the way. Writing `null`
/// removes the node.
pub fn set_at(doc: &mut Value, rest: &[String], value: Value) {
    if value.is_null() {
        remove_at(doc, rest);
        return;
    }
    let Some((last, parents)) = rest.split_last() else {
        *doc = value;
        return;
    };

    let mut node = doc;
    for key in parents {
        let Some(map) = ensure_object(node) else {
            return;
        };
        node = map
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if let Some(map) = ensure_object(node) {
        map.insert(last.clone(), value);
    }
}

/// Remove the node at `rest`; empty parent objects are dropped too
pub fn remove_at(doc: &mut Value, rest: &[String]) {
    let Some((first, tail)) = rest.split_first() else {
        *doc = Value::Null;
        return;
    };
    let Some(map) = doc.as_object_mut() else {
        return;
    };
    if tail.is_empty() {
        map.remove(first);
        return;
    }
    if let Some(child) = map.get_mut(first) {
        remove_at(child, tail);
        if is_empty_node(child) {
            map.remove(first);
        }
    }
}

pub fn is_empty_node(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Object view of a node, replacing a scalar with an empty object
fn ensure_object(node: &mut Value) -> Option<&mut Map<String, Value>> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    node.as_object_mut()
}
