//! Strongly-typed identifiers for partydj

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Characters that cannot appear in a realtime-store key
const STORE_UNSAFE: [char; 6] = ['.', '#', '$', '[', ']', '/'];

/// Room code alphabet: uppercase and digits without look-alikes (I, O, 0, 1)
const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of freshly generated room codes
pub const ROOM_CODE_LEN: usize = 5;

/// Replace characters the store rejects in keys with `_`
pub fn sanitize_key(raw: &str) -> String {
    raw.chars()
        .map(|c| if STORE_UNSAFE.contains(&c) || c.is_control() { '_' } else { c })
        .collect()
}

/// Short, human-shareable room identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoomCode(String);

impl RoomCode {
    /// Mint a new random room code
    pub fn generate() -> Self {
        let bytes = Uuid::new_v4().into_bytes();
        let code = bytes
            .iter()
            .take(ROOM_CODE_LEN)
            .map(|b| ROOM_CODE_ALPHABET[(*b as usize) % ROOM_CODE_ALPHABET.len()] as char)
            .collect();
        Self(code)
    }

    /// Normalise a user-entered code: trims, uppercases, and requires
    /// 4 to 8 ASCII alphanumerics.
    pub fn parse(input: &str) -> Option<Self> {
        let code = input.trim().to_ascii_uppercase();
        let valid_len = (4..=8).contains(&code.len());
        if valid_len && code.chars().all(|c| c.is_ascii_alphanumeric()) {
            Some(Self(code))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one connected browser instance (keys the presence map)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(String);

impl ClientId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical queue item identity; doubles as the dedup key and the store key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(String);

impl ItemId {
    /// Derive the identity from the provider prefix and its native video id
    pub fn for_video(provider: &str, video_id: &str) -> Self {
        Self(sanitize_key(&format!("{}:{}", provider, video_id.trim())))
    }

    /// Identity of a YouTube video
    pub fn youtube(video_id: &str) -> Self {
        Self::for_video("yt", video_id)
    }

    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Capability token granting host-only actions in one room
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostToken(String);

impl HostToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_raw(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for HostToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Idempotency key for one logical client request
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity a rate limiter keys on: a network address or a local client
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorKey(String);

impl ActorKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ActorKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
