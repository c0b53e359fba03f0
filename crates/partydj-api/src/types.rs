//! Room state records
//!
//! Field names follow the shared store layout (camelCase), since browsers
//! read and write the same paths.

use partydj_util::{EpochMillis, HostToken, ItemId};
use serde::{Deserialize, Serialize};

use crate::SearchHit;

/// One entry in a room's queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: ItemId,
    pub video_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// Display name of the submitter
    #[serde(default)]
    pub added_by: String,
    #[serde(default)]
    pub vote_score: i64,
    #[serde(default)]
    pub added_at: EpochMillis,
}

impl QueueItem {
    /// A freshly submitted item carries the submitter's own vote
    pub fn from_hit(hit: &SearchHit, added_by: impl Into<String>, now: EpochMillis) -> Self {
        Self {
            id: ItemId::youtube(&hit.video_id),
            video_id: hit.video_id.trim().to_string(),
            title: hit.title.clone(),
            thumbnail: hit.thumbnail.clone(),
            added_by: added_by.into(),
            vote_score: 1,
            added_at: now,
        }
    }
}

/// The item currently playing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NowPlaying {
    #[serde(flatten)]
    pub item: QueueItem,
    #[serde(default)]
    pub started_at: EpochMillis,
}

/// Playback control flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    #[serde(default)]
    pub paused: bool,
}

/// Liveness record of one participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntry {
    pub name: String,
    /// Last heartbeat
    pub ts: EpochMillis,
}

/// One chat line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub name: String,
    pub text: String,
    pub ts: EpochMillis,
}

/// Written once when a room is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMeta {
    pub host_token: HostToken,
    pub created_at: EpochMillis,
    pub created_by: String,
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
}

fn default_schema_version() -> u32 {
    crate::SCHEMA_VERSION
}
