//! Audit event types

use chrono::{DateTime, Local};
use partydj_api::AdvanceCause;
use partydj_util::{ClientId, ItemId, RoomCode};
use serde::{Deserialize, Serialize};

/// Types of audit events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Service started
    ServiceStarted,

    /// Service stopped
    ServiceStopped,

    /// Room created by its host
    RoomCreated { created_by: String },

    /// Participant joined a room
    ParticipantJoined { client_id: ClientId, name: String },

    /// Participant left cleanly
    ParticipantLeft { client_id: ClientId },

    /// Stale presence entries removed
    PresenceSwept { removed: usize },

    /// New queue entry
    ItemAdded { item_id: ItemId, added_by: String },

    /// Duplicate submission turned into an upvote
    ItemUpvoted { item_id: ItemId, vote_score: i64 },

    /// Submission refused by policy
    ItemRejected {
        video_id: String,
        submitted_by: String,
        reason: String,
    },

    /// Now-playing slot changed
    QueueAdvanced {
        cause: AdvanceCause,
        item_id: Option<ItemId>,
    },

    /// Host cleared the queue
    QueueCleared { removed: usize },

    /// Host paused or resumed playback
    PauseChanged { paused: bool },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Local>,

    /// Room the event belongs to, if any
    pub room: Option<RoomCode>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp: partydj_util::now(),
            room: None,
            event,
        }
    }

    pub fn for_room(room: &RoomCode, event: AuditEventType) -> Self {
        Self {
            room: Some(room.clone()),
            ..Self::new(event)
        }
    }
}
