//! Decoded room state
//!
//! The store holds whatever browsers wrote, so decoding never fails: a
//! malformed entry is skipped with a warning and a malformed section falls
//! back to empty. Unknown top-level sections are carried through untouched
//! when the state is written back.

use partydj_api::{
    ChatMessage, Control, NowPlaying, PresenceEntry, QueueItem, RoomMeta, SubmitOutcome,
};
use partydj_store::{APPLIED, CHAT, CONTROL, META, NOW, PRESENCE, QUEUE, SKIP_VOTES};
use partydj_util::{elapsed_ms, ClientId, EpochMillis, ItemId, RoomCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

use crate::{active_set, required_votes, select_next, sorted_queue, SkipVotes};

/// How long a submit request id is remembered for retries
pub const APPLIED_TTL_MS: i64 = 10 * 60 * 1000;

/// Upper bound on remembered request ids per room
pub const APPLIED_MAX: usize = 500;

/// Outcome of a request already applied to the room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedRequest {
    pub outcome: SubmitOutcome,
    pub ts: EpochMillis,
}

/// Everything stored under `rooms/{code}`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomState {
    pub queue: BTreeMap<ItemId, QueueItem>,
    pub now: Option<NowPlaying>,
    pub control: Control,
    pub skip_votes: SkipVotes,
    pub presence: BTreeMap<ClientId, PresenceEntry>,
    pub chat: BTreeMap<String, ChatMessage>,
    pub meta: Option<RoomMeta>,
    pub applied: BTreeMap<String, AppliedRequest>,
    extra: Map<String, Value>,
}

impl RoomState {
    /// Decode the room document
    pub fn from_value(room: &RoomCode, value: Option<&Value>) -> Self {
        let mut state = Self::default();
        let Some(Value::Object(doc)) = value else {
            if value.is_some_and(|v| !v.is_null()) {
                warn!(room = %room, "Room document is not an object, treating as empty");
            }
            return state;
        };

        for (key, section) in doc {
            match key.as_str() {
                QUEUE => {
                    state.queue = decode_map(room, QUEUE, section)
                        .into_iter()
                        .filter_map(|(key, mut item): (String, QueueItem)| {
                            if item.video_id.trim().is_empty() {
                                warn!(room = %room, item = %key, "Queue item without video id");
                                return None;
                            }
                            let id = ItemId::from_raw(key);
                            item.id = id.clone();
                            Some((id, item))
                        })
                        .collect();
                }
                NOW => state.now = decode_one(room, NOW, section),
                CONTROL => state.control = decode_one(room, CONTROL, section).unwrap_or_default(),
                SKIP_VOTES => {
                    state.skip_votes = section
                        .as_object()
                        .map(|votes| {
                            votes
                                .iter()
                                .filter(|(_, v)| v.as_bool() != Some(false))
                                .map(|(voter, _)| voter.clone())
                                .collect()
                        })
                        .unwrap_or_default();
                }
                PRESENCE => {
                    state.presence = decode_map(room, PRESENCE, section)
                        .into_iter()
                        .map(|(key, entry)| (ClientId::from_raw(key), entry))
                        .collect();
                }
                CHAT => state.chat = decode_map(room, CHAT, section),
                META => state.meta = decode_one(room, META, section),
                APPLIED => state.applied = decode_map(room, APPLIED, section),
                _ => {
                    state.extra.insert(key.clone(), section.clone());
                }
            }
        }

        state
    }

    /// Encode back into the store layout; empty sections are omitted
    pub fn to_value(&self) -> Value {
        let mut doc = self.extra.clone();

        insert_map(
            &mut doc,
            QUEUE,
            self.queue
                .iter()
                .map(|(id, item)| (id.as_str().to_string(), to_json(item))),
        );
        if let Some(now) = &self.now {
            doc.insert(NOW.into(), to_json(now));
        }
        if self.control != Control::default() {
            doc.insert(CONTROL.into(), to_json(&self.control));
        }
        insert_map(
            &mut doc,
            SKIP_VOTES,
            self.skip_votes
                .voters()
                .map(|voter| (voter.to_string(), Value::Bool(true))),
        );
        insert_map(
            &mut doc,
            PRESENCE,
            self.presence
                .iter()
                .map(|(id, entry)| (id.as_str().to_string(), to_json(entry))),
        );
        insert_map(
            &mut doc,
            CHAT,
            self.chat.iter().map(|(id, msg)| (id.clone(), to_json(msg))),
        );
        if let Some(meta) = &self.meta {
            doc.insert(META.into(), to_json(meta));
        }
        insert_map(
            &mut doc,
            APPLIED,
            self.applied.iter().map(|(id, req)| (id.clone(), to_json(req))),
        );

        Value::Object(doc)
    }

    /// Start the next item in play order, clearing skip votes.
    ///
    /// With an empty queue the now-playing slot is cleared. Returns the id
    /// of the item that started.
    pub fn advance(&mut self, now: EpochMillis) -> Option<ItemId> {
        let next_id = select_next(self.queue.values()).map(|item| item.id.clone());
        self.skip_votes.clear();

        let Some(next) = next_id.and_then(|id| self.queue.remove(&id)) else {
            self.now = None;
            return None;
        };

        let id = next.id.clone();
        self.now = Some(NowPlaying {
            item: next,
            started_at: now,
        });
        Some(id)
    }

    /// Remember a request's outcome and forget expired ones
    pub fn record_applied(&mut self, request_id: &str, outcome: SubmitOutcome, now: EpochMillis) {
        self.applied
            .retain(|_, req| elapsed_ms(now, req.ts) <= APPLIED_TTL_MS);
        while self.applied.len() >= APPLIED_MAX {
            let oldest = self
                .applied
                .iter()
                .min_by_key(|(_, req)| req.ts)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(id) => self.applied.remove(&id),
                None => break,
            };
        }
        self.applied.insert(
            request_id.to_string(),
            AppliedRequest {
                outcome,
                ts: now,
            },
        );
    }

    /// Previously applied outcome for `request_id`, if still remembered
    pub fn applied_outcome(&self, request_id: &str) -> Option<&SubmitOutcome> {
        self.applied.get(request_id).map(|req| &req.outcome)
    }
}

/// One active participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Participant {
    pub client_id: ClientId,
    pub name: String,
}

/// What a participant's screen shows, derived from the last snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomView {
    pub room: RoomCode,
    pub now_playing: Option<NowPlaying>,
    /// In play order
    pub queue: Vec<QueueItem>,
    pub participants: Vec<Participant>,
    pub skip_votes: usize,
    pub skip_required: usize,
    pub paused: bool,
    /// Oldest first
    pub chat: Vec<ChatMessage>,
    pub is_host: bool,
}

impl RoomView {
    pub fn project(
        room: &RoomCode,
        state: &RoomState,
        now: EpochMillis,
        stale_ms: u64,
        is_host: bool,
    ) -> Self {
        let active = active_set(&state.presence, now, stale_ms);
        let participants = active
            .iter()
            .filter_map(|id| {
                state.presence.get(id).map(|entry| Participant {
                    client_id: id.clone(),
                    name: entry.name.clone(),
                })
            })
            .collect();

        Self {
            room: room.clone(),
            now_playing: state.now.clone(),
            queue: sorted_queue(state.queue.values()),
            participants,
            skip_votes: state.skip_votes.len(),
            skip_required: required_votes(active.len()),
            paused: state.control.paused,
            chat: state.chat.values().cloned().collect(),
            is_host,
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn insert_map(doc: &mut Map<String, Value>, key: &str, entries: impl Iterator<Item = (String, Value)>) {
    let map: Map<String, Value> = entries.collect();
    if !map.is_empty() {
        doc.insert(key.to_string(), Value::Object(map));
    }
}

fn decode_one<T: DeserializeOwned>(room: &RoomCode, section: &str, value: &Value) -> Option<T> {
    match serde_json::from_value(value.clone()) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            warn!(room = %room, section, error = %e, "Malformed room section");
            None
        }
    }
}

fn decode_map<T: DeserializeOwned>(
    room: &RoomCode,
    section: &str,
    value: &Value,
) -> BTreeMap<String, T> {
    let Some(entries) = value.as_object() else {
        warn!(room = %room, section, "Room section is not a map");
        return BTreeMap::new();
    };

    entries
        .iter()
        .filter_map(|(key, entry)| match serde_json::from_value(entry.clone()) {
            Ok(decoded) => Some((key.clone(), decoded)),
            Err(e) => {
                warn!(room = %room, section, key = %key, error = %e, "Skipping malformed entry");
                None
            }
        })
        .collect()
}
