//! Room client
//!
//! One participant's handle on a room. Every mutation that depends on the
//! current state runs inside a store transaction; the client never keeps
//! its own copy of room state, and [`RoomClient::view`] is always a fresh
//! projection of what the store holds.

use partydj_api::{
    AdvanceCause, AdvanceOutcome, ChatMessage, Control, RoomMeta, SearchHit, SearchRequest,
    SkipOutcome, SubmitOutcome, VoteDirection, SCHEMA_VERSION,
};
use partydj_config::RoomSettings;
use partydj_store::{
    AuditEvent, AuditEventType, RoomStore, StoreChange, StoreError, StorePath, TxAction, CHAT,
    META, PRESENCE, QUEUE,
};
use partydj_util::{ClientId, Clock, EpochMillis, HostToken, ItemId, RequestId, RoomCode};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    active_count, required_votes, should_skip, submit_or_upvote, RoomState, RoomView,
    SearchBackend, SearchError, SearchGate, SearchOutcome, DEFAULT_NAME,
};

/// Display name used for items queued automatically
pub const AUTO_DJ_NAME: &str = "Auto DJ";

/// Attempts at finding an unused room code
const CREATE_ATTEMPTS: usize = 8;

/// Room client errors
#[derive(Debug, Error)]
pub enum RoomError {
    #[error("Invalid room code: {0}")]
    InvalidRoomCode(String),

    #[error("Room not found: {0}")]
    RoomNotFound(RoomCode),

    #[error("Only the host can {0}")]
    NotHost(&'static str),

    #[error("Could not allocate an unused room code")]
    CodeExhausted,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),
}

pub type RoomResult<T> = Result<T, RoomError>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn clean_name(name: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        DEFAULT_NAME.to_string()
    } else {
        name.to_string()
    }
}

/// A participant's connection to one room
pub struct RoomClient {
    store: Arc<dyn RoomStore>,
    clock: Arc<dyn Clock>,
    settings: RoomSettings,
    room: RoomCode,
    client_id: ClientId,
    name: RwLock<String>,
    host_token: Option<HostToken>,
    gate: Mutex<SearchGate>,
    heartbeat_task: Mutex<Option<JoinHandle<()>>>,
}

impl RoomClient {
    fn new(
        store: Arc<dyn RoomStore>,
        clock: Arc<dyn Clock>,
        settings: RoomSettings,
        room: RoomCode,
        name: &str,
        host_token: Option<HostToken>,
    ) -> Self {
        let gate = SearchGate::new(settings.search_rate_limit);
        Self {
            store,
            clock,
            settings,
            room,
            client_id: ClientId::new(),
            name: RwLock::new(clean_name(name)),
            host_token,
            gate: Mutex::new(gate),
            heartbeat_task: Mutex::new(None),
        }
    }

    /// Create a new room and join it as host
    pub fn create(
        store: Arc<dyn RoomStore>,
        clock: Arc<dyn Clock>,
        settings: RoomSettings,
        host_name: &str,
    ) -> RoomResult<Self> {
        let host_name = clean_name(host_name);
        let token = HostToken::new();

        for _ in 0..CREATE_ATTEMPTS {
            let room = RoomCode::generate();
            let meta = RoomMeta {
                host_token: token.clone(),
                created_at: clock.now_millis(),
                created_by: host_name.clone(),
                schema_version: SCHEMA_VERSION,
            };
            let meta_value = serde_json::to_value(&meta)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;

            let path = StorePath::room(&room).child(META);
            let commit = store.transaction(&path, &mut |current| match current {
                Some(_) => TxAction::Abort,
                None => TxAction::Set(meta_value.clone()),
            })?;
            if !commit.committed {
                debug!(room = %room, "Room code taken, retrying");
                continue;
            }

            let _ = store.append_audit(AuditEvent::for_room(
                &room,
                AuditEventType::RoomCreated {
                    created_by: host_name.clone(),
                },
            ));
            info!(room = %room, host = %host_name, "Room created");

            let client = Self::new(store, clock, settings, room, &host_name, Some(token));
            client.announce_join()?;
            return Ok(client);
        }

        Err(RoomError::CodeExhausted)
    }

    /// Join an existing room by its (user-entered) code
    pub fn join(
        store: Arc<dyn RoomStore>,
        clock: Arc<dyn Clock>,
        settings: RoomSettings,
        code: &str,
        name: &str,
    ) -> RoomResult<Self> {
        let room =
            RoomCode::parse(code).ok_or_else(|| RoomError::InvalidRoomCode(code.to_string()))?;

        if store.get(&StorePath::room(&room).child(META))?.is_none() {
            return Err(RoomError::RoomNotFound(room));
        }

        let client = Self::new(store, clock, settings, room, name, None);
        client.announce_join()?;
        Ok(client)
    }

    /// Present a host token kept from an earlier session
    pub fn with_host_token(mut self, token: HostToken) -> Self {
        self.host_token = Some(token);
        self
    }

    fn announce_join(&self) -> RoomResult<()> {
        self.heartbeat()?;
        let name = self.name();
        let _ = self.store.append_audit(AuditEvent::for_room(
            &self.room,
            AuditEventType::ParticipantJoined {
                client_id: self.client_id.clone(),
                name: name.clone(),
            },
        ));
        info!(room = %self.room, client_id = %self.client_id, name = %name, "Joined room");
        Ok(())
    }

    pub fn room(&self) -> &RoomCode {
        &self.room
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn name(&self) -> String {
        self.name
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Token to keep for rejoining as host
    pub fn host_token(&self) -> Option<&HostToken> {
        self.host_token.as_ref()
    }

    pub fn settings(&self) -> &RoomSettings {
        &self.settings
    }

    fn root(&self) -> StorePath {
        StorePath::room(&self.room)
    }

    fn now(&self) -> EpochMillis {
        self.clock.now_millis()
    }

    fn audit(&self, event: AuditEventType) {
        if let Err(e) = self
            .store
            .append_audit(AuditEvent::for_room(&self.room, event))
        {
            warn!(room = %self.room, error = %e, "Failed to append audit event");
        }
    }

    // Presence

    /// Refresh this participant's presence entry
    pub fn heartbeat(&self) -> RoomResult<()> {
        let path = self.root().child(PRESENCE).child(self.client_id.as_str());
        self.store
            .set(&path, json!({ "name": self.name(), "ts": self.now() }))?;
        Ok(())
    }

    /// Heartbeat every `heartbeat_ms` until [`RoomClient::leave`] or drop
    pub fn start_heartbeat(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.settings.heartbeat_interval();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(client) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = client.heartbeat() {
                    warn!(room = %client.room, error = %e, "Heartbeat failed");
                }
            }
        });

        if let Some(previous) = lock(&self.heartbeat_task).replace(task) {
            previous.abort();
        }
    }

    fn stop_heartbeat(&self) {
        if let Some(task) = lock(&self.heartbeat_task).take() {
            task.abort();
        }
    }

    /// Change display name and beat immediately
    pub fn rename(&self, name: &str) -> RoomResult<()> {
        *self.name.write().unwrap_or_else(PoisonError::into_inner) = clean_name(name);
        self.heartbeat()
    }

    /// Stop heartbeating and remove this participant's presence entry
    pub fn leave(&self) -> RoomResult<()> {
        self.stop_heartbeat();
        let path = self.root().child(PRESENCE).child(self.client_id.as_str());
        self.store.remove(&path)?;
        self.audit(AuditEventType::ParticipantLeft {
            client_id: self.client_id.clone(),
        });
        info!(room = %self.room, client_id = %self.client_id, "Left room");
        Ok(())
    }

    // Queue

    /// Submit a search hit under a fresh request id
    pub fn submit(&self, hit: &SearchHit) -> RoomResult<SubmitOutcome> {
        self.submit_with_request(hit, &RequestId::new())
    }

    /// Submit a search hit. Retrying with the same request id returns the
    /// first outcome without applying it again.
    pub fn submit_with_request(
        &self,
        hit: &SearchHit,
        request_id: &RequestId,
    ) -> RoomResult<SubmitOutcome> {
        self.submit_as(hit, &self.name(), request_id)
    }

    fn submit_as(
        &self,
        hit: &SearchHit,
        submitter: &str,
        request_id: &RequestId,
    ) -> RoomResult<SubmitOutcome> {
        let request_key = request_id.to_string();
        let now = self.now();
        let max_per_user = self.settings.max_songs_per_user;
        let mut result: Option<SubmitOutcome> = None;
        let mut missing = false;
        let mut replayed = false;

        self.store.transaction(&self.root(), &mut |current| {
            result = None;
            missing = false;
            replayed = false;
            let mut state = RoomState::from_value(&self.room, current.as_ref());
            if state.meta.is_none() {
                missing = true;
                return TxAction::Abort;
            }
            if let Some(previous) = state.applied_outcome(&request_key) {
                result = Some(previous.clone());
                replayed = true;
                return TxAction::Abort;
            }

            let outcome = submit_or_upvote(
                &mut state.queue,
                state.now.as_mut(),
                hit,
                submitter,
                max_per_user,
                now,
            );
            result = Some(outcome.clone());
            if matches!(outcome, SubmitOutcome::Rejected { .. }) {
                return TxAction::Abort;
            }
            state.record_applied(&request_key, outcome, now);
            TxAction::Set(state.to_value())
        })?;

        if missing {
            return Err(RoomError::RoomNotFound(self.room.clone()));
        }
        let outcome = result.ok_or_else(|| {
            StoreError::Database("transaction produced no outcome".to_string())
        })?;

        if replayed {
            debug!(room = %self.room, request_id = %request_key, "Submit already applied");
            return Ok(outcome);
        }

        match &outcome {
            SubmitOutcome::Added { item_id } => {
                info!(room = %self.room, item_id = %item_id, added_by = %submitter, "Item added");
                self.audit(AuditEventType::ItemAdded {
                    item_id: item_id.clone(),
                    added_by: submitter.to_string(),
                });
            }
            SubmitOutcome::Upvoted {
                item_id,
                vote_score,
            } => {
                info!(room = %self.room, item_id = %item_id, vote_score, "Duplicate submission upvoted");
                self.audit(AuditEventType::ItemUpvoted {
                    item_id: item_id.clone(),
                    vote_score: *vote_score,
                });
            }
            SubmitOutcome::Rejected { reason } => {
                debug!(room = %self.room, submitter = %submitter, ?reason, "Submission rejected");
                self.audit(AuditEventType::ItemRejected {
                    video_id: hit.video_id.clone(),
                    submitted_by: submitter.to_string(),
                    reason: format!("{:?}", reason),
                });
            }
        }

        Ok(outcome)
    }

    /// Vote a queued item up or down. Returns the new score, or `None` if
    /// the item is no longer queued.
    pub fn vote(&self, item_id: &ItemId, direction: VoteDirection) -> RoomResult<Option<i64>> {
        let path = self.root().child(QUEUE).child(item_id.as_str());
        let mut score = None;

        self.store.transaction(&path, &mut |current| {
            score = None;
            let Some(Value::Object(mut item)) = current else {
                return TxAction::Abort;
            };
            let next = item
                .get("voteScore")
                .and_then(Value::as_i64)
                .unwrap_or(0)
                .saturating_add(direction.delta());
            item.insert("voteScore".to_string(), json!(next));
            score = Some(next);
            TxAction::Set(Value::Object(item))
        })?;

        debug!(room = %self.room, item_id = %item_id, ?direction, ?score, "Vote applied");
        Ok(score)
    }

    // Skip votes

    /// Vote to skip the playing item. Reaching quorum advances the queue in
    /// the same transaction.
    pub fn cast_skip_vote(&self) -> RoomResult<SkipOutcome> {
        let voter = self.name();
        let now = self.now();
        let stale_ms = self.settings.presence_stale_ms;
        let mut result = None;

        self.store.transaction(&self.root(), &mut |current| {
            let mut state = RoomState::from_value(&self.room, current.as_ref());
            let Some(playing) = state.now.as_ref().map(|n| n.item.id.clone()) else {
                result = Some(SkipOutcome::NothingPlaying);
                return TxAction::Abort;
            };

            state.skip_votes.cast(&voter);
            let active = active_count(&state.presence, now, stale_ms);
            let votes = state.skip_votes.len();

            if should_skip(votes, active) {
                let next = state.advance(now);
                result = Some(SkipOutcome::Skipped {
                    skipped: playing,
                    next,
                });
            } else {
                result = Some(SkipOutcome::Counted {
                    votes,
                    required: required_votes(active),
                });
            }
            TxAction::Set(state.to_value())
        })?;

        let outcome = result.unwrap_or(SkipOutcome::NothingPlaying);
        if let SkipOutcome::Skipped { skipped, next } = &outcome {
            info!(room = %self.room, skipped = %skipped, next = ?next, "Skip vote reached quorum");
            self.audit(AuditEventType::QueueAdvanced {
                cause: AdvanceCause::VoteSkip,
                item_id: next.clone(),
            });
        }
        Ok(outcome)
    }

    /// Withdraw this participant's skip vote
    pub fn retract_skip_vote(&self) -> RoomResult<SkipOutcome> {
        let voter = self.name();
        let now = self.now();
        let stale_ms = self.settings.presence_stale_ms;
        let mut result = None;

        self.store.transaction(&self.root(), &mut |current| {
            let mut state = RoomState::from_value(&self.room, current.as_ref());
            if state.now.is_none() {
                result = Some(SkipOutcome::NothingPlaying);
                return TxAction::Abort;
            }
            let removed = state.skip_votes.retract(&voter);
            result = Some(SkipOutcome::Counted {
                votes: state.skip_votes.len(),
                required: required_votes(active_count(&state.presence, now, stale_ms)),
            });
            if removed {
                TxAction::Set(state.to_value())
            } else {
                TxAction::Abort
            }
        })?;

        Ok(result.unwrap_or(SkipOutcome::NothingPlaying))
    }

    // Host actions

    /// Run a host-only room transaction. The token is compared with the one
    /// recorded in room meta inside the transaction.
    fn host_transaction<T>(
        &self,
        action: &'static str,
        mut apply: impl FnMut(&mut RoomState) -> Option<T>,
    ) -> RoomResult<T> {
        let Some(token) = self.host_token.clone() else {
            return Err(RoomError::NotHost(action));
        };
        let mut result = None;
        let mut missing = false;
        let mut denied = false;

        self.store.transaction(&self.root(), &mut |current| {
            result = None;
            missing = false;
            denied = false;
            let mut state = RoomState::from_value(&self.room, current.as_ref());
            match &state.meta {
                None => {
                    missing = true;
                    return TxAction::Abort;
                }
                Some(meta) if meta.host_token != token => {
                    denied = true;
                    return TxAction::Abort;
                }
                Some(_) => {}
            }
            match apply(&mut state) {
                Some(value) => {
                    result = Some(value);
                    TxAction::Set(state.to_value())
                }
                None => TxAction::Abort,
            }
        })?;

        if missing {
            return Err(RoomError::RoomNotFound(self.room.clone()));
        }
        if denied {
            warn!(room = %self.room, client_id = %self.client_id, action, "Host token rejected");
            return Err(RoomError::NotHost(action));
        }
        result.ok_or_else(|| StoreError::Database("transaction produced no result".into()).into())
    }

    /// Start the next item in play order
    pub fn advance(&self) -> RoomResult<AdvanceOutcome> {
        let now = self.now();
        let outcome = self.host_transaction("advance the queue", |state| {
            Some(match state.advance(now) {
                Some(item_id) => AdvanceOutcome::Started { item_id },
                None => AdvanceOutcome::QueueEmpty,
            })
        })?;

        let item_id = match &outcome {
            AdvanceOutcome::Started { item_id } => Some(item_id.clone()),
            AdvanceOutcome::QueueEmpty => None,
        };
        info!(room = %self.room, item_id = ?item_id, "Queue advanced by host");
        self.audit(AuditEventType::QueueAdvanced {
            cause: AdvanceCause::Host,
            item_id,
        });
        Ok(outcome)
    }

    /// Remove every queued item. Returns how many were removed.
    pub fn clear_queue(&self) -> RoomResult<usize> {
        let removed = self.host_transaction("clear the queue", |state| {
            let removed = state.queue.len();
            state.queue.clear();
            Some(removed)
        })?;

        info!(room = %self.room, removed, "Queue cleared");
        self.audit(AuditEventType::QueueCleared { removed });
        Ok(removed)
    }

    /// Pause or resume playback
    pub fn set_paused(&self, paused: bool) -> RoomResult<()> {
        self.host_transaction("pause playback", |state| {
            state.control = Control { paused };
            Some(())
        })?;

        debug!(room = %self.room, paused, "Playback control changed");
        self.audit(AuditEventType::PauseChanged { paused });
        Ok(())
    }

    // Chat

    /// Post a chat message. Blank messages are ignored (`None`); long ones
    /// are cut to `chat_max_len` characters. Only the newest `chat_history`
    /// messages are kept.
    pub fn send_chat(&self, text: &str) -> RoomResult<Option<ChatMessage>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let now = self.now();
        let message = ChatMessage {
            name: self.name(),
            text: text.chars().take(self.settings.chat_max_len).collect(),
            ts: now,
        };
        let message_value = serde_json::to_value(&message)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        // Zero-padded timestamp first so keys sort chronologically
        let key = format!(
            "{:013}-{}",
            now.max(0),
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );
        let history = self.settings.chat_history.max(1);

        self.store
            .transaction(&self.root().child(CHAT), &mut |current| {
                let mut chat = match current {
                    Some(Value::Object(map)) => map,
                    _ => serde_json::Map::new(),
                };
                chat.insert(key.clone(), message_value.clone());
                let excess = chat.len().saturating_sub(history);
                if excess > 0 {
                    let mut keys: Vec<String> = chat.keys().cloned().collect();
                    keys.sort();
                    for old in keys.into_iter().take(excess) {
                        chat.remove(&old);
                    }
                }
                TxAction::Set(Value::Object(chat))
            })?;

        Ok(Some(message))
    }

    // Reading

    /// Current room state as this participant should see it
    pub fn view(&self) -> RoomResult<RoomView> {
        let doc = self.store.get(&self.root())?;
        let state = RoomState::from_value(&self.room, doc.as_ref());
        if state.meta.is_none() {
            return Err(RoomError::RoomNotFound(self.room.clone()));
        }

        let is_host = match (&state.meta, &self.host_token) {
            (Some(meta), Some(token)) => &meta.host_token == token,
            _ => false,
        };
        Ok(RoomView::project(
            &self.room,
            &state,
            self.now(),
            self.settings.presence_stale_ms,
            is_host,
        ))
    }

    /// Store change notifications; filter with [`RoomClient::is_own_room`]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.store.subscribe()
    }

    pub fn is_own_room(&self, change: &StoreChange) -> bool {
        change.path.room_code() == &self.room
    }

    // Search

    /// Run a search through the local gate
    pub async fn search(
        &self,
        backend: &dyn SearchBackend,
        request: &SearchRequest,
    ) -> Result<SearchOutcome, SearchError> {
        let begun = lock(&self.gate).begin(self.now());
        let ticket = match begun {
            Ok(ticket) => ticket,
            Err(reason) => {
                debug!(room = %self.room, reason = %reason, "Search rate limited locally");
                return Ok(SearchOutcome::RateLimited(reason));
            }
        };

        let page = backend.search(request).await?;

        let current = lock(&self.gate).is_current(ticket);
        if current {
            Ok(SearchOutcome::Results(page))
        } else {
            debug!(room = %self.room, "Discarding superseded search results");
            Ok(SearchOutcome::Superseded)
        }
    }

    /// Queue a video related to the playing one when the queue is empty.
    ///
    /// Does nothing unless `autofill` is enabled. The item is submitted as
    /// "Auto DJ", so it does not count against anyone's limit.
    pub async fn autofill(&self, backend: &dyn SearchBackend) -> RoomResult<Option<SubmitOutcome>> {
        if !self.settings.autofill {
            return Ok(None);
        }

        let view = self.view()?;
        let Some(playing) = view.now_playing else {
            return Ok(None);
        };
        if !view.queue.is_empty() {
            return Ok(None);
        }

        let page = backend
            .search(&SearchRequest::related(playing.item.video_id.clone()))
            .await?;
        let Some(hit) = page
            .hits
            .iter()
            .find(|hit| hit.video_id != playing.item.video_id)
        else {
            debug!(room = %self.room, "No related video to queue");
            return Ok(None);
        };

        let outcome = self.submit_as(hit, AUTO_DJ_NAME, &RequestId::new())?;
        Ok(Some(outcome))
    }
}

impl Drop for RoomClient {
    fn drop(&mut self) {
        self.stop_heartbeat();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use partydj_api::{SearchPage, SubmitRejection};
    use partydj_store::SqliteStore;
    use partydj_util::{ManualClock, RateLimitConfig, RateLimitReason};

    fn setup() -> (Arc<dyn RoomStore>, Arc<ManualClock>) {
        let store: Arc<dyn RoomStore> = Arc::new(SqliteStore::in_memory().unwrap());
        (store, Arc::new(ManualClock::new(1_000_000)))
    }

    fn hit(id: &str) -> SearchHit {
        SearchHit {
            video_id: id.into(),
            title: format!("Song {}", id),
            thumbnail: None,
            channel: None,
        }
    }

    fn host_and_guests(guests: &[&str]) -> (RoomClient, Vec<RoomClient>, Arc<ManualClock>) {
        let (store, clock) = setup();
        let host = RoomClient::create(
            store.clone(),
            clock.clone(),
            RoomSettings::default(),
            "Host",
        )
        .unwrap();
        let guests = guests
            .iter()
            .map(|name| {
                RoomClient::join(
                    store.clone(),
                    clock.clone(),
                    RoomSettings::default(),
                    host.room().as_str(),
                    name,
                )
                .unwrap()
            })
            .collect();
        (host, guests, clock)
    }

    #[test]
    fn create_and_join() {
        let (host, guests, _) = host_and_guests(&["Ana"]);
        assert!(host.host_token().is_some());
        assert!(guests[0].host_token().is_none());

        let view = guests[0].view().unwrap();
        assert_eq!(view.participants.len(), 2);
        assert!(!view.is_host);
        assert!(host.view().unwrap().is_host);
    }

    #[test]
    fn join_unknown_or_malformed_room() {
        let (store, clock) = setup();
        let missing = RoomClient::join(store.clone(), clock.clone(), RoomSettings::default(), "zzzz9", "Ana");
        assert!(matches!(missing, Err(RoomError::RoomNotFound(_))));

        let bad = RoomClient::join(store, clock, RoomSettings::default(), "no!", "Ana");
        assert!(matches!(bad, Err(RoomError::InvalidRoomCode(_))));
    }

    #[test]
    fn retried_submit_applies_once() {
        let (host, _, _) = host_and_guests(&[]);
        let request = RequestId::new();
        host.submit(&hit("abc")).unwrap();

        let first = host.submit_with_request(&hit("abc"), &request).unwrap();
        let retry = host.submit_with_request(&hit("abc"), &request).unwrap();
        assert_eq!(first, retry);
        assert!(matches!(first, SubmitOutcome::Upvoted { vote_score: 2, .. }));

        let view = host.view().unwrap();
        assert_eq!(view.queue.len(), 1);
        assert_eq!(view.queue[0].vote_score, 2);
    }

    #[test]
    fn per_user_limit() {
        let (host, _, _) = host_and_guests(&[]);
        for id in ["a", "b", "c"] {
            assert!(matches!(host.submit(&hit(id)).unwrap(), SubmitOutcome::Added { .. }));
        }
        assert_eq!(
            host.submit(&hit("d")).unwrap(),
            SubmitOutcome::Rejected {
                reason: SubmitRejection::PerUserLimit { limit: 3 }
            }
        );
        assert_eq!(host.view().unwrap().queue.len(), 3);
    }

    #[test]
    fn votes_move_scores() {
        let (host, guests, _) = host_and_guests(&["Ana"]);
        host.submit(&hit("abc")).unwrap();
        let id = ItemId::youtube("abc");

        assert_eq!(guests[0].vote(&id, VoteDirection::Up).unwrap(), Some(2));
        assert_eq!(guests[0].vote(&id, VoteDirection::Down).unwrap(), Some(1));
        assert_eq!(guests[0].vote(&ItemId::youtube("gone"), VoteDirection::Up).unwrap(), None);
    }

    #[test]
    fn oversized_stored_score_saturates() {
        let (host, guests, _) = host_and_guests(&["Ana"]);
        host.submit(&hit("abc")).unwrap();
        let id = ItemId::youtube("abc");
        let score = StorePath::room(host.room())
            .child(QUEUE)
            .child(id.as_str())
            .child("voteScore");
        host.store.set(&score, json!(i64::MAX)).unwrap();

        assert_eq!(
            guests[0].submit(&hit("abc")).unwrap(),
            SubmitOutcome::Upvoted {
                item_id: id.clone(),
                vote_score: i64::MAX
            }
        );
        assert_eq!(guests[0].vote(&id, VoteDirection::Up).unwrap(), Some(i64::MAX));

        // The store is still usable afterwards
        let view = host.view().unwrap();
        assert_eq!(view.queue[0].vote_score, i64::MAX);
        host.submit(&hit("next")).unwrap();
    }

    /// Runs every callback once against an empty node before the real
    /// attempt, the way a store that retries on contention would
    struct RetryingStore {
        inner: Arc<dyn RoomStore>,
    }

    impl RoomStore for RetryingStore {
        fn get(&self, path: &StorePath) -> partydj_store::StoreResult<Option<Value>> {
            self.inner.get(path)
        }

        fn set(&self, path: &StorePath, value: Value) -> partydj_store::StoreResult<()> {
            self.inner.set(path, value)
        }

        fn remove(&self, path: &StorePath) -> partydj_store::StoreResult<()> {
            self.inner.remove(path)
        }

        fn transaction(
            &self,
            path: &StorePath,
            update: &mut dyn FnMut(Option<Value>) -> TxAction,
        ) -> partydj_store::StoreResult<partydj_store::TxCommit> {
            let _ = update(None);
            self.inner.transaction(path, update)
        }

        fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
            self.inner.subscribe()
        }

        fn rooms(&self) -> partydj_store::StoreResult<Vec<RoomCode>> {
            self.inner.rooms()
        }

        fn append_audit(&self, event: AuditEvent) -> partydj_store::StoreResult<()> {
            self.inner.append_audit(event)
        }

        fn recent_audits(&self, limit: usize) -> partydj_store::StoreResult<Vec<AuditEvent>> {
            self.inner.recent_audits(limit)
        }

        fn is_healthy(&self) -> bool {
            self.inner.is_healthy()
        }
    }

    #[test]
    fn rerun_transactions_use_the_last_attempt() {
        let (inner, clock) = setup();
        let seed = RoomClient::create(inner.clone(), clock.clone(), RoomSettings::default(), "Host")
            .unwrap();
        let token = seed.host_token().cloned().unwrap();

        let store: Arc<dyn RoomStore> = Arc::new(RetryingStore { inner });
        let host = RoomClient::join(store, clock, RoomSettings::default(), seed.room().as_str(), "Host")
            .unwrap()
            .with_host_token(token);

        assert!(matches!(host.submit(&hit("abc")).unwrap(), SubmitOutcome::Added { .. }));
        assert_eq!(
            host.advance().unwrap(),
            AdvanceOutcome::Started {
                item_id: ItemId::youtube("abc")
            }
        );
        host.set_paused(true).unwrap();
        assert!(host.view().unwrap().paused);
    }

    #[test]
    fn host_actions_require_token() {
        let (host, guests, _) = host_and_guests(&["Ana"]);
        host.submit(&hit("abc")).unwrap();

        assert!(matches!(guests[0].advance(), Err(RoomError::NotHost(_))));
        assert!(matches!(guests[0].clear_queue(), Err(RoomError::NotHost(_))));

        let forged = RoomClient::join(
            host.store.clone(),
            host.clock.clone(),
            RoomSettings::default(),
            host.room().as_str(),
            "Mallory",
        )
        .unwrap()
        .with_host_token(HostToken::from_raw("guess"));
        assert!(matches!(forged.set_paused(true), Err(RoomError::NotHost(_))));

        assert_eq!(
            host.advance().unwrap(),
            AdvanceOutcome::Started {
                item_id: ItemId::youtube("abc")
            }
        );
        assert_eq!(host.advance().unwrap(), AdvanceOutcome::QueueEmpty);
        host.set_paused(true).unwrap();
        assert!(host.view().unwrap().paused);
    }

    #[test]
    fn skip_quorum_advances_and_resets_votes() {
        let (host, guests, _) = host_and_guests(&["Ana", "Ben", "Cy"]);
        host.submit(&hit("one")).unwrap();
        guests[0].submit(&hit("two")).unwrap();
        host.advance().unwrap();

        // Four active listeners need two votes
        assert_eq!(
            guests[1].cast_skip_vote().unwrap(),
            SkipOutcome::Counted {
                votes: 1,
                required: 2
            }
        );
        assert_eq!(
            guests[1].cast_skip_vote().unwrap(),
            SkipOutcome::Counted {
                votes: 1,
                required: 2
            }
        );
        assert_eq!(
            guests[2].cast_skip_vote().unwrap(),
            SkipOutcome::Skipped {
                skipped: ItemId::youtube("one"),
                next: Some(ItemId::youtube("two"))
            }
        );

        let view = host.view().unwrap();
        assert_eq!(view.skip_votes, 0);
        assert_eq!(view.now_playing.unwrap().item.video_id, "two");
    }

    #[test]
    fn retract_and_nothing_playing() {
        let (host, guests, _) = host_and_guests(&["Ana", "Ben"]);
        assert_eq!(guests[0].cast_skip_vote().unwrap(), SkipOutcome::NothingPlaying);

        host.submit(&hit("one")).unwrap();
        host.advance().unwrap();
        guests[0].cast_skip_vote().unwrap();
        assert_eq!(
            guests[0].retract_skip_vote().unwrap(),
            SkipOutcome::Counted {
                votes: 0,
                required: 2
            }
        );
    }

    #[test]
    fn stale_listeners_do_not_count() {
        let (host, guests, clock) = host_and_guests(&["Ana", "Ben", "Cy"]);
        host.submit(&hit("one")).unwrap();
        host.advance().unwrap();

        clock.advance(61_000);
        host.heartbeat().unwrap();
        // Only the host is active now, so one vote skips
        assert!(matches!(
            guests[0].cast_skip_vote().unwrap(),
            SkipOutcome::Skipped { next: None, .. }
        ));
    }

    #[test]
    fn chat_is_trimmed_clamped_and_pruned() {
        let (store, clock) = setup();
        let settings = RoomSettings {
            chat_max_len: 5,
            chat_history: 2,
            ..RoomSettings::default()
        };
        let host = RoomClient::create(store, clock.clone(), settings, "Host").unwrap();

        assert!(host.send_chat("   ").unwrap().is_none());
        let msg = host.send_chat("  hello world ").unwrap().unwrap();
        assert_eq!(msg.text, "hello");

        clock.advance(1);
        host.send_chat("two").unwrap();
        clock.advance(1);
        host.send_chat("three").unwrap();

        let chat = host.view().unwrap().chat;
        assert_eq!(chat.len(), 2);
        assert_eq!(chat[0].text, "two");
        assert_eq!(chat[1].text, "three");
    }

    #[test]
    fn leave_removes_presence() {
        let (host, guests, _) = host_and_guests(&["Ana"]);
        guests[0].leave().unwrap();
        assert_eq!(host.view().unwrap().participants.len(), 1);
    }

    #[test]
    fn rename_updates_presence() {
        let (host, _, _) = host_and_guests(&[]);
        host.rename("DJ Host").unwrap();
        assert_eq!(host.view().unwrap().participants[0].name, "DJ Host");
        host.rename("  ").unwrap();
        assert_eq!(host.name(), "Guest");
    }

    struct FakeBackend {
        hits: Vec<&'static str>,
    }

    #[async_trait]
    impl SearchBackend for FakeBackend {
        async fn search(&self, _request: &SearchRequest) -> Result<SearchPage, SearchError> {
            Ok(SearchPage {
                hits: self.hits.iter().map(|id| hit(id)).collect(),
                next_page_token: None,
            })
        }
    }

    #[tokio::test]
    async fn search_is_gated() {
        let (store, clock) = setup();
        let settings = RoomSettings {
            search_rate_limit: RateLimitConfig::new(60_000, 15, 800),
            ..RoomSettings::default()
        };
        let host = RoomClient::create(store, clock.clone(), settings, "Host").unwrap();
        let backend = FakeBackend { hits: vec!["a"] };
        let request = SearchRequest::query("daft punk");

        assert!(matches!(
            host.search(&backend, &request).await.unwrap(),
            SearchOutcome::Results(_)
        ));
        assert_eq!(
            host.search(&backend, &request).await.unwrap(),
            SearchOutcome::RateLimited(RateLimitReason::Gap)
        );
    }

    #[tokio::test]
    async fn autofill_queues_related_video() {
        let (store, clock) = setup();
        let settings = RoomSettings {
            autofill: true,
            ..RoomSettings::default()
        };
        let host = RoomClient::create(store, clock, settings, "Host").unwrap();
        let backend = FakeBackend {
            hits: vec!["playing", "next"],
        };

        // Nothing playing yet
        assert!(host.autofill(&backend).await.unwrap().is_none());

        host.submit(&hit("playing")).unwrap();
        host.advance().unwrap();
        let outcome = host.autofill(&backend).await.unwrap();
        assert_eq!(
            outcome,
            Some(SubmitOutcome::Added {
                item_id: ItemId::youtube("next")
            })
        );
        let view = host.view().unwrap();
        assert_eq!(view.queue[0].added_by, AUTO_DJ_NAME);

        // Queue is no longer empty
        assert!(host.autofill(&backend).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_task_stops_on_leave() {
        let (store, clock) = setup();
        let host = Arc::new(RoomClient::create(store.clone(), clock.clone(), RoomSettings::default(), "Host").unwrap());
        let presence = StorePath::room(host.room())
            .child(PRESENCE)
            .child(host.client_id().as_str());

        host.start_heartbeat();
        clock.advance(15_000);
        tokio::time::sleep(std::time::Duration::from_millis(15_001)).await;
        let ts = store.get(&presence).unwrap().unwrap()["ts"].as_i64();
        assert_eq!(ts, Some(1_015_000));

        host.leave().unwrap();
        clock.advance(15_000);
        tokio::time::sleep(std::time::Duration::from_millis(30_000)).await;
        assert!(store.get(&presence).unwrap().is_none());
    }
}
