//! Presence and liveness

use partydj_api::PresenceEntry;
use partydj_store::{
    AuditEvent, AuditEventType, RoomStore, StorePath, StoreResult, TxAction, PRESENCE,
};
use partydj_util::{elapsed_ms, ClientId, EpochMillis};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Whether a heartbeat at `entry.ts` is still trusted at `now`
pub fn is_active(entry: &PresenceEntry, now: EpochMillis, stale_ms: u64) -> bool {
    elapsed_ms(now, entry.ts) <= i64::try_from(stale_ms).unwrap_or(i64::MAX)
}

/// Participants whose last heartbeat is within the staleness window
pub fn active_set(
    entries: &BTreeMap<ClientId, PresenceEntry>,
    now: EpochMillis,
    stale_ms: u64,
) -> BTreeSet<ClientId> {
    entries
        .iter()
        .filter(|(_, entry)| is_active(entry, now, stale_ms))
        .map(|(id, _)| id.clone())
        .collect()
}

pub fn active_count(
    entries: &BTreeMap<ClientId, PresenceEntry>,
    now: EpochMillis,
    stale_ms: u64,
) -> usize {
    entries
        .values()
        .filter(|entry| is_active(entry, now, stale_ms))
        .count()
}

/// Record a heartbeat for `client_id`
pub fn heartbeat(
    entries: &mut BTreeMap<ClientId, PresenceEntry>,
    client_id: &ClientId,
    name: &str,
    now: EpochMillis,
) {
    entries.insert(
        client_id.clone(),
        PresenceEntry {
            name: name.to_string(),
            ts: now,
        },
    );
}

/// Delete presence entries that went stale without a clean leave.
///
/// Counting never needs this, since staleness is applied when reading; it
/// keeps abandoned rooms from accumulating entries. Returns how many
/// entries were removed across all rooms.
pub fn sweep_stale_presence(
    store: &dyn RoomStore,
    now: EpochMillis,
    stale_ms: u64,
) -> StoreResult<usize> {
    let stale = i64::try_from(stale_ms).unwrap_or(i64::MAX);
    let mut total = 0;

    for room in store.rooms()? {
        let path = StorePath::room(&room).child(PRESENCE);
        let mut removed = 0;

        store.transaction(&path, &mut |current| {
            removed = 0;
            let Some(Value::Object(mut map)) = current else {
                return TxAction::Abort;
            };
            map.retain(|_, value| {
                let keep = value
                    .get("ts")
                    .and_then(Value::as_i64)
                    .is_some_and(|ts| elapsed_ms(now, ts) <= stale);
                if !keep {
                    removed += 1;
                }
                keep
            });
            match (removed, map.is_empty()) {
                (0, _) => TxAction::Abort,
                (_, true) => TxAction::Remove,
                (_, false) => TxAction::Set(Value::Object(map)),
            }
        })?;

        if removed > 0 {
            debug!(room = %room, removed, "Swept stale presence");
            let _ = store.append_audit(AuditEvent::for_room(
                &room,
                AuditEventType::PresenceSwept { removed },
            ));
            total += removed;
        }
    }

    if total > 0 {
        info!(removed = total, "Stale presence entries removed");
    }
    Ok(total)
}
