//! SQLite-based store implementation
//!
//! Each room is one JSON document. All access goes through a single
//! connection behind a mutex, so a transaction's read-modify-write cannot
//! interleave with any other write.

use chrono::{DateTime, Local};
use partydj_util::RoomCode;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::path::{is_empty_node, set_at, value_at};
use crate::{
    AuditEvent, AuditEventType, RoomStore, StoreChange, StoreError, StorePath, StoreResult,
    TxAction, TxCommit,
};

const CHANGE_CAPACITY: usize = 256;

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
    changes: broadcast::Sender<StoreChange>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    /// Create an in-memory store
    pub fn in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        let store = Self {
            conn: Mutex::new(conn),
            changes,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            -- One JSON document per room
            CREATE TABLE IF NOT EXISTS rooms (
                code TEXT PRIMARY KEY,
                doc TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Audit log (append-only)
            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                room TEXT,
                event_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);
            CREATE INDEX IF NOT EXISTS idx_audit_room ON audit_log(room);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn notify(&self, path: &StorePath) {
        // No receivers is fine
        let _ = self.changes.send(StoreChange { path: path.clone() });
    }

    /// Apply `update` to the room document under one SQLite transaction
    fn modify(
        &self,
        path: &StorePath,
        update: &mut dyn FnMut(Option<Value>) -> TxAction,
    ) -> StoreResult<TxCommit> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let code = path.room_code();

        let mut doc = load_doc(&tx, code)?;
        let current = value_at(&doc, path.rest()).cloned();

        let next = match update(current.clone()) {
            TxAction::Abort => {
                return Ok(TxCommit {
                    committed: false,
                    snapshot: current,
                });
            }
            TxAction::Set(value) => value,
            TxAction::Remove => Value::Null,
        };

        set_at(&mut doc, path.rest(), next);
        save_doc(&tx, code, &doc)?;
        tx.commit()?;
        drop(conn);

        debug!(path = %path, "Store write committed");
        self.notify(path);

        Ok(TxCommit {
            committed: true,
            snapshot: value_at(&doc, path.rest()).cloned(),
        })
    }
}

fn load_doc(conn: &Connection, code: &RoomCode) -> StoreResult<Value> {
    let text: Option<String> = conn
        .query_row(
            "SELECT doc FROM rooms WHERE code = ?",
            [code.as_str()],
            |row| row.get(0),
        )
        .optional()?;

    Ok(match text {
        Some(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
            warn!(room = %code, error = %e, "Malformed room document, starting empty");
            Value::Null
        }),
        None => Value::Null,
    })
}

fn save_doc(conn: &Connection, code: &RoomCode, doc: &Value) -> StoreResult<()> {
    if is_empty_node(doc) {
        conn.execute("DELETE FROM rooms WHERE code = ?", [code.as_str()])?;
        return Ok(());
    }

    conn.execute(
        r#"
        INSERT INTO rooms (code, doc, updated_at)
        VALUES (?, ?, ?)
        ON CONFLICT(code)
        DO UPDATE SET doc = excluded.doc, updated_at = excluded.updated_at
        "#,
        params![
            code.as_str(),
            serde_json::to_string(doc)?,
            partydj_util::now().to_rfc3339()
        ],
    )?;
    Ok(())
}

impl RoomStore for SqliteStore {
    fn get(&self, path: &StorePath) -> StoreResult<Option<Value>> {
        let conn = self.lock()?;
        let doc = load_doc(&conn, path.room_code())?;
        Ok(value_at(&doc, path.rest()).cloned())
    }

    fn set(&self, path: &StorePath, value: Value) -> StoreResult<()> {
        self.modify(path, &mut |_| TxAction::Set(value.clone()))?;
        Ok(())
    }

    fn remove(&self, path: &StorePath) -> StoreResult<()> {
        self.modify(path, &mut |_| TxAction::Remove)?;
        Ok(())
    }

    fn transaction(
        &self,
        path: &StorePath,
        update: &mut dyn FnMut(Option<Value>) -> TxAction,
    ) -> StoreResult<TxCommit> {
        self.modify(path, update)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    fn rooms(&self) -> StoreResult<Vec<RoomCode>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT code FROM rooms ORDER BY code")?;
        let codes = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut rooms = Vec::new();
        for code in codes {
            let code = code?;
            match RoomCode::parse(&code) {
                Some(room) => rooms.push(room),
                None => warn!(code = %code, "Skipping room with invalid code"),
            }
        }
        Ok(rooms)
    }

    fn append_audit(&self, mut event: AuditEvent) -> StoreResult<()> {
        let conn = self.lock()?;
        let event_json = serde_json::to_string(&event.event)?;

        conn.execute(
            "INSERT INTO audit_log (timestamp, room, event_json) VALUES (?, ?, ?)",
            params![
                event.timestamp.to_rfc3339(),
                event.room.as_ref().map(|r| r.as_str().to_string()),
                event_json
            ],
        )?;

        event.id = conn.last_insert_rowid();
        debug!(event_id = event.id, "Audit event appended");

        Ok(())
    }

    fn recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, timestamp, room, event_json FROM audit_log ORDER BY id DESC LIMIT ?",
        )?;

        let rows = stmt.query_map([limit as i64], |row| {
            let id: i64 = row.get(0)?;
            let timestamp_str: String = row.get(1)?;
            let room: Option<String> = row.get(2)?;
            let event_json: String = row.get(3)?;
            Ok((id, timestamp_str, room, event_json))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp_str, room, event_json) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
                .map(|dt| dt.with_timezone(&Local))
                .unwrap_or_else(|_| partydj_util::now());
            let event: AuditEventType = serde_json::from_str(&event_json)?;

            events.push(AuditEvent {
                id,
                timestamp,
                room: room.as_deref().and_then(RoomCode::parse),
                event,
            });
        }

        Ok(events)
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::{NOW, QUEUE};
    use serde_json::json;
    use std::sync::Arc;

    fn room() -> RoomCode {
        RoomCode::parse("PARTY").unwrap()
    }

    #[test]
    fn test_in_memory_store() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.is_healthy());
        assert!(store.rooms().unwrap().is_empty());
    }

    #[test]
    fn test_get_set_remove() {
        let store = SqliteStore::in_memory().unwrap();
        let item = StorePath::room(&room()).child(QUEUE).child("yt:a");

        assert!(store.get(&item).unwrap().is_none());
        store.set(&item, json!({ "voteScore": 1 })).unwrap();
        assert_eq!(store.get(&item).unwrap(), Some(json!({ "voteScore": 1 })));
        assert_eq!(
            store.get(&StorePath::room(&room())).unwrap(),
            Some(json!({ "queue": { "yt:a": { "voteScore": 1 } } }))
        );
        assert_eq!(store.rooms().unwrap(), vec![room()]);

        store.remove(&item).unwrap();
        assert!(store.get(&item).unwrap().is_none());
        assert!(store.rooms().unwrap().is_empty());
    }

    #[test]
    fn test_transaction_abort_and_commit() {
        let store = SqliteStore::in_memory().unwrap();
        let now = StorePath::room(&room()).child(NOW);

        let aborted = store.transaction(&now, &mut |_| TxAction::Abort).unwrap();
        assert!(!aborted.committed);
        assert!(store.get(&now).unwrap().is_none());

        let committed = store
            .transaction(&now, &mut |current| {
                assert!(current.is_none());
                TxAction::Set(json!({ "id": "yt:a" }))
            })
            .unwrap();
        assert!(committed.committed);
        assert_eq!(committed.snapshot, Some(json!({ "id": "yt:a" })));
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let score = StorePath::room(&room()).child(QUEUE).child("yt:a").child("voteScore");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let score = score.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        store
                            .transaction(&score, &mut |current| {
                                let n = current.and_then(|v| v.as_i64()).unwrap_or(0);
                                TxAction::Set(json!(n + 1))
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get(&score).unwrap(), Some(json!(200)));
    }

    #[test]
    fn test_change_feed() {
        let store = SqliteStore::in_memory().unwrap();
        let mut changes = store.subscribe();
        let path = StorePath::room(&room()).child("control");

        store.set(&path, json!({ "paused": true })).unwrap();
        let change = changes.try_recv().unwrap();
        assert_eq!(change.path, path);
    }

    #[test]
    fn test_audit_log() {
        let store = SqliteStore::in_memory().unwrap();

        store.append_audit(AuditEvent::new(AuditEventType::ServiceStarted)).unwrap();
        store
            .append_audit(AuditEvent::for_room(
                &room(),
                AuditEventType::PauseChanged { paused: true },
            ))
            .unwrap();

        let events = store.recent_audits(10).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].room, Some(room()));
        assert!(matches!(events[0].event, AuditEventType::PauseChanged { paused: true }));
        assert!(matches!(events[1].event, AuditEventType::ServiceStarted));
    }

    #[test]
    fn test_reopen_keeps_rooms() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("rooms.db");
        let path = StorePath::room(&room()).child("meta");

        {
            let store = SqliteStore::open(&db).unwrap();
            store.set(&path, json!({ "createdBy": "Ana" })).unwrap();
        }

        let store = SqliteStore::open(&db).unwrap();
        assert_eq!(store.get(&path).unwrap(), Some(json!({ "createdBy": "Ana" })));
    }
}
