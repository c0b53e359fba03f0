//! Store trait definitions

use partydj_util::RoomCode;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::{AuditEvent, StorePath, StoreResult};

/// What a transaction callback decided
#[derive(Debug, Clone, PartialEq)]
pub enum TxAction {
    /// Write this value at the path (`null` removes it)
    Set(Value),
    /// Remove the node at the path
    Remove,
    /// Leave everything untouched
    Abort,
}

/// Result of a transaction
#[derive(Debug, Clone, PartialEq)]
pub struct TxCommit {
    /// False when the callback aborted
    pub committed: bool,
    /// Value at the path after the transaction
    pub snapshot: Option<Value>,
}

/// Notification that something at or beneath `path` changed
#[derive(Debug, Clone, PartialEq)]
pub struct StoreChange {
    pub path: StorePath,
}

/// Shared room state store
///
/// Plain `get`/`set`/`remove` are last-writer-wins. Anything that derives a
/// new value from the current one (score increments, vote sets, queue
/// advancement) must go through [`RoomStore::transaction`], which runs the
/// callback against the current value and writes the result atomically.
/// The callback may be run more than once and must not have side effects.
pub trait RoomStore: Send + Sync {
    /// Read the value at a path
    fn get(&self, path: &StorePath) -> StoreResult<Option<Value>>;

    /// Overwrite the value at a path
    fn set(&self, path: &StorePath, value: Value) -> StoreResult<()>;

    /// Delete the value at a path
    fn remove(&self, path: &StorePath) -> StoreResult<()>;

    /// Atomic read-modify-write at a path
    fn transaction(
        &self,
        path: &StorePath,
        update: &mut dyn FnMut(Option<Value>) -> TxAction,
    ) -> StoreResult<TxCommit>;

    /// Subscribe to change notifications
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;

    /// Codes of every room with any stored state
    fn rooms(&self) -> StoreResult<Vec<RoomCode>>;

    // Audit log

    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events, newest first
    fn recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
