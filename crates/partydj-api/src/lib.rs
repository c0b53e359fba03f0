//! Shared data types for partydj
//!
//! This crate defines the records both sides agree on:
//! - Room state records as stored under `rooms/{code}/...`
//! - Search requests and decoded search pages
//! - Outcomes of queue, vote and skip actions
//! - The proxy's JSON error body

mod outcomes;
mod proxy;
mod search;
mod types;

pub use outcomes::*;
pub use proxy::*;
pub use search::*;
pub use types::*;

/// Current room state schema version, recorded in room meta
pub const SCHEMA_VERSION: u32 = 1;
