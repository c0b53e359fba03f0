//! Shared utilities for partydj
//!
//! This crate provides:
//! - ID types (RoomCode, ClientId, ItemId, HostToken, RequestId, ActorKey)
//! - Clocks (system, manual, mock time in debug builds)
//! - Sliding-window rate limiting
//! - Default paths for the config file and data directory

mod ids;
mod paths;
mod rate_limit;
mod time;

pub use ids::*;
pub use paths::*;
pub use rate_limit::*;
pub use time::*;
