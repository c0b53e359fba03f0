//! Session policy engine and room client for partydj
//!
//! This crate contains:
//! - Skip quorum (majority of active listeners, rounded up)
//! - Queue ordering and duplicate detection
//! - Presence liveness from heartbeats
//! - Decoding of shared room state
//! - The room client that applies these rules to the shared store
//! - Search gating (client rate limit, superseded responses)

mod presence;
mod queue;
mod quorum;
mod room;
mod room_state;
mod search;

pub use presence::*;
pub use queue::*;
pub use quorum::*;
pub use room::*;
pub use room_state::*;
pub use search::*;
