//! Search gating
//!
//! A participant's searches pass through a local rate limit before they
//! reach the proxy, and a response is only shown if no newer search was
//! started while it was in flight.

use async_trait::async_trait;
use partydj_api::{ErrorCode, SearchPage, SearchRequest};
use partydj_util::{EpochMillis, RateDecision, RateLimitConfig, RateLimitReason, RateWindow};
use thiserror::Error;

/// Search failures. Rate limiting by the proxy is reported here as a
/// status; local rate limiting is a [`SearchOutcome`].
#[derive(Debug, Clone, Error)]
pub enum SearchError {
    #[error("Search service unreachable: {0}")]
    Transport(String),

    #[error("Search service returned {status}: {message}")]
    Status {
        status: u16,
        code: Option<ErrorCode>,
        message: String,
    },

    #[error("Malformed search response: {0}")]
    Decode(String),
}

/// Anything that can answer a search request
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<SearchPage, SearchError>;
}

/// What happened to a gated search
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Results(SearchPage),
    /// A newer search started before this one resolved; discard it
    Superseded,
    /// Refused locally, nothing was sent
    RateLimited(RateLimitReason),
}

/// Identifies one started search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchTicket(u64);

/// Local search limiter plus a generation counter
#[derive(Debug)]
pub struct SearchGate {
    config: RateLimitConfig,
    window: RateWindow,
    generation: u64,
}

impl SearchGate {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            window: RateWindow::new(),
            generation: 0,
        }
    }

    /// Start a search at `now`; a refused search does not supersede the
    /// one in flight
    pub fn begin(&mut self, now: EpochMillis) -> Result<SearchTicket, RateLimitReason> {
        match self.window.check(&self.config, now) {
            RateDecision::Allowed => {
                self.generation += 1;
                Ok(SearchTicket(self.generation))
            }
            RateDecision::Rejected(reason) => Err(reason),
        }
    }

    /// Whether `ticket` belongs to the most recently started search
    pub fn is_current(&self, ticket: SearchTicket) -> bool {
        ticket.0 == self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_search_supersedes_older() {
        let mut gate = SearchGate::new(RateLimitConfig::new(60_000, 15, 0));
        let first = gate.begin(0).unwrap();
        assert!(gate.is_current(first));

        let second = gate.begin(10).unwrap();
        assert!(!gate.is_current(first));
        assert!(gate.is_current(second));
    }

    #[test]
    fn refused_search_keeps_current_ticket() {
        let mut gate = SearchGate::new(RateLimitConfig::CLIENT_SEARCH);
        let first = gate.begin(0).unwrap();
        assert_eq!(gate.begin(100), Err(RateLimitReason::Gap));
        assert!(gate.is_current(first));
    }

    #[test]
    fn window_quota_applies() {
        let mut gate = SearchGate::new(RateLimitConfig::new(60_000, 2, 0));
        assert!(gate.begin(0).is_ok());
        assert!(gate.begin(1).is_ok());
        assert_eq!(gate.begin(2), Err(RateLimitReason::Window));
        assert!(gate.begin(60_001).is_ok());
    }
}
