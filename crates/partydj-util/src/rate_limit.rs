//! Rate limiting utilities
//!
//! A sliding window of accepted timestamps per actor, with a minimum gap
//! between consecutive accepted actions. Best-effort only: state lives in
//! this process and is lost on restart.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{elapsed_ms, ActorKey, EpochMillis};

/// Limits applied to each actor independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Width of the sliding window
    pub window_ms: u64,
    /// Accepted actions allowed inside one window
    pub max_per_window: u32,
    /// Minimum distance between two accepted actions
    pub min_gap_ms: u64,
}

impl RateLimitConfig {
    /// Limits the search proxy applies per client address
    pub const PROXY: Self = Self::new(60_000, 60, 400);

    /// Limits a browser applies to its own searches
    pub const CLIENT_SEARCH: Self = Self::new(60_000, 15, 800);

    pub const fn new(window_ms: u64, max_per_window: u32, min_gap_ms: u64) -> Self {
        Self {
            window_ms,
            max_per_window,
            min_gap_ms,
        }
    }

    fn window_ms_i64(&self) -> i64 {
        i64::try_from(self.window_ms).unwrap_or(i64::MAX)
    }

    fn min_gap_ms_i64(&self) -> i64 {
        i64::try_from(self.min_gap_ms).unwrap_or(i64::MAX)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::PROXY
    }
}

/// Why an action was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitReason {
    /// Too soon after the previous accepted action
    Gap,
    /// Window quota exhausted
    Window,
}

impl RateLimitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitReason::Gap => "gap",
            RateLimitReason::Window => "window",
        }
    }
}

impl fmt::Display for RateLimitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of asking the limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Rejected(RateLimitReason),
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed)
    }
}

/// Accepted timestamps of one actor, oldest first
#[derive(Debug, Clone, Default)]
pub struct RateWindow {
    stamps: VecDeque<EpochMillis>,
}

impl RateWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop entries older than the window.
    ///
    /// Stamps are only appended when not earlier than the last one (the gap
    /// check refuses anything earlier), so popping from the front is enough.
    pub fn prune(&mut self, now: EpochMillis, config: &RateLimitConfig) {
        let window = config.window_ms_i64();
        while let Some(&oldest) = self.stamps.front() {
            if elapsed_ms(now, oldest) > window {
                self.stamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Prune, decide, and record `now` if allowed. Rejections are not recorded.
    pub fn check(&mut self, config: &RateLimitConfig, now: EpochMillis) -> RateDecision {
        self.prune(now, config);

        if let Some(&last) = self.stamps.back()
            && elapsed_ms(now, last) < config.min_gap_ms_i64()
        {
            return RateDecision::Rejected(RateLimitReason::Gap);
        }

        if self.stamps.len() >= config.max_per_window as usize {
            return RateDecision::Rejected(RateLimitReason::Window);
        }

        self.stamps.push_back(now);
        RateDecision::Allowed
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    pub fn last(&self) -> Option<EpochMillis> {
        self.stamps.back().copied()
    }

    pub fn stamps(&self) -> impl Iterator<Item = EpochMillis> + '_ {
        self.stamps.iter().copied()
    }
}

/// Sliding-window limiter owned by a single caller
#[derive(Debug)]
pub struct RateLimiter<K = ActorKey> {
    config: RateLimitConfig,
    windows: HashMap<K, RateWindow>,
}

impl<K: Eq + Hash + Clone> RateLimiter<K> {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: HashMap::new(),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check whether `key` may act at `now`, recording the action if so
    pub fn allow(&mut self, key: &K, now: EpochMillis) -> RateDecision {
        let window = self.windows.entry(key.clone()).or_default();
        window.check(&self.config, now)
    }

    /// Remove an actor's state
    pub fn remove_actor(&mut self, key: &K) {
        self.windows.remove(key);
    }

    /// Drop actors whose windows have fully expired. Returns how many were dropped.
    pub fn evict_expired(&mut self, now: EpochMillis) -> usize {
        let before = self.windows.len();
        let config = self.config;
        self.windows.retain(|_, window| {
            window.prune(now, &config);
            !window.is_empty()
        });
        before - self.windows.len()
    }

    pub fn actor_count(&self) -> usize {
        self.windows.len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Limiter shared between concurrent request handlers.
///
/// The map lock is held only to look up or insert an actor's window; the
/// read-prune-append runs under that actor's own lock, so unrelated actors
/// never wait on each other's decisions.
#[derive(Debug)]
pub struct SharedRateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<ActorKey, Arc<Mutex<RateWindow>>>>,
}

impl SharedRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn allow(&self, key: &ActorKey, now: EpochMillis) -> RateDecision {
        let window = {
            let mut windows = lock(&self.windows);
            Arc::clone(windows.entry(key.clone()).or_default())
        };
        let mut guard = lock(window.as_ref());
        guard.check(&self.config, now)
    }

    /// Drop actors whose windows have fully expired. Windows currently
    /// borrowed by an in-flight `allow` are left alone.
    pub fn evict_expired(&self, now: EpochMillis) -> usize {
        let mut windows = lock(&self.windows);
        let before = windows.len();
        windows.retain(|_, window| {
            if Arc::strong_count(window) > 1 {
                return true;
            }
            let mut guard = lock(window.as_ref());
            guard.prune(now, &self.config);
            !guard.is_empty()
        });
        before - windows.len()
    }

    pub fn actor_count(&self) -> usize {
        lock(&self.windows).len()
    }
}
