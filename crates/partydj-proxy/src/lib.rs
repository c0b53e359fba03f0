//! Search proxy for partydj
//!
//! A small HTTP service standing between browsers and the video search API:
//! - Origin lock against an explicit allow-list, CORS headers on every response
//! - Sliding-window rate limit keyed by client network address
//! - The upstream API key stays in the process environment
//! - Upstream failures become `502` with a best-effort detail
//!
//! [`ProxySearchClient`] is the other end: the [`partydj_core::SearchBackend`]
//! a room client uses to reach this service.

mod client;
mod cors;
mod error;
mod server;
mod upstream;

pub use client::*;
pub use error::*;
pub use server::*;
pub use upstream::*;
