//! Windowlimit - Per-key Fixed-Window Rate Limiting
//!
//! This crate decides, for each request identified by a client identity and a
//! resource path, whether the request fits in the quota of its current
//! fixed window. Counting is linearizable per key under concurrent access, and
//! stale windows are replaced on access and swept in the background.

pub mod config;
pub mod error;
pub mod guard;
pub mod ratelimit;
