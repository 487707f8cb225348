//! Branch, tag and pull request head tracking for a Bitbucket-style provider.
//!
//! [`git::RemoteResolver`] decides where each head is fetched from,
//! [`git::FallbackFetcher`] repairs mirror replication lag at checkout time,
//! and [`hooks`] turns push notifications into head updates.

pub mod config;
pub mod git;
pub mod hooks;
pub mod provider;
pub mod shell_exec;
pub mod sync;
