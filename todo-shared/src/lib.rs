//! # Todo Shared Library
//!
//! This crate contains the data layer, authentication primitives and
//! outbound integrations used by the todo API server.
//!
//! ## Module Organization
//!
//! - `models`: Database models and repository operations
//! - `auth`: Tokens, password hashing and the auth middleware context
//! - `db`: Connection pool and migrations
//! - `redis`: Redis client (sessions, token revocation, rate limiting)
//! - `wechat`: WeChat mini-program session exchange
//! - `mail`: Outgoing mail (SMTP, log and in-memory backends)

pub mod auth;
pub mod db;
pub mod mail;
pub mod models;
pub mod redis;
pub mod wechat;

/// Current version of the shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Current unix time in seconds
///
/// Every timestamp column in the schema stores unix seconds.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
