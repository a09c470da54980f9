//! Teamspace maintenance server library
//!
//! Exposes the stores, the job scheduler and the HTTP surface so the binary
//! and the end-to-end tests can wire them together.

pub mod app_store;
pub mod background_jobs;
pub mod changelog;
pub mod config;
pub mod entitlements;
pub mod rate_limit;
pub mod server;
pub mod server_store;
pub mod sqlite_persistence;

pub use app_store::{AppStore, SqliteAppStore};
pub use rate_limit::RateLimiter;
pub use server::{run_server, RequestsLoggingLevel};
pub use server_store::{ServerStore, SqliteServerStore};
