//! SmartMark, a personal bookmark manager with real-time sync.
//!
//! The heart of the crate is [`managers::sync_controller::SyncController`],
//! which keeps a local list of the signed-in user's bookmarks consistent
//! with a store and a change feed. This library crate exposes all modules
//! for use by the binary and integration tests.

pub mod app;
pub mod database;
pub mod managers;
pub mod services;
pub mod rpc_handler;
pub mod types;
