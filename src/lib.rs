//! Whiteboard - collaborative drawing backend
//!
//! User accounts, per-user diagram storage and live WebSocket sessions where
//! participants relay drawing updates to each other.

pub mod app;
pub mod core;
