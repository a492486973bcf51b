//! # Controller
//!
//! The revision reconciler and the pieces it is built from.
//!
//! ## Module Structure
//!
//! - `backoff` - Exponential requeue delays
//! - `events` - Event sink capability and implementations
//! - `reconciler` - Diff, recovery, snapshot creation and the sync pass
//! - `server` - HTTP server for metrics and probes
//! - `store` - Object store and revision state capabilities

pub mod backoff;
pub mod events;
pub mod reconciler;
pub mod server;
pub mod store;
