//! # Reconciliation
//!
//! One reconciliation pass over the whole tracked set.
//!
//! ## Module Structure
//!
//! - `sync.rs` - Recovery, drift check, revision creation and status finalization

mod sync;

pub use sync::PassOutcome;
