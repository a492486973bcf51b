//! # Reconciler
//!
//! Keeps an immutable, numbered history of the tracked ConfigMaps and Secrets.
//!
//! ## Module Structure
//!
//! - `types.rs` - Reconciler context, tracked resources, errors
//! - `naming.rs` - Snapshot and status marker names
//! - `diff.rs` - Drift detection against the latest revision
//! - `recovery.rs` - Rebuilding the revision counter from status markers
//! - `snapshot.rs` - Idempotent creation of a revision's objects
//! - `status.rs` - The degraded condition
//! - `reconcile/` - The sync pass tying the above together

mod diff;
pub mod naming;
pub mod reconcile;
mod recovery;
mod snapshot;
pub mod status;
#[cfg(test)]
pub(crate) mod testing;
mod types;

pub use diff::RevisionCheck;
pub use reconcile::PassOutcome;
pub use types::*;
