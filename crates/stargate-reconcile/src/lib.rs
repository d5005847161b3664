//!
//! # Reconcile coordination
//!
//! Outcome algebra used by every reconcile step, plus the group that fans
//! reconcile units out over concurrent tasks and folds their outcomes.
//!
mod outcome;
mod context;
mod group;

pub use outcome::*;
pub use context::Context;
pub use group::ReconcileGroup;
