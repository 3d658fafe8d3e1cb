//! Reconciliation of per-source batches into the mutation catalogue

pub mod coordinator;
pub mod idempotency;
pub mod precedence;

pub use coordinator::{UpsertCoordinator, WriteReport};
pub use precedence::{reconcile, Resolution};
