//! og-coord
//!
//! Shared Coordination Store boundary.
//!
//! This crate owns the store contract ([`CoordinationStore`]), the key layout
//! and record shapes every instance agrees on, an in-process implementation
//! ([`MemoryStore`]) and the timeout wrapper ([`bounded`]) every call site
//! must go through.
//!
//! It does **not** decide fail-open vs fail-closed; that policy belongs to
//! each caller (breaker path favors availability, replay check favors safety).

pub mod keys;
mod memory;
mod records;
mod store;

pub use memory::MemoryStore;
pub use records::{PendingTxRecord, SubmissionRecord};
pub use store::{bounded, CoordinationStore, StoreError};
