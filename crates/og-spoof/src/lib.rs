//! og-spoof
//!
//! Spoof Detection Engine. Seven independent checks judge every price
//! submission; their union is the verdict:
//!
//! | check                  | severity                         | blocks            |
//! |------------------------|----------------------------------|-------------------|
//! | price manipulation     | z>5 CRITICAL, z>4 HIGH, z>3 MED  | HIGH/CRITICAL     |
//! | flash-loan pattern     | CRITICAL                         | always            |
//! | coordinated attack     | CRITICAL                         | always            |
//! | timestamp manipulation | future HIGH, delayed MEDIUM      | never             |
//! | replay attack          | CRITICAL                         | always            |
//! | sybil attack           | HIGH                             | always            |
//! | front-running          | MEDIUM                           | never             |
//!
//! The pure checks live in `checks` and take `now_ms` from the caller. The
//! three checks backed by the shared coordination store live in
//! `coordination`; their store failures are isolated per check (replay fails
//! closed, the others fail open with a diagnostic counter).

mod alert_log;
pub mod checks;
mod coordination;
mod engine;
mod types;

pub use alert_log::AlertLog;
pub use coordination::publish_pending_transaction;
pub use engine::SpoofEngine;
pub use types::*;
