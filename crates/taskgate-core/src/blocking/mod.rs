//! The blocking verdict.
//!
//! [`DecisionEngine`] turns task, penalty and bonus state into one answer for
//! every enforcement path. [`VerdictFeed`] lets executors subscribe instead of
//! polling.

mod engine;
mod feed;

pub use engine::{BlockReason, DecisionEngine, EngineConfig, Verdict};
pub use feed::{watch_verdicts, VerdictFeed};
