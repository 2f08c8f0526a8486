//! Provider-agnostic retry/dispatch loop.
//!
//! Each provider client (`providers::geminicli::client`,
//! `providers::codex::client`, `providers::antigravity::client`) already
//! knows how to pick a credential, build its own request and call
//! `classify_upstream_error` against its own error body shape. This module
//! supplies the one thing that decision doesn't capture on its own: what a
//! classified outcome means for the *loop* around that call — retry, disable
//! the account, or give up and hand the caller a terminal response.

mod kind;
mod loop_;

pub use kind::{DispatchOutcome, FailureKind};
pub use loop_::{MAX_RETRIES, RetryDecision, next_attempt, next_step};
