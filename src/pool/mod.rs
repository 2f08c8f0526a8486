//! Account-pool scoring: layered on top of each provider's
//! capability-bitmask `CredentialManager` queue (see
//! `providers::*::manager::scheduler`).
//!
//! `CredentialManager::get_assigned` stays a FIFO-with-cooldown queue; the
//! types here let a caller additionally rank the queue's current resident
//! candidates and pick the best-scoring one instead of strictly the head,
//! while preserving fairness by requeuing everyone who wasn't picked.

mod affinity;
mod exclusions;
mod quota;
mod score;

pub use affinity::ConversationAffinity;
pub use exclusions::InFlightExclusions;
pub use quota::{QuotaCache, QuotaInfo};
pub use score::{AccountScoreInputs, score};
