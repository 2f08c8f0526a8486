use crate::error::PolluxError;
use async_trait::async_trait;
use sqlx::SqlitePool;

/// Implemented by patch envelopes that know how to apply themselves against
/// a specific table.
#[async_trait]
pub trait DbPatchable {
    async fn apply_patch(&self, pool: &SqlitePool) -> Result<(), PolluxError>;
}
