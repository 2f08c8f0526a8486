use moka::sync::Cache;
use std::time::Duration;

const MAX_TRACKED_CONVERSATIONS: u64 = 100_000;

/// Sticks a conversation to the credential it was last served by, so a
/// multi-turn chat doesn't bounce between pooled accounts mid-conversation.
/// Entries expire after an hour of inactivity.
#[derive(Clone)]
pub struct ConversationAffinity {
    cache: Cache<String, u64>,
}

impl ConversationAffinity {
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(
            crate::config::CONFIG.accounts.affinity_ttl_secs,
        ))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(MAX_TRACKED_CONVERSATIONS)
                .time_to_idle(ttl)
                .build(),
        }
    }

    pub fn get(&self, conversation_key: &str) -> Option<u64> {
        self.cache.get(conversation_key)
    }

    pub fn record(&self, conversation_key: String, credential_id: u64) {
        self.cache.insert(conversation_key, credential_id);
    }
}

impl Default for ConversationAffinity {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_recalls_the_last_credential() {
        let affinity = ConversationAffinity::new();
        assert_eq!(affinity.get("conv-1"), None);

        affinity.record("conv-1".to_string(), 42);
        assert_eq!(affinity.get("conv-1"), Some(42));

        affinity.record("conv-1".to_string(), 7);
        assert_eq!(affinity.get("conv-1"), Some(7));
    }
}
