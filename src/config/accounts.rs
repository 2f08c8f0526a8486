use serde::{Deserialize, Serialize};

/// Pool-scoring and credential-lifecycle tunables, shared across providers.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountsConfig {
    /// Cooldown applied to a rate-limited credential when the upstream gave
    /// no usable reset delay of its own.
    /// TOML: `accounts.rate_limit_default_reset_secs`. Default: `300`.
    #[serde(default = "default_rate_limit_default_reset_secs")]
    pub rate_limit_default_reset_secs: u64,

    /// How long a provider's resolved account list is cached before being
    /// reloaded from the database.
    /// TOML: `accounts.account_list_cache_ttl_secs`. Default: `1800`.
    #[serde(default = "default_account_list_cache_ttl_secs")]
    pub account_list_cache_ttl_secs: u64,

    /// How long a conversation stays pinned to the credential it was last
    /// served by. TOML: `accounts.affinity_ttl_secs`. Default: `3600`.
    #[serde(default = "default_affinity_ttl_secs")]
    pub affinity_ttl_secs: u64,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            rate_limit_default_reset_secs: default_rate_limit_default_reset_secs(),
            account_list_cache_ttl_secs: default_account_list_cache_ttl_secs(),
            affinity_ttl_secs: default_affinity_ttl_secs(),
        }
    }
}

fn default_rate_limit_default_reset_secs() -> u64 {
    300
}

fn default_account_list_cache_ttl_secs() -> u64 {
    1800
}

fn default_affinity_ttl_secs() -> u64 {
    3600
}
