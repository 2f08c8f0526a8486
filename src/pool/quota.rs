use chrono::{DateTime, Utc};
use moka::sync::Cache;
use reqwest::header::HeaderMap;
use std::collections::HashMap;

/// How long an ordinary (non-exhausted) quota sample stays usable once
/// observed, absent a fresher one. `MarkExhausted` entries instead expire at
/// their own `reset_at`, which is usually further out than this.
const SAMPLE_FRESHNESS_SECS: i64 = 15 * 60;

const QUOTA_CACHE_CAPACITY: u64 = 10_000;

/// One account's most recently observed upstream quota state, derived from
/// `x-codex-*` response headers or synthesized by `MarkExhausted` on a 429.
#[derive(Debug, Clone, Copy)]
pub struct QuotaInfo {
    pub primary_used_pct: f64,
    pub secondary_used_pct: f64,
    pub has_credits: bool,
    pub credits_unlimited: bool,
    observed_at: DateTime<Utc>,
    reset_at: Option<DateTime<Utc>>,
}

impl QuotaInfo {
    /// `100` for an unlimited/credited account, `95` for one with purchased
    /// credits but no unlimited flag, otherwise a weighted blend of the
    /// primary (70%) and secondary (30%) window headroom.
    pub fn health_score(&self) -> f64 {
        if self.credits_unlimited {
            return 100.0;
        }
        if self.has_credits {
            return 95.0;
        }
        0.7 * (100.0 - self.primary_used_pct) + 0.3 * (100.0 - self.secondary_used_pct)
    }

    pub fn is_exhausted(&self) -> bool {
        self.primary_used_pct >= 100.0 && self.secondary_used_pct >= 100.0
    }

    /// Whether this sample is stale enough that the cache should treat it
    /// as absent rather than report it to a caller.
    pub fn is_expired(&self) -> bool {
        match self.reset_at {
            Some(reset_at) => Utc::now() >= reset_at,
            None => (Utc::now() - self.observed_at).num_seconds() >= SAMPLE_FRESHNESS_SECS,
        }
    }

    /// Parse `x-codex-primary-used-percent` / `x-codex-secondary-used-percent`
    /// / `x-codex-has-available-credits` / `x-codex-unlimited` off an upstream
    /// response. Returns `None` if none of these headers were present.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let primary = header_f64(headers, "x-codex-primary-used-percent");
        let secondary = header_f64(headers, "x-codex-secondary-used-percent");
        let has_credits = header_bool(headers, "x-codex-has-available-credits");
        let unlimited = header_bool(headers, "x-codex-unlimited");

        if primary.is_none() && secondary.is_none() && has_credits.is_none() && unlimited.is_none() {
            return None;
        }

        Some(Self {
            primary_used_pct: primary.unwrap_or(0.0),
            secondary_used_pct: secondary.unwrap_or(0.0),
            has_credits: has_credits.unwrap_or(false),
            credits_unlimited: unlimited.unwrap_or(false),
            observed_at: Utc::now(),
            reset_at: None,
        })
    }

    fn exhausted(reset_secs: u64) -> Self {
        Self {
            primary_used_pct: 100.0,
            secondary_used_pct: 100.0,
            has_credits: false,
            credits_unlimited: false,
            observed_at: Utc::now(),
            reset_at: Some(Utc::now() + chrono::Duration::seconds(reset_secs as i64)),
        }
    }
}

fn header_f64(headers: &HeaderMap, name: &str) -> Option<f64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

fn header_bool(headers: &HeaderMap, name: &str) -> Option<bool> {
    let raw = headers.get(name)?.to_str().ok()?.trim().to_ascii_lowercase();
    match raw.as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// Per-provider cache of the last observed `QuotaInfo` per credential id,
/// keyed by the credential's own id (shared id space within one provider's
/// `CredentialManager`). Entries aren't evicted by a fixed TTL; `get`/
/// `get_all` instead consult `QuotaInfo::is_expired` so a `MarkExhausted`
/// entry survives exactly until its own reset deadline.
#[derive(Clone)]
pub struct QuotaCache {
    cache: Cache<u64, QuotaInfo>,
}

impl QuotaCache {
    pub fn new() -> Self {
        Self {
            cache: Cache::builder().max_capacity(QUOTA_CACHE_CAPACITY).build(),
        }
    }

    pub fn get(&self, id: u64) -> Option<QuotaInfo> {
        let info = self.cache.get(&id)?;
        if info.is_expired() {
            self.cache.invalidate(&id);
            return None;
        }
        Some(info)
    }

    pub fn record(&self, id: u64, info: QuotaInfo) {
        self.cache.insert(id, info);
    }

    /// Synthesize a fully-exhausted `QuotaInfo` for `id`, expiring at
    /// `reset_secs` from now, recorded on a 429 the upstream didn't carry
    /// quota headers on.
    pub fn mark_exhausted(&self, id: u64, reset_secs: u64) {
        self.cache.insert(id, QuotaInfo::exhausted(reset_secs));
    }

    pub fn is_quota_exhausted(&self, id: u64) -> bool {
        self.get(id).map(|info| info.is_exhausted()).unwrap_or(false)
    }

    /// Non-expired entries among `ids`, for a batch health-score pass over
    /// one scheduler's queue.
    pub fn get_all(&self, ids: &[u64]) -> HashMap<u64, QuotaInfo> {
        ids.iter().filter_map(|&id| self.get(id).map(|info| (id, info))).collect()
    }
}

impl Default for QuotaCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_credits_score_ceiling() {
        let info = QuotaInfo {
            primary_used_pct: 80.0,
            secondary_used_pct: 90.0,
            has_credits: true,
            credits_unlimited: true,
            observed_at: Utc::now(),
            reset_at: None,
        };
        assert_eq!(info.health_score(), 100.0);
    }

    #[test]
    fn percent_blend_weights_primary_higher() {
        let info = QuotaInfo {
            primary_used_pct: 100.0,
            secondary_used_pct: 0.0,
            has_credits: false,
            credits_unlimited: false,
            observed_at: Utc::now(),
            reset_at: None,
        };
        assert_eq!(info.health_score(), 30.0);
    }

    #[test]
    fn mark_exhausted_expires_at_reset_deadline() {
        let cache = QuotaCache::new();
        cache.mark_exhausted(1, 0);
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(cache.get(1).is_none());
    }

    #[test]
    fn get_all_skips_expired_and_missing() {
        let cache = QuotaCache::new();
        cache.record(
            1,
            QuotaInfo {
                primary_used_pct: 10.0,
                secondary_used_pct: 10.0,
                has_credits: false,
                credits_unlimited: false,
                observed_at: Utc::now(),
                reset_at: None,
            },
        );
        let all = cache.get_all(&[1, 2]);
        assert_eq!(all.len(), 1);
        assert!(all.contains_key(&1));
    }
}
