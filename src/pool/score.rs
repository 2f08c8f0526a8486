use chrono::{DateTime, Utc};

/// Inputs the account selector needs to rank one candidate credential.
#[derive(Debug, Clone, Copy)]
pub struct AccountScoreInputs {
    /// `QuotaInfo::health_score()`, on a `[0, 100]` scale: 100 for an
    /// unlimited/credited account, 0 for one already marked exhausted, 40
    /// when no quota information has been observed yet for this account.
    pub quota_health: f64,
    /// Lifetime assignment count, used to spread load across the pool.
    pub usage_count: u64,
    /// Last time this account was handed out, if ever.
    pub last_used_at: Option<DateTime<Utc>>,
}

const QUOTA_WEIGHT: f64 = 0.8;
const USAGE_WEIGHT: f64 = 0.1;
const RECENCY_WEIGHT: f64 = 0.1;

/// Assignments per usage-score point lost: a credential used 1000+ times
/// scores 0 on this term regardless of how much further it's used.
const USAGE_SCORE_DIVISOR: f64 = 10.0;

/// A credential that has never been assigned carries no recency signal, so
/// it gets a low fixed score here rather than the ceiling — it still wins
/// selection almost entirely on `usage_score`, which a fresh credential
/// maxes out.
const NEVER_USED_RECENCY_SCORE: f64 = 10.0;

/// `0.8 * quotaHealth + 0.1 * usageScore + 0.1 * recencyScore`, all three
/// terms on a `[0, 100]` scale. Higher is better.
pub fn score(inputs: AccountScoreInputs) -> f64 {
    let quota_health = inputs.quota_health.clamp(0.0, 100.0);

    let usage_score = (100.0 - (inputs.usage_count as f64) / USAGE_SCORE_DIVISOR).max(0.0);

    let recency_score = match inputs.last_used_at {
        None => NEVER_USED_RECENCY_SCORE,
        Some(last_used_at) => {
            let minutes = (Utc::now() - last_used_at).num_seconds() as f64 / 60.0;
            minutes.clamp(0.0, 100.0)
        }
    };

    QUOTA_WEIGHT * quota_health + USAGE_WEIGHT * usage_score + RECENCY_WEIGHT * recency_score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unused_account_outscores_a_heavily_used_one_at_equal_quota_health() {
        let fresh = score(AccountScoreInputs {
            quota_health: 100.0,
            usage_count: 0,
            last_used_at: None,
        });
        let heavily_used = score(AccountScoreInputs {
            quota_health: 100.0,
            usage_count: 500,
            last_used_at: Some(Utc::now()),
        });
        assert!(fresh > heavily_used);
    }

    #[test]
    fn quota_health_dominates_the_score() {
        let healthy_but_used = score(AccountScoreInputs {
            quota_health: 100.0,
            usage_count: 1000,
            last_used_at: Some(Utc::now()),
        });
        let unhealthy_and_fresh = score(AccountScoreInputs {
            quota_health: 0.0,
            usage_count: 0,
            last_used_at: None,
        });
        assert!(healthy_but_used > unhealthy_and_fresh);
    }

    #[test]
    fn recently_used_account_scores_below_a_stale_one() {
        let recently_used = score(AccountScoreInputs {
            quota_health: 100.0,
            usage_count: 0,
            last_used_at: Some(Utc::now()),
        });
        let stale = score(AccountScoreInputs {
            quota_health: 100.0,
            usage_count: 0,
            last_used_at: Some(Utc::now() - chrono::Duration::hours(1)),
        });
        assert!(stale > recently_used);
    }

    #[test]
    fn never_used_recency_term_is_low_not_high() {
        // A never-used credential shouldn't outrank one merely used a
        // while ago on the recency term alone.
        let never_used = score(AccountScoreInputs {
            quota_health: 100.0,
            usage_count: 0,
            last_used_at: None,
        });
        let used_an_hour_ago = score(AccountScoreInputs {
            quota_health: 100.0,
            usage_count: 0,
            last_used_at: Some(Utc::now() - chrono::Duration::hours(1)),
        });
        assert!(used_an_hour_ago > never_used);
    }

    #[test]
    fn usage_score_floors_at_zero() {
        let extreme = score(AccountScoreInputs {
            quota_health: 100.0,
            usage_count: 1_000_000,
            last_used_at: Some(Utc::now() - chrono::Duration::hours(2)),
        });
        assert!((extreme - (80.0 + 0.0 + 10.0)).abs() < 1e-9);
    }
}
