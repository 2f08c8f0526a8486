//! Hourly aggregator: wakes periodically, rolls up `request_logs` rows for
//! the most recently settled hour into the three `hourly_summary_*` tables.
//!
//! Idempotent by construction: a summary row's presence for `hour_start` is
//! the only guard needed, so re-running the aggregator for an hour it has
//! already computed is a no-op (checked before every hour's computation,
//! including inside the catch-up walk).

use crate::db::{
    DbActorHandle, DbHourlySummaryByAccount, DbHourlySummaryByModel, DbHourlySummaryOverall,
    DbRequestLog,
};
use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use std::collections::HashMap;
use tokio::time::{Duration, interval};
use tracing::{error, info, warn};

/// How often the aggregator wakes to check for a settleable hour.
const WAKE_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// In-flight requests get this long to finish before their hour is
/// considered settled.
const SETTLE_DELAY: ChronoDuration = ChronoDuration::minutes(5);

/// Upper bound on how many hours a single wake will walk through, whether
/// on first start or recovering from a clock jump. Prevents a badly skewed
/// system clock from triggering an unbounded aggregation burst.
const MAX_CATCHUP_HOURS: i64 = 24 * 30;

fn floor_to_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.date_naive()
        .and_hms_opt(ts.hour(), 0, 0)
        .expect("hour is always in range 0..24")
        .and_utc()
}

/// Target hour for the current wake: the hour boundary `SETTLE_DELAY`
/// before now, floored. In-flight requests inside that window still have
/// time to finish before we'd miss them.
fn target_hour(now: DateTime<Utc>) -> DateTime<Utc> {
    floor_to_hour(now - SETTLE_DELAY)
}

fn percentile(sorted_ms: &[i64], p: f64) -> i64 {
    if sorted_ms.is_empty() {
        return 0;
    }
    let n = sorted_ms.len();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let idx = ((n as f64) * p).ceil() as usize;
    let idx = idx.saturating_sub(1).min(n - 1);
    sorted_ms[idx]
}

struct HourAggregate {
    overall: DbHourlySummaryOverall,
    by_model: Vec<DbHourlySummaryByModel>,
    by_account: Vec<DbHourlySummaryByAccount>,
}

/// Roll up every settled log (`finished_at` set) whose `created_at` falls in
/// `[hour_start, hour_start + 1h)` into the three summary shapes.
fn aggregate_hour(logs: &[DbRequestLog], hour_start: DateTime<Utc>, computed_at: DateTime<Utc>) -> HourAggregate {
    let settled: Vec<&DbRequestLog> = logs.iter().filter(|l| l.finished_at.is_some()).collect();

    let mut overall_latencies: Vec<i64> = Vec::new();
    let mut overall_requests = 0i64;
    let mut overall_errors = 0i64;
    let mut overall_prompt_tokens = 0i64;
    let mut overall_completion_tokens = 0i64;

    let mut by_model: HashMap<String, (i64, i64, i64, i64, Vec<i64>)> = HashMap::new();
    let mut by_account: HashMap<(String, i64), (i64, i64, i64, i64)> = HashMap::new();

    for log in &settled {
        overall_requests += 1;
        let is_error = !log.is_success.unwrap_or(false);
        if is_error {
            overall_errors += 1;
        }
        let prompt = log.prompt_tokens.unwrap_or(0);
        let completion = log.completion_tokens.unwrap_or(0);
        overall_prompt_tokens += prompt;
        overall_completion_tokens += completion;
        if let Some(latency) = log.latency_ms {
            overall_latencies.push(latency);
        }

        let model_entry = by_model.entry(log.model.clone()).or_insert((0, 0, 0, 0, Vec::new()));
        model_entry.0 += 1;
        if is_error {
            model_entry.1 += 1;
        }
        model_entry.2 += prompt;
        model_entry.3 += completion;
        if let Some(latency) = log.latency_ms {
            model_entry.4.push(latency);
        }

        if let Some(account_id) = log.account_id {
            let account_entry = by_account
                .entry((log.provider.clone(), account_id))
                .or_insert((0, 0, 0, 0));
            account_entry.0 += 1;
            if is_error {
                account_entry.1 += 1;
            }
            account_entry.2 += prompt;
            account_entry.3 += completion;
        }
    }

    overall_latencies.sort_unstable();
    let overall = DbHourlySummaryOverall {
        hour_start,
        request_count: overall_requests,
        error_count: overall_errors,
        prompt_tokens_total: overall_prompt_tokens,
        completion_tokens_total: overall_completion_tokens,
        latency_p50_ms: percentile(&overall_latencies, 0.50),
        latency_p95_ms: percentile(&overall_latencies, 0.95),
        latency_p99_ms: percentile(&overall_latencies, 0.99),
        computed_at,
    };

    let by_model = by_model
        .into_iter()
        .map(|(model, (request_count, error_count, prompt, completion, mut latencies))| {
            latencies.sort_unstable();
            DbHourlySummaryByModel {
                hour_start,
                model,
                request_count,
                error_count,
                prompt_tokens_total: prompt,
                completion_tokens_total: completion,
                latency_p50_ms: percentile(&latencies, 0.50),
                latency_p95_ms: percentile(&latencies, 0.95),
                latency_p99_ms: percentile(&latencies, 0.99),
                computed_at,
            }
        })
        .collect();

    let by_account = by_account
        .into_iter()
        .map(
            |((provider, account_id), (request_count, error_count, prompt, completion))| DbHourlySummaryByAccount {
                hour_start,
                provider,
                account_id,
                request_count,
                error_count,
                prompt_tokens_total: prompt,
                completion_tokens_total: completion,
                computed_at,
            },
        )
        .collect();

    HourAggregate {
        overall,
        by_model,
        by_account,
    }
}

/// Aggregate a single hour and persist it, unless a row already exists for
/// `hour_start` (the idempotency check happens first so a concurrent or
/// repeated call is a cheap no-op).
async fn aggregate_and_store(db: &DbActorHandle, hour_start: DateTime<Utc>) -> Result<(), crate::PolluxError> {
    if db.hourly_summary_exists(hour_start).await? {
        return Ok(());
    }

    let hour_end = hour_start + ChronoDuration::hours(1);
    let logs = db.query_logs_for_hour(hour_start, hour_end).await?;
    let computed_at = Utc::now();
    let agg = aggregate_hour(&logs, hour_start, computed_at);

    db.upsert_hourly_summary_overall(agg.overall).await?;
    for row in agg.by_model {
        db.upsert_hourly_summary_by_model(row).await?;
    }
    for row in agg.by_account {
        db.upsert_hourly_summary_by_account(row).await?;
    }

    info!(hour_start = %hour_start, "hourly summary computed");
    Ok(())
}

/// Walk every hour from `from` to `to` inclusive, aggregating each in turn,
/// bounded to `MAX_CATCHUP_HOURS` so a large gap (first start against a
/// long-lived log table, or a forward clock jump) can't turn one wake into
/// an unbounded burst of work; any remainder is picked up on a later wake.
async fn catch_up(db: &DbActorHandle, from: DateTime<Utc>, to: DateTime<Utc>) {
    let mut hour = from;
    let mut walked = 0i64;
    while hour <= to && walked < MAX_CATCHUP_HOURS {
        if let Err(e) = aggregate_and_store(db, hour).await {
            error!(hour_start = %hour, "hourly aggregation failed: {e}");
            break;
        }
        hour += ChronoDuration::hours(1);
        walked += 1;
    }
    if hour <= to {
        warn!(
            remaining_from = %hour,
            remaining_to = %to,
            "hourly aggregator catch-up hit its per-wake bound; remainder deferred to a later wake"
        );
    }
}

/// Background loop: on first wake, if no summary has ever been computed,
/// walk from the earliest log's hour up to `now - 1h` so a fresh deployment
/// against a pre-existing log table doesn't leave a gap. Every subsequent
/// wake aggregates the current target hour, catching up any hours skipped
/// since the last wake (bounded, per `catch_up`).
pub async fn run(db: DbActorHandle) {
    let mut ticker = interval(WAKE_INTERVAL);
    let mut last_target: Option<DateTime<Utc>> = None;

    loop {
        ticker.tick().await;
        let now = Utc::now();
        let target = target_hour(now);

        match db.any_hourly_summary_exists().await {
            Ok(false) => match db.earliest_log_timestamp().await {
                Ok(Some(earliest)) => {
                    catch_up(&db, floor_to_hour(earliest), target).await;
                }
                Ok(None) => { /* no logs yet, nothing to aggregate */ }
                Err(e) => error!("hourly aggregator: failed to read earliest log timestamp: {e}"),
            },
            Ok(true) => {
                let from = last_target.map_or(target, |prev| prev + ChronoDuration::hours(1));
                catch_up(&db, from, target).await;
            }
            Err(e) => error!("hourly aggregator: failed to check for existing summaries: {e}"),
        }

        last_target = Some(target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn log(model: &str, provider: &str, account_id: Option<i64>, latency_ms: i64, success: bool) -> DbRequestLog {
        DbRequestLog {
            id: 0,
            request_id: "r".to_string(),
            provider: provider.to_string(),
            account_id,
            model: model.to_string(),
            status_code: Some(if success { 200 } else { 500 }),
            retry_count: 0,
            prompt_tokens: Some(10),
            completion_tokens: Some(20),
            latency_ms: Some(latency_ms),
            error_kind: None,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 3, 0, 0).unwrap(),
            finished_at: Some(Utc.with_ymd_and_hms(2026, 1, 1, 3, 0, 1).unwrap()),
            conversation_id: None,
            session_id: None,
            is_success: Some(success),
            total_attempts: 1,
            time_to_first_byte_ms: Some(latency_ms),
            total_tokens: Some(30),
            is_rate_limited: false,
            rate_limit_reset_seconds: None,
            session_stickiness_used: false,
            client_ip: None,
            user_agent: None,
            originator: None,
            updated_at: None,
        }
    }

    #[test]
    fn percentile_matches_ceil_n_p_minus_one_formula() {
        let sorted = vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100];
        assert_eq!(percentile(&sorted, 0.50), 50);
        assert_eq!(percentile(&sorted, 0.95), 100);
        assert_eq!(percentile(&sorted, 0.99), 100);
    }

    #[test]
    fn percentile_of_empty_slice_is_zero() {
        assert_eq!(percentile(&[], 0.50), 0);
    }

    #[test]
    fn unfinished_requests_are_excluded_from_the_hour() {
        let hour = Utc.with_ymd_and_hms(2026, 1, 1, 3, 0, 0).unwrap();
        let mut unfinished = log("gemini-2.5-pro", "geminicli", Some(1), 100, true);
        unfinished.finished_at = None;
        let agg = aggregate_hour(&[unfinished], hour, Utc::now());
        assert_eq!(agg.overall.request_count, 0);
    }

    #[test]
    fn aggregate_hour_groups_by_model_and_by_provider_account() {
        let hour = Utc.with_ymd_and_hms(2026, 1, 1, 3, 0, 0).unwrap();
        let logs = vec![
            log("gemini-2.5-pro", "geminicli", Some(1), 100, true),
            log("gemini-2.5-pro", "geminicli", Some(1), 200, true),
            log("gemini-2.5-pro", "geminicli", Some(2), 300, false),
            log("claude-sonnet-4-5", "antigravity", Some(1), 50, true),
        ];
        let agg = aggregate_hour(&logs, hour, Utc::now());

        assert_eq!(agg.overall.request_count, 4);
        assert_eq!(agg.overall.error_count, 1);
        assert_eq!(agg.overall.prompt_tokens_total, 40);

        let pro = agg.by_model.iter().find(|m| m.model == "gemini-2.5-pro").unwrap();
        assert_eq!(pro.request_count, 3);
        assert_eq!(pro.error_count, 1);

        let geminicli_acct1 = agg
            .by_account
            .iter()
            .find(|a| a.provider == "geminicli" && a.account_id == 1)
            .unwrap();
        assert_eq!(geminicli_acct1.request_count, 2);

        let geminicli_acct2 = agg
            .by_account
            .iter()
            .find(|a| a.provider == "geminicli" && a.account_id == 2)
            .unwrap();
        assert_eq!(geminicli_acct2.error_count, 1);
    }

    #[test]
    fn target_hour_applies_the_five_minute_settle_delay() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 3, 4, 0).unwrap();
        assert_eq!(target_hour(now), Utc.with_ymd_and_hms(2026, 1, 1, 2, 0, 0).unwrap());

        let now = Utc.with_ymd_and_hms(2026, 1, 1, 3, 6, 0).unwrap();
        assert_eq!(target_hour(now), Utc.with_ymd_and_hms(2026, 1, 1, 3, 0, 0).unwrap());
    }
}
