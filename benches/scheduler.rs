//! Benchmarks for the account-selector scoring formula
//! (`pollux::pool::score`), run under `--features bench` since it needs no
//! live config/db and is cheap enough to be dominated by harness overhead
//! without a dedicated feature gate to opt into explicitly.

use chrono::Utc;
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use pollux::pool::{AccountScoreInputs, score};

fn candidate_pool(n: usize) -> Vec<AccountScoreInputs> {
    (0..n)
        .map(|i| AccountScoreInputs {
            quota_health: ((i * 7) % 100) as f64,
            usage_count: (i * 13) as u64,
            last_used_at: if i % 5 == 0 {
                None
            } else {
                Some(Utc::now() - chrono::Duration::minutes((i % 240) as i64))
            },
        })
        .collect()
}

fn bench_score_single(c: &mut Criterion) {
    let inputs = AccountScoreInputs {
        quota_health: 87.5,
        usage_count: 42,
        last_used_at: Some(Utc::now() - chrono::Duration::minutes(5)),
    };
    c.bench_function("score_single_candidate", |b| {
        b.iter(|| score(black_box(inputs)));
    });
}

fn bench_rank_pool(c: &mut Criterion) {
    let pool = candidate_pool(64);
    c.bench_function("rank_64_candidates", |b| {
        b.iter(|| {
            let mut scored: Vec<(usize, f64)> = pool
                .iter()
                .enumerate()
                .map(|(i, inputs)| (i, score(black_box(*inputs))))
                .collect();
            scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
            black_box(scored)
        });
    });
}

criterion_group!(benches, bench_score_single, bench_rank_pool);
criterion_main!(benches);
