use criterion::{black_box, criterion_group, criterion_main, Criterion};
use debt_guardian::cache::{CacheStore, SqliteStore};
use debt_guardian::github::RepoMetadata;
use debt_guardian::issue::{Effort, Issue, IssueType, Location, Severity};
use debt_guardian::llm::{Conversation, Unavailable};
use debt_guardian::rank::RankingEngine;
use debt_guardian::safe_apply::SafetyValidator;
use debt_guardian::score::score_issue;
use serde_json::json;

const TYPES: [IssueType; 6] = [
    IssueType::HardcodedPassword,
    IssueType::BareExcept,
    IssueType::LongMethod,
    IssueType::MissingDocstring,
    IssueType::GodClass,
    IssueType::NoTests,
];
const SEVERITIES: [Severity; 4] = [Severity::Critical, Severity::High, Severity::Medium, Severity::Low];
const EFFORTS: [Effort; 3] = [Effort::Minutes, Effort::Hours, Effort::Days];

fn synthetic_issues(count: usize) -> Vec<Issue> {
    (0..count)
        .map(|i| {
            Issue::new(
                TYPES[i % TYPES.len()].clone(),
                SEVERITIES[i % SEVERITIES.len()],
                format!("synthetic finding {i}"),
                Location::new(format!("pkg_{:03}/module_{:05}.py", i % 120, i), Some((i % 400) as u32 + 1)),
                EFFORTS[i % EFFORTS.len()],
            )
        })
        .collect()
}

fn bench_score(c: &mut Criterion) {
    let issues = synthetic_issues(10_000);
    c.bench_function("score_issue_10k", |b| {
        b.iter(|| {
            for (idx, issue) in issues.iter().enumerate() {
                black_box(score_issue(black_box(issue), idx));
            }
        });
    });
}

fn bench_rank(c: &mut Criterion) {
    let issues = synthetic_issues(10_000);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");
    let repo = RepoMetadata::default();
    let engine = RankingEngine::new(&Unavailable);

    c.bench_function("rank_rule_based_10k", |b| {
        b.iter(|| {
            let mut conversation = Conversation::default();
            let ranked = runtime.block_on(engine.rank(&mut conversation, &issues, &repo));
            black_box(ranked.len());
        });
    });
}

fn bench_safety_gate(c: &mut Criterion) {
    let original: String = (0..400)
        .map(|i| format!("def handler_{i}(event):\n    try:\n        return process(event)\n    except:\n        return None\n\n"))
        .collect();
    let patched = original.replace("except:", "except Exception:");

    c.bench_function("safety_validate_400_functions", |b| {
        b.iter(|| {
            let mut gate = SafetyValidator::new();
            black_box(gate.validate(black_box(&original), black_box(&patched)).passed());
        });
    });
}

fn bench_sqlite_cache(c: &mut Criterion) {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut store = SqliteStore::open(&temp.path().join("cache.db")).expect("open store");
    for i in 0..1_000 {
        store
            .set(&format!("fix_bare_except_m{i}.py:1"), json!({ "id": i }), None)
            .expect("seed cache");
    }

    c.bench_function("sqlite_cache_get", |b| {
        let mut i = 0usize;
        b.iter(|| {
            i = (i + 1) % 1_000;
            black_box(store.get(&format!("fix_bare_except_m{i}.py:1")).ok());
        });
    });
}

criterion_group!(
    perf_core,
    bench_score,
    bench_rank,
    bench_safety_gate,
    bench_sqlite_cache
);
criterion_main!(perf_core);
