use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use iam_authz::iam::{AccessLevel, PatternMatcher, PolicyEvaluator, RequestContext};
use iam_authz::model::{ResourceAction, ResourceShare, StoredPolicy};
use iam_authz::{AuthorizationRequest, Authorizer, AuthzConfig, MemoryStore, PrincipalRef};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

/// Create a complex policy with multiple statements
fn complex_policy() -> String {
    r#"{
        "Version": "2012-10-17",
        "Statement": [
            {"Sid": "Public", "Effect": "Allow", "Action": "blog:read", "Resource": "blog/*"},
            {"Sid": "Own", "Effect": "Allow", "Action": ["blog:update", "blog:delete"],
             "Resource": "blog/*", "Condition": {"StringEquals": {"blog:owner": "alice"}}},
            {"Sid": "Frozen", "Effect": "Deny", "Action": "blog:*", "Resource": "blog/archive/*"}
        ]
    }"#
    .to_string()
}

fn seeded_store(policies: usize, shares: usize) -> (Arc<MemoryStore>, PrincipalRef) {
    let store = Arc::new(MemoryStore::new());
    let alice = PrincipalRef::user("org-a", "alice");

    for i in 0..policies {
        let id = format!("p{}", i);
        store.insert_policy(StoredPolicy::new(id.as_str(), "org-a", complex_policy()));
        store.attach_policy(&alice, &id);
    }
    for i in 0..shares {
        store.add_resource_share(ResourceShare::new(
            format!("s{}", i),
            &alice,
            format!("doc/{}", i),
            AccessLevel::Editor,
        ));
    }

    (store, alice)
}

/// Pattern matching (hot path of every statement)
fn bench_pattern_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("pattern_matching");

    let cases = [
        ("exact", "blog:read", "blog:read"),
        ("trailing_wildcard", "blog:*", "blog:update"),
        ("segment_wildcard", "arn:app:*:blog/*", "arn:app:org-a:blog/123"),
    ];

    for (name, pattern, candidate) in cases {
        group.bench_function(name, |b| {
            b.iter(|| PatternMatcher::matches(black_box(pattern), black_box(candidate)))
        });
    }

    group.finish();
}

/// Evaluate a compiled document
fn bench_policy_eval(c: &mut Criterion) {
    let evaluator = PolicyEvaluator::default();
    let doc = evaluator.parse(&complex_policy()).unwrap();
    let mut context = RequestContext::new();
    context.insert("blog:owner".to_string(), "alice".into());

    c.bench_function("policy_eval_compiled", |b| {
        b.iter(|| {
            black_box(evaluator.evaluate(&doc, black_box("blog:update"), black_box("blog/42"), &context))
        })
    });

    c.bench_function("policy_parse_and_eval", |b| {
        b.iter(|| {
            black_box(evaluator.evaluate_json(&complex_policy(), "blog:update", "blog/42", &context))
        })
    });
}

/// Full authorize() with and without the grant cache
fn bench_authorize(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("authorize");

    for policies in [1usize, 10, 50] {
        let (store, alice) = seeded_store(policies, 10);
        let request = AuthorizationRequest::new(alice, "blog:update", "blog/42")
            .with_context("blog:owner", "alice");
        let cancel = CancellationToken::new();

        let uncached = Authorizer::new(store.clone(), &AuthzConfig::default()).unwrap();
        group.bench_with_input(BenchmarkId::new("uncached", policies), &policies, |b, _| {
            b.iter(|| runtime.block_on(uncached.authorize(&request, &cancel)).unwrap())
        });

        let config = AuthzConfig::from_toml_str("[cache]\nenabled = true").unwrap();
        let cached = Authorizer::new(store, &config).unwrap();
        group.bench_with_input(BenchmarkId::new("cached", policies), &policies, |b, _| {
            b.iter(|| runtime.block_on(cached.authorize(&request, &cancel)).unwrap())
        });
    }

    group.finish();
}

/// One fetch for many checks
fn bench_authorize_batch(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let (store, alice) = seeded_store(10, 50);
    let authz = Authorizer::new(store, &AuthzConfig::default()).unwrap();
    let cancel = CancellationToken::new();
    let context = RequestContext::new();

    let mut group = c.benchmark_group("authorize_batch");

    for count in [10usize, 100] {
        let checks: Vec<ResourceAction> = (0..count)
            .map(|i| ResourceAction::new("doc:update", format!("doc/{}", i % 60)))
            .collect();

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &checks, |b, checks| {
            b.iter(|| {
                runtime
                    .block_on(authz.authorize_batch(&alice, checks, &context, &cancel))
                    .unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_pattern_matching,
    bench_policy_eval,
    bench_authorize,
    bench_authorize_batch
);
criterion_main!(benches);
