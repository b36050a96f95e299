//! Benchmarks for routing decisions.
//!
//! Route planning, catalog ranking and continuity budgeting all run on every
//! request before any provider is contacted, so each should stay well under
//! a millisecond.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use switchyard::budget::budget_prompt;
use switchyard::config::{ContinuityConfig, FederationConfig, RoutingConfig};
use switchyard::federation::{
    rank_candidates, ArousalTier, Catalog, LatencyTarget, RankInputs, RankPolicy, RankRequest,
};
use switchyard::provider::ChatMessage;
use switchyard::routing::{plan_route, BackendId, RouteRequest, TaskClass};

/// Catalog with one local provider and `external` cloud providers of three
/// models each.
fn create_catalog(external: usize) -> Catalog {
    let mut toml = String::from(
        r#"
[[providers]]
provider_id = "ollama"
kind = "local"
models = [{ model_id = "llama3.2:3b" }]
"#,
    );
    for i in 0..external {
        let label = match i % 3 {
            0 => "free_tier",
            1 => "low_latency",
            _ => "paid_fallback",
        };
        toml.push_str(&format!(
            r#"
[[providers]]
provider_id = "cloud-{i}"
kind = "external"
base_url = {{ default = "https://cloud-{i}.example.com/v1" }}
routing_tags = {{ labels = ["{label}"], prefers = ["NON_BASIC"] }}

[[providers.models]]
model_id = "small"
context_window_hint = 8192

[[providers.models]]
model_id = "medium"
context_window_hint = 32768

[[providers.models]]
model_id = "large"
context_window_hint = 200000
tool_support = true
"#
        ));
    }
    Catalog::from_toml_str(&toml).unwrap()
}

fn all_healthy(catalog: &Catalog) -> RankInputs {
    RankInputs {
        adapters: catalog.iter().map(|e| e.provider_id.clone()).collect(),
        health: catalog
            .iter()
            .map(|e| (e.provider_id.clone(), true))
            .collect(),
        ..Default::default()
    }
}

fn bench_plan_route(c: &mut Criterion) {
    let config = RoutingConfig::default();
    let request = RouteRequest {
        task_class: None,
        task_text: "refactor the session cache and fix the flaky integration tests".to_string(),
        requires_claude: false,
        allow_network: true,
        preferred_backend: Some(BackendId::Api),
    };

    c.bench_function("plan_route_inferred_class", |b| {
        b.iter(|| black_box(plan_route(black_box(&request), &config)));
    });
}

/// Ranking scores every surviving (provider, model) pair and sorts them.
fn bench_rank_by_catalog_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("rank_candidates");
    let policy = RankPolicy::from_config(&FederationConfig {
        enabled: true,
        cloud_enabled: true,
        ..Default::default()
    })
    .unwrap();
    let request = RankRequest {
        task_class: TaskClass::NonBasic,
        context_tokens: 12_000,
        latency_target: LatencyTarget::Normal,
        budget_ceiling_usd: None,
        arousal: Some(ArousalTier::High),
    };

    for count in [1, 5, 25, 50] {
        let catalog = create_catalog(count);
        let inputs = all_healthy(&catalog);

        group.bench_with_input(BenchmarkId::new("providers", count), &count, |b, _| {
            b.iter(|| black_box(rank_candidates(&catalog, &request, &inputs, &policy)));
        });
    }

    group.finish();
}

/// Continuity budgeting of long histories down to the local char ceiling.
fn bench_budget_prompt_by_history(c: &mut Criterion) {
    let mut group = c.benchmark_group("budget_prompt");
    let config = ContinuityConfig::default();
    let summary = "decided to keep the cache; next: fix retries. ".repeat(60);

    for turns in [10, 50, 200] {
        let mut messages = vec![ChatMessage::system("You are a careful assistant.")];
        for i in 0..turns {
            let body = format!("turn {i}: ").repeat(80);
            messages.push(if i % 2 == 0 {
                ChatMessage::user(body)
            } else {
                ChatMessage::assistant(body)
            });
        }

        group.bench_with_input(BenchmarkId::new("turns", turns), &turns, |b, _| {
            b.iter(|| black_box(budget_prompt(&messages, Some(&summary), &config)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_plan_route,
    bench_rank_by_catalog_size,
    bench_budget_prompt_by_history
);
criterion_main!(benches);
