use chrono::{Duration, TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use sitewatch::{
    incidents::{self, IncidentPolicy},
    scoring::{self, MetricWeights},
    types::{Audit, NewAudit, Resource, ResourceAudits},
    uptime,
};
use std::hint::black_box;

fn history(resource_id: i64, days: i64) -> Vec<Audit> {
    let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
    (0..days)
        .map(|d| {
            let status = if d % 11 == 0 { 503 } else { 200 };
            let mut audit = NewAudit::liveness_only(resource_id, status, now - Duration::days(d));
            audit.performance_mobile = Some(70.0);
            audit.performance_desktop = Some(90.0);
            audit.seo = Some(100.0);
            audit.into_audit(resource_id * 100_000 + d)
        })
        .collect()
}

fn uptime_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("uptime_history");
    let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();

    for days in [60, 365, 3650] {
        let audits = history(1, days);
        group.bench_with_input(BenchmarkId::from_parameter(days), &audits, |b, audits| {
            b.iter(|| black_box(uptime::build_history(audits, now)));
        });
    }

    group.finish();
}

fn incident_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("incident_detection");
    let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
    let policy = IncidentPolicy::default();

    for resources in [10, 100] {
        let input: Vec<ResourceAudits> = (0..resources)
            .map(|id| ResourceAudits {
                resource: Resource::site(id, format!("site-{}", id), format!("https://{}.test", id)),
                audits: history(id, 365),
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(resources), &input, |b, input| {
            b.iter(|| black_box(incidents::detect(input, now, &policy)));
        });
    }

    group.finish();
}

fn scoring_benchmark(c: &mut Criterion) {
    let weights = MetricWeights::default();
    let latest: Vec<Audit> = (0..500).map(|id| history(id, 1).remove(0)).collect();

    c.bench_function("resource_score_500_pages", |b| {
        b.iter(|| black_box(scoring::resource_score(latest.iter().map(Some), &weights)));
    });
}

criterion_group!(benches, uptime_benchmark, incident_benchmark, scoring_benchmark);
criterion_main!(benches);
