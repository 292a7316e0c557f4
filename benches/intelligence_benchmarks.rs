// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Lonkero Access - Performance Benchmarks
//! © 2026 Bountyy Oy
//!
//! Benchmarks for access analysis, injection detection and form extraction

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lonkero_access::crawler::{PathDiscovery, PathResult};
use lonkero_access::fuzzer::detection::DetectionInput;
use lonkero_access::fuzzer::surface::extract_forms;
use lonkero_access::fuzzer::{DetectionEngine, PayloadCategory};
use lonkero_access::intelligence::IntelligenceEngine;
use lonkero_access::rbac::{RoleDefinition, RoleHierarchy};
use std::collections::BTreeMap;

/// Role `r` of `roles` reaches the first `(r + 1) * paths / roles` paths
fn grid(roles: usize, paths: usize) -> BTreeMap<String, PathDiscovery> {
    (0..roles)
        .map(|r| {
            let role = format!("role_{}", r);
            let reach = (r + 1) * paths / roles;
            let results = (0..paths)
                .map(|p| PathResult {
                    path: format!("/section/{}", p),
                    role: role.clone(),
                    accessible: p < reach,
                    status_code: Some(if p < reach { 200 } else { 403 }),
                    response_time_ms: 50 + (p as u64 * 7) % 900,
                    final_url: None,
                    error: None,
                    screenshot_ref: None,
                    discovered_links: Vec::new(),
                    nav_element_count: 0,
                })
                .collect();
            (role.clone(), PathDiscovery::new(&role, results, 1000))
        })
        .collect()
}

fn chain(roles: usize) -> RoleHierarchy {
    let definitions: Vec<RoleDefinition> = (0..roles)
        .map(|r| {
            let def = RoleDefinition::new(&format!("role_{}", r), r as u32 + 1);
            if r == 0 {
                def
            } else {
                def.inherits(&format!("role_{}", r - 1))
            }
        })
        .collect();
    RoleHierarchy::build(&definitions).unwrap()
}

// Benchmark full intelligence analysis over growing role x path matrices
fn benchmark_intelligence_analysis(c: &mut Criterion) {
    let mut group = c.benchmark_group("intelligence_analysis");
    for (roles, paths) in [(3, 50), (6, 200), (12, 500)] {
        let discoveries = grid(roles, paths);
        let engine = IntelligenceEngine::new(chain(roles), Vec::new(), Vec::new());
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", roles, paths)),
            &discoveries,
            |b, d| b.iter(|| engine.analyze(black_box(d), &[], &[], &[]).unwrap()),
        );
    }
    group.finish();
}

// Benchmark response classification
fn benchmark_detection(c: &mut Criterion) {
    let engine = DetectionEngine::default();
    let baseline = "<html><body><form><input name=\"q\"></form></body></html>".repeat(20);
    let responses = [
        ("clean", "<p>No results</p>".repeat(50)),
        ("sql_error", format!("{}<pre>You have an error in your SQL syntax</pre>", "<p>x</p>".repeat(50))),
        ("reflected", format!("{}<script>alert('lonkero')</script>", "<p>x</p>".repeat(50))),
    ];

    let mut group = c.benchmark_group("detection");
    for (name, body) in &responses {
        group.bench_with_input(BenchmarkId::from_parameter(name), body, |b, body| {
            b.iter(|| {
                for category in [PayloadCategory::Sqli, PayloadCategory::Xss] {
                    let input = DetectionInput {
                        payload: "' OR '1'='1",
                        body,
                        dom: body,
                        baseline: Some(baseline.as_str()),
                        console: &[],
                    };
                    black_box(engine.classify(category, &input));
                }
            })
        });
    }
    group.finish();
}

// Benchmark form discovery on a large page
fn benchmark_form_extraction(c: &mut Criterion) {
    let form = r#"<form action="/orders" method="post">
        <input type="text" name="sku"><input type="number" name="qty">
        <input type="hidden" name="csrf" value="t"><textarea name="note"></textarea>
        <button type="submit">Save</button></form>"#;
    let html = format!("<html><body>{}</body></html>", form.repeat(40));

    c.bench_function("form_extraction", |b| {
        b.iter(|| extract_forms(black_box(&html), "https://wms.test/orders"))
    });
}

criterion_group!(
    benches,
    benchmark_intelligence_analysis,
    benchmark_detection,
    benchmark_form_extraction
);
criterion_main!(benches);
