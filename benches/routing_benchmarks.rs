//! # Routing Benchmarks
//!
//! Path matching and registry lookup sit on every proxied request.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use url::Url;

use service_gateway::{Backend, BackendRegistry, ProxyRouter, RoutePath};

fn registry(count: usize) -> Arc<BackendRegistry> {
    let backends = (0..count).map(|i| {
        let url = Url::parse(&format!("http://service{}:8080", i)).unwrap();
        Backend::new(format!("service{}", i), url)
    });
    Arc::new(BackendRegistry::from_backends(backends))
}

/// Benchmark the segment matcher alone
fn benchmark_path_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("path_parsing");

    for path in [
        "/api/users",
        "/api/users/42",
        "/api/products/17/reviews/3/comments/",
        "/static/app.js",
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(path), path, |b, path| {
            b.iter(|| RoutePath::parse(black_box("api"), black_box(path)))
        });
    }

    group.finish();
}

/// Benchmark full routing against registries of different sizes
fn benchmark_route_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("route_resolution");

    for &count in &[2usize, 50, 500] {
        let router = ProxyRouter::new("api", registry(count));
        let path = format!("/api/service{}/items/42", count / 2);

        group.bench_with_input(BenchmarkId::new("backends", count), &path, |b, path| {
            b.iter(|| {
                let target = router.route(black_box(path)).unwrap();
                black_box(target.upstream_url(Some("page=1")))
            })
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_path_parsing, benchmark_route_resolution);
criterion_main!(benches);
