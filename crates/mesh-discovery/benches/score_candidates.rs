//! Candidate scoring and discovery benchmark
//!
//! Discovery runs on the join path, so scoring a realistic pool has to
//! stay cheap. Pools are pre-registered; the measured section is score +
//! select only.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mesh_discovery::DiscoveryEngine;
use mesh_geo::GeoLocation;
use mesh_registry::{MeshNode, NodeRegistry};
use mesh_telemetry::{NetworkMetrics, Sample};
use std::sync::Arc;

const REGIONS: [&str; 6] = [
    "us-east", "us-west", "eu-west", "eu-central", "ap-south", "sa-east",
];

fn populate(count: usize) -> Arc<NodeRegistry> {
    let registry = Arc::new(NodeRegistry::new());
    for i in 0..count {
        let region = REGIONS[i % REGIONS.len()];
        let lat = -60.0 + (i % 120) as f64;
        let lon = -170.0 + (i % 340) as f64;
        registry.register(
            MeshNode::new(format!("node-{i}"), "10.0.0.1", 7700)
                .with_location(GeoLocation::new(lat, lon).with_region(region)),
        );
        registry.update_metrics(
            &format!("node-{i}").as_str().into(),
            chrono::Utc::now(),
            &Sample {
                metrics: NetworkMetrics {
                    latency_ms: 10.0 + (i % 200) as f64,
                    bandwidth_mbps: 40.0 + (i % 60) as f64,
                    packet_loss_pct: (i % 5) as f64 * 0.1,
                    uptime_pct: 99.0,
                    cpu_load_pct: (i % 90) as f64,
                    memory_load_pct: (i % 70) as f64,
                },
                reachable: true,
            },
        );
    }
    registry
}

fn discover_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("discover");

    for pool_size in [100usize, 1_000, 10_000] {
        let registry = populate(pool_size);
        let engine = DiscoveryEngine::new(registry);
        let local = MeshNode::new("local", "10.0.0.200", 7700)
            .with_location(GeoLocation::new(40.7, -74.0).with_region("us-east"));

        group.bench_with_input(
            BenchmarkId::from_parameter(pool_size),
            &pool_size,
            |b, _| b.iter(|| black_box(engine.discover(&local, 8, 3))),
        );
    }

    group.finish();
}

criterion_group!(benches, discover_benchmark);
criterion_main!(benches);
