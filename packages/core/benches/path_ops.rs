//! Performance benchmarks for PathTree core operations
//!
//! Run with: `cargo bench -p pathtree-core`
//!
//! These benchmarks measure:
//! - Path algebra on deep paths (ancestors, containment, rebase)
//! - Node identifier generation
//! - Batch creation throughput
//! - Subtree move cost as a function of subtree size

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pathtree_core::config::TreeConfig;
use pathtree_core::models::{CreateNodeParams, IdSource, TenantScope, TreePath, UlidSource};
use pathtree_core::services::TreeService;
use tempfile::TempDir;
use tokio::runtime::Runtime;

/// Setup a service with a fresh database
async fn setup_test_service() -> (TreeService, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let service = TreeService::open(temp_dir.path().join("bench.db"), TreeConfig::default())
        .await
        .unwrap();
    (service, temp_dir)
}

fn deep_path(depth: usize) -> TreePath {
    let ids = UlidSource::new();
    TreePath::from_segments((0..depth).map(|_| ids.new_id().to_string())).unwrap()
}

fn bench_path_algebra(c: &mut Criterion) {
    let path = deep_path(32);
    let ancestor = path.ancestor_at_depth(8).unwrap();
    let target = deep_path(4);

    c.bench_function("path_ancestors_depth_32", |b| {
        b.iter(|| black_box(&path).ancestors())
    });

    c.bench_function("path_contains", |b| {
        b.iter(|| black_box(&ancestor).contains(black_box(&path)))
    });

    c.bench_function("path_rebase", |b| {
        b.iter(|| black_box(&path).rebase(&ancestor, &target).unwrap())
    });

    c.bench_function("path_parse", |b| {
        let raw = path.to_string();
        b.iter(|| TreePath::parse(black_box(raw.as_str())).unwrap())
    });
}

fn bench_id_generation(c: &mut Criterion) {
    let ids = UlidSource::new();
    c.bench_function("node_id_new", |b| b.iter(|| ids.new_id()));
}

/// Throughput of one 500-node batch
fn bench_batch_create(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let tenant = TenantScope::new("organizations", "bench").unwrap();

    c.bench_function("batch_create_500", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let (service, _temp) = setup_test_service().await;
                let root = service.get_root_node(&tenant).await.unwrap();

                let start = std::time::Instant::now();
                for i in 0..iters {
                    let items = (0..500)
                        .map(|n| CreateNodeParams::new(format!("n{}-{}", i, n), root.path.clone()))
                        .collect();
                    service.batch_create_nodes(&tenant, items).await.unwrap();
                }
                start.elapsed()
            })
        });
    });
}

/// Move a subtree of N nodes back and forth between two parents
fn bench_subtree_move(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let tenant = TenantScope::new("organizations", "bench").unwrap();
    let mut group = c.benchmark_group("subtree_move");

    for size in [10usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter_custom(|iters| {
                rt.block_on(async {
                    let (service, _temp) = setup_test_service().await;
                    let root = service.get_root_node(&tenant).await.unwrap();
                    let left = service
                        .create_node(&tenant, CreateNodeParams::new("left", root.path.clone()))
                        .await
                        .unwrap();
                    let right = service
                        .create_node(&tenant, CreateNodeParams::new("right", root.path.clone()))
                        .await
                        .unwrap();
                    let moving = service
                        .create_node(&tenant, CreateNodeParams::new("moving", left.path.clone()))
                        .await
                        .unwrap();
                    let items = (0..size)
                        .map(|n| CreateNodeParams::new(format!("leaf {}", n), moving.path.clone()))
                        .collect();
                    service.batch_create_nodes(&tenant, items).await.unwrap();

                    let mut current = moving.path.clone();
                    let start = std::time::Instant::now();
                    for i in 0..iters {
                        let target = if i % 2 == 0 { &right.path } else { &left.path };
                        current = service
                            .move_node(&tenant, &current, target)
                            .await
                            .unwrap()
                            .path;
                    }
                    start.elapsed()
                })
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_path_algebra,
    bench_id_generation,
    bench_batch_create,
    bench_subtree_move
);
criterion_main!(benches);
