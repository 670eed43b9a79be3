//! Benchmarks for ports tree scanning and dependency resolution.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::fs;
use std::hint::black_box;
use std::path::Path;
use tempfile::TempDir;
use webports_lib::paths::Layout;
use webports_lib::Storage;

/// Create a port directory with a descriptor.
fn create_port(root: &Path, name: &str, depends: &[String]) {
    let port_dir = root.join("ports").join(name);
    fs::create_dir_all(&port_dir).unwrap();

    let mut content = format!("NAME={}\nVERSION=1.0\n", name);
    if !depends.is_empty() {
        content.push_str(&format!("DEPENDS=({})\n", depends.join(" ")));
    }
    fs::write(port_dir.join("pkg_info"), content).unwrap();
}

/// Create a tree with N ports that all depend on `base`.
fn create_flat_tree(n: usize) -> TempDir {
    let dir = TempDir::new().unwrap();
    create_port(dir.path(), "base", &[]);
    for i in 0..n {
        create_port(dir.path(), &format!("port{}", i), &["base".to_string()]);
    }
    dir
}

/// Create a dependency chain: port0 -> port1 -> ... -> port<depth-1>.
fn create_chain_tree(depth: usize) -> TempDir {
    let dir = TempDir::new().unwrap();
    create_port(dir.path(), &format!("port{}", depth - 1), &[]);
    for i in (0..depth - 1).rev() {
        create_port(dir.path(), &format!("port{}", i), &[format!("port{}", i + 1)]);
    }
    dir
}

/// Layered graph: each port depends on every port of the layer below.
fn create_layered_tree(layers: usize, width: usize) -> TempDir {
    let dir = TempDir::new().unwrap();
    for layer in (0..layers).rev() {
        let below: Vec<String> = if layer + 1 < layers {
            (0..width).map(|w| format!("l{}w{}", layer + 1, w)).collect()
        } else {
            Vec::new()
        };
        for w in 0..width {
            create_port(dir.path(), &format!("l{}w{}", layer, w), &below);
        }
    }
    dir
}

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("storage_scan");

    for size in [10, 50, 100, 200] {
        let dir = create_flat_tree(size);
        let layout = Layout::new(dir.path(), None);

        group.bench_with_input(BenchmarkId::new("flat", size), &size, |b, _| {
            b.iter(|| {
                let storage = Storage::scan(black_box(&layout)).unwrap();
                black_box(storage.count())
            });
        });
    }

    group.finish();
}

fn bench_transitive(c: &mut Criterion) {
    let mut group = c.benchmark_group("transitive_dependencies");

    for depth in [5, 20, 50] {
        let dir = create_chain_tree(depth);
        let storage = Storage::scan(&Layout::new(dir.path(), None)).unwrap();

        group.bench_with_input(BenchmarkId::new("chain", depth), &depth, |b, _| {
            b.iter(|| {
                let deps = storage.transitive_dependencies(black_box("port0")).unwrap();
                black_box(deps.len())
            });
        });
    }

    for (layers, width) in [(4, 4), (6, 6), (8, 8)] {
        let dir = create_layered_tree(layers, width);
        let storage = Storage::scan(&Layout::new(dir.path(), None)).unwrap();
        let label = format!("{}x{}", layers, width);

        group.bench_with_input(BenchmarkId::new("layered", &label), &label, |b, _| {
            b.iter(|| {
                let deps = storage.transitive_dependencies(black_box("l0w0")).unwrap();
                black_box(deps.len())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_scan, bench_transitive);
criterion_main!(benches);
