//! Benchmarks for the decimation engine.
//!
//! Run with: cargo bench -p mesh-decimate
//!
//! To compare against baseline:
//! 1. First run: cargo bench -p mesh-decimate -- --save-baseline main
//! 2. After changes: cargo bench -p mesh-decimate -- --baseline main

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mesh_decimate::{
    decimate, decimate_budget, BudgetOptions, DecimateFlags, IndexBuffer, Operation, VertexBuffer,
};

fn make_uv_sphere(rings: u32, sectors: u32, radius: f32) -> (Vec<f32>, Vec<u32>) {
    let mut vertices = Vec::new();
    for i in 0..rings {
        let theta = std::f32::consts::PI * i as f32 / (rings - 1) as f32;
        for j in 0..sectors {
            let phi = 2.0 * std::f32::consts::PI * j as f32 / sectors as f32;
            vertices.push(radius * theta.sin() * phi.cos());
            vertices.push(radius * theta.cos());
            vertices.push(radius * theta.sin() * phi.sin());
        }
    }
    let mut indices = Vec::new();
    for i in 0..rings - 1 {
        for j in 0..sectors {
            let next_j = (j + 1) % sectors;
            let curr = i * sectors;
            let next = (i + 1) * sectors;
            indices.extend_from_slice(&[curr + j, next + j, next + next_j]);
            indices.extend_from_slice(&[curr + j, next + next_j, curr + next_j]);
        }
    }
    (vertices, indices)
}

fn flags() -> DecimateFlags {
    DecimateFlags {
        triangle_winding_ccw: true,
        ..DecimateFlags::none()
    }
}

fn bench_decimate_spheres(c: &mut Criterion) {
    let mut group = c.benchmark_group("decimate_sphere");
    for (rings, sectors) in [(20u32, 20u32), (40, 40), (80, 80)] {
        let (vertices, indices) = make_uv_sphere(rings, sectors, 0.5);
        let tri_count = indices.len() / 3;
        group.throughput(Throughput::Elements(tri_count as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{rings}x{sectors}")),
            &(vertices, indices),
            |b, (vertices, indices)| {
                b.iter(|| {
                    let mut v = vertices.clone();
                    let mut i = indices.clone();
                    let mut op = Operation::new(
                        VertexBuffer::f32(&mut v, 3),
                        vertices.len() / 3,
                        IndexBuffer::u32(&mut i, 3),
                        tri_count,
                    );
                    op.set_strength(0.3);
                    decimate(&mut op, 1, flags()).unwrap()
                });
            },
        );
    }
    group.finish();
}

fn bench_thread_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("decimate_threads");
    let (vertices, indices) = make_uv_sphere(80, 80, 0.5);
    let tri_count = indices.len() / 3;
    group.throughput(Throughput::Elements(tri_count as u64));
    for threads in [1usize, 2, 4, 8] {
        group.bench_with_input(
            BenchmarkId::from_parameter(threads),
            &threads,
            |b, &threads| {
                b.iter(|| {
                    let mut v = vertices.clone();
                    let mut i = indices.clone();
                    let mut op = Operation::new(
                        VertexBuffer::f32(&mut v, 3),
                        vertices.len() / 3,
                        IndexBuffer::u32(&mut i, 3),
                        tri_count,
                    );
                    op.set_strength(0.3);
                    decimate(&mut op, threads, flags()).unwrap()
                });
            },
        );
    }
    group.finish();
}

fn bench_budget_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("decimate_budget");
    group.sample_size(10);
    let (vertices, indices) = make_uv_sphere(40, 40, 0.5);
    let tri_count = indices.len() / 3;
    group.bench_function("sphere_40x40_to_1000", |b| {
        b.iter(|| {
            let mut v = vertices.clone();
            let mut i = indices.clone();
            let mut op = Operation::new(
                VertexBuffer::f32(&mut v, 3),
                vertices.len() / 3,
                IndexBuffer::u32(&mut i, 3),
                tri_count,
            );
            let mut budget = BudgetOptions::default();
            decimate_budget(&mut op, 1000, 1, flags(), &mut budget).unwrap()
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_decimate_spheres,
    bench_thread_scaling,
    bench_budget_search
);
criterion_main!(benches);
