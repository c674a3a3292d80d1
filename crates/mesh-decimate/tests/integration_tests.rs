//! End-to-end tests for the decimation engine.
//!
//! These exercise the full pipeline — build, partitioned collapse loop,
//! budget search, writeback — on generated meshes: cubes, UV spheres
//! (matching the pole-degenerate layout common in scan pipelines), flat
//! grids, and tiny strips.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use mesh_decimate::{
    decimate, decimate_budget, BudgetOptions, DecimateFlags, IndexBuffer, Operation, Stage,
    StatusCallback, VertexBuffer,
};

// =============================================================================
// Mesh generators
// =============================================================================

/// Axis-aligned cube, CCW winding from outside.
fn make_cube(size: f32) -> (Vec<f32>, Vec<u32>) {
    let s = size;
    let vertices = vec![
        0.0, 0.0, 0.0, s, 0.0, 0.0, s, s, 0.0, 0.0, s, 0.0, 0.0, 0.0, s, s, 0.0, s, s, s, s,
        0.0, s, s,
    ];
    let indices = vec![
        0, 2, 1, 0, 3, 2, 4, 5, 6, 4, 6, 7, 0, 1, 5, 0, 5, 4, 3, 7, 6, 3, 6, 2, 0, 4, 7, 0, 7,
        3, 1, 2, 6, 1, 6, 5,
    ];
    (vertices, indices)
}

/// UV sphere with `rings * sectors` vertices and `2 * (rings - 1) * sectors`
/// index triples, including the degenerate pole fans that real exporters
/// produce. Degenerate triples (repeated pole index) are filtered.
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
            for tri in [
                [curr + j, next + j, next + next_j],
                [curr + j, next + next_j, curr + next_j],
            ] {
                if tri[0] != tri[1] && tri[1] != tri[2] && tri[0] != tri[2] {
                    indices.extend_from_slice(&tri);
                }
            }
        }
    }
    (vertices, indices)
}

/// Flat n x n vertex grid on z = 0 spanning [0, 1] x [0, 1].
fn make_grid(n: u32) -> (Vec<f32>, Vec<u32>) {
    let mut vertices = Vec::new();
    for i in 0..n {
        for j in 0..n {
            vertices.push(j as f32 / (n - 1) as f32);
            vertices.push(i as f32 / (n - 1) as f32);
            vertices.push(0.0);
        }
    }
    let mut indices = Vec::new();
    for i in 0..n - 1 {
        for j in 0..n - 1 {
            let a = i * n + j;
            let b = i * n + j + 1;
            let c = (i + 1) * n + j;
            let d = (i + 1) * n + j + 1;
            indices.extend_from_slice(&[a, b, d]);
            indices.extend_from_slice(&[a, d, c]);
        }
    }
    (vertices, indices)
}

/// Two triangles sharing one edge.
fn make_strip() -> (Vec<f32>, Vec<u32>) {
    (
        vec![
            0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.5, 1.0, 0.0, 1.5, 1.0, 0.0,
        ],
        vec![0, 1, 2, 1, 3, 2],
    )
}

fn ccw() -> DecimateFlags {
    DecimateFlags {
        triangle_winding_ccw: true,
        ..DecimateFlags::none()
    }
}

/// Run one decimation on copies of the buffers, returning the live vertex
/// positions, the live triangles and the statistics.
fn run(
    vertices: &[f32],
    indices: &[u32],
    feature_size: f64,
    flags: DecimateFlags,
    threads: usize,
) -> (Vec<[f32; 3]>, Vec<[u32; 3]>, mesh_decimate::RunStats) {
    let mut v = vertices.to_vec();
    let mut i = indices.to_vec();
    let vertex_count = vertices.len() / 3;
    let tri_count = indices.len() / 3;
    let mut op = Operation::new(
        VertexBuffer::f32(&mut v, 3),
        vertex_count,
        IndexBuffer::u32(&mut i, 3),
        tri_count,
    );
    op.set_strength(feature_size);
    let stats = decimate(&mut op, threads, flags).expect("decimation should succeed");
    let out_v: Vec<[f32; 3]> = (0..stats.vertex_count)
        .map(|k| [v[3 * k], v[3 * k + 1], v[3 * k + 2]])
        .collect();
    let out_i: Vec<[u32; 3]> = (0..stats.tri_count)
        .map(|k| [i[3 * k], i[3 * k + 1], i[3 * k + 2]])
        .collect();
    (out_v, out_i, stats)
}

fn assert_valid(tris: &[[u32; 3]], vertex_count: usize) {
    for t in tris {
        assert!(t[0] != t[1] && t[1] != t[2] && t[0] != t[2], "degenerate {t:?}");
        for &v in t {
            assert!((v as usize) < vertex_count, "index {v} out of range");
        }
    }
}

// =============================================================================
// End-to-end scenarios
// =============================================================================

#[test]
fn cube_with_planar_mode_is_untouched() {
    let (v, i) = make_cube(1.0);
    let flags = DecimateFlags {
        planar_mode: true,
        ..ccw()
    };
    let (out_v, out_i, stats) = run(&v, &i, 0.5, flags, 1);
    assert_eq!(stats.tri_count, 12);
    assert_eq!(stats.decimation_count, 0);
    assert_eq!(out_i.len(), 12);
    // The geometry is bit-identical to the input.
    for (k, p) in out_v.iter().enumerate() {
        assert_eq!(&v[3 * k..3 * k + 3], p);
    }
}

#[test]
fn budget_sphere_lands_inside_tolerance() {
    let (v, i) = make_uv_sphere(40, 40, 0.5);
    let mut v = v;
    let mut i = i;
    let vertex_count = v.len() / 3;
    let tri_count = i.len() / 3;
    assert_eq!(vertex_count, 1600);

    let mut op = Operation::new(
        VertexBuffer::f32(&mut v, 3),
        vertex_count,
        IndexBuffer::u32(&mut i, 3),
        tri_count,
    );
    let mut budget = BudgetOptions::default();
    let stats = decimate_budget(&mut op, 1000, 1, ccw(), &mut budget).unwrap();

    assert!(budget.budget_met);
    assert!(budget.iteration_count <= 20);
    assert!(
        budget.final_tri_count >= 950 && budget.final_tri_count <= 1000,
        "final {} not within 5% of the 1000 budget",
        budget.final_tri_count
    );
    assert_eq!(stats.tri_count, budget.final_tri_count);
    assert!(budget.final_feature_size > 0.0);
}

#[test]
fn aggressive_sphere_collapses_to_a_hull() {
    let (v, i) = make_uv_sphere(20, 20, 0.3);
    let (out_v, out_i, stats) = run(&v, &i, 1.0, ccw(), 1);
    assert!(
        stats.tri_count <= 20,
        "expected a degenerate hull, got {} triangles",
        stats.tri_count
    );
    assert_valid(&out_i, out_v.len());
}

#[test]
fn planar_grid_fast_path_removes_interior() {
    let (v, i) = make_grid(100);
    assert_eq!(i.len() / 3, 19_602);
    let flags = DecimateFlags {
        planar_mode: true,
        ..ccw()
    };
    let (out_v, out_i, stats) = run(&v, &i, 0.05, flags, 1);
    assert!(
        stats.tri_count <= 400,
        "coplanar fast-path left {} triangles",
        stats.tri_count
    );
    assert_valid(&out_i, out_v.len());
}

#[test]
fn locked_boundary_strip_is_untouched() {
    let (v, i) = make_strip();
    let flags = DecimateFlags {
        boundary_lock: true,
        ..ccw()
    };
    let (out_v, out_i, stats) = run(&v, &i, 1.0, flags, 1);
    assert_eq!(stats.decimation_count, 0);
    assert_eq!(out_i.len(), 2);
    assert_eq!(out_v.len(), 4);
    for (k, p) in out_v.iter().enumerate() {
        assert_eq!(&v[3 * k..3 * k + 3], p);
    }
}

#[test]
fn unreachable_budget_returns_smallest_achievable() {
    let (v, i) = make_cube(1.0);
    let mut v = v;
    let mut i = i;
    let mut op = Operation::new(
        VertexBuffer::f32(&mut v, 3),
        8,
        IndexBuffer::u32(&mut i, 3),
        12,
    );
    let mut budget = BudgetOptions::default();
    decimate_budget(&mut op, 2, 1, ccw(), &mut budget).unwrap();

    assert!(!budget.budget_met, "a closed surface cannot reach 2 triangles");
    assert!(
        [4, 6, 8].contains(&budget.final_tri_count),
        "smallest achievable should be a minimal closed hull, got {}",
        budget.final_tri_count
    );
}

// =============================================================================
// Properties
// =============================================================================

#[test]
fn vertex_target_keeps_collapsing_past_the_feature_wall() {
    let (v, i) = make_uv_sphere(20, 20, 0.5);
    let mut v = v;
    let mut i = i;
    let vertex_count = v.len() / 3;
    let tri_count = i.len() / 3;
    let mut op = Operation::new(
        VertexBuffer::f32(&mut v, 3),
        vertex_count,
        IndexBuffer::u32(&mut i, 3),
        tri_count,
    );
    // A feature size this small collapses almost nothing on its own; the
    // vertex target lifts the ceiling past the wall until the count drops.
    op.set_strength(0.05);
    op.target_vertex_count_max = 100;
    let stats = decimate(&mut op, 1, ccw()).unwrap();

    assert!(
        stats.vertex_count <= 100,
        "target missed: {} vertices remain",
        stats.vertex_count
    );
    assert!(stats.decimation_count > 0);
    let out: Vec<[u32; 3]> = (0..stats.tri_count)
        .map(|k| [i[3 * k], i[3 * k + 1], i[3 * k + 2]])
        .collect();
    assert_valid(&out, stats.vertex_count);
}

#[test]
fn larger_feature_sizes_never_leave_more_triangles() {
    let (v, i) = make_uv_sphere(20, 20, 0.5);
    let mut last = usize::MAX;
    for feature in [0.2, 0.4, 0.8] {
        let (_, _, stats) = run(&v, &i, feature, ccw(), 1);
        assert!(
            stats.tri_count <= last,
            "feature {feature} produced {} triangles, more than {last}",
            stats.tri_count
        );
        last = stats.tri_count;
    }
}

#[test]
fn single_threaded_runs_are_bit_identical() {
    let (v, i) = make_uv_sphere(20, 20, 0.5);
    let a = run(&v, &i, 0.5, ccw(), 1);
    let b = run(&v, &i, 0.5, ccw(), 1);
    assert_eq!(a.0, b.0);
    assert_eq!(a.1, b.1);
    assert_eq!(a.2.decimation_count, b.2.decimation_count);
    assert_eq!(a.2.collision_count, b.2.collision_count);
}

#[test]
fn mild_decimation_preserves_outward_normals() {
    let (v, i) = make_uv_sphere(30, 30, 0.5);
    let (out_v, out_i, stats) = run(&v, &i, 0.2, ccw(), 1);
    assert!(stats.tri_count < i.len() / 3);
    assert_valid(&out_i, out_v.len());
    for t in &out_i {
        let a = out_v[t[0] as usize];
        let b = out_v[t[1] as usize];
        let c = out_v[t[2] as usize];
        let u = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
        let w = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
        let n = [
            u[1] * w[2] - u[2] * w[1],
            u[2] * w[0] - u[0] * w[2],
            u[0] * w[1] - u[1] * w[0],
        ];
        let centroid = [
            (a[0] + b[0] + c[0]) / 3.0,
            (a[1] + b[1] + c[1]) / 3.0,
            (a[2] + b[2] + c[2]) / 3.0,
        ];
        let dot = n[0] * centroid[0] + n[1] * centroid[1] + n[2] * centroid[2];
        assert!(
            dot > 0.0,
            "triangle {t:?} faces inward after mild decimation"
        );
    }
}

#[test]
fn worker_costs_ascend_within_each_syncstep() {
    let (v, i) = make_uv_sphere(20, 20, 0.5);
    let mut v = v;
    let mut i = i;
    let vertex_count = v.len() / 3;
    let tri_count = i.len() / 3;
    let mut op = Operation::new(
        VertexBuffer::f32(&mut v, 3),
        vertex_count,
        IndexBuffer::u32(&mut i, 3),
        tri_count,
    );
    op.set_strength(0.5);
    op.record_costs = true;
    let stats = decimate(&mut op, 2, ccw()).unwrap();

    assert!(stats.decimation_count > 0);
    assert!(!stats.accepted_costs.is_empty());
    for log in &stats.accepted_costs {
        let mut last: Option<(u32, f64)> = None;
        for &(step, cost) in log {
            if let Some((prev_step, prev_cost)) = last {
                assert!(step >= prev_step, "syncsteps went backwards");
                if step == prev_step {
                    assert!(
                        cost >= prev_cost,
                        "cost {cost} dropped below {prev_cost} within syncstep {step}"
                    );
                }
            }
            last = Some((step, cost));
        }
    }
}

#[test]
fn planar_mode_strictly_improves_planar_meshes() {
    let (v, i) = make_grid(50);
    let baseline = run(&v, &i, 0.05, ccw(), 1);
    let planar = run(
        &v,
        &i,
        0.05,
        DecimateFlags {
            planar_mode: true,
            ..ccw()
        },
        1,
    );
    assert!(
        planar.2.tri_count < baseline.2.tri_count,
        "planar mode left {} triangles, baseline {}",
        planar.2.tri_count,
        baseline.2.tri_count
    );
}

#[test]
fn parallel_run_produces_a_valid_mesh() {
    let (v, i) = make_uv_sphere(40, 40, 0.5);
    let input_tris = i.len() / 3;
    let (out_v, out_i, stats) = run(&v, &i, 0.4, ccw(), 4);
    assert!(stats.tri_count < input_tris);
    assert!(stats.decimation_count > 0);
    assert_eq!(out_i.len(), stats.tri_count);
    assert_valid(&out_i, out_v.len());
}

// =============================================================================
// Status reporting and cancellation
// =============================================================================

#[test]
fn status_stages_arrive_in_order_with_sane_progress() {
    let (v, i) = make_uv_sphere(20, 20, 0.5);
    let mut v = v;
    let mut i = i;
    let vertex_count = v.len() / 3;
    let tri_count = i.len() / 3;

    let seen: Arc<Mutex<Vec<(Stage, f64)>>> = Arc::new(Mutex::new(Vec::new()));
    let seen2 = seen.clone();
    let callback: StatusCallback = Box::new(move |status| {
        seen2.lock().unwrap().push((status.stage, status.progress));
        true
    });

    let mut op = Operation::new(
        VertexBuffer::f32(&mut v, 3),
        vertex_count,
        IndexBuffer::u32(&mut i, 3),
        tri_count,
    );
    op.set_strength(0.3);
    op.status_callback(callback, 0);
    decimate(&mut op, 1, ccw()).unwrap();

    let seen = seen.lock().unwrap();
    assert!(!seen.is_empty());
    for (stage, progress) in seen.iter() {
        assert!((0.0..=1.0).contains(progress), "{stage:?} progress {progress}");
    }
    let stages: Vec<Stage> = seen.iter().map(|(s, _)| *s).collect();
    let mut dedup = stages.clone();
    dedup.dedup();
    let mut sorted = dedup.clone();
    sorted.sort();
    assert_eq!(dedup, sorted, "stages must be reported in order: {stages:?}");
    assert_eq!(*stages.first().unwrap(), Stage::Init);
    assert_eq!(*stages.last().unwrap(), Stage::Done);
    assert!(stages.contains(&Stage::Decimate));
}

#[test]
fn cancellation_returns_a_partial_result() {
    let (v, i) = make_uv_sphere(30, 30, 0.5);
    let mut v = v;
    let mut i = i;
    let vertex_count = v.len() / 3;
    let tri_count = i.len() / 3;

    let decimate_reports = Arc::new(AtomicUsize::new(0));
    let reports = decimate_reports.clone();
    let callback: StatusCallback = Box::new(move |status| {
        if status.stage == Stage::Decimate {
            reports.fetch_add(1, Ordering::SeqCst) < 1
        } else {
            true
        }
    });

    let mut op = Operation::new(
        VertexBuffer::f32(&mut v, 3),
        vertex_count,
        IndexBuffer::u32(&mut i, 3),
        tri_count,
    );
    op.set_strength(0.6);
    op.status_callback(callback, 0);
    let stats = decimate(&mut op, 1, ccw()).unwrap();

    assert!(stats.cancelled);
    assert!(stats.tri_count > 0);
    // Output is valid even when cancelled mid-run.
    let out: Vec<[u32; 3]> = (0..stats.tri_count)
        .map(|k| [i[3 * k], i[3 * k + 1], i[3 * k + 2]])
        .collect();
    assert_valid(&out, stats.vertex_count);
}

// =============================================================================
// Normals writeback
// =============================================================================

#[test]
fn recomputed_normals_are_unit_and_outward() {
    let (v, i) = make_uv_sphere(30, 30, 0.5);
    let mut v = v;
    let mut i = i;
    let vertex_count = v.len() / 3;
    let tri_count = i.len() / 3;
    let mut normals = vec![0.0f32; v.len()];

    let mut op = Operation::new(
        VertexBuffer::f32(&mut v, 3),
        vertex_count,
        IndexBuffer::u32(&mut i, 3),
        tri_count,
    );
    op.set_strength(0.2);
    op.compute_normals(mesh_decimate::NormalBuffer::f32(&mut normals, 3));
    let stats = decimate(&mut op, 1, ccw()).unwrap();

    for k in 0..stats.vertex_count {
        let n = [normals[3 * k], normals[3 * k + 1], normals[3 * k + 2]];
        let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
        assert!((len - 1.0).abs() < 1e-3, "normal {k} has length {len}");
        let p = [v[3 * k], v[3 * k + 1], v[3 * k + 2]];
        let dot = n[0] * p[0] + n[1] * p[1] + n[2] * p[2];
        assert!(dot > 0.0, "normal {k} points inward");
    }
}

// =============================================================================
// Vertex splitting headroom
// =============================================================================

#[test]
fn vertex_splitting_stays_within_alloc() {
    let (v, i) = make_uv_sphere(20, 20, 0.5);
    let vertex_count = v.len() / 3;
    let alloc = vertex_count + vertex_count / 2;
    let mut v_padded = v.clone();
    v_padded.resize(alloc * 3, 0.0);
    let mut i = i;
    let tri_count = i.len() / 3;

    let mut op = Operation::new(
        VertexBuffer::f32(&mut v_padded, 3),
        vertex_count,
        IndexBuffer::u32(&mut i, 3),
        tri_count,
    );
    op.vertex_alloc = alloc;
    op.set_strength(0.4);
    let flags = DecimateFlags {
        normal_vertex_splitting: true,
        ..ccw()
    };
    let stats = decimate(&mut op, 1, flags).unwrap();

    assert!(stats.vertex_count <= alloc);
    let out: Vec<[u32; 3]> = (0..stats.tri_count)
        .map(|k| [i[3 * k], i[3 * k + 1], i[3 * k + 2]])
        .collect();
    assert_valid(&out, stats.vertex_count);
}

#[test]
fn splitting_without_headroom_is_rejected_up_front() {
    let (v, i) = make_cube(1.0);
    let mut v = v;
    let mut i = i;
    let mut op = Operation::new(
        VertexBuffer::f32(&mut v, 3),
        8,
        IndexBuffer::u32(&mut i, 3),
        12,
    );
    op.vertex_alloc = 16; // Buffer only holds 8.
    op.set_strength(0.5);
    let flags = DecimateFlags {
        normal_vertex_splitting: true,
        ..ccw()
    };
    assert!(decimate(&mut op, 1, flags).is_err());
}
