//! Edge-collapse cost model.
//!
//! `cost = value + penalty`. The value is the merged quadric error at the
//! chosen collapse point, normalized by accumulated area and cubed so that it
//! is commensurable with `max_collapse_cost = (0.25 * feature_size)^6`: a
//! collapse is affordable while its mean deviation stays within a quarter of
//! the feature size. Penalties add compactness and accumulated-area terms in
//! the same units, scale up near boundaries, and shrink 99% on coplanar
//! collapses in planar mode.

use nalgebra::Point3;

use crate::arena::Handle;
use crate::driver::{EngineConfig, EngineShared};
use crate::types::{triangle_compactness, TrianglePlane};

/// Sentinel cost for operations that must never be accepted.
pub(crate) const OP_FAIL_VALUE: f64 = 0.25 * (f32::MAX as f64);

/// Guard against division by a vanishing accumulated area.
const MIN_AREA: f64 = 1e-30;

/// Reusable scratch for cost evaluation, so the steady-state collapse loop
/// does not allocate.
#[derive(Default)]
pub(crate) struct CostScratch {
    t0: Vec<Handle>,
    t1: Vec<Handle>,
}

/// Evaluate the collapse cost and collapse point of a live edge.
pub(crate) fn evaluate_edge(
    shared: &EngineShared,
    cfg: &EngineConfig,
    scratch: &mut CostScratch,
    eh: Handle,
) -> (f64, Point3<f64>) {
    let e = shared.edges.read(eh);
    let v0 = e.verts[0];
    let v1 = e.verts[1];
    let (p0, q0, b0) = shared.verts.with(v0, |v| (v.position, v.quadric, v.on_boundary));
    let (p1, q1, b1) = shared.verts.with(v1, |v| (v.position, v.quadric, v.on_boundary));
    let midpoint = Point3::from((p0.coords + p1.coords) * 0.5);

    if !e.live || e.locked || e.is_non_manifold() {
        return (OP_FAIL_VALUE, midpoint);
    }

    let combined = q0.sum(&q1);

    // Collapse point: quadric minimizer, else midpoint, else the cheaper
    // endpoint.
    let point = match combined.optimal_point() {
        Some(p) => p,
        None => {
            let em = combined.evaluate(&midpoint);
            let e0 = combined.evaluate(&p0);
            let e1 = combined.evaluate(&p1);
            if em <= e0 && em <= e1 {
                midpoint
            } else if e0 <= e1 {
                p0
            } else {
                p1
            }
        }
    };

    let raw = combined.evaluate(&point).max(0.0);
    let mean_sq = raw / combined.area().max(MIN_AREA);
    let value = mean_sq * mean_sq * mean_sq;

    // Scan the affected triangles once for the worst post-collapse
    // compactness and the largest normal deviation.
    scratch.t0.clear();
    scratch.t1.clear();
    shared
        .verts
        .with(v0, |v| scratch.t0.extend_from_slice(&v.triangles));
    shared
        .verts
        .with(v1, |v| scratch.t1.extend_from_slice(&v.triangles));

    let mut worst_ratio = f64::INFINITY;
    let mut max_deviation: f64 = 0.0;
    scan_affected(
        shared,
        &scratch.t0,
        v0,
        v1,
        &point,
        &mut worst_ratio,
        &mut max_deviation,
    );
    scan_affected(
        shared,
        &scratch.t1,
        v1,
        v0,
        &point,
        &mut worst_ratio,
        &mut max_deviation,
    );

    let max_cc = cfg.max_collapse_cost;
    let mut penalty = 0.0;

    if cfg.compactness_target > 0.0 && worst_ratio < cfg.compactness_target {
        penalty += max_cc * (cfg.compactness_target / worst_ratio.max(1e-9) - 1.0);
    }

    if cfg.feature_size > 0.0 {
        penalty +=
            (combined.area() / (cfg.feature_size * cfg.feature_size)).sqrt() * max_cc;
    }

    if b0 || b1 {
        penalty *= cfg.boundary_weight;
    }

    if cfg.flags.planar_mode && max_deviation < cfg.planar_threshold {
        penalty *= 0.01;
    }

    let cost = value + penalty;
    if !cost.is_finite() || cost >= OP_FAIL_VALUE {
        (OP_FAIL_VALUE, point)
    } else {
        (cost, point)
    }
}

/// Walk the triangles of `from` that survive the collapse (those not also
/// touching `other`), computing their post-collapse shape at `point`.
#[allow(clippy::too_many_arguments)]
fn scan_affected(
    shared: &EngineShared,
    tris: &[Handle],
    from: Handle,
    other: Handle,
    point: &Point3<f64>,
    worst_ratio: &mut f64,
    max_deviation: &mut f64,
) {
    for &th in tris {
        let (verts, plane, live) = shared.tris.with(th, |t| (t.verts, t.plane, t.live));
        if !live || verts.contains(&other) {
            // Shared triangles retire with the collapse.
            continue;
        }
        let mut pts = [Point3::origin(); 3];
        for (i, &vh) in verts.iter().enumerate() {
            pts[i] = if vh == from {
                *point
            } else {
                shared.verts.with(vh, |v| v.position)
            };
        }
        let ratio = triangle_compactness(&pts[0], &pts[1], &pts[2]);
        if ratio < *worst_ratio {
            *worst_ratio = ratio;
        }
        let new_plane =
            TrianglePlane::from_points(&pts[0], &pts[1], &pts[2], shared.winding_sign);
        let deviation = if new_plane.area < f64::EPSILON || plane.area < f64::EPSILON {
            2.0
        } else {
            1.0 - new_plane.normal.dot(&plane.normal)
        };
        if deviation > *max_deviation {
            *max_deviation = deviation;
        }
    }
}
