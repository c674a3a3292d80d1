//! Edge-collapse execution: validity checks, topological rewiring, vertex
//! merging and attribute recomputation.
//!
//! Lock discipline: record slots are only ever locked one at a time, and a
//! partition heap is never locked while a record guard is held. Ownership of
//! the whole 1-ring is checked before any mutation, so two workers can never
//! rewire overlapping triangle sets; the remaining cross-worker touches
//! (incidence-list edits on ring-adjacent vertices) are serialized by the
//! per-slot locks.

use tracing::warn;

use crate::arena::{EdgeRec, Handle, VertexRec};
use crate::cost::OP_FAIL_VALUE;
use crate::driver::{EngineConfig, EngineShared};
use crate::hash::{EdgeKey, TriKey};
use crate::types::TrianglePlane;

use nalgebra::Point3;
use std::sync::atomic::Ordering;

/// Result of attempting one collapse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CollapseOutcome {
    /// The collapse was applied.
    Executed,
    /// A validity check failed; the operation was re-queued with a bumped
    /// cost so it can retry after the neighborhood changes.
    RejectedSoft,
    /// The edge can never collapse (locked or non-manifold); it was dropped
    /// from its queue.
    RejectedHard,
    /// The operation was stale or superseded; nothing happened.
    Stale,
    /// The 1-ring crosses partitions the caller does not own; the operation
    /// must be deferred to the barrier.
    NotOwned,
}

/// Snapshot of a ring triangle taken before mutation.
#[derive(Debug, Clone, Copy)]
struct TriSnap {
    h: Handle,
    verts: [Handle; 3],
    edges: [Handle; 3],
    plane: TrianglePlane,
    partition: u16,
}

/// Reusable executor scratch. One per worker plus one for the coordinator;
/// the steady-state loop allocates nothing beyond these buffers' growth.
#[derive(Default)]
pub(crate) struct ExecCtx {
    snap0: Vec<TriSnap>,
    snap1: Vec<TriSnap>,
    thirds: Vec<Handle>,
    neighbors0: Vec<Handle>,
    neighbors1: Vec<Handle>,
    pairs0: Vec<[u32; 2]>,
    pairs1: Vec<[u32; 2]>,
    ring_edges: Vec<Handle>,
    survivors: Vec<Handle>,
    cluster_ids: Vec<u32>,
    /// Edges marked stale during execution, awaiting the barrier recompute.
    pub pending: Vec<Handle>,
}

/// Attempt to collapse `eh` at `point`. `expected_gen` and `expected_verts`
/// come from the popped (or deferred) operation snapshot and guard against
/// superseded edges. `owner` is the executing worker, or `None` for the
/// coordinator which owns every partition.
pub(crate) fn execute_collapse(
    shared: &EngineShared,
    cfg: &EngineConfig,
    ctx: &mut ExecCtx,
    eh: Handle,
    expected_gen: u32,
    expected_verts: [Handle; 2],
    owner: Option<usize>,
) -> CollapseOutcome {
    let e = shared.edges.read(eh);
    if !e.live || e.stale || e.generation != expected_gen || e.verts != expected_verts {
        return CollapseOutcome::Stale;
    }
    if e.locked || e.is_non_manifold() {
        drop_operation(shared, eh);
        return CollapseOutcome::RejectedHard;
    }
    let v0 = e.verts[0];
    let v1 = e.verts[1];
    let point = e.collapse_point;

    snapshot_ring(shared, v0, &mut ctx.snap0);
    snapshot_ring(shared, v1, &mut ctx.snap1);

    if let Some(worker) = owner {
        let owned = |s: &TriSnap| shared.partition_owner[s.partition as usize] == worker;
        if !ctx.snap0.iter().all(owned) || !ctx.snap1.iter().all(owned) {
            return CollapseOutcome::NotOwned;
        }
    }

    if !link_condition_holds(ctx, v0, v1) {
        soft_reject(shared, cfg, eh, e.cost);
        return CollapseOutcome::RejectedSoft;
    }

    if !orientation_preserved(shared, cfg, &ctx.snap0, v0, v1, &point)
        || !orientation_preserved(shared, cfg, &ctx.snap1, v1, v0, &point)
    {
        soft_reject(shared, cfg, eh, e.cost);
        return CollapseOutcome::RejectedSoft;
    }

    // All checks passed: mutate. Retire the collapsed edge first.
    shared.edge_table.remove(EdgeKey::new(v0, v1));
    shared.edges.with_mut(eh, |rec| {
        rec.live = false;
        rec.stale = false;
        rec.generation = rec.generation.wrapping_add(1);
    });

    retire_shared_triangles(shared, ctx, eh, v0, v1);
    rekey_ring_edges(shared, ctx, v0, v1);
    rewire_triangles(shared, ctx, v0, v1);

    // Merge the vertex pair: v1 folds into v0 at the collapse point.
    let (q1, b1) = shared.verts.with(v1, |v| (v.quadric, v.on_boundary));
    collect_survivors(shared, ctx);
    shared.verts.with_mut(v0, |v| {
        v.position = point;
        v.quadric.add(&q1);
        v.on_boundary |= b1;
        v.triangles.clear();
        v.triangles.extend_from_slice(&ctx.survivors);
    });
    shared.verts.with_mut(v1, |v| {
        v.live = false;
        v.redirect = v0;
        v.triangles.clear();
    });
    shared.verts.retire(v1);
    shared.live_verts.fetch_sub(1, Ordering::AcqRel);

    refresh_planes(shared, &ctx.survivors);

    if cfg.flags.normal_vertex_splitting {
        split_normal_clusters(shared, cfg, ctx, v0);
    }

    // Stale every edge of the ring triangles, including those a split just
    // moved to a new vertex; the barrier recompute refreshes them.
    mark_ring_stale(shared, ctx);

    shared.decimations.fetch_add(1, Ordering::Relaxed);
    CollapseOutcome::Executed
}

/// Copy the live incident triangles of `v` into `out`.
fn snapshot_ring(shared: &EngineShared, v: Handle, out: &mut Vec<TriSnap>) {
    out.clear();
    let mut handles: Vec<Handle> = Vec::new();
    shared.verts.with(v, |rec| handles.extend_from_slice(&rec.triangles));
    for th in handles {
        let snap = shared.tris.with(th, |t| {
            t.live.then_some(TriSnap {
                h: th,
                verts: t.verts,
                edges: t.edges,
                plane: t.plane,
                partition: t.partition,
            })
        });
        if let Some(snap) = snap {
            out.push(snap);
        }
    }
}

/// The link condition: the rings of the endpoints may only meet at the
/// shared triangles. Violations would glue the surface into a non-manifold
/// fan (the classic failure is collapsing a tetrahedron edge).
fn link_condition_holds(ctx: &mut ExecCtx, v0: Handle, v1: Handle) -> bool {
    ctx.thirds.clear();
    ctx.neighbors0.clear();
    ctx.neighbors1.clear();
    ctx.pairs0.clear();
    ctx.pairs1.clear();

    for s in &ctx.snap0 {
        let pair = opposite_pair(&s.verts, v0);
        push_sorted_pair(&mut ctx.pairs0, pair);
        for &v in &s.verts {
            if v != v0 && v != v1 && !ctx.neighbors0.contains(&v) {
                ctx.neighbors0.push(v);
            }
        }
        if s.verts.contains(&v1) {
            for &v in &s.verts {
                if v != v0 && v != v1 {
                    ctx.thirds.push(v);
                }
            }
        }
    }
    for s in &ctx.snap1 {
        let pair = opposite_pair(&s.verts, v1);
        push_sorted_pair(&mut ctx.pairs1, pair);
        for &v in &s.verts {
            if v != v0 && v != v1 && !ctx.neighbors1.contains(&v) {
                ctx.neighbors1.push(v);
            }
        }
    }

    // Common neighbors must be exactly the shared triangles' third vertices.
    for &n in &ctx.neighbors0 {
        if ctx.neighbors1.contains(&n) && !ctx.thirds.contains(&n) {
            return false;
        }
    }
    for &t in &ctx.thirds {
        if !(ctx.neighbors0.contains(&t) && ctx.neighbors1.contains(&t)) {
            return false;
        }
    }
    // No opposite edge may appear in both open rings.
    for p in &ctx.pairs0 {
        if ctx.pairs1.contains(p) {
            return false;
        }
    }
    true
}

fn opposite_pair(verts: &[Handle; 3], v: Handle) -> [Handle; 2] {
    if verts[0] == v {
        [verts[1], verts[2]]
    } else if verts[1] == v {
        [verts[2], verts[0]]
    } else {
        [verts[0], verts[1]]
    }
}

fn push_sorted_pair(pairs: &mut Vec<[u32; 2]>, pair: [Handle; 2]) {
    let (a, b) = (pair[0].raw(), pair[1].raw());
    pairs.push(if a < b { [a, b] } else { [b, a] });
}

/// Triangles keeping only `from` must not flip or degenerate when `from`
/// moves to the collapse point.
fn orientation_preserved(
    shared: &EngineShared,
    cfg: &EngineConfig,
    snaps: &[TriSnap],
    from: Handle,
    other: Handle,
    point: &Point3<f64>,
) -> bool {
    for s in snaps {
        if s.verts.contains(&other) {
            continue;
        }
        let mut pts = [Point3::origin(); 3];
        for (i, &vh) in s.verts.iter().enumerate() {
            pts[i] = if vh == from {
                *point
            } else {
                shared.verts.with(vh, |v| v.position)
            };
        }
        let new_plane = TrianglePlane::from_points(&pts[0], &pts[1], &pts[2], shared.winding_sign);
        if new_plane.area < f64::EPSILON {
            return false;
        }
        if s.plane.area >= f64::EPSILON
            && new_plane.normal.dot(&s.plane.normal) <= cfg.normal_guard
        {
            return false;
        }
    }
    true
}

/// Retire the triangles containing both endpoints (the edge's fan).
fn retire_shared_triangles(
    shared: &EngineShared,
    ctx: &mut ExecCtx,
    collapsed: Handle,
    v0: Handle,
    v1: Handle,
) {
    for i in 0..ctx.snap0.len() {
        let s = ctx.snap0[i];
        if s.verts.contains(&v1) {
            retire_triangle(shared, &s, collapsed, v0, v1);
        }
    }
}

/// Retire one triangle: table entry, edge ownership, incidence lists.
fn retire_triangle(
    shared: &EngineShared,
    snap: &TriSnap,
    skip_edge: Handle,
    v0: Handle,
    v1: Handle,
) {
    shared
        .tri_table
        .remove(TriKey::new(snap.verts[0], snap.verts[1], snap.verts[2]));
    shared.tris.with_mut(snap.h, |t| t.live = false);
    shared.live_tris.fetch_sub(1, Ordering::AcqRel);

    for &ed in &snap.edges {
        if ed == skip_edge || ed.is_none() {
            continue;
        }
        let (remaining, live) = shared.edges.with_mut(ed, |e| {
            e.detach(snap.h);
            e.generation = e.generation.wrapping_add(1);
            (e.owner_count(), e.live)
        });
        if live && remaining == 0 {
            drop_edge(shared, ed);
        }
    }
    for &vv in &snap.verts {
        if vv == v0 || vv == v1 {
            continue;
        }
        shared.verts.with_mut(vv, |v| v.triangles.retain(|&t| t != snap.h));
    }
}

/// Remove a dead edge from its hash entry and queue.
fn drop_edge(shared: &EngineShared, ed: Handle) {
    let (key, partition) = shared.edges.with(ed, |e| (EdgeKey::new(e.verts[0], e.verts[1]), e.partition));
    shared.edge_table.remove(key);
    shared.queues[partition as usize]
        .lock()
        .unwrap()
        .remove(&shared.edges, ed);
    shared.edges.with_mut(ed, |e| {
        e.live = false;
        e.stale = false;
        e.generation = e.generation.wrapping_add(1);
    });
}

/// Rekey every surviving edge (v1, w) to (v0, w), merging into an existing
/// (v0, w) edge when both exist. A merged edge picking up a third owner
/// becomes non-manifold and stops collapsing.
fn rekey_ring_edges(shared: &EngineShared, ctx: &mut ExecCtx, v0: Handle, v1: Handle) {
    ctx.ring_edges.clear();
    for s in &ctx.snap1 {
        for &ed in &s.edges {
            if ed.is_none() || ctx.ring_edges.contains(&ed) {
                continue;
            }
            let (has_v1, live) = shared
                .edges
                .with(ed, |e| (e.verts.contains(&v1), e.live));
            if has_v1 && live {
                ctx.ring_edges.push(ed);
            }
        }
    }

    for i in 0..ctx.ring_edges.len() {
        let ed = ctx.ring_edges[i];
        let (verts, boundary, live) =
            shared.edges.with(ed, |e| (e.verts, e.boundary, e.live));
        if !live {
            continue;
        }
        let w = if verts[0] == v1 { verts[1] } else { verts[0] };
        shared.edge_table.remove(EdgeKey::new(v1, w));

        if let Some(existing) = shared.edge_table.lookup(EdgeKey::new(v0, w)) {
            // Merge: the rekeyed edge folds into the one already present.
            let owners = shared.edges.with(ed, |e| e.tris);
            for &t in owners.iter().filter(|t| t.is_some()) {
                shared.tris.with_mut(t, |tri| {
                    for slot in &mut tri.edges {
                        if *slot == ed {
                            *slot = existing;
                        }
                    }
                });
                shared.edges.with_mut(existing, |e| {
                    e.attach(t);
                    e.boundary |= boundary;
                    e.generation = e.generation.wrapping_add(1);
                });
            }
            shared.queues[shared.edges.with(ed, |e| e.partition) as usize]
                .lock()
                .unwrap()
                .remove(&shared.edges, ed);
            shared.edges.with_mut(ed, |e| {
                e.live = false;
                e.stale = false;
                e.generation = e.generation.wrapping_add(1);
            });
        } else {
            shared.edges.with_mut(ed, |e| {
                e.verts = if v0 < w { [v0, w] } else { [w, v0] };
                e.generation = e.generation.wrapping_add(1);
            });
            shared.edge_table.insert(EdgeKey::new(v0, w), ed);
        }
    }
}

/// Substitute v0 for v1 in the surviving ring triangles, retiring any
/// duplicates the merge produces (counted as hash collisions).
fn rewire_triangles(shared: &EngineShared, ctx: &mut ExecCtx, v0: Handle, v1: Handle) {
    for i in 0..ctx.snap1.len() {
        let s = ctx.snap1[i];
        if s.verts.contains(&v0) {
            continue;
        }
        let live = shared.tris.with(s.h, |t| t.live);
        if !live {
            continue;
        }
        let old_key = TriKey::new(s.verts[0], s.verts[1], s.verts[2]);
        let mut new_verts = s.verts;
        for v in &mut new_verts {
            if *v == v1 {
                *v = v0;
            }
        }
        shared.tri_table.remove(old_key);
        let new_key = TriKey::new(new_verts[0], new_verts[1], new_verts[2]);
        shared.tris.with_mut(s.h, |t| t.verts = new_verts);

        if shared.tri_table.insert(new_key, s.h).is_some() {
            // The merge produced a duplicate of an existing triangle. The
            // insert was a no-op, so the surviving twin keeps its table
            // entry; this copy retires.
            shared.collisions.fetch_add(1, Ordering::Relaxed);
            let snap_now = shared.tris.with(s.h, |t| TriSnap {
                h: s.h,
                verts: t.verts,
                edges: t.edges,
                plane: t.plane,
                partition: t.partition,
            });
            shared.tris.with_mut(s.h, |t| t.live = false);
            shared.live_tris.fetch_sub(1, Ordering::AcqRel);
            for &ed in &snap_now.edges {
                if ed.is_none() {
                    continue;
                }
                let (remaining, live) = shared.edges.with_mut(ed, |e| {
                    e.detach(s.h);
                    e.generation = e.generation.wrapping_add(1);
                    (e.owner_count(), e.live)
                });
                if live && remaining == 0 {
                    drop_edge(shared, ed);
                }
            }
            for &vv in &snap_now.verts {
                if vv == v0 {
                    continue;
                }
                shared
                    .verts
                    .with_mut(vv, |v| v.triangles.retain(|&t| t != s.h));
            }
        }
    }
}

/// Gather the live triangles now incident to the merged vertex.
fn collect_survivors(shared: &EngineShared, ctx: &mut ExecCtx) {
    ctx.survivors.clear();
    for s in ctx.snap0.iter().chain(ctx.snap1.iter()) {
        if ctx.survivors.contains(&s.h) {
            continue;
        }
        if shared.tris.with(s.h, |t| t.live) {
            ctx.survivors.push(s.h);
        }
    }
}

/// Refresh the cached planes of the given triangles.
fn refresh_planes(shared: &EngineShared, tris: &[Handle]) {
    for &th in tris {
        let verts = shared.tris.with(th, |t| t.verts);
        let a = shared.verts.with(verts[0], |v| v.position);
        let b = shared.verts.with(verts[1], |v| v.position);
        let c = shared.verts.with(verts[2], |v| v.position);
        let plane = TrianglePlane::from_points(&a, &b, &c, shared.winding_sign);
        shared.tris.with_mut(th, |t| t.plane = plane);
    }
}

/// Mark every edge of the surviving ring triangles stale so the barrier
/// recompute refreshes their operations.
fn mark_ring_stale(shared: &EngineShared, ctx: &mut ExecCtx) {
    for i in 0..ctx.survivors.len() {
        let th = ctx.survivors[i];
        if !shared.tris.with(th, |t| t.live) {
            continue;
        }
        let edges = shared.tris.with(th, |t| t.edges);
        for ed in edges {
            if ed.is_none() {
                continue;
            }
            let newly_stale = shared.edges.with_mut(ed, |e| {
                if e.live && !e.stale {
                    e.stale = true;
                    e.generation = e.generation.wrapping_add(1);
                    true
                } else {
                    false
                }
            });
            if newly_stale {
                ctx.pending.push(ed);
            }
        }
    }
}

/// Re-queue a rejected operation with its cost bumped past the feature-size
/// wall so it only retries once the ceiling climbs or its ring changes.
fn soft_reject(shared: &EngineShared, cfg: &EngineConfig, eh: Handle, cost: f64) {
    let bumped = (4.0 * cost.max(cfg.max_collapse_cost)).min(OP_FAIL_VALUE);
    let partition = shared.edges.with_mut(eh, |e| {
        e.cost = bumped;
        e.partition
    });
    if bumped < OP_FAIL_VALUE {
        shared.queues[partition as usize]
            .lock()
            .unwrap()
            .update(&shared.edges, eh, bumped);
    }
}

/// Drop a never-collapsible operation from play.
fn drop_operation(shared: &EngineShared, eh: Handle) {
    shared.edges.with_mut(eh, |e| e.cost = OP_FAIL_VALUE);
}

/// Duplicate the merged vertex per normal-discontinuous triangle cluster.
/// Runs after a collapse when `normal_vertex_splitting` is set; on pool
/// exhaustion the vertex simply stays merged.
fn split_normal_clusters(
    shared: &EngineShared,
    cfg: &EngineConfig,
    ctx: &mut ExecCtx,
    v0: Handle,
) {
    let mut tris: Vec<Handle> = Vec::new();
    shared.verts.with(v0, |v| tris.extend_from_slice(&v.triangles));
    if tris.len() < 2 {
        return;
    }

    // Greedy clustering by face normal against each cluster's seed.
    ctx.cluster_ids.clear();
    ctx.cluster_ids.resize(tris.len(), 0);
    let mut seeds: Vec<nalgebra::Vector3<f64>> = Vec::new();
    for (i, &th) in tris.iter().enumerate() {
        let plane = shared.tris.with(th, |t| t.plane);
        if plane.area < f64::EPSILON {
            ctx.cluster_ids[i] = 0;
            if seeds.is_empty() {
                seeds.push(plane.normal);
            }
            continue;
        }
        let mut assigned = None;
        for (c, seed) in seeds.iter().enumerate() {
            if plane.normal.dot(seed) > cfg.normal_cluster_cos {
                assigned = Some(c);
                break;
            }
        }
        let c = assigned.unwrap_or_else(|| {
            seeds.push(plane.normal);
            seeds.len() - 1
        });
        ctx.cluster_ids[i] = c as u32;
    }
    if seeds.len() <= 1 {
        return;
    }

    let base = shared.verts.read(v0);
    for cluster in 1..seeds.len() as u32 {
        let members: Vec<Handle> = tris
            .iter()
            .zip(ctx.cluster_ids.iter())
            .filter(|(_, &c)| c == cluster)
            .map(|(&t, _)| t)
            .collect();
        if members.is_empty() {
            continue;
        }
        let new_rec = VertexRec {
            position: base.position,
            quadric: base.quadric,
            triangles: members.clone(),
            redirect: Handle::NONE,
            on_boundary: true,
            live: true,
        };
        let Some(nv) = shared.verts.alloc_shared(new_rec) else {
            warn!(
                target: "mesh_decimate::collapse",
                "vertex pool exhausted, skipping normal vertex split"
            );
            return;
        };
        shared.live_verts.fetch_add(1, Ordering::AcqRel);
        reassign_cluster(shared, ctx, v0, nv, &members);
    }
    shared.verts.with_mut(v0, |v| v.on_boundary = true);
}

/// Move the given triangles from vertex `v0` to its split copy `nv`,
/// splitting or rekeying their edges.
fn reassign_cluster(
    shared: &EngineShared,
    ctx: &mut ExecCtx,
    v0: Handle,
    nv: Handle,
    members: &[Handle],
) {
    let mut handled_edges: Vec<Handle> = Vec::new();
    for &th in members {
        let (verts, edges) = shared.tris.with(th, |t| (t.verts, t.edges));
        // Rekey the triangle's table entry.
        shared
            .tri_table
            .remove(TriKey::new(verts[0], verts[1], verts[2]));
        let mut new_verts = verts;
        for v in &mut new_verts {
            if *v == v0 {
                *v = nv;
            }
        }
        shared.tris.with_mut(th, |t| t.verts = new_verts);
        if shared
            .tri_table
            .insert(TriKey::new(new_verts[0], new_verts[1], new_verts[2]), th)
            .is_some()
        {
            shared.collisions.fetch_add(1, Ordering::Relaxed);
        }

        for (slot, &ed) in edges.iter().enumerate() {
            if ed.is_none() || handled_edges.contains(&ed) {
                continue;
            }
            let (everts, live) = shared.edges.with(ed, |e| (e.verts, e.live));
            if !live || !everts.contains(&v0) {
                continue;
            }
            let w = if everts[0] == v0 { everts[1] } else { everts[0] };
            let owners = shared.edges.with(ed, |e| e.tris);
            let all_in_cluster = owners
                .iter()
                .filter(|t| t.is_some())
                .all(|t| members.contains(t));
            if all_in_cluster {
                // The whole edge moves to the split vertex.
                handled_edges.push(ed);
                shared.edge_table.remove(EdgeKey::new(v0, w));
                shared.edges.with_mut(ed, |e| {
                    e.verts = if nv < w { [nv, w] } else { [w, nv] };
                    e.boundary = true;
                    e.generation = e.generation.wrapping_add(1);
                });
                shared.edge_table.insert(EdgeKey::new(nv, w), ed);
            } else {
                // Seam: this triangle leaves the edge; a new (nv, w) edge
                // carries it.
                shared.edges.with_mut(ed, |e| {
                    e.detach(th);
                    e.boundary = true;
                    e.generation = e.generation.wrapping_add(1);
                });
                let target = match shared.edge_table.lookup(EdgeKey::new(nv, w)) {
                    Some(existing) => {
                        shared.edges.with_mut(existing, |e| {
                            e.attach(th);
                            e.generation = e.generation.wrapping_add(1);
                        });
                        Some(existing)
                    }
                    None => {
                        let partition = shared.tris.with(th, |t| t.partition);
                        let mut rec = EdgeRec {
                            verts: if nv < w { [nv, w] } else { [w, nv] },
                            partition,
                            boundary: true,
                            live: true,
                            ..EdgeRec::default()
                        };
                        rec.attach(th);
                        match shared.edges.alloc_shared(rec) {
                            Some(new_edge) => {
                                shared.edge_table.insert(EdgeKey::new(nv, w), new_edge);
                                Some(new_edge)
                            }
                            None => {
                                warn!(
                                    target: "mesh_decimate::collapse",
                                    "edge pool exhausted during vertex split"
                                );
                                None
                            }
                        }
                    }
                };
                if let Some(target) = target {
                    shared.tris.with_mut(th, |t| t.edges[slot] = target);
                    let newly = shared.edges.with_mut(target, |e| {
                        if e.live && !e.stale {
                            e.stale = true;
                            true
                        } else {
                            false
                        }
                    });
                    if newly {
                        ctx.pending.push(target);
                    }
                }
            }
        }
        // Mark the seam vertex boundary so the cost model protects it.
        shared.verts.with_mut(nv, |v| v.on_boundary = true);
    }
    shared
        .verts
        .with_mut(v0, |v| v.triangles.retain(|t| !members.contains(t)));
}

