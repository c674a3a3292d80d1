//! Build pipeline and the parallel syncstep driver.
//!
//! A run builds the arena mesh, seeds per-edge collapse operations into
//! partitioned heaps, then walks `sync_step_count` syncsteps. Step `i` allows
//! operations up to `max_collapse_cost * ((i+1)/sync_step_count)^2` — a
//! quadratic ramp that approximates a global ascending-cost order while the
//! partitions run in parallel. Each step is a fork-join over the worker pool;
//! the join is the barrier where the coordinator serially executes deferred
//! cross-partition collapses and refreshes stale operations.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::arena::{EdgeRec, Handle, Pool, TriangleRec, VertexRec};
use crate::collapse::{execute_collapse, CollapseOutcome, ExecCtx};
use crate::cost::{evaluate_edge, CostScratch, OP_FAIL_VALUE};
use crate::error::{DecimateError, DecimateResult};
use crate::hash::{EdgeKey, EdgeTable, Table, TriKey, TriTable};
use crate::partition::partition_triangles;
use crate::progress::{Stage, StatusCallback, StatusReporter};
use crate::queue::{CollapseHeap, HeapEntry};
use crate::types::{DecimateFlags, TrianglePlane};

/// Hard bound on syncsteps when a vertex-count target keeps the ramp climbing
/// past the feature-size wall.
pub(crate) const SYNCSTEP_ABORT: u32 = 1 << 20;

/// Decoded input mesh, owned by the run (and copied per budget probe).
#[derive(Debug, Clone)]
pub(crate) struct SourceMesh {
    pub positions: Vec<Point3<f64>>,
    pub triangles: Vec<[u32; 3]>,
}

impl SourceMesh {
    /// Diagonal of the axis-aligned bounding box.
    pub fn bounding_diagonal(&self) -> f64 {
        if self.positions.is_empty() {
            return 0.0;
        }
        let mut min = self.positions[0];
        let mut max = self.positions[0];
        for p in &self.positions[1..] {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            min.z = min.z.min(p.z);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
            max.z = max.z.max(p.z);
        }
        (max - min).norm()
    }
}

/// Resolved configuration for one run.
#[derive(Debug, Clone)]
pub(crate) struct EngineConfig {
    pub flags: DecimateFlags,
    pub feature_size: f64,
    /// `(0.25 * feature_size)^6`.
    pub max_collapse_cost: f64,
    pub sync_step_count: u32,
    pub target_vertex_count_max: usize,
    pub vertex_alloc: usize,
    pub planar_threshold: f64,
    pub boundary_weight: f64,
    pub compactness_target: f64,
    /// Minimum allowed dot product between a triangle's normals before and
    /// after a collapse.
    pub normal_guard: f64,
    /// Dihedral threshold: interior edges whose face normals dot below this
    /// count as feature ridges.
    pub sharp_edge_cos: f64,
    /// Cluster membership threshold for normal vertex splitting.
    pub normal_cluster_cos: f64,
    pub record_costs: bool,
}

/// Shared mutable state of a run. See module docs for the locking rules.
pub(crate) struct EngineShared {
    pub verts: Pool<VertexRec>,
    pub tris: Pool<TriangleRec>,
    pub edges: Pool<EdgeRec>,
    pub edge_table: EdgeTable,
    pub tri_table: TriTable,
    pub queues: Vec<Mutex<CollapseHeap>>,
    /// Partition id -> owning worker id.
    pub partition_owner: Vec<usize>,
    pub winding_sign: f64,
    pub live_tris: AtomicUsize,
    pub live_verts: AtomicUsize,
    pub decimations: AtomicU64,
    pub collisions: AtomicU64,
}

/// Statistics of a completed (or cancelled) run.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    /// Live vertices written back.
    pub vertex_count: usize,
    /// Live triangles written back.
    pub tri_count: usize,
    /// Accepted edge collapses.
    pub decimation_count: u64,
    /// Duplicate triangles retired during collapses (topology warnings).
    pub collision_count: u64,
    /// True when the run stopped at a cooperative cancellation point.
    pub cancelled: bool,
    /// Syncsteps executed.
    pub sync_steps: u32,
    /// Per-agent accepted collapse costs as (syncstep, cost) pairs, recorded
    /// only when cost recording is enabled. Workers first, coordinator last.
    pub accepted_costs: Vec<Vec<(u32, f64)>>,
}

/// Result of a run before writeback.
#[derive(Debug, Clone)]
pub(crate) struct EngineOutput {
    pub positions: Vec<Point3<f64>>,
    pub normals: Option<Vec<Vector3<f64>>>,
    pub triangles: Vec<[u32; 3]>,
    pub stats: RunStats,
}

/// A collapse popped by a worker whose 1-ring crossed partitions; executed
/// serially at the barrier.
#[derive(Debug, Clone, Copy)]
struct DeferredOp {
    cost: f64,
    edge: Handle,
    generation: u32,
    verts: [Handle; 2],
}

struct StepParams<'a> {
    step: u32,
    ceiling: f64,
    target: usize,
    cancel: &'a AtomicBool,
    record_costs: bool,
}

struct WorkerState {
    id: usize,
    /// Owned partitions, ascending.
    partitions: Vec<usize>,
    deferred: Vec<DeferredOp>,
    ctx: ExecCtx,
    costs: Vec<(u32, f64)>,
}

impl WorkerState {
    /// Pop and execute operations under the step ceiling, in ascending cost
    /// order across this worker's partitions.
    fn run_step(&mut self, shared: &EngineShared, cfg: &EngineConfig, params: &StepParams<'_>) {
        let mut last_cost = f64::NEG_INFINITY;
        loop {
            if params.cancel.load(Ordering::Relaxed) {
                return;
            }
            if params.target > 0 && shared.live_verts.load(Ordering::Relaxed) <= params.target {
                return;
            }

            let mut best: Option<(HeapEntry, usize)> = None;
            for &p in &self.partitions {
                let q = shared.queues[p].lock().unwrap();
                if let Some(e) = q.peek() {
                    if best.map_or(true, |(b, _)| e.before(&b)) {
                        best = Some((e, p));
                    }
                }
            }
            let Some((entry, p)) = best else { return };
            if entry.cost > params.ceiling {
                return;
            }
            let popped = shared.queues[p].lock().unwrap().pop(&shared.edges);
            let Some(entry) = popped else { continue };

            let (live, stale, generation, verts, cross) = shared.edges.with(entry.edge, |e| {
                (e.live, e.stale, e.generation, e.verts, e.cross_partition)
            });
            if !live || stale {
                continue;
            }
            if cross {
                // Cross-boundary edges are always executed at the barrier.
                self.deferred.push(DeferredOp {
                    cost: entry.cost,
                    edge: entry.edge,
                    generation,
                    verts,
                });
                continue;
            }

            match execute_collapse(
                shared,
                cfg,
                &mut self.ctx,
                entry.edge,
                generation,
                verts,
                Some(self.id),
            ) {
                CollapseOutcome::Executed => {
                    debug_assert!(entry.cost >= last_cost);
                    last_cost = entry.cost;
                    if params.record_costs {
                        self.costs.push((params.step, entry.cost));
                    }
                }
                CollapseOutcome::NotOwned => self.deferred.push(DeferredOp {
                    cost: entry.cost,
                    edge: entry.edge,
                    generation,
                    verts,
                }),
                CollapseOutcome::RejectedSoft
                | CollapseOutcome::RejectedHard
                | CollapseOutcome::Stale => {}
            }
        }
    }
}

/// Run a full decimation over a decoded mesh.
pub(crate) fn run(
    src: &SourceMesh,
    cfg: &EngineConfig,
    threadcount: usize,
    callback: Option<&StatusCallback>,
    interval_triangles: usize,
    want_normals: bool,
) -> DecimateResult<EngineOutput> {
    let threadcount = threadcount.max(1);
    let _timer = crate::tracing_ext::OperationTimer::with_context(
        "decimate",
        src.triangles.len(),
        src.positions.len(),
    );
    let cancel = AtomicBool::new(false);
    let mut reporter = StatusReporter::new(callback, interval_triangles, &cancel);
    reporter.report(Stage::Init, 1.0, src.triangles.len());

    info!(
        target: "mesh_decimate::driver",
        vertices = src.positions.len(),
        triangles = src.triangles.len(),
        feature_size = cfg.feature_size,
        threads = threadcount,
        "starting decimation"
    );

    let shared = build_state(src, cfg, threadcount, &mut reporter)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threadcount)
        .build()
        .map_err(|source| DecimateError::ThreadPool { source })?;

    let mut workers: Vec<WorkerState> = (0..threadcount)
        .map(|id| WorkerState {
            id,
            partitions: (0..shared.queues.len())
                .filter(|p| shared.partition_owner[*p] == id)
                .collect(),
            deferred: Vec::new(),
            ctx: ExecCtx::default(),
            costs: Vec::new(),
        })
        .collect();
    let mut coord_ctx = ExecCtx::default();
    let mut coord_costs: Vec<(u32, f64)> = Vec::new();
    let mut cost_scratch = CostScratch::default();
    let mut deferred: Vec<DeferredOp> = Vec::new();

    let step_count = cfg.sync_step_count.max(1);
    let target = cfg.target_vertex_count_max;
    let mut step: u32 = 0;

    if cfg.max_collapse_cost > 0.0 {
        loop {
            if reporter.cancelled() {
                break;
            }
            if target > 0 && shared.live_verts.load(Ordering::Relaxed) <= target {
                break;
            }
            if step >= step_count && target == 0 {
                break;
            }
            if step >= SYNCSTEP_ABORT {
                warn!(
                    target: "mesh_decimate::driver",
                    step,
                    "syncstep abort bound reached before the vertex target"
                );
                break;
            }

            let frac = (step + 1) as f64 / step_count as f64;
            let mut ceiling = cfg.max_collapse_cost * frac * frac;
            if step >= step_count {
                // Past the feature-size wall only the vertex target matters:
                // the accept ceiling lifts to the sentinel so every remaining
                // non-failed operation is eligible. Stop once the queues hold
                // nothing acceptable.
                let mut min_cost = f64::INFINITY;
                for q in &shared.queues {
                    if let Some(e) = q.lock().unwrap().peek() {
                        min_cost = min_cost.min(e.cost);
                    }
                }
                if min_cost >= OP_FAIL_VALUE {
                    break;
                }
                ceiling = OP_FAIL_VALUE;
            }

            let params = StepParams {
                step,
                ceiling,
                target,
                cancel: &cancel,
                record_costs: cfg.record_costs,
            };
            let shared_ref = &shared;
            let cfg_ref = cfg;
            let params_ref = &params;
            pool.install(|| {
                workers
                    .par_iter_mut()
                    .for_each(|w| w.run_step(shared_ref, cfg_ref, params_ref));
            });

            // Barrier: the coordinator owns everything until the next step.
            deferred.clear();
            for w in &mut workers {
                deferred.append(&mut w.deferred);
            }
            deferred.sort_by(|a, b| {
                a.cost
                    .total_cmp(&b.cost)
                    .then_with(|| a.edge.cmp(&b.edge))
            });
            for d in &deferred {
                if target > 0 && shared.live_verts.load(Ordering::Relaxed) <= target {
                    break;
                }
                let (live, stale, generation, verts) = shared
                    .edges
                    .with(d.edge, |e| (e.live, e.stale, e.generation, e.verts));
                if !live || stale || generation != d.generation || verts != d.verts {
                    continue;
                }
                if execute_collapse(&shared, cfg, &mut coord_ctx, d.edge, generation, verts, None)
                    == CollapseOutcome::Executed
                    && cfg.record_costs
                {
                    coord_costs.push((step, d.cost));
                }
            }

            refresh_pending(&shared, cfg, &mut workers, &mut coord_ctx, &mut cost_scratch);

            if shared.edge_table.needs_purge() {
                shared.edge_table.purge();
            }
            if shared.tri_table.needs_purge() {
                shared.tri_table.purge();
            }

            let live = shared.live_tris.load(Ordering::Relaxed);
            let progress = (step + 1) as f64 / step_count as f64;
            reporter.report_decimate(progress.min(1.0), live);
            step += 1;
        }
    }

    let cancelled = reporter.cancelled();
    reporter.report(Stage::Cleanup, 1.0, shared.live_tris.load(Ordering::Relaxed));

    let output = pack(&shared, cfg, want_normals, &mut reporter, step, cancelled, &mut workers, coord_costs);
    reporter.report(Stage::Done, 1.0, output.stats.tri_count);

    info!(
        target: "mesh_decimate::driver",
        triangles = output.stats.tri_count,
        vertices = output.stats.vertex_count,
        collapses = output.stats.decimation_count,
        steps = step,
        cancelled,
        "decimation finished"
    );
    Ok(output)
}

/// Recompute every operation staled during the step and requeue it.
fn refresh_pending(
    shared: &EngineShared,
    cfg: &EngineConfig,
    workers: &mut [WorkerState],
    coord_ctx: &mut ExecCtx,
    scratch: &mut CostScratch,
) {
    let mut pending: Vec<Handle> = Vec::new();
    for w in workers.iter_mut() {
        pending.append(&mut w.ctx.pending);
    }
    pending.append(&mut coord_ctx.pending);

    for eh in pending {
        let (live, stale) = shared.edges.with(eh, |e| (e.live, e.stale));
        if !live || !stale {
            continue;
        }
        let (cost, point) = evaluate_edge(shared, cfg, scratch, eh);
        let partition = shared.edges.with_mut(eh, |e| {
            e.stale = false;
            e.cost = cost;
            e.collapse_point = point;
            e.generation = e.generation.wrapping_add(1);
            e.partition
        });
        let mut q = shared.queues[partition as usize].lock().unwrap();
        if cost >= OP_FAIL_VALUE {
            q.remove(&shared.edges, eh);
        } else {
            q.update(&shared.edges, eh, cost);
        }
    }
}

/// Stages BuildMesh, BuildEdges and BuildQueues.
fn build_state(
    src: &SourceMesh,
    cfg: &EngineConfig,
    threadcount: usize,
    reporter: &mut StatusReporter<'_>,
) -> DecimateResult<EngineShared> {
    let nverts = src.positions.len();
    let ntris = src.triangles.len();
    let vertex_alloc = cfg.vertex_alloc.max(nverts);
    let winding_sign = if cfg.flags.triangle_winding_ccw {
        1.0
    } else {
        -1.0
    };

    // BuildMesh: vertex and triangle records, plane cache, quadrics.
    reporter.report(Stage::BuildMesh, 0.0, ntris);
    let mut verts: Pool<VertexRec> = Pool::with_capacity(vertex_alloc);
    for p in &src.positions {
        verts.alloc_mut(VertexRec {
            position: *p,
            live: true,
            ..VertexRec::default()
        });
    }

    let mut tris: Pool<TriangleRec> = Pool::with_capacity(ntris);
    let mut centroids: Vec<Point3<f64>> = Vec::with_capacity(ntris);
    for t in &src.triangles {
        let [i0, i1, i2] = *t;
        let a = src.positions[i0 as usize];
        let b = src.positions[i1 as usize];
        let c = src.positions[i2 as usize];
        let plane = TrianglePlane::from_points(&a, &b, &c, winding_sign);
        let th = tris.alloc_mut(TriangleRec {
            verts: [
                Handle::from_index(i0 as usize),
                Handle::from_index(i1 as usize),
                Handle::from_index(i2 as usize),
            ],
            plane,
            live: true,
            ..TriangleRec::default()
        });
        centroids.push(Point3::from((a.coords + b.coords + c.coords) / 3.0));
        let corner = crate::quadric::Quadric::from_plane(
            &plane.normal,
            plane.offset,
            plane.area,
            plane.area / 3.0,
        );
        for &vi in t {
            let v = verts.get_mut(Handle::from_index(vi as usize));
            v.quadric.add(&corner);
            v.triangles.push(th);
        }
    }
    reporter.report(Stage::BuildMesh, 1.0, ntris);

    // Spatial partitioning defines worker ownership.
    let (partition_ids, partition_count) = partition_triangles(&centroids, threadcount);
    for (i, &p) in partition_ids.iter().enumerate() {
        tris.get_mut(Handle::from_index(i)).partition = p;
    }
    let partition_owner: Vec<usize> = (0..partition_count).map(|p| p % threadcount).collect();

    // BuildEdges: hash tables, boundary and ridge detection, locks.
    reporter.report(Stage::BuildEdges, 0.0, ntris);
    let headroom = 6 * vertex_alloc.saturating_sub(nverts) + 8;
    let mut edges: Pool<EdgeRec> = Pool::with_capacity(ntris * 3 + headroom);
    let mut edge_table: EdgeTable = Table::with_expected(ntris * 3 / 2 + 8);
    let mut tri_table: TriTable = Table::with_expected(ntris);
    let mut collisions = 0u64;

    for ti in 0..ntris {
        let th = Handle::from_index(ti);
        let tverts = tris.get_mut(th).verts;
        if tri_table
            .insert_mut(TriKey::new(tverts[0], tverts[1], tverts[2]), th)
            .is_some()
        {
            // Duplicate triangle in the input.
            collisions += 1;
        }
        let partition = tris.get_mut(th).partition;
        for i in 0..3 {
            let va = tverts[i];
            let vb = tverts[(i + 1) % 3];
            let key = EdgeKey::new(va, vb);
            let eh = match edge_table.lookup(key) {
                Some(existing) => existing,
                None => {
                    let rec = EdgeRec {
                        verts: if va < vb { [va, vb] } else { [vb, va] },
                        partition,
                        live: true,
                        ..EdgeRec::default()
                    };
                    let eh = edges.alloc_mut(rec);
                    edge_table.insert_mut(key, eh);
                    eh
                }
            };
            let e = edges.get_mut(eh);
            e.attach(th);
            if e.partition != partition {
                e.cross_partition = true;
            }
            tris.get_mut(th).edges[i] = eh;
        }
    }

    // Boundary edges (one owner) and feature ridges (sharp dihedral).
    for ei in 0..edges.len() {
        let eh = Handle::from_index(ei);
        let e = edges.get_mut(eh);
        if !e.live {
            continue;
        }
        let owners = e.owner_count();
        if owners == 1 {
            e.boundary = true;
        } else if owners == 2 {
            let (t0, t1) = (e.tris[0], e.tris[1]);
            let p0 = tris.get_mut(t0).plane;
            let p1 = tris.get_mut(t1).plane;
            if p0.area >= f64::EPSILON
                && p1.area >= f64::EPSILON
                && p0.normal.dot(&p1.normal) < cfg.sharp_edge_cos
            {
                e.boundary = true;
            }
        }
        if e.boundary {
            let [va, vb] = e.verts;
            verts.get_mut(va).on_boundary = true;
            verts.get_mut(vb).on_boundary = true;
        }
    }
    if cfg.flags.boundary_lock {
        for ei in 0..edges.len() {
            let eh = Handle::from_index(ei);
            let e = edges.get_mut(eh);
            if !e.live {
                continue;
            }
            let [va, vb] = e.verts;
            let a_boundary = verts.get_mut(va).on_boundary;
            let b_boundary = verts.get_mut(vb).on_boundary;
            edges.get_mut(eh).locked = a_boundary || b_boundary;
        }
    }
    reporter.report(Stage::BuildEdges, 1.0, ntris);
    debug!(
        target: "mesh_decimate::driver",
        edges = edge_table.build_len(),
        partitions = partition_count,
        duplicate_input_triangles = collisions,
        "mesh graph built"
    );

    let edge_count = edges.len();
    let shared = EngineShared {
        verts,
        tris,
        edges,
        edge_table,
        tri_table,
        queues: (0..partition_count)
            .map(|_| Mutex::new(CollapseHeap::with_capacity(edge_count / partition_count + 1)))
            .collect(),
        partition_owner,
        winding_sign,
        live_tris: AtomicUsize::new(ntris),
        live_verts: AtomicUsize::new(nverts),
        decimations: AtomicU64::new(0),
        collisions: AtomicU64::new(collisions),
    };

    // BuildQueues: seed every collapsible edge's operation.
    reporter.report(Stage::BuildQueues, 0.0, ntris);
    let mut scratch = CostScratch::default();
    for ei in 0..edge_count {
        let eh = Handle::from_index(ei);
        if !shared.edges.with(eh, |e| e.live) {
            continue;
        }
        let (cost, point) = evaluate_edge(&shared, cfg, &mut scratch, eh);
        let partition = shared.edges.with_mut(eh, |e| {
            e.cost = cost;
            e.collapse_point = point;
            e.partition
        });
        if cost < OP_FAIL_VALUE {
            shared.queues[partition as usize]
                .lock()
                .unwrap()
                .push(&shared.edges, eh, cost);
        }
    }
    reporter.report(Stage::BuildQueues, 1.0, ntris);
    let queued: usize = shared
        .queues
        .iter()
        .map(|q| q.lock().unwrap().len())
        .sum();
    debug!(
        target: "mesh_decimate::driver",
        queued,
        "collapse queues seeded"
    );
    Ok(shared)
}

/// Compact live vertices and triangles into the output, optionally with
/// area-weighted vertex normals.
#[allow(clippy::too_many_arguments)]
fn pack(
    shared: &EngineShared,
    cfg: &EngineConfig,
    want_normals: bool,
    reporter: &mut StatusReporter<'_>,
    steps: u32,
    cancelled: bool,
    workers: &mut [WorkerState],
    coord_costs: Vec<(u32, f64)>,
) -> EngineOutput {
    reporter.report(Stage::Pack, 0.0, shared.live_tris.load(Ordering::Relaxed));

    let vert_count = shared.verts.len();
    let mut remap: Vec<u32> = vec![u32::MAX; vert_count];
    let mut positions: Vec<Point3<f64>> = Vec::new();
    for i in 0..vert_count {
        let h = Handle::from_index(i);
        let (live, position) = shared.verts.with(h, |v| {
            debug_assert!(v.live || v.redirect.is_some() || v.triangles.is_empty());
            (v.live, v.position)
        });
        if live {
            remap[i] = positions.len() as u32;
            positions.push(position);
        }
    }

    let mut triangles: Vec<[u32; 3]> = Vec::new();
    let mut normal_accum: Vec<Vector3<f64>> = if want_normals {
        vec![Vector3::zeros(); positions.len()]
    } else {
        Vec::new()
    };
    for i in 0..shared.tris.len() {
        let h = Handle::from_index(i);
        let (live, verts, plane) = shared.tris.with(h, |t| (t.live, t.verts, t.plane));
        if !live {
            continue;
        }
        let mapped = [
            remap[verts[0].index()],
            remap[verts[1].index()],
            remap[verts[2].index()],
        ];
        debug_assert!(mapped.iter().all(|&m| m != u32::MAX));
        triangles.push(mapped);
        if want_normals {
            for &m in &mapped {
                normal_accum[m as usize] += plane.normal * plane.area;
            }
        }
    }

    let normals = want_normals.then(|| {
        normal_accum
            .iter()
            .map(|n| {
                let len = n.norm();
                if len > f64::EPSILON {
                    n / len
                } else {
                    Vector3::zeros()
                }
            })
            .collect()
    });

    let mut accepted_costs = Vec::new();
    if cfg.record_costs {
        for w in workers.iter_mut() {
            accepted_costs.push(std::mem::take(&mut w.costs));
        }
        accepted_costs.push(coord_costs);
    }

    let stats = RunStats {
        vertex_count: positions.len(),
        tri_count: triangles.len(),
        decimation_count: shared.decimations.load(Ordering::Relaxed),
        collision_count: shared.collisions.load(Ordering::Relaxed),
        cancelled,
        sync_steps: steps,
        accepted_costs,
    };
    reporter.report(Stage::Pack, 1.0, stats.tri_count);

    EngineOutput {
        positions,
        normals,
        triangles,
        stats,
    }
}
