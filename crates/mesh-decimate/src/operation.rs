//! The decimation operation: buffers, configuration and statistics.
//!
//! An [`Operation`] borrows the caller's vertex and index buffers, carries
//! every tuning knob for one run, and receives the result statistics. The
//! engine reads the buffers during the build stages and writes the simplified
//! mesh back into them during the pack stage; extra vertices produced by
//! normal vertex splitting land in the `vertex_alloc` headroom.

use std::f64::consts::FRAC_PI_6;

use crate::driver::{self, EngineConfig, EngineOutput, RunStats, SourceMesh};
use crate::error::{DecimateError, DecimateResult};
use crate::progress::StatusCallback;
use crate::types::{DecimateFlags, IndexBuffer, NormalBuffer, VertexBuffer};

/// Cosine of the cluster membership angle for normal vertex splitting (45°).
const NORMAL_CLUSTER_COS: f64 = 0.707_106_781_186_547_6;

/// Configuration and result state for one decimation.
pub struct Operation<'a> {
    pub(crate) vertices: VertexBuffer<'a>,
    pub(crate) indices: IndexBuffer<'a>,
    /// Input vertex count; replaced by the output count after a run.
    pub vertex_count: usize,
    /// Input triangle count; replaced by the output count after a run.
    pub tri_count: usize,
    /// Upper bound on total vertices including splits. Defaults to the input
    /// vertex count.
    pub vertex_alloc: usize,
    /// Decimation strength as a length scale; see [`Operation::set_strength`].
    pub feature_size: f64,
    /// Stop once the live vertex count drops to this value (0 disables).
    /// While active, the cost ceiling keeps climbing past the feature-size
    /// wall.
    pub target_vertex_count_max: usize,
    /// Number of cost-ramp syncsteps.
    pub sync_step_count: u32,
    /// Normal deviation below which planar mode treats a collapse as
    /// coplanar. The ideal value may depend on mesh scale, hence a field.
    pub planar_threshold: f64,
    /// Penalty multiplier for collapses touching boundary or ridge vertices.
    pub boundary_weight: f64,
    /// Compactness ratio (shortest altitude / longest edge) under which
    /// post-collapse slivers are penalized. 0 disables the term.
    pub compactness_target: f64,
    /// Minimum dot product between a triangle's pre- and post-collapse
    /// normals; collapses below it are rejected as flips.
    pub normal_guard: f64,
    /// Dihedral angle (radians) above which an interior edge counts as a
    /// feature ridge.
    pub sharp_angle_threshold: f64,
    /// Record per-worker accepted-collapse costs into the run statistics.
    pub record_costs: bool,
    pub(crate) normals: Option<NormalBuffer<'a>>,
    pub(crate) status: Option<StatusCallback>,
    pub(crate) interval_triangles: usize,
    /// Accepted collapses of the last run.
    pub decimation_count: u64,
    /// Duplicate triangles retired during the last run.
    pub collision_count: u64,
}

impl<'a> Operation<'a> {
    /// Create an operation over the caller's mesh buffers.
    pub fn new(
        vertices: VertexBuffer<'a>,
        vertex_count: usize,
        indices: IndexBuffer<'a>,
        tri_count: usize,
    ) -> Self {
        Self {
            vertices,
            indices,
            vertex_count,
            tri_count,
            vertex_alloc: vertex_count,
            feature_size: 0.0,
            target_vertex_count_max: 0,
            sync_step_count: 64,
            planar_threshold: 1e-3,
            boundary_weight: 10.0,
            compactness_target: 0.25,
            normal_guard: 0.0,
            sharp_angle_threshold: FRAC_PI_6,
            record_costs: false,
            normals: None,
            status: None,
            interval_triangles: 0,
            decimation_count: 0,
            collision_count: 0,
        }
    }

    /// Set the decimation strength. Larger feature sizes collapse more:
    /// the cost wall is `(0.25 * feature_size)^6`.
    pub fn set_strength(&mut self, feature_size: f64) {
        self.feature_size = feature_size;
    }

    /// Cost wall derived from the current feature size.
    pub fn max_collapse_cost(&self) -> f64 {
        let s = 0.25 * self.feature_size;
        s * s * s * s * s * s
    }

    /// Receive recomputed area-weighted vertex normals during the pack stage.
    pub fn compute_normals(&mut self, buffer: NormalBuffer<'a>) {
        self.normals = Some(buffer);
    }

    /// Register a status callback. During the Decimate stage it re-fires
    /// every time the live triangle count drops by `interval_triangles`.
    pub fn status_callback(&mut self, callback: StatusCallback, interval_triangles: usize) {
        self.status = Some(callback);
        self.interval_triangles = interval_triangles;
    }
}

/// Run one decimation. Results are written into the operation's buffers and
/// counters; the returned statistics mirror them.
pub fn decimate(
    op: &mut Operation<'_>,
    threadcount: usize,
    flags: DecimateFlags,
) -> DecimateResult<RunStats> {
    let src = decode(op, flags)?;
    let cfg = engine_config(op, flags);
    let want_normals = op.normals.is_some();
    let output = driver::run(
        &src,
        &cfg,
        threadcount,
        op.status.as_ref(),
        op.interval_triangles,
        want_normals,
    )?;
    write_back(op, &output);
    Ok(output.stats)
}

/// Validate the configuration and decode the caller's buffers. Nothing is
/// mutated before validation passes.
pub(crate) fn decode(op: &Operation<'_>, flags: DecimateFlags) -> DecimateResult<SourceMesh> {
    if op.vertex_count == 0 {
        return Err(DecimateError::EmptyMesh {
            details: "vertex count is zero".into(),
        });
    }
    if op.tri_count == 0 {
        return Err(DecimateError::EmptyMesh {
            details: "triangle count is zero".into(),
        });
    }
    if op.vertices.stride() < 3 {
        return Err(DecimateError::InvalidStride {
            what: "vertex",
            stride: op.vertices.stride(),
            min: 3,
        });
    }
    if op.indices.stride() < 3 {
        return Err(DecimateError::InvalidStride {
            what: "index",
            stride: op.indices.stride(),
            min: 3,
        });
    }
    if flags.continuous_vertices && op.vertices.stride() != 3 {
        return Err(DecimateError::InvalidConfiguration {
            details: format!(
                "continuous_vertices requires a packed vertex buffer, stride is {}",
                op.vertices.stride()
            ),
        });
    }
    if !(op.feature_size >= 0.0) {
        return Err(DecimateError::InvalidConfiguration {
            details: format!("feature size {} is negative or NaN", op.feature_size),
        });
    }

    let vertex_alloc = op.vertex_alloc.max(op.vertex_count);
    let needed_vertices = if flags.normal_vertex_splitting {
        vertex_alloc
    } else {
        op.vertex_count
    };
    if op.vertices.capacity() < needed_vertices {
        return Err(DecimateError::BufferTooSmall {
            what: "vertex",
            got: op.vertices.capacity(),
            needed: needed_vertices,
        });
    }
    if op.indices.capacity() < op.tri_count {
        return Err(DecimateError::BufferTooSmall {
            what: "index",
            got: op.indices.capacity(),
            needed: op.tri_count,
        });
    }
    if let Some(normals) = &op.normals {
        if normals.stride() < 3 {
            return Err(DecimateError::InvalidStride {
                what: "normal",
                stride: normals.stride(),
                min: 3,
            });
        }
        if normals.capacity() < needed_vertices {
            return Err(DecimateError::BufferTooSmall {
                what: "normal",
                got: normals.capacity(),
                needed: needed_vertices,
            });
        }
    }

    let mut positions = Vec::with_capacity(op.vertex_count);
    for i in 0..op.vertex_count {
        let p = op.vertices.read(i);
        for value in [p.x, p.y, p.z] {
            if !value.is_finite() {
                return Err(DecimateError::InvalidCoordinate { vertex: i, value });
            }
        }
        positions.push(p);
    }

    let mut triangles = Vec::with_capacity(op.tri_count);
    for t in 0..op.tri_count {
        let raw = op.indices.read(t);
        let mut tri = [0u32; 3];
        for (k, &index) in raw.iter().enumerate() {
            if index < 0 || index >= op.vertex_count as i64 {
                return Err(DecimateError::InvalidVertexIndex {
                    triangle: t,
                    index,
                    vertex_count: op.vertex_count,
                });
            }
            tri[k] = index as u32;
        }
        if tri[0] == tri[1] || tri[1] == tri[2] || tri[0] == tri[2] {
            return Err(DecimateError::DegenerateTriangle { triangle: t });
        }
        triangles.push(tri);
    }

    Ok(SourceMesh {
        positions,
        triangles,
    })
}

/// Resolve the engine configuration from the operation and flags.
pub(crate) fn engine_config(op: &Operation<'_>, flags: DecimateFlags) -> EngineConfig {
    EngineConfig {
        flags,
        feature_size: op.feature_size,
        max_collapse_cost: op.max_collapse_cost(),
        sync_step_count: op.sync_step_count,
        target_vertex_count_max: op.target_vertex_count_max,
        vertex_alloc: op.vertex_alloc.max(op.vertex_count),
        planar_threshold: op.planar_threshold,
        boundary_weight: op.boundary_weight,
        compactness_target: op.compactness_target,
        normal_guard: op.normal_guard,
        sharp_edge_cos: op.sharp_angle_threshold.cos(),
        normal_cluster_cos: NORMAL_CLUSTER_COS,
        record_costs: op.record_costs,
    }
}

/// Write a run's output into the operation's buffers and counters.
pub(crate) fn write_back(op: &mut Operation<'_>, output: &EngineOutput) {
    for (i, p) in output.positions.iter().enumerate() {
        op.vertices.write(i, p);
    }
    for (i, t) in output.triangles.iter().enumerate() {
        op.indices.write(i, *t);
    }
    if let (Some(buffer), Some(normals)) = (op.normals.as_mut(), output.normals.as_ref()) {
        for (i, n) in normals.iter().enumerate() {
            buffer.write(i, n);
        }
    }
    op.vertex_count = output.stats.vertex_count;
    op.tri_count = output.stats.tri_count;
    op.decimation_count = output.stats.decimation_count;
    op.collision_count = output.stats.collision_count;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube_buffers() -> (Vec<f32>, Vec<u32>) {
        let vertices: Vec<f32> = vec![
            0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 1.0,
            0.0, 1.0, 1.0, 1.0, 1.0, 0.0, 1.0, 1.0,
        ];
        let indices: Vec<u32> = vec![
            0, 2, 1, 0, 3, 2, 4, 5, 6, 4, 6, 7, 0, 1, 5, 0, 5, 4, 3, 7, 6, 3, 6, 2, 0, 4, 7, 0,
            7, 3, 1, 2, 6, 1, 6, 5,
        ];
        (vertices, indices)
    }

    #[test]
    fn decode_accepts_valid_cube() {
        let (mut v, mut i) = cube_buffers();
        let op = Operation::new(VertexBuffer::f32(&mut v, 3), 8, IndexBuffer::u32(&mut i, 3), 12);
        let src = decode(&op, DecimateFlags::none()).unwrap();
        assert_eq!(src.positions.len(), 8);
        assert_eq!(src.triangles.len(), 12);
    }

    #[test]
    fn decode_rejects_zero_counts() {
        let (mut v, mut i) = cube_buffers();
        let op = Operation::new(VertexBuffer::f32(&mut v, 3), 0, IndexBuffer::u32(&mut i, 3), 12);
        assert!(matches!(
            decode(&op, DecimateFlags::none()),
            Err(DecimateError::EmptyMesh { .. })
        ));
    }

    #[test]
    fn decode_rejects_out_of_range_index() {
        let (mut v, mut i) = cube_buffers();
        i[0] = 99;
        let op = Operation::new(VertexBuffer::f32(&mut v, 3), 8, IndexBuffer::u32(&mut i, 3), 12);
        assert!(matches!(
            decode(&op, DecimateFlags::none()),
            Err(DecimateError::InvalidVertexIndex {
                triangle: 0,
                index: 99,
                ..
            })
        ));
    }

    #[test]
    fn decode_rejects_negative_index() {
        let (v, i) = cube_buffers();
        let mut v: Vec<f64> = v.iter().map(|&x| x as f64).collect();
        let mut i: Vec<i32> = i.iter().map(|&x| x as i32).collect();
        i[5] = -1;
        let op = Operation::new(VertexBuffer::f64(&mut v, 3), 8, IndexBuffer::i32(&mut i, 3), 12);
        assert!(matches!(
            decode(&op, DecimateFlags::none()),
            Err(DecimateError::InvalidVertexIndex { index: -1, .. })
        ));
    }

    #[test]
    fn decode_rejects_nan_coordinate() {
        let (mut v, mut i) = cube_buffers();
        v[4] = f32::NAN;
        let op = Operation::new(VertexBuffer::f32(&mut v, 3), 8, IndexBuffer::u32(&mut i, 3), 12);
        assert!(matches!(
            decode(&op, DecimateFlags::none()),
            Err(DecimateError::InvalidCoordinate { vertex: 1, .. })
        ));
    }

    #[test]
    fn decode_rejects_strided_buffer_with_continuous_flag() {
        let (v, mut i) = cube_buffers();
        let mut padded = Vec::new();
        for chunk in v.chunks(3) {
            padded.extend_from_slice(chunk);
            padded.push(0.0);
        }
        let op = Operation::new(
            VertexBuffer::f32(&mut padded, 4),
            8,
            IndexBuffer::u32(&mut i, 3),
            12,
        );
        let flags = DecimateFlags {
            continuous_vertices: true,
            ..DecimateFlags::none()
        };
        assert!(matches!(
            decode(&op, flags),
            Err(DecimateError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn strength_drives_the_cost_wall() {
        let (mut v, mut i) = cube_buffers();
        let mut op =
            Operation::new(VertexBuffer::f32(&mut v, 3), 8, IndexBuffer::u32(&mut i, 3), 12);
        op.set_strength(2.0);
        assert!((op.max_collapse_cost() - 0.5f64.powi(6)).abs() < 1e-15);
    }
}
