//! Buffer contracts and geometric helper types.
//!
//! The engine never owns mesh storage: positions and indices are borrowed from
//! the caller through format-parameterized views. Internal computation always
//! runs in `f64`; the views convert on read and write.

use nalgebra::{Point3, Vector3};

/// Mutable view over the caller's vertex positions.
///
/// `stride` is measured in scalars (not bytes) and must be at least 3. A
/// tightly packed xyz buffer has stride 3.
#[derive(Debug)]
pub enum VertexBuffer<'a> {
    F32 { data: &'a mut [f32], stride: usize },
    F64 { data: &'a mut [f64], stride: usize },
}

impl<'a> VertexBuffer<'a> {
    /// Wrap a packed or strided `f32` position buffer.
    pub fn f32(data: &'a mut [f32], stride: usize) -> Self {
        VertexBuffer::F32 { data, stride }
    }

    /// Wrap a packed or strided `f64` position buffer.
    pub fn f64(data: &'a mut [f64], stride: usize) -> Self {
        VertexBuffer::F64 { data, stride }
    }

    /// Stride in scalars.
    pub fn stride(&self) -> usize {
        match self {
            VertexBuffer::F32 { stride, .. } | VertexBuffer::F64 { stride, .. } => *stride,
        }
    }

    /// Number of whole vertex entries the buffer can hold.
    pub fn capacity(&self) -> usize {
        match self {
            VertexBuffer::F32 { data, stride } => data.len() / (*stride).max(1),
            VertexBuffer::F64 { data, stride } => data.len() / (*stride).max(1),
        }
    }

    /// Read vertex `i` as an `f64` point.
    pub fn read(&self, i: usize) -> Point3<f64> {
        match self {
            VertexBuffer::F32 { data, stride } => {
                let o = i * stride;
                Point3::new(data[o] as f64, data[o + 1] as f64, data[o + 2] as f64)
            }
            VertexBuffer::F64 { data, stride } => {
                let o = i * stride;
                Point3::new(data[o], data[o + 1], data[o + 2])
            }
        }
    }

    /// Write vertex `i`, converting to the buffer's scalar format.
    pub fn write(&mut self, i: usize, p: &Point3<f64>) {
        match self {
            VertexBuffer::F32 { data, stride } => {
                let o = i * *stride;
                data[o] = p.x as f32;
                data[o + 1] = p.y as f32;
                data[o + 2] = p.z as f32;
            }
            VertexBuffer::F64 { data, stride } => {
                let o = i * *stride;
                data[o] = p.x;
                data[o + 1] = p.y;
                data[o + 2] = p.z;
            }
        }
    }
}

/// Mutable view over the caller's triangle indices.
///
/// `stride` is measured in index elements per triangle and must be at least 3.
#[derive(Debug)]
pub enum IndexBuffer<'a> {
    U32 { data: &'a mut [u32], stride: usize },
    I32 { data: &'a mut [i32], stride: usize },
}

impl<'a> IndexBuffer<'a> {
    /// Wrap a `u32` index buffer.
    pub fn u32(data: &'a mut [u32], stride: usize) -> Self {
        IndexBuffer::U32 { data, stride }
    }

    /// Wrap an `i32` index buffer.
    pub fn i32(data: &'a mut [i32], stride: usize) -> Self {
        IndexBuffer::I32 { data, stride }
    }

    /// Stride in index elements.
    pub fn stride(&self) -> usize {
        match self {
            IndexBuffer::U32 { stride, .. } | IndexBuffer::I32 { stride, .. } => *stride,
        }
    }

    /// Number of whole triangle entries the buffer can hold.
    pub fn capacity(&self) -> usize {
        match self {
            IndexBuffer::U32 { data, stride } => data.len() / (*stride).max(1),
            IndexBuffer::I32 { data, stride } => data.len() / (*stride).max(1),
        }
    }

    /// Read triangle `i` as widened signed indices, so range checks can catch
    /// negative `i32` entries.
    pub fn read(&self, i: usize) -> [i64; 3] {
        match self {
            IndexBuffer::U32 { data, stride } => {
                let o = i * stride;
                [data[o] as i64, data[o + 1] as i64, data[o + 2] as i64]
            }
            IndexBuffer::I32 { data, stride } => {
                let o = i * stride;
                [data[o] as i64, data[o + 1] as i64, data[o + 2] as i64]
            }
        }
    }

    /// Write triangle `i`.
    pub fn write(&mut self, i: usize, tri: [u32; 3]) {
        match self {
            IndexBuffer::U32 { data, stride } => {
                let o = i * *stride;
                data[o] = tri[0];
                data[o + 1] = tri[1];
                data[o + 2] = tri[2];
            }
            IndexBuffer::I32 { data, stride } => {
                let o = i * *stride;
                data[o] = tri[0] as i32;
                data[o + 1] = tri[1] as i32;
                data[o + 2] = tri[2] as i32;
            }
        }
    }
}

/// Mutable view over a caller buffer receiving recomputed vertex normals.
#[derive(Debug)]
pub enum NormalBuffer<'a> {
    F32 { data: &'a mut [f32], stride: usize },
    F64 { data: &'a mut [f64], stride: usize },
}

impl<'a> NormalBuffer<'a> {
    pub fn f32(data: &'a mut [f32], stride: usize) -> Self {
        NormalBuffer::F32 { data, stride }
    }

    pub fn f64(data: &'a mut [f64], stride: usize) -> Self {
        NormalBuffer::F64 { data, stride }
    }

    pub fn stride(&self) -> usize {
        match self {
            NormalBuffer::F32 { stride, .. } | NormalBuffer::F64 { stride, .. } => *stride,
        }
    }

    pub fn capacity(&self) -> usize {
        match self {
            NormalBuffer::F32 { data, stride } => data.len() / (*stride).max(1),
            NormalBuffer::F64 { data, stride } => data.len() / (*stride).max(1),
        }
    }

    pub fn write(&mut self, i: usize, n: &Vector3<f64>) {
        match self {
            NormalBuffer::F32 { data, stride } => {
                let o = i * *stride;
                data[o] = n.x as f32;
                data[o + 1] = n.y as f32;
                data[o + 2] = n.z as f32;
            }
            NormalBuffer::F64 { data, stride } => {
                let o = i * *stride;
                data[o] = n.x;
                data[o + 1] = n.y;
                data[o + 2] = n.z;
            }
        }
    }
}

/// Behavior switches for a decimation run.
///
/// Note: combining `normal_vertex_splitting` with `planar_mode` is supported
/// but tends to reduce the effective reduction rate, because split seams keep
/// reintroducing boundary-weighted edges on otherwise coplanar regions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "pipeline-config",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct DecimateFlags {
    /// Enable the coplanar fast-path: collapses whose affected triangle
    /// normals barely move get a 99% penalty reduction.
    pub planar_mode: bool,
    /// After a collapse, duplicate the merged vertex per normal-discontinuous
    /// triangle cluster (uses the `vertex_alloc` headroom).
    pub normal_vertex_splitting: bool,
    /// Input triangles wind counter-clockwise when viewed from outside.
    /// When unset, clockwise winding is assumed and normal signs invert.
    pub triangle_winding_ccw: bool,
    /// Refuse to collapse any edge touching a boundary vertex.
    pub boundary_lock: bool,
    /// Assert the vertex buffer is tightly packed xyz (stride must be 3).
    pub continuous_vertices: bool,
}

impl DecimateFlags {
    /// No flags set.
    pub fn none() -> Self {
        Self::default()
    }
}

/// Plane of a triangle plus its area, cached on every live triangle and used
/// to refresh vertex quadrics after a collapse.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TrianglePlane {
    /// Unit normal, zero for degenerate triangles.
    pub normal: Vector3<f64>,
    /// Plane offset: `normal · p + offset == 0` for points on the plane.
    pub offset: f64,
    pub area: f64,
}

impl TrianglePlane {
    pub const ZERO: TrianglePlane = TrianglePlane {
        normal: Vector3::new(0.0, 0.0, 0.0),
        offset: 0.0,
        area: 0.0,
    };

    /// Compute the plane of a triangle. `winding_sign` is +1 for CCW input,
    /// -1 for CW, so stored normals always face outward.
    pub fn from_points(
        a: &Point3<f64>,
        b: &Point3<f64>,
        c: &Point3<f64>,
        winding_sign: f64,
    ) -> TrianglePlane {
        let cross = (b - a).cross(&(c - a)) * winding_sign;
        let len = cross.norm();
        if len < f64::EPSILON {
            return TrianglePlane::ZERO;
        }
        let normal = cross / len;
        TrianglePlane {
            normal,
            offset: -normal.dot(&a.coords),
            area: len * 0.5,
        }
    }
}

/// Compactness of a triangle: shortest altitude divided by longest edge.
///
/// An equilateral triangle scores ~0.866; slivers approach zero. Returns 0.0
/// for degenerate triangles.
pub(crate) fn triangle_compactness(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    let e0 = (b - a).norm();
    let e1 = (c - b).norm();
    let e2 = (a - c).norm();
    let longest = e0.max(e1).max(e2);
    if longest < f64::EPSILON {
        return 0.0;
    }
    let area = (b - a).cross(&(c - a)).norm() * 0.5;
    // shortest altitude = 2 * area / longest edge
    (2.0 * area / longest) / longest
}
