//! Parallel triangle-mesh decimation with quadric error metrics.
//!
//! This crate simplifies indexed triangle meshes by iteratively collapsing
//! edges in ascending order of a quadric-based error cost until a feature
//! size, vertex target, or triangle budget is reached. The result is a
//! topologically valid, orientation-preserving approximation of the input
//! surface.
//!
//! # How it works
//!
//! - Every vertex accumulates the area-weighted quadrics of its incident
//!   triangle planes; an edge's collapse cost is the merged quadric error at
//!   the optimal collapse point plus shape and boundary penalties.
//! - Triangles are spatially partitioned; each worker thread owns a set of
//!   partitions and their priority queues.
//! - The collapse loop runs in *syncsteps*: a quadratic cost ceiling ramps up
//!   step by step, workers execute the collapses fully inside their own
//!   partitions, and collapses whose neighborhood crosses partitions are
//!   deferred to the barrier where the coordinator applies them serially.
//!   With one thread the run is deterministic.
//!
//! # Quick start
//!
//! ```
//! use mesh_decimate::{decimate, DecimateFlags, IndexBuffer, Operation, VertexBuffer};
//!
//! // A unit cube: 8 vertices, 12 triangles, CCW winding.
//! let mut vertices: Vec<f32> = vec![
//!     0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0,
//!     0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0, 1.0, 1.0,
//! ];
//! let mut indices: Vec<u32> = vec![
//!     0, 2, 1, 0, 3, 2, 4, 5, 6, 4, 6, 7, 0, 1, 5, 0, 5, 4,
//!     3, 7, 6, 3, 6, 2, 0, 4, 7, 0, 7, 3, 1, 2, 6, 1, 6, 5,
//! ];
//!
//! let mut op = Operation::new(
//!     VertexBuffer::f32(&mut vertices, 3),
//!     8,
//!     IndexBuffer::u32(&mut indices, 3),
//!     12,
//! );
//! op.set_strength(0.2);
//!
//! let flags = DecimateFlags { triangle_winding_ccw: true, ..DecimateFlags::none() };
//! let stats = decimate(&mut op, 1, flags).unwrap();
//! // A cube has no redundant geometry at this strength.
//! assert_eq!(stats.tri_count, 12);
//! ```
//!
//! # Triangle budgets
//!
//! [`decimate_budget`] binary-searches the feature size until the triangle
//! count fits a budget:
//!
//! ```no_run
//! use mesh_decimate::{decimate_budget, BudgetOptions, DecimateFlags, IndexBuffer,
//!                     Operation, VertexBuffer};
//!
//! # let (mut vertices, mut indices): (Vec<f32>, Vec<u32>) = (vec![], vec![]);
//! # let (vertex_count, tri_count) = (0, 0);
//! let mut op = Operation::new(
//!     VertexBuffer::f32(&mut vertices, 3),
//!     vertex_count,
//!     IndexBuffer::u32(&mut indices, 3),
//!     tri_count,
//! );
//! let mut budget = BudgetOptions::default();
//! decimate_budget(&mut op, 1000, 4, DecimateFlags::none(), &mut budget).unwrap();
//! println!(
//!     "{} triangles at feature size {} after {} probes",
//!     budget.final_tri_count, budget.final_feature_size, budget.iteration_count
//! );
//! ```
//!
//! # Input contract
//!
//! Vertex positions are `f32` or `f64` with a configurable stride; indices
//! are `u32` or `i32`. Buffers are borrowed mutably: results are written back
//! in place, so size the vertex buffer for `vertex_alloc` entries when
//! `normal_vertex_splitting` is enabled. The input should be manifold-ish;
//! non-manifold edges are detected, excluded from collapsing and reported,
//! never fatal.
//!
//! # Logging
//!
//! The crate emits `tracing` events under the `mesh_decimate` targets; see
//! [`tracing_ext`] for timers and subscriber hints.

mod arena;
mod collapse;
mod cost;
mod driver;
mod hash;
mod partition;
mod queue;

pub mod budget;
pub mod error;
pub mod operation;
pub mod progress;
pub mod quadric;
pub mod tracing_ext;
pub mod types;

pub use budget::{decimate_budget, BudgetOptions};
pub use driver::RunStats;
pub use error::{DecimateError, DecimateResult};
pub use operation::{decimate, Operation};
pub use progress::{Stage, Status, StatusCallback};
pub use types::{DecimateFlags, IndexBuffer, NormalBuffer, VertexBuffer};
