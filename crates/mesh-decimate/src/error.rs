//! Error types for decimation operations.

use thiserror::Error;

/// Result type alias for decimation operations.
pub type DecimateResult<T> = Result<T, DecimateError>;

/// Errors that can occur while configuring or running a decimation.
///
/// Configuration errors are reported before any input buffer is touched.
/// Recoverable conditions (non-manifold edges, duplicate triangles, vertex
/// allocation exhaustion during splitting) are not errors: they surface as
/// counters and log events instead.
#[derive(Debug, Error)]
pub enum DecimateError {
    /// The mesh has no vertices or no triangles.
    #[error("mesh is empty: {details}")]
    EmptyMesh { details: String },

    /// A buffer stride is smaller than the natural element width.
    #[error("invalid {what} stride: {stride} scalars, need at least {min}")]
    InvalidStride {
        what: &'static str,
        stride: usize,
        min: usize,
    },

    /// A caller buffer cannot hold the configured element count.
    #[error("{what} buffer too small: holds {got} entries, needs {needed}")]
    BufferTooSmall {
        what: &'static str,
        got: usize,
        needed: usize,
    },

    /// A triangle references a vertex outside the configured range.
    #[error("invalid vertex index: triangle {triangle} references vertex {index}, but mesh only has {vertex_count} vertices")]
    InvalidVertexIndex {
        triangle: usize,
        index: i64,
        vertex_count: usize,
    },

    /// A triangle repeats one of its vertex indices.
    #[error("degenerate triangle {triangle}: repeated vertex index")]
    DegenerateTriangle { triangle: usize },

    /// A vertex coordinate is NaN or infinite.
    #[error("invalid coordinate at vertex {vertex}: {value} is not finite")]
    InvalidCoordinate { vertex: usize, value: f64 },

    /// Contradictory or out-of-range configuration.
    #[error("invalid configuration: {details}")]
    InvalidConfiguration { details: String },

    /// The worker thread pool could not be built.
    #[error("failed to build worker thread pool: {source}")]
    ThreadPool {
        #[source]
        source: rayon::ThreadPoolBuildError,
    },
}
