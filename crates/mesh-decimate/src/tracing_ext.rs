//! Tracing helpers for decimation runs.
//!
//! Enable output by installing a `tracing` subscriber in the host
//! application; `RUST_LOG=mesh_decimate=debug` shows stage timings and the
//! budget search trace.

use std::time::Instant;

use tracing::{debug, info};

/// A timer that logs its elapsed time when dropped.
pub struct OperationTimer {
    name: &'static str,
    start: Instant,
}

impl OperationTimer {
    /// Start a timer for a named operation.
    pub fn new(name: &'static str) -> Self {
        debug!(target: "mesh_decimate::timing", operation = name, "starting");
        Self {
            name,
            start: Instant::now(),
        }
    }

    /// Start a timer annotated with mesh dimensions.
    pub fn with_context(name: &'static str, triangles: usize, vertices: usize) -> Self {
        debug!(
            target: "mesh_decimate::timing",
            operation = name,
            triangles,
            vertices,
            "starting"
        );
        Self {
            name,
            start: Instant::now(),
        }
    }

    /// Elapsed milliseconds so far.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        info!(
            target: "mesh_decimate::timing",
            operation = self.name,
            elapsed_ms = format!("{:.2}", self.elapsed_ms()),
            "completed"
        );
    }
}
