//! Stage and progress reporting for decimation runs.
//!
//! A run walks a fixed sequence of stages. The caller may register a status
//! callback; returning `false` from it requests cooperative cancellation,
//! which the driver observes at the next syncstep barrier.

use std::sync::atomic::{AtomicBool, Ordering};

/// Stages of a decimation run, reported in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Stage {
    Init = 0,
    BuildMesh = 1,
    BuildEdges = 2,
    BuildQueues = 3,
    Decimate = 4,
    Cleanup = 5,
    Pack = 6,
    Done = 7,
}

impl Stage {
    /// Human-readable stage name.
    pub fn name(self) -> &'static str {
        match self {
            Stage::Init => "Init",
            Stage::BuildMesh => "BuildMesh",
            Stage::BuildEdges => "BuildEdges",
            Stage::BuildQueues => "BuildQueues",
            Stage::Decimate => "Decimate",
            Stage::Cleanup => "Cleanup",
            Stage::Pack => "Pack",
            Stage::Done => "Done",
        }
    }
}

/// Status snapshot passed to the caller's callback.
#[derive(Debug, Clone)]
pub struct Status {
    pub stage: Stage,
    /// Progress within the stage, monotone in [0, 1].
    pub progress: f64,
    /// Live triangle count at the time of the report.
    pub triangle_count: usize,
}

impl Status {
    /// Stage name, mirroring `Stage::name`.
    pub fn stage_name(&self) -> &'static str {
        self.stage.name()
    }
}

/// Callback invoked with status snapshots. Return `true` to continue,
/// `false` to request cancellation.
pub type StatusCallback = Box<dyn Fn(&Status) -> bool + Send + Sync>;

/// Driver-side reporter: throttles Decimate-stage reports by triangle
/// interval, keeps per-stage progress monotone, and latches cancellation.
pub(crate) struct StatusReporter<'a> {
    callback: Option<&'a StatusCallback>,
    /// Report again once the live triangle count has dropped this far.
    interval_triangles: usize,
    last_reported_triangles: usize,
    last_stage: Stage,
    last_progress: f64,
    cancel: &'a AtomicBool,
}

impl<'a> StatusReporter<'a> {
    pub fn new(
        callback: Option<&'a StatusCallback>,
        interval_triangles: usize,
        cancel: &'a AtomicBool,
    ) -> Self {
        Self {
            callback,
            interval_triangles,
            last_reported_triangles: usize::MAX,
            last_stage: Stage::Init,
            last_progress: -1.0,
            cancel,
        }
    }

    pub fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Report a stage milestone. Returns `false` once cancellation has been
    /// requested.
    pub fn report(&mut self, stage: Stage, progress: f64, triangle_count: usize) -> bool {
        if self.cancelled() {
            return false;
        }
        let Some(cb) = self.callback else {
            return true;
        };
        if stage != self.last_stage {
            self.last_stage = stage;
            self.last_progress = -1.0;
            self.last_reported_triangles = usize::MAX;
        }
        // Progress is monotone within a stage.
        let progress = progress.clamp(0.0, 1.0).max(self.last_progress);
        self.last_progress = progress;
        self.last_reported_triangles = triangle_count;
        let status = Status {
            stage,
            progress,
            triangle_count,
        };
        if !cb(&status) {
            self.cancel.store(true, Ordering::Relaxed);
            return false;
        }
        true
    }

    /// Report inside the Decimate stage, throttled by `interval_triangles`.
    pub fn report_decimate(&mut self, progress: f64, triangle_count: usize) -> bool {
        if self.cancelled() {
            return false;
        }
        if self.callback.is_none() {
            return true;
        }
        let due = self.last_stage != Stage::Decimate
            || self
                .last_reported_triangles
                .saturating_sub(triangle_count)
                >= self.interval_triangles;
        if !due {
            return true;
        }
        self.report(Stage::Decimate, progress, triangle_count)
    }
}
