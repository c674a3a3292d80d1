//! Triangle-budget driver.
//!
//! Wraps the decimation in a binary search over feature size: the final
//! triangle count is monotone non-increasing in the feature size, so
//! bisection converges on the largest count that still fits the budget. Each
//! probe runs a full decimation on the decoded input; only the winning probe
//! is written back to the caller's buffers.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::driver::{self, EngineOutput, RunStats};
use crate::error::{DecimateError, DecimateResult};
use crate::operation::{decode, engine_config, write_back, Operation};
use crate::types::DecimateFlags;

/// Times the upper bracket may double past the mesh diagonal when even the
/// most aggressive probe misses the budget.
const MAX_BRACKET_GROWTH: u32 = 4;

/// Options and outputs of a budget run.
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "pipeline-config",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct BudgetOptions {
    /// Maximum number of probes.
    pub max_iterations: u32,
    /// Relative slack under the budget that ends the search (default 5%).
    pub tolerance: f64,
    /// Wall-clock limit observed between probes. `None` disables.
    pub time_limit: Option<Duration>,
    /// Output: triangle count of the chosen probe.
    pub final_tri_count: usize,
    /// Output: feature size of the chosen probe.
    pub final_feature_size: f64,
    /// Output: probes actually run.
    pub iteration_count: u32,
    /// Output: whether the budget was met. False means the search returned
    /// the smallest achievable count instead.
    pub budget_met: bool,
}

impl Default for BudgetOptions {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            tolerance: 0.05,
            time_limit: None,
            final_tri_count: 0,
            final_feature_size: 0.0,
            iteration_count: 0,
            budget_met: false,
        }
    }
}

/// Decimate down to at most `max_triangles` triangles.
///
/// Returns the statistics of the chosen probe; the mesh written back is that
/// probe's result. When the budget is unreachable the smallest observed count
/// is returned and `budget.budget_met` stays false.
pub fn decimate_budget(
    op: &mut Operation<'_>,
    max_triangles: usize,
    threadcount: usize,
    flags: DecimateFlags,
    budget: &mut BudgetOptions,
) -> DecimateResult<RunStats> {
    let start = Instant::now();
    let src = decode(op, flags)?;
    budget.iteration_count = 0;
    budget.budget_met = false;

    if src.triangles.len() <= max_triangles {
        budget.final_tri_count = src.triangles.len();
        budget.final_feature_size = 0.0;
        budget.budget_met = true;
        op.decimation_count = 0;
        op.collision_count = 0;
        return Ok(RunStats {
            vertex_count: op.vertex_count,
            tri_count: op.tri_count,
            ..RunStats::default()
        });
    }

    let diagonal = src.bounding_diagonal();
    if diagonal <= 0.0 {
        return Err(DecimateError::InvalidConfiguration {
            details: "mesh bounding box is degenerate, cannot search feature sizes".into(),
        });
    }

    let want_normals = op.normals.is_some();
    let probe = |feature: f64, op: &Operation<'_>| -> DecimateResult<EngineOutput> {
        let mut cfg = engine_config(op, flags);
        cfg.feature_size = feature;
        let s = 0.25 * feature;
        cfg.max_collapse_cost = s * s * s * s * s * s;
        driver::run(
            &src,
            &cfg,
            threadcount,
            op.status.as_ref(),
            op.interval_triangles,
            want_normals,
        )
    };

    let out_of_time = |budget: &BudgetOptions| match budget.time_limit {
        Some(limit) => start.elapsed() >= limit,
        None => false,
    };

    // Best feasible probe: the largest triangle count still under budget.
    // Fallback: the smallest count observed anywhere.
    let mut best_feasible: Option<(f64, EngineOutput)> = None;
    let mut smallest: Option<(f64, EngineOutput)> = None;
    let mut cancelled = false;

    fn consider(
        max_triangles: usize,
        feature: f64,
        output: EngineOutput,
        best_feasible: &mut Option<(f64, EngineOutput)>,
        smallest: &mut Option<(f64, EngineOutput)>,
    ) {
        let count = output.stats.tri_count;
        if smallest
            .as_ref()
            .map_or(true, |(_, o)| count < o.stats.tri_count)
        {
            *smallest = Some((feature, output.clone()));
        }
        if count <= max_triangles
            && best_feasible
                .as_ref()
                .map_or(true, |(_, o)| count > o.stats.tri_count)
        {
            *best_feasible = Some((feature, output));
        }
    }

    // Establish the upper bracket: a feature size whose result fits.
    let mut hi = diagonal;
    let mut growth = 0;
    while budget.iteration_count < budget.max_iterations && !out_of_time(budget) {
        let output = probe(hi, op)?;
        budget.iteration_count += 1;
        cancelled |= output.stats.cancelled;
        let count = output.stats.tri_count;
        debug!(
            target: "mesh_decimate::budget",
            feature = hi,
            triangles = count,
            "bracket probe"
        );
        consider(max_triangles, hi, output, &mut best_feasible, &mut smallest);
        if count <= max_triangles || cancelled || growth >= MAX_BRACKET_GROWTH {
            break;
        }
        growth += 1;
        hi *= 2.0;
    }

    // Bisect between zero (the original mesh) and the feasible bracket.
    if best_feasible.is_some() && !cancelled {
        let mut lo = 0.0f64;
        while budget.iteration_count < budget.max_iterations && !out_of_time(budget) {
            let feasible_count = best_feasible
                .as_ref()
                .map(|(_, o)| o.stats.tri_count)
                .unwrap_or(0);
            if max_triangles.saturating_sub(feasible_count) as f64
                <= budget.tolerance * max_triangles as f64
            {
                break;
            }
            let mid = 0.5 * (lo + hi);
            let output = probe(mid, op)?;
            budget.iteration_count += 1;
            cancelled |= output.stats.cancelled;
            let count = output.stats.tri_count;
            debug!(
                target: "mesh_decimate::budget",
                feature = mid,
                triangles = count,
                "bisection probe"
            );
            if count <= max_triangles {
                hi = mid;
            } else {
                lo = mid;
            }
            consider(max_triangles, mid, output, &mut best_feasible, &mut smallest);
            if cancelled {
                break;
            }
        }
    }

    let (feature, output) = match best_feasible {
        Some(found) => {
            budget.budget_met = true;
            found
        }
        None => match smallest {
            Some(found) => found,
            None => {
                // No probe ran (zero iterations allowed or instant timeout).
                budget.final_tri_count = src.triangles.len();
                budget.final_feature_size = 0.0;
                return Ok(RunStats {
                    vertex_count: op.vertex_count,
                    tri_count: op.tri_count,
                    ..RunStats::default()
                });
            }
        },
    };

    budget.final_tri_count = output.stats.tri_count;
    budget.final_feature_size = feature;
    write_back(op, &output);

    info!(
        target: "mesh_decimate::budget",
        budget = max_triangles,
        final_triangles = budget.final_tri_count,
        feature_size = feature,
        iterations = budget.iteration_count,
        met = budget.budget_met,
        "budget search finished"
    );

    let mut stats = output.stats;
    stats.cancelled |= cancelled;
    Ok(stats)
}
