//! The SpectraForge solver set: concrete transform strategies consumed by
//! the planner, plus the wall-clock cost evaluator.
//!
//! Solvers are deliberately narrow collaborators: each one either builds an
//! executable plan for a problem or declines. The planner owns all search,
//! caching, and persistence policy.

pub mod batch;
pub mod dft;
pub mod measure;
pub mod split;

pub use batch::{BatchLoopSolver, ParallelBatchSolver};
pub use dft::{naive_dft, DirectSolver};
pub use measure::WallClockEvaluator;
pub use split::RadixSolver;

use spectraforge_planner::{PlannerConfig, PlanningContext};

/// Register the standard solver set.
///
/// Registration order within each name is what wisdom portability depends
/// on; append new radices at the end of the `dft-ct` run.
pub fn register_default_solvers(ctx: &mut PlanningContext) {
    ctx.register_solver("dft-batch", BatchLoopSolver);
    ctx.register_solver("dft-batch", ParallelBatchSolver);
    for radix in [2, 4, 8, 3, 5] {
        ctx.register_solver("dft-ct", RadixSolver::new(radix));
    }
    ctx.register_solver("dft-direct", DirectSolver);
}

/// A ready-to-use context: default solvers plus wall-clock measurement.
pub fn default_context(config: PlannerConfig) -> PlanningContext {
    let mut ctx =
        PlanningContext::new(config).with_evaluator(Box::new(WallClockEvaluator::new()));
    register_default_solvers(&mut ctx);
    ctx
}
