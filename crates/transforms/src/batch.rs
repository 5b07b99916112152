//! Batch-loop solvers: peel one batch dimension into a loop over a child
//! plan, serially or partitioned across the rayon pool.

use anyhow::{ensure, Result};
use rayon::prelude::*;
use spectraforge_planner::{
    Executor, OpCount, Plan, Planner, Shape, SignalIo, Solver, TransformProblem,
};

/// The outermost batch dimension, provided the layout is dense enough to
/// walk with contiguous chunks.
fn peel(problem: &TransformProblem) -> Option<(usize, usize, TransformProblem)> {
    let dims = problem.batch().dims();
    let (outer, rest) = dims.split_first()?;

    let child = TransformProblem::new(
        problem.kind(),
        problem.shape().clone(),
        Shape::new(rest.to_vec()),
        problem.placement(),
    );
    let chunk = child.total_points();
    if outer.input_stride != chunk as isize || outer.output_stride != chunk as isize {
        return None;
    }
    Some((outer.n, chunk, child))
}

struct BatchExec {
    count: usize,
    chunk: usize,
    parallel: bool,
    child: Plan,
}

impl BatchExec {
    fn expected_len(&self) -> usize {
        self.count * self.chunk
    }
}

impl Executor for BatchExec {
    fn apply(&self, io: SignalIo<'_>) -> Result<()> {
        match io {
            SignalIo::InPlace(buf) => {
                ensure!(buf.len() == self.expected_len(), "buffer length mismatch");
                if self.parallel {
                    buf.par_chunks_mut(self.chunk)
                        .try_for_each(|c| self.child.execute(SignalIo::InPlace(c)))
                } else {
                    buf.chunks_mut(self.chunk)
                        .try_for_each(|c| self.child.execute(SignalIo::InPlace(c)))
                }
            }
            SignalIo::OutOfPlace { input, output } => {
                ensure!(input.len() == self.expected_len(), "input length mismatch");
                ensure!(
                    output.len() == self.expected_len(),
                    "output length mismatch"
                );
                if self.parallel {
                    input
                        .par_chunks_mut(self.chunk)
                        .zip(output.par_chunks_mut(self.chunk))
                        .try_for_each(|(i, o)| {
                            self.child
                                .execute(SignalIo::OutOfPlace { input: i, output: o })
                        })
                } else {
                    input
                        .chunks_mut(self.chunk)
                        .zip(output.chunks_mut(self.chunk))
                        .try_for_each(|(i, o)| {
                            self.child
                                .execute(SignalIo::OutOfPlace { input: i, output: o })
                        })
                }
            }
        }
    }

    fn wake(&self) -> Result<()> {
        self.child.wake()
    }

    fn sleep(&self) {
        self.child.sleep()
    }

    fn describe(&self) -> String {
        let tag = if self.parallel { "par" } else { "loop" };
        format!("(batch-{}-{} {})", tag, self.count, self.child.describe())
    }
}

/// Serial loop over the outermost batch dimension.
pub struct BatchLoopSolver;

impl Solver for BatchLoopSolver {
    fn try_build(&self, problem: &TransformProblem, planner: &mut Planner<'_>) -> Option<Plan> {
        let (count, chunk, child_problem) = peel(problem)?;
        let child = planner.mkplan(&child_problem).into_plan()?;
        let ops = child.ops().scaled(count as f64);
        Some(Plan::new(
            ops,
            Box::new(BatchExec {
                count,
                chunk,
                parallel: false,
                child,
            }),
        ))
    }
}

/// Rayon-partitioned loop over the outermost batch dimension. Only offered
/// when the planner's thread degree allows it; that degree is part of the
/// problem fingerprint, so serial and parallel decisions never collide.
pub struct ParallelBatchSolver;

impl Solver for ParallelBatchSolver {
    fn try_build(&self, problem: &TransformProblem, planner: &mut Planner<'_>) -> Option<Plan> {
        if planner.threads() < 2 {
            return None;
        }
        let (count, chunk, child_problem) = peel(problem)?;
        if count < 2 {
            return None;
        }
        let child = planner.mkplan(&child_problem).into_plan()?;
        // Heuristically dearer than the serial loop (fork/join overhead);
        // measurement settles which one actually wins.
        let ops = child.ops().scaled(count as f64) + OpCount::new(0.0, 0.0, 0.0, 64.0 * count as f64);
        Some(Plan::new(
            ops,
            Box::new(BatchExec {
                count,
                chunk,
                parallel: true,
                child,
            }),
        ))
    }
}
