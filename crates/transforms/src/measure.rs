//! Wall-clock cost evaluation.
//!
//! Measures a plan by executing it on scratch buffers: best-of-N trials
//! over a doubling iteration count, until one round runs long enough to
//! trust or the overall time cap forces the best value seen so far out as
//! an escape hatch. Termination is guaranteed either way.

use num_complex::Complex64;
use spectraforge_planner::{CostEvaluator, Placement, Plan, SignalIo, TransformProblem};
use std::time::{Duration, Instant};
use tracing::trace;

pub struct WallClockEvaluator {
    /// Total time cap per measurement; hitting it returns the best so far.
    time_limit: Duration,
    /// Trials per iteration count.
    repeats: usize,
    /// A round shorter than this is considered too noisy to trust.
    min_interval: Duration,
}

impl WallClockEvaluator {
    pub fn new() -> WallClockEvaluator {
        WallClockEvaluator {
            time_limit: Duration::from_secs(2),
            repeats: 8,
            min_interval: Duration::from_millis(10),
        }
    }

    pub fn with_time_limit(mut self, limit: Duration) -> WallClockEvaluator {
        self.time_limit = limit;
        self
    }

    pub fn with_repeats(mut self, repeats: usize) -> WallClockEvaluator {
        self.repeats = repeats.max(1);
        self
    }

    fn run(&self, plan: &Plan, problem: &TransformProblem, points: usize) -> Option<f64> {
        let mut input = vec![Complex64::new(0.0, 0.0); points];
        let mut output = match problem.placement() {
            Placement::InPlace => Vec::new(),
            Placement::OutOfPlace => vec![Complex64::new(0.0, 0.0); points],
        };

        let started = Instant::now();
        let mut best = f64::INFINITY;
        let mut iters: usize = 1;

        loop {
            for _ in 0..self.repeats {
                let t0 = Instant::now();
                for _ in 0..iters {
                    let io = match problem.placement() {
                        Placement::InPlace => SignalIo::InPlace(&mut input),
                        Placement::OutOfPlace => SignalIo::OutOfPlace {
                            input: &mut input,
                            output: &mut output,
                        },
                    };
                    if plan.execute(io).is_err() {
                        return None;
                    }
                }
                let per_iter = t0.elapsed().as_secs_f64() / iters as f64;
                if per_iter < best {
                    best = per_iter;
                }
                if started.elapsed() >= self.time_limit {
                    // Escape value: unstable timings must not spin forever.
                    return Some(best);
                }
            }
            if best * iters as f64 >= self.min_interval.as_secs_f64() {
                return Some(best);
            }
            iters *= 2;
        }
    }
}

impl Default for WallClockEvaluator {
    fn default() -> WallClockEvaluator {
        WallClockEvaluator::new()
    }
}

impl CostEvaluator for WallClockEvaluator {
    fn measure(&mut self, plan: &Plan, problem: &TransformProblem) -> Option<f64> {
        let points = problem.total_points();
        if points == 0 {
            return None;
        }
        if plan.wake().is_err() {
            return None;
        }
        let result = self.run(plan, problem, points);
        plan.sleep();
        if let Some(t) = result {
            trace!(seconds = t, plan = %plan.describe(), "measured");
        }
        result
    }
}
