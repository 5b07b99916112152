//! Direct DFT solver: the always-applicable quadratic fallback.

use anyhow::{anyhow, ensure, Result};
use num_complex::Complex64;
use spectraforge_planner::{
    Executor, OpCount, Plan, Planner, SignalIo, Solver, TransformProblem,
};
use std::f64::consts::TAU;
use std::sync::RwLock;

/// Lengths above this are considered slow for the direct algorithm, but
/// only when a radix decomposition exists; for lengths with no small
/// factor, direct is the legitimate fallback at any size.
const SLOW_THRESHOLD: usize = 64;

fn has_small_factor(n: usize) -> bool {
    [2, 3, 5].iter().any(|p| n % p == 0)
}

pub(crate) fn twiddle_table(n: usize, sign: f64) -> Vec<Complex64> {
    (0..n)
        .map(|k| Complex64::from_polar(1.0, sign * TAU * k as f64 / n as f64))
        .collect()
}

/// Reference O(n²) DFT, shared by tests and benchmarks.
pub fn naive_dft(input: &[Complex64], sign: f64) -> Vec<Complex64> {
    let n = input.len();
    let tw = twiddle_table(n, sign);
    (0..n)
        .map(|k| {
            let mut acc = Complex64::new(0.0, 0.0);
            for (j, &x) in input.iter().enumerate() {
                acc += x * tw[j * k % n];
            }
            acc
        })
        .collect()
}

struct DirectExec {
    n: usize,
    sign: f64,
    twiddles: RwLock<Option<Vec<Complex64>>>,
}

impl DirectExec {
    fn compute(&self, input: &[Complex64], output: &mut [Complex64]) -> Result<()> {
        let guard = self
            .twiddles
            .read()
            .map_err(|_| anyhow!("twiddle table lock poisoned"))?;
        let tw = guard
            .as_ref()
            .ok_or_else(|| anyhow!("direct plan executed while asleep"))?;
        let n = self.n;
        for (k, out) in output.iter_mut().enumerate() {
            let mut acc = Complex64::new(0.0, 0.0);
            for (j, &x) in input.iter().enumerate() {
                acc += x * tw[j * k % n];
            }
            *out = acc;
        }
        Ok(())
    }
}

impl Executor for DirectExec {
    fn apply(&self, io: SignalIo<'_>) -> Result<()> {
        match io {
            SignalIo::InPlace(buf) => {
                ensure!(buf.len() == self.n, "buffer length mismatch");
                let snapshot = buf.to_vec();
                self.compute(&snapshot, buf)
            }
            SignalIo::OutOfPlace { input, output } => {
                ensure!(input.len() == self.n, "input length mismatch");
                ensure!(output.len() == self.n, "output length mismatch");
                self.compute(input, output)
            }
        }
    }

    fn wake(&self) -> Result<()> {
        let mut guard = self
            .twiddles
            .write()
            .map_err(|_| anyhow!("twiddle table lock poisoned"))?;
        *guard = Some(twiddle_table(self.n, self.sign));
        Ok(())
    }

    fn sleep(&self) {
        if let Ok(mut guard) = self.twiddles.write() {
            *guard = None;
        }
    }

    fn describe(&self) -> String {
        format!("(dft-direct-{})", self.n)
    }
}

/// Builds a direct plan for any one-dimensional complex transform.
pub struct DirectSolver;

impl Solver for DirectSolver {
    fn try_build(&self, problem: &TransformProblem, planner: &mut Planner<'_>) -> Option<Plan> {
        if !problem.kind().is_complex() || !problem.batch().is_scalar() {
            return None;
        }
        let n = problem.length()?;
        if n > SLOW_THRESHOLD && has_small_factor(n) && !planner.allow_slow() {
            return None;
        }

        let nf = n as f64;
        // One complex multiply-accumulate per (j, k) pair.
        let ops = OpCount::new(2.0 * nf * nf + 2.0 * nf * (nf - 1.0), 4.0 * nf * nf, 0.0, 0.0);
        Some(Plan::new(
            ops,
            Box::new(DirectExec {
                n,
                sign: problem.kind().sign(),
                twiddles: RwLock::new(None),
            }),
        ))
    }
}
