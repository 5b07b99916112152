//! Fixed-radix Cooley-Tukey decomposition.
//!
//! A radix-r solver splits a length-n transform into r child transforms of
//! length n/r, planned recursively through the planner so every subproblem
//! is fingerprinted and memoized in its own right.

use crate::dft::twiddle_table;
use anyhow::{anyhow, ensure, Result};
use num_complex::Complex64;
use spectraforge_planner::{
    Executor, OpCount, Placement, Plan, Planner, ProblemFlags, SignalIo, Solver, TransformProblem,
};
use std::sync::RwLock;

/// Decimation needs an n-point scratch buffer; under memory conservation,
/// lengths past this fall back to scratch-free strategies.
const CONSERVE_SCRATCH_LIMIT: usize = 4096;

struct CooleyTukeyExec {
    n: usize,
    radix: usize,
    sign: f64,
    child: Plan,
    twiddles: RwLock<Option<Vec<Complex64>>>,
}

impl CooleyTukeyExec {
    fn run(&self, src: &[Complex64], dst: &mut [Complex64]) -> Result<()> {
        let guard = self
            .twiddles
            .read()
            .map_err(|_| anyhow!("twiddle table lock poisoned"))?;
        let tw = guard
            .as_ref()
            .ok_or_else(|| anyhow!("cooley-tukey plan executed while asleep"))?;

        let n = self.n;
        let r = self.radix;
        let m = n / r;

        // Decimate in time: sub-signal j holds x[j], x[j+r], x[j+2r], ...
        let mut sub = vec![Complex64::new(0.0, 0.0); n];
        for j in 0..r {
            for t in 0..m {
                sub[j * m + t] = src[t * r + j];
            }
        }

        for j in 0..r {
            self.child
                .execute(SignalIo::InPlace(&mut sub[j * m..(j + 1) * m]))?;
        }

        // Twiddle each child spectrum, then recombine with an r-point DFT
        // across the children: X[k + m·u] = Σ_j (S_j[k]·w^{jk})·w^{jmu}.
        for j in 0..r {
            for k in 0..m {
                sub[j * m + k] *= tw[j * k % n];
            }
        }
        for k in 0..m {
            for u in 0..r {
                let mut acc = Complex64::new(0.0, 0.0);
                for (j, block) in sub.chunks_exact(m).enumerate() {
                    acc += block[k] * tw[j * m * u % n];
                }
                dst[k + m * u] = acc;
            }
        }
        Ok(())
    }
}

impl Executor for CooleyTukeyExec {
    fn apply(&self, io: SignalIo<'_>) -> Result<()> {
        match io {
            SignalIo::InPlace(buf) => {
                ensure!(buf.len() == self.n, "buffer length mismatch");
                let snapshot = buf.to_vec();
                self.run(&snapshot, buf)
            }
            SignalIo::OutOfPlace { input, output } => {
                ensure!(input.len() == self.n, "input length mismatch");
                ensure!(output.len() == self.n, "output length mismatch");
                self.run(input, output)
            }
        }
    }

    fn wake(&self) -> Result<()> {
        self.child.wake()?;
        let mut guard = self
            .twiddles
            .write()
            .map_err(|_| anyhow!("twiddle table lock poisoned"))?;
        *guard = Some(twiddle_table(self.n, self.sign));
        Ok(())
    }

    fn sleep(&self) {
        self.child.sleep();
        if let Ok(mut guard) = self.twiddles.write() {
            *guard = None;
        }
    }

    fn describe(&self) -> String {
        format!(
            "(dft-ct-{}/{} {})",
            self.radix,
            self.n,
            self.child.describe()
        )
    }
}

/// Cooley-Tukey with a fixed radix. Register one instance per radix under a
/// shared name; the registration sequence id keeps wisdom stable.
pub struct RadixSolver {
    radix: usize,
}

impl RadixSolver {
    pub fn new(radix: usize) -> RadixSolver {
        assert!(radix >= 2);
        RadixSolver { radix }
    }

    pub fn radix(&self) -> usize {
        self.radix
    }
}

impl Solver for RadixSolver {
    fn try_build(&self, problem: &TransformProblem, planner: &mut Planner<'_>) -> Option<Plan> {
        if !problem.kind().is_complex() || !problem.batch().is_scalar() {
            return None;
        }
        let n = problem.length()?;
        let r = self.radix;
        if n % r != 0 || n / r < 2 {
            return None;
        }
        // Shallow searches stick to the power-of-two workhorses.
        if planner.shallow() && !matches!(r, 2 | 4) {
            return None;
        }
        if n > CONSERVE_SCRATCH_LIMIT
            && planner
                .problem_flags()
                .contains(ProblemFlags::CONSERVE_MEMORY)
        {
            return None;
        }

        let child_problem =
            TransformProblem::one_dimensional(problem.kind(), n / r, Placement::InPlace);
        let child = planner.mkplan(&child_problem).into_plan()?;

        let (nf, rf, mf) = (n as f64, r as f64, (n / r) as f64);
        let ops = child.ops().scaled(rf)
            // Twiddles: one complex multiply per point.
            + OpCount::new(2.0 * nf, 4.0 * nf, 0.0, 0.0)
            // Recombination: an r-point DFT per output column.
            + OpCount::new(
                mf * (2.0 * rf * rf + 2.0 * rf * (rf - 1.0)),
                mf * 4.0 * rf * rf,
                0.0,
                // Gather/scatter traffic.
                2.0 * nf,
            );

        Some(Plan::new(
            ops,
            Box::new(CooleyTukeyExec {
                n,
                radix: r,
                sign: problem.kind().sign(),
                child,
                twiddles: RwLock::new(None),
            }),
        ))
    }
}
