//! Plans: executable strategies with costs and a wake/sleep lifecycle.

use anyhow::{ensure, Result};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Floating-point operation counts, aggregated bottom-up over a plan tree.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OpCount {
    pub adds: f64,
    pub muls: f64,
    pub fmas: f64,
    pub other: f64,
}

impl OpCount {
    pub fn new(adds: f64, muls: f64, fmas: f64, other: f64) -> OpCount {
        OpCount {
            adds,
            muls,
            fmas,
            other,
        }
    }

    pub fn zero() -> OpCount {
        OpCount::default()
    }

    /// Heuristic cost: an fma counts double, everything else counts once.
    pub fn heuristic(&self) -> f64 {
        self.adds + self.muls + 2.0 * self.fmas + self.other
    }

    pub fn scaled(&self, k: f64) -> OpCount {
        OpCount {
            adds: self.adds * k,
            muls: self.muls * k,
            fmas: self.fmas * k,
            other: self.other * k,
        }
    }
}

impl Add for OpCount {
    type Output = OpCount;

    fn add(self, rhs: OpCount) -> OpCount {
        OpCount {
            adds: self.adds + rhs.adds,
            muls: self.muls + rhs.muls,
            fmas: self.fmas + rhs.fmas,
            other: self.other + rhs.other,
        }
    }
}

impl AddAssign for OpCount {
    fn add_assign(&mut self, rhs: OpCount) {
        *self = *self + rhs;
    }
}

/// Buffers handed to a plan at execution time.
///
/// Out-of-place input is mutable: problems planned with destructive-input
/// semantics let solvers use it as scratch.
pub enum SignalIo<'a> {
    InPlace(&'a mut [Complex64]),
    OutOfPlace {
        input: &'a mut [Complex64],
        output: &'a mut [Complex64],
    },
}

/// The executable half of a plan.
///
/// Implementations own their child plans and forward `wake`/`sleep` to
/// them; resources such as twiddle tables are acquired in `wake` and
/// released in `sleep`.
pub trait Executor: Send + Sync {
    fn apply(&self, io: SignalIo<'_>) -> Result<()>;

    fn wake(&self) -> Result<()> {
        Ok(())
    }

    fn sleep(&self) {}

    /// Nested s-expression naming this node and its children.
    fn describe(&self) -> String;
}

/// An executable strategy for one problem.
///
/// Plans are single-owner values; dropping one releases any resources it
/// still holds. The awake use-count makes nested wake/sleep cycles safe:
/// resources are acquired on the 0→1 transition and released on 1→0.
pub struct Plan {
    ops: OpCount,
    pcost: Option<f64>,
    awake: AtomicUsize,
    exec: Box<dyn Executor>,
}

impl Plan {
    pub fn new(ops: OpCount, exec: Box<dyn Executor>) -> Plan {
        Plan {
            ops,
            pcost: None,
            awake: AtomicUsize::new(0),
            exec,
        }
    }

    pub fn ops(&self) -> &OpCount {
        &self.ops
    }

    /// Measured cost, if the plan has been evaluated.
    pub fn pcost(&self) -> Option<f64> {
        self.pcost
    }

    pub fn set_pcost(&mut self, cost: f64) {
        self.pcost = Some(cost);
    }

    /// Measured cost when available, heuristic cost otherwise.
    pub fn cost(&self) -> f64 {
        self.pcost.unwrap_or_else(|| self.ops.heuristic())
    }

    pub fn is_awake(&self) -> bool {
        self.awake.load(Ordering::Relaxed) > 0
    }

    pub fn wake(&self) -> Result<()> {
        if self.awake.fetch_add(1, Ordering::Relaxed) == 0 {
            if let Err(e) = self.exec.wake() {
                self.awake.fetch_sub(1, Ordering::Relaxed);
                return Err(e);
            }
        }
        Ok(())
    }

    pub fn sleep(&self) {
        let prev = self.awake.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(prev > 0, "sleep without matching wake");
        if prev == 1 {
            self.exec.sleep();
        }
    }

    pub fn execute(&self, io: SignalIo<'_>) -> Result<()> {
        ensure!(self.is_awake(), "plan executed while asleep");
        self.exec.apply(io)
    }

    pub fn describe(&self) -> String {
        self.exec.describe()
    }
}

impl Drop for Plan {
    fn drop(&mut self) {
        if self.is_awake() {
            self.exec.sleep();
        }
    }
}

impl fmt::Debug for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Plan({}, cost {:.3})", self.exec.describe(), self.cost())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as Counter;
    use std::sync::Arc;

    struct ProbeExec {
        wakes: Arc<Counter>,
        sleeps: Arc<Counter>,
    }

    impl Executor for ProbeExec {
        fn apply(&self, _io: SignalIo<'_>) -> Result<()> {
            Ok(())
        }

        fn wake(&self) -> Result<()> {
            self.wakes.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        fn sleep(&self) {
            self.sleeps.fetch_add(1, Ordering::Relaxed);
        }

        fn describe(&self) -> String {
            "(probe)".into()
        }
    }

    fn probe_plan() -> (Plan, Arc<Counter>, Arc<Counter>) {
        let wakes = Arc::new(Counter::new(0));
        let sleeps = Arc::new(Counter::new(0));
        let plan = Plan::new(
            OpCount::zero(),
            Box::new(ProbeExec {
                wakes: wakes.clone(),
                sleeps: sleeps.clone(),
            }),
        );
        (plan, wakes, sleeps)
    }

    #[test]
    fn nested_wakes_acquire_once() {
        let (plan, wakes, sleeps) = probe_plan();
        plan.wake().unwrap();
        plan.wake().unwrap();
        plan.sleep();
        assert_eq!(wakes.load(Ordering::Relaxed), 1);
        assert_eq!(sleeps.load(Ordering::Relaxed), 0);
        plan.sleep();
        assert_eq!(sleeps.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn drop_releases_leaked_wake() {
        let (plan, _wakes, sleeps) = probe_plan();
        plan.wake().unwrap();
        drop(plan);
        assert_eq!(sleeps.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn execute_requires_awake() {
        let (plan, _, _) = probe_plan();
        let mut buf = vec![Complex64::default(); 4];
        assert!(plan.execute(SignalIo::InPlace(&mut buf)).is_err());
        plan.wake().unwrap();
        assert!(plan.execute(SignalIo::InPlace(&mut buf)).is_ok());
        plan.sleep();
    }

    #[test]
    fn heuristic_cost_weights_fmas_double() {
        let ops = OpCount::new(10.0, 20.0, 5.0, 1.0);
        assert_eq!(ops.heuristic(), 41.0);
        let mut plan = Plan::new(
            ops,
            Box::new(ProbeExec {
                wakes: Arc::new(Counter::new(0)),
                sleeps: Arc::new(Counter::new(0)),
            }),
        );
        assert_eq!(plan.cost(), 41.0);
        plan.set_pcost(7.5);
        assert_eq!(plan.cost(), 7.5);
    }
}
