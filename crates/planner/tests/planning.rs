//! End-to-end planning behavior with stub solvers.

use anyhow::Result;
use spectraforge_planner::{
    Executor, OpCount, Patience, Plan, PlanOptions, Planner, PlannerConfig, PlanningContext,
    SearchFlags, SignalIo, Slot, Solver, TransformProblem,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct StubExec {
    name: &'static str,
}

impl Executor for StubExec {
    fn apply(&self, _io: SignalIo<'_>) -> Result<()> {
        Ok(())
    }

    fn describe(&self) -> String {
        format!("({})", self.name)
    }
}

/// Always builds a plan with a fixed heuristic cost; optionally only when
/// slow candidates are admissible.
struct FixedSolver {
    name: &'static str,
    cost: f64,
    slow: bool,
    calls: Arc<AtomicUsize>,
}

impl FixedSolver {
    fn new(name: &'static str, cost: f64) -> (FixedSolver, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            FixedSolver {
                name,
                cost,
                slow: false,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }

    fn slow(mut self) -> FixedSolver {
        self.slow = true;
        self
    }
}

impl Solver for FixedSolver {
    fn try_build(&self, _problem: &TransformProblem, planner: &mut Planner<'_>) -> Option<Plan> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.slow && !planner.allow_slow() {
            return None;
        }
        Some(Plan::new(
            OpCount::new(0.0, 0.0, 0.0, self.cost),
            Box::new(StubExec { name: self.name }),
        ))
    }
}

fn two_solver_context() -> (PlanningContext, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let mut ctx = PlanningContext::new(PlannerConfig::default());
    let (a, a_calls) = FixedSolver::new("a", 100.0);
    let (b, b_calls) = FixedSolver::new("b", 50.0);
    ctx.register_solver("a", a);
    ctx.register_solver("b", b);
    (ctx, a_calls, b_calls)
}

#[test]
fn cheapest_candidate_wins() {
    let (mut ctx, _, _) = two_solver_context();
    let problem = TransformProblem::forward_1d(16);
    let plan = ctx
        .plan(&problem, &PlanOptions::new(Patience::Estimate))
        .expect("plan");
    assert_eq!(plan.describe(), "(b)");
    assert_eq!(plan.cost(), 50.0);
}

#[test]
fn second_request_is_a_cache_hit() {
    let (mut ctx, a_calls, b_calls) = two_solver_context();
    let problem = TransformProblem::forward_1d(16);
    let options = PlanOptions::new(Patience::Estimate);

    let first = ctx.plan(&problem, &options).expect("plan");
    let choice = first.describe();
    drop(first);

    let a_before = a_calls.load(Ordering::SeqCst);
    let b_before = b_calls.load(Ordering::SeqCst);
    let second = ctx.plan(&problem, &options).expect("plan");

    assert_eq!(second.describe(), choice, "same solver choice both times");
    assert_eq!(
        a_calls.load(Ordering::SeqCst),
        a_before,
        "no search: the losing solver is never consulted again"
    );
    // The winner is re-invoked only to materialize the plan (once for the
    // request, once for the retention rebuild), never raced against others.
    assert_eq!(b_calls.load(Ordering::SeqCst) - b_before, 2);
}

#[test]
fn stronger_entry_serves_weaker_request() {
    let (mut ctx, a_calls, _) = two_solver_context();
    let problem = TransformProblem::forward_1d(32);

    ctx.plan(&problem, &PlanOptions::new(Patience::Thorough))
        .expect("thorough plan");

    let a_before = a_calls.load(Ordering::SeqCst);
    let plan = ctx
        .plan(&problem, &PlanOptions::new(Patience::Estimate))
        .expect("estimate plan");
    assert_eq!(plan.describe(), "(b)");
    assert_eq!(
        a_calls.load(Ordering::SeqCst),
        a_before,
        "a thorough decision satisfies an estimate request without searching"
    );
}

#[test]
fn ties_break_to_the_first_registered() {
    let mut ctx = PlanningContext::new(PlannerConfig::default());
    let (first, _) = FixedSolver::new("first", 10.0);
    let (second, _) = FixedSolver::new("second", 10.0);
    ctx.register_solver("first", first);
    ctx.register_solver("second", second);

    let plan = ctx
        .plan(
            &TransformProblem::forward_1d(8),
            &PlanOptions::new(Patience::Estimate),
        )
        .expect("plan");
    assert_eq!(plan.describe(), "(first)");
}

#[test]
fn slow_candidates_surface_only_at_exhaustive() {
    let mut ctx = PlanningContext::new(PlannerConfig::default());
    let (turtle, _) = FixedSolver::new("turtle", 1.0);
    let (hare, _) = FixedSolver::new("hare", 100.0);
    ctx.register_solver("turtle", turtle.slow());
    ctx.register_solver("hare", hare);

    let problem = TransformProblem::forward_1d(16);
    let measured = ctx
        .plan(&problem, &PlanOptions::new(Patience::Measure))
        .expect("plan");
    assert_eq!(measured.describe(), "(hare)");
    drop(measured);

    let exhaustive = ctx
        .plan(&problem, &PlanOptions::new(Patience::Exhaustive))
        .expect("plan");
    assert_eq!(
        exhaustive.describe(),
        "(turtle)",
        "the exhaustive pass must dredge up slow candidates"
    );
}

#[test]
fn expired_budget_still_yields_the_estimate_level() {
    let (mut ctx, _, _) = two_solver_context();
    let problem = TransformProblem::forward_1d(16);
    let options = PlanOptions::new(Patience::Exhaustive).with_budget(Duration::ZERO);

    let plan = ctx
        .plan(&problem, &options)
        .expect("the estimate rung is never budget-limited");
    assert_eq!(plan.flags(), Patience::Estimate.search_flags());
}

#[test]
fn unsolvable_problems_cache_their_infeasibility() {
    let mut ctx = PlanningContext::new(PlannerConfig::default());
    // No solvers at all.
    let problem = TransformProblem::forward_1d(16);
    assert!(ctx
        .plan(&problem, &PlanOptions::new(Patience::Measure))
        .is_none());
    assert!(
        ctx.cache()
            .entries()
            .iter()
            .any(|(_, _, slot)| *slot == Slot::Infeasible),
        "a failed search must leave a negative entry"
    );
}

/// Builds plans recursively through the planner, halving the length.
struct HalvingSolver;

struct WrapExec {
    child: Plan,
}

impl Executor for WrapExec {
    fn apply(&self, _io: SignalIo<'_>) -> Result<()> {
        Ok(())
    }

    fn wake(&self) -> Result<()> {
        self.child.wake()
    }

    fn sleep(&self) {
        self.child.sleep()
    }

    fn describe(&self) -> String {
        format!("(halve {})", self.child.describe())
    }
}

impl Solver for HalvingSolver {
    fn try_build(&self, problem: &TransformProblem, planner: &mut Planner<'_>) -> Option<Plan> {
        let n = problem.length()?;
        if n < 2 || n % 2 != 0 {
            return None;
        }
        let child_problem =
            TransformProblem::one_dimensional(problem.kind(), n / 2, problem.placement());
        let child = planner.mkplan(&child_problem).into_plan()?;
        let ops = child.ops().scaled(2.0) + OpCount::new(0.0, 0.0, 0.0, n as f64);
        Some(Plan::new(ops, Box::new(WrapExec { child })))
    }
}

/// Cost grows quadratically, so halving pays off for larger sizes.
struct QuadraticSolver;

impl Solver for QuadraticSolver {
    fn try_build(&self, problem: &TransformProblem, _planner: &mut Planner<'_>) -> Option<Plan> {
        let points = problem.total_points() as f64;
        Some(Plan::new(
            OpCount::new(0.0, 0.0, 0.0, points * points),
            Box::new(StubExec { name: "direct" }),
        ))
    }
}

#[test]
fn recursive_children_are_planned_memoized_and_retained() {
    let mut ctx = PlanningContext::new(PlannerConfig::default());
    ctx.register_solver("direct", QuadraticSolver);
    ctx.register_solver("halve", HalvingSolver);

    let problem = TransformProblem::forward_1d(8);
    let plan = ctx
        .plan(&problem, &PlanOptions::new(Patience::Estimate))
        .expect("plan");

    // 8 -> halve -> 4 -> halve -> 2 -> direct (tie at 2 goes to "direct").
    assert_eq!(plan.describe(), "(halve (halve (direct)))");

    // The retained footprint is exactly the chain that rebuilds the winner:
    // decisions for lengths 8, 4, and 2, each blessed.
    let entries = ctx.cache().entries();
    assert_eq!(entries.len(), 3);
    assert!(entries
        .iter()
        .all(|(_, flags, _)| flags.contains(SearchFlags::BLESSING)));
}
