//! The planning state machine: lookup, search, evaluate, insert.

use crate::cache::{Slot, SolutionCache};
use crate::fingerprint::{Fingerprinter, Signature};
use crate::flags::{ProblemFlags, SearchFlags};
use crate::plan::Plan;
use crate::problem::{Precision, TransformProblem};
use crate::registry::SolverRegistry;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, trace};

/// Result of one planning request.
#[derive(Debug)]
pub enum PlanOutcome {
    Planned(Plan),
    /// No registered solver could build a plan under the active flags.
    NoPlan,
    /// The wall-clock budget ran out mid-search; partial results are
    /// discarded and nothing is recorded.
    TimedOut,
    /// A trusted cache entry failed to reproduce a plan. The driver reacts
    /// by escalating the recovery ladder; callers never see this.
    BogusWisdom,
}

impl PlanOutcome {
    pub fn into_plan(self) -> Option<Plan> {
        match self {
            PlanOutcome::Planned(pln) => Some(pln),
            _ => None,
        }
    }

    pub fn is_planned(&self) -> bool {
        matches!(self, PlanOutcome::Planned(_))
    }
}

/// How much stored wisdom the current attempt trusts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WisdomMode {
    /// Trust wisdom as stored.
    Normal,
    /// Treat cached infeasible records as absent; protects against stale
    /// negative entries from an inconsistent earlier session.
    IgnoreInfeasible,
    /// Plan from scratch as if the cache were empty.
    IgnoreAll,
}

/// Feasibility-relevant planner state; every field participates in the
/// fingerprint, so plans tuned under one configuration never serve another.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlannerConfig {
    pub precision: Precision,
    pub problem_flags: ProblemFlags,
    /// Degree of parallelism solvers may assume.
    pub threads: usize,
    /// Recursion guard for solvers that plan child problems.
    pub max_depth: usize,
}

impl Default for PlannerConfig {
    fn default() -> PlannerConfig {
        PlannerConfig {
            precision: Precision::default(),
            problem_flags: ProblemFlags::empty(),
            threads: 1,
            max_depth: 32,
        }
    }
}

/// External cost evaluation.
///
/// `measure` returns the best-of-trials wall time for executing `plan` on
/// scratch data, or `None` when measurement is unavailable; the planner
/// then falls back to the heuristic operation count.
pub trait CostEvaluator {
    fn measure(&mut self, plan: &Plan, problem: &TransformProblem) -> Option<f64>;
}

/// Evaluator that never measures; every candidate is costed heuristically.
pub struct OpCountEvaluator;

impl CostEvaluator for OpCountEvaluator {
    fn measure(&mut self, _plan: &Plan, _problem: &TransformProblem) -> Option<f64> {
        None
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlannerStats {
    pub searches: u64,
    pub solver_invocations: u64,
    pub evaluations: u64,
    pub measurements: u64,
    pub bogus_wisdom: u64,
}

enum SearchResult {
    Found(Plan, u32),
    Nothing,
    TimedOut,
}

/// One planning request in flight.
///
/// Holds mutable views of the context's cache and registry plus the
/// request-scoped search state (flags, wisdom mode, deadline, recursion
/// depth). Solvers receive `&mut Planner` so they can consult flags and
/// plan child problems through the same memoized machinery.
pub struct Planner<'a> {
    registry: &'a SolverRegistry,
    cache: &'a mut SolutionCache,
    evaluator: &'a mut dyn CostEvaluator,
    config: &'a PlannerConfig,
    stats: &'a mut PlannerStats,
    flags: SearchFlags,
    wisdom: WisdomMode,
    deadline: Option<Instant>,
    timed_out: bool,
    depth: usize,
}

impl<'a> Planner<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        registry: &'a SolverRegistry,
        cache: &'a mut SolutionCache,
        evaluator: &'a mut dyn CostEvaluator,
        config: &'a PlannerConfig,
        stats: &'a mut PlannerStats,
        flags: SearchFlags,
        wisdom: WisdomMode,
        deadline: Option<Instant>,
    ) -> Planner<'a> {
        Planner {
            registry,
            cache,
            evaluator,
            config,
            stats,
            flags,
            wisdom,
            deadline,
            timed_out: false,
            depth: 0,
        }
    }

    pub fn config(&self) -> &PlannerConfig {
        self.config
    }

    pub fn flags(&self) -> SearchFlags {
        self.flags
    }

    pub fn threads(&self) -> usize {
        self.config.threads
    }

    pub fn problem_flags(&self) -> ProblemFlags {
        self.config.problem_flags
    }

    /// Known-suboptimal candidates are admissible right now.
    pub fn allow_slow(&self) -> bool {
        !self.flags.contains(SearchFlags::NO_SLOW)
    }

    /// The search should stay shallow (fewer decomposition choices).
    pub fn shallow(&self) -> bool {
        self.flags.contains(SearchFlags::NO_DEEP)
    }

    pub fn exhaustive(&self) -> bool {
        !self.flags.contains(SearchFlags::NO_EXHAUSTIVE)
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Plan one problem. Solvers call this recursively for child problems;
    /// every level of the recursion is fingerprinted and memoized.
    pub fn mkplan(&mut self, problem: &TransformProblem) -> PlanOutcome {
        if self.depth > self.config.max_depth {
            return PlanOutcome::NoPlan;
        }

        // Canonical form: an exhaustive search admits slow candidates.
        if !self.flags.contains(SearchFlags::NO_EXHAUSTIVE) {
            self.flags = self.flags.remove(SearchFlags::NO_SLOW);
        }
        let flags = self.flags;
        let sig = self.fingerprint(problem);

        let mut advisory: Option<u32> = None;
        let mut winner: Option<(Plan, u32)> = None;

        // LOOKUP
        if self.wisdom != WisdomMode::IgnoreAll {
            if let Some(entry) = self.cache.lookup(&sig, flags) {
                if entry.flags.subsumes(flags) {
                    match entry.slot {
                        Slot::Infeasible => {
                            if self.wisdom != WisdomMode::IgnoreInfeasible {
                                trace!(sig = ?sig, "cached infeasible, short-circuiting");
                                return PlanOutcome::NoPlan;
                            }
                        }
                        Slot::Solver(ndx) => {
                            let nflags = SearchFlags::NO_SEARCH
                                | entry.flags.impatience()
                                | flags.modifiers();
                            match self.invoke_solver(ndx, problem, nflags) {
                                Some(pln) => winner = Some((pln, ndx)),
                                None => {
                                    self.stats.bogus_wisdom += 1;
                                    debug!(
                                        sig = ?sig,
                                        solver = ndx,
                                        "trusted wisdom failed to rebuild"
                                    );
                                    return PlanOutcome::BogusWisdom;
                                }
                            }
                        }
                    }
                } else if let Slot::Solver(ndx) = entry.slot {
                    // Less thorough than requested: distrusted, but worth
                    // trying first.
                    advisory = Some(ndx);
                }
            }
        }

        // SEARCH + EVALUATE
        if winner.is_none() {
            if flags.contains(SearchFlags::NO_SEARCH) {
                return PlanOutcome::NoPlan;
            }
            match self.search(problem, advisory) {
                SearchResult::Found(pln, ndx) => winner = Some((pln, ndx)),
                SearchResult::Nothing => {}
                SearchResult::TimedOut => return PlanOutcome::TimedOut,
            }
        }

        // INSERT
        match winner {
            Some((pln, ndx)) => {
                // A feasible result makes the slow-candidate restriction
                // moot; record it at the stronger level so weaker requests
                // are served too.
                let stored = flags.remove(SearchFlags::NO_SLOW).remove(SearchFlags::NO_SEARCH);
                self.cache.insert(sig, stored, Slot::Solver(ndx));
                trace!(sig = ?sig, solver = ndx, cost = pln.cost(), "planned");
                PlanOutcome::Planned(pln)
            }
            None => {
                self.cache.insert(sig, flags, Slot::Infeasible);
                PlanOutcome::NoPlan
            }
        }
    }

    fn search(&mut self, problem: &TransformProblem, advisory: Option<u32>) -> SearchResult {
        self.stats.searches += 1;

        let mut best: Option<(Plan, u32)> = None;
        let mut best_evaluated = false;

        // A distrusted weaker hit seeds the search order: its solver goes
        // first and becomes the incumbent, but the search still runs.
        if let Some(ndx) = advisory {
            if self.out_of_time() {
                return SearchResult::TimedOut;
            }
            if let Some(pln) = self.invoke_solver(ndx, problem, self.flags) {
                best = Some((pln, ndx));
            }
        }

        let mut ran_quick_pass = false;
        for pass in 0..2 {
            let mut nflags = self.flags;
            match pass {
                0 => {
                    // The quick pass is pointless when everything is
                    // admissible anyway.
                    if self.exhaustive() {
                        continue;
                    }
                    nflags |= SearchFlags::NO_SLOW;
                    ran_quick_pass = true;
                }
                _ => {
                    // Slow candidates are a last resort: dredge them only
                    // when they are admissible and the quick pass (if any)
                    // came up empty.
                    if self.flags.contains(SearchFlags::NO_SLOW) {
                        continue;
                    }
                    if ran_quick_pass && best.is_some() {
                        continue;
                    }
                }
            }

            for ndx in 0..self.registry.len() as u32 {
                if advisory == Some(ndx) {
                    continue;
                }
                if self.out_of_time() {
                    return SearchResult::TimedOut;
                }
                let Some(mut pln) = self.invoke_solver(ndx, problem, nflags) else {
                    continue;
                };
                if let Some((incumbent, _)) = best.as_mut() {
                    if !best_evaluated {
                        // Deferred so a lone candidate is never measured.
                        self.evaluate(incumbent, problem);
                        best_evaluated = true;
                    }
                    self.evaluate(&mut pln, problem);
                    // Strict comparison: ties go to the first-registered.
                    if pln.cost() < incumbent.cost() {
                        best = Some((pln, ndx));
                    }
                } else {
                    best = Some((pln, ndx));
                }
            }
        }

        match best {
            Some((pln, ndx)) => SearchResult::Found(pln, ndx),
            None => SearchResult::Nothing,
        }
    }

    fn evaluate(&mut self, pln: &mut Plan, problem: &TransformProblem) {
        if pln.pcost().is_some() {
            return;
        }
        self.stats.evaluations += 1;
        let cost = if self.flags.contains(SearchFlags::ESTIMATE) {
            pln.ops().heuristic()
        } else {
            match self.evaluator.measure(pln, problem) {
                Some(t) => {
                    self.stats.measurements += 1;
                    t
                }
                None => pln.ops().heuristic(),
            }
        };
        pln.set_pcost(cost);
    }

    fn invoke_solver(
        &mut self,
        ndx: u32,
        problem: &TransformProblem,
        nflags: SearchFlags,
    ) -> Option<Plan> {
        let solver = self.registry.desc(ndx as usize)?.solver().clone();
        self.stats.solver_invocations += 1;

        // Flags are dynamically scoped across the solver invocation; the
        // solver and any child planning it does see `nflags`.
        let saved = self.flags;
        self.flags = nflags;
        self.depth += 1;
        let pln = solver.try_build(problem, self);
        self.depth -= 1;
        self.flags = saved;
        pln
    }

    fn fingerprint(&self, problem: &TransformProblem) -> Signature {
        let mut fp = Fingerprinter::new();
        fp.add_tag("spectraforge-plan");
        fp.add_u32(self.config.precision.tag());
        fp.add_u32(self.config.problem_flags.bits());
        fp.add_usize(self.config.threads);
        problem.hash_signature(&mut fp);
        fp.finish()
    }

    fn out_of_time(&mut self) -> bool {
        if self.timed_out {
            return true;
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                self.timed_out = true;
            }
        }
        self.timed_out
    }
}
