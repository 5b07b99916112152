//! The planning context: incremental-patience driver and wisdom recovery.

use crate::cache::SolutionCache;
use crate::flags::{Amnesia, Patience, SearchFlags};
use crate::plan::{OpCount, Plan, SignalIo};
use crate::planner::{
    CostEvaluator, OpCountEvaluator, PlanOutcome, Planner, PlannerConfig, PlannerStats, WisdomMode,
};
use crate::problem::TransformProblem;
use crate::registry::{Solver, SolverRegistry};
use crate::wisdom;
use anyhow::Result;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Per-request knobs for [`PlanningContext::plan`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanOptions {
    /// Highest patience level the ladder may reach.
    pub patience: Patience,
    /// Optional wall-clock budget. Absent means no budget: plan directly at
    /// the requested patience.
    pub budget: Option<Duration>,
}

impl PlanOptions {
    pub fn new(patience: Patience) -> PlanOptions {
        PlanOptions {
            patience,
            budget: None,
        }
    }

    pub fn with_budget(mut self, budget: Duration) -> PlanOptions {
        self.budget = Some(budget);
        self
    }
}

/// The plan a caller receives: awake for its whole lifetime, asleep again
/// when dropped.
pub struct TransformPlan {
    plan: Plan,
    problem: TransformProblem,
    flags: SearchFlags,
}

impl TransformPlan {
    fn new(plan: Plan, problem: TransformProblem, flags: SearchFlags) -> Result<TransformPlan> {
        plan.wake()?;
        Ok(TransformPlan {
            plan,
            problem,
            flags,
        })
    }

    pub fn execute(&self, io: SignalIo<'_>) -> Result<()> {
        self.plan.execute(io)
    }

    pub fn problem(&self) -> &TransformProblem {
        &self.problem
    }

    /// Cost recorded while planning (measured when the winning level
    /// measured, heuristic otherwise).
    pub fn cost(&self) -> f64 {
        self.plan.cost()
    }

    pub fn ops(&self) -> &OpCount {
        self.plan.ops()
    }

    /// Flags of the ladder level that produced this plan.
    pub fn flags(&self) -> SearchFlags {
        self.flags
    }

    pub fn describe(&self) -> String {
        self.plan.describe()
    }
}

impl Drop for TransformPlan {
    fn drop(&mut self) {
        self.plan.sleep();
    }
}

/// Process-wide planning state: the solver registry, the memoization cache,
/// and the feasibility configuration.
///
/// Construct one per embedding application and pass it `&mut` to every
/// planning call; concurrent use requires external locking. The registry
/// must keep its registration order within each name stable for wisdom to
/// stay portable.
pub struct PlanningContext {
    registry: SolverRegistry,
    cache: SolutionCache,
    config: PlannerConfig,
    evaluator: Box<dyn CostEvaluator>,
    stats: PlannerStats,
}

impl PlanningContext {
    /// An empty context costing candidates heuristically; install a real
    /// measurer with [`with_evaluator`](Self::with_evaluator).
    pub fn new(config: PlannerConfig) -> PlanningContext {
        PlanningContext {
            registry: SolverRegistry::new(),
            cache: SolutionCache::new(),
            config,
            evaluator: Box::new(OpCountEvaluator),
            stats: PlannerStats::default(),
        }
    }

    pub fn with_evaluator(mut self, evaluator: Box<dyn CostEvaluator>) -> PlanningContext {
        self.evaluator = evaluator;
        self
    }

    pub fn register_solver<S>(&mut self, name: &'static str, solver: S) -> usize
    where
        S: Solver + 'static,
    {
        self.registry.register(name, solver)
    }

    pub fn registry(&self) -> &SolverRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SolverRegistry {
        &mut self.registry
    }

    pub fn cache(&self) -> &SolutionCache {
        &self.cache
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut PlannerConfig {
        &mut self.config
    }

    pub fn stats(&self) -> PlannerStats {
        self.stats
    }

    /// Drop cached decisions; `Amnesia::NonRetained` keeps blessed entries.
    pub fn forget(&mut self, amnesia: Amnesia) {
        self.cache.forget(amnesia);
    }

    /// Serialize every retained cache entry.
    pub fn export_wisdom(&mut self) -> String {
        wisdom::export(&mut self.cache, &self.registry)
    }

    /// Parse `text` and merge its records; returns the number accepted.
    /// On a syntax error the cache is left exactly as it was.
    pub fn import_wisdom(&mut self, text: &str) -> Result<usize> {
        wisdom::import(&mut self.cache, &self.registry, text)
    }

    pub fn export_wisdom_to_file(&mut self, path: &Path) -> Result<()> {
        wisdom::export_to_file(&mut self.cache, &self.registry, path)
    }

    pub fn import_wisdom_from_file(&mut self, path: &Path) -> Result<usize> {
        wisdom::import_from_file(&mut self.cache, &self.registry, path)
    }

    /// Plan `problem`, escalating patience under the optional budget.
    ///
    /// With a budget the ladder starts at `Estimate` (which is never
    /// budget-limited: it is the fallback of last resort) and climbs until
    /// the ceiling, a failure, or the deadline. The winning level is then
    /// re-planned with the retention marker set; the rebuild, not the
    /// original, is returned, so it reflects everything the ladder
    /// learned. Finally the cache is pruned down to retained entries.
    pub fn plan(
        &mut self,
        problem: &TransformProblem,
        options: &PlanOptions,
    ) -> Option<TransformPlan> {
        let deadline = options.budget.map(|b| Instant::now() + b);
        let mut kept: Option<(Plan, SearchFlags)> = None;

        if deadline.is_some() {
            for level in Patience::LADDER {
                if level > options.patience {
                    break;
                }
                let flags = level.search_flags();
                let level_deadline = if level == Patience::Estimate {
                    None
                } else {
                    deadline
                };
                match self.plan_recovering(problem, flags, level_deadline) {
                    PlanOutcome::Planned(pln) => {
                        debug!(?level, cost = pln.cost(), "ladder level planned");
                        kept = Some((pln, flags));
                    }
                    PlanOutcome::TimedOut => {
                        debug!(?level, "budget exhausted, keeping previous level");
                        break;
                    }
                    PlanOutcome::NoPlan => break,
                    PlanOutcome::BogusWisdom => {
                        warn!("recovery ladder leaked a bogus-wisdom result");
                        break;
                    }
                }
            }
        } else {
            let flags = options.patience.search_flags();
            if let PlanOutcome::Planned(pln) = self.plan_recovering(problem, flags, None) {
                kept = Some((pln, flags));
            }
        }

        let (pln, winning_flags) = kept?;
        let pcost = pln.cost();
        drop(pln);

        // Rebuild from wisdom with the retention marker set; the timed
        // search may have deposited better wisdom than the plan it
        // returned was built from.
        let rebuilt = self
            .plan_recovering(problem, winning_flags | SearchFlags::BLESSING, None)
            .into_plan();

        // Bound the persisted footprint to what reconstructs this plan.
        self.cache.forget(Amnesia::NonRetained);

        match rebuilt {
            Some(mut pln) => {
                pln.set_pcost(pcost);
                match TransformPlan::new(pln, problem.clone(), winning_flags) {
                    Ok(plan) => Some(plan),
                    Err(e) => {
                        warn!(error = %e, "winning plan failed to wake");
                        None
                    }
                }
            }
            None => {
                warn!("re-planning at the winning flags failed");
                None
            }
        }
    }

    /// One planning attempt wrapped in the wisdom-corruption recovery
    /// ladder. Corrupt or foreign wisdom can cost performance here, never
    /// a planning failure: the last rung searches from scratch.
    fn plan_recovering(
        &mut self,
        problem: &TransformProblem,
        flags: SearchFlags,
        deadline: Option<Instant>,
    ) -> PlanOutcome {
        let mut out = self.attempt(problem, flags, WisdomMode::Normal, deadline);

        if matches!(out, PlanOutcome::NoPlan) {
            // A stale negative entry may be lying; retry once without them.
            out = self.attempt(problem, flags, WisdomMode::IgnoreInfeasible, deadline);
        }
        if matches!(out, PlanOutcome::BogusWisdom) {
            warn!("bogus wisdom detected; forgetting the cache and retrying");
            self.cache.forget(Amnesia::Everything);
            out = self.attempt(problem, flags, WisdomMode::Normal, deadline);
        }
        if matches!(out, PlanOutcome::BogusWisdom) {
            warn!("wisdom still inconsistent; planning with wisdom disabled");
            self.cache.forget(Amnesia::Everything);
            out = self.attempt(problem, flags, WisdomMode::IgnoreAll, deadline);
        }
        debug_assert!(
            !matches!(out, PlanOutcome::BogusWisdom),
            "a wisdom-blind attempt cannot report bogus wisdom"
        );
        out
    }

    fn attempt(
        &mut self,
        problem: &TransformProblem,
        flags: SearchFlags,
        mode: WisdomMode,
        deadline: Option<Instant>,
    ) -> PlanOutcome {
        let mut planner = Planner::new(
            &self.registry,
            &mut self.cache,
            self.evaluator.as_mut(),
            &self.config,
            &mut self.stats,
            flags,
            mode,
            deadline,
        );
        planner.mkplan(problem)
    }
}
