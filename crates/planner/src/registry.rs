//! Solver registration and lookup.
//!
//! Registration order defines the in-memory solver index used by the cache;
//! the `(name, sequence id)` pair is the stable identity used by wisdom, so
//! it survives re-registration in a different overall order as long as the
//! order *within* one name is unchanged.

use crate::plan::Plan;
use crate::planner::Planner;
use crate::problem::TransformProblem;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A named strategy generator.
///
/// `try_build` may decline for any reason (inapplicable shape, flags that
/// forbid it, recursion depth) by returning `None`; that is a normal
/// outcome, not an error. Solvers may plan child problems through the
/// planner they are handed.
pub trait Solver: Send + Sync {
    fn try_build(&self, problem: &TransformProblem, planner: &mut Planner<'_>) -> Option<Plan>;
}

pub type DynSolver = Arc<dyn Solver>;

pub struct SolverDesc {
    solver: DynSolver,
    name: &'static str,
    id: u32,
    name_hash: u64,
}

impl SolverDesc {
    pub fn solver(&self) -> &DynSolver {
        &self.solver
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn id(&self) -> u32 {
        self.id
    }
}

#[derive(Default)]
pub struct SolverRegistry {
    descs: Vec<SolverDesc>,
    next_id: HashMap<&'static str, u32>,
}

impl SolverRegistry {
    pub fn new() -> SolverRegistry {
        SolverRegistry::default()
    }

    /// Append a solver under `name`, assigning the next sequence id for
    /// that name. Returns the in-memory index.
    pub fn register<S>(&mut self, name: &'static str, solver: S) -> usize
    where
        S: Solver + 'static,
    {
        self.register_dyn(name, Arc::new(solver))
    }

    pub fn register_dyn(&mut self, name: &'static str, solver: DynSolver) -> usize {
        let id = self.next_id.entry(name).or_insert(0);
        let desc = SolverDesc {
            solver,
            name,
            id: *id,
            name_hash: name_hash(name),
        };
        *id += 1;
        self.descs.push(desc);
        self.descs.len() - 1
    }

    pub fn len(&self) -> usize {
        self.descs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descs.is_empty()
    }

    pub fn desc(&self, index: usize) -> Option<&SolverDesc> {
        self.descs.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SolverDesc> {
        self.descs.iter()
    }

    /// Resolve a wisdom record's `(name, id)` to an in-memory index. The
    /// name hash screens out non-matches before any string comparison.
    pub fn find_by_name_id(&self, name: &str, id: u32) -> Option<usize> {
        let h = name_hash(name);
        self.descs
            .iter()
            .position(|d| d.id == id && d.name_hash == h && d.name == name)
    }
}

fn name_hash(name: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    hasher.finish()
}
