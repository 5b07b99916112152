//! Adaptive plan search, memoization, and wisdom persistence.
//!
//! This crate is the decision engine of SpectraForge: given an abstract
//! transform description it searches the registered solvers for the
//! cheapest executable plan, memoizes the winner under a content hash of
//! the problem, and persists retained winners as portable "wisdom".
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌───────────────────┐     ┌─────────────────┐
//! │ PlanningContext  │────▶│  Planner          │────▶│  SolutionCache  │
//! │ (ladder+recovery)│     │  (lookup/search/  │     │  (fingerprint → │
//! │                  │     │   evaluate/insert)│     │   solver index) │
//! └──────────────────┘     └───────────────────┘     └─────────────────┘
//!          │                        │                        │
//!          ▼                        ▼                        ▼
//!   SolverRegistry           CostEvaluator             wisdom codec
//! ```
//!
//! # Key components
//!
//! - [`problem::TransformProblem`]: immutable, canonical problem description
//! - [`registry::Solver`]: a named strategy generator; may decline
//! - [`planner::Planner`]: the per-request planning state machine
//! - [`cache::SolutionCache`]: double-hashed open-addressed memoization
//! - [`driver::PlanningContext`]: patience ladder, blessing, recovery
//! - [`wisdom`]: stable textual import/export of retained decisions

pub mod cache;
pub mod driver;
pub mod fingerprint;
pub mod flags;
pub mod plan;
pub mod planner;
pub mod problem;
pub mod registry;
pub mod tensor;
pub mod wisdom;

pub use cache::{CacheEntry, CacheStats, Slot, SolutionCache};
pub use driver::{PlanOptions, PlanningContext, TransformPlan};
pub use fingerprint::{Fingerprinter, Signature};
pub use flags::{Amnesia, Patience, ProblemFlags, SearchFlags};
pub use plan::{Executor, OpCount, Plan, SignalIo};
pub use planner::{
    CostEvaluator, OpCountEvaluator, PlanOutcome, Planner, PlannerConfig, PlannerStats,
    WisdomMode,
};
pub use problem::{Placement, Precision, TransformKind, TransformProblem};
pub use registry::{DynSolver, Solver, SolverDesc, SolverRegistry};
pub use tensor::{Dim, Shape};
