//! Benchmark harness executable for the SpectraForge planner.

use anyhow::Result;
use clap::Parser;
use num_complex::Complex64;
use serde::Serialize;
use spectraforge_planner::{Patience, PlanOptions, PlannerConfig, SignalIo, TransformProblem};
use spectraforge_transforms::default_context;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "spectraforge-bench", about = "SpectraForge planning benchmark harness")]
struct Cli {
    /// Transform lengths to plan.
    #[arg(long, value_delimiter = ',', default_value = "64,128,243,1000,1024")]
    sizes: Vec<usize>,

    #[arg(long, value_enum, default_value = "measure")]
    patience: PatienceArg,

    /// Wall-clock planning budget in milliseconds (0 = unlimited).
    #[arg(long, default_value_t = 0)]
    budget_ms: u64,

    /// Worker threads assumed by parallel solvers.
    #[arg(long, default_value_t = 1)]
    threads: usize,

    /// Wisdom file to import before and export after the run.
    #[arg(long)]
    wisdom: Option<PathBuf>,

    /// Write a JSON report here.
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum PatienceArg {
    Estimate,
    Measure,
    Thorough,
    Exhaustive,
}

impl From<PatienceArg> for Patience {
    fn from(value: PatienceArg) -> Patience {
        match value {
            PatienceArg::Estimate => Patience::Estimate,
            PatienceArg::Measure => Patience::Measure,
            PatienceArg::Thorough => Patience::Thorough,
            PatienceArg::Exhaustive => Patience::Exhaustive,
        }
    }
}

#[derive(Debug, Serialize)]
struct SizeReport {
    n: usize,
    plan: String,
    plan_cost: f64,
    planning_ms: f64,
    execute_ms: f64,
}

#[derive(Debug, Serialize)]
struct RunReport {
    patience: String,
    budget_ms: u64,
    threads: usize,
    sizes: Vec<SizeReport>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = PlannerConfig {
        threads: cli.threads.max(1),
        ..PlannerConfig::default()
    };
    let mut ctx = default_context(config);

    if let Some(path) = &cli.wisdom {
        if path.exists() {
            let accepted = ctx.import_wisdom_from_file(path)?;
            info!(accepted, path = %path.display(), "imported wisdom");
        }
    }

    let mut options = PlanOptions::new(cli.patience.into());
    if cli.budget_ms > 0 {
        options = options.with_budget(Duration::from_millis(cli.budget_ms));
    }

    let mut report = RunReport {
        patience: format!("{:?}", options.patience),
        budget_ms: cli.budget_ms,
        threads: config.threads,
        sizes: Vec::new(),
    };

    fastrand::seed(0x5eed);
    for &n in &cli.sizes {
        let problem = TransformProblem::forward_1d(n);

        let planning_started = Instant::now();
        let Some(plan) = ctx.plan(&problem, &options) else {
            warn!(n, "no plan found");
            continue;
        };
        let planning_ms = planning_started.elapsed().as_secs_f64() * 1e3;

        let mut buf: Vec<Complex64> = (0..n)
            .map(|_| Complex64::new(fastrand::f64() * 2.0 - 1.0, fastrand::f64() * 2.0 - 1.0))
            .collect();
        let execute_started = Instant::now();
        plan.execute(SignalIo::InPlace(&mut buf))?;
        let execute_ms = execute_started.elapsed().as_secs_f64() * 1e3;

        info!(
            n,
            cost = plan.cost(),
            planning_ms,
            execute_ms,
            plan = %plan.describe(),
            "planned"
        );
        report.sizes.push(SizeReport {
            n,
            plan: plan.describe(),
            plan_cost: plan.cost(),
            planning_ms,
            execute_ms,
        });
    }

    if let Some(path) = &cli.wisdom {
        ctx.export_wisdom_to_file(path)?;
        info!(path = %path.display(), "exported wisdom");
    }
    if let Some(path) = &cli.report {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        info!(path = %path.display(), "wrote report");
    }
    Ok(())
}
