// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Solve command
//!
//! Generates a benchmark problem, solves it on an in-process swarm and
//! prints the assignment, optionally checked against exhaustive search.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::generators::{generate, GeneratorParams, ProblemKind};
use dcop_core::domain::{Problem, SolverConfig};
use dcop_swarm::application::{DcopSolver, DpopSolver};
use dcop_swarm::domain::{SolveOutcome, SolveReport};

/// Exhaustive search is refused above this many assignments.
const MAX_VERIFY_ASSIGNMENTS: u128 = 2_000_000;

#[derive(Args, Debug, Clone)]
pub struct SolveArgs {
    /// Problem generator
    #[arg(value_enum)]
    pub kind: ProblemKind,

    /// Number of variables
    #[arg(short = 'n', long, default_value_t = 3)]
    pub variables: usize,

    /// Number of agents (variables are dealt round-robin)
    #[arg(short, long)]
    pub agents: Option<usize>,

    /// Domain size
    #[arg(long, default_value_t = 3)]
    pub colors: usize,

    /// Extra edge probability for `coloring`
    #[arg(long, default_value_t = 0.3)]
    pub density: f64,

    /// Random seed for `coloring` (default: random)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Make conflicts infeasible instead of costing 1
    #[arg(long)]
    pub hard: bool,

    /// Compare the result against exhaustive search
    #[arg(long)]
    pub verify: bool,

    /// Print Prometheus metrics after the solve
    #[arg(long)]
    pub metrics: bool,

    /// Print the full report as JSON
    #[arg(long)]
    pub json: bool,
}

impl SolveArgs {
    pub fn params(&self) -> GeneratorParams {
        GeneratorParams {
            variables: self.variables,
            agents: self.agents.unwrap_or(self.variables),
            colors: self.colors,
            density: self.density,
            hard: self.hard,
            seed: self.seed.unwrap_or_else(rand::random),
        }
    }
}

pub async fn handle_command(args: SolveArgs, config_override: Option<PathBuf>) -> Result<()> {
    let config = SolverConfig::load_or_default(config_override).context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    let recorder = if args.metrics {
        Some(install_metrics()?)
    } else {
        None
    };

    let params = args.params();
    let problem = generate(args.kind, &params, config.direction).context("Failed to generate problem")?;
    info!(
        problem = %problem.name(),
        seed = params.seed,
        variables = problem.variables().len(),
        constraints = problem.constraints().len(),
        "Problem generated"
    );

    let solver = DpopSolver::new(config);
    let outcome = solver.solve(&problem).await.context("Solve failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&problem, &outcome);
    }

    if args.verify {
        verify(&problem, outcome.report())?;
    }

    if let Some(handle) = recorder {
        println!();
        println!("{}", handle.render());
    }

    if !outcome.is_solved() {
        bail!("solve timed out after {:?}", solver.config().timeout);
    }
    Ok(())
}

fn install_metrics() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")
}

fn print_outcome(problem: &Problem<i64>, outcome: &SolveOutcome<i64>) {
    let report = outcome.report();
    let status = match outcome {
        SolveOutcome::Solved(_) => "solved".green().bold(),
        SolveOutcome::TimedOut(_) => "timed out".yellow().bold(),
    };
    println!("{} {} ({})", "Problem".bold(), problem.name(), status);
    println!("  Swarm: {}", report.swarm_id);
    println!("  Direction: {:?}", report.direction);
    println!("  Agents: {}", report.nccc.len());
    println!();

    println!("{}", "Assignment:".bold());
    for variable in problem.variables() {
        match report.assignment.get(&variable.name) {
            Some(value) => println!("  {} = {}", variable.name, value),
            None => println!("  {} = {}", variable.name, "(undecided)".dimmed()),
        }
    }
    println!();

    println!("{}", "Pseudo-tree:".bold());
    for root in report.pseudo_tree.roots() {
        let utility = report.root_utilities.get(root);
        println!(
            "  root {} (depth {}) optimum {}",
            root,
            report.pseudo_tree.depth(),
            utility.map_or_else(|| "?".to_string(), |u| u.to_string())
        );
    }
    println!();

    println!("{}", "Statistics:".bold());
    println!("  Utility: {}", report.utility());
    println!("  NCCC: {}", report.max_nccc());
    println!(
        "  Messages: {} ({} bytes)",
        report.messages.total_messages(),
        report.messages.total_bytes()
    );
    for (kind, stats) in &report.messages.by_type {
        println!("    {:<14} {:>6} msgs {:>9} bytes (max {})", kind, stats.count, stats.bytes, stats.max_size);
    }
    println!("  Elapsed: {:?}", report.elapsed);
}

fn verify(problem: &Problem<i64>, report: &SolveReport<i64>) -> Result<()> {
    let space: u128 = problem
        .variables()
        .iter()
        .map(|v| v.domain_size() as u128)
        .try_fold(1u128, |acc, size| acc.checked_mul(size))
        .unwrap_or(u128::MAX);
    if space > MAX_VERIFY_ASSIGNMENTS {
        warn!(assignments = %space, "Problem too large to verify by exhaustive search");
        println!("{}", "⚠ Skipping verification: search space too large".yellow());
        return Ok(());
    }

    let (_, optimum) = problem.brute_force()?;
    let found = problem.evaluate(&report.assignment)?;
    if found != optimum {
        bail!("DPOP assignment has utility {found}, exhaustive search found {optimum}");
    }
    println!();
    println!("{}", format!("✓ Verified against exhaustive search (optimum {optimum})").green());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: SolveArgs,
    }

    #[test]
    fn test_argument_defaults() {
        let harness = Harness::parse_from(["dcop", "chain", "--seed", "9"]);
        let params = harness.args.params();
        assert_eq!(harness.args.kind, ProblemKind::Chain);
        assert_eq!(params.variables, 3);
        assert_eq!(params.agents, 3);
        assert_eq!(params.seed, 9);
        assert!(!params.hard);
    }

    #[tokio::test]
    async fn test_coloring_solution_verifies() {
        let harness = Harness::parse_from(["dcop", "coloring", "-n", "6", "--agents", "2", "--seed", "3"]);
        let params = harness.args.params();
        let problem = generate(harness.args.kind, &params, Default::default()).unwrap();
        let outcome = DpopSolver::default().solve(&problem).await.unwrap();
        assert!(outcome.is_solved());
        verify(&problem, outcome.report()).unwrap();
    }
}
