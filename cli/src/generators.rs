// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Benchmark problem generators
//!
//! - `chain`: `x1 ≠ x2 ≠ ... ≠ xn` over `colors` values
//! - `coloring`: graph colouring on a random connected graph
//!
//! Variables are dealt round-robin to `agents` agents named `a0`, `a1`, ...
//! Conflicts cost 1 (utility -1 when maximizing), or are infeasible with
//! `hard`.

use anyhow::{bail, Result};
use clap::ValueEnum;
use dcop_core::domain::{AgentId, Direction, Problem, Value, Variable};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProblemKind {
    Chain,
    Coloring,
}

#[derive(Debug, Clone)]
pub struct GeneratorParams {
    pub variables: usize,
    pub agents: usize,
    pub colors: usize,
    /// Probability of each extra edge on top of the spanning tree
    pub density: f64,
    pub hard: bool,
    pub seed: u64,
}

impl Default for GeneratorParams {
    fn default() -> Self {
        Self {
            variables: 3,
            agents: 3,
            colors: 3,
            density: 0.3,
            hard: false,
            seed: 0,
        }
    }
}

impl GeneratorParams {
    fn check(&self) -> Result<()> {
        if self.variables == 0 {
            bail!("at least one variable is required");
        }
        if self.agents == 0 {
            bail!("at least one agent is required");
        }
        if self.colors == 0 {
            bail!("at least one color is required");
        }
        if !(0.0..=1.0).contains(&self.density) {
            bail!("density must be within [0, 1], got {}", self.density);
        }
        Ok(())
    }

    fn owner(&self, index: usize) -> AgentId {
        AgentId::new(format!("a{}", index % self.agents))
    }

    fn domain(&self) -> Vec<Value> {
        (0..self.colors as Value).collect()
    }
}

pub fn generate(kind: ProblemKind, params: &GeneratorParams, direction: Direction) -> Result<Problem<i64>> {
    match kind {
        ProblemKind::Chain => chain(params, direction),
        ProblemKind::Coloring => coloring(params, direction),
    }
}

pub fn chain(params: &GeneratorParams, direction: Direction) -> Result<Problem<i64>> {
    params.check()?;
    let mut problem = Problem::new(format!("chain-{}", params.variables), direction);
    for i in 0..params.variables {
        problem.add_variable(Variable::new(format!("x{}", i + 1), params.domain(), Some(params.owner(i))))?;
    }
    let edges: Vec<(usize, usize)> = (1..params.variables).map(|i| (i - 1, i)).collect();
    add_difference_constraints(&mut problem, &edges, params.hard, |i| format!("x{}", i + 1))?;
    Ok(problem)
}

pub fn coloring(params: &GeneratorParams, direction: Direction) -> Result<Problem<i64>> {
    params.check()?;
    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut problem = Problem::new(
        format!("coloring-{}-{}", params.variables, params.seed),
        direction,
    );
    for i in 0..params.variables {
        problem.add_variable(Variable::new(format!("v{i}"), params.domain(), Some(params.owner(i))))?;
    }

    // Random spanning tree keeps the graph connected, then extra edges.
    let mut edges = Vec::new();
    for i in 1..params.variables {
        edges.push((rng.random_range(0..i), i));
    }
    for i in 0..params.variables {
        for j in (i + 1)..params.variables {
            if !edges.contains(&(i, j)) && rng.random_bool(params.density) {
                edges.push((i, j));
            }
        }
    }
    add_difference_constraints(&mut problem, &edges, params.hard, |i| format!("v{i}"))?;
    Ok(problem)
}

fn add_difference_constraints(
    problem: &mut Problem<i64>,
    edges: &[(usize, usize)],
    hard: bool,
    name: impl Fn(usize) -> String,
) -> Result<()> {
    let conflict = match (hard, problem.direction()) {
        (true, _) => problem.infeasible(),
        (false, Direction::Minimize) => 1,
        (false, Direction::Maximize) => -1,
    };
    for (a, b) in edges {
        let (a, b) = (name(*a), name(*b));
        problem.add_constraint_fn(&[a.as_str(), b.as_str()], |t| if t[0] == t[1] { conflict } else { 0 })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_shape() {
        let params = GeneratorParams {
            variables: 4,
            agents: 2,
            ..GeneratorParams::default()
        };
        let problem = chain(&params, Direction::Minimize).unwrap();
        assert_eq!(problem.variables().len(), 4);
        assert_eq!(problem.constraints().len(), 3);
        assert_eq!(problem.owner_of("x3"), Some(&AgentId::from("a0")));
        assert_eq!(problem.owner_of("x4"), Some(&AgentId::from("a1")));
        assert_eq!(problem.brute_force().unwrap().1, 0);
    }

    #[test]
    fn test_coloring_is_deterministic_per_seed() {
        let params = GeneratorParams {
            variables: 8,
            seed: 42,
            density: 0.5,
            ..GeneratorParams::default()
        };
        let first = coloring(&params, Direction::Minimize).unwrap();
        let second = coloring(&params, Direction::Minimize).unwrap();
        let scopes = |p: &Problem<i64>| -> Vec<Vec<String>> {
            p.constraints().iter().map(|c| c.variables().to_vec()).collect()
        };
        assert_eq!(scopes(&first), scopes(&second));
        assert!(first.constraints().len() >= 7);
    }

    #[test]
    fn test_coloring_is_connected() {
        let params = GeneratorParams {
            variables: 10,
            density: 0.0,
            seed: 7,
            ..GeneratorParams::default()
        };
        let problem = coloring(&params, Direction::Minimize).unwrap();
        assert_eq!(problem.constraints().len(), 9);

        let mut reached = vec!["v0".to_string()];
        let mut frontier = vec!["v0".to_string()];
        while let Some(variable) = frontier.pop() {
            for neighbor in problem.neighbors(&variable) {
                if !reached.contains(&neighbor) {
                    reached.push(neighbor.clone());
                    frontier.push(neighbor);
                }
            }
        }
        assert_eq!(reached.len(), 10);
    }

    #[test]
    fn test_hard_conflicts_are_infeasible() {
        let params = GeneratorParams {
            variables: 3,
            colors: 1,
            hard: true,
            ..GeneratorParams::default()
        };
        let problem = chain(&params, Direction::Minimize).unwrap();
        let (_, utility) = problem.brute_force().unwrap();
        assert_eq!(utility, problem.infeasible());
    }

    #[test]
    fn test_invalid_parameters() {
        let params = GeneratorParams {
            density: 1.5,
            ..GeneratorParams::default()
        };
        assert!(coloring(&params, Direction::Minimize).is_err());
        let params = GeneratorParams {
            agents: 0,
            ..GeneratorParams::default()
        };
        assert!(chain(&params, Direction::Minimize).is_err());
    }
}
