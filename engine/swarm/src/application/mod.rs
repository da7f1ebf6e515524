// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Application Layer
//!
//! - [`Swarm`] deploys and runs one solve.
//! - [`ReportCollector`] folds monitor traffic into a report.
//! - [`DcopSolver`] is the service trait callers depend on; [`DpopSolver`]
//!   implements it with a fresh swarm per call.

pub mod collector;
pub mod deployment;

pub use collector::ReportCollector;
pub use deployment::Swarm;

use crate::domain::{SolveOutcome, SwarmError};
use async_trait::async_trait;
use dcop_core::domain::{Addable, Problem, SolverConfig};

#[async_trait]
pub trait DcopSolver<U: Addable>: Send + Sync {
    async fn solve(&self, problem: &Problem<U>) -> Result<SolveOutcome<U>, SwarmError>;
}

/// DPOP over an in-process swarm.
#[derive(Debug, Clone, Default)]
pub struct DpopSolver {
    config: SolverConfig,
}

impl DpopSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }
}

#[async_trait]
impl<U: Addable> DcopSolver<U> for DpopSolver {
    async fn solve(&self, problem: &Problem<U>) -> Result<SolveOutcome<U>, SwarmError> {
        let swarm = Swarm::deploy(problem, &self.config)?;
        swarm.solve(self.config.timeout).await
    }
}
