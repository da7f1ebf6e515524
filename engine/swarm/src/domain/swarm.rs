// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Solve Results
//!
//! - [`SwarmId`]: unique identifier of one deployment (UUID newtype).
//! - [`SolveReport`]: everything the monitor learnt during a solve.
//! - [`SolveOutcome`]: a complete solve, or a timed-out one with whatever
//!   was reported before the deadline.
//! - [`SwarmError`]: failures that abort a solve.

use chrono::{DateTime, Utc};
use dcop_core::domain::{
    Addable, AgentId, Assignment, Direction, ModuleReport, ProblemError, PseudoTree,
};
use dcop_core::infrastructure::{QueueError, StatsSnapshot, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a deployed swarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SwarmId(pub Uuid);

impl SwarmId {
    /// Generate a new random `SwarmId`.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SwarmId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SwarmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of one solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "U: Addable")]
pub struct SolveReport<U> {
    pub swarm_id: SwarmId,
    pub problem: String,
    pub direction: Direction,
    /// Chosen value of every reported variable.
    pub assignment: Assignment,
    /// Optimal utility of each pseudo-tree, keyed by root.
    pub root_utilities: BTreeMap<String, U>,
    pub pseudo_tree: PseudoTree,
    /// Module completions in arrival order.
    pub modules: Vec<ModuleReport>,
    /// Final NCCC clock of each agent.
    pub nccc: BTreeMap<AgentId, u64>,
    pub messages: StatsSnapshot,
    pub started_at: DateTime<Utc>,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
}

impl<U: Addable> SolveReport<U> {
    /// Sum of the per-tree optima: the optimal utility of the whole problem.
    pub fn utility(&self) -> U {
        self.root_utilities.values().fold(U::zero(), |acc, u| acc.add(*u))
    }

    /// The solve's NCCC count: the largest clock of any agent.
    pub fn max_nccc(&self) -> u64 {
        self.nccc.values().copied().max().unwrap_or(0)
    }

    /// Completion time of `module` for `variable`, if reported.
    pub fn module(&self, module: &str, variable: &str) -> Option<&ModuleReport> {
        self.modules
            .iter()
            .find(|r| r.module == module && r.variable == variable)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "report", rename_all = "snake_case", bound = "U: Addable")]
pub enum SolveOutcome<U> {
    Solved(SolveReport<U>),
    /// The deadline passed first; the report is partial.
    TimedOut(SolveReport<U>),
}

impl<U> SolveOutcome<U> {
    pub fn report(&self) -> &SolveReport<U> {
        match self {
            SolveOutcome::Solved(report) | SolveOutcome::TimedOut(report) => report,
        }
    }

    pub fn into_report(self) -> SolveReport<U> {
        match self {
            SolveOutcome::Solved(report) | SolveOutcome::TimedOut(report) => report,
        }
    }

    pub fn is_solved(&self) -> bool {
        matches!(self, SolveOutcome::Solved(_))
    }
}

#[derive(Debug, Error)]
pub enum SwarmError {
    #[error("Invalid problem: {0}")]
    Problem(#[from] ProblemError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    /// Usually an election round budget smaller than the graph diameter.
    #[error("Inconsistent pseudo-tree at '{variable}': {detail}")]
    PseudoTree { variable: String, detail: String },

    #[error("Agent '{agent}' failed: {detail}")]
    AgentFault { agent: AgentId, detail: String },

    #[error("Stats monitor channel closed before the solve completed")]
    MonitorClosed,
}
