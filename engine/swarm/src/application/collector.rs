// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Folds stats-monitor traffic into a [`SolveReport`].

use crate::domain::{SolveReport, SwarmError, SwarmId};
use chrono::{DateTime, Utc};
use dcop_core::domain::{Addable, AgentId, Assignment, Direction, Message, ModuleReport, Payload, PseudoTree};
use dcop_core::infrastructure::StatsSnapshot;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tracing::{debug, error, info};

pub struct ReportCollector<U> {
    swarm_id: SwarmId,
    problem: String,
    direction: Direction,
    started_at: DateTime<Utc>,
    expected: BTreeSet<AgentId>,
    finished: BTreeSet<AgentId>,
    assignment: Assignment,
    root_utilities: BTreeMap<String, U>,
    pseudo_tree: PseudoTree,
    modules: Vec<ModuleReport>,
}

impl<U: Addable> ReportCollector<U> {
    pub fn new(swarm_id: SwarmId, problem: String, direction: Direction, agents: impl IntoIterator<Item = AgentId>) -> Self {
        Self {
            swarm_id,
            problem,
            direction,
            started_at: Utc::now(),
            expected: agents.into_iter().collect(),
            finished: BTreeSet::new(),
            assignment: Assignment::new(),
            root_utilities: BTreeMap::new(),
            pseudo_tree: PseudoTree::new(),
            modules: Vec::new(),
        }
    }

    /// `true` once every expected agent has reported `AGENT_FINISHED`.
    pub fn is_complete(&self) -> bool {
        self.finished.is_superset(&self.expected)
    }

    pub fn pending(&self) -> impl Iterator<Item = &AgentId> {
        self.expected.difference(&self.finished)
    }

    /// Record one report. Tree errors and agent faults abort the solve.
    pub fn absorb(&mut self, message: Message<U>) -> Result<(), SwarmError> {
        match message.payload {
            Payload::Assignment { variable, value } => {
                debug!(variable = %variable, value, "Assignment reported");
                self.assignment.insert(variable, value);
            }
            Payload::OptimalUtility { root, utility } => {
                info!(root = %root, ?utility, "Tree optimum reported");
                self.root_utilities.insert(root, utility);
            }
            Payload::DfsOutput(node) => self.pseudo_tree.insert(node),
            Payload::ModuleFinished(report) => self.modules.push(report),
            Payload::AgentFinished { agent } => {
                debug!(agent = %agent, "Agent finished");
                self.finished.insert(agent);
            }
            Payload::TreeError { variable, detail } => {
                error!(variable = %variable, %detail, "Pseudo-tree construction failed");
                return Err(SwarmError::PseudoTree { variable, detail });
            }
            Payload::AgentFault { agent, detail } => {
                return Err(SwarmError::AgentFault { agent, detail });
            }
            other => {
                debug!(sender = %message.sender, kind = %other.kind(), "Ignoring monitor message");
            }
        }
        Ok(())
    }

    pub fn into_report(self, nccc: BTreeMap<AgentId, u64>, messages: StatsSnapshot, elapsed: Duration) -> SolveReport<U> {
        SolveReport {
            swarm_id: self.swarm_id,
            problem: self.problem,
            direction: self.direction,
            assignment: self.assignment,
            root_utilities: self.root_utilities,
            pseudo_tree: self.pseudo_tree,
            modules: self.modules,
            nccc,
            messages,
            started_at: self.started_at,
            elapsed,
        }
    }
}
