// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Distributed DFS pseudo-tree construction.
//!
//! A single token walks each connected component depth-first, starting at
//! the elected leader:
//!
//! 1. The token holder offers itself to its first open neighbour, in name
//!    order, with `DFS_CHILD`.
//! 2. An unvisited receiver adopts the sender as parent and becomes the
//!    token holder.
//! 3. A visited receiver answers `DFS_PSEUDO`: the edge is a back edge to
//!    one of the sender's ancestors.
//! 4. A holder with no open neighbour left computes its separator, returns
//!    the token with `DFS_DONE { separator }` and publishes its node with
//!    `DFS_OUTPUT`.
//!
//! A neighbour is open unless it is already the parent, a child, a
//! pseudo-parent or a pseudo-child. Descendants always contact their
//! ancestors before the token climbs back, so the holder never offers to a
//! finished descendant.

use super::{owner_of, report_fault, report_finished, ProtocolError};
use crate::domain::addable::Addable;
use crate::domain::message::{Message, Payload};
use crate::domain::problem::AgentProblem;
use crate::domain::pseudo_tree::{DfsPhase, EdgeOutcome, PseudoTreeNode};
use crate::domain::variable::AgentId;
use crate::infrastructure::queue::{IncomingMessagePolicy, QueueHandle};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

pub const MODULE: &str = "dfs";

#[derive(Debug)]
struct Token {
    from: String,
    root: String,
    depth: u32,
}

#[derive(Debug)]
struct DfsState {
    node: PseudoTreeNode,
    phase: DfsPhase,
    neighbors: BTreeSet<String>,
    leader: Option<String>,
    /// Tokens received before the election concluded.
    deferred: Vec<Token>,
    awaiting: Option<String>,
    failed: bool,
}

impl DfsState {
    fn is_open(&self, neighbor: &str) -> bool {
        !self.node.is_above(neighbor) && !self.node.is_below(neighbor)
    }
}

pub struct DfsGeneration<U> {
    problem: Arc<AgentProblem<U>>,
    states: BTreeMap<String, DfsState>,
}

impl<U: Addable> DfsGeneration<U> {
    pub fn new(problem: Arc<AgentProblem<U>>) -> Self {
        let states = problem
            .variables()
            .iter()
            .map(|v| {
                let state = DfsState {
                    node: PseudoTreeNode::new(v.name.clone()),
                    phase: DfsPhase::Unvisited,
                    neighbors: problem.neighbors(&v.name).clone(),
                    leader: None,
                    deferred: Vec::new(),
                    awaiting: None,
                    failed: false,
                };
                (v.name.clone(), state)
            })
            .collect();
        Self { problem, states }
    }

    fn state(&mut self, variable: &str) -> Result<&mut DfsState, ProtocolError> {
        self.states
            .get_mut(variable)
            .ok_or_else(|| ProtocolError::NotOwned(variable.to_string()))
    }

    fn handle(&mut self, message: &Message<U>, queue: &QueueHandle<U>) -> Result<(), ProtocolError> {
        match &message.payload {
            Payload::LeaderElected { variable, leader, is_root } => {
                let state = self.state(variable)?;
                state.leader = Some(leader.clone());
                let deferred = std::mem::take(&mut state.deferred);
                if *is_root {
                    state.phase = DfsPhase::Offering;
                    debug!(variable = %variable, "Starting DFS as root");
                    self.offer_next(variable, queue)?;
                }
                for token in deferred {
                    self.on_token(variable, token, queue)?;
                }
            }
            Payload::DfsChild { from, to, root, depth } => {
                let token = Token {
                    from: from.clone(),
                    root: root.clone(),
                    depth: *depth,
                };
                let state = self.state(to)?;
                if state.leader.is_none() {
                    state.deferred.push(token);
                } else {
                    self.on_token(to, token, queue)?;
                }
            }
            Payload::DfsPseudo { from, to } => {
                let state = self.state(to)?;
                state.node.pseudo_parents.insert(from.clone());
                state.awaiting = None;
                self.offer_next(to, queue)?;
            }
            Payload::DfsDone { from, to, separator } => {
                let state = self.state(to)?;
                state.node.children.push(from.clone());
                state.node.child_separators.insert(from.clone(), separator.clone());
                state.awaiting = None;
                self.offer_next(to, queue)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn on_token(&mut self, variable: &str, token: Token, queue: &QueueHandle<U>) -> Result<(), ProtocolError> {
        let state = self.state(variable)?;
        if state.failed {
            return Ok(());
        }
        if state.leader.as_deref() != Some(token.root.as_str()) {
            state.failed = true;
            let detail = format!(
                "token rooted at '{}' but the elected leader is '{}'",
                token.root,
                state.leader.as_deref().unwrap_or("<none>")
            );
            warn!(variable = %variable, %detail, "Inconsistent pseudo-tree roots");
            queue.send(
                &AgentId::stats_monitor(),
                Payload::TreeError {
                    variable: variable.to_string(),
                    detail,
                },
            )?;
            return Ok(());
        }

        let outcome = if state.phase == DfsPhase::Unvisited {
            state.node.parent = Some(token.from.clone());
            state.node.root = token.root;
            state.node.depth = token.depth + 1;
            state.phase = DfsPhase::Offering;
            EdgeOutcome::ChosenAsChild
        } else {
            state.node.pseudo_children.insert(token.from.clone());
            EdgeOutcome::ChosenAsPseudoChild
        };
        debug!(variable = %variable, from = %token.from, ?outcome, "DFS token received");

        match outcome {
            EdgeOutcome::ChosenAsChild => self.offer_next(variable, queue),
            EdgeOutcome::ChosenAsPseudoChild => {
                let owner = owner_of(&self.problem, &token.from)?;
                queue.send(
                    owner,
                    Payload::DfsPseudo {
                        from: variable.to_string(),
                        to: token.from,
                    },
                )?;
                Ok(())
            }
        }
    }

    /// Pass the token to the next open neighbour, or finish.
    fn offer_next(&mut self, variable: &str, queue: &QueueHandle<U>) -> Result<(), ProtocolError> {
        let state = self.state(variable)?;
        if state.phase != DfsPhase::Offering || state.awaiting.is_some() {
            return Ok(());
        }
        let next = state.neighbors.iter().find(|n| state.is_open(n)).cloned();
        let Some(next) = next else {
            return self.finish(variable, queue);
        };

        state.awaiting = Some(next.clone());
        let payload = Payload::DfsChild {
            from: variable.to_string(),
            to: next.clone(),
            root: state.node.root.clone(),
            depth: state.node.depth,
        };
        let owner = owner_of(&self.problem, &next)?;
        queue.send(owner, payload)?;
        Ok(())
    }

    fn finish(&mut self, variable: &str, queue: &QueueHandle<U>) -> Result<(), ProtocolError> {
        let state = self.state(variable)?;
        state.phase = DfsPhase::Done;
        state.node.separator = state.node.compute_separator();
        let node = state.node.clone();
        debug!(
            variable = %variable,
            parent = ?node.parent,
            children = ?node.children,
            separator = ?node.separator,
            "Pseudo-tree node complete"
        );

        if let Some(parent) = &node.parent {
            let owner = owner_of(&self.problem, parent)?;
            queue.send(
                owner,
                Payload::DfsDone {
                    from: variable.to_string(),
                    to: parent.clone(),
                    separator: node.separator.clone(),
                },
            )?;
        }
        queue.send(&AgentId::stats_monitor(), Payload::DfsOutput(node.clone()))?;
        queue.send_to_self(Payload::DfsOutput(node))?;
        report_finished(queue, MODULE, variable)
    }
}

impl<U: Addable> IncomingMessagePolicy<U> for DfsGeneration<U> {
    fn notify_in(&mut self, message: &Message<U>, queue: &QueueHandle<U>) {
        if let Err(e) = self.handle(message, queue) {
            report_fault(queue, MODULE, &e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::election::LeaderElection;
    use super::super::testing::{chain_problem, collect_until, monitor_until, spawn_agent_queue};
    use super::*;
    use crate::domain::addable::Direction;
    use crate::domain::message::types;
    use crate::domain::problem::Problem;
    use crate::domain::pseudo_tree::PseudoTree;
    use crate::domain::variable::Variable;
    use parking_lot::Mutex;

    fn install(view: &Arc<AgentProblem<i64>>, rounds: u32, handle: &QueueHandle<i64>) {
        handle.add_incoming_policy(
            &[&types::START, &types::ELECTION_SCORE],
            Arc::new(Mutex::new(LeaderElection::new(Arc::clone(view), rounds))),
        );
        handle.add_incoming_policy(
            &[&types::LEADER_ELECTED, &types::DFS],
            Arc::new(Mutex::new(DfsGeneration::new(Arc::clone(view)))),
        );
    }

    async fn build_tree(problem: &Problem<i64>, rounds: u32) -> PseudoTree {
        let view = Arc::new(problem.agent_view(&AgentId::from("a")).unwrap());
        let (mut queue, mut outputs, _monitor) =
            spawn_agent_queue(&view, &[&types::DFS_OUTPUT], |handle| install(&view, rounds, handle));
        queue.handle().send_to_self(Payload::Start).unwrap();

        let nodes = collect_until(&mut outputs, problem.variables().len()).await;
        queue.end();
        nodes
            .into_iter()
            .map(|p| match p {
                Payload::DfsOutput(node) => node,
                other => panic!("unexpected payload {other:?}"),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_chain_rooted_at_middle() {
        let problem = chain_problem(&["a", "a", "a"]);
        let tree = build_tree(&problem, 3).await;

        assert_eq!(tree.roots(), vec!["x2"]);
        assert_eq!(tree.node("x2").unwrap().children, vec!["x1".to_string(), "x3".to_string()]);
        assert_eq!(tree.node("x3").unwrap().separator, BTreeSet::from(["x2".to_string()]));
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.validate(), Ok(()));
    }

    #[tokio::test]
    async fn test_cycle_produces_back_edge() {
        let mut problem = Problem::new("triangle", Direction::Minimize);
        for name in ["x1", "x2", "x3"] {
            problem
                .add_variable(Variable::new(name, vec![0, 1], Some(AgentId::from("a"))))
                .unwrap();
        }
        for (a, b) in [("x1", "x2"), ("x2", "x3"), ("x1", "x3")] {
            problem.add_constraint_fn(&[a, b], |t| i64::from(t[0] == t[1])).unwrap();
        }
        let tree = build_tree(&problem, 3).await;

        let root = tree.node("x3").unwrap();
        assert!(root.is_root());
        assert_eq!(root.pseudo_children, BTreeSet::from(["x2".to_string()]));
        let bottom = tree.node("x2").unwrap();
        assert_eq!(bottom.parent.as_deref(), Some("x1"));
        assert_eq!(bottom.separator, BTreeSet::from(["x1".to_string(), "x3".to_string()]));
        assert_eq!(tree.node("x1").unwrap().separator, BTreeSet::from(["x3".to_string()]));
        assert_eq!(tree.validate(), Ok(()));
        assert!(tree.validate_edges([("x1", "x2"), ("x2", "x3"), ("x1", "x3")]).is_ok());
    }

    #[tokio::test]
    async fn test_disconnected_graph_yields_forest() {
        let mut problem = chain_problem(&["a", "a"]);
        problem
            .add_variable(Variable::new("solo", vec![0, 1], Some(AgentId::from("a"))))
            .unwrap();
        let tree = build_tree(&problem, 3).await;

        let mut roots = tree.roots();
        roots.sort();
        assert_eq!(roots, vec!["solo", "x2"]);
        assert!(tree.node("solo").unwrap().separator.is_empty());
    }

    #[tokio::test]
    async fn test_short_election_budget_reports_tree_error() {
        let problem = chain_problem(&["a", "a", "a", "a"]);
        let view = Arc::new(problem.agent_view(&AgentId::from("a")).unwrap());
        let (mut queue, _outputs, mut monitor) =
            spawn_agent_queue(&view, &[&types::DFS_OUTPUT], |handle| install(&view, 1, handle));
        queue.handle().send_to_self(Payload::Start).unwrap();

        let error = monitor_until(&mut monitor, |p| match p {
            Payload::TreeError { variable, .. } => Some(variable.clone()),
            _ => None,
        })
        .await;
        assert_eq!(error, "x1");
        queue.end();
    }
}
