// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! UTIL propagation, bottom-up.
//!
//! A node fires once its pseudo-tree node is known and every child has sent
//! its UTIL space. It joins a zero unary space over its own domain, the
//! constraints it handles and the children's spaces, then projects its own
//! variable out. The conditional-optimum table goes to the opt-table store;
//! the projected space goes to the parent. A root's projection is a scalar:
//! the optimal utility of its tree.
//!
//! A node handles a constraint when no other variable of its scope sits
//! below it. Every constraint is therefore joined exactly once, at the
//! deepest variable of its scope.

use super::{owner_of, report_fault, report_finished, ProtocolError};
use crate::domain::addable::Addable;
use crate::domain::message::{Message, Payload};
use crate::domain::problem::AgentProblem;
use crate::domain::pseudo_tree::PseudoTreeNode;
use crate::domain::utility::{Combine, UtilitySpace};
use crate::domain::variable::AgentId;
use crate::infrastructure::opt_store::OptTableStore;
use crate::infrastructure::queue::{IncomingMessagePolicy, QueueHandle};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

pub const MODULE: &str = "util";

struct UtilState<U> {
    node: Option<PseudoTreeNode>,
    received: BTreeMap<String, UtilitySpace<U>>,
    sent: bool,
}

impl<U> Default for UtilState<U> {
    fn default() -> Self {
        Self {
            node: None,
            received: BTreeMap::new(),
            sent: false,
        }
    }
}

pub struct UtilPropagation<U> {
    problem: Arc<AgentProblem<U>>,
    store: Arc<dyn OptTableStore>,
    states: BTreeMap<String, UtilState<U>>,
}

impl<U: Addable> UtilPropagation<U> {
    pub fn new(problem: Arc<AgentProblem<U>>, store: Arc<dyn OptTableStore>) -> Self {
        let states = problem
            .variables()
            .iter()
            .map(|v| (v.name.clone(), UtilState::default()))
            .collect();
        Self { problem, store, states }
    }

    fn handle(&mut self, message: &Message<U>, queue: &QueueHandle<U>) -> Result<(), ProtocolError> {
        let variable = match &message.payload {
            Payload::DfsOutput(node) => {
                let state = self.state(&node.variable)?;
                state.node = Some(node.clone());
                node.variable.clone()
            }
            Payload::Util { from, to, space } => {
                let state = self.state(to)?;
                if state.received.insert(from.clone(), space.clone()).is_some() {
                    return Err(ProtocolError::Violation(format!("second UTIL from '{from}' to '{to}'")));
                }
                to.clone()
            }
            _ => return Ok(()),
        };
        self.try_fire(&variable, queue)
    }

    fn state(&mut self, variable: &str) -> Result<&mut UtilState<U>, ProtocolError> {
        self.states
            .get_mut(variable)
            .ok_or_else(|| ProtocolError::NotOwned(variable.to_string()))
    }

    fn try_fire(&mut self, variable: &str, queue: &QueueHandle<U>) -> Result<(), ProtocolError> {
        let state = self.state(variable)?;
        let Some(node) = &state.node else {
            return Ok(());
        };
        if state.sent || !node.children.iter().all(|c| state.received.contains_key(c)) {
            return Ok(());
        }
        state.sent = true;
        let node = node.clone();
        let received = std::mem::take(&mut state.received);

        let own_domain = self
            .problem
            .domain(variable)
            .ok_or_else(|| ProtocolError::NotOwned(variable.to_string()))?
            .to_vec();
        let unary = UtilitySpace::constant(
            format!("unary_{variable}"),
            vec![variable.to_string()],
            vec![own_domain],
            U::zero(),
            self.problem.infeasible(),
        )?;

        let mut inputs: Vec<&UtilitySpace<U>> = vec![&unary];
        inputs.extend(
            self.problem
                .constraints_of(variable)
                .filter(|c| c.variables().iter().all(|v| v == variable || !node.is_below(v))),
        );
        for child in &node.children {
            if let Some(space) = received.get(child) {
                inputs.push(space);
            }
        }

        let joined = UtilitySpace::join_all(inputs.iter().copied(), Combine::Sum)?;
        let checks = (joined.size() * inputs.len()) as u64;
        queue.nccc().advance(checks);
        let (projected, table) = joined.project(&[variable], self.problem.direction())?;

        let scope: BTreeSet<String> = projected.variables().iter().cloned().collect();
        if scope != node.separator {
            return Err(ProtocolError::Violation(format!(
                "UTIL space of '{variable}' spans {scope:?}, separator is {:?}",
                node.separator
            )));
        }
        debug!(
            variable = %variable,
            inputs = inputs.len(),
            size = joined.size(),
            separator = ?node.separator,
            "UTIL computed"
        );

        self.store.store(variable, table)?;
        queue.send_to_self(Payload::OptTableStored {
            variable: variable.to_string(),
        })?;

        match &node.parent {
            Some(parent) => {
                let owner = owner_of(&self.problem, parent)?;
                let space = projected
                    .renamed(format!("util_{variable}"))
                    .with_owner(queue.agent().clone());
                queue.send(
                    owner,
                    Payload::Util {
                        from: variable.to_string(),
                        to: parent.clone(),
                        space,
                    },
                )?;
            }
            None => {
                let utility = projected.scalar_value().ok_or_else(|| {
                    ProtocolError::Violation(format!("root '{variable}' projected to a non-scalar space"))
                })?;
                info!(root = %variable, ?utility, "Optimal utility of tree");
                queue.send(
                    &AgentId::stats_monitor(),
                    Payload::OptimalUtility {
                        root: variable.to_string(),
                        utility,
                    },
                )?;
            }
        }
        report_finished(queue, MODULE, variable)
    }
}

impl<U: Addable> IncomingMessagePolicy<U> for UtilPropagation<U> {
    fn notify_in(&mut self, message: &Message<U>, queue: &QueueHandle<U>) {
        if let Err(e) = self.handle(message, queue) {
            report_fault(queue, MODULE, &e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::dfs::DfsGeneration;
    use super::super::election::LeaderElection;
    use super::super::testing::{chain_problem, collect_until, monitor_until, spawn_agent_queue};
    use super::*;
    use crate::domain::addable::Direction;
    use crate::domain::message::types;
    use crate::domain::problem::Problem;
    use crate::domain::variable::Variable;
    use crate::infrastructure::opt_store::InMemoryOptTableStore;
    use parking_lot::Mutex;

    fn install(view: &Arc<AgentProblem<i64>>, store: Arc<dyn OptTableStore>, handle: &QueueHandle<i64>) {
        let rounds = view.total_variables() as u32;
        handle.add_incoming_policy(
            &[&types::START, &types::ELECTION_SCORE],
            Arc::new(Mutex::new(LeaderElection::new(Arc::clone(view), rounds))),
        );
        handle.add_incoming_policy(
            &[&types::LEADER_ELECTED, &types::DFS],
            Arc::new(Mutex::new(DfsGeneration::new(Arc::clone(view)))),
        );
        handle.add_incoming_policy(
            &[&types::DFS_OUTPUT, &types::UTIL],
            Arc::new(Mutex::new(UtilPropagation::new(Arc::clone(view), store))),
        );
    }

    #[tokio::test]
    async fn test_chain_optimum_and_util_count() {
        let problem = chain_problem(&["a", "a", "a"]);
        let view = Arc::new(problem.agent_view(&AgentId::from("a")).unwrap());
        let store = Arc::new(InMemoryOptTableStore::new());
        let shared: Arc<dyn OptTableStore> = store.clone();
        let (mut queue, mut utils, mut monitor) =
            spawn_agent_queue(&view, &[&types::UTIL], |handle| install(&view, shared, handle));
        queue.handle().send_to_self(Payload::Start).unwrap();

        let optimum = monitor_until(&mut monitor, |p| match p {
            Payload::OptimalUtility { root, utility } => Some((root.clone(), *utility)),
            _ => None,
        })
        .await;
        assert_eq!(optimum, ("x2".to_string(), 0));

        let sent = collect_until(&mut utils, 2).await;
        let mut senders: Vec<String> = sent
            .iter()
            .map(|p| match p {
                Payload::Util { from, to, space } => {
                    assert_eq!(to, "x2");
                    assert_eq!(space.variables(), ["x2".to_string()]);
                    from.clone()
                }
                other => panic!("unexpected payload {other:?}"),
            })
            .collect();
        senders.sort();
        assert_eq!(senders, vec!["x1", "x3"]);
        assert_eq!(store.len(), 3);
        assert!(queue.handle().nccc().get() > 0);
        queue.end();
    }

    #[tokio::test]
    async fn test_maximize_with_back_edge() {
        // x1 + x2 + x3 when all differ, nothing otherwise.
        let mut problem = Problem::new("triangle", Direction::Maximize);
        for name in ["x1", "x2", "x3"] {
            problem
                .add_variable(Variable::new(name, vec![0, 1, 2], Some(AgentId::from("a"))))
                .unwrap();
        }
        problem
            .add_constraint_fn(&["x1", "x2"], |t| if t[0] != t[1] { t[0] + t[1] } else { 0 })
            .unwrap();
        problem
            .add_constraint_fn(&["x2", "x3"], |t| if t[0] != t[1] { t[1] } else { 0 })
            .unwrap();
        problem
            .add_constraint_fn(&["x1", "x3"], |t| i64::from(t[0] != t[1]) * 10)
            .unwrap();
        let (_, expected) = problem.brute_force().unwrap();

        let view = Arc::new(problem.agent_view(&AgentId::from("a")).unwrap());
        let store: Arc<dyn OptTableStore> = Arc::new(InMemoryOptTableStore::new());
        let (mut queue, _utils, mut monitor) =
            spawn_agent_queue(&view, &[&types::UTIL], |handle| install(&view, store, handle));
        queue.handle().send_to_self(Payload::Start).unwrap();

        let utility = monitor_until(&mut monitor, |p| match p {
            Payload::OptimalUtility { utility, .. } => Some(*utility),
            _ => None,
        })
        .await;
        assert_eq!(utility, expected);
        assert_eq!(utility, 13);
        queue.end();
    }
}
