// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! VALUE propagation, top-down.
//!
//! A node fires once it knows its pseudo-tree node, its opt table has been
//! stored, and it has a context: the empty assignment for roots, the
//! parent's VALUE message otherwise. It looks its own value up in the table,
//! reports it, and sends each child the values of that child's separator.
//! Tables are deleted from the store once read.

use super::{owner_of, report_fault, report_finished, ProtocolError};
use crate::domain::addable::Addable;
use crate::domain::message::{Message, Payload};
use crate::domain::problem::AgentProblem;
use crate::domain::pseudo_tree::PseudoTreeNode;
use crate::domain::variable::{AgentId, Assignment};
use crate::infrastructure::opt_store::OptTableStore;
use crate::infrastructure::queue::{IncomingMessagePolicy, QueueHandle};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

pub const MODULE: &str = "value";

#[derive(Debug, Default)]
struct ValueState {
    node: Option<PseudoTreeNode>,
    table_ready: bool,
    context: Option<Assignment>,
    done: bool,
}

pub struct ValuePropagation<U> {
    problem: Arc<AgentProblem<U>>,
    store: Arc<dyn OptTableStore>,
    states: BTreeMap<String, ValueState>,
    remaining: usize,
}

impl<U: Addable> ValuePropagation<U> {
    pub fn new(problem: Arc<AgentProblem<U>>, store: Arc<dyn OptTableStore>) -> Self {
        let states: BTreeMap<String, ValueState> = problem
            .variables()
            .iter()
            .map(|v| (v.name.clone(), ValueState::default()))
            .collect();
        let remaining = states.len();
        Self {
            problem,
            store,
            states,
            remaining,
        }
    }

    fn state(&mut self, variable: &str) -> Result<&mut ValueState, ProtocolError> {
        self.states
            .get_mut(variable)
            .ok_or_else(|| ProtocolError::NotOwned(variable.to_string()))
    }

    fn handle(&mut self, message: &Message<U>, queue: &QueueHandle<U>) -> Result<(), ProtocolError> {
        let variable = match &message.payload {
            Payload::DfsOutput(node) => {
                let state = self.state(&node.variable)?;
                if node.is_root() {
                    state.context = Some(Assignment::new());
                }
                state.node = Some(node.clone());
                node.variable.clone()
            }
            Payload::OptTableStored { variable } => {
                self.state(variable)?.table_ready = true;
                variable.clone()
            }
            Payload::Value { from, to, assignment } => {
                let state = self.state(to)?;
                if state.context.is_some() {
                    return Err(ProtocolError::Violation(format!("second VALUE from '{from}' to '{to}'")));
                }
                state.context = Some(assignment.clone());
                to.clone()
            }
            _ => return Ok(()),
        };
        self.try_fire(&variable, queue)
    }

    fn try_fire(&mut self, variable: &str, queue: &QueueHandle<U>) -> Result<(), ProtocolError> {
        let state = self.state(variable)?;
        let (Some(node), Some(context)) = (&state.node, &state.context) else {
            return Ok(());
        };
        if state.done || !state.table_ready {
            return Ok(());
        }
        let node = node.clone();
        let mut assignment = context.clone();
        state.done = true;

        let table = self.store.load(variable)?;
        self.store.delete(variable)?;
        let chosen = table.resolve(&assignment)?;
        let value = chosen
            .get(variable)
            .copied()
            .ok_or_else(|| ProtocolError::Violation(format!("opt table of '{variable}' does not choose it")))?;
        assignment.extend(chosen);
        debug!(variable = %variable, value, "VALUE chosen");

        queue.send(
            &AgentId::stats_monitor(),
            Payload::Assignment {
                variable: variable.to_string(),
                value,
            },
        )?;

        for child in &node.children {
            let separator = node.child_separators.get(child).ok_or_else(|| {
                ProtocolError::Violation(format!("no separator recorded for child '{child}' of '{variable}'"))
            })?;
            let restricted: Assignment = separator
                .iter()
                .filter_map(|v| assignment.get(v).map(|value| (v.clone(), *value)))
                .collect();
            if restricted.len() != separator.len() {
                return Err(ProtocolError::Violation(format!(
                    "context of '{variable}' misses part of the separator of '{child}'"
                )));
            }
            let owner = owner_of(&self.problem, child)?;
            queue.send(
                owner,
                Payload::Value {
                    from: variable.to_string(),
                    to: child.clone(),
                    assignment: restricted,
                },
            )?;
        }
        report_finished(queue, MODULE, variable)?;

        self.remaining -= 1;
        if self.remaining == 0 {
            info!(agent = %queue.agent(), "All variables assigned");
            queue.send(
                &AgentId::stats_monitor(),
                Payload::AgentFinished {
                    agent: queue.agent().clone(),
                },
            )?;
        }
        Ok(())
    }
}

impl<U: Addable> IncomingMessagePolicy<U> for ValuePropagation<U> {
    fn notify_in(&mut self, message: &Message<U>, queue: &QueueHandle<U>) {
        if let Err(e) = self.handle(message, queue) {
            report_fault(queue, MODULE, &e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{chain_problem, collect_until, monitor_until, spawn_agent_queue};
    use super::*;
    use crate::domain::message::types;
    use crate::domain::utility::UtilitySpace;
    use crate::infrastructure::opt_store::InMemoryOptTableStore;
    use parking_lot::Mutex;
    use std::collections::BTreeSet;

    fn node(variable: &str, parent: Option<&str>, children: &[(&str, &[&str])]) -> PseudoTreeNode {
        let mut node = PseudoTreeNode::new(variable);
        node.parent = parent.map(str::to_string);
        for (child, separator) in children {
            node.children.push(child.to_string());
            node.child_separators.insert(
                child.to_string(),
                separator.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
            );
        }
        node
    }

    #[tokio::test]
    async fn test_root_sends_restricted_context_to_children() {
        let problem = chain_problem(&["a", "a", "a"]);
        let view = Arc::new(problem.agent_view(&AgentId::from("a")).unwrap());
        let store = Arc::new(InMemoryOptTableStore::new());

        // Root x2 prefers 1; its children prefer anything but x2's value.
        let root = UtilitySpace::from_fn("r", vec!["x2".into()], vec![vec![0, 1, 2]], i64::MAX, |t| {
            i64::from(t[0] != 1)
        })
        .unwrap();
        let (_, root_table) = root.project(&["x2"], view.direction()).unwrap();
        store.store("x2", root_table).unwrap();
        for leaf in ["x1", "x3"] {
            let space = UtilitySpace::from_fn(
                leaf,
                vec!["x2".into(), leaf.into()],
                vec![vec![0, 1, 2], vec![0, 1, 2]],
                i64::MAX,
                |t| i64::from(t[0] == t[1]),
            )
            .unwrap();
            let (_, table) = space.project(&[leaf], view.direction()).unwrap();
            store.store(leaf, table).unwrap();
        }

        let shared: Arc<dyn OptTableStore> = store.clone();
        let (mut queue, mut values, mut monitor) = spawn_agent_queue(&view, &[&types::VALUE], |handle| {
            handle.add_incoming_policy(
                &[&types::DFS_OUTPUT, &types::OPT_TABLE_STORED, &types::VALUE],
                Arc::new(Mutex::new(ValuePropagation::new(Arc::clone(&view), shared))),
            );
        });
        let handle = queue.handle().clone();
        handle
            .send_to_self(Payload::DfsOutput(node("x2", None, &[("x1", &["x2"]), ("x3", &["x2"])])))
            .unwrap();
        handle.send_to_self(Payload::DfsOutput(node("x1", Some("x2"), &[]))).unwrap();
        handle.send_to_self(Payload::DfsOutput(node("x3", Some("x2"), &[]))).unwrap();
        for variable in ["x1", "x2", "x3"] {
            handle
                .send_to_self(Payload::OptTableStored {
                    variable: variable.to_string(),
                })
                .unwrap();
        }

        let sent = collect_until(&mut values, 2).await;
        for payload in &sent {
            match payload {
                Payload::Value { from, assignment, .. } => {
                    assert_eq!(from, "x2");
                    assert_eq!(assignment, &Assignment::from([("x2".to_string(), 1)]));
                }
                other => panic!("unexpected payload {other:?}"),
            }
        }

        let mut assigned = Assignment::new();
        let agent = monitor_until(&mut monitor, |p| match p {
            Payload::Assignment { variable, value } => {
                assigned.insert(variable.clone(), *value);
                None
            }
            Payload::AgentFinished { agent } => Some(agent.clone()),
            _ => None,
        })
        .await;
        assert_eq!(agent, AgentId::from("a"));
        assert_eq!(assigned, Assignment::from([("x1".into(), 0), ("x2".into(), 1), ("x3".into(), 0)]));
        assert!(store.is_empty());
        queue.end();
    }

    #[tokio::test]
    async fn test_missing_table_is_reported_as_fault() {
        let problem = chain_problem(&["a"]);
        let view = Arc::new(problem.agent_view(&AgentId::from("a")).unwrap());
        let store: Arc<dyn OptTableStore> = Arc::new(InMemoryOptTableStore::new());
        let (mut queue, _values, mut monitor) = spawn_agent_queue(&view, &[&types::VALUE], |handle| {
            handle.add_incoming_policy(
                &[&types::DFS_OUTPUT, &types::OPT_TABLE_STORED, &types::VALUE],
                Arc::new(Mutex::new(ValuePropagation::new(Arc::clone(&view), store))),
            );
        });
        let handle = queue.handle().clone();
        handle.send_to_self(Payload::DfsOutput(node("x1", None, &[]))).unwrap();
        handle
            .send_to_self(Payload::OptTableStored { variable: "x1".into() })
            .unwrap();

        let detail = monitor_until(&mut monitor, |p| match p {
            Payload::AgentFault { detail, .. } => Some(detail.clone()),
            _ => None,
        })
        .await;
        assert!(detail.starts_with("value:"));
        queue.end();
    }
}
