// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Protocol Modules
//!
//! Each module is an [`IncomingMessagePolicy`](crate::infrastructure::IncomingMessagePolicy)
//! registered on an agent's queue. Modules never share state; they talk to
//! each other through messages, including messages an agent sends to itself.
//!
//! | Module | Consumes | Produces |
//! |--------|----------|----------|
//! | [`election`] | `START`, `ELECTION_SCORE` | `LEADER_ELECTED` |
//! | [`dfs`] | `LEADER_ELECTED`, `DFS_*` | `DFS_OUTPUT` |
//! | [`util`] | `DFS_OUTPUT`, `UTIL` | `UTIL`, `OPT_TABLE_STORED`, `OPTIMAL_UTILITY` |
//! | [`value`] | `DFS_OUTPUT`, `OPT_TABLE_STORED`, `VALUE` | `VALUE`, `ASSIGNMENT`, `AGENT_FINISHED` |
//!
//! [`agent::SolverAgent`] wires all four onto one queue.

pub mod election;
pub mod dfs;
pub mod util;
pub mod value;
pub mod agent;

pub use agent::SolverAgent;

use crate::domain::addable::Addable;
use crate::domain::message::{ModuleReport, Payload};
use crate::domain::problem::AgentProblem;
use crate::domain::utility::DomainError;
use crate::domain::variable::AgentId;
use crate::infrastructure::opt_store::StoreError;
use crate::infrastructure::queue::{QueueError, QueueHandle};
use thiserror::Error;
use tracing::{error, warn};

/// Failure of a protocol step. Always fatal for the solve: the agent reports
/// it to the stats monitor as an `AGENT_FAULT`.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("No owner known for variable '{0}'")]
    UnknownOwner(String),

    #[error("Variable '{0}' is not owned by this agent")]
    NotOwned(String),

    #[error("Protocol violation: {0}")]
    Violation(String),
}

/// Owning agent of a variable the caller is adjacent to.
pub(crate) fn owner_of<'a, U: Addable>(problem: &'a AgentProblem<U>, variable: &str) -> Result<&'a AgentId, ProtocolError> {
    problem
        .owner_of(variable)
        .ok_or_else(|| ProtocolError::UnknownOwner(variable.to_string()))
}

/// Tell the stats monitor that `module` finished for `variable`.
pub(crate) fn report_finished<U: Addable>(queue: &QueueHandle<U>, module: &str, variable: &str) -> Result<(), ProtocolError> {
    let report = ModuleReport::now(module, variable, queue.nccc().get());
    queue.send(&AgentId::stats_monitor(), Payload::ModuleFinished(report))?;
    Ok(())
}

/// Log a protocol failure and forward it to the stats monitor.
pub(crate) fn report_fault<U: Addable>(queue: &QueueHandle<U>, module: &str, fault: &ProtocolError) {
    error!(agent = %queue.agent(), module, error = %fault, "Protocol fault");
    let payload = Payload::AgentFault {
        agent: queue.agent().clone(),
        detail: format!("{module}: {fault}"),
    };
    if let Err(e) = queue.send(&AgentId::stats_monitor(), payload) {
        warn!(agent = %queue.agent(), error = %e, "Could not report protocol fault");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Single-queue fixtures for the protocol module tests.

    use crate::domain::addable::Direction;
    use crate::domain::message::{Message, MessageType, Payload};
    use crate::domain::problem::{AgentProblem, Problem};
    use crate::domain::variable::{AgentId, Variable};
    use crate::infrastructure::pipe::{mailbox, LocalPipe, MailboxReceiver};
    use crate::infrastructure::queue::{IncomingMessagePolicy, Queue, QueueHandle};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// `x1 - x2 - ... - xn`, domains {0, 1, 2}, cost 1 when neighbours are equal.
    pub fn chain_problem(owners: &[&str]) -> Problem<i64> {
        let mut problem = Problem::new("chain", Direction::Minimize);
        for (i, owner) in owners.iter().enumerate() {
            let variable = Variable::new(format!("x{}", i + 1), vec![0, 1, 2], Some(AgentId::from(*owner)));
            problem.add_variable(variable).unwrap();
        }
        for i in 1..owners.len() {
            let (left, right) = (format!("x{i}"), format!("x{}", i + 1));
            problem
                .add_constraint_fn(&[left.as_str(), right.as_str()], |t| i64::from(t[0] == t[1]))
                .unwrap();
        }
        problem
    }

    /// `hub` linked to `l1`, `l2`, `l3`, everything owned by agent `a`.
    pub fn star_problem() -> Problem<i64> {
        let mut problem = Problem::new("star", Direction::Minimize);
        for name in ["hub", "l1", "l2", "l3"] {
            problem
                .add_variable(Variable::new(name, vec![0, 1], Some(AgentId::from("a"))))
                .unwrap();
        }
        for leaf in ["l1", "l2", "l3"] {
            problem
                .add_constraint_fn(&["hub", leaf], |t| i64::from(t[0] == t[1]))
                .unwrap();
        }
        problem
    }

    struct Forward(mpsc::UnboundedSender<Payload<i64>>);

    impl IncomingMessagePolicy<i64> for Forward {
        fn notify_in(&mut self, message: &Message<i64>, _queue: &QueueHandle<i64>) {
            let _ = self.0.send(message.payload.clone());
        }
    }

    /// Queue of `view`'s agent with the modules installed by `register`, a
    /// stats-monitor pipe, and every `observed` message forwarded to a channel.
    pub fn spawn_agent_queue<F>(
        view: &AgentProblem<i64>,
        observed: &[&'static MessageType],
        register: F,
    ) -> (Queue<i64>, mpsc::UnboundedReceiver<Payload<i64>>, MailboxReceiver<i64>)
    where
        F: FnOnce(&QueueHandle<i64>),
    {
        let mut queue = Queue::new(view.agent().clone(), view.nccc().clone(), None);
        let (monitor_tx, monitor_rx) = mailbox();
        queue.handle().add_output_pipe(
            AgentId::stats_monitor(),
            Arc::new(LocalPipe::new(AgentId::stats_monitor(), monitor_tx)),
        );
        register(queue.handle());
        let (tx, rx) = mpsc::unbounded_channel();
        queue.handle().add_incoming_policy(observed, Arc::new(Mutex::new(Forward(tx))));
        queue.start();
        (queue, rx, monitor_rx)
    }

    /// Read monitor traffic until `pick` accepts a payload.
    pub async fn monitor_until<T, F>(monitor: &mut MailboxReceiver<i64>, mut pick: F) -> T
    where
        F: FnMut(&Payload<i64>) -> Option<T>,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let message = monitor.recv().await.expect("monitor closed");
                if let Some(found) = pick(&message.payload) {
                    return found;
                }
            }
        })
        .await
        .expect("timed out waiting for a monitor report")
    }

    pub async fn collect_until(rx: &mut mpsc::UnboundedReceiver<Payload<i64>>, count: usize) -> Vec<Payload<i64>> {
        let mut collected = Vec::with_capacity(count);
        while collected.len() < count {
            let payload = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for protocol output")
                .expect("queue stopped");
            collected.push(payload);
        }
        collected
    }
}
