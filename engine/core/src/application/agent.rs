// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! A DPOP agent: one queue with the four protocol modules registered on it.

use super::dfs::DfsGeneration;
use super::election::LeaderElection;
use super::util::UtilPropagation;
use super::value::ValuePropagation;
use crate::domain::addable::Addable;
use crate::domain::config::SolverConfig;
use crate::domain::message::types;
use crate::domain::problem::AgentProblem;
use crate::domain::variable::AgentId;
use crate::infrastructure::opt_store::{build_store, OptTableStore, StoreError};
use crate::infrastructure::queue::{Queue, QueueHandle, TraceOutgoing};
use crate::infrastructure::stats::MessageStats;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

pub struct SolverAgent<U> {
    problem: Arc<AgentProblem<U>>,
    queue: Queue<U>,
    store: Arc<dyn OptTableStore>,
}

impl<U: Addable> SolverAgent<U> {
    /// Build the agent and register its modules. Pipes to other agents are
    /// added afterwards through [`handle`](Self::handle).
    pub fn new(problem: AgentProblem<U>, config: &SolverConfig, stats: Option<Arc<MessageStats>>) -> Result<Self, StoreError> {
        let problem = Arc::new(problem);
        let store = build_store(&config.opt_table_store, problem.agent())?;
        let queue = Queue::new(problem.agent().clone(), problem.nccc().clone(), stats);
        let handle = queue.handle();

        let rounds = config.election_rounds_for(problem.total_variables());
        handle.add_incoming_policy(
            &[&types::START, &types::ELECTION_SCORE],
            Arc::new(Mutex::new(LeaderElection::new(Arc::clone(&problem), rounds))),
        );
        handle.add_incoming_policy(
            &[&types::LEADER_ELECTED, &types::DFS],
            Arc::new(Mutex::new(DfsGeneration::new(Arc::clone(&problem)))),
        );
        handle.add_incoming_policy(
            &[&types::DFS_OUTPUT, &types::UTIL],
            Arc::new(Mutex::new(UtilPropagation::new(Arc::clone(&problem), Arc::clone(&store)))),
        );
        handle.add_incoming_policy(
            &[&types::DFS_OUTPUT, &types::OPT_TABLE_STORED, &types::VALUE],
            Arc::new(Mutex::new(ValuePropagation::new(Arc::clone(&problem), Arc::clone(&store)))),
        );
        if config.trace_messages {
            handle.add_outgoing_policy(&[&types::ANY], Arc::new(Mutex::new(TraceOutgoing)));
        }

        info!(
            agent = %problem.agent(),
            variables = problem.variables().len(),
            election_rounds = rounds,
            "Agent created"
        );
        Ok(Self { problem, queue, store })
    }

    pub fn agent(&self) -> &AgentId {
        self.problem.agent()
    }

    pub fn problem(&self) -> &AgentProblem<U> {
        &self.problem
    }

    pub fn handle(&self) -> &QueueHandle<U> {
        self.queue.handle()
    }

    pub fn store(&self) -> &Arc<dyn OptTableStore> {
        &self.store
    }

    pub fn is_running(&self) -> bool {
        self.queue.is_running()
    }

    pub fn start(&mut self) {
        self.queue.start();
    }

    /// Hard stop; see [`Queue::end`].
    pub fn end(&mut self) {
        self.queue.end();
    }

    /// Wait for the worker to exit after `FINISHED`.
    pub async fn join(&mut self) {
        self.queue.join().await;
    }
}
