// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! In-process deployment of one solver agent per problem agent.

use super::collector::ReportCollector;
use crate::domain::{SolveOutcome, SwarmError, SwarmId};
use dcop_core::application::SolverAgent;
use dcop_core::domain::{Addable, AgentId, Direction, Payload, Problem, SolverConfig};
use dcop_core::infrastructure::{mailbox, LocalPipe, MailboxReceiver, MessageStats};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How long an agent gets to drain its mailbox after `FINISHED`.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

pub struct Swarm<U: Addable> {
    id: SwarmId,
    problem: String,
    direction: Direction,
    agents: BTreeMap<AgentId, SolverAgent<U>>,
    monitor: MailboxReceiver<U>,
    stats: Option<Arc<MessageStats>>,
}

impl<U: Addable> Swarm<U> {
    /// Build and wire every agent. Nothing runs until [`solve`](Self::solve).
    pub fn deploy(problem: &Problem<U>, config: &SolverConfig) -> Result<Self, SwarmError> {
        problem.ensure_owned()?;
        let id = SwarmId::new();
        let stats = config.collect_stats.then(|| Arc::new(MessageStats::new()));

        let mut agents = BTreeMap::new();
        for agent in problem.agents() {
            let view = problem.agent_view(&agent)?;
            let solver = SolverAgent::new(view, config, stats.clone())?;
            agents.insert(agent, solver);
        }

        let (monitor_tx, monitor) = mailbox();
        for (id, agent) in &agents {
            for (other_id, other) in &agents {
                if id != other_id {
                    agent
                        .handle()
                        .add_output_pipe(other_id.clone(), Arc::new(other.handle().local_pipe()));
                }
            }
            agent.handle().add_output_pipe(
                AgentId::stats_monitor(),
                Arc::new(LocalPipe::new(AgentId::stats_monitor(), monitor_tx.clone())),
            );
        }

        info!(
            swarm_id = %id,
            problem = %problem.name(),
            agents = agents.len(),
            variables = problem.variables().len(),
            constraints = problem.constraints().len(),
            "Swarm deployed"
        );
        Ok(Self {
            id,
            problem: problem.name().to_string(),
            direction: problem.direction(),
            agents,
            monitor,
            stats,
        })
    }

    pub fn id(&self) -> SwarmId {
        self.id
    }

    pub fn agent(&self, id: &AgentId) -> Option<&SolverAgent<U>> {
        self.agents.get(id)
    }

    pub fn agents(&self) -> impl Iterator<Item = &SolverAgent<U>> {
        self.agents.values()
    }

    /// Run the solve to completion, a fault, or `timeout`. The swarm is shut
    /// down in every case.
    pub async fn solve(mut self, timeout: Duration) -> Result<SolveOutcome<U>, SwarmError> {
        let started = Instant::now();
        let mut collector = ReportCollector::new(
            self.id,
            self.problem.clone(),
            self.direction,
            self.agents.keys().cloned(),
        );

        let run = self.run(&mut collector, timeout).await;
        let nccc: BTreeMap<AgentId, u64> = self
            .agents
            .iter()
            .map(|(id, agent)| (id.clone(), agent.problem().nccc().get()))
            .collect();
        self.shutdown().await;

        let messages = self.stats.as_ref().map(|s| s.snapshot()).unwrap_or_default();
        let elapsed = started.elapsed();
        metrics::histogram!("dcop_solve_duration_seconds").record(elapsed.as_secs_f64());
        let report = collector.into_report(nccc, messages, elapsed);

        match run {
            Ok(true) => {
                metrics::counter!("dcop_solves_total", "outcome" => "solved").increment(1);
                info!(
                    swarm_id = %self.id,
                    utility = ?report.utility(),
                    nccc = report.max_nccc(),
                    messages = report.messages.total_messages(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Solve complete"
                );
                Ok(SolveOutcome::Solved(report))
            }
            Ok(false) => {
                metrics::counter!("dcop_solves_total", "outcome" => "timed_out").increment(1);
                warn!(
                    swarm_id = %self.id,
                    timeout_ms = timeout.as_millis() as u64,
                    assigned = report.assignment.len(),
                    "Solve timed out"
                );
                Ok(SolveOutcome::TimedOut(report))
            }
            Err(e) => {
                metrics::counter!("dcop_solves_total", "outcome" => "failed").increment(1);
                Err(e)
            }
        }
    }

    /// `Ok(true)` when every agent finished, `Ok(false)` on timeout.
    async fn run(&mut self, collector: &mut ReportCollector<U>, timeout: Duration) -> Result<bool, SwarmError> {
        for agent in self.agents.values_mut() {
            agent.start();
        }
        for agent in self.agents.values() {
            agent.handle().send_to_self(Payload::Start)?;
        }

        let monitor = &mut self.monitor;
        let collect = async {
            while !collector.is_complete() {
                let message = monitor.recv().await.ok_or(SwarmError::MonitorClosed)?;
                collector.absorb(message)?;
            }
            Ok::<(), SwarmError>(())
        };
        match tokio::time::timeout(timeout, collect).await {
            Ok(result) => result.map(|()| true),
            Err(_) => {
                let pending: Vec<String> = collector.pending().map(ToString::to_string).collect();
                debug!(?pending, "Agents still running at the deadline");
                Ok(false)
            }
        }
    }

    /// Cooperative `FINISHED`, a short drain, then a hard stop.
    async fn shutdown(&mut self) {
        for agent in self.agents.values() {
            if let Err(e) = agent.handle().send_to_self(Payload::Finished) {
                debug!(agent = %agent.agent(), error = %e, "Could not deliver FINISHED");
            }
        }
        for agent in self.agents.values_mut() {
            if tokio::time::timeout(DRAIN_TIMEOUT, agent.join()).await.is_err() {
                warn!(agent = %agent.agent(), "Agent did not stop after FINISHED");
            }
            agent.end();
        }
        debug!(swarm_id = %self.id, "Swarm shut down");
    }
}
