// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Leader election by max-flooding.
//!
//! Every variable repeatedly sends the best [`ElectionScore`] it has seen to
//! all its neighbours, for a fixed number of rounds. After `rounds` rounds
//! the score of the best variable within `rounds` hops has reached every
//! variable, so as long as `rounds` is at least the diameter of the
//! component, all its variables agree on one leader: the variable with the
//! highest degree, ties going to the greatest name.
//!
//! Channels are FIFO but a neighbour may be one round ahead, so received
//! scores are buffered per round.

use super::{owner_of, report_fault, report_finished, ProtocolError};
use crate::domain::addable::Addable;
use crate::domain::message::{Message, Payload};
use crate::domain::problem::AgentProblem;
use crate::domain::pseudo_tree::ElectionScore;
use crate::infrastructure::queue::{IncomingMessagePolicy, QueueHandle};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

pub const MODULE: &str = "election";

#[derive(Debug)]
struct Candidate {
    variable: String,
    neighbors: Vec<String>,
    best: ElectionScore,
    /// Rounds merged so far.
    round: u32,
    inbox: BTreeMap<u32, Vec<ElectionScore>>,
    concluded: bool,
}

pub struct LeaderElection<U> {
    problem: Arc<AgentProblem<U>>,
    rounds: u32,
    started: bool,
    candidates: BTreeMap<String, Candidate>,
}

impl<U: Addable> LeaderElection<U> {
    pub fn new(problem: Arc<AgentProblem<U>>, rounds: u32) -> Self {
        let candidates = problem
            .variables()
            .iter()
            .map(|v| {
                let neighbors: Vec<String> = problem.neighbors(&v.name).iter().cloned().collect();
                let candidate = Candidate {
                    variable: v.name.clone(),
                    best: ElectionScore::new(neighbors.len(), v.name.clone()),
                    neighbors,
                    round: 0,
                    inbox: BTreeMap::new(),
                    concluded: false,
                };
                (v.name.clone(), candidate)
            })
            .collect();
        Self {
            problem,
            rounds,
            started: false,
            candidates,
        }
    }

    fn handle(&mut self, message: &Message<U>, queue: &QueueHandle<U>) -> Result<(), ProtocolError> {
        match &message.payload {
            Payload::Start => {
                if self.started {
                    return Ok(());
                }
                self.started = true;
                debug!(agent = %queue.agent(), rounds = self.rounds, "Starting leader election");
                let names: Vec<String> = self.candidates.keys().cloned().collect();
                for name in names {
                    if self.rounds > 0 {
                        self.broadcast(&name, queue)?;
                    }
                    self.advance(&name, queue)?;
                }
            }
            Payload::ElectionScore { to, round, score, .. } => {
                let candidate = self
                    .candidates
                    .get_mut(to)
                    .ok_or_else(|| ProtocolError::NotOwned(to.clone()))?;
                candidate.inbox.entry(*round).or_default().push(score.clone());
                if self.started {
                    self.advance(to, queue)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Send the current best of `name` to every neighbour, tagged with the
    /// current round.
    fn broadcast(&self, name: &str, queue: &QueueHandle<U>) -> Result<(), ProtocolError> {
        let candidate = &self.candidates[name];
        for neighbor in &candidate.neighbors {
            let owner = owner_of(&self.problem, neighbor)?;
            queue.send(
                owner,
                Payload::ElectionScore {
                    from: name.to_string(),
                    to: neighbor.clone(),
                    round: candidate.round,
                    score: candidate.best.clone(),
                },
            )?;
        }
        Ok(())
    }

    /// Merge every complete round, then conclude once the budget is spent.
    fn advance(&mut self, name: &str, queue: &QueueHandle<U>) -> Result<(), ProtocolError> {
        loop {
            let candidate = self
                .candidates
                .get_mut(name)
                .ok_or_else(|| ProtocolError::NotOwned(name.to_string()))?;
            if candidate.concluded {
                return Ok(());
            }
            if candidate.round >= self.rounds || candidate.neighbors.is_empty() {
                return self.conclude(name, queue);
            }
            let complete = candidate
                .inbox
                .get(&candidate.round)
                .is_some_and(|scores| scores.len() == candidate.neighbors.len());
            if !complete {
                return Ok(());
            }

            let scores = candidate.inbox.remove(&candidate.round).unwrap_or_default();
            for score in scores {
                if score > candidate.best {
                    candidate.best = score;
                }
            }
            candidate.round += 1;
            if candidate.round < self.rounds {
                self.broadcast(name, queue)?;
            }
        }
    }

    fn conclude(&mut self, name: &str, queue: &QueueHandle<U>) -> Result<(), ProtocolError> {
        let candidate = self
            .candidates
            .get_mut(name)
            .ok_or_else(|| ProtocolError::NotOwned(name.to_string()))?;
        candidate.concluded = true;
        let leader = candidate.best.variable.clone();
        let is_root = leader == candidate.variable;
        info!(variable = %name, leader = %leader, is_root, "Leader elected");

        queue.send_to_self(Payload::LeaderElected {
            variable: name.to_string(),
            leader,
            is_root,
        })?;
        report_finished(queue, MODULE, name)
    }
}

impl<U: Addable> IncomingMessagePolicy<U> for LeaderElection<U> {
    fn notify_in(&mut self, message: &Message<U>, queue: &QueueHandle<U>) {
        if let Err(e) = self.handle(message, queue) {
            report_fault(queue, MODULE, &e);
        }
    }
}
