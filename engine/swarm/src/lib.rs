// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `dcop-swarm`: In-Process Agent Swarms
//!
//! Deploys one [`dcop_core::application::SolverAgent`] per agent of a
//! problem, wires their queues together and drives a DPOP solve to
//! completion, collecting what the agents report to the stats monitor.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `SwarmId`, `SolveReport`, `SolveOutcome`, `SwarmError` |
//! | [`application`] | Application | `Swarm`, `ReportCollector`, `DcopSolver` service trait |
//!
//! ## Solve Lifecycle
//!
//! 1. [`Swarm::deploy`](application::Swarm::deploy) checks ownership, builds
//!    the per-agent views and connects every pair of agents plus the
//!    monitor with local pipes.
//! 2. [`Swarm::solve`](application::Swarm::solve) starts the queues,
//!    broadcasts `START` and reads monitor traffic until every agent has
//!    reported `AGENT_FINISHED`, a fault surfaces, or the timeout expires.
//! 3. Every agent then receives `FINISHED` and its queue is ended.

pub mod domain;
pub mod application;

pub use domain::*;
