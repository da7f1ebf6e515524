// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `dcop-core`: DPOP Solving Engine Core
//!
//! Everything a single agent needs to take part in a distributed DPOP solve:
//! the utility-space algebra, the per-agent message runtime and the protocol
//! modules layered on top of it.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `Addable`, `UtilitySpace`, `Problem`, `PseudoTreeNode`, messages, config |
//! | [`infrastructure`] | Infrastructure | `Queue`, pipes, `MessageStats`, opt-table stores |
//! | [`application`] | Application | leader election, DFS, UTIL and VALUE propagation, `SolverAgent` |
//!
//! Deployment of many agents and the solve controller live in `dcop-swarm`.

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
