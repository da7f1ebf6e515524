// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Domain Layer
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`swarm`] | `SwarmId`, `SolveReport`, `SolveOutcome`, `SwarmError` |

pub mod swarm;

pub use swarm::*;
