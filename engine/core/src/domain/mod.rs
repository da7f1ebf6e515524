// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Layer
//!
//! Pure types for the solving engine. No I/O apart from config file loading.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`addable`] | `Addable`, `Direction` |
//! | [`variable`] | `Variable`, `AgentId`, `Assignment` |
//! | [`utility`] | `UtilitySpace`, `OptTable`, `DomainError` |
//! | [`problem`] | `Problem`, `AgentProblem`, `NcccClock`, `NameAllocator` |
//! | [`pseudo_tree`] | `PseudoTreeNode`, `PseudoTree`, `ElectionScore` |
//! | [`message`] | `MessageType`, `Message`, `Payload` |
//! | [`config`] | `SolverConfig` |

pub mod addable;
pub mod variable;
pub mod utility;
pub mod problem;
pub mod pseudo_tree;
pub mod message;
pub mod config;

pub use addable::{Addable, Direction};
pub use variable::{AgentId, Assignment, Value, Variable};
pub use utility::{Combine, DomainError, OptTable, UtilitySpace};
pub use problem::{AgentProblem, NameAllocator, NcccClock, Problem, ProblemError};
pub use pseudo_tree::{DfsPhase, EdgeOutcome, ElectionScore, PseudoTree, PseudoTreeError, PseudoTreeNode};
pub use message::{types, Message, MessageType, ModuleReport, Payload};
pub use config::{OptTableStoreConfig, SolverConfig};
