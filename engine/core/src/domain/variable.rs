// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Variables and Agents
//!
//! - [`AgentId`]: name of an agent; one message queue per agent.
//! - [`Variable`]: decision variable with an ordered domain and its owner.
//! - [`Assignment`]: variable name → chosen value.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single domain value.
pub type Value = i64;

/// Partial or complete assignment of values to variables.
pub type Assignment = BTreeMap<String, Value>;

const STATS_MONITOR: &str = "__stats_monitor__";

/// Identifier of an agent participating in a solve.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Reserved recipient collecting assignments and completion reports.
    /// Messages sent to it are never counted in the message statistics.
    pub fn stats_monitor() -> Self {
        Self(STATS_MONITOR.to_string())
    }

    pub fn is_reserved(&self) -> bool {
        self.0 == STATS_MONITOR
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// A decision variable.
///
/// `owner == None` marks a shared (random) variable; such variables cannot be
/// deployed for DPOP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub domain: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<AgentId>,
}

impl Variable {
    pub fn new(name: impl Into<String>, domain: Vec<Value>, owner: Option<AgentId>) -> Self {
        Self {
            name: name.into(),
            domain,
            owner,
        }
    }

    pub fn domain_size(&self) -> usize {
        self.domain.len()
    }

    /// Position of `value` in the domain.
    pub fn index_of(&self, value: Value) -> Option<usize> {
        self.domain.iter().position(|v| *v == value)
    }
}
