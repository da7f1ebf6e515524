// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Messages
//!
//! Every exchange between agents is a [`Message`]: a [`Payload`], the sending
//! agent and the sender's NCCC stamp. The payload determines a static
//! [`MessageType`] whose parent chain drives hierarchical dispatch: a policy
//! registered for `DPOP` also sees `UTIL` and `VALUE`.
//!
//! ```text
//! ANY
//! ├── CONTROL ── START, FINISHED
//! ├── ELECTION ── ELECTION_SCORE, LEADER_ELECTED
//! ├── DFS ── DFS_CHILD, DFS_PSEUDO, DFS_DONE
//! ├── DFS_OUTPUT
//! ├── DPOP ── UTIL, OPT_TABLE_STORED, VALUE
//! └── REPORT ── ASSIGNMENT, OPTIMAL_UTILITY, MODULE_FINISHED,
//!               AGENT_FINISHED, TREE_ERROR, AGENT_FAULT
//! ```

use crate::domain::addable::Addable;
use crate::domain::pseudo_tree::{ElectionScore, PseudoTreeNode};
use crate::domain::utility::UtilitySpace;
use crate::domain::variable::{AgentId, Assignment, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Node of the static message-type hierarchy.
#[derive(Debug, PartialEq, Eq)]
pub struct MessageType {
    name: &'static str,
    parent: Option<&'static MessageType>,
}

impl MessageType {
    pub const fn new(name: &'static str, parent: Option<&'static MessageType>) -> Self {
        Self { name, parent }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn parent(&self) -> Option<&'static MessageType> {
        self.parent
    }

    /// This type followed by its ancestors, most specific first.
    pub fn lineage(&'static self) -> impl Iterator<Item = &'static MessageType> {
        std::iter::successors(Some(self), |t| t.parent)
    }

    /// `true` if `self` is `other` or one of its subtypes.
    pub fn is_a(&'static self, other: &MessageType) -> bool {
        self.lineage().any(|t| t.name == other.name)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// The message-type hierarchy.
pub mod types {
    use super::MessageType;

    pub static ANY: MessageType = MessageType::new("ANY", None);

    pub static CONTROL: MessageType = MessageType::new("CONTROL", Some(&ANY));
    pub static START: MessageType = MessageType::new("START", Some(&CONTROL));
    pub static FINISHED: MessageType = MessageType::new("FINISHED", Some(&CONTROL));

    pub static ELECTION: MessageType = MessageType::new("ELECTION", Some(&ANY));
    pub static ELECTION_SCORE: MessageType = MessageType::new("ELECTION_SCORE", Some(&ELECTION));
    pub static LEADER_ELECTED: MessageType = MessageType::new("LEADER_ELECTED", Some(&ELECTION));

    pub static DFS: MessageType = MessageType::new("DFS", Some(&ANY));
    pub static DFS_CHILD: MessageType = MessageType::new("DFS_CHILD", Some(&DFS));
    pub static DFS_PSEUDO: MessageType = MessageType::new("DFS_PSEUDO", Some(&DFS));
    pub static DFS_DONE: MessageType = MessageType::new("DFS_DONE", Some(&DFS));
    pub static DFS_OUTPUT: MessageType = MessageType::new("DFS_OUTPUT", Some(&ANY));

    pub static DPOP: MessageType = MessageType::new("DPOP", Some(&ANY));
    pub static UTIL: MessageType = MessageType::new("UTIL", Some(&DPOP));
    pub static OPT_TABLE_STORED: MessageType = MessageType::new("OPT_TABLE_STORED", Some(&DPOP));
    pub static VALUE: MessageType = MessageType::new("VALUE", Some(&DPOP));

    pub static REPORT: MessageType = MessageType::new("REPORT", Some(&ANY));
    pub static ASSIGNMENT: MessageType = MessageType::new("ASSIGNMENT", Some(&REPORT));
    pub static OPTIMAL_UTILITY: MessageType = MessageType::new("OPTIMAL_UTILITY", Some(&REPORT));
    pub static MODULE_FINISHED: MessageType = MessageType::new("MODULE_FINISHED", Some(&REPORT));
    pub static AGENT_FINISHED: MessageType = MessageType::new("AGENT_FINISHED", Some(&REPORT));
    pub static TREE_ERROR: MessageType = MessageType::new("TREE_ERROR", Some(&REPORT));
    pub static AGENT_FAULT: MessageType = MessageType::new("AGENT_FAULT", Some(&REPORT));
}

/// Completion record of one protocol module for one variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleReport {
    pub module: String,
    pub variable: String,
    pub nccc: u64,
    pub at: DateTime<Utc>,
}

impl ModuleReport {
    pub fn now(module: impl Into<String>, variable: impl Into<String>, nccc: u64) -> Self {
        Self {
            module: module.into(),
            variable: variable.into(),
            nccc,
            at: Utc::now(),
        }
    }
}

/// Message contents. Variable-addressed payloads carry `from`/`to` variable
/// names; the queue routes on the owning agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", bound = "U: Addable")]
pub enum Payload<U> {
    Start,
    Finished,

    ElectionScore {
        from: String,
        to: String,
        round: u32,
        score: ElectionScore,
    },
    LeaderElected {
        variable: String,
        leader: String,
        is_root: bool,
    },

    /// DFS token: `from` offers itself as parent of `to`.
    DfsChild {
        from: String,
        to: String,
        root: String,
        depth: u32,
    },
    /// `from` was already visited: the edge is a back edge.
    DfsPseudo { from: String, to: String },
    /// Subtree of `from` is complete.
    DfsDone {
        from: String,
        to: String,
        separator: BTreeSet<String>,
    },
    DfsOutput(PseudoTreeNode),

    Util {
        from: String,
        to: String,
        space: UtilitySpace<U>,
    },
    OptTableStored { variable: String },
    Value {
        from: String,
        to: String,
        assignment: Assignment,
    },

    Assignment { variable: String, value: Value },
    OptimalUtility { root: String, utility: U },
    ModuleFinished(ModuleReport),
    AgentFinished { agent: AgentId },
    TreeError { variable: String, detail: String },
    AgentFault { agent: AgentId, detail: String },
}

impl<U> Payload<U> {
    pub fn kind(&self) -> &'static MessageType {
        match self {
            Payload::Start => &types::START,
            Payload::Finished => &types::FINISHED,
            Payload::ElectionScore { .. } => &types::ELECTION_SCORE,
            Payload::LeaderElected { .. } => &types::LEADER_ELECTED,
            Payload::DfsChild { .. } => &types::DFS_CHILD,
            Payload::DfsPseudo { .. } => &types::DFS_PSEUDO,
            Payload::DfsDone { .. } => &types::DFS_DONE,
            Payload::DfsOutput(_) => &types::DFS_OUTPUT,
            Payload::Util { .. } => &types::UTIL,
            Payload::OptTableStored { .. } => &types::OPT_TABLE_STORED,
            Payload::Value { .. } => &types::VALUE,
            Payload::Assignment { .. } => &types::ASSIGNMENT,
            Payload::OptimalUtility { .. } => &types::OPTIMAL_UTILITY,
            Payload::ModuleFinished(_) => &types::MODULE_FINISHED,
            Payload::AgentFinished { .. } => &types::AGENT_FINISHED,
            Payload::TreeError { .. } => &types::TREE_ERROR,
            Payload::AgentFault { .. } => &types::AGENT_FAULT,
        }
    }
}

/// Envelope delivered to a mailbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "U: Addable")]
pub struct Message<U> {
    pub sender: AgentId,
    pub payload: Payload<U>,
    /// Sender's NCCC clock at send time.
    pub nccc: u64,
}

impl<U> Message<U> {
    pub fn new(sender: AgentId, payload: Payload<U>, nccc: u64) -> Self {
        Self { sender, payload, nccc }
    }

    pub fn kind(&self) -> &'static MessageType {
        self.payload.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lineage_walks_to_any() {
        let names: Vec<&str> = types::UTIL.lineage().map(MessageType::name).collect();
        assert_eq!(names, vec!["UTIL", "DPOP", "ANY"]);
    }

    #[test]
    fn test_hierarchical_membership() {
        assert!(types::VALUE.is_a(&types::DPOP));
        assert!(types::FINISHED.is_a(&types::ANY));
        assert!(!types::DFS_OUTPUT.is_a(&types::DFS));
        assert!(!types::DPOP.is_a(&types::UTIL));
    }

    #[test]
    fn test_payload_kind() {
        let payload: Payload<i64> = Payload::OptimalUtility {
            root: "x".into(),
            utility: 3,
        };
        assert_eq!(payload.kind(), &types::OPTIMAL_UTILITY);

        let message = Message::new(AgentId::from("a"), Payload::<i64>::Finished, 4);
        assert_eq!(message.kind().name(), "FINISHED");
    }

    #[test]
    fn test_payload_serializes_externally_tagged() {
        let payload: Payload<i64> = Payload::Assignment {
            variable: "x".into(),
            value: 2,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["assignment"]["variable"], "x");
        assert_eq!(json["assignment"]["value"], 2);
    }
}
