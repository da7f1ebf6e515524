// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Pseudo-trees
//!
//! A pseudo-tree is a DFS spanning forest of the constraint graph in which
//! every constraint edge links a node to one of its ancestors. Tree edges are
//! parent/child; the remaining (back) edges are pseudo-parent/pseudo-child.
//!
//! | Type | Role |
//! |------|------|
//! | [`PseudoTreeNode`] | One variable's view, produced by the DFS protocol |
//! | [`PseudoTree`] | All nodes, assembled by the solve controller |
//! | [`DfsPhase`] / [`EdgeOutcome`] | Protocol state of a node and of an edge |
//! | [`ElectionScore`] | Leader-election ordering key |

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Position of one variable in the pseudo-tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PseudoTreeNode {
    pub variable: String,
    /// Root of the tree this node belongs to.
    pub root: String,
    pub depth: u32,
    pub parent: Option<String>,
    /// Tree children, in the order they were adopted.
    pub children: Vec<String>,
    pub pseudo_parents: BTreeSet<String>,
    pub pseudo_children: BTreeSet<String>,
    /// Ancestors whose values this node's subtree depends on.
    pub separator: BTreeSet<String>,
    /// Separator reported by each child.
    pub child_separators: BTreeMap<String, BTreeSet<String>>,
}

impl PseudoTreeNode {
    /// A node that has not joined any tree yet.
    pub fn new(variable: impl Into<String>) -> Self {
        let variable = variable.into();
        Self {
            root: variable.clone(),
            variable,
            depth: 0,
            parent: None,
            children: Vec::new(),
            pseudo_parents: BTreeSet::new(),
            pseudo_children: BTreeSet::new(),
            separator: BTreeSet::new(),
            child_separators: BTreeMap::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// `true` for children and pseudo-children.
    pub fn is_below(&self, variable: &str) -> bool {
        self.children.iter().any(|c| c == variable) || self.pseudo_children.contains(variable)
    }

    /// `true` for the parent and pseudo-parents.
    pub fn is_above(&self, variable: &str) -> bool {
        self.parent.as_deref() == Some(variable) || self.pseudo_parents.contains(variable)
    }

    /// (parent ∪ pseudo-parents ∪ children's separators) − self.
    pub fn compute_separator(&self) -> BTreeSet<String> {
        self.parent
            .iter()
            .chain(self.pseudo_parents.iter())
            .chain(self.child_separators.values().flatten())
            .filter(|v| **v != self.variable)
            .cloned()
            .collect()
    }
}

/// Protocol state of a node during DFS construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DfsPhase {
    #[default]
    Unvisited,
    /// Holding the token and offering it to open neighbours.
    Offering,
    Done,
}

/// How an offered edge was classified by its receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeOutcome {
    ChosenAsChild,
    ChosenAsPseudoChild,
}

/// Leader-election key: highest degree wins, ties go to the greatest name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElectionScore {
    pub degree: usize,
    pub variable: String,
}

impl ElectionScore {
    pub fn new(degree: usize, variable: impl Into<String>) -> Self {
        Self {
            degree,
            variable: variable.into(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PseudoTreeError {
    #[error("Node '{0}' is missing from the tree")]
    MissingNode(String),

    #[error("Parent '{parent}' does not list '{child}' as a child")]
    BrokenParentLink { parent: String, child: String },

    #[error("Back edge '{upper}' - '{lower}' is not recorded on both ends")]
    BrokenBackEdge { upper: String, lower: String },

    #[error("Node '{variable}' has depth {depth}, expected {expected}")]
    InconsistentDepth { variable: String, depth: u32, expected: u32 },

    #[error("Separator of '{0}' is not covered by its parent's separator and the parent")]
    SeparatorNotNested(String),

    #[error("Edge '{0}' - '{1}' does not link an ancestor to a descendant")]
    CrossEdge(String, String),
}

/// Every node of a solved instance, keyed by variable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PseudoTree {
    nodes: BTreeMap<String, PseudoTreeNode>,
}

impl PseudoTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: PseudoTreeNode) {
        self.nodes.insert(node.variable.clone(), node);
    }

    pub fn node(&self, variable: &str) -> Option<&PseudoTreeNode> {
        self.nodes.get(variable)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &PseudoTreeNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// One root per connected component.
    pub fn roots(&self) -> Vec<&str> {
        self.nodes
            .values()
            .filter(|n| n.is_root())
            .map(|n| n.variable.as_str())
            .collect()
    }

    /// Length of the longest root-to-leaf path.
    pub fn depth(&self) -> u32 {
        self.nodes.values().map(|n| n.depth).max().unwrap_or(0)
    }

    /// `true` if `ancestor` lies on the tree path from `descendant` to its root.
    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> bool {
        let mut current = self.nodes.get(descendant).and_then(|n| n.parent.as_deref());
        while let Some(variable) = current {
            if variable == ancestor {
                return true;
            }
            current = self.nodes.get(variable).and_then(|n| n.parent.as_deref());
        }
        false
    }

    /// Structural checks: links are symmetric, depths consistent, separators
    /// nested, and every node reachable from its root.
    pub fn validate(&self) -> Result<(), PseudoTreeError> {
        for node in self.nodes.values() {
            match &node.parent {
                None => {
                    if node.depth != 0 {
                        return Err(PseudoTreeError::InconsistentDepth {
                            variable: node.variable.clone(),
                            depth: node.depth,
                            expected: 0,
                        });
                    }
                }
                Some(parent) => {
                    let upper = self
                        .nodes
                        .get(parent)
                        .ok_or_else(|| PseudoTreeError::MissingNode(parent.clone()))?;
                    if !upper.children.contains(&node.variable) {
                        return Err(PseudoTreeError::BrokenParentLink {
                            parent: parent.clone(),
                            child: node.variable.clone(),
                        });
                    }
                    if node.depth != upper.depth + 1 {
                        return Err(PseudoTreeError::InconsistentDepth {
                            variable: node.variable.clone(),
                            depth: node.depth,
                            expected: upper.depth + 1,
                        });
                    }
                    let covered = node
                        .separator
                        .iter()
                        .all(|v| v == parent || upper.separator.contains(v));
                    if !covered {
                        return Err(PseudoTreeError::SeparatorNotNested(node.variable.clone()));
                    }
                }
            }

            for upper in &node.pseudo_parents {
                let linked = self
                    .nodes
                    .get(upper)
                    .is_some_and(|u| u.pseudo_children.contains(&node.variable));
                if !linked || !self.is_ancestor(upper, &node.variable) {
                    return Err(PseudoTreeError::BrokenBackEdge {
                        upper: upper.clone(),
                        lower: node.variable.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Every `(a, b)` edge must connect an ancestor to a descendant.
    pub fn validate_edges<'a, I>(&self, edges: I) -> Result<(), PseudoTreeError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (a, b) in edges {
            if !self.is_ancestor(a, b) && !self.is_ancestor(b, a) {
                return Err(PseudoTreeError::CrossEdge(a.to_string(), b.to_string()));
            }
        }
        Ok(())
    }
}

impl FromIterator<PseudoTreeNode> for PseudoTree {
    fn from_iter<T: IntoIterator<Item = PseudoTreeNode>>(iter: T) -> Self {
        let mut tree = Self::new();
        for node in iter {
            tree.insert(node);
        }
        tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    /// a - b - c with a back edge a - c.
    fn triangle() -> PseudoTree {
        let mut a = PseudoTreeNode::new("a");
        a.children = vec!["b".into()];
        a.pseudo_children = set(&["c"]);
        a.child_separators.insert("b".into(), set(&["a"]));

        let mut b = PseudoTreeNode::new("b");
        b.root = "a".into();
        b.depth = 1;
        b.parent = Some("a".into());
        b.children = vec!["c".into()];
        b.child_separators.insert("c".into(), set(&["a", "b"]));
        b.separator = b.compute_separator();

        let mut c = PseudoTreeNode::new("c");
        c.root = "a".into();
        c.depth = 2;
        c.parent = Some("b".into());
        c.pseudo_parents = set(&["a"]);
        c.separator = c.compute_separator();

        [a, b, c].into_iter().collect()
    }

    #[test]
    fn test_separator_computation() {
        let tree = triangle();
        assert_eq!(tree.node("c").unwrap().separator, set(&["a", "b"]));
        assert_eq!(tree.node("b").unwrap().separator, set(&["a"]));
        assert!(tree.node("a").unwrap().separator.is_empty());
    }

    #[test]
    fn test_valid_tree() {
        let tree = triangle();
        assert_eq!(tree.validate(), Ok(()));
        assert_eq!(tree.roots(), vec!["a"]);
        assert_eq!(tree.depth(), 2);
        assert!(tree.is_ancestor("a", "c"));
        assert!(!tree.is_ancestor("c", "a"));
        assert!(tree.validate_edges([("a", "b"), ("c", "a")]).is_ok());
    }

    #[test]
    fn test_detects_broken_links() {
        let mut tree = triangle();
        let mut orphan = tree.node("c").unwrap().clone();
        orphan.pseudo_parents = set(&["b"]);
        tree.insert(orphan);
        assert!(matches!(tree.validate(), Err(PseudoTreeError::BrokenBackEdge { .. })));

        let mut lonely = PseudoTreeNode::new("d");
        lonely.depth = 0;
        let forest: PseudoTree = [lonely, PseudoTreeNode::new("e")].into_iter().collect();
        assert_eq!(
            forest.validate_edges([("d", "e")]),
            Err(PseudoTreeError::CrossEdge("d".into(), "e".into()))
        );
    }

    #[test]
    fn test_election_score_ordering() {
        let low = ElectionScore::new(1, "z");
        let high = ElectionScore::new(2, "a");
        let tie = ElectionScore::new(2, "b");
        assert!(high > low);
        assert!(tie > high);
    }
}
