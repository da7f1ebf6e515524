// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Join of utility spaces.
//!
//! The joined scope is the union of the input scopes: the first input's
//! variables in order, then every new variable in order of appearance. A
//! variable shared by several inputs keeps the intersection of their domains,
//! ordered as in the first input that declares it.

use super::{advance, validate_scope, DomainError, UtilitySpace};
use crate::domain::addable::Addable;
use crate::domain::variable::Value;
use serde::{Deserialize, Serialize};

/// Operator combining the utilities of joined spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combine {
    #[default]
    Sum,
    Product,
}

impl Combine {
    pub fn apply<U: Addable>(self, a: U, b: U) -> U {
        match self {
            Combine::Sum => a.add(b),
            Combine::Product => a.multiply(b),
        }
    }
}

/// For one input: its flat-index stride and the translation from joined
/// domain indices to its own domain indices, per joined variable.
struct InputMap {
    terms: Vec<(usize, usize, Vec<usize>)>,
}

impl InputMap {
    fn index(&self, indices: &[usize]) -> usize {
        self.terms
            .iter()
            .map(|(joined, stride, translate)| stride * translate[indices[*joined]])
            .sum()
    }
}

impl<U: Addable> UtilitySpace<U> {
    /// Sum-join with another space.
    pub fn join(&self, other: &Self) -> Result<Self, DomainError> {
        self.join_with(other, Combine::Sum)
    }

    pub fn join_with(&self, other: &Self, combine: Combine) -> Result<Self, DomainError> {
        Self::join_all([self, other], combine)
    }

    /// Join any number of spaces in one pass.
    pub fn join_all<'a, I>(spaces: I, combine: Combine) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = &'a Self>,
        U: 'a,
    {
        let spaces: Vec<&Self> = spaces.into_iter().collect();
        let first = spaces.first().ok_or(DomainError::NothingToJoin)?;

        let mut variables: Vec<String> = Vec::new();
        let mut domains: Vec<Vec<Value>> = Vec::new();
        for space in &spaces {
            for (variable, domain) in space.variables.iter().zip(&space.domains) {
                match variables.iter().position(|v| v == variable) {
                    Some(p) => {
                        domains[p].retain(|value| domain.contains(value));
                        if domains[p].is_empty() {
                            return Err(DomainError::DisjointDomains(variable.clone()));
                        }
                    }
                    None => {
                        variables.push(variable.clone());
                        domains.push(domain.clone());
                    }
                }
            }
        }
        let size = validate_scope(&variables, &domains)?;

        let maps: Vec<InputMap> = spaces
            .iter()
            .map(|space| {
                let strides = space.strides();
                let terms = space
                    .variables
                    .iter()
                    .zip(&space.domains)
                    .zip(strides)
                    .map(|((variable, own_domain), stride)| {
                        let joined = variables.iter().position(|v| v == variable).unwrap_or(0);
                        let translate = domains[joined]
                            .iter()
                            .map(|value| own_domain.iter().position(|v| v == value).unwrap_or(0))
                            .collect();
                        (joined, stride, translate)
                    })
                    .collect();
                InputMap { terms }
            })
            .collect();

        let infeasible = first.infeasible;
        let mut utilities = Vec::with_capacity(size);
        let mut indices = vec![0usize; variables.len()];
        let mut tuple: Vec<Value> = domains.iter().map(|d| d[0]).collect();
        for _ in 0..size {
            let mut inputs = spaces.iter().zip(&maps);
            let mut acc = match inputs.next() {
                Some((space, map)) => space.utilities[map.index(&indices)],
                None => infeasible,
            };
            for (space, map) in inputs {
                if acc == infeasible {
                    break;
                }
                let u = space.utilities[map.index(&indices)];
                acc = if u == space.infeasible { infeasible } else { combine.apply(acc, u) };
            }
            utilities.push(acc);
            advance(&mut indices, &domains, &mut tuple);
        }

        let name = spaces
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join("*");
        Ok(Self {
            name,
            owner: first.owner.clone(),
            variables,
            domains,
            utilities,
            infeasible,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_join_unions_scopes() {
        let a = UtilitySpace::<i64>::from_fn("a", vars(&["x", "y"]), vec![vec![0, 1], vec![0, 1]], i64::MAX, |t| t[0] + t[1])
            .unwrap();
        let b = UtilitySpace::<i64>::from_fn("b", vars(&["y", "z"]), vec![vec![0, 1], vec![0, 1]], i64::MAX, |t| 10 * t[0] * t[1])
            .unwrap();
        let joined = a.join(&b).unwrap();

        assert_eq!(joined.variables(), &vars(&["x", "y", "z"])[..]);
        assert_eq!(joined.size(), 8);
        assert_eq!(joined.get(&[1, 1, 1]), Some(12));
        assert_eq!(joined.get(&[1, 0, 1]), Some(1));
    }

    #[test]
    fn test_join_intersects_sub_domains() {
        let wide = UtilitySpace::<i64>::from_fn("w", vars(&["x"]), vec![vec![0, 1, 2, 3]], i64::MAX, |t| t[0]).unwrap();
        let narrow = UtilitySpace::<i64>::from_fn("n", vars(&["x"]), vec![vec![3, 1]], i64::MAX, |t| 100 * t[0]).unwrap();
        let joined = wide.join(&narrow).unwrap();

        assert_eq!(joined.domains(), &[vec![1, 3]]);
        assert_eq!(joined.get(&[3]), Some(303));
    }

    #[test]
    fn test_join_rejects_disjoint_domains() {
        let a = UtilitySpace::<i64>::constant("a", vars(&["x"]), vec![vec![0, 1]], 0, i64::MAX).unwrap();
        let b = UtilitySpace::<i64>::constant("b", vars(&["x"]), vec![vec![5]], 0, i64::MAX).unwrap();
        assert_eq!(a.join(&b).unwrap_err(), DomainError::DisjointDomains("x".to_string()));
    }

    #[test]
    fn test_infeasible_tuples_propagate() {
        let hard = UtilitySpace::<i64>::from_fn("h", vars(&["x", "y"]), vec![vec![0, 1], vec![0, 1]], i64::MAX, |t| {
            if t[0] == t[1] { i64::MAX } else { 0 }
        })
        .unwrap();
        let soft = UtilitySpace::<i64>::constant("s", vars(&["y"]), vec![vec![0, 1]], -5, i64::MAX).unwrap();
        let joined = soft.join(&hard).unwrap();

        assert_eq!(joined.variables(), &vars(&["y", "x"])[..]);
        assert_eq!(joined.get(&[0, 0]), Some(i64::MAX));
        assert_eq!(joined.get(&[0, 1]), Some(-5));
    }

    #[test]
    fn test_product_combine() {
        let a = UtilitySpace::<f64>::constant("a", vars(&["x"]), vec![vec![0, 1]], 0.5, f64::NEG_INFINITY).unwrap();
        let b = UtilitySpace::<f64>::from_fn("b", vars(&["x"]), vec![vec![0, 1]], f64::NEG_INFINITY, |t| t[0] as f64 + 1.0)
            .unwrap();
        let joined = a.join_with(&b, Combine::Product).unwrap();
        assert_eq!(joined.utilities(), &[0.5, 1.0]);
    }

    #[test]
    fn test_join_all_rejects_empty_input() {
        let none: Vec<&UtilitySpace<i64>> = Vec::new();
        assert_eq!(UtilitySpace::join_all(none, Combine::Sum).unwrap_err(), DomainError::NothingToJoin);
    }
}
