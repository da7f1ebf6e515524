// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Utility Spaces
//!
//! A [`UtilitySpace`] is a dense, array-backed function from a tuple of
//! variables to an [`Addable`] utility. Tuples are laid out row-major: the
//! last variable varies fastest.
//!
//! | Operation | Module | Result |
//! |-----------|--------|--------|
//! | `join` | [`join`] | scope union, utilities combined (sum by default) |
//! | `project` | [`project`] | variables eliminated + companion [`OptTable`] |
//! | `slice` | [`slice`] | variables fixed to values |
//! | `iter` / `iter_bounded` | [`iter`] | lazy `(tuple, utility)` sequences |
//!
//! Spaces are values: every operation returns a new space and never mutates
//! its inputs. Infeasibility is the `infeasible` sentinel, never an error;
//! [`DomainError`] is reserved for malformed scopes and domains.

pub mod iter;
pub mod join;
pub mod project;
pub mod slice;

pub use iter::{BoundedIter, SpaceIter};
pub use join::Combine;
pub use project::OptTable;

use crate::domain::addable::{Addable, Direction};
use crate::domain::variable::{AgentId, Assignment, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Errors raised by utility-space construction and algebra.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("Variable '{0}' has an empty domain")]
    EmptyDomain(String),

    #[error("Variable '{0}' appears more than once in the scope")]
    DuplicateVariable(String),

    #[error("Domain of variable '{variable}' contains value {value} more than once")]
    DuplicateValue { variable: String, value: Value },

    #[error("Scope has {variables} variables but {domains} domains")]
    ScopeMismatch { variables: usize, domains: usize },

    #[error("Expected {expected} utilities for the given domains, found {found}")]
    SizeMismatch { expected: usize, found: usize },

    #[error("Space would hold more tuples than can be addressed")]
    TooLarge,

    #[error("Domains of variable '{0}' have no value in common")]
    DisjointDomains(String),

    #[error("Value {value} is not in the domain of variable '{variable}'")]
    ValueOutOfDomain { variable: String, value: Value },

    #[error("Variable '{0}' is missing from the assignment")]
    MissingValue(String),

    #[error("Cannot join an empty list of spaces")]
    NothingToJoin,

    #[error("Constraint '{0}' has an empty scope")]
    EmptyScope(String),
}

/// Dense function from value tuples to utilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "U: Addable")]
pub struct UtilitySpace<U> {
    name: String,
    #[serde(default)]
    owner: Option<AgentId>,
    variables: Vec<String>,
    domains: Vec<Vec<Value>>,
    utilities: Vec<U>,
    infeasible: U,
}

impl<U: Addable> UtilitySpace<U> {
    /// Build a space from explicit utilities in row-major order.
    pub fn new(
        name: impl Into<String>,
        variables: Vec<String>,
        domains: Vec<Vec<Value>>,
        utilities: Vec<U>,
        infeasible: U,
    ) -> Result<Self, DomainError> {
        let expected = validate_scope(&variables, &domains)?;
        if utilities.len() != expected {
            return Err(DomainError::SizeMismatch {
                expected,
                found: utilities.len(),
            });
        }

        Ok(Self {
            name: name.into(),
            owner: None,
            variables,
            domains,
            utilities,
            infeasible,
        })
    }

    /// Build a space by evaluating `f` on every tuple, in row-major order.
    pub fn from_fn<F>(
        name: impl Into<String>,
        variables: Vec<String>,
        domains: Vec<Vec<Value>>,
        infeasible: U,
        mut f: F,
    ) -> Result<Self, DomainError>
    where
        F: FnMut(&[Value]) -> U,
    {
        let size = validate_scope(&variables, &domains)?;
        let mut utilities = Vec::with_capacity(size);
        let mut tuple: Vec<Value> = domains.iter().map(|d| d[0]).collect();
        let mut indices = vec![0usize; domains.len()];
        for _ in 0..size {
            utilities.push(f(&tuple));
            advance(&mut indices, &domains, &mut tuple);
        }

        Ok(Self {
            name: name.into(),
            owner: None,
            variables,
            domains,
            utilities,
            infeasible,
        })
    }

    /// Space with the same utility on every tuple.
    pub fn constant(
        name: impl Into<String>,
        variables: Vec<String>,
        domains: Vec<Vec<Value>>,
        utility: U,
        infeasible: U,
    ) -> Result<Self, DomainError> {
        let size = validate_scope(&variables, &domains)?;
        Self::new(name, variables, domains, vec![utility; size], infeasible)
    }

    /// Zero-variable space holding a single utility.
    pub fn scalar(name: impl Into<String>, utility: U, infeasible: U) -> Self {
        Self {
            name: name.into(),
            owner: None,
            variables: Vec::new(),
            domains: Vec::new(),
            utilities: vec![utility],
            infeasible,
        }
    }

    pub fn with_owner(mut self, owner: AgentId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> Option<&AgentId> {
        self.owner.as_ref()
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn domains(&self) -> &[Vec<Value>] {
        &self.domains
    }

    pub fn utilities(&self) -> &[U] {
        &self.utilities
    }

    pub fn infeasible(&self) -> U {
        self.infeasible
    }

    pub fn arity(&self) -> usize {
        self.variables.len()
    }

    /// Number of tuples.
    pub fn size(&self) -> usize {
        self.utilities.len()
    }

    pub fn is_scalar(&self) -> bool {
        self.variables.is_empty()
    }

    /// The single utility of a zero-variable space.
    pub fn scalar_value(&self) -> Option<U> {
        if self.is_scalar() {
            self.utilities.first().copied()
        } else {
            None
        }
    }

    pub fn position(&self, variable: &str) -> Option<usize> {
        self.variables.iter().position(|v| v == variable)
    }

    pub fn contains(&self, variable: &str) -> bool {
        self.position(variable).is_some()
    }

    pub fn domain(&self, variable: &str) -> Option<&[Value]> {
        self.position(variable).map(|p| self.domains[p].as_slice())
    }

    pub fn is_infeasible(&self, utility: U) -> bool {
        utility == self.infeasible
    }

    /// Utility of a tuple given in this space's variable order.
    pub fn get(&self, tuple: &[Value]) -> Option<U> {
        self.index_of(tuple).map(|i| self.utilities[i])
    }

    /// Utility of the projection of `assignment` onto this space's scope.
    /// Extra variables in the assignment are ignored.
    pub fn utility_of(&self, assignment: &Assignment) -> Result<U, DomainError> {
        let mut tuple = Vec::with_capacity(self.arity());
        for variable in &self.variables {
            let value = assignment
                .get(variable)
                .ok_or_else(|| DomainError::MissingValue(variable.clone()))?;
            tuple.push(*value);
        }
        self.index_of(&tuple)
            .map(|i| self.utilities[i])
            .ok_or_else(|| self.out_of_domain(&tuple))
    }

    /// Best utility over all tuples.
    pub fn optimum(&self, direction: Direction) -> U {
        self.utilities
            .iter()
            .copied()
            .fold(direction.infeasible(), |best, u| direction.best(best, u))
    }

    /// Same function with the variables permuted into `order`.
    pub fn reorder(&self, order: &[String]) -> Result<Self, DomainError> {
        if order.len() != self.arity() {
            return Err(DomainError::ScopeMismatch {
                variables: order.len(),
                domains: self.arity(),
            });
        }
        let mut domains = Vec::with_capacity(order.len());
        for variable in order {
            let domain = self
                .domain(variable)
                .ok_or_else(|| DomainError::MissingValue(variable.clone()))?;
            domains.push(domain.to_vec());
        }

        let positions: Vec<usize> = self
            .variables
            .iter()
            .map(|v| order.iter().position(|o| o == v).unwrap_or(0))
            .collect();
        let mut source = vec![0 as Value; self.arity()];
        Self::from_fn(
            self.name.clone(),
            order.to_vec(),
            domains,
            self.infeasible,
            |tuple| {
                for (i, p) in positions.iter().enumerate() {
                    source[i] = tuple[*p];
                }
                self.get(&source).unwrap_or(self.infeasible)
            },
        )
        .map(|space| match &self.owner {
            Some(owner) => space.with_owner(owner.clone()),
            None => space,
        })
    }

    /// Semantic equality: the same variables over the same value sets, in
    /// any order, and the same utility for every assignment.
    pub fn equivalent(&self, other: &Self) -> bool {
        if self.arity() != other.arity() || self.size() != other.size() {
            return false;
        }
        let same_domains = self.variables.iter().zip(&self.domains).all(|(variable, domain)| {
            other
                .domain(variable)
                .is_some_and(|theirs| theirs.len() == domain.len() && domain.iter().all(|v| theirs.contains(v)))
        });
        if !same_domains {
            return false;
        }

        let positions: Vec<usize> = self.variables.iter().filter_map(|v| other.position(v)).collect();
        let mut theirs = vec![0 as Value; self.arity()];
        self.iter().all(|(tuple, utility)| {
            for (value, p) in tuple.iter().zip(&positions) {
                theirs[*p] = *value;
            }
            other.get(&theirs) == Some(utility)
        })
    }

    pub(crate) fn strides(&self) -> Vec<usize> {
        strides(&self.domains)
    }

    pub(crate) fn index_of(&self, tuple: &[Value]) -> Option<usize> {
        if tuple.len() != self.arity() {
            return None;
        }
        let mut index = 0usize;
        for (domain, value) in self.domains.iter().zip(tuple) {
            let position = domain.iter().position(|v| v == value)?;
            index = index * domain.len() + position;
        }
        Some(index)
    }

    /// Tuple stored at a flat index.
    pub(crate) fn tuple_at(&self, mut index: usize) -> Vec<Value> {
        let mut tuple = vec![0 as Value; self.arity()];
        for (slot, domain) in tuple.iter_mut().zip(&self.domains).rev() {
            *slot = domain[index % domain.len()];
            index /= domain.len();
        }
        tuple
    }

    fn out_of_domain(&self, tuple: &[Value]) -> DomainError {
        for ((variable, domain), value) in self.variables.iter().zip(&self.domains).zip(tuple) {
            if !domain.contains(value) {
                return DomainError::ValueOutOfDomain {
                    variable: variable.clone(),
                    value: *value,
                };
            }
        }
        DomainError::ScopeMismatch {
            variables: tuple.len(),
            domains: self.arity(),
        }
    }
}

/// Checks a scope and returns the number of tuples it spans.
pub(crate) fn validate_scope(variables: &[String], domains: &[Vec<Value>]) -> Result<usize, DomainError> {
    if variables.len() != domains.len() {
        return Err(DomainError::ScopeMismatch {
            variables: variables.len(),
            domains: domains.len(),
        });
    }

    let mut seen = HashSet::with_capacity(variables.len());
    let mut size = 1usize;
    for (variable, domain) in variables.iter().zip(domains) {
        if !seen.insert(variable.as_str()) {
            return Err(DomainError::DuplicateVariable(variable.clone()));
        }
        if domain.is_empty() {
            return Err(DomainError::EmptyDomain(variable.clone()));
        }
        let mut values = HashSet::with_capacity(domain.len());
        for value in domain {
            if !values.insert(*value) {
                return Err(DomainError::DuplicateValue {
                    variable: variable.clone(),
                    value: *value,
                });
            }
        }
        size = size.checked_mul(domain.len()).ok_or(DomainError::TooLarge)?;
    }
    Ok(size)
}

pub(crate) fn strides(domains: &[Vec<Value>]) -> Vec<usize> {
    let mut strides = vec![1usize; domains.len()];
    for i in (0..domains.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * domains[i + 1].len();
    }
    strides
}

/// Odometer step over domain indices, keeping `tuple` in sync.
pub(crate) fn advance(indices: &mut [usize], domains: &[Vec<Value>], tuple: &mut [Value]) {
    for i in (0..indices.len()).rev() {
        indices[i] += 1;
        if indices[i] < domains[i].len() {
            tuple[i] = domains[i][indices[i]];
            return;
        }
        indices[i] = 0;
        tuple[i] = domains[i][0];
    }
}
