// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Problems
//!
//! [`Problem`] is the centralized description of a DCOP handed to the
//! deployment layer: variables, constraints and the optimization direction.
//! It is only ever read to build one [`AgentProblem`] per agent; agents never
//! see each other's constraints.
//!
//! [`NcccClock`] is the per-agent simulated-time counter. It lives here
//! because it is the piece of the problem view that the runtime mutates.

use crate::domain::addable::{Addable, Direction};
use crate::domain::utility::{DomainError, UtilitySpace};
use crate::domain::variable::{AgentId, Assignment, Value, Variable};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while assembling a problem or an agent's view of it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProblemError {
    #[error("Variable '{0}' is declared twice")]
    DuplicateVariable(String),

    #[error("Constraint '{constraint}' refers to unknown variable '{variable}'")]
    UnknownVariable { constraint: String, variable: String },

    #[error("Constraint '{constraint}' uses values outside the domain of '{variable}'")]
    ForeignDomain { constraint: String, variable: String },

    #[error("Variable '{0}' has no owning agent")]
    UnownedVariable(String),

    #[error("Agent '{0}' owns no variable")]
    UnknownAgent(AgentId),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Monotonic Non-Concurrent Constraint Check counter.
///
/// Clones share the same counter, so the runtime worker and the protocol
/// modules of an agent observe one clock.
#[derive(Debug, Clone, Default)]
pub struct NcccClock(Arc<AtomicU64>);

impl NcccClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Raise the clock to `value`. The clock never moves backwards.
    pub fn set(&self, value: u64) -> u64 {
        self.observe(value)
    }

    /// Account for `checks` constraint checks and return the new time.
    pub fn advance(&self, checks: u64) -> u64 {
        self.0.fetch_add(checks, Ordering::SeqCst).saturating_add(checks)
    }

    /// Lamport-style merge with the stamp of a received message.
    pub fn observe(&self, stamp: u64) -> u64 {
        self.0.fetch_max(stamp, Ordering::SeqCst).max(stamp)
    }
}

/// Allocates unique names for generated constraints.
///
/// Owned by whoever builds spaces (a problem, a test fixture), so names are
/// reproducible and never depend on process-wide state.
#[derive(Debug, Clone)]
pub struct NameAllocator {
    prefix: String,
    next: u64,
}

impl NameAllocator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 0,
        }
    }

    pub fn allocate(&mut self) -> String {
        let name = format!("{}{}", self.prefix, self.next);
        self.next += 1;
        name
    }
}

impl Default for NameAllocator {
    fn default() -> Self {
        Self::new("c")
    }
}

/// A complete DCOP instance.
#[derive(Debug, Clone)]
pub struct Problem<U> {
    name: String,
    direction: Direction,
    variables: Vec<Variable>,
    constraints: Vec<UtilitySpace<U>>,
    names: NameAllocator,
}

impl<U: Addable> Problem<U> {
    pub fn new(name: impl Into<String>, direction: Direction) -> Self {
        Self {
            name: name.into(),
            direction,
            variables: Vec::new(),
            constraints: Vec::new(),
            names: NameAllocator::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Sentinel used by constraints built through this problem.
    pub fn infeasible(&self) -> U {
        self.direction.infeasible()
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn constraints(&self) -> &[UtilitySpace<U>] {
        &self.constraints
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn owner_of(&self, variable: &str) -> Option<&AgentId> {
        self.variable(variable).and_then(|v| v.owner.as_ref())
    }

    pub fn add_variable(&mut self, variable: Variable) -> Result<(), ProblemError> {
        if self.variable(&variable.name).is_some() {
            return Err(ProblemError::DuplicateVariable(variable.name));
        }
        if variable.domain.is_empty() {
            return Err(DomainError::EmptyDomain(variable.name).into());
        }
        self.variables.push(variable);
        Ok(())
    }

    /// Add an existing space as a constraint. Every scope variable must be
    /// declared and the space's domains must be sub-domains of the declared
    /// ones. Scalar spaces are refused: no agent would own them.
    pub fn add_constraint(&mut self, space: UtilitySpace<U>) -> Result<(), ProblemError> {
        if space.is_scalar() {
            return Err(DomainError::EmptyScope(space.name().to_string()).into());
        }
        for (variable, domain) in space.variables().iter().zip(space.domains()) {
            let declared = self.variable(variable).ok_or_else(|| ProblemError::UnknownVariable {
                constraint: space.name().to_string(),
                variable: variable.clone(),
            })?;
            if domain.iter().any(|value| !declared.domain.contains(value)) {
                return Err(ProblemError::ForeignDomain {
                    constraint: space.name().to_string(),
                    variable: variable.clone(),
                });
            }
        }
        self.constraints.push(space);
        Ok(())
    }

    /// Build a constraint over `scope` (declared domains) from a function of
    /// the tuple, named by the problem's allocator. Returns the name.
    pub fn add_constraint_fn<F>(&mut self, scope: &[&str], f: F) -> Result<String, ProblemError>
    where
        F: FnMut(&[Value]) -> U,
    {
        let mut domains = Vec::with_capacity(scope.len());
        let name = self.names.allocate();
        if scope.is_empty() {
            return Err(DomainError::EmptyScope(name).into());
        }
        for variable in scope {
            let declared = self.variable(variable).ok_or_else(|| ProblemError::UnknownVariable {
                constraint: name.clone(),
                variable: variable.to_string(),
            })?;
            domains.push(declared.domain.clone());
        }
        let variables = scope.iter().map(|v| v.to_string()).collect();
        let space = UtilitySpace::from_fn(name.clone(), variables, domains, self.infeasible(), f)?;
        self.constraints.push(space);
        Ok(name)
    }

    /// Variables sharing at least one constraint with `variable`.
    pub fn neighbors(&self, variable: &str) -> BTreeSet<String> {
        self.constraints
            .iter()
            .filter(|c| c.contains(variable))
            .flat_map(|c| c.variables().iter())
            .filter(|v| v.as_str() != variable)
            .cloned()
            .collect()
    }

    /// Every owning agent, in name order.
    pub fn agents(&self) -> BTreeSet<AgentId> {
        self.variables.iter().filter_map(|v| v.owner.clone()).collect()
    }

    /// Fail on the first variable without an owner.
    pub fn ensure_owned(&self) -> Result<(), ProblemError> {
        match self.variables.iter().find(|v| v.owner.is_none()) {
            Some(variable) => Err(ProblemError::UnownedVariable(variable.name.clone())),
            None => Ok(()),
        }
    }

    /// Total utility of a complete assignment.
    pub fn evaluate(&self, assignment: &Assignment) -> Result<U, ProblemError> {
        let mut total = U::zero();
        for constraint in &self.constraints {
            let utility = constraint.utility_of(assignment)?;
            if constraint.is_infeasible(utility) {
                return Ok(self.infeasible());
            }
            total = total.add(utility);
        }
        Ok(total)
    }

    /// Exhaustive search, for verification on small instances. Ties resolve
    /// to the first optimum in row-major order over the declared variables.
    pub fn brute_force(&self) -> Result<(Assignment, U), ProblemError> {
        let mut indices = vec![0usize; self.variables.len()];
        let mut best: Option<(Assignment, U)> = None;
        loop {
            let assignment: Assignment = self
                .variables
                .iter()
                .zip(&indices)
                .map(|(v, i)| (v.name.clone(), v.domain[*i]))
                .collect();
            let utility = self.evaluate(&assignment)?;
            let improves = match &best {
                Some((_, incumbent)) => self.direction.is_better(utility, *incumbent),
                None => true,
            };
            if improves {
                best = Some((assignment, utility));
            }

            let mut carried = true;
            for (index, variable) in indices.iter_mut().zip(&self.variables).rev() {
                *index += 1;
                if *index < variable.domain.len() {
                    carried = false;
                    break;
                }
                *index = 0;
            }
            if carried {
                break;
            }
        }
        Ok(best.unwrap_or_else(|| (Assignment::new(), U::zero())))
    }

    /// The restricted view handed to `agent`.
    pub fn agent_view(&self, agent: &AgentId) -> Result<AgentProblem<U>, ProblemError> {
        let variables: Vec<Variable> = self
            .variables
            .iter()
            .filter(|v| v.owner.as_ref() == Some(agent))
            .cloned()
            .collect();
        if variables.is_empty() {
            return Err(ProblemError::UnknownAgent(agent.clone()));
        }

        let constraints: Vec<UtilitySpace<U>> = self
            .constraints
            .iter()
            .filter(|c| variables.iter().any(|v| c.contains(&v.name)))
            .map(|c| c.clone().with_owner(agent.clone()))
            .collect();

        let mut neighbors = BTreeMap::new();
        let mut owners = BTreeMap::new();
        let mut domains = BTreeMap::new();
        for variable in &variables {
            let adjacent = self.neighbors(&variable.name);
            for name in adjacent.iter().chain(std::iter::once(&variable.name)) {
                let known = self.variable(name).ok_or_else(|| ProblemError::UnknownVariable {
                    constraint: variable.name.clone(),
                    variable: name.clone(),
                })?;
                let owner = known
                    .owner
                    .clone()
                    .ok_or_else(|| ProblemError::UnownedVariable(name.clone()))?;
                owners.insert(name.clone(), owner);
                domains.insert(name.clone(), known.domain.clone());
            }
            neighbors.insert(variable.name.clone(), adjacent);
        }

        Ok(AgentProblem {
            agent: agent.clone(),
            direction: self.direction,
            variables,
            constraints,
            neighbors,
            owners,
            domains,
            total_variables: self.variables.len(),
            nccc: NcccClock::new(),
        })
    }
}

/// What a single agent knows about the problem.
#[derive(Debug, Clone)]
pub struct AgentProblem<U> {
    agent: AgentId,
    direction: Direction,
    variables: Vec<Variable>,
    constraints: Vec<UtilitySpace<U>>,
    neighbors: BTreeMap<String, BTreeSet<String>>,
    owners: BTreeMap<String, AgentId>,
    domains: BTreeMap<String, Vec<Value>>,
    total_variables: usize,
    nccc: NcccClock,
}

impl<U: Addable> AgentProblem<U> {
    pub fn agent(&self) -> &AgentId {
        &self.agent
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn infeasible(&self) -> U {
        self.direction.infeasible()
    }

    /// Variables owned by this agent.
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn owns(&self, variable: &str) -> bool {
        self.variables.iter().any(|v| v.name == variable)
    }

    /// Constraints touching at least one owned variable.
    pub fn constraints(&self) -> &[UtilitySpace<U>] {
        &self.constraints
    }

    pub fn constraints_of<'a>(&'a self, variable: &'a str) -> impl Iterator<Item = &'a UtilitySpace<U>> + 'a {
        self.constraints.iter().filter(move |c| c.contains(variable))
    }

    /// Neighbours of an owned variable; empty for anything else.
    pub fn neighbors(&self, variable: &str) -> &BTreeSet<String> {
        static EMPTY: BTreeSet<String> = BTreeSet::new();
        self.neighbors.get(variable).unwrap_or(&EMPTY)
    }

    /// Owner of an owned or neighbouring variable.
    pub fn owner_of(&self, variable: &str) -> Option<&AgentId> {
        self.owners.get(variable)
    }

    pub fn domain(&self, variable: &str) -> Option<&[Value]> {
        self.domains.get(variable).map(Vec::as_slice)
    }

    /// Number of variables in the whole problem.
    pub fn total_variables(&self) -> usize {
        self.total_variables
    }

    pub fn nccc(&self) -> &NcccClock {
        &self.nccc
    }
}
