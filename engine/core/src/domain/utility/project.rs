// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Projection (variable elimination) and conditional-optimum tables.
//!
//! Ties are broken by the lowest domain index: tuples are scanned in
//! row-major order and a value replaces the incumbent only when it is
//! strictly better. When every value of a separator tuple is infeasible the
//! first domain value of each eliminated variable is recorded.

use super::{validate_scope, DomainError, UtilitySpace};
use crate::domain::addable::{Addable, Direction};
use crate::domain::variable::{Assignment, Value};
use serde::{Deserialize, Serialize};

/// Conditional optimum of the eliminated variables for every tuple of the
/// remaining (separator) variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptTable {
    separator: Vec<String>,
    separator_domains: Vec<Vec<Value>>,
    eliminated: Vec<String>,
    /// Row-major over the separator, `eliminated.len()` values per row.
    choices: Vec<Value>,
}

impl OptTable {
    pub fn separator(&self) -> &[String] {
        &self.separator
    }

    pub fn eliminated(&self) -> &[String] {
        &self.eliminated
    }

    /// Number of separator tuples.
    pub fn len(&self) -> usize {
        if self.eliminated.is_empty() {
            return self.separator_domains.iter().map(Vec::len).product();
        }
        self.choices.len() / self.eliminated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Optimal values of the eliminated variables for a separator tuple given
    /// in separator order.
    pub fn lookup_tuple(&self, tuple: &[Value]) -> Option<&[Value]> {
        if tuple.len() != self.separator.len() {
            return None;
        }
        let mut row = 0usize;
        for (domain, value) in self.separator_domains.iter().zip(tuple) {
            row = row * domain.len() + domain.iter().position(|v| v == value)?;
        }
        let width = self.eliminated.len();
        Some(&self.choices[row * width..(row + 1) * width])
    }

    /// Optimal values of the eliminated variables under `context`, which must
    /// assign every separator variable. Extra entries are ignored.
    pub fn lookup(&self, context: &Assignment) -> Result<&[Value], DomainError> {
        let mut tuple = Vec::with_capacity(self.separator.len());
        for variable in &self.separator {
            let value = context
                .get(variable)
                .ok_or_else(|| DomainError::MissingValue(variable.clone()))?;
            tuple.push(*value);
        }
        self.lookup_tuple(&tuple).ok_or_else(|| {
            let (variable, value) = self
                .separator
                .iter()
                .zip(&self.separator_domains)
                .zip(&tuple)
                .find(|((_, domain), value)| !domain.contains(value))
                .map(|((variable, _), value)| (variable.clone(), *value))
                .unwrap_or_default();
            DomainError::ValueOutOfDomain { variable, value }
        })
    }

    /// `lookup` returned as an assignment of the eliminated variables.
    pub fn resolve(&self, context: &Assignment) -> Result<Assignment, DomainError> {
        let values = self.lookup(context)?;
        Ok(self
            .eliminated
            .iter()
            .cloned()
            .zip(values.iter().copied())
            .collect())
    }
}

impl<U: Addable> UtilitySpace<U> {
    /// Eliminate `eliminate` by keeping, for each remaining tuple, the best
    /// utility over the eliminated variables. Variables outside the scope are
    /// ignored.
    pub fn project<S: AsRef<str>>(
        &self,
        eliminate: &[S],
        direction: Direction,
    ) -> Result<(Self, OptTable), DomainError> {
        let is_eliminated = |variable: &String| eliminate.iter().any(|e| e.as_ref() == variable);

        let mut kept_positions = Vec::new();
        let mut eliminated_positions = Vec::new();
        for (position, variable) in self.variables.iter().enumerate() {
            if is_eliminated(variable) {
                eliminated_positions.push(position);
            } else {
                kept_positions.push(position);
            }
        }

        let variables: Vec<String> = kept_positions.iter().map(|p| self.variables[*p].clone()).collect();
        let domains: Vec<Vec<Value>> = kept_positions.iter().map(|p| self.domains[*p].clone()).collect();
        let size = validate_scope(&variables, &domains)?;
        let eliminated: Vec<String> = eliminated_positions
            .iter()
            .map(|p| self.variables[*p].clone())
            .collect();
        let width = eliminated.len();

        // Stride of each source variable inside the projected space, 0 if eliminated.
        let mut kept_stride = vec![0usize; self.arity()];
        let mut stride = 1usize;
        for p in kept_positions.iter().rev() {
            kept_stride[*p] = stride;
            stride *= self.domains[*p].len();
        }

        let worst = direction.infeasible::<U>();
        let mut best = vec![worst; size];
        let mut choices: Vec<Value> = Vec::with_capacity(size * width);
        for _ in 0..size {
            choices.extend(eliminated_positions.iter().map(|p| self.domains[*p][0]));
        }

        let mut indices = vec![0usize; self.arity()];
        for u in self.utilities.iter().copied() {
            let row: usize = indices.iter().zip(&kept_stride).map(|(i, s)| i * s).sum();
            if direction.is_better(u, best[row]) {
                best[row] = u;
                for (slot, p) in eliminated_positions.iter().enumerate() {
                    choices[row * width + slot] = self.domains[*p][indices[*p]];
                }
            }
            step(&mut indices, &self.domains);
        }

        // Projection of a space whose sentinel differs from the direction's.
        if worst != self.infeasible {
            for u in best.iter_mut() {
                if *u == worst {
                    *u = self.infeasible;
                }
            }
        }

        let projected = Self {
            name: format!("{}/proj", self.name),
            owner: self.owner.clone(),
            variables: variables.clone(),
            domains: domains.clone(),
            utilities: best,
            infeasible: self.infeasible,
        };
        let table = OptTable {
            separator: variables,
            separator_domains: domains,
            eliminated,
            choices,
        };
        Ok((projected, table))
    }
}

fn step(indices: &mut [usize], domains: &[Vec<Value>]) {
    for i in (0..indices.len()).rev() {
        indices[i] += 1;
        if indices[i] < domains[i].len() {
            return;
        }
        indices[i] = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn difference() -> UtilitySpace<i64> {
        UtilitySpace::from_fn("d", vars(&["x", "y"]), vec![vec![0, 1, 2], vec![0, 1, 2]], i64::MAX, |t| {
            (t[0] - t[1]).abs()
        })
        .unwrap()
    }

    #[test]
    fn test_project_minimize_records_arg_min() {
        let (projected, table) = difference().project(&["y"], Direction::Minimize).unwrap();

        assert_eq!(projected.variables(), &vars(&["x"])[..]);
        assert_eq!(projected.utilities(), &[0, 0, 0]);
        assert_eq!(table.separator(), &vars(&["x"])[..]);
        assert_eq!(table.lookup_tuple(&[2]), Some(&[2][..]));
    }

    #[test]
    fn test_project_maximize_breaks_ties_on_lowest_index() {
        let (projected, table) = difference().project(&["y"], Direction::Maximize).unwrap();

        assert_eq!(projected.utilities(), &[2, 1, 2]);
        // x = 1: y = 0 and y = 2 both give 1, the lowest index wins.
        assert_eq!(table.lookup_tuple(&[1]), Some(&[0][..]));
    }

    #[test]
    fn test_project_everything_yields_scalar() {
        let (projected, table) = difference().project(&["x", "y"], Direction::Maximize).unwrap();

        assert_eq!(projected.scalar_value(), Some(2));
        let optimum = table.resolve(&Assignment::new()).unwrap();
        assert_eq!(optimum.get("x"), Some(&0));
        assert_eq!(optimum.get("y"), Some(&2));
    }

    #[test]
    fn test_project_ignores_unknown_variables() {
        let space = difference();
        let (projected, table) = space.project(&["z"], Direction::Minimize).unwrap();
        assert!(projected.equivalent(&space));
        assert!(table.eliminated().is_empty());
        assert_eq!(table.len(), 9);
    }

    #[test]
    fn test_all_infeasible_row_keeps_first_value() {
        let space = UtilitySpace::<i64>::from_fn("h", vars(&["x", "y"]), vec![vec![0, 1], vec![5, 6]], i64::MAX, |t| {
            if t[0] == 0 { i64::MAX } else { t[1] }
        })
        .unwrap();
        let (projected, table) = space.project(&["y"], Direction::Minimize).unwrap();

        assert_eq!(projected.get(&[0]), Some(i64::MAX));
        assert_eq!(table.lookup_tuple(&[0]), Some(&[5][..]));
        assert_eq!(table.lookup_tuple(&[1]), Some(&[5][..]));
    }

    #[test]
    fn test_lookup_reports_missing_and_foreign_values() {
        let (_, table) = difference().project(&["y"], Direction::Minimize).unwrap();

        let empty = Assignment::new();
        assert_eq!(table.lookup(&empty).unwrap_err(), DomainError::MissingValue("x".to_string()));

        let foreign = Assignment::from([("x".to_string(), 7)]);
        assert!(matches!(table.lookup(&foreign), Err(DomainError::ValueOutOfDomain { value: 7, .. })));
    }
}
