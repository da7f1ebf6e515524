// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Slicing: fixing variables to values.

use super::{validate_scope, DomainError, UtilitySpace};
use crate::domain::addable::Addable;
use crate::domain::variable::{Assignment, Value};

impl<U: Addable> UtilitySpace<U> {
    /// Fix each of `variables` to the matching entry of `values` and return
    /// the residual space over the remaining variables. Variables outside the
    /// scope are ignored.
    pub fn slice<S: AsRef<str>>(&self, variables: &[S], values: &[Value]) -> Result<Self, DomainError> {
        if variables.len() != values.len() {
            return Err(DomainError::ScopeMismatch {
                variables: variables.len(),
                domains: values.len(),
            });
        }

        let mut fixed: Vec<Option<usize>> = vec![None; self.arity()];
        for (variable, value) in variables.iter().zip(values) {
            let Some(position) = self.position(variable.as_ref()) else {
                continue;
            };
            let index = self.domains[position]
                .iter()
                .position(|v| v == value)
                .ok_or_else(|| DomainError::ValueOutOfDomain {
                    variable: variable.as_ref().to_string(),
                    value: *value,
                })?;
            fixed[position] = Some(index);
        }

        let free: Vec<usize> = (0..self.arity()).filter(|p| fixed[*p].is_none()).collect();
        let residual_variables: Vec<String> = free.iter().map(|p| self.variables[*p].clone()).collect();
        let residual_domains: Vec<Vec<Value>> = free.iter().map(|p| self.domains[*p].clone()).collect();
        let size = validate_scope(&residual_variables, &residual_domains)?;

        let strides = self.strides();
        let base: usize = fixed
            .iter()
            .zip(&strides)
            .map(|(index, stride)| index.map_or(0, |i| i * stride))
            .sum();

        let mut utilities = Vec::with_capacity(size);
        let mut indices = vec![0usize; free.len()];
        for _ in 0..size {
            let offset: usize = indices.iter().zip(&free).map(|(i, p)| i * strides[*p]).sum();
            utilities.push(self.utilities[base + offset]);
            for k in (0..indices.len()).rev() {
                indices[k] += 1;
                if indices[k] < residual_domains[k].len() {
                    break;
                }
                indices[k] = 0;
            }
        }

        Ok(Self {
            name: format!("{}/slice", self.name),
            owner: self.owner.clone(),
            variables: residual_variables,
            domains: residual_domains,
            utilities,
            infeasible: self.infeasible,
        })
    }

    /// Slice on every variable of `assignment` that is in scope.
    pub fn slice_assignment(&self, assignment: &Assignment) -> Result<Self, DomainError> {
        let (variables, values): (Vec<&String>, Vec<Value>) = assignment
            .iter()
            .filter(|(variable, _)| self.contains(variable))
            .map(|(variable, value)| (variable, *value))
            .unzip();
        self.slice(&variables, &values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube() -> UtilitySpace<i64> {
        UtilitySpace::from_fn(
            "cube",
            vec!["x".into(), "y".into(), "z".into()],
            vec![vec![0, 1], vec![0, 1, 2], vec![0, 1]],
            i64::MAX,
            |t| 100 * t[0] + 10 * t[1] + t[2],
        )
        .unwrap()
    }

    #[test]
    fn test_slice_middle_variable() {
        let sliced = cube().slice(&["y"], &[2]).unwrap();
        assert_eq!(sliced.variables(), &["x".to_string(), "z".to_string()][..]);
        assert_eq!(sliced.utilities(), &[20, 21, 120, 121]);
    }

    #[test]
    fn test_slice_everything_yields_scalar() {
        let sliced = cube().slice(&["z", "x", "y"], &[1, 1, 0]).unwrap();
        assert_eq!(sliced.scalar_value(), Some(101));
    }

    #[test]
    fn test_slice_rejects_values_outside_domain() {
        let err = cube().slice(&["y"], &[9]).unwrap_err();
        assert_eq!(
            err,
            DomainError::ValueOutOfDomain {
                variable: "y".to_string(),
                value: 9
            }
        );
    }

    #[test]
    fn test_slice_assignment_skips_foreign_variables() {
        let assignment = Assignment::from([("x".to_string(), 1), ("w".to_string(), 4)]);
        let sliced = cube().slice_assignment(&assignment).unwrap();
        assert_eq!(sliced.arity(), 2);
        assert_eq!(sliced.get(&[1, 1]), Some(111));
    }
}
