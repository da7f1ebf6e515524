// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Lazy iteration over the tuples of a space.
//!
//! [`SpaceIter`] walks every tuple in row-major order and can be restarted.
//! [`BoundedIter`] is the branch-and-bound flavour: it only yields tuples
//! that strictly improve the running bound, skips whole blocks of tuples
//! sharing a prefix when the best utility of the block cannot improve it,
//! and stops as soon as the bound reaches the optimum of the space.

use super::UtilitySpace;
use crate::domain::addable::{Addable, Direction};
use crate::domain::variable::Value;

/// Restartable iterator over `(tuple, utility)` pairs.
pub struct SpaceIter<'a, U> {
    space: &'a UtilitySpace<U>,
    next: usize,
}

impl<'a, U: Addable> SpaceIter<'a, U> {
    pub fn reset(&mut self) {
        self.next = 0;
    }
}

impl<'a, U: Addable> Iterator for SpaceIter<'a, U> {
    type Item = (Vec<Value>, U);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.space.size() {
            return None;
        }
        let index = self.next;
        self.next += 1;
        Some((self.space.tuple_at(index), self.space.utilities[index]))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.space.size() - self.next;
        (remaining, Some(remaining))
    }
}

impl<'a, U: Addable> ExactSizeIterator for SpaceIter<'a, U> {}

/// Branch-and-bound iterator over improving tuples.
pub struct BoundedIter<'a, U> {
    space: &'a UtilitySpace<U>,
    direction: Direction,
    initial_bound: U,
    bound: U,
    /// `block_size[k]`: number of tuples sharing a prefix of length `k`.
    block_size: Vec<usize>,
    /// `block_best[k][b]`: best utility inside block `b` of level `k`.
    block_best: Vec<Vec<U>>,
    cursor: usize,
    visited: usize,
}

impl<'a, U: Addable> BoundedIter<'a, U> {
    fn new(space: &'a UtilitySpace<U>, bound: U, direction: Direction) -> Self {
        let arity = space.arity();
        let mut block_size = vec![1usize; arity + 1];
        for k in (0..arity).rev() {
            block_size[k] = block_size[k + 1] * space.domains[k].len();
        }

        // Levels 0..arity; level `arity` would be the utilities themselves.
        let mut block_best: Vec<Vec<U>> = Vec::with_capacity(arity);
        let mut below: Vec<U> = space.utilities.clone();
        for k in (0..arity).rev() {
            let fan_out = space.domains[k].len();
            below = below
                .chunks(fan_out)
                .map(|chunk| {
                    chunk
                        .iter()
                        .copied()
                        .fold(direction.infeasible(), |best, u| direction.best(best, u))
                })
                .collect();
            block_best.push(below.clone());
        }
        block_best.reverse();

        Self {
            space,
            direction,
            initial_bound: bound,
            bound,
            block_size,
            block_best,
            cursor: 0,
            visited: 0,
        }
    }

    /// Current bound: the initial one, or the best utility yielded so far.
    pub fn bound(&self) -> U {
        self.bound
    }

    /// Number of tuples actually inspected, a measure of the pruning.
    pub fn visited(&self) -> usize {
        self.visited
    }

    pub fn reset(&mut self) {
        self.bound = self.initial_bound;
        self.cursor = 0;
        self.visited = 0;
    }

    fn exhausted(&self) -> bool {
        match self.block_best.first().and_then(|level| level.first()) {
            Some(global) => !self.direction.is_better(*global, self.bound),
            None => false,
        }
    }
}

impl<'a, U: Addable> Iterator for BoundedIter<'a, U> {
    type Item = (Vec<Value>, U);

    fn next(&mut self) -> Option<Self::Item> {
        'scan: while self.cursor < self.space.size() {
            if self.exhausted() {
                self.cursor = self.space.size();
                return None;
            }
            for (k, level) in self.block_best.iter().enumerate() {
                let size = self.block_size[k];
                if self.cursor % size == 0 && !self.direction.is_better(level[self.cursor / size], self.bound) {
                    self.cursor += size;
                    continue 'scan;
                }
            }

            let index = self.cursor;
            self.cursor += 1;
            self.visited += 1;
            let utility = self.space.utilities[index];
            if self.direction.is_better(utility, self.bound) {
                self.bound = utility;
                return Some((self.space.tuple_at(index), utility));
            }
        }
        None
    }
}

impl<U: Addable> UtilitySpace<U> {
    pub fn iter(&self) -> SpaceIter<'_, U> {
        SpaceIter { space: self, next: 0 }
    }

    /// Improving tuples only, starting from `bound`.
    pub fn iter_bounded(&self, bound: U, direction: Direction) -> BoundedIter<'_, U> {
        BoundedIter::new(self, bound, direction)
    }
}
