// SPDX-License-Identifier: BSD-3-Clause
use either::Either;
use rustc_hash::FxHashSet;
use tracing::trace_span;

use super::{Content, Data, Enumerator, ResultId, ValueId};
use crate::constraints::Constraints;

/// A possibly-unevaluated set of memory regions.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PointsToSet {
    /// Nothing can ever be in this set.
    Empty,
    Lazy(ResultId),
}

impl PointsToSet {
    pub fn result(self) -> Option<ResultId> {
        match self {
            PointsToSet::Empty => None,
            PointsToSet::Lazy(r) => Some(r),
        }
    }
}

impl Data {
    /// Regions `v` may point to, under any calling context.
    pub fn points_to_set(&mut self, v: ValueId) -> PointsToSet {
        let pts = self.algorithms.points_to.clone();
        match self.result_if_present(v, &pts) {
            Some(r) => PointsToSet::Lazy(r),
            None => PointsToSet::Empty,
        }
    }

    /// Regions `v` may point to when its function was reached through the
    /// call string `constraints`.
    pub fn points_to_set_in(&mut self, v: ValueId, constraints: &Constraints) -> PointsToSet {
        let pts = self.algorithms.points_to.clone();
        if self.result_if_present(v, &pts).is_none() {
            return PointsToSet::Empty;
        }
        let specialized = self.algorithms.in_context(&pts, constraints);
        PointsToSet::Lazy(self.get_or_create_result(v, &specialized))
    }

    pub fn union(&mut self, sets: &[PointsToSet]) -> PointsToSet {
        let mut lazy: Vec<ResultId> = sets.iter().filter_map(|s| s.result()).collect();
        lazy.dedup();
        match lazy.as_slice() {
            [] => PointsToSet::Empty,
            [single] => PointsToSet::Lazy(*single),
            _ => {
                let r = self.new_result(None);
                for s in lazy {
                    self.add_content(r, Content::Subset(s));
                }
                PointsToSet::Lazy(r)
            }
        }
    }

    #[inline]
    pub fn enumerate(&self, set: PointsToSet) -> Enumerator {
        Enumerator::new(set)
    }

    /// Computes the whole set.
    pub fn elements(&mut self, set: PointsToSet) -> Vec<ValueId> {
        self.iter(set).collect()
    }

    pub fn iter(&mut self, set: PointsToSet) -> impl Iterator<Item = ValueId> + '_ {
        match set {
            PointsToSet::Empty => Either::Left(std::iter::empty()),
            PointsToSet::Lazy(_) => Either::Right(Enumerator::new(set).iter(self)),
        }
    }

    /// Computes at most one element.
    pub fn is_set_empty(&mut self, set: PointsToSet) -> bool {
        match set {
            PointsToSet::Empty => true,
            PointsToSet::Lazy(r) if self.results[r.index()].is_known_empty() => true,
            PointsToSet::Lazy(_) => Enumerator::new(set).next(self).is_none(),
        }
    }

    /// Enumerates both sets in lockstep and stops at the first common
    /// element.
    pub fn is_set_intersection_empty(&mut self, a: PointsToSet, b: PointsToSet) -> bool {
        if self.is_set_empty(a) || self.is_set_empty(b) {
            return true;
        }
        let span = trace_span!("intersection", ?a, ?b);
        let _span = span.enter();
        let (mut left, mut right) = (Enumerator::new(a), Enumerator::new(b));
        let (mut seen_left, mut seen_right) = (FxHashSet::default(), FxHashSet::default());
        let (mut left_done, mut right_done) = (false, false);
        while !(left_done && right_done) {
            if !left_done {
                match left.next(self) {
                    Some(v) if seen_right.contains(&v) => return false,
                    Some(v) => {
                        seen_left.insert(v);
                    }
                    None => left_done = true,
                }
            }
            if !right_done {
                match right.next(self) {
                    Some(v) if seen_left.contains(&v) => return false,
                    Some(v) => {
                        seen_right.insert(v);
                    }
                    None => right_done = true,
                }
            }
        }
        true
    }

    pub fn may_alias(&mut self, x: ValueId, y: ValueId) -> bool {
        let (a, b) = (self.points_to_set(x), self.points_to_set(y));
        !self.is_set_intersection_empty(a, b)
    }
}
