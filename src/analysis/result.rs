// SPDX-License-Identifier: BSD-3-Clause
//! Lazy set formulas
//!
//! An [`AnalysisResult`] is a set defined as the union of the contents
//! discovered so far and a list of pending [`Work`] items that can discover
//! more. Contents only ever grow.

use std::fmt::Display;

use rustc_hash::FxHashSet;

use super::{enumeration::EnumerationState, AlgorithmId, ValueId};
use crate::constraints::{CallSiteId, Constraints};

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ResultId(pub(crate) u32);

impl ResultId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for ResultId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#r{}", self.0)
    }
}

/// One entry of a result's contents.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Content {
    Value(ValueId),
    /// All elements of another result
    Subset(ResultId),
}

/// How a transform changes the call-stack context of what flows through it.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ContextStep {
    Keep,
    /// Entering a callee through a call site
    Push(CallSiteId),
    /// Leaving a callee back to the caller at a call site
    Pop(CallSiteId),
    /// Forget the call path entirely
    Drop,
}

impl ContextStep {
    /// `None` when the context cannot pass through this step.
    pub fn apply(self, constraints: &Constraints) -> Option<Constraints> {
        match self {
            ContextStep::Keep => Some(constraints.clone()),
            ContextStep::Push(site) => Some(constraints.pushed(site)),
            ContextStep::Pop(site) => constraints.popped(site),
            ContextStep::Drop => Some(constraints.cleared()),
        }
    }
}

/// Lazy flat-map: for every element `e` of `input`, union in `algorithm`
/// applied to `e`.
#[derive(Clone, Debug)]
pub struct Transform {
    pub(crate) input: ResultId,
    /// Elements of `input` consumed so far
    pub(crate) position: usize,
    pub(crate) algorithm: AlgorithmId,
    pub(crate) step: ContextStep,
    pub(crate) constraints: Constraints,
    /// `algorithm` specialized to the stepped context; `None` when the step
    /// filters everything out.
    pub(crate) apply: Option<AlgorithmId>,
}

#[derive(Clone, Debug)]
pub enum Work {
    Subset(ResultId),
    Transform(Transform),
}

#[derive(Debug)]
pub(crate) struct WorkItem {
    pub(crate) work: Work,
    pub(crate) exhausted: bool,
}

#[derive(Debug)]
pub struct AnalysisResult {
    owner: Option<(ValueId, AlgorithmId)>,
    pub(crate) contents: Vec<Content>,
    values: FxHashSet<ValueId>,
    subsets: FxHashSet<ResultId>,
    pub(crate) work: Vec<WorkItem>,
    /// Work items before this index are all exhausted.
    pub(crate) next_work: usize,
    /// Whether the owner's algorithm has contributed its initial formula.
    pub(crate) seeded: bool,
    /// State currently driving this result's work, if any.
    pub(crate) driver: Option<ResultId>,
    pub(crate) enumeration: Option<Box<EnumerationState>>,
}

impl AnalysisResult {
    pub(crate) fn new(owner: Option<(ValueId, AlgorithmId)>) -> Self {
        // Relation sets are filled in from outside and have no formula.
        let seeded = match &owner {
            Some((_, algorithm)) => algorithm.is_empty_if_missing(),
            None => true,
        };
        AnalysisResult {
            seeded,
            owner,
            contents: Vec::new(),
            values: FxHashSet::default(),
            subsets: FxHashSet::default(),
            work: Vec::new(),
            next_work: 0,
            driver: None,
            enumeration: None,
        }
    }

    /// The (value, algorithm) pair this result memoizes, or `None` for
    /// anonymous results.
    #[inline]
    pub fn owner(&self) -> Option<(ValueId, &AlgorithmId)> {
        self.owner.as_ref().map(|(v, a)| (*v, a))
    }

    #[inline]
    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    #[inline]
    pub fn contents(&self) -> &[Content] {
        &self.contents
    }

    /// Returns `false` if `content` was already present.
    pub(crate) fn insert(&mut self, content: Content) -> bool {
        let fresh = match content {
            Content::Value(v) => self.values.insert(v),
            Content::Subset(r) => self.subsets.insert(r),
        };
        if fresh {
            self.contents.push(content);
        }
        fresh
    }

    pub(crate) fn has_pending_work(&self) -> bool {
        self.work[self.next_work..].iter().any(|w| !w.exhausted)
    }

    /// Work items that may still contribute.
    pub fn pending(&self) -> impl Iterator<Item = &Work> + '_ {
        self.work[self.next_work..]
            .iter()
            .filter(|w| !w.exhausted)
            .map(|w| &w.work)
    }

    /// Every work item ever attached, exhausted or not.
    pub(crate) fn templates(&self) -> impl Iterator<Item = &Work> + '_ {
        self.work.iter().map(|w| &w.work)
    }

    pub(crate) fn exhaust(&mut self, index: usize) {
        self.work[index].exhausted = true;
        while self.next_work < self.work.len() && self.work[self.next_work].exhausted {
            self.next_work += 1;
        }
    }

    /// Nothing is known and nothing can be discovered.
    pub fn is_known_empty(&self) -> bool {
        if !self.seeded {
            return false;
        }
        match &self.enumeration {
            Some(state) if state.is_done() => state.elements().is_empty(),
            _ => self.contents.is_empty() && !self.has_pending_work(),
        }
    }
}
