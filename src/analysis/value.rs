// SPDX-License-Identifier: BSD-3-Clause
use std::fmt::Display;

use rustc_hash::FxHashMap;

use super::{AlgorithmId, ResultId};

/// Handle to one program value or memory region.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ValueId(pub(crate) u32);

impl ValueId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for ValueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#v{}", self.0)
    }
}

/// Per-value memoization table
///
/// Maps each [`AlgorithmId`] that has been requested for this value to the
/// one [`AnalysisResult`](super::AnalysisResult) computing it. Entries are
/// never removed during a run.
#[derive(Debug)]
pub struct ValueInfo {
    source: Option<String>,
    region: bool,
    pub(crate) results: FxHashMap<AlgorithmId, ResultId>,
}

impl ValueInfo {
    pub(crate) fn new(source: Option<String>, region: bool) -> Self {
        ValueInfo {
            source,
            region,
            results: FxHashMap::default(),
        }
    }

    /// The program value this node stands for, or `None` if anonymous.
    #[inline]
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Whether this value is the address of a memory region (and so points
    /// to itself).
    #[inline]
    pub fn is_region(&self) -> bool {
        self.region
    }

    #[inline]
    pub fn result(&self, algorithm: &AlgorithmId) -> Option<ResultId> {
        self.results.get(algorithm).copied()
    }

    /// Memoized results, in creation order.
    pub fn results(&self) -> Vec<(&AlgorithmId, ResultId)> {
        let mut results: Vec<_> = self.results.iter().map(|(a, r)| (a, *r)).collect();
        results.sort_by_key(|(_, r)| *r);
        results
    }
}
