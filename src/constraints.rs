// SPDX-License-Identifier: BSD-3-Clause
//! Call-stack contexts
//!
//! A [`Constraints`] value is a k-limited call string: the most recent call
//! site comes first, and pushing past `k` sites forgets the oldest one. An
//! empty context is "any caller".
use std::collections::VecDeque;
use std::fmt::Display;

/// Identifies one call site, as numbered by the front end.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CallSiteId(pub(crate) u32);

impl CallSiteId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for CallSiteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "c{}", self.0)
    }
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Constraints {
    k: usize,
    sites: VecDeque<CallSiteId>,
}

impl Constraints {
    /// `initial` is given oldest site first, as a call stack would be
    /// written down.
    pub fn new(k: usize, initial: Vec<CallSiteId>) -> Self {
        let mut constraints = Constraints::empty(k);
        for site in initial {
            constraints.push(site);
        }
        constraints
    }

    pub fn empty(k: usize) -> Self {
        let sites = if k < 8 {
            VecDeque::with_capacity(k)
        } else {
            VecDeque::new()
        };
        Constraints { k, sites }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    #[inline]
    pub fn depth_limit(&self) -> usize {
        self.k
    }

    /// The innermost call site, if any.
    #[inline]
    pub fn top(&self) -> Option<CallSiteId> {
        self.sites.front().copied()
    }

    pub fn push(&mut self, site: CallSiteId) {
        if self.sites.len() >= self.k {
            self.sites.pop_back();
        }
        if self.k > 0 {
            self.sites.push_front(site);
        }
    }

    pub fn pushed(&self, site: CallSiteId) -> Self {
        let mut new = self.clone();
        new.push(site);
        new
    }

    /// Returns from `site`. `None` means this context cannot have been
    /// entered through `site`, i.e. it is not satisfiable with `[site]`.
    pub fn popped(&self, site: CallSiteId) -> Option<Self> {
        let entered = Constraints {
            k: self.k,
            sites: VecDeque::from([site]),
        };
        if !self.is_satisfiable_with(&entered) {
            return None;
        }
        let mut new = self.clone();
        new.sites.pop_front();
        Some(new)
    }

    pub fn cleared(&self) -> Self {
        Constraints::empty(self.k)
    }

    /// Two contexts are satisfiable together when one extends the other
    /// with older call sites.
    pub fn is_satisfiable_with(&self, other: &Constraints) -> bool {
        self.sites
            .iter()
            .zip(other.sites.iter())
            .all(|(a, b)| a == b)
    }

    /// Innermost first.
    pub fn iter(&self) -> impl Iterator<Item = CallSiteId> + '_ {
        self.sites.iter().copied()
    }
}

impl Display for Constraints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, site) in self.sites.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{site}")?;
        }
        write!(f, "]")
    }
}
