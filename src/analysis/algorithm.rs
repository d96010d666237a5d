// SPDX-License-Identifier: BSD-3-Clause
//! Algorithm identities
//!
//! An [`AlgorithmId`] names a kind of lazily computed set ("points-to",
//! "stored values", a composition of those, ...). Ids are interned, so the
//! engine compares and hashes them by pointer. They serve as memoization
//! keys in each [`ValueInfo`](super::ValueInfo) and as human-readable
//! provenance in diagnostics.

use std::fmt::Display;

use rustc_hash::FxHashMap;

use crate::{
    arc::UArc,
    constraints::{CallSiteId, Constraints},
};

/// Sets that are either wired directly from relations or computed by a
/// fixed formula.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Literal {
    PointsTo,
    PointedToBy,
    Dependents,
    StoredValues,
    StoreAddresses,
    LoadedValues,
    Arguments,
    ReturnSlots,
}

impl Literal {
    fn name(self) -> &'static str {
        match self {
            Literal::PointsTo => "points-to",
            Literal::PointedToBy => "pointed-to-by",
            Literal::Dependents => "dependents",
            Literal::StoredValues => "stored-values",
            Literal::StoreAddresses => "store-addresses",
            Literal::LoadedValues => "loaded-values",
            Literal::Arguments => "arguments",
            Literal::ReturnSlots => "return-slots",
        }
    }

    /// Sets filled in by the relation handler, as opposed to computed ones.
    fn is_relation(self) -> bool {
        !matches!(self, Literal::PointsTo | Literal::PointedToBy)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum CallSiteOp {
    Push,
    Pop,
}

impl Display for CallSiteOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallSiteOp::Push => write!(f, "push"),
            CallSiteOp::Pop => write!(f, "pop"),
        }
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Algorithm {
    Literal(Literal),
    /// Apply the second algorithm to every element of the first.
    TwoHop(AlgorithmId, AlgorithmId),
    ThreeHop(AlgorithmId, AlgorithmId, AlgorithmId),
    /// A relation set restricted to one call site.
    CallSite(CallSiteOp, CallSiteId, AlgorithmId),
    /// A context-sensitive algorithm evaluated under a call-stack context.
    InContext(Constraints, AlgorithmId),
}

#[derive(Debug)]
pub struct AlgorithmDef {
    kind: Algorithm,
    name: String,
}

/// Interned identity of an [`Algorithm`]
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct AlgorithmId(UArc<AlgorithmDef>);

impl AlgorithmId {
    #[inline]
    pub fn kind(&self) -> &Algorithm {
        &self.0.kind
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn literal(&self) -> Option<Literal> {
        match self.kind() {
            Algorithm::Literal(l) => Some(*l),
            _ => None,
        }
    }

    /// Results of these algorithms only exist once a relation created them.
    /// Looking one up must not create it: absence means "contributes
    /// nothing".
    pub fn is_empty_if_missing(&self) -> bool {
        match self.kind() {
            Algorithm::Literal(l) => l.is_relation(),
            Algorithm::CallSite(..) => true,
            Algorithm::TwoHop(..) | Algorithm::ThreeHop(..) | Algorithm::InContext(..) => false,
        }
    }

    pub fn is_context_sensitive(&self) -> bool {
        matches!(self.kind(), Algorithm::Literal(Literal::PointsTo))
    }

    /// The context this id is specialized to, if any.
    pub fn context(&self) -> Option<(&Constraints, &AlgorithmId)> {
        match self.kind() {
            Algorithm::InContext(constraints, inner) => Some((constraints, inner)),
            _ => None,
        }
    }
}

impl Display for AlgorithmId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.name)
    }
}

/// Interner for [`AlgorithmId`]s, plus the call-site names used to print
/// them.
#[derive(Debug)]
pub struct Algorithms {
    interned: FxHashMap<Algorithm, AlgorithmId>,
    sites: Vec<String>,
    site_ids: FxHashMap<String, CallSiteId>,
    pub(crate) points_to: AlgorithmId,
    pub(crate) pointed_to_by: AlgorithmId,
    pub(crate) dependents: AlgorithmId,
    pub(crate) stored_values: AlgorithmId,
    pub(crate) store_addresses: AlgorithmId,
    pub(crate) loaded_values: AlgorithmId,
    pub(crate) arguments: AlgorithmId,
    pub(crate) return_slots: AlgorithmId,
    /// Values stored into a region: `pointed-to-by/stored-values/points-to`
    pub(crate) content: AlgorithmId,
    /// Values whose loads may yield a pointer held by the input value
    pub(crate) loaded_aliases: AlgorithmId,
}

impl Default for Algorithms {
    fn default() -> Self {
        Self::new()
    }
}

impl Algorithms {
    pub fn new() -> Self {
        let mut interned = FxHashMap::default();
        let mut literal = |l: Literal| {
            let id = AlgorithmId(UArc::new(AlgorithmDef {
                kind: Algorithm::Literal(l),
                name: l.name().to_string(),
            }));
            interned.insert(Algorithm::Literal(l), id.clone());
            id
        };
        let points_to = literal(Literal::PointsTo);
        let pointed_to_by = literal(Literal::PointedToBy);
        let dependents = literal(Literal::Dependents);
        let stored_values = literal(Literal::StoredValues);
        let store_addresses = literal(Literal::StoreAddresses);
        let loaded_values = literal(Literal::LoadedValues);
        let arguments = literal(Literal::Arguments);
        let return_slots = literal(Literal::ReturnSlots);
        let mut algorithms = Algorithms {
            interned,
            sites: Vec::new(),
            site_ids: FxHashMap::default(),
            content: points_to.clone(),
            loaded_aliases: points_to.clone(),
            points_to,
            pointed_to_by,
            dependents,
            stored_values,
            store_addresses,
            loaded_values,
            arguments,
            return_slots,
        };
        algorithms.content = algorithms.three_hop(
            &algorithms.pointed_to_by.clone(),
            &algorithms.stored_values.clone(),
            &algorithms.points_to.clone(),
        );
        let reverse_load =
            algorithms.two_hop(&algorithms.pointed_to_by.clone(), &algorithms.loaded_values.clone());
        algorithms.loaded_aliases = algorithms.three_hop(
            &algorithms.store_addresses.clone(),
            &algorithms.points_to.clone(),
            &reverse_load,
        );
        algorithms
    }

    fn intern(&mut self, kind: Algorithm) -> AlgorithmId {
        if let Some(id) = self.interned.get(&kind) {
            return id.clone();
        }
        let name = self.describe(&kind);
        let id = AlgorithmId(UArc::new(AlgorithmDef {
            kind: kind.clone(),
            name,
        }));
        self.interned.insert(kind, id.clone());
        id
    }

    fn describe(&self, kind: &Algorithm) -> String {
        match kind {
            Algorithm::Literal(l) => l.name().to_string(),
            Algorithm::TwoHop(a, b) => format!("{a}/{b}"),
            Algorithm::ThreeHop(a, b, c) => format!("{a}/{b}/{c}"),
            Algorithm::CallSite(op, site, inner) => {
                format!("{op}[{}]({inner})", self.site_name(*site))
            }
            Algorithm::InContext(constraints, inner) => {
                format!("{inner}@{}", self.describe_constraints(constraints))
            }
        }
    }

    pub fn literal(&mut self, l: Literal) -> AlgorithmId {
        self.intern(Algorithm::Literal(l))
    }

    pub fn two_hop(&mut self, first: &AlgorithmId, second: &AlgorithmId) -> AlgorithmId {
        self.intern(Algorithm::TwoHop(first.clone(), second.clone()))
    }

    pub fn three_hop(
        &mut self,
        first: &AlgorithmId,
        second: &AlgorithmId,
        third: &AlgorithmId,
    ) -> AlgorithmId {
        self.intern(Algorithm::ThreeHop(
            first.clone(),
            second.clone(),
            third.clone(),
        ))
    }

    pub fn call_site(&mut self, op: CallSiteOp, site: CallSiteId, inner: &AlgorithmId) -> AlgorithmId {
        self.intern(Algorithm::CallSite(op, site, inner.clone()))
    }

    /// Specializes `inner` to `constraints`. Context-free algorithms and
    /// empty contexts give back `inner` itself.
    pub fn in_context(&mut self, inner: &AlgorithmId, constraints: &Constraints) -> AlgorithmId {
        if constraints.is_empty() || !inner.is_context_sensitive() {
            return inner.clone();
        }
        self.intern(Algorithm::InContext(constraints.clone(), inner.clone()))
    }

    /// Returns the id for the call site called `name`, numbering it on first
    /// use.
    pub fn site(&mut self, name: &str) -> CallSiteId {
        if let Some(id) = self.site_ids.get(name) {
            return *id;
        }
        let id = CallSiteId(self.sites.len() as u32);
        self.sites.push(name.to_string());
        self.site_ids.insert(name.to_string(), id);
        id
    }

    pub fn find_site(&self, name: &str) -> Option<CallSiteId> {
        self.site_ids.get(name).copied()
    }

    pub fn site_name(&self, site: CallSiteId) -> &str {
        match self.sites.get(site.index()) {
            Some(name) => name,
            None => panic!("Bug! Unknown call site {site}"),
        }
    }

    pub fn describe_constraints(&self, constraints: &Constraints) -> String {
        let names: Vec<&str> = constraints.iter().map(|s| self.site_name(s)).collect();
        format!("[{}]", names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::{Algorithms, CallSiteOp, Literal};
    use crate::constraints::Constraints;

    #[test]
    fn interning_is_structural() {
        let mut algs = Algorithms::new();
        let pts = algs.literal(Literal::PointsTo);
        assert_eq!(pts, algs.points_to);
        let a = algs.two_hop(&pts, &algs.content.clone());
        let b = algs.two_hop(&algs.points_to.clone(), &algs.content.clone());
        assert_eq!(a, b);
        assert_eq!(
            "points-to/pointed-to-by/stored-values/points-to",
            a.name()
        );
    }

    #[test]
    fn composed_names() {
        let mut algs = Algorithms::new();
        let site = algs.site("main:3");
        let args = algs.arguments.clone();
        let pop = algs.call_site(CallSiteOp::Pop, site, &args);
        assert_eq!("pop[main:3](arguments)", pop.name());
        assert!(pop.is_empty_if_missing());
        assert_eq!(
            "store-addresses/points-to/pointed-to-by/loaded-values",
            algs.loaded_aliases.name()
        );
    }

    #[test]
    fn contexts_only_specialize_points_to() {
        let mut algs = Algorithms::new();
        let site = algs.site("f:1");
        let ctx = Constraints::new(1, vec![site]);
        let pts = algs.points_to.clone();
        let specialized = algs.in_context(&pts, &ctx);
        assert_ne!(pts, specialized);
        assert_eq!("points-to@[f:1]", specialized.name());
        assert_eq!(Some((&ctx, &pts)), specialized.context());
        let content = algs.content.clone();
        assert_eq!(content, algs.in_context(&content, &ctx));
        assert_eq!(pts, algs.in_context(&pts, &Constraints::empty(1)));
    }
}
