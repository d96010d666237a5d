// SPDX-License-Identifier: BSD-3-Clause
use rustc_hash::FxHashMap;
use tracing::trace;

use super::{
    relation::{RelationHandler, RelationKind},
    Algorithm, AlgorithmId, Algorithms, AnalysisResult, Content, ContextStep, Literal, ResultId,
    Transform, ValueId, ValueInfo, Work, WorkItem,
};
use crate::constraints::{CallSiteId, Constraints};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Options {
    /// Call-string depth (`k`); 0 is context-insensitive.
    pub contexts: u8,
    /// Longest chain of single-subset results followed when unioning.
    pub inline_depth: usize,
    /// Dump a run summary to stderr
    pub debug: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            contexts: 1,
            inline_depth: 8,
            debug: false,
        }
    }
}

/// Counters describing how much work a run did.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Stats {
    /// Memoized results whose formula was built
    pub results: usize,
    pub states: usize,
    pub elements: usize,
    pub transforms: usize,
    pub retries: usize,
    /// Enumerations that completed by closing a cycle
    pub cycles: usize,
}

impl std::fmt::Display for Stats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "results: {}", self.results)?;
        writeln!(f, "enumeration states: {}", self.states)?;
        writeln!(f, "elements: {}", self.elements)?;
        writeln!(f, "transforms applied: {}", self.transforms)?;
        writeln!(f, "retries: {}", self.retries)?;
        write!(f, "cycles closed: {}", self.cycles)
    }
}

/// The analysis database
///
/// Owns every [`ValueInfo`] and [`AnalysisResult`]; handles are indices into
/// these arenas. Relations are added first, through [`Data::handle`] or the
/// helpers built on it, then sets are queried. Queries compute only what they
/// need, and everything computed is kept for later queries.
#[derive(Debug)]
pub struct Data {
    pub(crate) opts: Options,
    pub(crate) algorithms: Algorithms,
    pub(crate) values: Vec<ValueInfo>,
    pub(crate) results: Vec<AnalysisResult>,
    names: FxHashMap<String, ValueId>,
    /// Bumped whenever any result or enumeration learns something new.
    pub(crate) generation: u64,
    pub(crate) stats: Stats,
    /// Set by the first enumeration; relations are closed from then on.
    pub(crate) queried: bool,
    accessible: ValueId,
    linkable: ValueId,
}

impl Default for Data {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl Data {
    pub fn new(opts: Options) -> Self {
        let mut data = Data {
            opts,
            algorithms: Algorithms::new(),
            values: Vec::new(),
            results: Vec::new(),
            names: FxHashMap::default(),
            generation: 0,
            stats: Stats::default(),
            queried: false,
            accessible: ValueId(0),
            linkable: ValueId(0),
        };
        data.accessible = data.create_region(Some("externally-accessible"));
        data.linkable = data.create_region(Some("externally-linkable"));
        let (accessible, linkable) = (data.accessible, data.linkable);
        // Whatever is linkable from outside is accessible from outside, and
        // so is anything stored in accessible memory.
        data.handle(RelationKind::DependsOn, accessible, linkable, None);
        data.handle(RelationKind::StoredTo, accessible, accessible, None);
        data
    }

    #[inline]
    pub fn options(&self) -> &Options {
        &self.opts
    }

    #[inline]
    pub fn stats(&self) -> Stats {
        self.stats
    }

    #[inline]
    pub fn algorithms(&self) -> &Algorithms {
        &self.algorithms
    }

    #[inline]
    pub fn algorithms_mut(&mut self) -> &mut Algorithms {
        &mut self.algorithms
    }

    // ------------------------------------------------------------------
    // Values

    fn push_value(&mut self, source: Option<&str>, region: bool) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        if let Some(name) = source {
            self.names.entry(name.to_string()).or_insert(id);
        }
        self.values
            .push(ValueInfo::new(source.map(str::to_string), region));
        id
    }

    /// A program value that may hold pointers.
    pub fn create_value(&mut self, source: Option<&str>) -> ValueId {
        self.push_value(source, false)
    }

    /// The address of a memory region, e.g. an allocation site or a global.
    pub fn create_region(&mut self, source: Option<&str>) -> ValueId {
        let v = self.push_value(source, true);
        let pts = self.algorithms.points_to.clone();
        self.get_or_create_result(v, &pts);
        v
    }

    /// Looks a value up by the name it was created with.
    pub fn value(&self, name: &str) -> Option<ValueId> {
        self.names.get(name).copied()
    }

    #[inline]
    pub fn value_info(&self, v: ValueId) -> &ValueInfo {
        &self.values[v.index()]
    }

    pub fn values(&self) -> impl Iterator<Item = ValueId> {
        (0..self.values.len() as u32).map(ValueId)
    }

    pub fn value_name(&self, v: ValueId) -> String {
        match self.values[v.index()].source() {
            Some(name) => name.to_string(),
            None => v.to_string(),
        }
    }

    #[inline]
    pub fn externally_accessible(&self) -> ValueId {
        self.accessible
    }

    #[inline]
    pub fn externally_linkable(&self) -> ValueId {
        self.linkable
    }

    // ------------------------------------------------------------------
    // Call sites and contexts

    pub fn call_site(&mut self, name: &str) -> CallSiteId {
        self.algorithms.site(name)
    }

    /// A context for the call stack `sites`, outermost call first.
    pub fn context(&self, sites: &[CallSiteId]) -> Constraints {
        Constraints::new(usize::from(self.opts.contexts), sites.to_vec())
    }

    pub fn empty_context(&self) -> Constraints {
        Constraints::empty(usize::from(self.opts.contexts))
    }

    // ------------------------------------------------------------------
    // Relations

    pub fn handle(
        &mut self,
        kind: RelationKind,
        src: ValueId,
        dst: ValueId,
        site: Option<CallSiteId>,
    ) {
        if self.queried {
            panic!("Bug! {kind:?} relation {src} -> {dst} added after sets were enumerated");
        }
        RelationHandler.handle(self, kind, src, dst, site)
    }

    /// `v` is visible to code the analysis cannot see.
    pub fn escape(&mut self, v: ValueId) {
        let accessible = self.accessible;
        self.handle(RelationKind::StoredTo, v, accessible, None)
    }

    /// `v` may hold anything visible to code the analysis cannot see.
    pub fn opaque(&mut self, v: ValueId) {
        let accessible = self.accessible;
        self.handle(RelationKind::LoadedFrom, v, accessible, None)
    }

    /// The global `g` may be linked against from outside.
    pub fn link(&mut self, g: ValueId) {
        let linkable = self.linkable;
        self.handle(RelationKind::DependsOn, linkable, g, None)
    }

    // ------------------------------------------------------------------
    // Results

    #[inline]
    pub fn result(&self, r: ResultId) -> &AnalysisResult {
        &self.results[r.index()]
    }

    pub fn result_count(&self) -> usize {
        self.results.len()
    }

    /// The memoized result of `algorithm` on `v`, created on first request.
    pub fn get_or_create_result(&mut self, v: ValueId, algorithm: &AlgorithmId) -> ResultId {
        if let Some(r) = self.values[v.index()].result(algorithm) {
            return r;
        }
        let r = ResultId(self.results.len() as u32);
        self.results
            .push(AnalysisResult::new(Some((v, algorithm.clone()))));
        self.values[v.index()]
            .results
            .insert(algorithm.clone(), r);
        r
    }

    pub fn result_if_present(&self, v: ValueId, algorithm: &AlgorithmId) -> Option<ResultId> {
        self.values[v.index()].result(algorithm)
    }

    /// Finds the result for `algorithm` on `v` the way a transform does:
    /// relation sets that were never created contribute nothing.
    pub(crate) fn lookup(&mut self, v: ValueId, algorithm: &AlgorithmId) -> Option<ResultId> {
        if algorithm.is_empty_if_missing() {
            self.result_if_present(v, algorithm)
        } else {
            Some(self.get_or_create_result(v, algorithm))
        }
    }

    pub(crate) fn new_result(&mut self, owner: Option<(ValueId, AlgorithmId)>) -> ResultId {
        let r = ResultId(self.results.len() as u32);
        self.results.push(AnalysisResult::new(owner));
        r
    }

    /// Returns `false` if `content` was already there.
    pub(crate) fn add_content(&mut self, r: ResultId, content: Content) -> bool {
        let fresh = self.results[r.index()].insert(content);
        if fresh {
            self.generation += 1;
        }
        fresh
    }

    /// Adds `v` to a relation set, as the front end discovers it.
    pub(crate) fn add_value(&mut self, owner: ValueId, algorithm: &AlgorithmId, v: ValueId) {
        let r = self.get_or_create_result(owner, algorithm);
        self.add_content(r, Content::Value(v));
    }

    pub(crate) fn add_work(&mut self, r: ResultId, work: Work) {
        self.generation += 1;
        self.results[r.index()].work.push(WorkItem {
            work,
            exhausted: false,
        });
    }

    /// A transform over `input` that applies `algorithm` after moving
    /// `constraints` (empty if `None`) through `step`.
    pub(crate) fn transform(
        &mut self,
        input: ResultId,
        algorithm: &AlgorithmId,
        step: ContextStep,
        constraints: Option<&Constraints>,
    ) -> Work {
        let constraints = match constraints {
            Some(c) => c.clone(),
            None => self.empty_context(),
        };
        let apply = step
            .apply(&constraints)
            .map(|c| self.algorithms.in_context(algorithm, &c));
        Work::Transform(Transform {
            input,
            position: 0,
            algorithm: algorithm.clone(),
            step,
            constraints,
            apply,
        })
    }

    /// Adds `work` to the points-to set of `v`. Context instances copy it
    /// when they are first evaluated.
    pub(crate) fn add_points_to_work(&mut self, v: ValueId, work: Work) {
        let pts = self.algorithms.points_to.clone();
        let base = self.get_or_create_result(v, &pts);
        self.add_work(base, work);
    }

    // ------------------------------------------------------------------
    // Factories

    /// Builds the initial formula of a memoized result, once.
    pub(crate) fn ensure_seeded(&mut self, r: ResultId) {
        let result = &mut self.results[r.index()];
        if result.seeded {
            return;
        }
        result.seeded = true;
        let Some((v, algorithm)) = result.owner().map(|(v, a)| (v, a.clone())) else {
            return;
        };
        self.stats.results += 1;
        trace!(result = %r, value = %v, algorithm = %algorithm, "seed");
        self.seed(r, v, &algorithm);
    }

    fn seed(&mut self, r: ResultId, v: ValueId, algorithm: &AlgorithmId) {
        let region = self.values[v.index()].is_region();
        match algorithm.kind().clone() {
            Algorithm::Literal(Literal::PointsTo) => {
                if region {
                    self.add_content(r, Content::Value(v));
                }
            }
            Algorithm::Literal(Literal::PointedToBy) => {
                if region {
                    self.add_content(r, Content::Value(v));
                }
                let dependents = self.algorithms.dependents.clone();
                let aliases = self.algorithms.loaded_aliases.clone();
                let work = self.transform(r, &dependents, ContextStep::Keep, None);
                self.add_work(r, work);
                let work = self.transform(r, &aliases, ContextStep::Keep, None);
                self.add_work(r, work);
            }
            Algorithm::Literal(_) | Algorithm::CallSite(..) => (),
            Algorithm::TwoHop(first, second) => {
                if let Some(input) = self.lookup(v, &first) {
                    let work = self.transform(input, &second, ContextStep::Keep, None);
                    self.add_work(r, work);
                }
            }
            Algorithm::ThreeHop(first, second, third) => {
                let rest = self.algorithms.two_hop(&second, &third);
                if let Some(input) = self.lookup(v, &first) {
                    let work = self.transform(input, &rest, ContextStep::Keep, None);
                    self.add_work(r, work);
                }
            }
            Algorithm::InContext(constraints, inner) => {
                if region {
                    self.add_content(r, Content::Value(v));
                }
                let base = self.get_or_create_result(v, &inner);
                let templates: Vec<Work> = self.results[base.index()].templates().cloned().collect();
                for template in templates {
                    let work = self.instantiate(&template, &constraints);
                    self.add_work(r, work);
                }
            }
        }
    }

    /// Specializes a work item of some `points-to` set to `constraints`.
    fn instantiate(&mut self, work: &Work, constraints: &Constraints) -> Work {
        match work {
            Work::Subset(s) => Work::Subset(self.in_context(*s, constraints)),
            Work::Transform(t) => {
                let input = self.in_context(t.input, constraints);
                self.transform(input, &t.algorithm, t.step, Some(constraints))
            }
        }
    }

    /// `points-to` results map to their instance under `constraints`; any
    /// other result is context-free.
    fn in_context(&mut self, r: ResultId, constraints: &Constraints) -> ResultId {
        let pts = self.algorithms.points_to.clone();
        match self.results[r.index()].owner() {
            Some((w, algorithm)) if *algorithm == pts => {
                let specialized = self.algorithms.in_context(&pts, constraints);
                self.get_or_create_result(w, &specialized)
            }
            _ => r,
        }
    }
}
