// SPDX-License-Identifier: BSD-3-Clause
//! Incremental enumeration
//!
//! Every [`AnalysisResult`](super::AnalysisResult) that is ever enumerated
//! gets an [`EnumerationState`]: the flattened, deduplicated elements found
//! so far, plus a round-robin queue of cursors into the result itself and
//! every subset unioned into it.
//!
//! Asking a state for an element past its end drives the queue until a new
//! element turns up. A state that is asked for more while it is already
//! being driven further up the call chain answers
//! [`ElementStep::RetryStart`] instead of recursing; the caller moves on to
//! other work and comes back later. When a state has gone around its whole
//! queue without anything changing anywhere, either every blocker it saw is
//! gone (the cycle is closed: the state is complete) or some enclosing
//! state still has to make progress, in which case it answers
//! [`ElementStep::RetryContinue`] and remembers that decision until the
//! world changes.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;
use tracing::{debug, trace, trace_span};

use super::{Content, Data, PointsToSet, ResultId, ValueId, Work};

/// Answer to a request for the element at some position.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ElementStep {
    Element(ValueId),
    Complete,
    /// The state is being driven further up; a cycle was found.
    RetryStart(ResultId),
    /// The state is waiting on some state further up.
    RetryContinue(ResultId),
}

/// Answer to a request for the content at some position of one result.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ContentStep {
    Content(Content),
    /// Blocked; the blockers were recorded in the requesting state.
    Retry(ResultId),
    Complete,
}

enum WorkStep {
    Produced(Content),
    Exhausted,
    Retry(ResultId),
}

/// Who is asking: the state whose queue is being drained, and the depth
/// nested requests run at.
#[derive(Clone, Copy, Debug)]
pub(crate) struct EnumerationContext {
    state: ResultId,
    depth: usize,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Cursor {
    result: ResultId,
    index: usize,
}

/// An active state some enumeration had to wait for, as it was when the
/// wait was recorded.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Blocker {
    state: ResultId,
    depth: usize,
    exit_count: u64,
    elements: usize,
}

/// Blockers, deepest first
#[derive(Debug, Default)]
struct RetryState {
    blockers: Vec<Blocker>,
}

impl RetryState {
    fn insert(&mut self, blocker: Blocker) {
        if let Some(existing) = self
            .blockers
            .iter_mut()
            .find(|b| b.state == blocker.state)
        {
            *existing = blocker;
            return;
        }
        let at = self.blockers.partition_point(|b| b.depth > blocker.depth);
        self.blockers.insert(at, blocker);
    }

    fn clear(&mut self) {
        self.blockers.clear();
    }

    fn is_empty(&self) -> bool {
        self.blockers.is_empty()
    }

    fn iter(&self) -> impl Iterator<Item = &Blocker> + '_ {
        self.blockers.iter()
    }
}

#[derive(Debug)]
pub struct EnumerationState {
    elements: Vec<ValueId>,
    members: FxHashSet<ValueId>,
    subsets: FxHashSet<ResultId>,
    queue: VecDeque<Cursor>,
    retry: RetryState,
    depth: Option<usize>,
    exit_count: u64,
    done: bool,
    /// Generation at which the pending `RetryContinue` was decided
    decided_at: Option<u64>,
}

impl EnumerationState {
    fn new(root: ResultId) -> Self {
        let mut subsets = FxHashSet::default();
        subsets.insert(root);
        EnumerationState {
            elements: Vec::new(),
            members: FxHashSet::default(),
            subsets,
            queue: VecDeque::from([Cursor {
                result: root,
                index: 0,
            }]),
            retry: RetryState::default(),
            depth: None,
            exit_count: 0,
            done: false,
            decided_at: None,
        }
    }

    /// Elements in their final enumeration order.
    #[inline]
    pub fn elements(&self) -> &[ValueId] {
        &self.elements
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.done
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.depth.is_some()
    }

    #[inline]
    pub fn exit_count(&self) -> u64 {
        self.exit_count
    }

    /// Every result unioned in so far, the root included.
    pub fn subsets(&self) -> Vec<ResultId> {
        let mut subsets: Vec<_> = self.subsets.iter().copied().collect();
        subsets.sort();
        subsets
    }
}

impl Data {
    pub(crate) fn state(&self, result: ResultId) -> Option<&EnumerationState> {
        self.results[result.index()].enumeration.as_deref()
    }

    fn state_mut(&mut self, result: ResultId) -> &mut EnumerationState {
        let Data { results, stats, .. } = self;
        results[result.index()]
            .enumeration
            .get_or_insert_with(|| {
                stats.states += 1;
                Box::new(EnumerationState::new(result))
            })
    }

    fn blocker_live(&self, blocker: &Blocker) -> bool {
        match self.state(blocker.state) {
            Some(s) => {
                s.depth.is_some()
                    && s.exit_count == blocker.exit_count
                    && s.elements.len() == blocker.elements
            }
            None => false,
        }
    }

    fn decision_holds(&self, result: ResultId) -> bool {
        match self.state(result) {
            Some(s) => {
                s.decided_at == Some(self.generation)
                    && !s.retry.is_empty()
                    && s.retry.iter().all(|b| self.blocker_live(b))
            }
            None => false,
        }
    }

    /// Records that `state` had to wait for `source`.
    fn note_blocker(&mut self, state: ResultId, source: ResultId) {
        if source == state {
            return;
        }
        let Some(s) = self.state(source) else {
            return;
        };
        match s.depth {
            Some(depth) => {
                let blocker = Blocker {
                    state: source,
                    depth,
                    exit_count: s.exit_count,
                    elements: s.elements.len(),
                };
                self.state_mut(state).retry.insert(blocker);
            }
            None => {
                // `source` is itself waiting; wait for whatever it waits for.
                let inherited: Vec<Blocker> = s
                    .retry
                    .iter()
                    .filter(|b| b.state != state && self.blocker_live(b))
                    .copied()
                    .collect();
                let retry = &mut self.state_mut(state).retry;
                for blocker in inherited {
                    retry.insert(blocker);
                }
            }
        }
    }

    fn exit(&mut self, result: ResultId) {
        let state = self.state_mut(result);
        debug_assert!(state.depth.is_some());
        state.depth = None;
        state.exit_count += 1;
    }

    fn finish(&mut self, result: ResultId) {
        let state = self.state_mut(result);
        state.done = true;
        state.queue.clear();
        state.retry.clear();
        state.decided_at = None;
        self.exit(result);
    }

    /// Produces the element at `index` of `result`, computing it if needed.
    pub(crate) fn enumerate_elements(
        &mut self,
        result: ResultId,
        index: usize,
        depth: usize,
    ) -> ElementStep {
        self.queried = true;
        let state = self.state_mut(result);
        if let Some(&v) = state.elements.get(index) {
            return ElementStep::Element(v);
        }
        if state.done {
            return ElementStep::Complete;
        }
        if state.depth.is_some() {
            self.stats.retries += 1;
            return ElementStep::RetryStart(result);
        }
        if self.decision_holds(result) {
            self.stats.retries += 1;
            return ElementStep::RetryContinue(result);
        }

        let state = self.state_mut(result);
        state.depth = Some(depth);
        state.retry.clear();
        state.decided_at = None;
        let cx = EnumerationContext {
            state: result,
            depth: depth + 1,
        };

        // The cursor that blocked first since the last change, and the
        // generation at that time.
        let mut first_blocked: Option<(ResultId, u64)> = None;
        loop {
            let Some(cursor) = self.state_mut(result).queue.front().copied() else {
                self.finish(result);
                return ElementStep::Complete;
            };
            match self.enumerate_content(cursor.result, cursor.index, cx) {
                ContentStep::Complete => {
                    self.state_mut(result).queue.pop_front();
                    first_blocked = None;
                }
                ContentStep::Content(content) => {
                    first_blocked = None;
                    let state = self.state_mut(result);
                    if let Some(front) = state.queue.front_mut() {
                        front.index += 1;
                    }
                    match content {
                        Content::Subset(s) => {
                            if state.subsets.insert(s) {
                                state.queue.push_back(Cursor {
                                    result: s,
                                    index: 0,
                                });
                            }
                        }
                        Content::Value(v) => {
                            if state.members.insert(v) {
                                state.elements.push(v);
                                self.generation += 1;
                                self.stats.elements += 1;
                                trace!(result = %result, value = %v, "element");
                                self.exit(result);
                                return ElementStep::Element(v);
                            }
                        }
                    }
                }
                ContentStep::Retry(_) => {
                    let generation = self.generation;
                    self.state_mut(result).queue.rotate_left(1);
                    match first_blocked {
                        None => first_blocked = Some((cursor.result, generation)),
                        Some((first, seen)) if first == cursor.result => {
                            if seen != generation {
                                first_blocked = Some((first, generation));
                                continue;
                            }
                            // Went all the way around without any change.
                            let live: Vec<Blocker> = match self.state(result) {
                                Some(s) => s
                                    .retry
                                    .iter()
                                    .filter(|b| self.blocker_live(b))
                                    .copied()
                                    .collect(),
                                None => Vec::new(),
                            };
                            if live.is_empty() {
                                debug!(result = %result, "closed cycle");
                                self.stats.cycles += 1;
                                self.finish(result);
                                return ElementStep::Complete;
                            }
                            let state = self.state_mut(result);
                            state.retry.blockers = live;
                            state.decided_at = Some(generation);
                            self.exit(result);
                            return ElementStep::RetryContinue(result);
                        }
                        Some(_) => {}
                    }
                }
            }
        }
    }

    /// Produces the content at `index` of `result`, driving its work if
    /// needed.
    fn enumerate_content(
        &mut self,
        result: ResultId,
        index: usize,
        cx: EnumerationContext,
    ) -> ContentStep {
        self.ensure_seeded(result);
        let r = &self.results[result.index()];
        if let Some(&content) = r.contents.get(index) {
            return ContentStep::Content(content);
        }
        if !r.has_pending_work() {
            return ContentStep::Complete;
        }
        if let Some(driver) = r.driver {
            self.note_blocker(cx.state, driver);
            return ContentStep::Retry(driver);
        }
        self.results[result.index()].driver = Some(cx.state);
        let step = self.drive(result, index, cx);
        self.results[result.index()].driver = None;
        step
    }

    fn drive(&mut self, result: ResultId, index: usize, cx: EnumerationContext) -> ContentStep {
        loop {
            if let Some(&content) = self.results[result.index()].contents.get(index) {
                return ContentStep::Content(content);
            }
            let mut blocked = None;
            let mut produced = false;
            let mut w = self.results[result.index()].next_work;
            while w < self.results[result.index()].work.len() {
                if self.results[result.index()].work[w].exhausted {
                    w += 1;
                    continue;
                }
                match self.drive_work(result, w, cx) {
                    WorkStep::Produced(content) => {
                        if self.add_content(result, content) {
                            produced = true;
                            break;
                        }
                    }
                    WorkStep::Exhausted => {
                        self.results[result.index()].exhaust(w);
                        w += 1;
                    }
                    WorkStep::Retry(source) => {
                        blocked = Some(source);
                        w += 1;
                    }
                }
            }
            if !produced {
                return match blocked {
                    Some(source) => ContentStep::Retry(source),
                    None => ContentStep::Complete,
                };
            }
        }
    }

    fn drive_work(&mut self, result: ResultId, w: usize, cx: EnumerationContext) -> WorkStep {
        let pending = match &self.results[result.index()].work[w].work {
            Work::Subset(s) => Err(*s),
            Work::Transform(t) => Ok((t.input, t.position, t.apply.clone())),
        };
        let (input, mut position, apply) = match pending {
            Ok(transform) => transform,
            Err(s) => {
                self.results[result.index()].exhaust(w);
                return WorkStep::Produced(Content::Subset(self.inline_subset(s)));
            }
        };
        let Some(apply) = apply else {
            return WorkStep::Exhausted;
        };
        loop {
            match self.enumerate_elements(input, position, cx.depth) {
                ElementStep::Element(e) => {
                    position += 1;
                    if let Work::Transform(t) = &mut self.results[result.index()].work[w].work {
                        t.position = position;
                    }
                    self.stats.transforms += 1;
                    if let Some(nested) = self.lookup(e, &apply) {
                        if !self.results[nested.index()].is_known_empty() {
                            return WorkStep::Produced(Content::Subset(nested));
                        }
                    }
                }
                ElementStep::Complete => return WorkStep::Exhausted,
                ElementStep::RetryStart(source) | ElementStep::RetryContinue(source) => {
                    self.note_blocker(cx.state, source);
                    return WorkStep::Retry(source);
                }
            }
        }
    }

    /// Follows chains of results that are nothing but a single subset.
    fn inline_subset(&mut self, subset: ResultId) -> ResultId {
        let mut target = subset;
        for _ in 0..self.opts.inline_depth {
            self.ensure_seeded(target);
            let r = &self.results[target.index()];
            if !r.contents.is_empty()
                || r.work.len() != 1
                || r.enumeration.is_some()
                || r.driver.is_some()
            {
                break;
            }
            match r.work[0].work {
                Work::Subset(inner) if inner != target => target = inner,
                _ => break,
            }
        }
        target
    }
}

/// A restartable position in the elements of a [`PointsToSet`].
///
/// Enumerators hold no borrow of the [`Data`] they read from, so any number
/// of them can walk the same set; they all see the same order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Enumerator {
    set: PointsToSet,
    position: usize,
}

impl Enumerator {
    pub fn new(set: PointsToSet) -> Self {
        Self::at(set, 0)
    }

    pub fn at(set: PointsToSet, position: usize) -> Self {
        Enumerator { set, position }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self, data: &mut Data) -> Option<ValueId> {
        let PointsToSet::Lazy(result) = self.set else {
            return None;
        };
        let span = trace_span!("next", result = %result, position = self.position);
        let _span = span.enter();
        match data.enumerate_elements(result, self.position, 0) {
            ElementStep::Element(v) => {
                self.position += 1;
                Some(v)
            }
            ElementStep::Complete => None,
            ElementStep::RetryStart(source) | ElementStep::RetryContinue(source) => {
                panic!("Bug! Top-level enumeration of {result} blocked on {source}")
            }
        }
    }

    pub fn iter(self, data: &mut Data) -> Iter<'_> {
        Iter {
            enumerator: self,
            data,
        }
    }
}

pub struct Iter<'a> {
    enumerator: Enumerator,
    data: &'a mut Data,
}

impl Iterator for Iter<'_> {
    type Item = ValueId;

    fn next(&mut self) -> Option<Self::Item> {
        self.enumerator.next(self.data)
    }
}
