// SPDX-License-Identifier: BSD-3-Clause
// To debug a test, try `eprintln!("{}", equations(&data))`

use std::collections::BTreeSet;

use proptest::prelude::*;

use lazypt::{
    analysis::{Enumerator, Stats},
    CallSiteId, Constraints, Data, Options, PointsToSet, RelationKind, ValueId,
};

// ------------------------------------------------------------------
// Helpers

fn options(contexts: u8) -> Options {
    Options {
        contexts,
        ..Options::default()
    }
}

#[allow(dead_code)]
fn equations(data: &Data) -> String {
    let mut out = String::new();
    data.write_equations(&mut out).unwrap();
    out
}

fn names(data: &mut Data, set: PointsToSet) -> BTreeSet<String> {
    let elements = data.elements(set);
    let unique: BTreeSet<ValueId> = elements.iter().copied().collect();
    assert_eq!(unique.len(), elements.len(), "duplicate elements");
    elements.into_iter().map(|v| data.value_name(v)).collect()
}

fn points_to(data: &mut Data, v: ValueId) -> BTreeSet<String> {
    let set = data.points_to_set(v);
    names(data, set)
}

fn set(elems: &[&str]) -> BTreeSet<String> {
    elems.iter().map(|s| s.to_string()).collect()
}

struct Program {
    data: Data,
}

impl Program {
    fn new(contexts: u8) -> Self {
        Program {
            data: Data::new(options(contexts)),
        }
    }

    fn region(&mut self, name: &str) -> ValueId {
        self.data.create_region(Some(name))
    }

    fn value(&mut self, name: &str) -> ValueId {
        self.data.create_value(Some(name))
    }

    fn rel(&mut self, kind: RelationKind, src: ValueId, dst: ValueId) {
        self.data.handle(kind, src, dst, None)
    }

    fn call(&mut self, kind: RelationKind, src: ValueId, dst: ValueId, site: &str) {
        let site = self.data.call_site(site);
        self.data.handle(kind, src, dst, Some(site))
    }
}

/// `f(x) { return x; }`, called as `r1 = f(p1)` at `c1` and `r2 = f(p2)` at
/// `c2`, with `p1 = &a` and `p2 = &b`.
fn identity_program(contexts: u8) -> Program {
    let mut p = Program::new(contexts);
    let a = p.region("a");
    let b = p.region("b");
    let p1 = p.value("p1");
    let p2 = p.value("p2");
    let arg = p.value("f.arg0");
    let x = p.value("f.x");
    let ret = p.value("f.ret");
    let slot = p.value("f.return");
    let r1 = p.value("r1");
    let r2 = p.value("r2");
    p.rel(RelationKind::DependsOn, p1, a);
    p.rel(RelationKind::DependsOn, p2, b);
    p.call(RelationKind::ArgumentToCallee, p1, arg, "c1");
    p.call(RelationKind::ArgumentToCallee, p2, arg, "c2");
    p.rel(RelationKind::ArgumentFromCaller, x, arg);
    p.rel(RelationKind::DependsOn, ret, x);
    p.rel(RelationKind::ReturnedFromCallee, ret, slot);
    p.call(RelationKind::ReturnedToCaller, r1, slot, "c1");
    p.call(RelationKind::ReturnedToCaller, r2, slot, "c2");
    p
}

/// `*addr = v1; v3 = *addr` with `addr = &mem` and `v1 = &a`
fn store_load_program() -> Program {
    let mut p = Program::new(1);
    let a = p.region("a");
    let mem = p.region("mem");
    let addr = p.value("addr");
    let v1 = p.value("v1");
    let v3 = p.value("v3");
    p.rel(RelationKind::DependsOn, v1, a);
    p.rel(RelationKind::DependsOn, addr, mem);
    p.rel(RelationKind::StoredTo, v1, addr);
    p.rel(RelationKind::LoadedFrom, v3, addr);
    p
}

// ------------------------------------------------------------------
// Scenarios

#[test]
fn store_load() {
    let mut p = store_load_program();
    let v1 = p.data.value("v1").unwrap();
    let v3 = p.data.value("v3").unwrap();
    let stored = points_to(&mut p.data, v1);
    let loaded = points_to(&mut p.data, v3);
    assert_eq!(set(&["a"]), stored);
    assert!(loaded.is_superset(&stored));
    assert_eq!(stored, loaded);
}

#[test]
fn store_load_through_copy() {
    // *q = v1 where q = addr, then v3 = *addr
    let mut p = Program::new(1);
    let a = p.region("a");
    let mem = p.region("mem");
    let addr = p.value("addr");
    let q = p.value("q");
    let v1 = p.value("v1");
    let v3 = p.value("v3");
    p.rel(RelationKind::DependsOn, v1, a);
    p.rel(RelationKind::DependsOn, addr, mem);
    p.rel(RelationKind::DependsOn, q, addr);
    p.rel(RelationKind::StoredTo, v1, q);
    p.rel(RelationKind::LoadedFrom, v3, addr);
    assert_eq!(set(&["a"]), points_to(&mut p.data, v3));
    assert!(p.data.may_alias(q, addr));
    assert!(!p.data.may_alias(v1, addr));
}

#[test]
fn double_indirection() {
    // pp = &cell; v = &a; *pp = v; x = *pp; *a = w; y = *x
    let mut p = Program::new(1);
    let a = p.region("a");
    let cell = p.region("cell");
    let pp = p.value("pp");
    let v = p.value("v");
    let x = p.value("x");
    let y = p.value("y");
    let b = p.region("b");
    let w = p.value("w");
    p.rel(RelationKind::DependsOn, pp, cell);
    p.rel(RelationKind::DependsOn, v, a);
    p.rel(RelationKind::StoredTo, v, pp);
    p.rel(RelationKind::LoadedFrom, x, pp);
    p.rel(RelationKind::DependsOn, w, b);
    p.rel(RelationKind::StoredTo, w, a);
    p.rel(RelationKind::LoadedFrom, y, x);
    assert_eq!(set(&["a"]), points_to(&mut p.data, x));
    assert_eq!(set(&["b"]), points_to(&mut p.data, y));
    assert!(p.data.stats().cycles > 0);
}

#[test]
fn parameter_binding() {
    let mut p = identity_program(1);
    let x = p.data.value("f.x").unwrap();
    assert_eq!(set(&["a", "b"]), points_to(&mut p.data, x));
}

#[test]
fn context_separation() {
    let mut p = identity_program(1);
    let x = p.data.value("f.x").unwrap();
    let c1 = p.data.algorithms().find_site("c1").unwrap();
    let c2 = p.data.algorithms().find_site("c2").unwrap();
    let via_c1 = p.data.context(&[c1]);
    let via_c2 = p.data.context(&[c2]);
    let s1 = p.data.points_to_set_in(x, &via_c1);
    let s2 = p.data.points_to_set_in(x, &via_c2);
    assert_eq!(set(&["a"]), names(&mut p.data, s1));
    assert_eq!(set(&["b"]), names(&mut p.data, s2));
    assert!(p.data.is_set_intersection_empty(s1, s2));
}

#[test]
fn return_context() {
    let mut p = identity_program(1);
    let r1 = p.data.value("r1").unwrap();
    let r2 = p.data.value("r2").unwrap();
    assert_eq!(set(&["a"]), points_to(&mut p.data, r1));
    assert_eq!(set(&["b"]), points_to(&mut p.data, r2));
    assert!(!p.data.may_alias(r1, r2));
}

#[test]
fn insensitive_without_contexts() {
    let mut p = identity_program(0);
    let x = p.data.value("f.x").unwrap();
    let r1 = p.data.value("r1").unwrap();
    let c1 = p.data.call_site("c1");
    let via_c1 = p.data.context(&[c1]);
    assert!(via_c1.is_empty());
    let s = p.data.points_to_set_in(x, &via_c1);
    assert_eq!(set(&["a", "b"]), names(&mut p.data, s));
    assert_eq!(set(&["a", "b"]), points_to(&mut p.data, r1));
}

#[test]
fn site_free_calls_are_insensitive() {
    let mut p = Program::new(1);
    let a = p.region("a");
    let actual = p.value("actual");
    let slot = p.value("slot");
    let formal = p.value("formal");
    p.rel(RelationKind::DependsOn, actual, a);
    p.rel(RelationKind::ArgumentToCallee, actual, slot);
    p.rel(RelationKind::ArgumentFromCaller, formal, slot);
    let c = p.data.call_site("elsewhere");
    let via = p.data.context(&[c]);
    let s = p.data.points_to_set_in(formal, &via);
    assert_eq!(set(&["a"]), names(&mut p.data, s));
}

#[test]
fn cycles_terminate() {
    let mut p = Program::new(1);
    let a = p.region("a");
    let b = p.region("b");
    let x = p.value("x");
    let y = p.value("y");
    let z = p.value("z");
    p.rel(RelationKind::DependsOn, x, y);
    p.rel(RelationKind::DependsOn, y, z);
    p.rel(RelationKind::DependsOn, z, x);
    p.rel(RelationKind::DependsOn, x, a);
    p.rel(RelationKind::DependsOn, z, b);
    for v in [x, y, z] {
        assert_eq!(set(&["a", "b"]), points_to(&mut p.data, v));
    }
}

#[test]
fn recursive_store_load_cycle() {
    // A linked list: node = &cell; *node = node; next = *node; node = next
    let mut p = Program::new(1);
    let cell = p.region("cell");
    let node = p.value("node");
    let next = p.value("next");
    p.rel(RelationKind::DependsOn, node, cell);
    p.rel(RelationKind::StoredTo, node, node);
    p.rel(RelationKind::LoadedFrom, next, node);
    p.rel(RelationKind::DependsOn, node, next);
    assert_eq!(set(&["cell"]), points_to(&mut p.data, next));
    assert_eq!(set(&["cell"]), points_to(&mut p.data, node));
}

// ------------------------------------------------------------------
// Engine properties

#[test]
fn determinism() {
    let order = |data: &mut Data| {
        let v3 = data.value("v3").unwrap();
        let set = data.points_to_set(v3);
        let acc = data.externally_accessible();
        let all = data.points_to_set(acc);
        let u = data.union(&[set, all]);
        data.elements(u)
    };
    let mut first = store_load_program();
    let mut second = store_load_program();
    assert_eq!(order(&mut first.data), order(&mut second.data));

    let mut p = identity_program(1);
    let x = p.data.value("f.x").unwrap();
    let set = p.data.points_to_set(x);
    let mut e1 = p.data.enumerate(set);
    let mut e2 = p.data.enumerate(set);
    let mut seen1 = Vec::new();
    let mut seen2 = Vec::new();
    while let Some(v) = e1.next(&mut p.data) {
        seen1.push(v);
        if let Some(w) = e2.next(&mut p.data) {
            seen2.push(w);
        }
    }
    seen2.extend(e2.iter(&mut p.data));
    assert_eq!(seen1, seen2);
}

#[test]
fn resumability() {
    let mut p = identity_program(1);
    let x = p.data.value("f.x").unwrap();
    let r2 = p.data.value("r2").unwrap();
    let set = p.data.points_to_set(x);
    let mut e = Enumerator::new(set);
    let first = e.next(&mut p.data).unwrap();
    assert_eq!(1, e.position());
    // Unrelated work in between
    points_to(&mut p.data, r2);
    let second = e.next(&mut p.data).unwrap();
    assert_eq!(None, e.next(&mut p.data));
    let fresh: Vec<ValueId> = Enumerator::at(set, 0).iter(&mut p.data).collect();
    assert_eq!(vec![first, second], fresh);
    assert_eq!(Some(second), Enumerator::at(set, 1).next(&mut p.data));
}

#[test]
fn empty_fast_path() {
    let mut p = Program::new(1);
    let lonely = p.value("lonely");
    let before: Stats = p.data.stats();
    let results = p.data.result_count();
    let set = p.data.points_to_set(lonely);
    assert_eq!(PointsToSet::Empty, set);
    assert_eq!(None, p.data.enumerate(set).next(&mut p.data));
    assert!(p.data.is_set_empty(set));
    assert_eq!(before, p.data.stats());
    assert_eq!(results, p.data.result_count());
}

#[test]
fn memoization() {
    let mut p = store_load_program();
    let v3 = p.data.value("v3").unwrap();
    let first = p.data.points_to_set(v3);
    points_to(&mut p.data, v3);
    let stats = p.data.stats();
    let results = p.data.result_count();
    assert_eq!(first, p.data.points_to_set(v3));
    points_to(&mut p.data, v3);
    assert_eq!(stats.results, p.data.stats().results);
    assert_eq!(stats.states, p.data.stats().states);
    assert_eq!(results, p.data.result_count());
}

#[test]
fn intersection_stops_early() {
    let mut p = Program::new(1);
    let a = p.region("a");
    let b = p.region("b");
    let c = p.region("c");
    let x = p.value("x");
    let y = p.value("y");
    p.rel(RelationKind::DependsOn, x, a);
    p.rel(RelationKind::DependsOn, x, b);
    p.rel(RelationKind::DependsOn, y, a);
    p.rel(RelationKind::DependsOn, y, c);
    assert!(p.data.may_alias(x, y));
    let (sx, sb) = (p.data.points_to_set(x), p.data.points_to_set(b));
    let sc = p.data.points_to_set(c);
    assert!(!p.data.is_set_intersection_empty(sx, sb));
    assert!(p.data.is_set_intersection_empty(sx, sc));
}

#[test]
fn escaped_values_reach_opaque_ones() {
    let mut p = Program::new(1);
    let a = p.region("a");
    let g = p.region("g");
    let x = p.value("x");
    let y = p.value("y");
    p.rel(RelationKind::DependsOn, x, a);
    p.data.escape(x);
    p.data.opaque(y);
    p.data.link(g);
    let got = points_to(&mut p.data, y);
    assert!(got.contains("a"), "{got:?}");
    assert!(got.contains("g"), "{got:?}");
    assert!(got.contains("externally-accessible"), "{got:?}");
}

// ------------------------------------------------------------------
// Comparison with an eager fixpoint

#[derive(Clone, Debug)]
struct Fact {
    kind: RelationKind,
    src: usize,
    dst: usize,
    site: Option<u8>,
}

const KINDS: [RelationKind; 7] = [
    RelationKind::DependsOn,
    RelationKind::LoadedFrom,
    RelationKind::StoredTo,
    RelationKind::ArgumentFromCaller,
    RelationKind::ArgumentToCallee,
    RelationKind::ReturnedFromCallee,
    RelationKind::ReturnedToCaller,
];

fn fact(values: usize) -> impl Strategy<Value = Fact> {
    (0..KINDS.len(), 0..values, 0..values, 0u8..3).prop_map(|(k, src, dst, site)| {
        let kind = KINDS[k];
        Fact {
            kind,
            src,
            dst,
            site: if kind.takes_site() && site < 2 {
                Some(site)
            } else {
                None
            },
        }
    })
}

/// Plain Andersen-style fixpoint over the same facts, with the sentinels
/// wired the same way.
fn eager(values: usize, regions: &[usize], facts: &[Fact]) -> Vec<BTreeSet<usize>> {
    let mut pts = vec![BTreeSet::new(); values];
    let mut mem = vec![BTreeSet::new(); values];
    for r in regions {
        pts[*r].insert(*r);
    }
    let mut changed = true;
    while changed {
        changed = false;
        for f in facts {
            let (src, dst) = (f.src, f.dst);
            let (to, from): (usize, BTreeSet<usize>) = match f.kind {
                RelationKind::DependsOn
                | RelationKind::ArgumentFromCaller
                | RelationKind::ArgumentToCallee
                | RelationKind::ReturnedFromCallee
                | RelationKind::ReturnedToCaller => (pick_to(f), pts[pick_from(f)].clone()),
                RelationKind::StoredTo => {
                    let stored = pts[src].clone();
                    for m in pts[dst].clone() {
                        let before = mem[m].len();
                        mem[m].extend(stored.iter().copied());
                        changed |= mem[m].len() != before;
                    }
                    continue;
                }
                RelationKind::LoadedFrom => {
                    let mut loaded = BTreeSet::new();
                    for m in &pts[dst] {
                        loaded.extend(mem[*m].iter().copied());
                    }
                    (src, loaded)
                }
            };
            let before = pts[to].len();
            pts[to].extend(from);
            changed |= pts[to].len() != before;
        }
    }
    pts
}

/// Where the flow of a copy-like fact goes to...
fn pick_to(f: &Fact) -> usize {
    match f.kind {
        RelationKind::DependsOn
        | RelationKind::ArgumentFromCaller
        | RelationKind::ReturnedToCaller => f.src,
        _ => f.dst,
    }
}

/// ...and where it comes from.
fn pick_from(f: &Fact) -> usize {
    match f.kind {
        RelationKind::DependsOn
        | RelationKind::ArgumentFromCaller
        | RelationKind::ReturnedToCaller => f.dst,
        _ => f.src,
    }
}

/// Loads random facts into a fresh database. Returns the database, every
/// value in creation order and the facts that referred to existing values.
fn random_program(
    opts: Options,
    regions: usize,
    others: usize,
    facts: &[Fact],
) -> (Data, Vec<ValueId>, Vec<Fact>) {
    let mut data = Data::new(opts);
    for i in 0..regions {
        data.create_region(Some(format!("m{i}").as_str()));
    }
    for i in 0..others {
        data.create_value(Some(format!("v{i}").as_str()));
    }
    for s in 0..2 {
        data.call_site(&format!("c{s}"));
    }
    let values: Vec<ValueId> = data.values().collect();
    let n = values.len();
    let facts: Vec<Fact> = facts
        .iter()
        .filter(|f| f.src < n && f.dst < n)
        .cloned()
        .collect();
    for f in &facts {
        let site = f.site.map(|s| data.call_site(&format!("c{s}")));
        data.handle(f.kind, values[f.src], values[f.dst], site);
    }
    (data, values, facts)
}

fn indices(data: &mut Data, set: PointsToSet) -> BTreeSet<usize> {
    let elements = data.elements(set);
    let got: BTreeSet<usize> = elements.iter().map(|e| e.index()).collect();
    assert_eq!(got.len(), elements.len(), "duplicate elements");
    got
}

/// Every call string over the sites `c0` and `c1`, up to `k` sites deep.
fn contexts(data: &Data, k: u8) -> Vec<Constraints> {
    let sites: Vec<CallSiteId> = (0..2)
        .filter_map(|s| data.algorithms().find_site(&format!("c{s}")))
        .collect();
    let mut stacks: Vec<Vec<CallSiteId>> = vec![Vec::new()];
    let mut frontier = stacks.clone();
    for _ in 0..k {
        frontier = frontier
            .iter()
            .flat_map(|stack| {
                sites.iter().map(move |s| {
                    let mut next = stack.clone();
                    next.push(*s);
                    next
                })
            })
            .collect();
        stacks.extend(frontier.iter().cloned());
    }
    stacks.iter().map(|stack| data.context(stack)).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn lazy_matches_eager(
        regions in 1usize..4,
        others in 1usize..6,
        facts in prop::collection::vec(fact(11), 0..24),
    ) {
        let (mut data, values, facts) = random_program(options(0), regions, others, &facts);
        let acc = data.externally_accessible().index();
        let link = data.externally_linkable().index();
        let mut region_ids = vec![acc, link];
        region_ids.extend((0..regions).map(|i| values[i + 2].index()));

        let mut all = facts.clone();
        all.push(Fact { kind: RelationKind::DependsOn, src: acc, dst: link, site: None });
        all.push(Fact { kind: RelationKind::StoredTo, src: acc, dst: acc, site: None });
        let expected = eager(values.len(), &region_ids, &all);

        for v in &values {
            let set = data.points_to_set(*v);
            let got = indices(&mut data, set);
            prop_assert_eq!(&expected[v.index()], &got, "value {}", data.value_name(*v));
        }
    }

    #[test]
    fn inlining_does_not_change_sets(
        k in 0u8..3,
        regions in 1usize..4,
        others in 1usize..6,
        facts in prop::collection::vec(fact(11), 0..24),
    ) {
        let plain_opts = Options { inline_depth: 0, ..options(k) };
        let (mut plain, values, _) = random_program(plain_opts, regions, others, &facts);
        let (mut inlined, _, _) = random_program(options(k), regions, others, &facts);
        let ctxs = contexts(&plain, k);
        for v in &values {
            for ctx in &ctxs {
                let left = plain.points_to_set_in(*v, ctx);
                let left = indices(&mut plain, left);
                let right = inlined.points_to_set_in(*v, ctx);
                let right = indices(&mut inlined, right);
                prop_assert_eq!(
                    left,
                    right,
                    "value {} in {}",
                    plain.value_name(*v),
                    ctx
                );
            }
        }
    }

    #[test]
    fn contexts_refine_base_sets(
        k in 1u8..3,
        regions in 1usize..4,
        others in 1usize..6,
        facts in prop::collection::vec(fact(11), 0..24),
    ) {
        let (mut data, values, _) = random_program(options(k), regions, others, &facts);
        let ctxs = contexts(&data, k);
        for v in &values {
            let base = data.points_to_set(*v);
            let base = indices(&mut data, base);
            for ctx in &ctxs {
                let set = data.points_to_set_in(*v, ctx);
                let refined = indices(&mut data, set);
                prop_assert!(
                    refined.is_subset(&base),
                    "value {} in {}: {:?} not within {:?}",
                    data.value_name(*v),
                    ctx,
                    refined,
                    base
                );
            }
        }
    }

    #[test]
    fn query_order_is_irrelevant(
        k in 0u8..3,
        regions in 1usize..4,
        others in 1usize..6,
        facts in prop::collection::vec(fact(11), 0..24),
    ) {
        let (mut forward, values, _) = random_program(options(k), regions, others, &facts);
        let (mut backward, _, _) = random_program(options(k), regions, others, &facts);
        let ctxs = contexts(&forward, k);
        let queries: Vec<(ValueId, usize)> = values
            .iter()
            .flat_map(|v| (0..ctxs.len()).map(move |c| (*v, c)))
            .collect();

        let mut first = Vec::new();
        for (v, c) in &queries {
            let set = forward.points_to_set_in(*v, &ctxs[*c]);
            first.push(indices(&mut forward, set));
        }
        let mut second = vec![BTreeSet::new(); queries.len()];
        for (i, (v, c)) in queries.iter().enumerate().rev() {
            let set = backward.points_to_set_in(*v, &ctxs[*c]);
            second[i] = indices(&mut backward, set);
        }
        prop_assert_eq!(first, second);
    }
}
