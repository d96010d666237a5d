// SPDX-License-Identifier: BSD-3-Clause
//! Translating program relations into set formulas

use serde::{Deserialize, Serialize};
use tracing::trace_span;

use super::{AlgorithmId, CallSiteOp, ContextStep, Data, ValueId, Work};
use crate::constraints::CallSiteId;

/// A fact about the program, relating a source value to a destination value.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationKind {
    /// `src` may hold whatever `dst` holds.
    DependsOn,
    /// `src` is the result of loading through `dst`.
    LoadedFrom,
    /// `src` is stored through `dst`.
    StoredTo,
    /// Formal parameter `src` receives the argument slot `dst`.
    ArgumentFromCaller,
    /// Actual argument `src` is passed into slot `dst` at a call site.
    ArgumentToCallee,
    /// Return slot `dst` receives the returned value `src`.
    ReturnedFromCallee,
    /// Call result `src` receives return slot `dst` at a call site.
    ReturnedToCaller,
}

impl RelationKind {
    /// Whether the relation is attached to a call site.
    pub fn takes_site(self) -> bool {
        matches!(
            self,
            RelationKind::ArgumentToCallee | RelationKind::ReturnedToCaller
        )
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RelationHandler;

impl RelationHandler {
    pub fn handle(
        &self,
        data: &mut Data,
        kind: RelationKind,
        src: ValueId,
        dst: ValueId,
        site: Option<CallSiteId>,
    ) {
        let span = trace_span!("relation", ?kind, %src, %dst);
        let _span = span.enter();
        match kind {
            RelationKind::DependsOn | RelationKind::ArgumentFromCaller => {
                self.forward(data, src, dst)
            }
            RelationKind::ReturnedFromCallee => self.forward(data, dst, src),
            RelationKind::LoadedFrom => {
                let pts = data.algorithms.points_to.clone();
                let content = data.algorithms.content.clone();
                let loaded_values = data.algorithms.loaded_values.clone();
                let addresses = data.get_or_create_result(dst, &pts);
                let work = data.transform(addresses, &content, ContextStep::Drop, None);
                data.add_points_to_work(src, work);
                data.add_value(dst, &loaded_values, src);
            }
            RelationKind::StoredTo => {
                let pts = data.algorithms.points_to.clone();
                let stored_values = data.algorithms.stored_values.clone();
                let store_addresses = data.algorithms.store_addresses.clone();
                data.add_value(dst, &stored_values, src);
                data.add_value(src, &store_addresses, dst);
                data.get_or_create_result(src, &pts);
                data.get_or_create_result(dst, &pts);
            }
            RelationKind::ArgumentToCallee => {
                let arguments = data.algorithms.arguments.clone();
                self.call_edge(data, dst, src, site, CallSiteOp::Pop, &arguments)
            }
            RelationKind::ReturnedToCaller => {
                let return_slots = data.algorithms.return_slots.clone();
                self.call_edge(data, src, dst, site, CallSiteOp::Push, &return_slots)
            }
        }
    }

    /// `pts(to) ⊇ pts(from)`
    fn forward(&self, data: &mut Data, to: ValueId, from: ValueId) {
        let pts = data.algorithms.points_to.clone();
        let dependents = data.algorithms.dependents.clone();
        let source = data.get_or_create_result(from, &pts);
        data.add_points_to_work(to, Work::Subset(source));
        data.add_value(from, &dependents, to);
    }

    /// `member` flows into `target` across a call boundary. The points-to
    /// set of `target` reads the call-site specific relation set through a
    /// context step, so facts only flow between matching call strings.
    fn call_edge(
        &self,
        data: &mut Data,
        target: ValueId,
        member: ValueId,
        site: Option<CallSiteId>,
        op: CallSiteOp,
        literal: &AlgorithmId,
    ) {
        let (algorithm, step) = match site {
            Some(c) => {
                let step = match op {
                    CallSiteOp::Push => ContextStep::Push(c),
                    CallSiteOp::Pop => ContextStep::Pop(c),
                };
                (data.algorithms.call_site(op, c, literal), step)
            }
            None => (literal.clone(), ContextStep::Drop),
        };
        let fresh = data.result_if_present(target, &algorithm).is_none();
        data.add_value(target, &algorithm, member);
        if fresh {
            let pts = data.algorithms.points_to.clone();
            let relation = data.get_or_create_result(target, &algorithm);
            let work = data.transform(relation, &pts, step, None);
            data.add_points_to_work(target, work);
        }
        let dependents = data.algorithms.dependents.clone();
        data.add_value(member, &dependents, target);
    }
}

#[cfg(test)]
mod tests {
    use super::RelationKind;
    use crate::analysis::{Content, Data, Options, Work};

    #[test]
    fn kinds_use_kebab_case() {
        let kind: RelationKind = serde_json::from_str("\"argument-to-callee\"").unwrap();
        assert_eq!(RelationKind::ArgumentToCallee, kind);
        assert_eq!(
            "\"returned-from-callee\"",
            serde_json::to_string(&RelationKind::ReturnedFromCallee).unwrap()
        );
        assert!(kind.takes_site());
        assert!(!RelationKind::DependsOn.takes_site());
    }

    #[test]
    fn call_edge_creates_one_transform_per_site() {
        let mut data = Data::new(Options::default());
        let x = data.create_value(Some("x"));
        let y = data.create_value(Some("y"));
        let slot = data.create_value(Some("slot"));
        let c = data.call_site("c");
        data.handle(RelationKind::ArgumentToCallee, x, slot, Some(c));
        data.handle(RelationKind::ArgumentToCallee, y, slot, Some(c));
        let pts = data.algorithms.points_to.clone();
        let r = data.result_if_present(slot, &pts).unwrap();
        let transforms = data
            .result(r)
            .pending()
            .filter(|w| matches!(w, Work::Transform(_)))
            .count();
        assert_eq!(1, transforms);

        let dependents = data.algorithms.dependents.clone();
        let deps = data.result_if_present(x, &dependents).unwrap();
        assert_eq!(&[Content::Value(slot)], data.result(deps).contents());
    }

    #[test]
    fn stores_materialize_points_to() {
        let mut data = Data::new(Options::default());
        let s = data.create_value(Some("s"));
        let a = data.create_value(Some("a"));
        data.handle(RelationKind::StoredTo, s, a, None);
        let pts = data.algorithms.points_to.clone();
        assert!(data.result_if_present(s, &pts).is_some());
        assert!(data.result_if_present(a, &pts).is_some());
    }
}
