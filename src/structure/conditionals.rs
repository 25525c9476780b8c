//! Two-way conditional structuring.
//!
//! Original nodes are scanned in descending reverse postorder so inner
//! conditionals are considered before the conditionals that enclose them.
//! The follow of a conditional is its deepest dominator-tree child that
//! joins two or more in-edges; conditionals without such a join are held on
//! an unresolved stack until an enclosing conditional resolves one.

use log::trace;
use std::collections::HashMap;
use std::hash::Hash;

use crate::dominator::DominatorTree;
use crate::graph::{Graph, NodeId, RpoOrder};
use crate::primitive::{Primitive, PrimitiveKind};
use crate::structure::LoopMarks;

pub(crate) fn structure_two_way<N: Clone + Eq + Hash>(
    g: &Graph<N>,
    dom: &DominatorTree,
    order: &RpoOrder<N>,
    marks: &LoopMarks<N>,
) -> Vec<Primitive<N>> {
    let mut prims = Vec::new();
    let mut unresolved: Vec<N> = Vec::new();

    let mut ids: Vec<NodeId<N>> = g.nodes().map(|n| g.id(n).clone()).collect();
    order.sort_descending(&mut ids);

    for id in ids {
        let Some(node) = g.get(&id) else { continue };
        if g.successors(node).count() != 2
            || marks.is_loop_head(&id)
            || marks.is_loop_latch(&id)
        {
            continue;
        }
        let Some(cond) = id.original().cloned() else {
            continue;
        };

        // Follow: deepest dominator-tree child of the conditional that is
        // a join point (two or more in-edges).
        let mut follow = None;
        for child in dom.dominated_by(node) {
            if g.predecessors(child).count() < 2 {
                continue;
            }
            match follow {
                Some(current) if order.of(g.id(child)) <= order.of(g.id(current)) => {}
                _ => follow = Some(child),
            }
        }

        let Some(follow) = follow else {
            trace!("conditional has no join yet, deferring");
            unresolved.push(cond);
            continue;
        };
        let Some(follow_value) = g.id(follow).original().cloned() else {
            continue;
        };

        // Every deferred conditional inherits this follow: it joins here
        // and nowhere deeper. Each becomes its own primitive and is listed
        // in the resolving conditional's body.
        let mut body = Vec::new();
        while let Some(inner) = unresolved.pop() {
            body.push(inner.clone());
            prims.push(two_way(inner, Vec::new(), follow_value.clone()));
        }
        prims.push(two_way(cond, body, follow_value));
    }
    prims
}

fn two_way<N: Clone>(cond: N, body: Vec<N>, follow: N) -> Primitive<N> {
    let mut extra = HashMap::new();
    extra.insert("cond".to_string(), cond.clone());
    extra.insert("follow".to_string(), follow.clone());
    Primitive {
        kind: PrimitiveKind::TwoWayConditional,
        entry: cond,
        body,
        exit: Some(follow),
        extra,
    }
}
