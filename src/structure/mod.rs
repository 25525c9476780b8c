//! Structuring driver: recovers loop and two-way conditional primitives
//! from a rooted control flow graph.

mod conditionals;
mod loops;

use log::debug;
use std::collections::HashMap;
use std::hash::Hash;

use crate::dominator::DominatorTree;
use crate::error::Error;
use crate::graph::{Graph, NodeId};
use crate::primitive::Primitive;

/// Structures the control flow graph into primitives.
///
/// Loops are structured first (driving interval analysis and the derived
/// sequence internally), then two-way conditionals. Per-region failures are
/// collected into the returned error list; the primitives recovered from
/// the rest of the graph are still valid. An empty error list means the
/// whole graph structured cleanly.
///
/// Only reducible (and near-reducible) graphs are supported; on an
/// irreducible graph latches may be misidentified and the typical symptom
/// is a [`Error::LatchResolution`] entry in the error list.
pub fn structure<N: Clone + Eq + Hash>(g: &Graph<N>) -> (Vec<Primitive<N>>, Vec<Error>) {
    let order = g.init_order();
    let Some(dom) = DominatorTree::new(g) else {
        return (Vec::new(), Vec::new());
    };
    let mut marks = LoopMarks::new();
    let mut errors = Vec::new();

    let mut prims = loops::structure_loops(g, &dom, &order, &mut marks, &mut errors);
    prims.extend(conditionals::structure_two_way(g, &dom, &order, &marks));

    debug!(
        "structured {} primitives, {} regions failed",
        prims.len(),
        errors.len()
    );
    (prims, errors)
}

#[derive(Clone, Copy, Default)]
struct Marks {
    is_loop_node: bool,
    is_loop_head: bool,
    is_loop_latch: bool,
}

/// Loop membership marks, kept in a side table so the graph itself is never
/// mutated by the analysis. Marks are only ever set, never cleared.
pub(crate) struct LoopMarks<N> {
    marks: HashMap<NodeId<N>, Marks>,
}

impl<N: Clone + Eq + Hash> LoopMarks<N> {
    fn new() -> Self {
        LoopMarks {
            marks: HashMap::new(),
        }
    }

    fn get(&self, id: &NodeId<N>) -> Marks {
        self.marks.get(id).copied().unwrap_or_default()
    }

    pub(crate) fn is_loop_node(&self, id: &NodeId<N>) -> bool {
        self.get(id).is_loop_node
    }

    pub(crate) fn is_loop_head(&self, id: &NodeId<N>) -> bool {
        self.get(id).is_loop_head
    }

    pub(crate) fn is_loop_latch(&self, id: &NodeId<N>) -> bool {
        self.get(id).is_loop_latch
    }

    pub(crate) fn mark_loop_node(&mut self, id: &NodeId<N>) {
        self.marks.entry(id.clone()).or_default().is_loop_node = true;
    }

    pub(crate) fn mark_loop_head(&mut self, id: &NodeId<N>) {
        self.marks.entry(id.clone()).or_default().is_loop_head = true;
    }

    pub(crate) fn mark_loop_latch(&mut self, id: &NodeId<N>) {
        self.marks.entry(id.clone()).or_default().is_loop_latch = true;
    }
}
