//! Immediate-dominator tree over a [`Graph`].
//!
//! Backed by petgraph's `simple_fast` (the iterative Cooper/Harvey/Kennedy
//! algorithm). The graph is mirrored into a unit-weight `DiGraph` whose
//! node indices coincide with our dense handles, so queries translate
//! directly.

use petgraph::algo::dominators::{self, Dominators};
use petgraph::graph::{DiGraph, NodeIndex};
use std::hash::Hash;

use crate::graph::{Graph, NodeRef};

/// Dominator tree of a rooted graph.
pub struct DominatorTree {
    inner: Dominators<NodeIndex>,
}

impl DominatorTree {
    /// Computes the dominator tree. Returns `None` when the graph has no
    /// root.
    pub fn new<N: Clone + Eq + Hash>(g: &Graph<N>) -> Option<Self> {
        let root = g.root()?;
        let mut mirror: DiGraph<(), ()> = DiGraph::with_capacity(g.len(), g.len());
        for _ in 0..g.len() {
            mirror.add_node(());
        }
        for node in g.nodes() {
            for succ in g.successors(node) {
                mirror.add_edge(
                    NodeIndex::new(node.index()),
                    NodeIndex::new(succ.index()),
                    (),
                );
            }
        }
        let inner = dominators::simple_fast(&mirror, NodeIndex::new(root.index()));
        Some(DominatorTree { inner })
    }

    /// The immediate dominator of `node`, or `node` itself for the root.
    pub fn dominator_of(&self, node: NodeRef) -> NodeRef {
        self.inner
            .immediate_dominator(NodeIndex::new(node.index()))
            .map(|idom| NodeRef::new(idom.index()))
            .unwrap_or(node)
    }

    /// Whether `a` dominates `b`: `a == b`, or `a` lies on every path from
    /// the root to `b`.
    pub fn dominates(&self, a: NodeRef, b: NodeRef) -> bool {
        let target = NodeIndex::new(a.index());
        let mut current = NodeIndex::new(b.index());
        loop {
            if current == target {
                return true;
            }
            match self.inner.immediate_dominator(current) {
                Some(idom) => current = idom,
                None => return false,
            }
        }
    }

    /// Direct children of `node` in the dominator tree, sorted by handle
    /// for deterministic iteration.
    pub fn dominated_by(&self, node: NodeRef) -> Vec<NodeRef> {
        let idx = NodeIndex::new(node.index());
        let mut children: Vec<NodeRef> = self
            .inner
            .immediately_dominated_by(idx)
            .filter(|&child| child != idx)
            .map(|child| NodeRef::new(child.index()))
            .collect();
        children.sort_unstable();
        children
    }
}
