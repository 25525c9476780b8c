//! Interval analysis per Allen/Cocke.
//!
//! An interval I(h) with header h is a maximal single-entry subgraph in
//! which h is the only entry node and every cycle passes through h. The
//! intervals of a graph partition its reachable nodes.

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;

use crate::graph::{Graph, NodeId};
use crate::worklist::HeaderQueue;

/// One interval of a graph.
///
/// Members are stored by identity rather than by graph handle so intervals
/// from different derivation levels can be searched uniformly when mapping
/// collapsed nodes back to the original graph.
#[derive(Debug, Clone)]
pub struct Interval<N> {
    head: NodeId<N>,
    nodes: Vec<NodeId<N>>,
    members: HashSet<NodeId<N>>,
}

impl<N: Clone + Eq + Hash> Interval<N> {
    fn new(head: NodeId<N>) -> Self {
        Interval {
            head: head.clone(),
            nodes: vec![head.clone()],
            members: HashSet::from([head]),
        }
    }

    fn add(&mut self, id: NodeId<N>) {
        if self.members.insert(id.clone()) {
            self.nodes.push(id);
        }
    }

    /// The header node of the interval.
    pub fn head(&self) -> &NodeId<N> {
        &self.head
    }

    /// Whether the interval contains the node.
    pub fn contains(&self, id: &NodeId<N>) -> bool {
        self.members.contains(id)
    }

    /// The members of the interval, header first, in admission order.
    pub fn nodes(&self) -> &[NodeId<N>] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl<N: Clone + Eq + Hash + fmt::Display> fmt::Display for Interval<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "I({}) {{", self.head)?;
        for (i, node) in self.nodes.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{node}")?;
        }
        write!(f, "}}")
    }
}

/// Computes the intervals of `g` until every reachable node belongs to
/// exactly one interval. Returns an empty list when the graph has no root.
pub fn intervals<N: Clone + Eq + Hash>(g: &Graph<N>) -> Vec<Interval<N>> {
    let Some(root) = g.root() else {
        return Vec::new();
    };
    let root_id = g.id(root).clone();

    let mut headers = HeaderQueue::new();
    headers.push(root_id.clone());

    let mut out = Vec::new();
    while let Some(head) = headers.pop() {
        let mut interval = Interval::new(head);

        // Grow: admit any node all of whose predecessors are already
        // inside. Restart the scan after each admission so the scan order
        // stays the graph's node-insertion order.
        while let Some(id) = find_admissible(g, &root_id, &interval) {
            interval.add(id);
        }

        // Propose headers: any outside node with at least one predecessor
        // inside becomes a candidate the first time this happens.
        for node in g.nodes() {
            let id = g.id(node);
            if interval.contains(id) || headers.seen(id) {
                continue;
            }
            if g.predecessors(node).any(|p| interval.contains(g.id(p))) {
                headers.push(id.clone());
            }
        }

        out.push(interval);
    }
    out
}

/// Finds a node outside the interval whose predecessors all lie inside it.
/// The root is a header, never an addable member, and a node without any
/// predecessor is unreachable and never admitted.
fn find_admissible<N: Clone + Eq + Hash>(
    g: &Graph<N>,
    root_id: &NodeId<N>,
    interval: &Interval<N>,
) -> Option<NodeId<N>> {
    'scan: for node in g.nodes() {
        let id = g.id(node);
        if id == root_id || interval.contains(id) {
            continue;
        }
        let mut has_pred = false;
        for pred in g.predecessors(node) {
            if !interval.contains(g.id(pred)) {
                continue 'scan;
            }
            has_pred = true;
        }
        if has_pred {
            return Some(id.clone());
        }
    }
    None
}
