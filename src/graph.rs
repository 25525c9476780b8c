//! Directed control flow graph with typed nodes.
//!
//! Nodes are either *original* nodes carrying a caller-supplied key, or
//! *interval* nodes introduced when a derived graph collapses an interval.
//! The graph stores nodes in insertion order with compact integer handles
//! and keeps adjacency as deduplicated vectors, so every traversal is
//! deterministic for a given build order.

use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// Identity of a node: the kind together with the key or interval index.
///
/// Two nodes are the same node iff their identities compare equal; a graph
/// holds at most one node per identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeId<N> {
    /// Node of the caller's control flow graph, keyed by an opaque value.
    Original(N),
    /// Collapsed interval of the previous derivation level.
    Interval(usize),
}

impl<N> NodeId<N> {
    /// The caller-supplied key, if this is an original node.
    pub fn original(&self) -> Option<&N> {
        match self {
            NodeId::Original(value) => Some(value),
            NodeId::Interval(_) => None,
        }
    }
}

impl<N: fmt::Display> fmt::Display for NodeId<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Original(value) => write!(f, "{value}"),
            NodeId::Interval(idx) => write!(f, "I({idx})"),
        }
    }
}

/// Handle to a node inside one [`Graph`].
///
/// Handles are dense indices in node-insertion order. They are only
/// meaningful for the graph that produced them; use [`Graph::id`] and
/// [`Graph::get`] to move between graphs of a derived sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeRef(usize);

impl NodeRef {
    pub(crate) fn new(index: usize) -> Self {
        NodeRef(index)
    }

    /// Position of the node in insertion order.
    pub fn index(&self) -> usize {
        self.0
    }
}

type Adjacency = SmallVec<[usize; 4]>;

/// A rooted directed graph over [`NodeId`] identities.
#[derive(Debug, Clone, Default)]
pub struct Graph<N> {
    nodes: Vec<NodeId<N>>,
    lookup: HashMap<NodeId<N>, usize>,
    succs: Vec<Adjacency>,
    preds: Vec<Adjacency>,
    root: Option<usize>,
}

impl<N: Clone + Eq + Hash> Graph<N> {
    /// Creates an empty graph with no root.
    pub fn new() -> Self {
        Graph {
            nodes: Vec::new(),
            lookup: HashMap::new(),
            succs: Vec::new(),
            preds: Vec::new(),
            root: None,
        }
    }

    fn add_node(&mut self, id: NodeId<N>) -> NodeRef {
        if let Some(&index) = self.lookup.get(&id) {
            return NodeRef(index);
        }
        let index = self.nodes.len();
        self.lookup.insert(id.clone(), index);
        self.nodes.push(id);
        self.succs.push(Adjacency::new());
        self.preds.push(Adjacency::new());
        NodeRef(index)
    }

    /// Adds an original node keyed by `value`, or returns the existing node
    /// with that key.
    pub fn add_original(&mut self, value: N) -> NodeRef {
        self.add_node(NodeId::Original(value))
    }

    /// Adds an interval node with the given index, or returns the existing
    /// node with that index.
    pub fn add_interval(&mut self, index: usize) -> NodeRef {
        self.add_node(NodeId::Interval(index))
    }

    /// Looks up a node by identity.
    pub fn get(&self, id: &NodeId<N>) -> Option<NodeRef> {
        self.lookup.get(id).copied().map(NodeRef)
    }

    /// Looks up an original node by its key.
    pub fn get_original(&self, value: &N) -> Option<NodeRef> {
        // Borrowed lookup would need N: Borrow plumbing; keys are cheap to
        // clone by contract.
        self.get(&NodeId::Original(value.clone()))
    }

    /// The identity of a node.
    pub fn id(&self, node: NodeRef) -> &NodeId<N> {
        &self.nodes[node.0]
    }

    /// Marks `node` as the entry node of the graph.
    pub fn set_root(&mut self, node: NodeRef) {
        self.root = Some(node.0);
    }

    /// The entry node, once set.
    pub fn root(&self) -> Option<NodeRef> {
        self.root.map(NodeRef)
    }

    /// Adds the edge `from -> to`. Parallel edges coalesce; self-loops are
    /// permitted.
    pub fn set_edge(&mut self, from: NodeRef, to: NodeRef) {
        if !self.succs[from.0].contains(&to.0) {
            self.succs[from.0].push(to.0);
            self.preds[to.0].push(from.0);
        }
    }

    /// Number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes, in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeRef> + '_ {
        (0..self.nodes.len()).map(NodeRef)
    }

    /// Distinct successors of `node`, in edge-insertion order.
    pub fn successors(&self, node: NodeRef) -> impl Iterator<Item = NodeRef> + '_ {
        self.succs[node.0].iter().map(|&index| NodeRef(index))
    }

    /// Distinct predecessors of `node`, in edge-insertion order.
    pub fn predecessors(&self, node: NodeRef) -> impl Iterator<Item = NodeRef> + '_ {
        self.preds[node.0].iter().map(|&index| NodeRef(index))
    }

    /// Depth-first traversal from the root, visiting each reachable node
    /// exactly once. `pre` runs before a node's successors are explored,
    /// `post` after all of them have been.
    pub fn dfs(&self, mut pre: impl FnMut(NodeRef), mut post: impl FnMut(NodeRef)) {
        let Some(root) = self.root() else { return };
        let mut visited = vec![false; self.nodes.len()];
        let mut stack: Vec<(NodeRef, usize)> = Vec::new();
        visited[root.0] = true;
        pre(root);
        stack.push((root, 0));
        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            let cursor = frame.1;
            frame.1 += 1;
            if let Some(&next) = self.succs[node.0].get(cursor) {
                if !visited[next] {
                    visited[next] = true;
                    pre(NodeRef(next));
                    stack.push((NodeRef(next), 0));
                }
            } else {
                post(node);
                stack.pop();
            }
        }
    }

    /// Computes the reverse postorder numbering of the reachable nodes.
    ///
    /// The counter starts at the total node count and decrements on each
    /// postorder visit, so in a fully reachable graph the root receives 1
    /// and every edge `a -> b` that is not a back-edge has
    /// `order(a) < order(b)`. Nodes never numbered (unreachable ones, and
    /// every node of a graph the numbering was not computed for) read as 0.
    pub fn init_order(&self) -> RpoOrder<N> {
        let mut order = HashMap::with_capacity(self.len());
        let mut num = self.len();
        self.dfs(
            |_| {},
            |node| {
                order.insert(self.id(node).clone(), num);
                num -= 1;
            },
        );
        RpoOrder { order }
    }
}

impl<N: Clone + Eq + Hash + fmt::Display> fmt::Display for Graph<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in self.nodes() {
            write!(f, "{} ->", self.id(node))?;
            for succ in self.successors(node) {
                write!(f, " {}", self.id(succ))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Reverse postorder numbering of one graph, kept outside the graph so the
/// graph itself stays an immutable value during analysis.
#[derive(Debug, Clone)]
pub struct RpoOrder<N> {
    order: HashMap<NodeId<N>, usize>,
}

impl<N: Eq + Hash> RpoOrder<N> {
    /// The reverse postorder number of a node; 0 if it was never numbered.
    pub fn of(&self, id: &NodeId<N>) -> usize {
        self.order.get(id).copied().unwrap_or(0)
    }

    /// Sorts `ids` by ascending reverse postorder number. The sort is
    /// stable, so unnumbered nodes keep their relative order at the front.
    pub fn sort_ascending(&self, ids: &mut [NodeId<N>]) {
        ids.sort_by_key(|id| self.of(id));
    }

    /// Sorts `ids` by descending reverse postorder number.
    pub fn sort_descending(&self, ids: &mut [NodeId<N>]) {
        ids.sort_by_key(|id| std::cmp::Reverse(self.of(id)));
    }
}
