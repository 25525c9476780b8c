//! Derived sequence of graphs.
//!
//! G⁰ is the input graph; Gⁱ⁺¹ collapses each interval of Gⁱ into a single
//! interval node. The sequence stops when a level no longer shrinks, which
//! for a reducible graph ends at the trivial one-node graph.

use log::debug;
use std::hash::Hash;

use crate::graph::{Graph, NodeId};
use crate::interval::{intervals, Interval};

/// Computes the derived sequence of `g` and the intervals of every level.
///
/// The first returned graph is a copy of `g` and the interval lists are
/// parallel to the graphs. Interval node indices increase monotonically
/// across levels, so index k always refers to the k-th interval of the
/// flattened per-level lists.
pub fn derived_sequence<N: Clone + Eq + Hash>(
    g: &Graph<N>,
) -> (Vec<Graph<N>>, Vec<Vec<Interval<N>>>) {
    let mut graphs = vec![g.clone()];
    let mut levels = vec![intervals(g)];
    let Some(root) = g.root() else {
        return (graphs, levels);
    };
    let mut root_id = g.id(root).clone();
    let mut count = 0usize;

    loop {
        let (next, next_root_id) = {
            let prev = &graphs[graphs.len() - 1];
            let ivs = &levels[levels.len() - 1];
            let mut next = Graph::new();
            let mut collapsed = Vec::with_capacity(ivs.len());
            let mut new_root = root_id.clone();

            // One fresh interval node per interval; the interval holding
            // the previous root becomes the new root.
            for iv in ivs {
                let node = next.add_interval(count);
                if *iv.head() == root_id {
                    next.set_root(node);
                    new_root = NodeId::Interval(count);
                }
                collapsed.push(node);
                count += 1;
            }

            for (j, iv) in ivs.iter().enumerate() {
                let Some(head) = prev.get(iv.head()) else {
                    continue;
                };

                // Incoming edges: predecessors of the header outside the
                // interval, attributed to the interval that holds them.
                for pred in prev.predecessors(head) {
                    let pid = prev.id(pred);
                    if iv.contains(pid) {
                        continue;
                    }
                    for (k, other) in ivs.iter().enumerate() {
                        if other.contains(pid) {
                            next.set_edge(collapsed[k], collapsed[j]);
                        }
                    }
                }

                // Outgoing edges are taken from the header's successors
                // only. Successors of non-header exit nodes are not
                // represented in the collapsed graph, so a cycle that
                // leaves an interval through a non-header node loses that
                // edge at the next level.
                for succ in prev.successors(head) {
                    let sid = prev.id(succ);
                    if iv.contains(sid) {
                        continue;
                    }
                    for (k, other) in ivs.iter().enumerate() {
                        if other.contains(sid) {
                            next.set_edge(collapsed[j], collapsed[k]);
                        }
                    }
                }
            }

            (next, new_root)
        };

        if next.len() == graphs[graphs.len() - 1].len() {
            break;
        }
        debug!(
            "derived level {}: {} nodes collapse to {}",
            graphs.len(),
            graphs[graphs.len() - 1].len(),
            next.len()
        );
        root_id = next_root_id;
        levels.push(intervals(&next));
        graphs.push(next);
    }

    (graphs, levels)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1 -> 2, 2 -> 3, 3 -> 4, 4 -> 2, 2 -> 5, 5 -> 6, 6 -> 1
    fn looped_graph() -> Graph<u32> {
        let mut g = Graph::new();
        let nodes: Vec<_> = (1..=6).map(|v| g.add_original(v)).collect();
        g.set_root(nodes[0]);
        for (from, to) in [(1, 2), (2, 3), (3, 4), (4, 2), (2, 5), (5, 6), (6, 1)] {
            g.set_edge(nodes[from - 1], nodes[to - 1]);
        }
        g
    }

    #[test]
    fn sequence_collapses_to_fixpoint() {
        let g = looped_graph();
        let (graphs, levels) = derived_sequence(&g);
        let lengths: Vec<usize> = graphs.iter().map(Graph::len).collect();
        assert_eq!(lengths, vec![6, 2, 1]);
        assert_eq!(graphs.len(), levels.len());
    }

    #[test]
    fn collapse_is_monotone() {
        let g = looped_graph();
        let (graphs, _) = derived_sequence(&g);
        for pair in graphs.windows(2) {
            assert!(pair[1].len() < pair[0].len());
        }
    }

    #[test]
    fn every_level_keeps_a_root() {
        let g = looped_graph();
        let (graphs, _) = derived_sequence(&g);
        for level in &graphs {
            assert!(level.root().is_some());
        }
    }

    #[test]
    fn interval_indices_match_flattened_order() {
        let g = looped_graph();
        let (graphs, levels) = derived_sequence(&g);
        let flat: Vec<&Interval<u32>> = levels.iter().flatten().collect();
        // Each interval node of level i+1 collapses the interval at its
        // own index in the flattened list.
        for (i, level) in graphs.iter().enumerate().skip(1) {
            for node in level.nodes() {
                let NodeId::Interval(idx) = level.id(node) else {
                    panic!("derived graphs contain interval nodes only");
                };
                let head = flat[*idx].head().clone();
                assert!(levels[i - 1].iter().any(|iv| *iv.head() == head));
            }
        }
    }
}
