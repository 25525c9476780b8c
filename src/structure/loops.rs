//! Loop structuring over the derived sequence.
//!
//! Every interval at every derivation level is a loop candidate: a
//! back-edge into the interval header from inside the interval identifies
//! the latch. Latches found in a collapsed graph are mapped back to the
//! original control flow graph before the loop is classified.

use log::{debug, trace};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use crate::dominator::DominatorTree;
use crate::error::{Error, Result};
use crate::graph::{Graph, NodeId, RpoOrder};
use crate::interval::Interval;
use crate::primitive::{Primitive, PrimitiveKind};
use crate::sequence::derived_sequence;
use crate::structure::LoopMarks;

pub(crate) fn structure_loops<N: Clone + Eq + Hash>(
    g: &Graph<N>,
    dom: &DominatorTree,
    order: &RpoOrder<N>,
    marks: &mut LoopMarks<N>,
    errors: &mut Vec<Error>,
) -> Vec<Primitive<N>> {
    let (graphs, levels) = derived_sequence(g);
    let flat: Vec<&Interval<N>> = levels.iter().flatten().collect();

    let mut prims = Vec::new();
    for (level, ivs) in levels.iter().enumerate() {
        for interval in ivs {
            let (head, latch) = match find_latch(g, &graphs[level], interval, &flat, order) {
                Ok(Some(pair)) => pair,
                Ok(None) => continue,
                Err(err) => {
                    errors.push(err);
                    continue;
                }
            };

            // An outer pass never re-claims a latch that already belongs
            // to an inner loop.
            if marks.is_loop_node(&latch) {
                trace!("latch already claimed, skipping interval at level {level}");
                continue;
            }
            marks.mark_loop_latch(&latch);

            let nodes = mark_nodes_in_loop(g, &head, &latch, dom, order, marks);
            let kind = match find_loop_kind(g, &head, &latch, &nodes) {
                Ok(kind) => kind,
                Err(err) => {
                    errors.push(err);
                    continue;
                }
            };
            let follow = match find_loop_follow(g, kind, &head, &latch, &nodes, order) {
                Ok(follow) => follow,
                Err(err) => {
                    errors.push(err);
                    continue;
                }
            };

            let (Some(entry), Some(latch_value)) = (head.original(), latch.original()) else {
                errors.push(Error::LatchResolution);
                continue;
            };

            let mut extra = HashMap::new();
            extra.insert("latch".to_string(), latch_value.clone());
            let mut exit = None;
            if let Some(follow_value) = follow.as_ref().and_then(NodeId::original) {
                extra.insert("follow".to_string(), follow_value.clone());
                exit = Some(follow_value.clone());
            }

            let body: Vec<N> = nodes
                .iter()
                .filter(|id| follow.as_ref() != Some(*id))
                .filter_map(|id| id.original().cloned())
                .collect();

            debug!("{kind} with {} body nodes at level {level}", body.len());
            prims.push(Primitive {
                kind,
                entry: entry.clone(),
                body,
                exit,
                extra,
            });
        }
    }
    prims
}

/// Locates the loop latch of an interval: the in-interval predecessor of
/// the header with the deepest reverse postorder number. Returns the loop
/// header and latch as original-graph nodes, or `None` when the interval
/// has no back-edge.
fn find_latch<N: Clone + Eq + Hash>(
    g: &Graph<N>,
    level_graph: &Graph<N>,
    interval: &Interval<N>,
    flat: &[&Interval<N>],
    order: &RpoOrder<N>,
) -> Result<Option<(NodeId<N>, NodeId<N>)>> {
    let Some(head) = level_graph.get(interval.head()) else {
        return Ok(None);
    };

    let mut latch: Option<NodeId<N>> = None;
    for pred in level_graph.predecessors(head) {
        let pid = level_graph.id(pred);
        if !interval.contains(pid) {
            continue;
        }
        match &latch {
            Some(current) if order.of(pid) <= order.of(current) => {}
            _ => latch = Some(pid.clone()),
        }
    }
    let Some(latch) = latch else {
        return Ok(None);
    };

    match &latch {
        // A latch that is itself an original node needs no translation.
        NodeId::Original(_) => Ok(Some((interval.head().clone(), latch))),
        NodeId::Interval(_) => {
            let head = find_orig_head(interval.head().clone(), flat);
            let Some(head_ref) = g.get(&head) else {
                return Err(Error::LatchResolution);
            };
            // Candidate latches: original-graph predecessors of the head
            // at or beyond it in reverse postorder, deepest first.
            let head_order = order.of(&head);
            let mut cands: Vec<NodeId<N>> = g
                .predecessors(head_ref)
                .map(|p| g.id(p).clone())
                .filter(|id| order.of(id) >= head_order)
                .collect();
            order.sort_descending(&mut cands);
            let latch = find_orig_latch(&latch, &cands, flat)?;
            Ok(Some((head, latch)))
        }
    }
}

/// Descends header-of-interval chains until the header is an original node.
fn find_orig_head<N: Clone + Eq + Hash>(mut head: NodeId<N>, flat: &[&Interval<N>]) -> NodeId<N> {
    let mut visited = HashSet::new();
    while let NodeId::Interval(idx) = head {
        if !visited.insert(idx) {
            break;
        }
        match flat.get(idx) {
            Some(interval) => head = interval.head().clone(),
            None => break,
        }
    }
    head
}

/// Resolves a collapsed latch to the original-graph candidate contained in
/// its interval, searching nested interval layers.
fn find_orig_latch<N: Clone + Eq + Hash>(
    latch: &NodeId<N>,
    cands: &[NodeId<N>],
    flat: &[&Interval<N>],
) -> Result<NodeId<N>> {
    let NodeId::Interval(idx) = latch else {
        return Ok(latch.clone());
    };
    let Some(interval) = flat.get(*idx).copied() else {
        return Err(Error::LatchResolution);
    };
    for cand in cands {
        let mut visited = HashSet::from([*idx]);
        if contains_original(interval, cand, flat, &mut visited) {
            return Ok(cand.clone());
        }
    }
    Err(Error::LatchResolution)
}

/// Whether `target` is a transitive member of the interval, looking through
/// nested interval nodes. `visited` guards against revisiting an interval
/// index.
fn contains_original<N: Clone + Eq + Hash>(
    interval: &Interval<N>,
    target: &NodeId<N>,
    flat: &[&Interval<N>],
    visited: &mut HashSet<usize>,
) -> bool {
    for node in interval.nodes() {
        match node {
            NodeId::Original(_) => {
                if node == target {
                    return true;
                }
            }
            NodeId::Interval(idx) => {
                if visited.insert(*idx) {
                    if let Some(inner) = flat.get(*idx).copied() {
                        if contains_original(inner, target, flat, visited) {
                            return true;
                        }
                    }
                }
            }
        }
    }
    false
}

/// Collects and marks the loop body: the header plus every node strictly
/// between header and latch in reverse postorder that the header dominates.
fn mark_nodes_in_loop<N: Clone + Eq + Hash>(
    g: &Graph<N>,
    head: &NodeId<N>,
    latch: &NodeId<N>,
    dom: &DominatorTree,
    order: &RpoOrder<N>,
    marks: &mut LoopMarks<N>,
) -> Vec<NodeId<N>> {
    let mut nodes = vec![head.clone()];
    marks.mark_loop_node(head);
    marks.mark_loop_head(head);

    let Some(head_ref) = g.get(head) else {
        return nodes;
    };
    let head_order = order.of(head);
    let latch_order = order.of(latch);

    let mut all: Vec<NodeId<N>> = g.nodes().map(|n| g.id(n).clone()).collect();
    order.sort_ascending(&mut all);
    for id in all {
        let o = order.of(&id);
        if o > latch_order {
            break;
        }
        if o <= head_order {
            continue;
        }
        let Some(node) = g.get(&id) else { continue };
        if dom.dominates(head_ref, node) {
            marks.mark_loop_node(&id);
            nodes.push(id);
        }
    }
    nodes
}

/// Classifies the loop from the fan-out of its header and latch.
fn find_loop_kind<N: Clone + Eq + Hash>(
    g: &Graph<N>,
    head: &NodeId<N>,
    latch: &NodeId<N>,
    nodes: &[NodeId<N>],
) -> Result<PrimitiveKind> {
    // A self-loop tests its single node at the bottom.
    if head == latch {
        return Ok(PrimitiveKind::PostTestedLoop);
    }
    let head_succs = successor_ids(g, head);
    let latch_succs = successor_ids(g, latch);
    match latch_succs.len() {
        2 => match head_succs.len() {
            2 => {
                if nodes.contains(&head_succs[0]) && nodes.contains(&head_succs[1]) {
                    Ok(PrimitiveKind::PostTestedLoop)
                } else {
                    Ok(PrimitiveKind::PreTestedLoop)
                }
            }
            1 => Ok(PrimitiveKind::PostTestedLoop),
            n => Err(Error::UnsupportedFanOut {
                role: "header",
                ways: n,
            }),
        },
        1 => match head_succs.len() {
            2 => Ok(PrimitiveKind::PreTestedLoop),
            1 => Ok(PrimitiveKind::EndlessLoop),
            n => Err(Error::UnsupportedFanOut {
                role: "header",
                ways: n,
            }),
        },
        n => Err(Error::UnsupportedFanOut {
            role: "latching",
            ways: n,
        }),
    }
}

/// Locates the follow node of the loop: the first node executed once the
/// loop exits.
fn find_loop_follow<N: Clone + Eq + Hash>(
    g: &Graph<N>,
    kind: PrimitiveKind,
    head: &NodeId<N>,
    latch: &NodeId<N>,
    nodes: &[NodeId<N>],
    order: &RpoOrder<N>,
) -> Result<Option<NodeId<N>>> {
    match kind {
        PrimitiveKind::PreTestedLoop => tested_follow(g, head, nodes, kind),
        PrimitiveKind::PostTestedLoop => tested_follow(g, latch, nodes, kind),
        PrimitiveKind::EndlessLoop => Ok(endless_follow(g, nodes, order)),
        // Loop classification never yields a conditional.
        PrimitiveKind::TwoWayConditional => Ok(None),
    }
}

/// Follow of a pre- or post-tested loop: the tested node's successor
/// outside the body. Errors when no successor (or every successor) lies
/// outside the body.
fn tested_follow<N: Clone + Eq + Hash>(
    g: &Graph<N>,
    tested: &NodeId<N>,
    nodes: &[NodeId<N>],
    kind: PrimitiveKind,
) -> Result<Option<NodeId<N>>> {
    let mut succs = successor_ids(g, tested);
    if succs.len() != 2 {
        return Err(Error::UnresolvableFollow { kind });
    }
    let inside = (nodes.contains(&succs[0]), nodes.contains(&succs[1]));
    match inside {
        (true, false) => Ok(Some(succs.swap_remove(1))),
        (false, true) => Ok(Some(succs.swap_remove(0))),
        _ => Err(Error::UnresolvableFollow { kind }),
    }
}

/// Follow of an endless loop: among the outside successors of every
/// two-way node in the body, the one with the smallest reverse postorder
/// number. An endless loop without such an exit has no follow.
fn endless_follow<N: Clone + Eq + Hash>(
    g: &Graph<N>,
    nodes: &[NodeId<N>],
    order: &RpoOrder<N>,
) -> Option<NodeId<N>> {
    let mut follow: Option<(NodeId<N>, usize)> = None;
    for id in nodes {
        let succs = successor_ids(g, id);
        if succs.len() != 2 {
            continue;
        }
        for succ in succs {
            if nodes.contains(&succ) {
                continue;
            }
            let o = order.of(&succ);
            match &follow {
                Some((_, best)) if o >= *best => {}
                _ => follow = Some((succ, o)),
            }
        }
    }
    follow.map(|(id, _)| id)
}

fn successor_ids<N: Clone + Eq + Hash>(g: &Graph<N>, id: &NodeId<N>) -> Vec<NodeId<N>> {
    g.get(id)
        .map(|node| g.successors(node).map(|s| g.id(s).clone()).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::structure;

    // 1 -> 2, 2 -> 2, 2 -> 3
    fn self_loop() -> Graph<u32> {
        let mut g = Graph::new();
        let a = g.add_original(1);
        let b = g.add_original(2);
        let c = g.add_original(3);
        g.set_root(a);
        g.set_edge(a, b);
        g.set_edge(b, b);
        g.set_edge(b, c);
        g
    }

    #[test]
    fn self_loop_is_post_tested() {
        let (prims, errors) = structure(&self_loop());
        assert!(errors.is_empty(), "{errors:?}");

        let loops: Vec<_> = prims
            .iter()
            .filter(|p| p.kind == PrimitiveKind::PostTestedLoop)
            .collect();
        assert_eq!(loops.len(), 1);
        let lp = loops[0];
        assert_eq!(lp.entry, 2);
        assert_eq!(lp.body, vec![2]);
        assert_eq!(lp.exit, Some(3));
        assert_eq!(lp.extra.get("latch"), Some(&2));
        assert_eq!(lp.extra.get("follow"), Some(&3));
    }

    #[test]
    fn loop_with_no_outside_exit_is_an_error() {
        // 1 -> 2, 2 -> 3, 3 -> 4, 4 -> 2, 2 -> 5, 5 -> 6, 6 -> 1: the
        // outer cycle through 6 -> 1 pulls both header successors into the
        // body, so the pre-tested loop at 2 has no locatable follow.
        let mut g = Graph::new();
        let nodes: Vec<_> = (1..=6).map(|v| g.add_original(v)).collect();
        g.set_root(nodes[0]);
        for (from, to) in [(1, 2), (2, 3), (3, 4), (4, 2), (2, 5), (5, 6), (6, 1)] {
            g.set_edge(nodes[from - 1], nodes[to - 1]);
        }

        let (prims, errors) = structure(&g);
        assert!(prims.is_empty());
        assert_eq!(
            errors,
            vec![Error::UnresolvableFollow {
                kind: PrimitiveKind::PreTestedLoop
            }]
        );
    }

    #[test]
    fn loop_kind_rejects_wide_fanout() {
        // 1 -> 2, 2 -> {3,4,5}, all back to 2 via 3.
        let mut g = Graph::new();
        let n1 = g.add_original(1);
        let n2 = g.add_original(2);
        let n3 = g.add_original(3);
        let n4 = g.add_original(4);
        let n5 = g.add_original(5);
        g.set_root(n1);
        g.set_edge(n1, n2);
        g.set_edge(n2, n3);
        g.set_edge(n2, n4);
        g.set_edge(n2, n5);
        g.set_edge(n3, n2);

        let (_, errors) = structure(&g);
        assert!(errors
            .iter()
            .any(|e| matches!(e, Error::UnsupportedFanOut { role: "header", .. })));
    }
}
