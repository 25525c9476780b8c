use std::collections::HashSet;

use flowstruct::{structure, DominatorTree, Graph, Primitive, PrimitiveKind};

/// Builds a graph over keys `1..=n` (inserted in numeric order, node 1 as
/// root) with the given edges.
fn graph(n: u32, edges: &[(u32, u32)]) -> Graph<u32> {
    let mut g = Graph::new();
    let nodes: Vec<_> = (1..=n).map(|v| g.add_original(v)).collect();
    g.set_root(nodes[0]);
    for &(from, to) in edges {
        g.set_edge(nodes[(from - 1) as usize], nodes[(to - 1) as usize]);
    }
    g
}

/// Two nested loops (a post-tested 13/14 inside a pre-tested 6/15) behind a
/// couple of conditionals.
const NESTED: &[(u32, u32)] = &[
    (1, 2),
    (1, 5),
    (2, 3),
    (2, 4),
    (3, 5),
    (4, 5),
    (5, 6),
    (6, 7),
    (6, 12),
    (7, 8),
    (7, 9),
    (8, 9),
    (8, 10),
    (9, 10),
    (10, 11),
    (12, 13),
    (13, 14),
    (14, 13),
    (14, 15),
    (15, 6),
];

fn loops(prims: &[Primitive<u32>]) -> Vec<&Primitive<u32>> {
    prims
        .iter()
        .filter(|p| p.kind != PrimitiveKind::TwoWayConditional)
        .collect()
}

#[test]
fn nested_graph_structures_both_loops() {
    let (prims, errors) = structure(&graph(15, NESTED));
    assert!(errors.is_empty(), "{errors:?}");

    let loops = loops(&prims);
    assert_eq!(loops.len(), 2);

    let inner = loops
        .iter()
        .find(|p| p.entry == 13)
        .expect("inner loop at 13");
    assert_eq!(inner.kind, PrimitiveKind::PostTestedLoop);
    assert_eq!(inner.body, vec![13, 14]);
    assert_eq!(inner.exit, Some(15));
    assert_eq!(inner.extra.get("latch"), Some(&14));
    assert_eq!(inner.extra.get("follow"), Some(&15));

    let outer = loops
        .iter()
        .find(|p| p.entry == 6)
        .expect("outer loop at 6");
    assert_eq!(outer.kind, PrimitiveKind::PreTestedLoop);
    assert_eq!(outer.body, vec![6, 12, 13, 14, 15]);
    assert_eq!(outer.exit, Some(7));
    assert_eq!(outer.extra.get("latch"), Some(&15));
    assert_eq!(outer.extra.get("follow"), Some(&7));
}

#[test]
fn nested_graph_structures_inner_conditionals() {
    let (prims, errors) = structure(&graph(15, NESTED));
    assert!(errors.is_empty(), "{errors:?}");

    let conds: Vec<_> = prims
        .iter()
        .filter(|p| p.kind == PrimitiveKind::TwoWayConditional)
        .collect();
    let entries: HashSet<u32> = conds.iter().map(|p| p.entry).collect();
    for expected in [2, 7, 8] {
        assert!(entries.contains(&expected), "no conditional at {expected}");
    }

    let at = |entry: u32| conds.iter().find(|p| p.entry == entry).unwrap();
    assert_eq!(at(8).exit, Some(10));
    assert!(at(8).body.is_empty());
    assert_eq!(at(7).exit, Some(10));
    assert_eq!(at(7).body, vec![8]);
    assert_eq!(at(2).exit, Some(5));
    assert!(at(2).body.is_empty());
}

#[test]
fn loop_bodies_are_dominated_and_exclude_the_follow() {
    let g = graph(15, NESTED);
    let dom = DominatorTree::new(&g).unwrap();
    let (prims, _) = structure(&g);

    for prim in prims.iter().filter(|p| p.kind != PrimitiveKind::TwoWayConditional) {
        let entry = g.get_original(&prim.entry).unwrap();
        for value in &prim.body {
            let node = g.get_original(value).unwrap();
            assert!(dom.dominates(entry, node), "{value} escapes {}", prim.entry);
        }
        let latch = prim.extra.get("latch").expect("loop has a latch");
        assert!(prim.body.contains(latch) || prim.entry == *latch);
        if let Some(exit) = &prim.exit {
            assert!(!prim.body.contains(exit));
        }
    }
}

#[test]
fn no_node_heads_two_loops() {
    let (prims, _) = structure(&graph(15, NESTED));
    let mut entries = HashSet::new();
    let mut latches = HashSet::new();
    for prim in prims.iter().filter(|p| p.kind != PrimitiveKind::TwoWayConditional) {
        assert!(entries.insert(prim.entry), "{} heads two loops", prim.entry);
        let latch = prim.extra.get("latch").unwrap();
        assert!(latches.insert(*latch), "{latch} latches two loops");
    }
}

#[test]
fn structuring_is_idempotent() {
    let g = graph(15, NESTED);
    let first = structure(&g);
    let second = structure(&g);
    assert_eq!(first, second);

    let rebuilt = graph(15, NESTED);
    assert_eq!(structure(&rebuilt), first);
}
