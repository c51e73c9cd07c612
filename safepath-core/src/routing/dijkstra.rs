use std::{cmp::Ordering, collections::BinaryHeap};

use fixedbitset::FixedBitSet;
use hashbrown::HashMap;
use petgraph::{
    graph::{EdgeIndex, NodeIndex},
    visit::EdgeRef,
};

use crate::model::{SafetyGraph, TravelMode};

#[derive(Copy, Clone)]
struct State {
    cost: f64,
    hops: u32,
    node: NodeIndex,
}

// Implement Ord for State to use in BinaryHeap
impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap by cost, then hop count, then node (reversed for BinaryHeap)
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.hops.cmp(&self.hops))
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for State {}

#[derive(Copy, Clone)]
struct Label {
    cost: f64,
    hops: u32,
    via: Option<EdgeIndex>,
}

impl Label {
    /// Ordering by (cost, hops); equal labels need a path comparison
    fn rank(&self, other: &Label) -> Ordering {
        self.cost
            .total_cmp(&other.cost)
            .then_with(|| self.hops.cmp(&other.hops))
    }
}

/// Segments from the start to `node` following settled labels
fn trace(graph: &SafetyGraph, labels: &HashMap<NodeIndex, Label>, node: NodeIndex) -> Vec<EdgeIndex> {
    let mut edges = Vec::new();
    let mut at = node;
    while let Some(edge) = labels.get(&at).and_then(|label| label.via) {
        edges.push(edge);
        match graph.endpoints(edge) {
            Some((from, _)) => at = from,
            None => break,
        }
    }
    edges.reverse();
    edges
}

/// Whether reaching a node through `via` from `from` beats the path recorded
/// in `current` when both have the same cost and hop count
fn smaller_path(
    graph: &SafetyGraph,
    labels: &HashMap<NodeIndex, Label>,
    from: NodeIndex,
    via: EdgeIndex,
    current: &Label,
) -> bool {
    let Some(current_via) = current.via else {
        return false;
    };
    let Some((current_from, _)) = graph.endpoints(current_via) else {
        return true;
    };
    let mut candidate = trace(graph, labels, from);
    candidate.push(via);
    let mut recorded = trace(graph, labels, current_from);
    recorded.push(current_via);
    candidate < recorded
}

/// Path found by [`shortest_path`]
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PathResult {
    pub cost: f64,
    pub edges: Vec<EdgeIndex>,
}

/// Cheapest path from `start` to `target` over segments allowing `mode`.
///
/// `weights` is indexed by `EdgeIndex::index()` and must be positive. Equal
/// cost paths resolve to fewer segments, then to the lexicographically
/// smallest segment sequence, so the result is deterministic. Because
/// petgraph indices follow `EdgeId` order, comparing indices compares ids.
///
/// A tie at a node can only come from predecessors cheaper than the node
/// itself, which are settled, so both competing prefixes are final when
/// they are compared.
pub(crate) fn shortest_path(
    graph: &SafetyGraph,
    start: NodeIndex,
    target: NodeIndex,
    mode: TravelMode,
    weights: &[f64],
) -> Option<PathResult> {
    let mut labels: HashMap<NodeIndex, Label> = HashMap::new();
    let mut settled = FixedBitSet::with_capacity(graph.node_count());
    let mut heap = BinaryHeap::new();

    heap.push(State {
        cost: 0.0,
        hops: 0,
        node: start,
    });
    labels.insert(
        start,
        Label {
            cost: 0.0,
            hops: 0,
            via: None,
        },
    );

    while let Some(State { cost, hops, node }) = heap.pop() {
        if node == target {
            break;
        }

        // Already expanded with a label at least as good
        if settled.put(node.index()) {
            continue;
        }

        for edge in graph.neighbors(node, mode) {
            let next = edge.target();
            let candidate = Label {
                cost: cost + weights[edge.id().index()],
                hops: hops + 1,
                via: Some(edge.id()),
            };

            let better = match labels.get(&next) {
                None => true,
                Some(current) => match candidate.rank(current) {
                    Ordering::Less => true,
                    Ordering::Equal => smaller_path(graph, &labels, node, edge.id(), current),
                    Ordering::Greater => false,
                },
            };
            if !better {
                continue;
            }
            labels.insert(next, candidate);
            heap.push(State {
                cost: candidate.cost,
                hops: candidate.hops,
                node: next,
            });
        }
    }

    let end = labels.get(&target)?;
    Some(PathResult {
        cost: end.cost,
        edges: trace(graph, &labels, target),
    })
}
