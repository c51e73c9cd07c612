//! Directed multigraph of street segments

use std::sync::atomic::{AtomicU64, Ordering};

use geo::{LineString, Point};
use hashbrown::HashMap;
use log::info;
use petgraph::{
    Direction,
    graph::{DiGraph, EdgeIndex, EdgeReference, NodeIndex},
    visit::EdgeRef,
};

use super::components::{Node, Segment, SegmentAttributes};
use crate::{
    Error,
    model::{EdgeId, NodeId, TravelMode},
};

static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);

fn next_version() -> u64 {
    NEXT_VERSION.fetch_add(1, Ordering::Relaxed)
}

/// Street network used for attribution and routing.
///
/// Nodes and segments are stored in ascending id order, so petgraph indices
/// preserve the `NodeId` / `EdgeId` ordering.
#[derive(Debug, Clone)]
pub struct SafetyGraph {
    pub(crate) graph: DiGraph<Node, Segment>,
    node_lookup: HashMap<NodeId, NodeIndex>,
    edge_lookup: HashMap<EdgeId, EdgeIndex>,
    centroid: Point<f64>,
    version: u64,
}

impl SafetyGraph {
    /// Builds the graph from nodes and segments.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedGraph`] when a segment references an unknown
    /// node, has a non-positive or non-finite length, or when node / edge ids
    /// are duplicated.
    pub fn new(mut nodes: Vec<Node>, mut segments: Vec<Segment>) -> Result<Self, Error> {
        nodes.sort_by_key(|node| node.id);
        segments.sort_by_key(|segment| segment.id);

        let mut graph = DiGraph::with_capacity(nodes.len(), segments.len());
        let mut node_lookup = HashMap::with_capacity(nodes.len());
        let mut edge_lookup = HashMap::with_capacity(segments.len());

        let (mut sum_x, mut sum_y) = (0.0, 0.0);
        for node in nodes {
            let id = node.id;
            sum_x += node.geometry.x();
            sum_y += node.geometry.y();
            let index = graph.add_node(node);
            if node_lookup.insert(id, index).is_some() {
                return Err(Error::MalformedGraph(format!("duplicate node id {id}")));
            }
        }

        for mut segment in segments {
            let id = segment.id;
            if !segment.length_m.is_finite() || segment.length_m <= 0.0 {
                return Err(Error::MalformedGraph(format!(
                    "segment {id} has invalid length {}",
                    segment.length_m
                )));
            }
            let (Some(&from), Some(&to)) = (node_lookup.get(&id.from), node_lookup.get(&id.to))
            else {
                return Err(Error::MalformedGraph(format!(
                    "segment {id} references an unknown node"
                )));
            };
            if edge_lookup.contains_key(&id) {
                return Err(Error::MalformedGraph(format!("duplicate segment id {id}")));
            }
            if segment.geometry.0.len() < 2 {
                segment.geometry =
                    LineString::from(vec![graph[from].geometry.0, graph[to].geometry.0]);
            }
            let index = graph.add_edge(from, to, segment);
            edge_lookup.insert(id, index);
        }

        let count = graph.node_count().max(1) as f64;
        let centroid = Point::new(sum_x / count, sum_y / count);

        info!(
            "Graph built: {} nodes, {} segments",
            graph.node_count(),
            graph.edge_count()
        );

        Ok(Self {
            graph,
            node_lookup,
            edge_lookup,
            centroid,
            version: next_version(),
        })
    }

    /// Version of the graph; changes on every attribute update
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn segment_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Mean node coordinate, used as projection origin and solar location
    pub fn centroid(&self) -> Point<f64> {
        self.centroid
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.node_index(id).map(|index| &self.graph[index])
    }

    pub fn node_index(&self, id: NodeId) -> Option<NodeIndex> {
        self.node_lookup.get(&id).copied()
    }

    pub fn node_at(&self, index: NodeIndex) -> &Node {
        &self.graph[index]
    }

    pub fn segment(&self, id: EdgeId) -> Option<&Segment> {
        self.edge_index(id).map(|index| &self.graph[index])
    }

    pub fn edge_index(&self, id: EdgeId) -> Option<EdgeIndex> {
        self.edge_lookup.get(&id).copied()
    }

    pub fn segment_at(&self, index: EdgeIndex) -> &Segment {
        &self.graph[index]
    }

    /// Source and target node of a segment
    pub fn endpoints(&self, index: EdgeIndex) -> Option<(NodeIndex, NodeIndex)> {
        self.graph.edge_endpoints(index)
    }

    /// All nodes in ascending id order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.node_weights()
    }

    /// All segments in ascending id order
    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.graph.edge_weights()
    }

    pub fn edge_indices(&self) -> impl Iterator<Item = EdgeIndex> {
        self.graph.edge_indices()
    }

    /// Outgoing segments of `node` that allow `mode`
    pub fn neighbors(
        &self,
        node: NodeIndex,
        mode: TravelMode,
    ) -> impl Iterator<Item = EdgeReference<'_, Segment>> {
        self.graph
            .edges_directed(node, Direction::Outgoing)
            .filter(move |edge| edge.weight().allows(mode))
    }

    /// Outgoing segments of the node with id `node` that allow `mode`
    pub fn outgoing(
        &self,
        node: NodeId,
        mode: TravelMode,
    ) -> Result<impl Iterator<Item = &Segment>, Error> {
        let index = self.node_index(node).ok_or(Error::UnknownNode(node))?;
        Ok(self.neighbors(index, mode).map(|edge| edge.weight()))
    }

    /// Bulk update of infrastructure attributes by segment id.
    ///
    /// Bumps the graph version when anything changed.
    pub(crate) fn update_attributes<I>(&mut self, updates: I) -> Result<usize, Error>
    where
        I: IntoIterator<Item = (EdgeId, SegmentAttributes)>,
    {
        // Resolve every id first so a bad id leaves the graph untouched
        let resolved = updates
            .into_iter()
            .map(|(id, attributes)| {
                self.edge_index(id)
                    .map(|index| (index, attributes))
                    .ok_or(Error::UnknownEdge(id))
            })
            .collect::<Result<Vec<_>, _>>()?;

        for &(index, attributes) in &resolved {
            let segment = &mut self.graph[index];
            segment.lighting = attributes.lighting.map(|l| l.clamp(0.0, 1.0));
            segment.emergency_distance_m = attributes.emergency_distance_m;
            segment.patrol_count = attributes.patrol_count;
        }
        if !resolved.is_empty() {
            self.version = next_version();
        }
        Ok(resolved.len())
    }

    /// Decomposes the graph back into its parts (ascending id order)
    pub fn to_parts(&self) -> (Vec<Node>, Vec<Segment>) {
        (
            self.graph.node_weights().cloned().collect(),
            self.graph.edge_weights().cloned().collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModeSet;

    fn nodes() -> Vec<Node> {
        vec![
            Node::new(1, 38.9400, -92.3300),
            Node::new(2, 38.9400, -92.3277),
            Node::new(3, 38.9418, -92.3277),
        ]
    }

    #[test]
    fn builds_and_looks_up_segments() {
        let graph = SafetyGraph::new(
            nodes(),
            vec![
                Segment::new(2, 3, 0, 200.0),
                Segment::new(1, 2, 0, 200.0),
                Segment::new(1, 2, 1, 250.0),
            ],
        )
        .unwrap();

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.segment_count(), 3);
        let parallel = graph.segment(EdgeId::new(1, 2, 1)).unwrap();
        assert_eq!(parallel.length_m, 250.0);
        // Geometry is derived from the node coordinates
        assert_eq!(parallel.geometry.0.len(), 2);

        let ids: Vec<EdgeId> = graph.segments().map(|s| s.id).collect();
        assert_eq!(
            ids,
            vec![EdgeId::new(1, 2, 0), EdgeId::new(1, 2, 1), EdgeId::new(2, 3, 0)]
        );
    }

    #[test]
    fn neighbors_respect_mode() {
        let graph = SafetyGraph::new(
            nodes(),
            vec![
                Segment::new(1, 2, 0, 200.0).with_modes(ModeSet::only(TravelMode::Walk)),
                Segment::new(1, 3, 0, 300.0),
            ],
        )
        .unwrap();
        let start = graph.node_index(1).unwrap();
        assert_eq!(graph.neighbors(start, TravelMode::Walk).count(), 2);
        assert_eq!(graph.neighbors(start, TravelMode::Drive).count(), 1);
        assert!(graph.outgoing(42, TravelMode::Walk).is_err());
    }

    #[test]
    fn rejects_unknown_node() {
        let err = SafetyGraph::new(nodes(), vec![Segment::new(1, 9, 0, 10.0)]).unwrap_err();
        assert!(matches!(err, Error::MalformedGraph(_)));
    }

    #[test]
    fn rejects_non_positive_length() {
        for length in [0.0, -3.0, f64::NAN] {
            let err = SafetyGraph::new(nodes(), vec![Segment::new(1, 2, 0, length)]).unwrap_err();
            assert!(matches!(err, Error::MalformedGraph(_)));
        }
    }

    #[test]
    fn rejects_duplicates() {
        let err = SafetyGraph::new(
            nodes(),
            vec![Segment::new(1, 2, 0, 10.0), Segment::new(1, 2, 0, 12.0)],
        )
        .unwrap_err();
        assert!(matches!(err, Error::MalformedGraph(_)));

        let mut dup_nodes = nodes();
        dup_nodes.push(Node::new(1, 0.0, 0.0));
        let err = SafetyGraph::new(dup_nodes, vec![]).unwrap_err();
        assert!(matches!(err, Error::MalformedGraph(_)));
    }

    #[test]
    fn attribute_update_bumps_version() {
        let mut graph = SafetyGraph::new(nodes(), vec![Segment::new(1, 2, 0, 200.0)]).unwrap();
        let before = graph.version();
        graph
            .update_attributes([(
                EdgeId::new(1, 2, 0),
                SegmentAttributes {
                    lighting: Some(1.7),
                    emergency_distance_m: Some(35.0),
                    patrol_count: Some(4),
                },
            )])
            .unwrap();
        assert_ne!(graph.version(), before);
        let segment = graph.segment(EdgeId::new(1, 2, 0)).unwrap();
        assert_eq!(segment.lighting, Some(1.0));
        assert_eq!(segment.patrol_count, Some(4));

        let err = graph
            .update_attributes([(EdgeId::new(3, 1, 0), SegmentAttributes::default())])
            .unwrap_err();
        assert!(matches!(err, Error::UnknownEdge(_)));
    }
}
