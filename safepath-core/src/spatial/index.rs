use geo::Point;
use log::{info, warn};
use rstar::{
    PointDistance, RTree,
    primitives::{GeomWithData, Line},
};

use super::projection::LocalProjection;
use crate::{
    Meters,
    model::{EdgeId, NodeId, SafetyGraph, Snap},
};

/// One straight piece of a segment polyline, in projected metres
type SegmentPiece = GeomWithData<Line<[f64; 2]>, EdgeId>;
type NodePoint = GeomWithData<[f64; 2], NodeId>;

/// R-tree over segment geometry and node positions of one graph.
///
/// Geometry never changes after graph construction, so the index stays
/// valid across infrastructure updates.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    projection: LocalProjection,
    segments: RTree<SegmentPiece>,
    nodes: RTree<NodePoint>,
    skipped: Vec<EdgeId>,
}

impl SpatialIndex {
    /// Indexes every segment of `graph`.
    ///
    /// Segments whose geometry collapses to a single point or contains
    /// non-finite coordinates are left out and reported by
    /// [`SpatialIndex::skipped`].
    pub fn build(graph: &SafetyGraph) -> Self {
        let projection = LocalProjection::new(graph.centroid());
        let mut pieces = Vec::with_capacity(graph.segment_count());
        let mut skipped = Vec::new();

        for segment in graph.segments() {
            let mut points = projection.project_line(&segment.geometry);
            points.dedup();
            let finite = points.iter().all(|p| p[0].is_finite() && p[1].is_finite());
            if !finite || points.len() < 2 {
                warn!("Segment {} has degenerate geometry - excluding from index", segment.id);
                skipped.push(segment.id);
                continue;
            }
            pieces.extend(
                points
                    .windows(2)
                    .map(|w| GeomWithData::new(Line::new(w[0], w[1]), segment.id)),
            );
        }

        let nodes = graph
            .nodes()
            .map(|node| GeomWithData::new(projection.project(node.geometry), node.id))
            .collect();

        info!(
            "Spatial index built: {} pieces from {} segments ({} skipped)",
            pieces.len(),
            graph.segment_count() - skipped.len(),
            skipped.len()
        );

        Self {
            projection,
            segments: RTree::bulk_load(pieces),
            nodes: RTree::bulk_load(nodes),
            skipped,
        }
    }

    pub fn projection(&self) -> &LocalProjection {
        &self.projection
    }

    /// Segments excluded for degenerate geometry, in id order
    pub fn skipped(&self) -> &[EdgeId] {
        &self.skipped
    }

    /// Snaps a lon / lat point onto the nearest segment within `tolerance_m`
    pub fn snap(&self, point: Point<f64>, tolerance_m: Meters) -> Snap {
        self.snap_projected(self.projection.project(point), tolerance_m)
    }

    /// Snaps a projected point.
    ///
    /// Equidistant candidates resolve to the smallest `EdgeId`.
    pub(crate) fn snap_projected(&self, xy: [f64; 2], tolerance_m: Meters) -> Snap {
        let best = self
            .segments
            .locate_within_distance(xy, tolerance_m * tolerance_m)
            .map(|piece| (piece.distance_2(&xy), piece.data))
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        if let Some((distance_2, edge)) = best {
            return Snap::Edge {
                edge,
                distance_m: distance_2.sqrt(),
            };
        }

        let nearest_distance_m = self
            .segments
            .nearest_neighbor(&xy)
            .map(|piece| piece.distance_2(&xy).sqrt());
        Snap::Unattributed {
            nearest_distance_m,
            far_from_any_edge: nearest_distance_m.is_none_or(|d| d > tolerance_m),
        }
    }

    /// Segments within `radius_m` of a lon / lat point with their distance,
    /// nearest first, ties by id
    pub fn segments_within(&self, point: Point<f64>, radius_m: Meters) -> Vec<(EdgeId, Meters)> {
        let xy = self.projection.project(point);
        let mut found: Vec<(EdgeId, Meters)> = Vec::new();
        for piece in self.segments.locate_within_distance(xy, radius_m * radius_m) {
            let distance = piece.distance_2(&xy).sqrt();
            match found.iter_mut().find(|(edge, _)| *edge == piece.data) {
                Some(entry) => entry.1 = entry.1.min(distance),
                None => found.push((piece.data, distance)),
            }
        }
        found.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        found
    }

    /// Closest node to a lon / lat point and its distance in metres
    pub fn nearest_node(&self, point: Point<f64>) -> Option<(NodeId, Meters)> {
        let xy = self.projection.project(point);
        self.nodes
            .nearest_neighbor(&xy)
            .map(|node| (node.data, node.distance_2(&xy).sqrt()))
    }
}

#[cfg(test)]
mod tests {
    use geo::LineString;

    use super::*;
    use crate::model::{Node, Segment};

    /// Two parallel streets ~111 m apart, mirrored about the equator
    fn graph() -> SafetyGraph {
        let nodes = vec![
            Node::new(1, -0.0005, 0.0),
            Node::new(2, -0.0005, 0.0018),
            Node::new(3, 0.0005, 0.0),
            Node::new(4, 0.0005, 0.0018),
        ];
        SafetyGraph::new(
            nodes,
            vec![
                Segment::new(1, 2, 0, 200.0),
                Segment::new(3, 4, 0, 200.0),
                Segment::new(2, 1, 0, 200.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn snaps_to_the_nearest_segment() {
        let graph = graph();
        let index = SpatialIndex::build(&graph);
        // ~11 m north of the southern street
        let snap = index.snap(Point::new(0.0009, -0.0004), 50.0);
        let Snap::Edge { edge, distance_m } = snap else {
            panic!("expected a snap, got {snap:?}");
        };
        // 1->2 and 2->1 share geometry; the smaller id wins
        assert_eq!(edge, EdgeId::new(1, 2, 0));
        assert!((distance_m - 11.1).abs() < 0.5, "{distance_m}");
    }

    #[test]
    fn equidistant_points_pick_the_smallest_id() {
        let graph = graph();
        let index = SpatialIndex::build(&graph);
        // Exactly between both streets (~56 m from each)
        let snap = index.snap(Point::new(0.0009, 0.0), 60.0);
        assert_eq!(snap, index.snap(Point::new(0.0009, 0.0), 60.0));
        match snap {
            Snap::Edge { edge, .. } => assert_eq!(edge, EdgeId::new(1, 2, 0)),
            other => panic!("expected a snap, got {other:?}"),
        }
    }

    #[test]
    fn far_points_are_unattributed() {
        let graph = graph();
        let index = SpatialIndex::build(&graph);
        let snap = index.snap(Point::new(0.0009, 0.01), 50.0);
        match snap {
            Snap::Unattributed {
                nearest_distance_m,
                far_from_any_edge,
            } => {
                assert!(far_from_any_edge);
                assert!(nearest_distance_m.unwrap() > 1000.0);
            }
            other => panic!("expected no snap, got {other:?}"),
        }
    }

    #[test]
    fn skips_degenerate_segments() {
        let nodes = vec![Node::new(1, 0.0, 0.0), Node::new(2, 0.0, 0.0)];
        let graph = SafetyGraph::new(
            nodes,
            vec![
                Segment::new(1, 2, 0, 5.0),
                Segment::new(1, 2, 1, 5.0).with_geometry(LineString::from(vec![
                    (0.0, 0.0),
                    (0.0001, 0.0),
                    (0.0, 0.0),
                ])),
            ],
        )
        .unwrap();
        let index = SpatialIndex::build(&graph);
        assert_eq!(index.skipped(), &[EdgeId::new(1, 2, 0)]);
        assert!(matches!(
            index.snap(Point::new(0.00005, 0.0), 10.0),
            Snap::Edge { edge, .. } if edge == EdgeId::new(1, 2, 1)
        ));
    }

    #[test]
    fn finds_segments_and_nodes_nearby() {
        let graph = graph();
        let index = SpatialIndex::build(&graph);
        let nearby = index.segments_within(Point::new(0.0009, -0.0003), 60.0);
        let ids: Vec<EdgeId> = nearby.iter().map(|(edge, _)| *edge).collect();
        assert_eq!(ids, vec![EdgeId::new(1, 2, 0), EdgeId::new(2, 1, 0)]);

        let (node, distance) = index.nearest_node(Point::new(0.0018, 0.0005)).unwrap();
        assert_eq!(node, 4);
        assert!(distance < 1.0);
    }
}
