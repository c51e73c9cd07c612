//! Street lamps, emergency call points and patrol observations.
//!
//! Each layer is optional. A missing layer leaves the matching segment
//! attribute unknown, which the composite weight treats as neutral; a loaded
//! but empty layer means "none present".

use geo::Point;
use hashbrown::HashMap;
use log::info;
use rstar::{PointDistance, RTree};
use serde::{Deserialize, Serialize};

use super::{index::SpatialIndex, projection::polyline_midpoint};
use crate::{
    Error, MIN_LENGTH_M, Meters,
    config::AttributionConfig,
    model::{EdgeId, SafetyGraph, SegmentAttributes, Snap},
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InfrastructureLayers {
    #[serde(default)]
    pub lamps: Option<Vec<Point<f64>>>,
    #[serde(default)]
    pub emergency_points: Option<Vec<Point<f64>>>,
    #[serde(default)]
    pub patrol_observations: Option<Vec<Point<f64>>>,
}

impl InfrastructureLayers {
    pub fn is_empty(&self) -> bool {
        self.lamps.is_none() && self.emergency_points.is_none() && self.patrol_observations.is_none()
    }
}

/// Outcome of applying infrastructure layers to a graph
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InfrastructureSummary {
    pub lamps_attributed: usize,
    pub lamps_unattributed: usize,
    pub patrols_attributed: usize,
    pub patrols_unattributed: usize,
    pub segments_updated: usize,
}

fn count_per_edge(
    index: &SpatialIndex,
    points: &[Point<f64>],
    tolerance_m: Meters,
) -> (HashMap<EdgeId, u32>, usize) {
    let mut counts: HashMap<EdgeId, u32> = HashMap::new();
    let mut missed = 0;
    for point in points {
        match index.snap(*point, tolerance_m) {
            Snap::Edge { edge, .. } => *counts.entry(edge).or_insert(0) += 1,
            Snap::Unattributed { .. } => missed += 1,
        }
    }
    (counts, missed)
}

/// Derives lighting, emergency distance and patrol counts for every segment
/// and writes them into `graph`.
///
/// Lighting is the share of the segment covered by attributed lamps, each
/// covering `lamp_coverage_m`. Emergency distance is measured from the
/// segment midpoint to the nearest call point. Layers that are `None` keep
/// the current segment values.
///
/// # Errors
///
/// Propagates [`Error::UnknownEdge`] from the graph update.
pub fn apply_infrastructure(
    graph: &mut SafetyGraph,
    index: &SpatialIndex,
    layers: &InfrastructureLayers,
    config: &AttributionConfig,
) -> Result<InfrastructureSummary, Error> {
    let mut summary = InfrastructureSummary::default();
    if layers.is_empty() {
        return Ok(summary);
    }

    let lamps = layers.lamps.as_deref().map(|lamps| {
        let (counts, missed) = count_per_edge(index, lamps, config.tolerance_m);
        summary.lamps_attributed = lamps.len() - missed;
        summary.lamps_unattributed = missed;
        counts
    });
    let patrols = layers.patrol_observations.as_deref().map(|patrols| {
        let (counts, missed) = count_per_edge(index, patrols, config.patrol_tolerance_m);
        summary.patrols_attributed = patrols.len() - missed;
        summary.patrols_unattributed = missed;
        counts
    });
    let projection = *index.projection();
    let emergency: Option<RTree<[f64; 2]>> = layers
        .emergency_points
        .as_deref()
        .map(|points| RTree::bulk_load(points.iter().map(|p| projection.project(*p)).collect()));

    let updates: Vec<(EdgeId, SegmentAttributes)> = graph
        .segments()
        .map(|segment| {
            let mut attributes = segment.attributes();
            if let Some(counts) = &lamps {
                let lamp_count = counts.get(&segment.id).copied().unwrap_or(0);
                let covered = f64::from(lamp_count) * config.lamp_coverage_m;
                attributes.lighting = Some((covered / segment.length_m.max(MIN_LENGTH_M)).min(1.0));
            }
            if let Some(tree) = &emergency {
                let midpoint = polyline_midpoint(&projection.project_line(&segment.geometry));
                attributes.emergency_distance_m = midpoint.and_then(|xy| {
                    tree.nearest_neighbor(&xy).map(|p| p.distance_2(&xy).sqrt())
                });
            }
            if let Some(counts) = &patrols {
                attributes.patrol_count = Some(counts.get(&segment.id).copied().unwrap_or(0));
            }
            (segment.id, attributes)
        })
        .collect();

    summary.segments_updated = graph.update_attributes(updates)?;
    info!(
        "Infrastructure applied: {} lamps, {} patrol observations attributed ({} / {} unattributed)",
        summary.lamps_attributed,
        summary.patrols_attributed,
        summary.lamps_unattributed,
        summary.patrols_unattributed
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Node, Segment};

    /// 1 -> 2 runs ~222 m east along the equator, 2 -> 3 ~111 m north
    fn graph() -> SafetyGraph {
        SafetyGraph::new(
            vec![
                Node::new(1, 0.0, 0.0),
                Node::new(2, 0.0, 0.002),
                Node::new(3, 0.001, 0.002),
            ],
            vec![Segment::new(1, 2, 0, 222.0), Segment::new(2, 3, 0, 111.0)],
        )
        .unwrap()
    }

    #[test]
    fn lamps_light_segments() {
        let mut graph = graph();
        let index = SpatialIndex::build(&graph);
        let layers = InfrastructureLayers {
            lamps: Some(vec![
                Point::new(0.0005, 0.0001),
                Point::new(0.001, -0.0001),
                Point::new(0.5, 0.5),
            ]),
            ..InfrastructureLayers::default()
        };
        let summary =
            apply_infrastructure(&mut graph, &index, &layers, &AttributionConfig::default()).unwrap();
        assert_eq!(summary.lamps_attributed, 2);
        assert_eq!(summary.lamps_unattributed, 1);

        let lit = graph.segment(EdgeId::new(1, 2, 0)).unwrap();
        assert!((lit.lighting.unwrap() - 60.0 / 222.0).abs() < 1e-9);
        // Loaded layer with no lamps nearby means dark, not unknown
        assert_eq!(graph.segment(EdgeId::new(2, 3, 0)).unwrap().lighting, Some(0.0));
        // Other layers untouched
        assert_eq!(lit.emergency_distance_m, None);
        assert_eq!(lit.patrol_count, None);
    }

    #[test]
    fn emergency_distance_from_midpoint() {
        let mut graph = graph();
        let index = SpatialIndex::build(&graph);
        let layers = InfrastructureLayers {
            emergency_points: Some(vec![Point::new(0.001, 0.0)]),
            patrol_observations: Some(vec![Point::new(0.0021, 0.0005), Point::new(0.0019, 0.0004)]),
            ..InfrastructureLayers::default()
        };
        apply_infrastructure(&mut graph, &index, &layers, &AttributionConfig::default()).unwrap();

        let east = graph.segment(EdgeId::new(1, 2, 0)).unwrap();
        assert!(east.emergency_distance_m.unwrap() < 1.0);
        let north = graph.segment(EdgeId::new(2, 3, 0)).unwrap();
        let distance = north.emergency_distance_m.unwrap();
        // Midpoint (0.002, 0.0005) is ~124 m from (0.001, 0.0)
        assert!((distance - 124.0).abs() < 2.0, "{distance}");
        assert_eq!(north.patrol_count, Some(2));
        assert_eq!(east.patrol_count, Some(0));
        assert_eq!(east.lighting, None);
    }

    #[test]
    fn empty_layers_change_nothing() {
        let mut graph = graph();
        let before = graph.version();
        let index = SpatialIndex::build(&graph);
        let summary = apply_infrastructure(
            &mut graph,
            &index,
            &InfrastructureLayers::default(),
            &AttributionConfig::default(),
        )
        .unwrap();
        assert_eq!(summary.segments_updated, 0);
        assert_eq!(graph.version(), before);
    }
}
