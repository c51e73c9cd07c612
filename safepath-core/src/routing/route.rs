use geo::{Coord, LineString};
use geojson::{Feature, Geometry, Value as GeoJsonValue};
use petgraph::{graph::EdgeIndex, visit::EdgeRef};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    Error, Meters,
    config::EngineConfig,
    engine::RiskSnapshot,
    explain::{FactorBreakdown, explain_path, resolve_path},
    model::{EdgeId, NodeId, SafetyGraph, TravelMode},
    risk::{TemporalContext, edge_cost, temporal_multiplier},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteLabel {
    /// Lowest composite cost
    Safest,
    /// Shortest by length
    Fastest,
    Alternative,
    /// Built by the caller rather than the planner
    Custom,
}

/// Planned or caller-supplied route with its risk summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub label: RouteLabel,
    pub mode: TravelMode,
    pub context: TemporalContext,
    pub nodes: Vec<NodeId>,
    pub edges: Vec<EdgeId>,
    pub length_m: Meters,
    /// Sum of composite weights
    pub cost: f64,
    /// 0-100 risk score, see [`crate::explain`]
    pub risk_score: f64,
    /// Percentage contribution of each factor to `cost`
    pub breakdown: FactorBreakdown,
}

impl Route {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assemble(
        graph: &SafetyGraph,
        snapshot: &RiskSnapshot,
        config: &EngineConfig,
        label: RouteLabel,
        mode: TravelMode,
        context: &TemporalContext,
        start: NodeId,
        edges: &[EdgeIndex],
    ) -> Self {
        let explanation = explain_path(graph, snapshot, config, edges, mode, context);
        let mut nodes = Vec::with_capacity(edges.len() + 1);
        nodes.push(start);
        nodes.extend(edges.iter().map(|e| graph.segment_at(*e).id.to));

        Self {
            label,
            mode,
            context: *context,
            nodes,
            edges: edges.iter().map(|e| graph.segment_at(*e).id).collect(),
            length_m: explanation.length_m,
            cost: explanation.cost,
            risk_score: explanation.risk_score,
            breakdown: explanation.percentages,
        }
    }

    /// Builds a route from an explicit segment sequence.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRoute`] for an empty, disconnected or
    /// mode-incompatible sequence and [`Error::StaleAggregates`] for an
    /// outdated snapshot.
    pub fn from_edges(
        graph: &SafetyGraph,
        snapshot: &RiskSnapshot,
        config: &EngineConfig,
        edges: &[EdgeId],
        mode: TravelMode,
        context: &TemporalContext,
    ) -> Result<Self, Error> {
        snapshot.ensure_current(graph)?;
        let Some(first) = edges.first() else {
            return Err(Error::InvalidRoute("route has no segments".to_string()));
        };
        let path = resolve_path(graph, edges, mode)?;
        Ok(Self::assemble(
            graph,
            snapshot,
            config,
            RouteLabel::Custom,
            mode,
            context,
            first.from,
            &path,
        ))
    }

    /// Builds a route through consecutive nodes.
    ///
    /// Between two nodes the cheapest parallel segment allowing `mode` is
    /// used, ties going to the smaller id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRoute`] when fewer than two nodes are given or
    /// two consecutive nodes are not joined by a usable segment.
    pub fn from_nodes(
        graph: &SafetyGraph,
        snapshot: &RiskSnapshot,
        config: &EngineConfig,
        nodes: &[NodeId],
        mode: TravelMode,
        context: &TemporalContext,
    ) -> Result<Self, Error> {
        snapshot.ensure_current(graph)?;
        if nodes.len() < 2 {
            return Err(Error::InvalidRoute(
                "route needs at least two nodes".to_string(),
            ));
        }
        let multiplier = temporal_multiplier(&config.temporal, context, graph.centroid());
        let aggregates = snapshot.aggregates();

        let mut path = Vec::with_capacity(nodes.len() - 1);
        for pair in nodes.windows(2) {
            let (from, to) = (pair[0], pair[1]);
            let from_index = graph
                .node_index(from)
                .ok_or_else(|| Error::InvalidRoute(format!("unknown node {from}")))?;
            let best = graph
                .neighbors(from_index, mode)
                .filter(|edge| edge.weight().id.to == to)
                .map(|edge| {
                    let segment = edge.weight();
                    let cost = edge_cost(segment, &aggregates.get(segment.id), mode, multiplier, &config.scoring);
                    (cost.total, segment.id, edge.id())
                })
                .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
                .ok_or_else(|| {
                    Error::InvalidRoute(format!("no {mode} segment from {from} to {to}"))
                })?;
            path.push(best.2);
        }

        Ok(Self::assemble(
            graph,
            snapshot,
            config,
            RouteLabel::Custom,
            mode,
            context,
            nodes[0],
            &path,
        ))
    }

    pub fn travel_minutes(&self) -> f64 {
        self.mode.travel_minutes(self.length_m)
    }

    /// Route as a `GeoJSON` line feature with its summary as properties.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownEdge`] if a segment is missing from `graph`.
    pub fn to_geojson(&self, graph: &SafetyGraph) -> Result<Feature, Error> {
        let mut coords: Vec<Coord<f64>> = Vec::new();
        for id in &self.edges {
            let segment = graph.segment(*id).ok_or(Error::UnknownEdge(*id))?;
            for coord in segment.geometry.coords() {
                if coords.last() != Some(coord) {
                    coords.push(*coord);
                }
            }
        }
        if coords.is_empty()
            && let Some(node) = self.nodes.first().and_then(|id| graph.node(*id))
        {
            coords.push(node.geometry.0);
        }

        let geometry = Geometry::new(GeoJsonValue::from(&LineString::new(coords)));
        let value = json!({
            "type": "Feature",
            "geometry": geometry,
            "properties": {
                "label": self.label,
                "mode": self.mode,
                "length_m": self.length_m,
                "travel_minutes": self.travel_minutes(),
                "cost": self.cost,
                "risk_score": self.risk_score,
                "breakdown": self.breakdown,
                "segments": self.edges.len(),
            }
        });

        serde_json::from_value::<Feature>(value).map_err(|e| Error::GeoJsonError(e.to_string()))
    }

    pub fn to_geojson_string(&self, graph: &SafetyGraph) -> Result<String, Error> {
        serde_json::to_string(&self.to_geojson(graph)?)
            .map_err(|e| Error::GeoJsonError(e.to_string()))
    }
}
