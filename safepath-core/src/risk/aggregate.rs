//! Per-segment risk aggregates derived from an attribution

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{
    Error, MIN_LENGTH_M, Meters,
    config::ScoringConfig,
    model::{EdgeId, SafetyGraph},
    spatial::Attribution,
};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Risk summary of one segment
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeRiskAggregate {
    pub incident_count: u32,
    pub violent_count: u32,
    /// Sum of recency weights
    pub recency_score: f64,
    /// Sum of severity x recency weight
    pub severity_score: f64,
    /// Incidents per 100 m of segment
    pub density_per_100m: f64,
}

/// Aggregates for every segment of one graph version.
///
/// Segments without incidents are not stored; [`EdgeAggregates::get`]
/// returns the zero aggregate for them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "AggregatesDocument", into = "AggregatesDocument")]
pub struct EdgeAggregates {
    graph_version: u64,
    computed_at: NaiveDateTime,
    by_edge: BTreeMap<EdgeId, EdgeRiskAggregate>,
}

/// JSON object keys must be strings, so aggregates are stored as a list
#[derive(Serialize, Deserialize)]
struct AggregatesDocument {
    graph_version: u64,
    computed_at: NaiveDateTime,
    edges: Vec<(EdgeId, EdgeRiskAggregate)>,
}

impl From<AggregatesDocument> for EdgeAggregates {
    fn from(document: AggregatesDocument) -> Self {
        Self {
            graph_version: document.graph_version,
            computed_at: document.computed_at,
            by_edge: document.edges.into_iter().collect(),
        }
    }
}

impl From<EdgeAggregates> for AggregatesDocument {
    fn from(aggregates: EdgeAggregates) -> Self {
        Self {
            graph_version: aggregates.graph_version,
            computed_at: aggregates.computed_at,
            edges: aggregates.by_edge.into_iter().collect(),
        }
    }
}

impl EdgeAggregates {
    /// Aggregates with no incidents at all
    pub fn empty(graph: &SafetyGraph, computed_at: NaiveDateTime) -> Self {
        Self {
            graph_version: graph.version(),
            computed_at,
            by_edge: BTreeMap::new(),
        }
    }

    pub fn graph_version(&self) -> u64 {
        self.graph_version
    }

    /// Reference time used for recency weighting
    pub fn computed_at(&self) -> NaiveDateTime {
        self.computed_at
    }

    pub fn get(&self, edge: EdgeId) -> EdgeRiskAggregate {
        self.by_edge.get(&edge).copied().unwrap_or_default()
    }

    /// Segments with at least one incident, in id order
    pub fn iter(&self) -> impl Iterator<Item = (EdgeId, &EdgeRiskAggregate)> {
        self.by_edge.iter().map(|(id, aggregate)| (*id, aggregate))
    }

    pub fn len(&self) -> usize {
        self.by_edge.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_edge.is_empty()
    }

    /// Rebinds restored aggregates to `graph`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownEdge`] when an aggregated segment is missing
    /// from the graph.
    pub fn rebind(mut self, graph: &SafetyGraph) -> Result<Self, Error> {
        if let Some(missing) = self.by_edge.keys().find(|id| graph.segment(**id).is_none()) {
            return Err(Error::UnknownEdge(*missing));
        }
        self.graph_version = graph.version();
        Ok(self)
    }
}

/// Recency weight of an incident that occurred at `occurred_at`.
///
/// Halves every `half_life_days`; zero beyond `horizon_days`. Incidents
/// dated after `now` count as fresh.
pub fn recency_weight(occurred_at: NaiveDateTime, now: NaiveDateTime, config: &ScoringConfig) -> f64 {
    let age_days = ((now - occurred_at).num_seconds() as f64 / SECONDS_PER_DAY).max(0.0);
    if age_days > config.horizon_days {
        return 0.0;
    }
    0.5_f64.powf(age_days / config.half_life_days)
}

/// Incidents per 100 m, with very short segments treated as `min_length_m` long
pub fn density_per_100m(incident_count: u32, length_m: Meters, min_length_m: Meters) -> f64 {
    let length = length_m.max(min_length_m).max(MIN_LENGTH_M);
    f64::from(incident_count) / (length / 100.0)
}

/// Computes per-segment aggregates from an attribution.
///
/// # Errors
///
/// Returns [`Error::StaleAggregates`] when `attribution` was computed for a
/// different graph version, and [`Error::UnknownEdge`] when it references a
/// segment the graph does not have.
pub fn compute_edge_aggregates(
    graph: &SafetyGraph,
    attribution: &Attribution,
    now: NaiveDateTime,
    config: &ScoringConfig,
) -> Result<EdgeAggregates, Error> {
    if attribution.graph_version != graph.version() {
        return Err(Error::StaleAggregates(format!(
            "attribution is for graph version {}, graph is at {}",
            attribution.graph_version,
            graph.version()
        )));
    }

    let mut by_edge = BTreeMap::new();
    for (&edge, indices) in &attribution.per_edge {
        let segment = graph.segment(edge).ok_or(Error::UnknownEdge(edge))?;
        let mut aggregate = EdgeRiskAggregate::default();
        for &i in indices {
            let incident = &attribution.events[i].incident;
            let weight = recency_weight(incident.occurred_at, now, config);
            aggregate.incident_count += 1;
            aggregate.violent_count += u32::from(incident.violent);
            aggregate.recency_score += weight;
            aggregate.severity_score += incident.severity * weight;
        }
        aggregate.density_per_100m =
            density_per_100m(aggregate.incident_count, segment.length_m, config.min_length_m);
        debug!("Edge {edge}: {aggregate:?}");
        by_edge.insert(edge, aggregate);
    }

    info!(
        "Aggregated {} incidents onto {} segments",
        attribution.attributed_count(),
        by_edge.len()
    );

    Ok(EdgeAggregates {
        graph_version: graph.version(),
        computed_at: now,
        by_edge,
    })
}
