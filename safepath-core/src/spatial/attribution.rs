//! Incident to segment attribution

use std::collections::BTreeMap;

use log::{info, trace, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::index::SpatialIndex;
use crate::{
    Error, Meters,
    model::{AttributedIncident, EdgeId, Incident, SafetyGraph, Snap},
};

/// Incident that could not be attributed to any segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttributionGap {
    pub incident_id: u64,
    pub nearest_distance_m: Option<Meters>,
    pub far_from_any_edge: bool,
}

/// Attribution of a batch of incidents to one graph version.
///
/// `events` keeps the input order; `per_edge` lists indices into `events`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "AttributionDocument", into = "AttributionDocument")]
pub struct Attribution {
    pub graph_version: u64,
    pub tolerance_m: Meters,
    pub events: Vec<AttributedIncident>,
    pub per_edge: BTreeMap<EdgeId, Vec<usize>>,
    pub gaps: Vec<AttributionGap>,
}

#[derive(Serialize, Deserialize)]
struct AttributionDocument {
    graph_version: u64,
    tolerance_m: Meters,
    events: Vec<AttributedIncident>,
}

impl From<AttributionDocument> for Attribution {
    fn from(document: AttributionDocument) -> Self {
        Attribution::from_events(document.graph_version, document.tolerance_m, document.events)
    }
}

impl From<Attribution> for AttributionDocument {
    fn from(attribution: Attribution) -> Self {
        Self {
            graph_version: attribution.graph_version,
            tolerance_m: attribution.tolerance_m,
            events: attribution.events,
        }
    }
}

impl Attribution {
    /// Builds the per-edge index and gap list from snapped events
    pub fn from_events(graph_version: u64, tolerance_m: Meters, events: Vec<AttributedIncident>) -> Self {
        let mut per_edge: BTreeMap<EdgeId, Vec<usize>> = BTreeMap::new();
        let mut gaps = Vec::new();
        for (i, event) in events.iter().enumerate() {
            match event.snap {
                Snap::Edge { edge, .. } => per_edge.entry(edge).or_default().push(i),
                Snap::Unattributed {
                    nearest_distance_m,
                    far_from_any_edge,
                } => gaps.push(AttributionGap {
                    incident_id: event.incident.id,
                    nearest_distance_m,
                    far_from_any_edge,
                }),
            }
        }
        Self {
            graph_version,
            tolerance_m,
            events,
            per_edge,
            gaps,
        }
    }

    pub fn attributed_count(&self) -> usize {
        self.events.len() - self.gaps.len()
    }

    pub fn unattributed_count(&self) -> usize {
        self.gaps.len()
    }

    /// Incidents attributed to `edge`, in input order
    pub fn incidents_on(&self, edge: EdgeId) -> impl Iterator<Item = &AttributedIncident> {
        self.per_edge
            .get(&edge)
            .into_iter()
            .flatten()
            .map(|&i| &self.events[i])
    }

    /// Rebinds a restored attribution to `graph`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownEdge`] when an incident sits on a segment the
    /// graph does not have.
    pub fn rebind(mut self, graph: &SafetyGraph) -> Result<Self, Error> {
        if let Some(missing) = self.per_edge.keys().find(|id| graph.segment(**id).is_none()) {
            return Err(Error::UnknownEdge(*missing));
        }
        self.graph_version = graph.version();
        Ok(self)
    }
}

/// Snaps every incident onto the nearest segment within `tolerance_m`.
///
/// Ties between equidistant segments go to the smallest `EdgeId`, so the
/// result is deterministic. Incidents with no segment in range are kept as
/// unattributed and reported as gaps.
///
/// # Errors
///
/// Returns [`Error::InvalidConfig`] for a non-positive tolerance.
pub fn attribute(
    incidents: Vec<Incident>,
    graph: &SafetyGraph,
    index: &SpatialIndex,
    tolerance_m: Meters,
) -> Result<Attribution, Error> {
    if !(tolerance_m.is_finite() && tolerance_m > 0.0) {
        return Err(Error::InvalidConfig(format!(
            "attribution tolerance must be > 0, got {tolerance_m}"
        )));
    }

    info!("Attributing {} incidents (tolerance {tolerance_m} m)", incidents.len());

    let events: Vec<AttributedIncident> = incidents
        .into_par_iter()
        .map(|incident| {
            let snap = index.snap(incident.location, tolerance_m);
            if let Snap::Unattributed {
                nearest_distance_m, ..
            } = snap
            {
                trace!(
                    "Incident {} at {:?} has no segment within {tolerance_m} m (nearest: {nearest_distance_m:?})",
                    incident.id, incident.location
                );
            }
            AttributedIncident { incident, snap }
        })
        .collect();

    let attribution = Attribution::from_events(graph.version(), tolerance_m, events);
    if !attribution.gaps.is_empty() {
        warn!(
            "{} of {} incidents could not be attributed to a segment",
            attribution.gaps.len(),
            attribution.events.len()
        );
    }
    info!(
        "Attributed {} incidents to {} segments",
        attribution.attributed_count(),
        attribution.per_edge.len()
    );
    Ok(attribution)
}
