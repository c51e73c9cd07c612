//! Safest, fastest and alternative route planning.
//!
//! Alternatives come from iterative penalisation: after every extracted path
//! its segments get more expensive and the search runs again. Candidates that
//! share too much length with an accepted route are dropped.

use std::cmp::Ordering;

use fixedbitset::FixedBitSet;
use log::debug;
use petgraph::graph::{EdgeIndex, NodeIndex};

use super::{
    dijkstra::shortest_path,
    route::{Route, RouteLabel},
};
use crate::{
    Error,
    config::{EngineConfig, RoutingConfig},
    engine::RiskSnapshot,
    model::{NodeId, SafetyGraph, TravelMode},
    risk::{TemporalContext, length_weights, temporal_multiplier},
};

struct Candidate {
    edges: Vec<EdgeIndex>,
    members: FixedBitSet,
    length: f64,
    cost: f64,
}

impl Candidate {
    fn new(edges: Vec<EdgeIndex>, weights: &[f64], lengths: &[f64]) -> Self {
        let mut members = FixedBitSet::with_capacity(lengths.len());
        for edge in &edges {
            members.insert(edge.index());
        }
        Self {
            length: edges.iter().map(|e| lengths[e.index()]).sum(),
            cost: edges.iter().map(|e| weights[e.index()]).sum(),
            members,
            edges,
        }
    }

    /// Shared length over the length of the shorter route
    fn similarity(&self, other: &Candidate, lengths: &[f64]) -> f64 {
        let shorter = self.length.min(other.length);
        if shorter <= 0.0 {
            return 1.0;
        }
        let shared: f64 = self
            .members
            .intersection(&other.members)
            .map(|i| lengths[i])
            .sum();
        shared / shorter
    }

    /// Composite cost, then segment count, then segment id sequence
    fn rank(&self, other: &Candidate) -> Ordering {
        self.cost
            .total_cmp(&other.cost)
            .then_with(|| self.edges.len().cmp(&other.edges.len()))
            .then_with(|| self.edges.cmp(&other.edges))
    }
}

fn penalize(weights: &mut [f64], edges: &[EdgeIndex], factor: f64) {
    for edge in edges {
        weights[edge.index()] *= factor;
    }
}

/// Penalise-and-retry search for up to `k` mutually dissimilar candidates
#[allow(clippy::too_many_arguments)]
fn alternatives(
    graph: &SafetyGraph,
    start: NodeIndex,
    target: NodeIndex,
    mode: TravelMode,
    weights: &[f64],
    lengths: &[f64],
    primary: Candidate,
    k: usize,
    config: &RoutingConfig,
) -> Vec<Candidate> {
    let mut penalized = weights.to_vec();
    penalize(&mut penalized, &primary.edges, config.penalty_factor);
    let mut accepted = vec![primary];

    let mut iterations = 0;
    while accepted.len() < k && iterations < config.max_iterations {
        iterations += 1;
        let Some(path) = shortest_path(graph, start, target, mode, &penalized) else {
            break;
        };
        penalize(&mut penalized, &path.edges, config.penalty_factor);

        let candidate = Candidate::new(path.edges, weights, lengths);
        if let Some(similar) = accepted
            .iter()
            .map(|a| a.similarity(&candidate, lengths))
            .find(|s| *s > config.similarity_threshold)
        {
            debug!("Iteration {iterations}: candidate rejected, similarity {similar:.2}");
            continue;
        }
        accepted.push(candidate);
    }

    debug!(
        "Alternative search: {} routes after {iterations} iterations",
        accepted.len()
    );
    accepted
}

/// Plans up to `k` routes from `origin` to `destination`.
///
/// The lowest composite cost route is labelled [`RouteLabel::Safest`]. With
/// `k >= 2` the shortest-by-length route is always included and labelled
/// [`RouteLabel::Fastest`] unless it is the safest one. Alternatives whose
/// shared length with it exceeds the similarity threshold are dropped, then
/// the most expensive alternative if the list is still full. The safest and
/// fastest routes are never compared with each other. Remaining routes are
/// [`RouteLabel::Alternative`]. Routes are ordered by composite cost,
/// segment count and segment id sequence.
///
/// # Errors
///
/// - [`Error::UnknownNode`] when an endpoint is not in the graph
/// - [`Error::NoPath`] when no path exists for `mode`
/// - [`Error::StaleAggregates`] when the snapshot is for another graph version
/// - [`Error::InvalidData`] when `k` is zero
#[allow(clippy::too_many_arguments)]
pub fn find_routes(
    graph: &SafetyGraph,
    snapshot: &RiskSnapshot,
    origin: NodeId,
    destination: NodeId,
    mode: TravelMode,
    context: &TemporalContext,
    k: usize,
    config: &EngineConfig,
) -> Result<Vec<Route>, Error> {
    if k == 0 {
        return Err(Error::InvalidData("k must be at least 1".to_string()));
    }
    snapshot.ensure_current(graph)?;
    let start = graph.node_index(origin).ok_or(Error::UnknownNode(origin))?;
    let target = graph
        .node_index(destination)
        .ok_or(Error::UnknownNode(destination))?;

    if start == target {
        return Ok(vec![Route::assemble(
            graph,
            snapshot,
            config,
            RouteLabel::Safest,
            mode,
            context,
            origin,
            &[],
        )]);
    }

    let multiplier = temporal_multiplier(&config.temporal, context, graph.centroid());
    let weights = snapshot.weights(graph, mode, multiplier, &config.scoring);
    let lengths = length_weights(graph);

    let no_path = || Error::NoPath {
        origin,
        destination,
        mode,
    };
    let primary = shortest_path(graph, start, target, mode, &weights).ok_or_else(no_path)?;
    let primary = Candidate::new(primary.edges, &weights, &lengths);

    let mut candidates = alternatives(
        graph,
        start,
        target,
        mode,
        &weights,
        &lengths,
        primary,
        k,
        &config.routing,
    );
    candidates.sort_by(Candidate::rank);

    let mut fastest_members = None;
    if k >= 2 {
        let fastest = shortest_path(graph, start, target, mode, &lengths).ok_or_else(no_path)?;
        let fastest = Candidate::new(fastest.edges, &weights, &lengths);
        if let Some(position) = candidates.iter().position(|c| c.members == fastest.members) {
            if position > 0 {
                fastest_members = Some(fastest.members);
            }
        } else {
            // Alternatives too close to the fastest route make way for it
            let threshold = config.routing.similarity_threshold;
            let mut kept: Vec<Candidate> = candidates
                .into_iter()
                .enumerate()
                .filter(|(i, c)| *i == 0 || c.similarity(&fastest, &lengths) <= threshold)
                .map(|(_, c)| c)
                .collect();
            kept.truncate(k - 1);
            fastest_members = Some(fastest.members.clone());
            kept.push(fastest);
            kept.sort_by(Candidate::rank);
            candidates = kept;
        }
    }

    let routes = candidates
        .iter()
        .enumerate()
        .map(|(i, candidate)| {
            let label = if i == 0 {
                RouteLabel::Safest
            } else if fastest_members.as_ref() == Some(&candidate.members) {
                RouteLabel::Fastest
            } else {
                RouteLabel::Alternative
            };
            Route::assemble(
                graph,
                snapshot,
                config,
                label,
                mode,
                context,
                origin,
                &candidate.edges,
            )
        })
        .collect();
    Ok(routes)
}
