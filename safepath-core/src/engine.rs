//! Engine handle: graph, spatial index and the atomically republished risk
//! snapshot.
//!
//! Readers take an `Arc<RiskSnapshot>` and keep a consistent view for the
//! whole request. [`SafetyEngine::refresh`] builds the next snapshot
//! completely before publishing it with a single store, so a reader never
//! sees attribution and aggregates from different batches.

use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicU64, Ordering},
};

use arc_swap::ArcSwapOption;
use chrono::NaiveDateTime;
use geo::Point;
use log::{info, warn};
use rstar::{RTree, primitives::GeomWithData};
use serde::Serialize;

use crate::{
    Error, Meters,
    config::{EngineConfig, ScoringConfig},
    explain::{RouteExplanation, explain},
    model::{AttributedIncident, EdgeId, Incident, IncidentRecord, NodeId, SafetyGraph, TravelMode},
    risk::{
        EdgeAggregates, TemporalContext, WeightCache, compute_edge_aggregates, edge_weights,
        temporal_multiplier,
    },
    routing::{Route, find_routes},
    shuttle::{ShuttleData, ShuttleNetwork},
    spatial::{
        Attribution, InfrastructureLayers, InfrastructureSummary, LocalProjection, SpatialIndex,
        apply_infrastructure, attribute,
    },
};

type IncidentPoint = GeomWithData<[f64; 2], usize>;

/// Attribution and aggregates of one incident batch, bound to a graph version
#[derive(Debug)]
pub struct RiskSnapshot {
    version: u64,
    attribution: Attribution,
    aggregates: EdgeAggregates,
    projection: LocalProjection,
    /// Attributed incidents by projected location, data is the event index
    incident_points: RTree<IncidentPoint>,
    weights: WeightCache,
}

impl RiskSnapshot {
    /// # Errors
    ///
    /// Returns [`Error::StaleAggregates`] when `attribution` or `aggregates`
    /// belong to another graph version.
    pub fn new(
        graph: &SafetyGraph,
        projection: LocalProjection,
        attribution: Attribution,
        aggregates: EdgeAggregates,
        version: u64,
    ) -> Result<Self, Error> {
        if attribution.graph_version != graph.version() {
            return Err(Error::StaleAggregates(format!(
                "attribution is for graph version {}, graph is at {}",
                attribution.graph_version,
                graph.version()
            )));
        }
        if aggregates.graph_version() != graph.version() {
            return Err(Error::StaleAggregates(format!(
                "aggregates are for graph version {}, graph is at {}",
                aggregates.graph_version(),
                graph.version()
            )));
        }

        let points = attribution
            .events
            .iter()
            .enumerate()
            .filter(|(_, event)| event.is_attributed())
            .map(|(i, event)| GeomWithData::new(projection.project(event.incident.location), i))
            .collect();

        Ok(Self {
            version,
            attribution,
            aggregates,
            projection,
            incident_points: RTree::bulk_load(points),
            weights: WeightCache::default(),
        })
    }

    /// Publication counter of the engine that built this snapshot
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn graph_version(&self) -> u64 {
        self.aggregates.graph_version()
    }

    pub fn computed_at(&self) -> NaiveDateTime {
        self.aggregates.computed_at()
    }

    pub fn attribution(&self) -> &Attribution {
        &self.attribution
    }

    pub fn aggregates(&self) -> &EdgeAggregates {
        &self.aggregates
    }

    pub fn projection(&self) -> &LocalProjection {
        &self.projection
    }

    /// # Errors
    ///
    /// Returns [`Error::StaleAggregates`] when the snapshot was built for
    /// another version of `graph`.
    pub fn ensure_current(&self, graph: &SafetyGraph) -> Result<(), Error> {
        if self.graph_version() == graph.version() {
            Ok(())
        } else {
            Err(Error::StaleAggregates(format!(
                "snapshot is for graph version {}, graph is at {}",
                self.graph_version(),
                graph.version()
            )))
        }
    }

    /// Composite weights for `mode` at `temporal_multiplier` under `config`,
    /// memoised per snapshot
    pub fn weights(
        &self,
        graph: &SafetyGraph,
        mode: TravelMode,
        temporal_multiplier: f64,
        config: &ScoringConfig,
    ) -> Arc<[f64]> {
        self.weights.get_or_compute(mode, temporal_multiplier, config, || {
            edge_weights(graph, &self.aggregates, mode, temporal_multiplier, config)
        })
    }

    /// Attributed incidents within `radius_m` of `point`, unordered
    pub fn incidents_within(
        &self,
        point: Point<f64>,
        radius_m: Meters,
    ) -> Vec<(&AttributedIncident, Meters)> {
        let xy = self.projection.project(point);
        self.incident_points
            .locate_within_distance(xy, radius_m * radius_m)
            .map(|p| {
                let [x, y] = *p.geom();
                let distance = (x - xy[0]).hypot(y - xy[1]);
                (&self.attribution.events[p.data], distance)
            })
            .collect()
    }
}

/// Outcome of publishing a new snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    pub version: u64,
    pub incidents: usize,
    /// Records dropped by validation
    pub rejected: usize,
    pub attributed: usize,
    pub unattributed: usize,
    pub segments_with_incidents: usize,
}

/// Shared engine handle, safe to use from many threads
pub struct SafetyEngine {
    graph: Arc<SafetyGraph>,
    index: SpatialIndex,
    config: EngineConfig,
    infrastructure: InfrastructureSummary,
    shuttles: ShuttleNetwork,
    snapshot: ArcSwapOption<RiskSnapshot>,
    generation: AtomicU64,
    /// Serializes writers; readers never take it
    publishing: Mutex<()>,
}

impl SafetyEngine {
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for an invalid configuration.
    pub fn new(graph: SafetyGraph, config: EngineConfig) -> Result<Self, Error> {
        Self::with_infrastructure(graph, &InfrastructureLayers::default(), config)
    }

    /// Applies infrastructure layers to `graph` before sharing it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for an invalid configuration.
    pub fn with_infrastructure(
        mut graph: SafetyGraph,
        layers: &InfrastructureLayers,
        config: EngineConfig,
    ) -> Result<Self, Error> {
        config.validate()?;
        let index = SpatialIndex::build(&graph);
        let infrastructure = apply_infrastructure(&mut graph, &index, layers, &config.attribution)?;
        info!(
            "Engine ready: {} nodes, {} segments, {} segments with infrastructure",
            graph.node_count(),
            graph.segment_count(),
            infrastructure.segments_updated
        );

        let shuttles = ShuttleNetwork::empty(*index.projection());
        Ok(Self {
            graph: Arc::new(graph),
            index,
            config,
            infrastructure,
            shuttles,
            snapshot: ArcSwapOption::empty(),
            generation: AtomicU64::new(0),
            publishing: Mutex::new(()),
        })
    }

    pub fn graph(&self) -> &Arc<SafetyGraph> {
        &self.graph
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn infrastructure(&self) -> &InfrastructureSummary {
        &self.infrastructure
    }

    /// Replaces the shuttle network, indexing stops in the graph projection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidData`] for invalid stops or schedules.
    pub fn with_shuttles(mut self, data: ShuttleData) -> Result<Self, Error> {
        self.shuttles = ShuttleNetwork::new(data, *self.index.projection())?;
        Ok(self)
    }

    pub fn shuttles(&self) -> &ShuttleNetwork {
        &self.shuttles
    }

    /// Validates raw records, then attributes, aggregates and publishes them.
    ///
    /// Invalid records are logged and counted in
    /// [`RefreshSummary::rejected`].
    ///
    /// # Errors
    ///
    /// Propagates attribution and aggregation errors; the previous snapshot
    /// stays published.
    pub fn refresh(
        &self,
        records: Vec<IncidentRecord>,
        now: NaiveDateTime,
    ) -> Result<RefreshSummary, Error> {
        let total = records.len();
        let incidents: Vec<Incident> = records
            .into_iter()
            .filter_map(|record| match Incident::from_record(record) {
                Ok(incident) => Some(incident),
                Err(e) => {
                    warn!("Skipping incident: {e}");
                    None
                }
            })
            .collect();
        let rejected = total - incidents.len();

        let mut summary = self.refresh_incidents(incidents, now)?;
        summary.incidents = total;
        summary.rejected = rejected;
        Ok(summary)
    }

    /// Attributes, aggregates and publishes validated incidents.
    ///
    /// # Errors
    ///
    /// Propagates attribution and aggregation errors.
    pub fn refresh_incidents(
        &self,
        incidents: Vec<Incident>,
        now: NaiveDateTime,
    ) -> Result<RefreshSummary, Error> {
        let _guard = self.publishing.lock().unwrap_or_else(PoisonError::into_inner);
        let count = incidents.len();
        let attribution = attribute(
            incidents,
            &self.graph,
            &self.index,
            self.config.attribution.tolerance_m,
        )?;
        let aggregates = compute_edge_aggregates(&self.graph, &attribution, now, &self.config.scoring)?;
        let snapshot = self.publish(attribution, aggregates)?;

        Ok(RefreshSummary {
            version: snapshot.version(),
            incidents: count,
            rejected: 0,
            attributed: snapshot.attribution().attributed_count(),
            unattributed: snapshot.attribution().unattributed_count(),
            segments_with_incidents: snapshot.aggregates().len(),
        })
    }

    /// Publishes previously persisted attribution and aggregates.
    ///
    /// Both are re-bound to the current graph version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownEdge`] when they reference segments this graph
    /// does not have.
    pub fn restore(
        &self,
        attribution: Attribution,
        aggregates: EdgeAggregates,
    ) -> Result<Arc<RiskSnapshot>, Error> {
        let _guard = self.publishing.lock().unwrap_or_else(PoisonError::into_inner);
        let attribution = attribution.rebind(&self.graph)?;
        let aggregates = aggregates.rebind(&self.graph)?;
        self.publish(attribution, aggregates)
    }

    fn publish(
        &self,
        attribution: Attribution,
        aggregates: EdgeAggregates,
    ) -> Result<Arc<RiskSnapshot>, Error> {
        let version = self.generation.load(Ordering::Acquire) + 1;
        let snapshot = Arc::new(RiskSnapshot::new(
            &self.graph,
            *self.index.projection(),
            attribution,
            aggregates,
            version,
        )?);
        self.snapshot.store(Some(Arc::clone(&snapshot)));
        self.generation.store(version, Ordering::Release);
        info!(
            "Published risk snapshot {version} ({} segments with incidents)",
            snapshot.aggregates().len()
        );
        Ok(snapshot)
    }

    /// Current snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StaleAggregates`] before the first refresh.
    pub fn snapshot(&self) -> Result<Arc<RiskSnapshot>, Error> {
        self.snapshot.load_full().ok_or_else(|| {
            Error::StaleAggregates("no incidents have been published yet".to_string())
        })
    }

    /// Plans routes with the current snapshot, `k` defaults to
    /// `routing.default_k`.
    ///
    /// # Errors
    ///
    /// See [`find_routes`].
    pub fn find_routes(
        &self,
        origin: NodeId,
        destination: NodeId,
        mode: TravelMode,
        context: &TemporalContext,
        k: Option<usize>,
    ) -> Result<Vec<Route>, Error> {
        let snapshot = self.snapshot()?;
        find_routes(
            &self.graph,
            &snapshot,
            origin,
            destination,
            mode,
            context,
            k.unwrap_or(self.config.routing.default_k),
            &self.config,
        )
    }

    /// # Errors
    ///
    /// See [`explain`].
    pub fn explain(&self, route: &Route) -> Result<RouteExplanation, Error> {
        let snapshot = self.snapshot()?;
        explain(route, &self.graph, &snapshot, &self.config)
    }

    /// # Errors
    ///
    /// See [`Route::from_nodes`].
    pub fn route_from_nodes(
        &self,
        nodes: &[NodeId],
        mode: TravelMode,
        context: &TemporalContext,
    ) -> Result<Route, Error> {
        let snapshot = self.snapshot()?;
        Route::from_nodes(&self.graph, &snapshot, &self.config, nodes, mode, context)
    }

    /// # Errors
    ///
    /// See [`Route::from_edges`].
    pub fn route_from_edges(
        &self,
        edges: &[EdgeId],
        mode: TravelMode,
        context: &TemporalContext,
    ) -> Result<Route, Error> {
        let snapshot = self.snapshot()?;
        Route::from_edges(&self.graph, &snapshot, &self.config, edges, mode, context)
    }

    /// Closest graph node to `point` and its distance in metres
    pub fn nearest_node(&self, point: Point<f64>) -> Option<(NodeId, Meters)> {
        self.index.nearest_node(point)
    }

    /// Temporal multiplier for `context` at the graph centroid
    pub fn temporal_multiplier(&self, context: &TemporalContext) -> f64 {
        temporal_multiplier(&self.config.temporal, context, self.graph.centroid())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::model::{Node, Segment};

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn engine() -> SafetyEngine {
        let graph = SafetyGraph::new(
            vec![Node::new(1, 0.0, 0.0), Node::new(2, 0.0, 0.001)],
            vec![Segment::new(1, 2, 0, 111.0), Segment::new(2, 1, 0, 111.0)],
        )
        .unwrap();
        SafetyEngine::new(graph, EngineConfig::default()).unwrap()
    }

    fn record(id: u64, lat: f64, lon: f64) -> IncidentRecord {
        IncidentRecord {
            id,
            source: "test".into(),
            occurred_at: now() - chrono::Duration::days(1),
            category: None,
            severity: Some(0.5),
            violent: None,
            lat,
            lon,
            description: None,
        }
    }

    #[test]
    fn snapshot_is_stale_before_first_refresh() {
        let engine = engine();
        assert!(matches!(engine.snapshot(), Err(Error::StaleAggregates(_))));
    }

    #[test]
    fn refresh_publishes_increasing_versions() {
        let engine = engine();
        let first = engine.refresh(vec![record(1, 0.0, 0.0005)], now()).unwrap();
        let second = engine.refresh(vec![], now()).unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
        assert_eq!(engine.snapshot().unwrap().version(), 2);
    }

    #[test]
    fn refresh_counts_rejected_and_unattributed() {
        let engine = engine();
        let summary = engine
            .refresh(
                vec![
                    record(1, 0.0, 0.0005),
                    record(2, f64::NAN, 0.0),
                    record(3, 1.0, 1.0),
                ],
                now(),
            )
            .unwrap();
        assert_eq!(summary.incidents, 3);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.attributed, 1);
        assert_eq!(summary.unattributed, 1);
        // Both directions overlap; the smaller id wins
        assert_eq!(summary.segments_with_incidents, 1);
    }

    #[test]
    fn readers_keep_their_snapshot_across_refresh() {
        let engine = engine();
        engine.refresh(vec![record(1, 0.0, 0.0005)], now()).unwrap();
        let held = engine.snapshot().unwrap();
        engine.refresh(vec![], now()).unwrap();
        assert_eq!(held.attribution().attributed_count(), 1);
        assert_eq!(engine.snapshot().unwrap().attribution().attributed_count(), 0);
    }

    #[test]
    fn incidents_within_radius() {
        let engine = engine();
        engine.refresh(vec![record(1, 0.0, 0.0005)], now()).unwrap();
        let snapshot = engine.snapshot().unwrap();
        assert_eq!(snapshot.incidents_within(Point::new(0.0005, 0.0), 10.0).len(), 1);
        assert!(snapshot.incidents_within(Point::new(0.005, 0.0), 10.0).is_empty());
    }

    #[test]
    fn weights_are_memoised_per_snapshot() {
        let engine = engine();
        engine.refresh(vec![], now()).unwrap();
        let snapshot = engine.snapshot().unwrap();
        let graph = engine.graph();
        let a = snapshot.weights(graph, TravelMode::Walk, 1.0, &engine.config().scoring);
        let b = snapshot.weights(graph, TravelMode::Walk, 1.0, &engine.config().scoring);
        assert!(Arc::ptr_eq(&a, &b));
    }
}
