pub use crate::{MIN_LENGTH_M, MIN_SEVERITY};

// Re-export key components
pub use crate::config::{
    AttributionConfig, EngineConfig, RoutingConfig, ScoringConfig, TemporalConfig,
};
pub use crate::engine::{RefreshSummary, RiskSnapshot, SafetyEngine};
pub use crate::explain::{FactorBreakdown, RiskLevel, RouteExplanation, explain};
pub use crate::query::{
    NearbyIncident, TemporalPattern, edges_near, heatmap, recent_incidents_near,
    temporal_pattern_near,
};
pub use crate::risk::{
    Category, EdgeAggregates, EdgeCost, EdgeRiskAggregate, TemporalContext,
    compute_edge_aggregates, composite_weight, edge_cost,
};
pub use crate::routing::{Route, RouteLabel, find_routes};
pub use crate::shuttle::{
    NearbyStop, ServiceStatus, ShuttleData, ShuttleLine, ShuttleNetwork, ShuttleStop, TripShuttle,
};
pub use crate::spatial::{
    Attribution, AttributionGap, InfrastructureLayers, SpatialIndex, attribute,
};

// Core types for the street network
pub use crate::model::{
    AttributedIncident, EdgeId, Incident, IncidentRecord, ModeSet, Node, NodeId, Segment,
    SafetyGraph, Snap, TravelMode,
};
pub use crate::{Error, Meters};
