//! Safety-weighted routing engine.
//!
//! The crate attributes geolocated incidents and infrastructure to the
//! segments of a street network, turns them into per-segment risk aggregates
//! and time-varying composite weights, plans safest / fastest / alternative
//! routes over those weights and explains every route with a 0–100 risk
//! score and a factor breakdown.
//!
//! Pipeline: [`spatial::attribute`] → [`risk::compute_edge_aggregates`] →
//! [`routing::find_routes`] → [`explain::explain`]. [`SafetyEngine`] wires the
//! stages together behind an atomically republished snapshot.

pub mod config;
pub mod engine;
pub mod error;
pub mod explain;
pub mod model;
pub mod persist;
pub mod prelude;
pub mod query;
pub mod risk;
pub mod routing;
pub mod shuttle;
pub mod spatial;

pub use config::EngineConfig;
pub use engine::{RiskSnapshot, SafetyEngine};
pub use error::Error;
pub use explain::{RouteExplanation, explain};
pub use model::{EdgeId, Incident, IncidentRecord, Node, NodeId, Segment, SafetyGraph, TravelMode};
pub use risk::{Category, TemporalContext};
pub use routing::{Route, RouteLabel, find_routes};

/// Segment length floor in metres used by every per-length normalisation.
pub const MIN_LENGTH_M: f64 = 1.0;

/// Severity assigned to incidents whose source did not provide one.
pub const MIN_SEVERITY: f64 = 0.1;

/// Distance in metres
pub type Meters = f64;
