//! Data model for safety-weighted routing
//!
//! Contains the street network, travel modes and incident records.

pub mod ids;
pub mod incident;
pub mod mode;
pub mod streets;

// Re-export of basic types for convenience
pub use ids::{EdgeId, NodeId};
pub use incident::{AttributedIncident, Incident, IncidentRecord, Snap};
pub use mode::{ModeSet, TravelMode};
pub use streets::{Node, SafetyGraph, Segment, SegmentAttributes};
