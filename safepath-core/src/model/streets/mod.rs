//! Street network model

pub mod components;
pub mod network;

pub use components::{Node, Segment, SegmentAttributes};
pub use network::SafetyGraph;
