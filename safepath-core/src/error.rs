use thiserror::Error;

use crate::model::{EdgeId, NodeId, TravelMode};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Malformed graph: {0}")]
    MalformedGraph(String),
    #[error("Unknown travel mode: {0:?}")]
    UnknownMode(String),
    #[error("No {mode} path between node {origin} and node {destination}")]
    NoPath {
        origin: NodeId,
        destination: NodeId,
        mode: TravelMode,
    },
    #[error("Risk aggregates are not available: {0}")]
    StaleAggregates(String),
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),
    #[error("Unknown edge: {0}")]
    UnknownEdge(EdgeId),
    #[error("Invalid route: {0}")]
    InvalidRoute(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("GeoJSON error: {0}")]
    GeoJsonError(String),
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl Error {
    /// Stable machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Error::MalformedGraph(_) => "malformed_graph",
            Error::UnknownMode(_) => "unknown_mode",
            Error::NoPath { .. } => "no_path",
            Error::StaleAggregates(_) => "stale_aggregates",
            Error::UnknownNode(_) => "unknown_node",
            Error::UnknownEdge(_) => "unknown_edge",
            Error::InvalidRoute(_) => "invalid_route",
            Error::InvalidConfig(_) => "invalid_config",
            Error::InvalidData(_) => "invalid_data",
            Error::GeoJsonError(_) => "geojson",
            Error::IoError(_) => "io",
            Error::JsonError(_) => "json",
        }
    }
}
