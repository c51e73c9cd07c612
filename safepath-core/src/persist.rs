//! JSON persistence for graphs, attributions and aggregates.
//!
//! Restored attributions and aggregates carry the graph version they were
//! computed for; re-bind them with [`crate::SafetyEngine::restore`] before
//! routing on a freshly loaded graph.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use log::info;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    Error,
    model::{IncidentRecord, Node, SafetyGraph, Segment},
    risk::EdgeAggregates,
    shuttle::ShuttleData,
    spatial::{Attribution, InfrastructureLayers},
};

#[derive(Serialize, Deserialize)]
struct GraphDocument {
    nodes: Vec<Node>,
    segments: Vec<Segment>,
}

/// # Errors
///
/// Returns [`Error::JsonError`] when serialization or writing fails.
pub fn write_graph<W: Write>(graph: &SafetyGraph, writer: W) -> Result<(), Error> {
    let (nodes, segments) = graph.to_parts();
    serde_json::to_writer(writer, &GraphDocument { nodes, segments })?;
    Ok(())
}

/// # Errors
///
/// Returns [`Error::JsonError`] for malformed JSON and
/// [`Error::MalformedGraph`] when the document is not a valid graph.
pub fn read_graph<R: Read>(reader: R) -> Result<SafetyGraph, Error> {
    let document: GraphDocument = serde_json::from_reader(reader)?;
    SafetyGraph::new(document.nodes, document.segments)
}

/// # Errors
///
/// Returns [`Error::JsonError`] when serialization or writing fails.
pub fn write_aggregates<W: Write>(aggregates: &EdgeAggregates, writer: W) -> Result<(), Error> {
    serde_json::to_writer(writer, aggregates)?;
    Ok(())
}

/// # Errors
///
/// Returns [`Error::JsonError`] for malformed JSON.
pub fn read_aggregates<R: Read>(reader: R) -> Result<EdgeAggregates, Error> {
    Ok(serde_json::from_reader(reader)?)
}

/// # Errors
///
/// Returns [`Error::JsonError`] when serialization or writing fails.
pub fn write_attribution<W: Write>(attribution: &Attribution, writer: W) -> Result<(), Error> {
    serde_json::to_writer(writer, attribution)?;
    Ok(())
}

/// # Errors
///
/// Returns [`Error::JsonError`] for malformed JSON.
pub fn read_attribution<R: Read>(reader: R) -> Result<Attribution, Error> {
    Ok(serde_json::from_reader(reader)?)
}

fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T, Error> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Loads a graph document from `path`
///
/// # Errors
///
/// Returns [`Error::IoError`] when the file cannot be opened, otherwise see
/// [`read_graph`].
pub fn load_graph(path: impl AsRef<Path>) -> Result<SafetyGraph, Error> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let graph = read_graph(BufReader::new(file))?;
    info!(
        "Loaded graph from {}: {} nodes, {} segments",
        path.display(),
        graph.node_count(),
        graph.segment_count()
    );
    Ok(graph)
}

/// Writes a graph document to `path`
///
/// # Errors
///
/// Returns [`Error::IoError`] when the file cannot be created or flushed.
pub fn save_graph(graph: &SafetyGraph, path: impl AsRef<Path>) -> Result<(), Error> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_graph(graph, &mut writer)?;
    writer.flush()?;
    Ok(())
}

/// Reads a JSON array of incident records
///
/// # Errors
///
/// Returns [`Error::IoError`] or [`Error::JsonError`].
pub fn load_incidents(path: impl AsRef<Path>) -> Result<Vec<IncidentRecord>, Error> {
    let path = path.as_ref();
    let records: Vec<IncidentRecord> = read_json_file(path)?;
    info!("Loaded {} incident records from {}", records.len(), path.display());
    Ok(records)
}

/// Reads infrastructure layers; absent keys are missing layers
///
/// # Errors
///
/// Returns [`Error::IoError`] or [`Error::JsonError`].
pub fn load_infrastructure(path: impl AsRef<Path>) -> Result<InfrastructureLayers, Error> {
    read_json_file(path.as_ref())
}

/// Reads shuttle stops and lines
///
/// # Errors
///
/// Returns [`Error::IoError`] or [`Error::JsonError`].
pub fn load_shuttles(path: impl AsRef<Path>) -> Result<ShuttleData, Error> {
    let path = path.as_ref();
    let data: ShuttleData = read_json_file(path)?;
    info!(
        "Loaded {} shuttle stops and {} lines from {}",
        data.stops.len(),
        data.lines.len(),
        path.display()
    );
    Ok(data)
}
