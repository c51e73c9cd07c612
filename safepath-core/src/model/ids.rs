use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique node identifier (OSM-style signed id)
pub type NodeId = i64;

/// Identifier of a directed segment.
///
/// Parallel segments between the same node pair are told apart by `key`.
/// The derived ordering is lexicographic over `(from, to, key)` and is used
/// for every deterministic tie-break in the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId {
    pub from: NodeId,
    pub to: NodeId,
    pub key: u32,
}

impl EdgeId {
    pub const fn new(from: NodeId, to: NodeId, key: u32) -> Self {
        Self { from, to, key }
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}#{}", self.from, self.to, self.key)
    }
}
