//! Street network components - nodes and segments

use geo::{LineString, Point};
use serde::{Deserialize, Serialize};

use crate::{
    Meters,
    model::{EdgeId, ModeSet, NodeId, TravelMode},
};

/// Street graph node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique id of the node
    pub id: NodeId,
    /// Node coordinates (x = lon, y = lat)
    pub geometry: Point<f64>,
}

impl Node {
    pub fn new(id: NodeId, lat: f64, lon: f64) -> Self {
        Self {
            id,
            geometry: Point::new(lon, lat),
        }
    }
}

/// Street graph edge (directed street segment)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: EdgeId,
    /// Length in metres
    pub length_m: Meters,
    /// Travel modes allowed on the segment
    #[serde(default)]
    pub modes: ModeSet,
    /// Segment shape; replaced by the straight line between its nodes when empty
    #[serde(default = "empty_line")]
    pub geometry: LineString<f64>,
    /// Lighting score in 0..=1, `None` when no lighting layer covers the segment
    #[serde(default)]
    pub lighting: Option<f64>,
    /// Distance to the nearest emergency call point
    #[serde(default)]
    pub emergency_distance_m: Option<Meters>,
    /// Patrol observations attributed to this segment, `None` without a patrol layer
    #[serde(default)]
    pub patrol_count: Option<u32>,
}

fn empty_line() -> LineString<f64> {
    LineString::new(Vec::new())
}

impl Segment {
    pub fn new(from: NodeId, to: NodeId, key: u32, length_m: Meters) -> Self {
        Self {
            id: EdgeId::new(from, to, key),
            length_m,
            modes: ModeSet::ALL,
            geometry: empty_line(),
            lighting: None,
            emergency_distance_m: None,
            patrol_count: None,
        }
    }

    pub fn with_modes(mut self, modes: ModeSet) -> Self {
        self.modes = modes;
        self
    }

    pub fn with_geometry(mut self, geometry: LineString<f64>) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn with_lighting(mut self, lighting: f64) -> Self {
        self.lighting = Some(lighting.clamp(0.0, 1.0));
        self
    }

    pub fn allows(&self, mode: TravelMode) -> bool {
        self.modes.contains(mode)
    }

    pub fn attributes(&self) -> SegmentAttributes {
        SegmentAttributes {
            lighting: self.lighting,
            emergency_distance_m: self.emergency_distance_m,
            patrol_count: self.patrol_count,
        }
    }
}

/// Infrastructure attributes that may be bulk-updated after construction
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SegmentAttributes {
    pub lighting: Option<f64>,
    pub emergency_distance_m: Option<Meters>,
    pub patrol_count: Option<u32>,
}
