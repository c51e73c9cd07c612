//! Incident records as delivered by ingestion and their validated form

use chrono::NaiveDateTime;
use geo::Point;
use serde::{Deserialize, Serialize};

use crate::{Error, MIN_SEVERITY, Meters, model::EdgeId, risk::Category};

/// Normalized incident as produced by an ingestion collaborator.
///
/// Optional fields are filled by [`Incident::from_record`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub id: u64,
    #[serde(default)]
    pub source: String,
    pub occurred_at: NaiveDateTime,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub severity: Option<f64>,
    #[serde(default)]
    pub violent: Option<bool>,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub description: Option<String>,
}

/// Validated incident
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: u64,
    pub source: String,
    pub occurred_at: NaiveDateTime,
    pub category: Category,
    /// Severity weight in 0..=1
    pub severity: f64,
    pub violent: bool,
    pub location: Point<f64>,
    pub description: Option<String>,
}

impl Incident {
    /// Validates a raw record.
    ///
    /// Missing or non-finite severity falls back to [`MIN_SEVERITY`], values
    /// outside 0..=1 are clamped. A missing category is classified from the
    /// description; a missing violent flag comes from the category.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidData`] for non-finite or out-of-range coordinates.
    pub fn from_record(record: IncidentRecord) -> Result<Self, Error> {
        if !record.lat.is_finite()
            || !record.lon.is_finite()
            || record.lat.abs() > 90.0
            || record.lon.abs() > 180.0
        {
            return Err(Error::InvalidData(format!(
                "incident {} has invalid coordinates ({}, {})",
                record.id, record.lat, record.lon
            )));
        }

        let category = record.category.unwrap_or_else(|| {
            record
                .description
                .as_deref()
                .map_or(Category::Other, Category::classify)
        });
        let severity = record
            .severity
            .filter(|s| s.is_finite())
            .map_or(MIN_SEVERITY, |s| s.clamp(0.0, 1.0));

        Ok(Self {
            id: record.id,
            source: record.source,
            occurred_at: record.occurred_at,
            category,
            severity,
            violent: record.violent.unwrap_or_else(|| category.is_violent()),
            location: Point::new(record.lon, record.lat),
            description: record.description,
        })
    }
}

/// Where an incident landed on the network
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Snap {
    Edge {
        edge: EdgeId,
        distance_m: Meters,
    },
    Unattributed {
        /// Distance to the nearest indexed segment, `None` for an empty index
        nearest_distance_m: Option<Meters>,
        /// Nearest segment is strictly further than the tolerance
        far_from_any_edge: bool,
    },
}

/// Incident with its attribution result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributedIncident {
    pub incident: Incident,
    pub snap: Snap,
}

impl AttributedIncident {
    pub fn edge(&self) -> Option<EdgeId> {
        match self.snap {
            Snap::Edge { edge, .. } => Some(edge),
            Snap::Unattributed { .. } => None,
        }
    }

    pub fn snap_distance(&self) -> Option<Meters> {
        match self.snap {
            Snap::Edge { distance_m, .. } => Some(distance_m),
            Snap::Unattributed {
                nearest_distance_m, ..
            } => nearest_distance_m,
        }
    }

    pub fn is_attributed(&self) -> bool {
        matches!(self.snap, Snap::Edge { .. })
    }
}
