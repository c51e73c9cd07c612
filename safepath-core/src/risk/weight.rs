//! Composite edge weight.
//!
//! ```text
//! raw = ( L
//!       + (β/α) · S · T · crime_unit_m
//!       + (γ/α) · (1 − lighting) · L          if lighting is known
//!       − (δ/α) · bonus(emergency) · L        if emergency distance is known
//!       ) · M
//! weight = max(raw, L)
//! ```
//!
//! with `L` the segment length, `S` the recency-weighted severity score,
//! `T` the temporal multiplier and `M` the travel mode multiplier. Taking the
//! coefficients relative to α keeps the distance term equal to the length,
//! so the floor only ever removes a net bonus.

use std::sync::{Arc, PoisonError, RwLock};

use hashbrown::HashMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::aggregate::{EdgeAggregates, EdgeRiskAggregate};
use crate::{
    Meters,
    config::ScoringConfig,
    model::{SafetyGraph, Segment, TravelMode},
};

/// Materialised weight vectors kept per snapshot
const MAX_CACHED_WEIGHTS: usize = 64;

/// Weight of one segment split by factor.
///
/// Components sum to `total` in every case: when the floor is active the
/// whole cost is attributed to distance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeCost {
    pub distance: f64,
    pub crime: f64,
    pub lighting: f64,
    /// Non-positive: emergency proximity lowers the cost
    pub infrastructure: f64,
    pub total: f64,
}

impl EdgeCost {
    /// True when the length floor replaced the raw weight of a segment
    /// `length_m` long; an unfloored weight is always strictly above it
    pub fn is_floored(&self, length_m: Meters) -> bool {
        self.total <= length_m
    }
}

impl std::ops::AddAssign for EdgeCost {
    fn add_assign(&mut self, other: Self) {
        self.distance += other.distance;
        self.crime += other.crime;
        self.lighting += other.lighting;
        self.infrastructure += other.infrastructure;
        self.total += other.total;
    }
}

/// Linear bonus in 0..=1 for an emergency point `distance_m` away
pub fn proximity_bonus(distance_m: Meters, radius_m: Meters) -> f64 {
    if !distance_m.is_finite() || radius_m <= 0.0 {
        return 0.0;
    }
    (1.0 - distance_m.max(0.0) / radius_m).max(0.0)
}

/// Factor breakdown of the composite weight of `segment`.
///
/// A mode multiplier below 1 makes the floor absorb small risk terms: in
/// drive mode (0.5) the weight stays at `L` until crime and darkness add up
/// to more than `L`, so lightly affected segments route like clean ones.
pub fn edge_cost(
    segment: &Segment,
    aggregate: &EdgeRiskAggregate,
    mode: TravelMode,
    temporal_multiplier: f64,
    config: &ScoringConfig,
) -> EdgeCost {
    let length = segment.length_m;
    let mode_multiplier = config.mode_multipliers.get(mode);

    let crime = config.beta / config.alpha
        * aggregate.severity_score
        * temporal_multiplier
        * config.crime_unit_m;
    let lighting = segment
        .lighting
        .map_or(0.0, |lit| config.gamma / config.alpha * (1.0 - lit) * length);
    let infrastructure = segment.emergency_distance_m.map_or(0.0, |distance| {
        -config.delta / config.alpha * proximity_bonus(distance, config.emergency_radius_m) * length
    });

    let raw = (length + crime + lighting + infrastructure) * mode_multiplier;
    if raw <= length {
        return EdgeCost {
            distance: length,
            total: length,
            ..EdgeCost::default()
        };
    }
    EdgeCost {
        distance: length * mode_multiplier,
        crime: crime * mode_multiplier,
        lighting: lighting * mode_multiplier,
        infrastructure: infrastructure * mode_multiplier,
        total: raw,
    }
}

/// Composite weight of `segment`; never below its length
pub fn composite_weight(
    segment: &Segment,
    aggregate: &EdgeRiskAggregate,
    mode: TravelMode,
    temporal_multiplier: f64,
    config: &ScoringConfig,
) -> f64 {
    edge_cost(segment, aggregate, mode, temporal_multiplier, config).total
}

/// Composite weights of every segment indexed by `EdgeIndex::index()`
pub fn edge_weights(
    graph: &SafetyGraph,
    aggregates: &EdgeAggregates,
    mode: TravelMode,
    temporal_multiplier: f64,
    config: &ScoringConfig,
) -> Vec<f64> {
    let segments: Vec<&Segment> = graph.segments().collect();
    segments
        .par_iter()
        .map(|segment| {
            composite_weight(
                segment,
                &aggregates.get(segment.id),
                mode,
                temporal_multiplier,
                config,
            )
        })
        .collect()
}

/// Segment lengths indexed by `EdgeIndex::index()`
pub fn length_weights(graph: &SafetyGraph) -> Vec<f64> {
    graph.segments().map(|segment| segment.length_m).collect()
}

/// Cache key: every input of [`edge_cost`] that is not a per-segment value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct WeightKey {
    mode: TravelMode,
    temporal_multiplier: u64,
    coefficients: [u64; 7],
}

impl WeightKey {
    fn new(mode: TravelMode, temporal_multiplier: f64, config: &ScoringConfig) -> Self {
        Self {
            mode,
            temporal_multiplier: temporal_multiplier.to_bits(),
            coefficients: [
                config.alpha.to_bits(),
                config.beta.to_bits(),
                config.gamma.to_bits(),
                config.delta.to_bits(),
                config.crime_unit_m.to_bits(),
                config.emergency_radius_m.to_bits(),
                config.mode_multipliers.get(mode).to_bits(),
            ],
        }
    }
}

/// Weight vectors keyed by travel mode, temporal multiplier and scoring
/// coefficients
#[derive(Debug, Default)]
pub struct WeightCache {
    entries: RwLock<HashMap<WeightKey, Arc<[f64]>>>,
}

impl WeightCache {
    pub fn get_or_compute<F>(
        &self,
        mode: TravelMode,
        temporal_multiplier: f64,
        config: &ScoringConfig,
        compute: F,
    ) -> Arc<[f64]>
    where
        F: FnOnce() -> Vec<f64>,
    {
        let key = WeightKey::new(mode, temporal_multiplier, config);
        if let Some(weights) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Arc::clone(weights);
        }

        let weights: Arc<[f64]> = compute().into();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.len() >= MAX_CACHED_WEIGHTS {
            entries.clear();
        }
        Arc::clone(entries.entry(key).or_insert(weights))
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
