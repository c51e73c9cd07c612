//! Route explanation: 0-100 risk score, factor breakdown and incident
//! statistics for any route over the current snapshot.

use std::collections::BTreeMap;

use chrono::Duration;
use itertools::Itertools;
use petgraph::graph::EdgeIndex;
use serde::{Deserialize, Serialize};

use crate::{
    Error, MIN_LENGTH_M, Meters,
    config::EngineConfig,
    engine::RiskSnapshot,
    model::{EdgeId, SafetyGraph, TravelMode},
    risk::{Category, EdgeCost, TemporalContext, band_name, edge_cost, temporal_multiplier},
    routing::Route,
};

/// Patrol observation totals at or above which presence is rated high / moderate
const HIGH_PATROL: u32 = 50;
const MODERATE_PATROL: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    VerySafe,
    Safe,
    Moderate,
    Higher,
    High,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s <= 20.0 => RiskLevel::VerySafe,
            s if s <= 40.0 => RiskLevel::Safe,
            s if s <= 60.0 => RiskLevel::Moderate,
            s if s <= 80.0 => RiskLevel::Higher,
            _ => RiskLevel::High,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RiskLevel::VerySafe => "very safe",
            RiskLevel::Safe => "safe",
            RiskLevel::Moderate => "moderate risk",
            RiskLevel::Higher => "higher risk",
            RiskLevel::High => "high risk",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatrolLevel {
    High,
    Moderate,
    Low,
    /// No patrol layer loaded
    Unknown,
}

impl PatrolLevel {
    fn from_count(count: Option<u32>) -> Self {
        match count {
            None => PatrolLevel::Unknown,
            Some(c) if c >= HIGH_PATROL => PatrolLevel::High,
            Some(c) if c >= MODERATE_PATROL => PatrolLevel::Moderate,
            Some(_) => PatrolLevel::Low,
        }
    }
}

/// Cost split by factor, either absolute or as percentages of the total
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FactorBreakdown {
    pub distance: f64,
    pub crime: f64,
    pub lighting: f64,
    pub infrastructure: f64,
}

impl FactorBreakdown {
    fn from_cost(cost: &EdgeCost) -> Self {
        Self {
            distance: cost.distance,
            crime: cost.crime,
            lighting: cost.lighting,
            infrastructure: cost.infrastructure,
        }
    }

    pub fn total(&self) -> f64 {
        self.distance + self.crime + self.lighting + self.infrastructure
    }

    /// Percentages of the total; they sum to 100 unless the total is zero
    pub fn percentages(&self) -> Self {
        let total = self.total();
        if total <= 0.0 {
            return Self::default();
        }
        Self {
            distance: 100.0 * self.distance / total,
            crime: 100.0 * self.crime / total,
            lighting: 100.0 * self.lighting / total,
            infrastructure: 100.0 * self.infrastructure / total,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrimeStats {
    pub total: usize,
    pub violent: usize,
    pub last_7_days: usize,
    pub last_30_days: usize,
    pub by_category: BTreeMap<Category, usize>,
}

impl CrimeStats {
    /// Most frequent categories, ties in taxonomy order
    pub fn top_categories(&self, n: usize) -> Vec<(Category, usize)> {
        self.by_category
            .iter()
            .map(|(category, count)| (*category, *count))
            .sorted_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)))
            .take(n)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentExplanation {
    pub edge: EdgeId,
    pub length_m: Meters,
    pub cost: EdgeCost,
    pub incident_count: u32,
    pub violent_count: u32,
    pub severity_score: f64,
    /// Crime term is non-zero on this segment
    pub crime_contributor: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteExplanation {
    pub mode: TravelMode,
    /// Time band the route was scored in
    pub band: String,
    pub temporal_multiplier: f64,
    pub length_m: Meters,
    pub travel_minutes: f64,
    /// Sum of composite weights
    pub cost: f64,
    /// 0-100, comparable across routes and times of day
    pub risk_score: f64,
    pub level: RiskLevel,
    /// Recency-weighted severity per 100 m, scaled by time and mode
    pub crime_per_100m: f64,
    pub contributions: FactorBreakdown,
    pub percentages: FactorBreakdown,
    pub crime: CrimeStats,
    pub patrol: PatrolLevel,
    pub patrol_observations: Option<u32>,
    /// Segments whose midpoint is within the emergency radius of a call point
    pub segments_near_emergency: usize,
    pub nearest_emergency_m: Option<Meters>,
    /// Length weighted lighting over segments where it is known
    pub mean_lighting: Option<f64>,
    pub segments: Vec<SegmentExplanation>,
}

impl RouteExplanation {
    /// Human readable lines describing the route
    pub fn summary(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "Risk score {:.0}/100 ({}) for {} during {}",
            self.risk_score,
            self.level.label(),
            self.mode,
            self.band.replace('_', " ")
        )];
        lines.push(format!(
            "{:.0} m, about {:.0} min",
            self.length_m, self.travel_minutes
        ));

        if self.crime.total == 0 {
            lines.push("No incidents recorded along the route".to_string());
        } else {
            lines.push(format!(
                "{} incidents along the route ({} violent, {} in the last 7 days, {} in the last 30 days)",
                self.crime.total, self.crime.violent, self.crime.last_7_days, self.crime.last_30_days
            ));
            let top = self
                .crime
                .top_categories(3)
                .iter()
                .map(|(category, count)| format!("{category} ({count})"))
                .join(", ");
            lines.push(format!("Most common: {top}"));
        }

        if self.percentages.crime > 0.0 {
            lines.push(format!("Crime accounts for {:.0}% of the route cost", self.percentages.crime));
        }
        if let Some(lighting) = self.mean_lighting {
            lines.push(format!("Street lighting covers {:.0}% of the route", lighting * 100.0));
        }
        if self.segments_near_emergency > 0 {
            lines.push(format!(
                "{} segments are close to an emergency call point",
                self.segments_near_emergency
            ));
        }
        match self.patrol {
            PatrolLevel::Unknown => {}
            level => lines.push(format!("Patrol presence: {}", patrol_label(level))),
        }
        lines
    }
}

fn patrol_label(level: PatrolLevel) -> &'static str {
    match level {
        PatrolLevel::High => "high",
        PatrolLevel::Moderate => "moderate",
        PatrolLevel::Low => "low",
        PatrolLevel::Unknown => "unknown",
    }
}

/// Explains a route against the current snapshot.
///
/// Works on any route, including ones built by the caller with
/// [`Route::from_nodes`] or [`Route::from_edges`].
///
/// # Errors
///
/// Returns [`Error::StaleAggregates`] when the snapshot was built for another
/// graph version and [`Error::InvalidRoute`] when the route does not follow
/// connected segments allowing its mode.
pub fn explain(
    route: &Route,
    graph: &SafetyGraph,
    snapshot: &RiskSnapshot,
    config: &EngineConfig,
) -> Result<RouteExplanation, Error> {
    snapshot.ensure_current(graph)?;
    let edges = resolve_path(graph, &route.edges, route.mode)?;
    Ok(explain_path(graph, snapshot, config, &edges, route.mode, &route.context))
}

/// Resolves segment ids into a connected path allowing `mode`
pub(crate) fn resolve_path(graph: &SafetyGraph, edges: &[EdgeId], mode: TravelMode) -> Result<Vec<EdgeIndex>, Error> {
    for (a, b) in edges.iter().tuple_windows() {
        if a.to != b.from {
            return Err(Error::InvalidRoute(format!("{a} is not followed by a connected segment ({b})")));
        }
    }
    edges
        .iter()
        .map(|id| {
            let index = graph
                .edge_index(*id)
                .ok_or_else(|| Error::InvalidRoute(format!("unknown segment {id}")))?;
            if !graph.segment_at(index).allows(mode) {
                return Err(Error::InvalidRoute(format!("segment {id} does not allow {mode}")));
            }
            Ok(index)
        })
        .collect()
}

pub(crate) fn explain_path(
    graph: &SafetyGraph,
    snapshot: &RiskSnapshot,
    config: &EngineConfig,
    edges: &[EdgeIndex],
    mode: TravelMode,
    context: &TemporalContext,
) -> RouteExplanation {
    let scoring = &config.scoring;
    let multiplier = temporal_multiplier(&config.temporal, context, graph.centroid());
    let mode_multiplier = scoring.mode_multipliers.get(mode);
    let aggregates = snapshot.aggregates();
    let now = aggregates.computed_at();

    let mut total = EdgeCost::default();
    let mut length_m = 0.0;
    let mut weighted_severity = 0.0;
    let mut crime = CrimeStats::default();
    let mut patrol_observations: Option<u32> = None;
    let mut segments_near_emergency = 0;
    let mut nearest_emergency_m: Option<Meters> = None;
    let (mut lit_length, mut lighting_sum) = (0.0, 0.0);
    let mut segments = Vec::with_capacity(edges.len());

    for &index in edges {
        let segment = graph.segment_at(index);
        let aggregate = aggregates.get(segment.id);
        let cost = edge_cost(segment, &aggregate, mode, multiplier, scoring);
        total += cost;
        length_m += segment.length_m;
        weighted_severity += aggregate.severity_score;

        for event in snapshot.attribution().incidents_on(segment.id) {
            let incident = &event.incident;
            crime.total += 1;
            crime.violent += usize::from(incident.violent);
            *crime.by_category.entry(incident.category).or_insert(0) += 1;
            let age = now - incident.occurred_at;
            if age < Duration::days(7) {
                crime.last_7_days += 1;
            }
            if age < Duration::days(30) {
                crime.last_30_days += 1;
            }
        }

        if let Some(count) = segment.patrol_count {
            *patrol_observations.get_or_insert(0) += count;
        }
        if let Some(distance) = segment.emergency_distance_m {
            if distance <= scoring.emergency_radius_m {
                segments_near_emergency += 1;
            }
            nearest_emergency_m = Some(nearest_emergency_m.map_or(distance, |d| d.min(distance)));
        }
        if let Some(lighting) = segment.lighting {
            lit_length += segment.length_m;
            lighting_sum += lighting * segment.length_m;
        }

        segments.push(SegmentExplanation {
            edge: segment.id,
            length_m: segment.length_m,
            cost,
            incident_count: aggregate.incident_count,
            violent_count: aggregate.violent_count,
            severity_score: aggregate.severity_score,
            crime_contributor: cost.crime > 0.0,
        });
    }

    let crime_per_100m = if edges.is_empty() {
        0.0
    } else {
        weighted_severity * multiplier * mode_multiplier
            / (length_m.max(scoring.min_length_m).max(MIN_LENGTH_M) / 100.0)
    };
    let risk_score = risk_score(crime_per_100m, config);
    let contributions = FactorBreakdown::from_cost(&total);

    RouteExplanation {
        mode,
        band: band_name(&config.temporal, context, graph.centroid()).to_string(),
        temporal_multiplier: multiplier,
        length_m,
        travel_minutes: mode.travel_minutes(length_m),
        cost: total.total,
        risk_score,
        level: RiskLevel::from_score(risk_score),
        crime_per_100m,
        contributions,
        percentages: contributions.percentages(),
        crime,
        patrol: PatrolLevel::from_count(patrol_observations),
        patrol_observations,
        segments_near_emergency,
        nearest_emergency_m,
        mean_lighting: (lit_length > 0.0).then(|| lighting_sum / lit_length),
        segments,
    }
}

/// Maps crime per 100 m onto 0..=100.
///
/// 100 corresponds to `reference_incidents_per_100m` fresh incidents of the
/// most severe category in the riskiest time band.
pub fn risk_score(crime_per_100m: f64, config: &EngineConfig) -> f64 {
    let reference = Category::max_severity()
        * config.scoring.reference_incidents_per_100m
        * config.temporal.max_multiplier();
    if reference <= 0.0 || !crime_per_100m.is_finite() {
        return 0.0;
    }
    (100.0 * crime_per_100m / reference).clamp(0.0, 100.0)
}
