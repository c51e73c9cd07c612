//! Engine configuration.
//!
//! Every section deserializes with defaults, so a partial TOML / JSON
//! document only needs to name the values it overrides.

use serde::{Deserialize, Serialize};

use crate::{Error, MIN_LENGTH_M, Meters, model::TravelMode};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub attribution: AttributionConfig,
    pub scoring: ScoringConfig,
    pub temporal: TemporalConfig,
    pub routing: RoutingConfig,
}

impl EngineConfig {
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first offending value.
    pub fn validate(&self) -> Result<(), Error> {
        self.attribution.validate()?;
        self.scoring.validate()?;
        self.temporal.validate()?;
        self.routing.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributionConfig {
    /// Maximum snap distance for incidents
    pub tolerance_m: Meters,
    /// Length of segment a single lamp is assumed to light
    pub lamp_coverage_m: Meters,
    /// Maximum snap distance for patrol observations
    pub patrol_tolerance_m: Meters,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            tolerance_m: 50.0,
            lamp_coverage_m: 30.0,
            patrol_tolerance_m: 100.0,
        }
    }
}

impl AttributionConfig {
    fn validate(&self) -> Result<(), Error> {
        positive("attribution.tolerance_m", self.tolerance_m)?;
        positive("attribution.lamp_coverage_m", self.lamp_coverage_m)?;
        positive("attribution.patrol_tolerance_m", self.patrol_tolerance_m)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeMultipliers {
    pub walk: f64,
    pub bike: f64,
    pub drive: f64,
}

impl Default for ModeMultipliers {
    fn default() -> Self {
        // walk is the most exposed mode
        Self {
            walk: 1.3,
            bike: 1.0,
            drive: 0.5,
        }
    }
}

impl ModeMultipliers {
    pub fn get(&self, mode: TravelMode) -> f64 {
        match mode {
            TravelMode::Walk => self.walk,
            TravelMode::Bike => self.bike,
            TravelMode::Drive => self.drive,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Distance coefficient; the other coefficients are taken relative to it
    pub alpha: f64,
    /// Crime coefficient
    pub beta: f64,
    /// Darkness coefficient
    pub gamma: f64,
    /// Emergency proximity coefficient
    pub delta: f64,
    /// Metres of detour one unit of recency-weighted severity is worth
    pub crime_unit_m: Meters,
    /// Emergency points further than this give no proximity bonus
    pub emergency_radius_m: Meters,
    pub min_length_m: Meters,
    pub half_life_days: f64,
    /// Incidents older than this contribute nothing
    pub horizon_days: f64,
    pub mode_multipliers: ModeMultipliers,
    /// Incidents per 100 m of top-severity crime that map to a score of 100
    /// at the highest temporal multiplier
    pub reference_incidents_per_100m: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            alpha: 0.4,
            beta: 0.4,
            gamma: 0.2,
            delta: 0.05,
            crime_unit_m: 100.0,
            emergency_radius_m: 200.0,
            min_length_m: MIN_LENGTH_M,
            half_life_days: 30.0,
            horizon_days: 180.0,
            mode_multipliers: ModeMultipliers::default(),
            reference_incidents_per_100m: 3.0,
        }
    }
}

impl ScoringConfig {
    fn validate(&self) -> Result<(), Error> {
        positive("scoring.alpha", self.alpha)?;
        non_negative("scoring.beta", self.beta)?;
        non_negative("scoring.gamma", self.gamma)?;
        non_negative("scoring.delta", self.delta)?;
        non_negative("scoring.crime_unit_m", self.crime_unit_m)?;
        positive("scoring.emergency_radius_m", self.emergency_radius_m)?;
        positive("scoring.min_length_m", self.min_length_m)?;
        positive("scoring.half_life_days", self.half_life_days)?;
        positive("scoring.horizon_days", self.horizon_days)?;
        positive("scoring.mode_multipliers.walk", self.mode_multipliers.walk)?;
        positive("scoring.mode_multipliers.bike", self.mode_multipliers.bike)?;
        positive("scoring.mode_multipliers.drive", self.mode_multipliers.drive)?;
        positive(
            "scoring.reference_incidents_per_100m",
            self.reference_incidents_per_100m,
        )
    }
}

/// What a band's start boundary is tied to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryAnchor {
    /// Fixed clock hour
    #[default]
    Clock,
    /// Moves to the local sunrise of the query date
    Sunrise,
    /// Moves to the local sunset of the query date
    Sunset,
}

/// Named time-of-day band; it lasts until the next band starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeBand {
    pub name: String,
    /// Local clock hour in 0..24
    pub start_hour: f64,
    pub multiplier: f64,
    #[serde(default)]
    pub anchor: BoundaryAnchor,
}

impl TimeBand {
    pub fn new(name: &str, start_hour: f64, multiplier: f64, anchor: BoundaryAnchor) -> Self {
        Self {
            name: name.to_string(),
            start_hour,
            multiplier,
            anchor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalConfig {
    pub bands: Vec<TimeBand>,
    /// Interpolate linearly across boundaries instead of stepping
    pub interpolate: bool,
    /// Width of the window centred on each boundary
    pub transition_minutes: f64,
    /// Move sunrise / sunset anchored boundaries to the solar event
    pub solar_anchors: bool,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            bands: vec![
                TimeBand::new("late_night", 0.0, 1.8, BoundaryAnchor::Clock),
                TimeBand::new("early_morning", 6.0, 0.5, BoundaryAnchor::Sunrise),
                TimeBand::new("daytime", 9.0, 0.3, BoundaryAnchor::Clock),
                TimeBand::new("evening", 17.0, 0.6, BoundaryAnchor::Clock),
                TimeBand::new("night", 20.0, 1.5, BoundaryAnchor::Sunset),
            ],
            interpolate: true,
            transition_minutes: 60.0,
            solar_anchors: true,
        }
    }
}

impl TemporalConfig {
    fn validate(&self) -> Result<(), Error> {
        if self.bands.is_empty() {
            return Err(Error::InvalidConfig(
                "temporal.bands must not be empty".to_string(),
            ));
        }
        for band in &self.bands {
            if !(0.0..24.0).contains(&band.start_hour) {
                return Err(Error::InvalidConfig(format!(
                    "temporal band {} starts outside 0..24",
                    band.name
                )));
            }
            non_negative(&format!("temporal band {} multiplier", band.name), band.multiplier)?;
        }
        let mut starts: Vec<f64> = self.bands.iter().map(|b| b.start_hour).collect();
        starts.sort_by(f64::total_cmp);
        let narrowest = starts
            .iter()
            .zip(starts.iter().cycle().skip(1))
            .map(|(a, b)| (b - a).rem_euclid(24.0))
            .map(|w| if w == 0.0 && starts.len() == 1 { 24.0 } else { w })
            .fold(f64::INFINITY, f64::min);
        if narrowest <= 0.0 {
            return Err(Error::InvalidConfig(
                "temporal bands must have distinct start hours".to_string(),
            ));
        }
        non_negative("temporal.transition_minutes", self.transition_minutes)?;
        if self.transition_minutes / 60.0 >= narrowest {
            return Err(Error::InvalidConfig(format!(
                "temporal.transition_minutes must be shorter than the narrowest band ({narrowest} h)"
            )));
        }
        Ok(())
    }

    pub fn band(&self, name: &str) -> Option<&TimeBand> {
        self.bands.iter().find(|b| b.name == name)
    }

    /// Largest band multiplier
    pub fn max_multiplier(&self) -> f64 {
        self.bands.iter().map(|b| b.multiplier).fold(0.0, f64::max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Weight multiplier applied to the edges of every extracted path
    pub penalty_factor: f64,
    /// Maximum shared-length ratio between two accepted routes
    pub similarity_threshold: f64,
    /// Hard cap on penalise-and-retry cycles
    pub max_iterations: usize,
    pub default_k: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            penalty_factor: 1.4,
            similarity_threshold: 0.7,
            max_iterations: 12,
            default_k: 3,
        }
    }
}

impl RoutingConfig {
    fn validate(&self) -> Result<(), Error> {
        if !(self.penalty_factor.is_finite() && self.penalty_factor > 1.0) {
            return Err(Error::InvalidConfig(format!(
                "routing.penalty_factor must be > 1, got {}",
                self.penalty_factor
            )));
        }
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "routing.similarity_threshold must be in (0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if self.max_iterations == 0 || self.default_k == 0 {
            return Err(Error::InvalidConfig(
                "routing.max_iterations and routing.default_k must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn positive(name: &str, value: f64) -> Result<(), Error> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!("{name} must be > 0, got {value}")))
    }
}

fn non_negative(name: &str, value: f64) -> Result<(), Error> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!("{name} must be >= 0, got {value}")))
    }
}
