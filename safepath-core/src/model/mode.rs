//! Travel modes and per-segment mode permissions

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    Walk,
    Bike,
    Drive,
}

impl TravelMode {
    pub const ALL: [TravelMode; 3] = [TravelMode::Walk, TravelMode::Bike, TravelMode::Drive];

    pub fn as_str(self) -> &'static str {
        match self {
            TravelMode::Walk => "walk",
            TravelMode::Bike => "bike",
            TravelMode::Drive => "drive",
        }
    }

    /// Average travel speed in metres per second
    pub fn speed_mps(self) -> f64 {
        match self {
            TravelMode::Walk => 1.4,
            TravelMode::Bike => 4.2,
            TravelMode::Drive => 8.3,
        }
    }

    /// Estimated travel time in minutes over `distance_m`
    pub fn travel_minutes(self, distance_m: f64) -> f64 {
        distance_m / self.speed_mps() / 60.0
    }

    const fn bit(self) -> u8 {
        match self {
            TravelMode::Walk => 0b001,
            TravelMode::Bike => 0b010,
            TravelMode::Drive => 0b100,
        }
    }
}

impl fmt::Display for TravelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TravelMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "walk" | "walking" | "foot" => Ok(TravelMode::Walk),
            "bike" | "cycling" | "bicycle" => Ok(TravelMode::Bike),
            "drive" | "driving" | "car" => Ok(TravelMode::Drive),
            _ => Err(Error::UnknownMode(s.to_string())),
        }
    }
}

/// Set of travel modes allowed on a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<TravelMode>", into = "Vec<TravelMode>")]
pub struct ModeSet(u8);

impl ModeSet {
    pub const EMPTY: ModeSet = ModeSet(0);
    pub const ALL: ModeSet = ModeSet(0b111);

    pub const fn only(mode: TravelMode) -> Self {
        ModeSet(mode.bit())
    }

    pub fn contains(self, mode: TravelMode) -> bool {
        self.0 & mode.bit() != 0
    }

    pub fn insert(&mut self, mode: TravelMode) {
        self.0 |= mode.bit();
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = TravelMode> {
        TravelMode::ALL.into_iter().filter(move |m| self.contains(*m))
    }
}

impl Default for ModeSet {
    fn default() -> Self {
        ModeSet::ALL
    }
}

impl FromIterator<TravelMode> for ModeSet {
    fn from_iter<T: IntoIterator<Item = TravelMode>>(iter: T) -> Self {
        let mut set = ModeSet::EMPTY;
        for mode in iter {
            set.insert(mode);
        }
        set
    }
}

impl From<Vec<TravelMode>> for ModeSet {
    fn from(modes: Vec<TravelMode>) -> Self {
        modes.into_iter().collect()
    }
}

impl From<ModeSet> for Vec<TravelMode> {
    fn from(set: ModeSet) -> Self {
        set.iter().collect()
    }
}
