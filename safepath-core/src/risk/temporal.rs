//! Time-of-day risk multiplier.
//!
//! The day is split into named bands (see [`TemporalConfig`]). Boundaries may
//! be tied to sunrise / sunset, in which case they follow the solar event of
//! the query date at the network location. With interpolation enabled, the
//! multiplier ramps linearly across a window centred on each boundary, so it
//! is continuous in time.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Timelike};
use geo::Point;
use serde::{Deserialize, Serialize};

use super::solar::solar_events;
use crate::{
    Error,
    config::{BoundaryAnchor, TemporalConfig},
};

/// Moment a route is planned for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemporalContext {
    /// Local clock hour in 0..24
    hour: f64,
    /// Local date; enables solar anchored boundaries
    date: Option<NaiveDate>,
    utc_offset_hours: f64,
}

impl TemporalContext {
    /// Context for a local clock hour with no date attached.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidData`] when `hour` is not in 0..24.
    pub fn at_hour(hour: f64) -> Result<Self, Error> {
        if !(0.0..24.0).contains(&hour) {
            return Err(Error::InvalidData(format!("hour {hour} is outside 0..24")));
        }
        Ok(Self {
            hour,
            date: None,
            utc_offset_hours: 0.0,
        })
    }

    /// Context for a local date-time whose clock is `utc_offset_hours` ahead of UTC
    pub fn at_local(datetime: NaiveDateTime, utc_offset_hours: f64) -> Self {
        let time = datetime.time();
        Self {
            hour: f64::from(time.hour())
                + f64::from(time.minute()) / 60.0
                + f64::from(time.second()) / 3600.0,
            date: Some(datetime.date()),
            utc_offset_hours,
        }
    }

    pub fn at(datetime: DateTime<FixedOffset>) -> Self {
        let offset = f64::from(datetime.offset().local_minus_utc()) / 3600.0;
        Self::at_local(datetime.naive_local(), offset)
    }

    /// Context in the middle of the named band, where the multiplier equals
    /// the band's configured value exactly.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidData`] for an unknown band name.
    pub fn for_band(config: &TemporalConfig, name: &str) -> Result<Self, Error> {
        let boundaries = clock_boundaries(config);
        let position = boundaries
            .iter()
            .position(|b| config.bands[b.band].name == name)
            .ok_or_else(|| Error::InvalidData(format!("unknown time band {name}")))?;
        let start = boundaries[position].hour;
        let end = boundaries[(position + 1) % boundaries.len()].hour;
        let width = band_width(start, end);
        Self::at_hour((start + width / 2.0).rem_euclid(24.0))
    }

    pub fn hour(&self) -> f64 {
        self.hour
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    pub fn utc_offset_hours(&self) -> f64 {
        self.utc_offset_hours
    }
}

#[derive(Debug, Clone, Copy)]
struct Boundary {
    /// Index into `TemporalConfig::bands` of the band starting here
    band: usize,
    hour: f64,
}

fn band_width(start: f64, end: f64) -> f64 {
    let width = (end - start).rem_euclid(24.0);
    if width == 0.0 { 24.0 } else { width }
}

fn clock_boundaries(config: &TemporalConfig) -> Vec<Boundary> {
    let mut boundaries: Vec<Boundary> = config
        .bands
        .iter()
        .enumerate()
        .map(|(band, b)| Boundary {
            band,
            hour: b.start_hour,
        })
        .collect();
    boundaries.sort_by(|a, b| a.hour.total_cmp(&b.hour));
    boundaries
}

/// Band boundaries for `context`, sorted by hour.
///
/// Solar anchored boundaries move to the solar event but are clamped so that
/// they stay between their neighbours, leaving room for the transition window.
fn boundaries(config: &TemporalConfig, context: &TemporalContext, location: Point<f64>) -> Vec<Boundary> {
    let mut boundaries = clock_boundaries(config);
    let events = match context.date {
        Some(date) if config.solar_anchors => {
            solar_events(date, location.y(), location.x(), context.utc_offset_hours)
        }
        _ => None,
    };
    let Some(events) = events else {
        return boundaries;
    };

    let n = boundaries.len();
    let margin = config.transition_minutes / 60.0;
    let clock: Vec<f64> = boundaries.iter().map(|b| b.hour).collect();
    for i in 0..n {
        let target = match config.bands[boundaries[i].band].anchor {
            BoundaryAnchor::Clock => continue,
            BoundaryAnchor::Sunrise => events.sunrise,
            BoundaryAnchor::Sunset => events.sunset,
        };
        let prev = clock[(i + n - 1) % n];
        let next = clock[(i + 1) % n];
        // Offsets measured forward from the previous boundary
        let room = band_width(prev, next);
        let mut offset = (target - prev).rem_euclid(24.0);
        if offset > room && offset - room > 24.0 - offset {
            // Event falls before the previous boundary
            offset = 0.0;
        }
        let low = margin;
        let high = room - margin;
        if low >= high {
            continue;
        }
        boundaries[i].hour = (prev + offset.clamp(low, high)).rem_euclid(24.0);
    }
    boundaries.sort_by(|a, b| a.hour.total_cmp(&b.hour));
    boundaries
}

/// Signed distance from `from` to `to` on the 24 h clock, in -12..12
fn clock_delta(from: f64, to: f64) -> f64 {
    (to - from + 12.0).rem_euclid(24.0) - 12.0
}

/// Index into `boundaries` of the band containing `hour`
fn containing(boundaries: &[Boundary], hour: f64) -> usize {
    boundaries
        .iter()
        .rposition(|b| b.hour <= hour)
        .unwrap_or(boundaries.len() - 1)
}

/// Risk multiplier at `context` for a network located at `location`
pub fn temporal_multiplier(config: &TemporalConfig, context: &TemporalContext, location: Point<f64>) -> f64 {
    if config.bands.is_empty() {
        return 1.0;
    }
    let boundaries = boundaries(config, context, location);
    let multiplier = |i: usize| config.bands[boundaries[i].band].multiplier;
    let n = boundaries.len();
    let current = containing(&boundaries, context.hour);

    let half = config.transition_minutes / 120.0;
    if !config.interpolate || half <= 0.0 || n == 1 {
        return multiplier(current);
    }

    // Only the two boundaries around `hour` can be within half a window
    for i in [current, (current + 1) % n] {
        let delta = clock_delta(boundaries[i].hour, context.hour);
        if delta.abs() < half {
            let before = multiplier((i + n - 1) % n);
            let after = multiplier(i);
            let t = (delta + half) / (2.0 * half);
            return before + t * (after - before);
        }
    }
    multiplier(current)
}

/// Name of the band containing `context`
pub fn band_name<'a>(config: &'a TemporalConfig, context: &TemporalContext, location: Point<f64>) -> &'a str {
    if config.bands.is_empty() {
        return "";
    }
    let boundaries = boundaries(config, context, location);
    let current = containing(&boundaries, context.hour);
    &config.bands[boundaries[current].band].name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeBand;

    fn columbia() -> Point<f64> {
        Point::new(-92.33, 38.95)
    }

    fn at(hour: f64) -> TemporalContext {
        TemporalContext::at_hour(hour).unwrap()
    }

    #[test]
    fn band_midpoints_give_exact_values() {
        let config = TemporalConfig::default();
        for band in &config.bands {
            let context = TemporalContext::for_band(&config, &band.name).unwrap();
            assert_eq!(
                temporal_multiplier(&config, &context, columbia()),
                band.multiplier,
                "{}",
                band.name
            );
            assert_eq!(band_name(&config, &context, columbia()), band.name);
        }
        assert!(TemporalContext::for_band(&config, "siesta").is_err());
    }

    #[test]
    fn interpolates_across_boundaries() {
        let config = TemporalConfig::default();
        // Exactly on the 09:00 boundary: half way between 0.5 and 0.3
        let on_boundary = temporal_multiplier(&config, &at(9.0), columbia());
        assert!((on_boundary - 0.4).abs() < 1e-12);
        // Window edges meet the band values
        assert!((temporal_multiplier(&config, &at(8.5), columbia()) - 0.5).abs() < 1e-12);
        assert!((temporal_multiplier(&config, &at(9.5), columbia()) - 0.3).abs() < 1e-12);
        // Midnight wraps around: half way between night 1.5 and late_night 1.8
        let midnight = temporal_multiplier(&config, &at(0.0), columbia());
        assert!((midnight - 1.65).abs() < 1e-12);
        let before_midnight = temporal_multiplier(&config, &at(23.9), columbia());
        assert!(before_midnight > 1.5 && before_midnight < 1.65);
    }

    #[test]
    fn continuous_over_the_whole_day() {
        let config = TemporalConfig::default();
        let step = 1.0 / 600.0;
        let max_slope = 1.5 / (config.transition_minutes / 60.0);
        let mut previous = temporal_multiplier(&config, &at(0.0), columbia());
        let mut hour = step;
        while hour < 24.0 {
            let value = temporal_multiplier(&config, &at(hour), columbia());
            assert!(
                (value - previous).abs() <= max_slope * step + 1e-9,
                "jump at {hour}: {previous} -> {value}"
            );
            previous = value;
            hour += step;
        }
    }

    #[test]
    fn steps_without_interpolation() {
        let config = TemporalConfig {
            interpolate: false,
            ..TemporalConfig::default()
        };
        assert_eq!(temporal_multiplier(&config, &at(8.99), columbia()), 0.5);
        assert_eq!(temporal_multiplier(&config, &at(9.0), columbia()), 0.3);
        assert_eq!(temporal_multiplier(&config, &at(23.0), columbia()), 1.5);
    }

    #[test]
    fn solar_anchors_follow_the_season() {
        let config = TemporalConfig::default();
        let summer = NaiveDate::from_ymd_opt(2025, 6, 21)
            .unwrap()
            .and_hms_opt(20, 0, 0)
            .unwrap();
        let winter = NaiveDate::from_ymd_opt(2025, 12, 21)
            .unwrap()
            .and_hms_opt(20, 0, 0)
            .unwrap();
        // 20:00 is still evening on midsummer (sunset ~20:36 CDT) but well
        // into the night in December (sunset ~16:50 CST, clamped to 18:00)
        let summer = TemporalContext::at_local(summer, -5.0);
        let winter = TemporalContext::at_local(winter, -6.0);
        assert_eq!(band_name(&config, &summer, columbia()), "evening");
        assert_eq!(band_name(&config, &winter, columbia()), "night");
        assert!(
            temporal_multiplier(&config, &winter, columbia())
                > temporal_multiplier(&config, &summer, columbia())
        );

        // Without a date the clock boundaries apply
        assert_eq!(band_name(&config, &at(20.2), columbia()), "night");
    }

    #[test]
    fn single_band_is_constant() {
        let config = TemporalConfig {
            bands: vec![TimeBand::new("always", 0.0, 1.1, BoundaryAnchor::Clock)],
            ..TemporalConfig::default()
        };
        assert_eq!(temporal_multiplier(&config, &at(3.0), columbia()), 1.1);
        assert_eq!(temporal_multiplier(&config, &at(0.0), columbia()), 1.1);
    }

    #[test]
    fn rejects_out_of_range_hours() {
        assert!(TemporalContext::at_hour(24.0).is_err());
        assert!(TemporalContext::at_hour(-0.5).is_err());
        assert!(TemporalContext::at_hour(f64::NAN).is_err());
    }

    #[test]
    fn fixed_offset_datetimes() {
        let datetime = DateTime::parse_from_rfc3339("2025-06-21T22:30:00-05:00").unwrap();
        let context = TemporalContext::at(datetime);
        assert_eq!(context.hour(), 22.5);
        assert_eq!(context.utc_offset_hours(), -5.0);
        assert_eq!(context.date(), NaiveDate::from_ymd_opt(2025, 6, 21));
    }
}
