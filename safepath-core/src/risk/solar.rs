//! Sunrise / sunset times from the NOAA general solar position equations

use std::f64::consts::PI;

use chrono::{Datelike, NaiveDate};

/// Zenith of the sun's centre at sunrise / sunset, including refraction
const SUNRISE_ZENITH_DEG: f64 = 90.833;

/// Local sunrise and sunset as fractional clock hours in 0..24
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolarEvents {
    pub sunrise: f64,
    pub sunset: f64,
}

/// Computes sunrise and sunset for `date` at (`lat`, `lon`) in degrees.
///
/// `utc_offset_hours` shifts the UTC result onto the local clock. Returns
/// `None` during polar day or polar night.
pub fn solar_events(date: NaiveDate, lat: f64, lon: f64, utc_offset_hours: f64) -> Option<SolarEvents> {
    let days_in_year = if date.leap_year() { 366.0 } else { 365.0 };
    let gamma = 2.0 * PI / days_in_year * f64::from(date.ordinal0());

    // Equation of time in minutes
    let eqtime = 229.18
        * (0.000_075 + 0.001_868 * gamma.cos()
            - 0.032_077 * gamma.sin()
            - 0.014_615 * (2.0 * gamma).cos()
            - 0.040_849 * (2.0 * gamma).sin());

    let declination = 0.006_918 - 0.399_912 * gamma.cos() + 0.070_257 * gamma.sin()
        - 0.006_758 * (2.0 * gamma).cos()
        + 0.000_907 * (2.0 * gamma).sin()
        - 0.002_697 * (3.0 * gamma).cos()
        + 0.001_48 * (3.0 * gamma).sin();

    let lat_rad = lat.to_radians();
    let cos_hour_angle = SUNRISE_ZENITH_DEG.to_radians().cos()
        / (lat_rad.cos() * declination.cos())
        - lat_rad.tan() * declination.tan();
    if !(-1.0..=1.0).contains(&cos_hour_angle) {
        return None;
    }
    let hour_angle = cos_hour_angle.acos().to_degrees();

    let to_local = |utc_minutes: f64| (utc_minutes / 60.0 + utc_offset_hours).rem_euclid(24.0);
    Some(SolarEvents {
        sunrise: to_local(720.0 - 4.0 * (lon + hour_angle) - eqtime),
        sunset: to_local(720.0 - 4.0 * (lon - hour_angle) - eqtime),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midsummer_in_columbia_missouri() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 21).unwrap();
        let events = solar_events(date, 38.95, -92.33, -5.0).unwrap();
        // 05:38 and 20:36 CDT per published almanacs
        assert!((events.sunrise - 5.63).abs() < 0.25, "{events:?}");
        assert!((events.sunset - 20.6).abs() < 0.25, "{events:?}");
    }

    #[test]
    fn winter_days_are_shorter() {
        let summer = solar_events(NaiveDate::from_ymd_opt(2025, 6, 21).unwrap(), 51.5, 0.0, 0.0)
            .unwrap();
        let winter = solar_events(NaiveDate::from_ymd_opt(2025, 12, 21).unwrap(), 51.5, 0.0, 0.0)
            .unwrap();
        assert!(summer.sunset - summer.sunrise > 16.0);
        assert!(winter.sunset - winter.sunrise < 8.5);
    }

    #[test]
    fn polar_night_has_no_events() {
        let date = NaiveDate::from_ymd_opt(2025, 12, 21).unwrap();
        assert!(solar_events(date, 78.2, 15.6, 1.0).is_none());
    }
}
