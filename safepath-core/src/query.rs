//! Read-only lookups over a published snapshot

use chrono::{Datelike, Timelike, Weekday};
use geo::Point;
use serde::{Deserialize, Serialize};

use crate::{
    Meters,
    engine::RiskSnapshot,
    model::{EdgeId, Incident},
};

/// Hours either side of the requested hour kept by [`heatmap`]
const HEATMAP_WINDOW_H: f64 = 2.0;
const PEAK_HOUR_FACTOR: f64 = 1.5;
const PEAK_DAY_FACTOR: f64 = 1.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyIncident {
    pub incident: Incident,
    /// Segment the incident is attributed to
    pub edge: EdgeId,
    pub distance_m: Meters,
}

/// Attributed incidents within `radius_m` of `point`, nearest first, then by
/// segment and incident id
pub fn edges_near(snapshot: &RiskSnapshot, point: Point<f64>, radius_m: Meters) -> Vec<NearbyIncident> {
    let mut found: Vec<NearbyIncident> = snapshot
        .incidents_within(point, radius_m)
        .into_iter()
        .filter_map(|(event, distance_m)| {
            event.edge().map(|edge| NearbyIncident {
                incident: event.incident.clone(),
                edge,
                distance_m,
            })
        })
        .collect();
    found.sort_by(|a, b| {
        a.distance_m
            .total_cmp(&b.distance_m)
            .then(a.edge.cmp(&b.edge))
            .then(a.incident.id.cmp(&b.incident.id))
    });
    found
}

/// Up to `limit` incidents within `radius_m`, newest first
pub fn recent_incidents_near(
    snapshot: &RiskSnapshot,
    point: Point<f64>,
    radius_m: Meters,
    limit: usize,
) -> Vec<NearbyIncident> {
    let mut found = edges_near(snapshot, point, radius_m);
    found.sort_by(|a, b| {
        b.incident
            .occurred_at
            .cmp(&a.incident.occurred_at)
            .then(a.incident.id.cmp(&b.incident.id))
    });
    found.truncate(limit);
    found
}

/// Incident counts by hour of day and weekday around a point
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemporalPattern {
    pub total: usize,
    pub by_hour: [usize; 24],
    /// Monday first
    pub by_weekday: [usize; 7],
    /// Hours with more than 1.5x the mean of non-empty hours
    pub peak_hours: Vec<u32>,
    /// Days with more than 1.3x the mean of non-empty days
    pub peak_days: Vec<Weekday>,
}

fn peaks(counts: &[usize], factor: f64) -> impl Iterator<Item = usize> + '_ {
    let observed: Vec<usize> = counts.iter().copied().filter(|c| *c > 0).collect();
    let mean = if observed.is_empty() {
        0.0
    } else {
        observed.iter().sum::<usize>() as f64 / observed.len() as f64
    };
    counts
        .iter()
        .enumerate()
        .filter(move |(_, count)| **count as f64 > mean * factor)
        .map(|(i, _)| i)
}

pub fn temporal_pattern_near(snapshot: &RiskSnapshot, point: Point<f64>, radius_m: Meters) -> TemporalPattern {
    let mut pattern = TemporalPattern::default();
    for (event, _) in snapshot.incidents_within(point, radius_m) {
        let at = event.incident.occurred_at;
        pattern.total += 1;
        pattern.by_hour[at.hour() as usize] += 1;
        pattern.by_weekday[at.weekday().num_days_from_monday() as usize] += 1;
    }

    pattern.peak_hours = peaks(&pattern.by_hour, PEAK_HOUR_FACTOR)
        .map(|h| h as u32)
        .collect();
    pattern.peak_days = peaks(&pattern.by_weekday, PEAK_DAY_FACTOR)
        .filter_map(|d| Weekday::try_from(d as u8).ok())
        .collect();
    pattern
}

/// Shortest distance between two hours on the 24 h circle
fn hour_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(24.0);
    d.min(24.0 - d)
}

/// `[lat, lon, severity]` for every incident in the snapshot, optionally
/// only those within two hours of `hour`
pub fn heatmap(snapshot: &RiskSnapshot, hour: Option<f64>) -> Vec<[f64; 3]> {
    snapshot
        .attribution()
        .events
        .iter()
        .map(|event| &event.incident)
        .filter(|incident| {
            hour.is_none_or(|h| hour_distance(f64::from(incident.occurred_at.hour()), h) <= HEATMAP_WINDOW_H)
        })
        .map(|incident| [incident.location.y(), incident.location.x(), incident.severity])
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};

    use super::*;
    use crate::{
        config::EngineConfig,
        engine::SafetyEngine,
        model::{IncidentRecord, Node, SafetyGraph, Segment},
    };

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn record(id: u64, lon: f64, occurred_at: NaiveDateTime) -> IncidentRecord {
        IncidentRecord {
            id,
            source: "test".into(),
            occurred_at,
            category: None,
            severity: Some(0.4),
            violent: None,
            lat: 0.0,
            lon,
            description: None,
        }
    }

    /// Street along the equator from lon 0 to 0.002 (about 222 m)
    fn engine(records: Vec<IncidentRecord>) -> SafetyEngine {
        let graph = SafetyGraph::new(
            vec![Node::new(1, 0.0, 0.0), Node::new(2, 0.0, 0.002)],
            vec![Segment::new(1, 2, 0, 222.0)],
        )
        .unwrap();
        let engine = SafetyEngine::new(graph, EngineConfig::default()).unwrap();
        engine.refresh(records, at(30, 12)).unwrap();
        engine
    }

    #[test]
    fn edges_near_sorts_by_distance_then_id() {
        let engine = engine(vec![
            record(3, 0.0010, at(1, 1)),
            record(1, 0.0012, at(1, 1)),
            record(2, 0.0010, at(1, 1)),
            record(4, 0.0019, at(1, 1)),
        ]);
        let snapshot = engine.snapshot().unwrap();
        let found = edges_near(&snapshot, Point::new(0.0010, 0.0), 50.0);
        let ids: Vec<u64> = found.iter().map(|n| n.incident.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
        assert!(found[0].distance_m < 1e-6);
        assert_eq!(found[0].edge, EdgeId::new(1, 2, 0));
    }

    #[test]
    fn recent_incidents_are_newest_first_and_limited() {
        let engine = engine(vec![
            record(1, 0.001, at(1, 1)),
            record(2, 0.001, at(20, 1)),
            record(3, 0.001, at(10, 1)),
        ]);
        let snapshot = engine.snapshot().unwrap();
        let found = recent_incidents_near(&snapshot, Point::new(0.001, 0.0), 100.0, 2);
        let ids: Vec<u64> = found.iter().map(|n| n.incident.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn temporal_pattern_finds_peaks() {
        // 2025-06-06 is a Friday
        let mut records: Vec<IncidentRecord> =
            (0..4).map(|i| record(i, 0.001, at(6, 23))).collect();
        records.push(record(10, 0.001, at(2, 8)));
        records.push(record(11, 0.001, at(3, 14)));
        let engine = engine(records);
        let snapshot = engine.snapshot().unwrap();
        let pattern = temporal_pattern_near(&snapshot, Point::new(0.001, 0.0), 100.0);

        assert_eq!(pattern.total, 6);
        assert_eq!(pattern.by_hour[23], 4);
        assert_eq!(pattern.by_weekday[4], 4);
        assert_eq!(pattern.peak_hours, vec![23]);
        assert_eq!(pattern.peak_days, vec![Weekday::Fri]);
    }

    #[test]
    fn empty_pattern_has_no_peaks() {
        let engine = engine(vec![]);
        let snapshot = engine.snapshot().unwrap();
        let pattern = temporal_pattern_near(&snapshot, Point::new(0.001, 0.0), 100.0);
        assert_eq!(pattern, TemporalPattern::default());
    }

    #[test]
    fn heatmap_hour_filter_wraps_midnight() {
        let engine = engine(vec![
            record(1, 0.001, at(1, 23)),
            record(2, 0.001, at(1, 1)),
            record(3, 0.001, at(1, 12)),
        ]);
        let snapshot = engine.snapshot().unwrap();
        assert_eq!(heatmap(&snapshot, None).len(), 3);
        let night = heatmap(&snapshot, Some(0.0));
        assert_eq!(night.len(), 2);
        assert_eq!(night[0], [0.0, 0.001, 0.4]);
    }

    #[test]
    fn circular_hour_distance() {
        assert_eq!(hour_distance(23.0, 1.0), 2.0);
        assert_eq!(hour_distance(1.0, 23.0), 2.0);
        assert_eq!(hour_distance(12.0, 9.5), 2.5);
    }
}
