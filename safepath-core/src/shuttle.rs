//! Campus shuttle stops and service schedules.
//!
//! Stops are indexed in the same local projection as the street network.
//! Schedules are per day type with local clock windows compared at minute
//! resolution, so a line running until 22:00 still runs at 22:00:59.

use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime, Timelike, Weekday};
use geo::Point;
use log::info;
use rstar::{RTree, primitives::GeomWithData};
use serde::{Deserialize, Serialize};

use crate::{Error, Meters, spatial::LocalProjection};

/// Walking distance to a stop still considered useful for a trip
pub const TRIP_STOP_RADIUS_M: Meters = 400.0;

type StopPoint = GeomWithData<[f64; 2], usize>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShuttleStop {
    pub id: u64,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

/// Local clock interval with service, both ends inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// Service windows by day type; `None` means no service that day
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSchedule {
    #[serde(default)]
    pub weekday: Option<ServiceWindow>,
    #[serde(default)]
    pub saturday: Option<ServiceWindow>,
    #[serde(default)]
    pub sunday: Option<ServiceWindow>,
}

impl ServiceSchedule {
    pub fn for_day(&self, day: Weekday) -> Option<ServiceWindow> {
        match day {
            Weekday::Sat => self.saturday,
            Weekday::Sun => self.sunday,
            _ => self.weekday,
        }
    }

    /// First service start strictly after `at`, looking one week ahead
    pub fn next_start(&self, at: NaiveDateTime) -> Option<NaiveDateTime> {
        (0..=7).find_map(|offset| {
            let date = at.date() + Duration::days(offset);
            let start = date.and_time(self.for_day(date.weekday())?.start);
            (start > at).then_some(start)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShuttleLine {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub schedule: ServiceSchedule,
    /// Minutes between departures while running
    pub frequency_min: u32,
    /// Who may ride
    #[serde(default)]
    pub eligibility: Option<String>,
}

/// Line state at a given local time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ServiceStatus {
    Running {
        until: NaiveTime,
        frequency_min: u32,
    },
    NotStarted {
        starts_at: NaiveTime,
    },
    Ended {
        ended_at: NaiveTime,
        next_start: Option<NaiveDateTime>,
    },
    NoServiceToday {
        next_start: Option<NaiveDateTime>,
    },
}

impl ServiceStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, ServiceStatus::Running { .. })
    }

    fn next_start(&self, at: NaiveDateTime) -> Option<NaiveDateTime> {
        match *self {
            ServiceStatus::Running { .. } => Some(at),
            ServiceStatus::NotStarted { starts_at } => Some(at.date().and_time(starts_at)),
            ServiceStatus::Ended { next_start, .. } | ServiceStatus::NoServiceToday { next_start } => {
                next_start
            }
        }
    }
}

impl ShuttleLine {
    pub fn status(&self, at: NaiveDateTime) -> ServiceStatus {
        let Some(window) = self.schedule.for_day(at.weekday()) else {
            return ServiceStatus::NoServiceToday {
                next_start: self.schedule.next_start(at),
            };
        };
        let time = at.time();
        let minute = NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time);
        if minute < window.start {
            ServiceStatus::NotStarted {
                starts_at: window.start,
            }
        } else if minute > window.end {
            ServiceStatus::Ended {
                ended_at: window.end,
                next_start: self.schedule.next_start(at),
            }
        } else {
            ServiceStatus::Running {
                until: window.end,
                frequency_min: self.frequency_min,
            }
        }
    }
}

/// Stops and lines as loaded from a shuttle data file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShuttleData {
    #[serde(default)]
    pub stops: Vec<ShuttleStop>,
    #[serde(default)]
    pub lines: Vec<ShuttleLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyStop {
    pub stop: ShuttleStop,
    pub distance_m: Meters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineStatus {
    pub name: String,
    #[serde(flatten)]
    pub status: ServiceStatus,
}

/// Shuttle option for a trip between two points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripShuttle {
    /// Any line is running at the requested time
    pub available: bool,
    pub origin_stop: NearbyStop,
    pub destination_stop: NearbyStop,
    /// Lines running at the requested time, in data order
    pub running: Vec<String>,
    /// Earliest upcoming start when nothing is running
    pub next_service: Option<NaiveDateTime>,
    /// Rider eligibility of the running lines, or of all lines when none runs
    pub eligibility: Vec<String>,
}

/// Indexed shuttle stops and lines
#[derive(Debug, Clone)]
pub struct ShuttleNetwork {
    stops: Vec<ShuttleStop>,
    lines: Vec<ShuttleLine>,
    projection: LocalProjection,
    index: RTree<StopPoint>,
}

impl ShuttleNetwork {
    /// Network without stops or lines
    pub fn empty(projection: LocalProjection) -> Self {
        Self {
            stops: Vec::new(),
            lines: Vec::new(),
            projection,
            index: RTree::new(),
        }
    }

    /// Validates `data` and indexes its stops in `projection`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidData`] for out-of-range stop coordinates, a
    /// service window ending before it starts or a zero frequency.
    pub fn new(data: ShuttleData, projection: LocalProjection) -> Result<Self, Error> {
        for stop in &data.stops {
            if !stop.lat.is_finite()
                || !stop.lon.is_finite()
                || stop.lat.abs() > 90.0
                || stop.lon.abs() > 180.0
            {
                return Err(Error::InvalidData(format!(
                    "shuttle stop {} has invalid coordinates ({}, {})",
                    stop.id, stop.lat, stop.lon
                )));
            }
        }
        for line in &data.lines {
            if line.frequency_min == 0 {
                return Err(Error::InvalidData(format!(
                    "shuttle line {} has a zero frequency",
                    line.name
                )));
            }
            let windows = [line.schedule.weekday, line.schedule.saturday, line.schedule.sunday];
            if windows.iter().flatten().any(|w| w.end < w.start) {
                return Err(Error::InvalidData(format!(
                    "shuttle line {} has a service window ending before it starts",
                    line.name
                )));
            }
        }

        let points = data
            .stops
            .iter()
            .enumerate()
            .map(|(i, stop)| {
                StopPoint::new(projection.project(Point::new(stop.lon, stop.lat)), i)
            })
            .collect();
        info!(
            "Shuttle network: {} stops, {} lines",
            data.stops.len(),
            data.lines.len()
        );
        Ok(Self {
            stops: data.stops,
            lines: data.lines,
            projection,
            index: RTree::bulk_load(points),
        })
    }

    pub fn stops(&self) -> &[ShuttleStop] {
        &self.stops
    }

    pub fn lines(&self) -> &[ShuttleLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty() && self.lines.is_empty()
    }

    /// Up to `limit` stops within `radius_m` of `point`, nearest first, ties
    /// by stop id
    pub fn stops_near(&self, point: Point<f64>, radius_m: Meters, limit: usize) -> Vec<NearbyStop> {
        let xy = self.projection.project(point);
        let mut found: Vec<NearbyStop> = self
            .index
            .locate_within_distance(xy, radius_m * radius_m)
            .map(|p| {
                let [x, y] = *p.geom();
                NearbyStop {
                    stop: self.stops[p.data].clone(),
                    distance_m: (x - xy[0]).hypot(y - xy[1]),
                }
            })
            .collect();
        found.sort_by(|a, b| {
            a.distance_m
                .total_cmp(&b.distance_m)
                .then(a.stop.id.cmp(&b.stop.id))
        });
        found.truncate(limit);
        found
    }

    /// Status of every line at local time `at`, in data order
    pub fn availability(&self, at: NaiveDateTime) -> Vec<LineStatus> {
        self.lines
            .iter()
            .map(|line| LineStatus {
                name: line.name.clone(),
                status: line.status(at),
            })
            .collect()
    }

    /// Shuttle option for a trip, `None` when either end has no stop within
    /// [`TRIP_STOP_RADIUS_M`]
    pub fn plan_trip(
        &self,
        origin: Point<f64>,
        destination: Point<f64>,
        at: NaiveDateTime,
    ) -> Option<TripShuttle> {
        let origin_stop = self.stops_near(origin, TRIP_STOP_RADIUS_M, 1).into_iter().next()?;
        let destination_stop = self
            .stops_near(destination, TRIP_STOP_RADIUS_M, 1)
            .into_iter()
            .next()?;

        let statuses: Vec<(&ShuttleLine, ServiceStatus)> =
            self.lines.iter().map(|line| (line, line.status(at))).collect();
        let running: Vec<&ShuttleLine> = statuses
            .iter()
            .filter(|(_, status)| status.is_running())
            .map(|(line, _)| *line)
            .collect();
        let next_service = if running.is_empty() {
            statuses.iter().filter_map(|(_, s)| s.next_start(at)).min()
        } else {
            None
        };
        let eligible: Vec<&ShuttleLine> = if running.is_empty() {
            self.lines.iter().collect()
        } else {
            running.clone()
        };
        let mut eligibility: Vec<String> = Vec::new();
        for text in eligible.iter().filter_map(|line| line.eligibility.as_ref()) {
            if !eligibility.contains(text) {
                eligibility.push(text.clone());
            }
        }

        Some(TripShuttle {
            available: !running.is_empty(),
            origin_stop,
            destination_stop,
            running: running.iter().map(|line| line.name.clone()).collect(),
            next_service,
            eligibility,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    const STEP: f64 = 0.0009;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    /// 2025-06-16 is a Monday
    fn at(day: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, day)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn line(name: &str, start: NaiveTime, end: NaiveTime) -> ShuttleLine {
        ShuttleLine {
            name: name.to_string(),
            description: None,
            schedule: ServiceSchedule {
                weekday: Some(ServiceWindow { start, end }),
                saturday: None,
                sunday: None,
            },
            frequency_min: 10,
            eligibility: Some("Valid campus ID".to_string()),
        }
    }

    fn network() -> ShuttleNetwork {
        let data = ShuttleData {
            stops: vec![
                ShuttleStop { id: 2, name: "Library".into(), lat: 0.0, lon: 2.0 * STEP },
                ShuttleStop { id: 1, name: "Union".into(), lat: 0.0, lon: 0.0 },
                ShuttleStop { id: 3, name: "Stadium".into(), lat: 0.0, lon: 20.0 * STEP },
            ],
            lines: vec![
                line("Campus Loop", time(7, 0), time(22, 0)),
                line("Hospital", time(6, 30), time(18, 0)),
            ],
        };
        ShuttleNetwork::new(data, LocalProjection::new(Point::new(0.0, 0.0))).unwrap()
    }

    #[test]
    fn nearest_stops_are_sorted_and_limited() {
        let network = network();
        let found = network.stops_near(Point::new(0.3 * STEP, 0.0), 500.0, 5);
        let ids: Vec<u64> = found.iter().map(|s| s.stop.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(found[0].distance_m < 40.0);

        assert_eq!(network.stops_near(Point::new(0.0, 0.0), 500.0, 1).len(), 1);
        assert!(network.stops_near(Point::new(10.0 * STEP, 0.0), 100.0, 5).is_empty());
    }

    #[test]
    fn status_follows_the_schedule() {
        let campus = line("Campus Loop", time(7, 0), time(22, 0));
        assert_eq!(
            campus.status(at(16, 6, 59, 0)),
            ServiceStatus::NotStarted { starts_at: time(7, 0) }
        );
        assert!(campus.status(at(16, 7, 0, 0)).is_running());
        assert!(campus.status(at(16, 22, 0, 59)).is_running());
        assert_eq!(
            campus.status(at(16, 22, 1, 0)),
            ServiceStatus::Ended {
                ended_at: time(22, 0),
                next_start: Some(at(17, 7, 0, 0)),
            }
        );
        // Friday evening waits for Monday
        assert_eq!(
            campus.status(at(20, 23, 0, 0)),
            ServiceStatus::Ended {
                ended_at: time(22, 0),
                next_start: Some(at(23, 7, 0, 0)),
            }
        );
        assert_eq!(
            campus.status(at(21, 12, 0, 0)),
            ServiceStatus::NoServiceToday {
                next_start: Some(at(23, 7, 0, 0)),
            }
        );
    }

    #[test]
    fn trip_uses_stops_near_both_ends() {
        let network = network();
        let origin = Point::new(0.0, 0.0);
        let destination = Point::new(19.0 * STEP, 0.0);

        let trip = network.plan_trip(origin, destination, at(16, 19, 0, 0)).unwrap();
        assert!(trip.available);
        assert_eq!(trip.origin_stop.stop.id, 1);
        assert_eq!(trip.destination_stop.stop.id, 3);
        assert_eq!(trip.running, vec!["Campus Loop".to_string()]);
        assert_eq!(trip.next_service, None);
        assert_eq!(trip.eligibility, vec!["Valid campus ID".to_string()]);

        let sunday = network.plan_trip(origin, destination, at(22, 12, 0, 0)).unwrap();
        assert!(!sunday.available);
        assert!(sunday.running.is_empty());
        assert_eq!(sunday.next_service, Some(at(23, 6, 30, 0)));

        let far = Point::new(50.0 * STEP, 0.0);
        assert!(network.plan_trip(origin, far, at(16, 12, 0, 0)).is_none());
    }

    #[test]
    fn rejects_inverted_windows_and_bad_stops() {
        let projection = LocalProjection::new(Point::new(0.0, 0.0));
        let inverted = ShuttleData {
            stops: vec![],
            lines: vec![line("Night", time(22, 0), time(6, 0))],
        };
        assert!(matches!(
            ShuttleNetwork::new(inverted, projection),
            Err(Error::InvalidData(_))
        ));

        let bad_stop = ShuttleData {
            stops: vec![ShuttleStop { id: 1, name: "Nowhere".into(), lat: 95.0, lon: 0.0 }],
            lines: vec![],
        };
        assert!(ShuttleNetwork::new(bad_stop, projection).is_err());
    }
}
