//! Local planar projection around the network centroid

use geo::{Coord, LineString, Point};
use serde::{Deserialize, Serialize};

/// Equirectangular projection to metres east / north of an origin.
///
/// Accurate to well under a percent across a city sized network, which is
/// what snapping tolerances of tens of metres need.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocalProjection {
    origin: Point<f64>,
    metres_per_degree_lon: f64,
    metres_per_degree_lat: f64,
}

impl LocalProjection {
    pub fn new(origin: Point<f64>) -> Self {
        let phi = origin.y().to_radians();
        Self {
            origin,
            metres_per_degree_lon: 111_412.84 * phi.cos() - 93.5 * (3.0 * phi).cos(),
            metres_per_degree_lat: 111_132.92 - 559.82 * (2.0 * phi).cos()
                + 1.175 * (4.0 * phi).cos(),
        }
    }

    pub fn origin(&self) -> Point<f64> {
        self.origin
    }

    /// Projects a lon / lat point to planar metres
    pub fn project(&self, point: Point<f64>) -> [f64; 2] {
        self.project_coord(point.0)
    }

    pub fn project_coord(&self, coord: Coord<f64>) -> [f64; 2] {
        [
            (coord.x - self.origin.x()) * self.metres_per_degree_lon,
            (coord.y - self.origin.y()) * self.metres_per_degree_lat,
        ]
    }

    /// Inverse of [`LocalProjection::project`]
    pub fn unproject(&self, xy: [f64; 2]) -> Point<f64> {
        Point::new(
            self.origin.x() + xy[0] / self.metres_per_degree_lon,
            self.origin.y() + xy[1] / self.metres_per_degree_lat,
        )
    }

    pub fn project_line(&self, line: &LineString<f64>) -> Vec<[f64; 2]> {
        line.coords().map(|c| self.project_coord(*c)).collect()
    }
}

/// Point halfway along a planar polyline
pub(crate) fn polyline_midpoint(points: &[[f64; 2]]) -> Option<[f64; 2]> {
    let lengths: Vec<f64> = points
        .windows(2)
        .map(|w| (w[1][0] - w[0][0]).hypot(w[1][1] - w[0][1]))
        .collect();
    let total: f64 = lengths.iter().sum();
    if points.is_empty() || !total.is_finite() {
        return None;
    }
    if total == 0.0 {
        return Some(points[0]);
    }
    let mut remaining = total / 2.0;
    for (w, length) in points.windows(2).zip(&lengths) {
        if remaining <= *length {
            let t = if *length > 0.0 { remaining / length } else { 0.0 };
            return Some([w[0][0] + t * (w[1][0] - w[0][0]), w[0][1] + t * (w[1][1] - w[0][1])]);
        }
        remaining -= length;
    }
    points.last().copied()
}
