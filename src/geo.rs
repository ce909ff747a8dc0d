//! Geodesy and rate-limited kinematics helpers.
//!
//! Everything in here is a pure function of its inputs so it can be shared by the flight state
//! machine and by tests without any setup.

use serde::{Deserialize, Serialize};

/// Mean Earth radius used by the haversine formula, in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6378.137;

/// A point on the globe. `longitude`/`latitude` are in degrees, `elevation` in metres.
///
/// On the wire this is the `location` object of a `dstat` record, `{x, y, z}`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinate {
    #[serde(rename = "x")]
    pub longitude: f64,
    #[serde(rename = "y")]
    pub latitude: f64,
    #[serde(rename = "z", default)]
    pub elevation: f64,
}

impl Coordinate {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
            elevation: 0.0,
        }
    }

    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.elevation = elevation;
        self
    }
}

/// Roll, pitch and yaw in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Orientation {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl Orientation {
    pub fn new(roll: f64, pitch: f64, yaw: f64) -> Self {
        Self { roll, pitch, yaw }
    }

    /// Move every axis toward `target` by at most `max_delta` degrees.
    pub fn step_toward(self, target: Orientation, max_delta: f64) -> Orientation {
        Orientation {
            roll: rate_limited_step(self.roll, target.roll, max_delta),
            pitch: rate_limited_step(self.pitch, target.pitch, max_delta),
            yaw: rate_limited_step(self.yaw, target.yaw, max_delta),
        }
    }
}

/// Haversine distance between `a` and `b` in metres. Elevation is ignored.
pub fn great_circle_distance_m(a: Coordinate, b: Coordinate) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let d_lat = lat_b - lat_a;
    let d_lon = b.longitude.to_radians() - a.longitude.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c * 1000.0
}

/// Move `current` toward `target` by at most `max_delta`, landing exactly on `target` when it is
/// within reach.
pub fn rate_limited_step(current: f64, target: f64, max_delta: f64) -> f64 {
    let max_delta = max_delta.abs();
    if current < target {
        current + max_delta.min(target - current)
    } else if current > target {
        current - max_delta.min(current - target)
    } else {
        current
    }
}

/// Advance `position` along the straight line to `target` by `step_m` metres.
///
/// If the remaining distance is no more than `step_m` the target itself is returned so the
/// caller never overshoots and oscillates around it.
pub fn advance_toward(position: Coordinate, target: Coordinate, step_m: f64) -> Coordinate {
    let distance = great_circle_distance_m(position, target);
    if distance <= step_m || distance == 0.0 {
        return target;
    }
    if step_m <= 0.0 {
        return position;
    }

    let fraction = step_m / distance;
    Coordinate {
        longitude: position.longitude + (target.longitude - position.longitude) * fraction,
        latitude: position.latitude + (target.latitude - position.latitude) * fraction,
        elevation: position.elevation + (target.elevation - position.elevation) * fraction,
    }
}
