//! Track points and the geometry shared by the codec, the elevation profile
//! and the exporters.

pub mod codec;
pub mod profile;

use chrono::{DateTime, Utc};
use geo::{HaversineDistance, Point};
use serde::{Deserialize, Serialize};

pub use codec::{CompressedTrack, TrackCodec, COORDINATE_TOLERANCE_DEG, ELEVATION_TOLERANCE_M};
pub use profile::{elevation_profile, subsample, ElevationProfile, ProfileIter, ProfileSample};

/// A single recorded position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    /// Latitude in degrees, positive north.
    pub latitude: f64,
    /// Longitude in degrees, positive east.
    pub longitude: f64,
    /// Elevation above sea level in meters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation: Option<f64>,
    /// When the position was recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl TrackPoint {
    /// Create a point without elevation or time.
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            elevation: None,
            timestamp: None,
        }
    }

    /// Set the elevation in meters.
    #[must_use]
    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.elevation = Some(elevation);
        self
    }

    /// Set the recording time.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Great-circle distance to another point in meters.
    #[must_use]
    pub fn distance_to(&self, other: &Self) -> f64 {
        let a = Point::new(self.longitude, self.latitude);
        let b = Point::new(other.longitude, other.latitude);
        a.haversine_distance(&b)
    }
}

/// Axis-aligned geographic bounds of a track, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Southernmost latitude.
    pub min_lat: f64,
    /// Westernmost longitude.
    pub min_lon: f64,
    /// Northernmost latitude.
    pub max_lat: f64,
    /// Easternmost longitude.
    pub max_lon: f64,
}

impl BoundingBox {
    /// Compute the bounds of a point sequence. Empty input yields all zeros.
    #[must_use]
    pub fn from_points(points: &[TrackPoint]) -> Self {
        let Some(first) = points.first() else {
            return Self::default();
        };
        points.iter().skip(1).fold(
            Self {
                min_lat: first.latitude,
                min_lon: first.longitude,
                max_lat: first.latitude,
                max_lon: first.longitude,
            },
            |bounds, p| Self {
                min_lat: bounds.min_lat.min(p.latitude),
                min_lon: bounds.min_lon.min(p.longitude),
                max_lat: bounds.max_lat.max(p.latitude),
                max_lon: bounds.max_lon.max(p.longitude),
            },
        )
    }

    /// Center of the box as `(latitude, longitude)`.
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }

    /// Check whether a position lies inside the box (edges included).
    #[must_use]
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&latitude)
            && (self.min_lon..=self.max_lon).contains(&longitude)
    }
}

/// Total great-circle length of a polyline in meters.
#[must_use]
pub fn total_distance(points: &[TrackPoint]) -> f64 {
    points.windows(2).map(|w| w[0].distance_to(&w[1])).sum()
}
