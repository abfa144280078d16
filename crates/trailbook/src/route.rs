//! Saved routes, their waypoints, and the statistics computed for them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::track::{total_distance, CompressedTrack, TrackCodec, TrackPoint};

/// Kind of point of interest along a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaypointCategory {
    /// Start of the trail.
    Trailhead,
    /// Peak or high point.
    Summit,
    /// Scenic lookout.
    Viewpoint,
    /// Spring, fountain or stream.
    WaterSource,
    /// Place to pitch a tent.
    Campsite,
    /// Hut or bivouac.
    Shelter,
    /// Car park.
    Parking,
    /// Trail fork.
    Junction,
    /// Exposed or dangerous section.
    Hazard,
    /// Anything else.
    #[default]
    Other,
}

/// Icon and color used to draw a waypoint category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryStyle {
    /// Symbol identifier, also written as the GPX `sym`.
    pub icon: &'static str,
    /// Marker color as RGB.
    pub color: [u8; 3],
}

impl CategoryStyle {
    /// Color as a `#rrggbb` string.
    #[must_use]
    pub fn color_hex(&self) -> String {
        let [r, g, b] = self.color;
        format!("#{r:02x}{g:02x}{b:02x}")
    }
}

// Indexed by the enum discriminant; order must follow the variant order.
static CATEGORY_STYLES: [CategoryStyle; 10] = [
    CategoryStyle { icon: "trailhead", color: [0x2e, 0x7d, 0x32] },
    CategoryStyle { icon: "summit", color: [0x6d, 0x4c, 0x41] },
    CategoryStyle { icon: "viewpoint", color: [0x7b, 0x1f, 0xa2] },
    CategoryStyle { icon: "water", color: [0x02, 0x88, 0xd1] },
    CategoryStyle { icon: "campsite", color: [0xef, 0x6c, 0x00] },
    CategoryStyle { icon: "shelter", color: [0x5d, 0x40, 0x37] },
    CategoryStyle { icon: "parking", color: [0x30, 0x3f, 0x9f] },
    CategoryStyle { icon: "junction", color: [0x61, 0x61, 0x61] },
    CategoryStyle { icon: "hazard", color: [0xd3, 0x2f, 0x2f] },
    CategoryStyle { icon: "pin", color: [0x9e, 0x9e, 0x9e] },
];

impl WaypointCategory {
    /// Every category, in declaration order.
    pub const ALL: [Self; 10] = [
        Self::Trailhead,
        Self::Summit,
        Self::Viewpoint,
        Self::WaterSource,
        Self::Campsite,
        Self::Shelter,
        Self::Parking,
        Self::Junction,
        Self::Hazard,
        Self::Other,
    ];

    /// Look up the display style of this category.
    #[must_use]
    pub fn style(self) -> &'static CategoryStyle {
        &CATEGORY_STYLES[self as usize]
    }

    /// Stable name used in storage and exports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trailhead => "trailhead",
            Self::Summit => "summit",
            Self::Viewpoint => "viewpoint",
            Self::WaterSource => "water_source",
            Self::Campsite => "campsite",
            Self::Shelter => "shelter",
            Self::Parking => "parking",
            Self::Junction => "junction",
            Self::Hazard => "hazard",
            Self::Other => "other",
        }
    }

    /// Parse a category name. Unknown names map to [`WaypointCategory::Other`].
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(name))
            .unwrap_or(Self::Other)
    }
}

impl std::fmt::Display for WaypointCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A labeled point of interest belonging to a saved route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    /// Unique identifier (assigned by storage layer).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Owning route (assigned by storage layer).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_id: Option<i64>,

    /// Latitude in degrees.
    pub latitude: f64,

    /// Longitude in degrees.
    pub longitude: f64,

    /// Elevation in meters, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elevation: Option<f64>,

    /// Short display name.
    pub label: String,

    /// What kind of place this is.
    pub category: WaypointCategory,

    /// Free-form note.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Waypoint {
    /// Create an unsaved waypoint.
    #[must_use]
    pub fn new(
        latitude: f64,
        longitude: f64,
        label: impl Into<String>,
        category: WaypointCategory,
    ) -> Self {
        Self {
            id: None,
            route_id: None,
            latitude,
            longitude,
            elevation: None,
            label: label.into(),
            category,
            note: None,
        }
    }

    /// Set the elevation in meters.
    #[must_use]
    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.elevation = Some(elevation);
        self
    }

    /// Attach a note.
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Summary statistics of a route, in SI units at full precision.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RouteStats {
    /// Great-circle length in meters.
    pub distance_m: f64,
    /// Sum of all climbs in meters.
    pub elevation_gain_m: f64,
    /// Sum of all descents in meters, as a positive number.
    pub elevation_loss_m: f64,
    /// Seconds between the first and last timestamped point.
    pub duration_s: Option<f64>,
    /// Lowest recorded elevation.
    pub min_elevation_m: Option<f64>,
    /// Highest recorded elevation.
    pub max_elevation_m: Option<f64>,
}

impl RouteStats {
    /// Compute statistics from decoded or raw points.
    #[must_use]
    pub fn from_points(points: &[TrackPoint]) -> Self {
        let mut stats = Self {
            distance_m: total_distance(points),
            ..Self::default()
        };

        let mut previous: Option<f64> = None;
        for elevation in points.iter().filter_map(|p| p.elevation) {
            if let Some(prev) = previous {
                let delta = elevation - prev;
                if delta > 0.0 {
                    stats.elevation_gain_m += delta;
                } else {
                    stats.elevation_loss_m -= delta;
                }
            }
            previous = Some(elevation);
            stats.min_elevation_m = Some(stats.min_elevation_m.map_or(elevation, |m| m.min(elevation)));
            stats.max_elevation_m = Some(stats.max_elevation_m.map_or(elevation, |m| m.max(elevation)));
        }

        let mut times = points.iter().filter_map(|p| p.timestamp);
        if let (Some(first), Some(last)) = (times.next(), times.last()) {
            #[allow(clippy::cast_precision_loss)]
            let millis = (last - first).num_milliseconds() as f64;
            stats.duration_s = Some(millis / 1_000.0);
        }
        stats
    }

    /// Average moving speed in meters per second, when a duration is known.
    #[must_use]
    pub fn average_speed(&self) -> Option<f64> {
        self.duration_s
            .filter(|d| *d > 0.0)
            .map(|d| self.distance_m / d)
    }
}

/// A route persisted for offline use.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedRoute {
    /// Unique identifier (assigned by storage layer).
    pub id: Option<i64>,
    /// Identifier the route was imported under, if it came from elsewhere.
    pub remote_id: Option<String>,
    /// Display name.
    pub name: String,
    /// Longer description, possibly empty.
    pub description: String,
    /// Compressed trajectory.
    pub track: CompressedTrack,
    /// Statistics computed before compression.
    pub stats: RouteStats,
    /// Region or area name.
    pub region: Option<String>,
    /// When the route was saved.
    pub created_at: DateTime<Utc>,
}

impl SavedRoute {
    /// Build an unsaved route from full-precision points.
    ///
    /// Statistics are computed before compression.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidPoint`] if a point cannot be encoded.
    pub fn from_points(
        name: impl Into<String>,
        description: impl Into<String>,
        points: &[TrackPoint],
    ) -> Result<Self, CodecError> {
        Ok(Self {
            id: None,
            remote_id: None,
            name: name.into(),
            description: description.into(),
            track: TrackCodec::compress(points)?,
            stats: RouteStats::from_points(points),
            region: None,
            created_at: Utc::now(),
        })
    }

    /// Set the remote identifier.
    #[must_use]
    pub fn with_remote_id(mut self, remote_id: impl Into<String>) -> Self {
        self.remote_id = Some(remote_id.into());
        self
    }

    /// Set the region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Decode the route's track.
    ///
    /// # Errors
    ///
    /// Returns the codec error if the stored track is unreadable.
    pub fn points(&self) -> Result<Vec<TrackPoint>, CodecError> {
        TrackCodec::decode(&self.track)
    }
}
