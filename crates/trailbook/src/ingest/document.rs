//! Remote route documents.
//!
//! The wire form is JSON. It is decoded into [`SharedRoute`], which is
//! validated before anything is compressed or persisted.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;

use crate::error::DecodeError;
use crate::route::{Waypoint, WaypointCategory};
use crate::track::TrackPoint;

static ROUTE_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*(/[A-Za-z0-9][A-Za-z0-9_-]*)*$")
        .expect("route id pattern is valid")
});

const MAX_ID_LEN: usize = 200;

/// Check that `id` is a usable remote route identifier.
///
/// Identifiers are slash-separated segments of letters, digits, `_` and `-`,
/// each starting with a letter or digit.
///
/// # Errors
///
/// Returns [`DecodeError::Invalid`] for empty, overlong or malformed ids.
pub fn validate_route_id(id: &str) -> Result<(), DecodeError> {
    if id.is_empty() {
        return Err(DecodeError::invalid("id", "must not be empty"));
    }
    if id.len() > MAX_ID_LEN {
        return Err(DecodeError::invalid(
            "id",
            format!("longer than {MAX_ID_LEN} characters"),
        ));
    }
    if !ROUTE_ID.is_match(id) {
        return Err(DecodeError::invalid(
            "id",
            format!("'{id}' is not a valid route identifier"),
        ));
    }
    Ok(())
}

/// A waypoint as described by a remote document.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedWaypoint {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Elevation in meters.
    pub elevation: Option<f64>,
    /// Display label.
    pub label: String,
    /// Category; unknown names map to [`WaypointCategory::Other`].
    pub category: WaypointCategory,
    /// Free-form note.
    pub note: Option<String>,
}

impl SharedWaypoint {
    /// Convert into an unsaved local waypoint.
    #[must_use]
    pub fn to_waypoint(&self) -> Waypoint {
        Waypoint {
            elevation: self.elevation,
            note: self.note.clone(),
            ..Waypoint::new(self.latitude, self.longitude, self.label.clone(), self.category)
        }
    }
}

/// A remote route pending import. Never persisted directly.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedRoute {
    /// Remote identifier.
    pub id: String,
    /// Route name.
    pub name: String,
    /// Route description, possibly empty.
    pub description: String,
    /// Region, if the document names one.
    pub region: Option<String>,
    /// Waypoints in document order.
    pub waypoints: Vec<SharedWaypoint>,
    /// Full-precision track.
    pub track: Vec<TrackPoint>,
}

#[derive(Deserialize)]
struct RawRoute {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    waypoints: Vec<RawWaypoint>,
    track: Vec<RawPoint>,
}

#[derive(Deserialize)]
struct RawWaypoint {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    elevation: Option<f64>,
    label: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    note: Option<String>,
}

#[derive(Deserialize)]
struct RawPoint {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    elevation: Option<f64>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

impl SharedRoute {
    /// Decode and validate a JSON route document.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Json`] for malformed JSON and
    /// [`DecodeError::Invalid`] for a document that parses but fails
    /// validation.
    pub fn from_json(bytes: &[u8]) -> Result<Self, DecodeError> {
        let raw: RawRoute = serde_json::from_slice(bytes)?;
        validate_route_id(&raw.id)?;

        let waypoints = raw
            .waypoints
            .into_iter()
            .map(|w| SharedWaypoint {
                latitude: w.latitude,
                longitude: w.longitude,
                elevation: w.elevation,
                label: w.label.trim().to_string(),
                category: w
                    .category
                    .as_deref()
                    .map_or(WaypointCategory::Other, WaypointCategory::from_name),
                note: w.note.filter(|n| !n.trim().is_empty()),
            })
            .collect();

        let track = raw
            .track
            .into_iter()
            .map(|p| TrackPoint {
                latitude: p.latitude,
                longitude: p.longitude,
                elevation: p.elevation,
                timestamp: p.timestamp,
            })
            .collect();

        let name = raw
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| raw.id.clone());

        let route = Self {
            id: raw.id,
            name,
            description: raw.description.unwrap_or_default(),
            region: raw.region.filter(|r| !r.trim().is_empty()),
            waypoints,
            track,
        };
        route.validate()?;
        Ok(route)
    }

    /// Check coordinates and labels.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), DecodeError> {
        validate_route_id(&self.id)?;

        for (i, p) in self.track.iter().enumerate() {
            check_position(&format!("track[{i}]"), p.latitude, p.longitude)?;
            if p.elevation.is_some_and(|e| !e.is_finite()) {
                return Err(DecodeError::invalid(
                    format!("track[{i}].elevation"),
                    "must be finite",
                ));
            }
        }

        for (i, w) in self.waypoints.iter().enumerate() {
            check_position(&format!("waypoints[{i}]"), w.latitude, w.longitude)?;
            if w.elevation.is_some_and(|e| !e.is_finite()) {
                return Err(DecodeError::invalid(
                    format!("waypoints[{i}].elevation"),
                    "must be finite",
                ));
            }
            if w.label.is_empty() {
                return Err(DecodeError::invalid(
                    format!("waypoints[{i}].label"),
                    "must not be empty",
                ));
            }
        }

        Ok(())
    }

    /// Local waypoints in document order.
    #[must_use]
    pub fn to_waypoints(&self) -> Vec<Waypoint> {
        self.waypoints.iter().map(SharedWaypoint::to_waypoint).collect()
    }
}

fn check_position(field: &str, latitude: f64, longitude: f64) -> Result<(), DecodeError> {
    if !(latitude.is_finite() && (-90.0..=90.0).contains(&latitude)) {
        return Err(DecodeError::invalid(
            format!("{field}.latitude"),
            format!("{latitude} is outside [-90, 90]"),
        ));
    }
    if !(longitude.is_finite() && (-180.0..=180.0).contains(&longitude)) {
        return Err(DecodeError::invalid(
            format!("{field}.longitude"),
            format!("{longitude} is outside [-180, 180]"),
        ));
    }
    Ok(())
}
