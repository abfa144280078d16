//! Import of local GPX files.

use std::io::BufReader;

use chrono::{DateTime, Utc};
use tracing::warn;

use super::document::{SharedRoute, SharedWaypoint};
use crate::error::DecodeError;
use crate::route::WaypointCategory;
use crate::track::TrackPoint;

/// Length of the hex digest suffix in GPX-derived route ids.
const ID_HASH_LEN: usize = 16;

impl SharedRoute {
    /// Build a shared route from a GPX file's contents.
    ///
    /// All track segments are concatenated in order. A file without tracks
    /// falls back to its first route (`rte`). The id is derived from the file
    /// contents, so the same file always maps to the same remote id.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Gpx`] if the file cannot be parsed and
    /// [`DecodeError::Invalid`] if the parsed data fails validation.
    pub fn from_gpx(bytes: &[u8]) -> Result<Self, DecodeError> {
        let doc = gpx::read(BufReader::new(bytes)).map_err(|e| DecodeError::Gpx(e.to_string()))?;

        let mut track: Vec<TrackPoint> = doc
            .tracks
            .iter()
            .flat_map(|t| &t.segments)
            .flat_map(|s| &s.points)
            .map(track_point)
            .collect();
        if track.is_empty() {
            if let Some(route) = doc.routes.first() {
                track = route.points.iter().map(track_point).collect();
            }
        }

        let metadata = doc.metadata.as_ref();
        let first_track = doc.tracks.first();
        let name = metadata
            .and_then(|m| m.name.clone())
            .or_else(|| first_track.and_then(|t| t.name.clone()))
            .or_else(|| doc.routes.first().and_then(|r| r.name.clone()))
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "Imported GPX".to_string());
        let description = metadata
            .and_then(|m| m.description.clone())
            .or_else(|| first_track.and_then(|t| t.description.clone()))
            .unwrap_or_default();

        let waypoints = doc
            .waypoints
            .iter()
            .enumerate()
            .map(|(i, wp)| SharedWaypoint {
                latitude: wp.point().y(),
                longitude: wp.point().x(),
                elevation: wp.elevation,
                label: wp
                    .name
                    .as_deref()
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map_or_else(|| format!("Waypoint {}", i + 1), str::to_string),
                category: wp
                    .type_
                    .as_deref()
                    .or(wp.symbol.as_deref())
                    .map_or(WaypointCategory::Other, WaypointCategory::from_name),
                note: wp
                    .comment
                    .clone()
                    .or_else(|| wp.description.clone())
                    .filter(|n| !n.trim().is_empty()),
            })
            .collect();

        let route = Self {
            id: gpx_route_id(bytes),
            name,
            description,
            region: None,
            waypoints,
            track,
        };
        route.validate()?;
        Ok(route)
    }
}

/// `gpx-` followed by the first hex digits of the file's BLAKE3 hash.
#[must_use]
pub fn gpx_route_id(bytes: &[u8]) -> String {
    let hash = blake3::hash(bytes);
    format!("gpx-{}", &hash.to_hex().as_str()[..ID_HASH_LEN])
}

fn track_point(wp: &gpx::Waypoint) -> TrackPoint {
    let point = wp.point();
    TrackPoint {
        latitude: point.y(),
        longitude: point.x(),
        elevation: wp.elevation,
        timestamp: wp.time.as_ref().and_then(|t| {
            let parsed = t
                .format()
                .ok()
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|d| d.with_timezone(&Utc));
            if parsed.is_none() {
                warn!("Dropping unreadable GPX timestamp");
            }
            parsed
        }),
    }
}
