//! Conversion of SI values to display strings.
//!
//! All computation upstream works in meters, seconds and beats per minute at
//! full precision; rounding happens here and nowhere else.

use serde::{Deserialize, Serialize};

const METERS_PER_MILE: f64 = 1_609.344;
const FEET_PER_METER: f64 = 3.280_839_895;
const METERS_PER_KILOMETER: f64 = 1_000.0;
const FEET_PER_TENTH_MILE: f64 = 528.0;

/// Measurement system used for display.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum UnitSystem {
    /// Kilometers and meters.
    #[default]
    Metric,
    /// Miles and feet.
    Imperial,
}

impl std::fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Metric => write!(f, "metric"),
            Self::Imperial => write!(f, "imperial"),
        }
    }
}

/// Format a horizontal distance.
///
/// Short distances are shown in meters or feet, longer ones in kilometers or
/// miles with two decimals.
#[must_use]
pub fn format_distance(meters: f64, units: UnitSystem) -> String {
    match units {
        UnitSystem::Metric => {
            // Compared after rounding so 999.6 m reads "1.00 km", not "1000 m".
            if meters.abs().round() < METERS_PER_KILOMETER {
                format!("{meters:.0} m")
            } else {
                format!("{:.2} km", meters / METERS_PER_KILOMETER)
            }
        }
        UnitSystem::Imperial => {
            let feet = meters * FEET_PER_METER;
            if feet.abs().round() < FEET_PER_TENTH_MILE {
                format!("{feet:.0} ft")
            } else {
                format!("{:.2} mi", meters / METERS_PER_MILE)
            }
        }
    }
}

/// Format an elevation or an elevation difference.
#[must_use]
pub fn format_elevation(meters: f64, units: UnitSystem) -> String {
    match units {
        UnitSystem::Metric => format!("{meters:.0} m"),
        UnitSystem::Imperial => format!("{:.0} ft", meters * FEET_PER_METER),
    }
}

/// Format a duration given in seconds.
///
/// Durations of an hour or more read `2h 05m`, shorter ones `12m 09s`.
#[must_use]
pub fn format_duration(seconds: f64) -> String {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let total = seconds.max(0.0).round() as u64;
    let hours = total / 3_600;
    let minutes = (total % 3_600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{hours}h {minutes:02}m")
    } else {
        format!("{minutes}m {secs:02}s")
    }
}

/// Format a speed given in meters per second.
#[must_use]
pub fn format_speed(meters_per_second: f64, units: UnitSystem) -> String {
    match units {
        UnitSystem::Metric => format!("{:.1} km/h", meters_per_second * 3.6),
        UnitSystem::Imperial => format!(
            "{:.1} mph",
            meters_per_second * 3_600.0 / METERS_PER_MILE
        ),
    }
}

/// Format a pace (time per kilometer or mile) from a speed in meters per second.
///
/// Returns `--` when the speed is zero or not finite.
#[must_use]
pub fn format_pace(meters_per_second: f64, units: UnitSystem) -> String {
    if !meters_per_second.is_finite() || meters_per_second <= 0.0 {
        return "--".to_string();
    }
    let (unit_meters, suffix) = match units {
        UnitSystem::Metric => (METERS_PER_KILOMETER, "/km"),
        UnitSystem::Imperial => (METERS_PER_MILE, "/mi"),
    };
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let total = (unit_meters / meters_per_second).round() as u64;
    format!("{}:{:02} {suffix}", total / 60, total % 60)
}

/// Format a heart rate in beats per minute.
#[must_use]
pub fn format_heart_rate(bpm: f64) -> String {
    format!("{bpm:.0} bpm")
}

/// Format a coordinate pair with hemisphere letters.
#[must_use]
pub fn format_coordinate(latitude: f64, longitude: f64) -> String {
    let ns = if latitude < 0.0 { 'S' } else { 'N' };
    let ew = if longitude < 0.0 { 'W' } else { 'E' };
    format!(
        "{:.6}\u{b0} {ns}, {:.6}\u{b0} {ew}",
        latitude.abs(),
        longitude.abs()
    )
}
