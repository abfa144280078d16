//! Plain-text hike summary.
//!
//! The output depends only on the report model, so identical inputs give
//! byte-identical documents.

use std::fmt::Write;

use super::ReportModel;
use crate::units::{format_coordinate, format_elevation};

const LABEL_WIDTH: usize = 16;

/// Render the summary document.
#[must_use]
pub fn render(model: &ReportModel) -> String {
    let mut out = String::new();

    heading(&mut out, &model.name, '=');
    if let Some(region) = &model.region {
        line(&mut out, "Region", region);
    }
    line(
        &mut out,
        "Saved",
        &model.created_at.format("%Y-%m-%d %H:%M UTC").to_string(),
    );
    line(&mut out, "Track points", &model.points.len().to_string());
    out.push('\n');

    heading(&mut out, "Statistics", '-');
    for (label, value) in model.formatted.rows() {
        line(&mut out, label, value);
    }
    out.push('\n');

    heading(
        &mut out,
        &format!("Waypoints ({})", model.waypoints.len()),
        '-',
    );
    if model.waypoints.is_empty() {
        out.push_str("(none)\n");
    }
    for (i, wp) in model.waypoints.iter().enumerate() {
        let _ = writeln!(out, "{}. {} [{}]", i + 1, wp.label, wp.category);
        let _ = write!(out, "   {}", format_coordinate(wp.latitude, wp.longitude));
        if let Some(elevation) = wp.elevation {
            let _ = write!(out, ", {}", format_elevation(elevation, model.units));
        }
        out.push('\n');
    }
    out.push('\n');

    heading(&mut out, "Notes", '-');
    let mut notes: Vec<String> = Vec::new();
    if !model.description.trim().is_empty() {
        notes.push(model.description.trim().to_string());
    }
    notes.extend(model.waypoints.iter().filter_map(|wp| {
        wp.note
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(|n| format!("{}: {n}", wp.label))
    }));
    if notes.is_empty() {
        out.push_str("(none)\n");
    } else {
        out.push_str(&notes.join("\n\n"));
        out.push('\n');
    }

    out
}

fn heading(out: &mut String, title: &str, underline: char) {
    out.push_str(title);
    out.push('\n');
    let width = title.chars().count().max(1);
    out.extend(std::iter::repeat(underline).take(width));
    out.push_str("\n\n");
}

fn line(out: &mut String, label: &str, value: &str) {
    let _ = writeln!(out, "{:<LABEL_WIDTH$}{value}", format!("{label}:"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::tests::sample_model;
    use crate::export::FormattedStats;
    use crate::route::{RouteStats, Waypoint, WaypointCategory};
    use crate::track::TrackPoint;
    use crate::units::UnitSystem;
    use chrono::{TimeZone, Utc};

    fn golden_model(units: UnitSystem) -> ReportModel {
        let stats = RouteStats {
            distance_m: 12_346.0,
            elevation_gain_m: 850.0,
            elevation_loss_m: 845.0,
            duration_s: Some(14_700.0),
            min_elevation_m: Some(1_034.0),
            max_elevation_m: Some(1_884.0),
        };
        ReportModel {
            name: "Eiger Trail".to_string(),
            description: "Exposed in places.".to_string(),
            region: Some("Bernese Oberland".to_string()),
            created_at: Utc.with_ymd_and_hms(2024, 7, 14, 18, 5, 0).unwrap(),
            stats,
            formatted: FormattedStats::new(&stats, units),
            points: vec![
                TrackPoint::new(46.5775, 7.9831),
                TrackPoint::new(46.58, 7.99),
                TrackPoint::new(46.59, 8.0),
            ],
            waypoints: vec![
                Waypoint::new(46.5775, 7.9831, "Alpiglen", WaypointCategory::Trailhead)
                    .with_elevation(1_616.0),
                Waypoint::new(46.6, 8.01, "Spring", WaypointCategory::WaterSource)
                    .with_note("Reliable until September"),
            ],
            units,
        }
    }

    #[test]
    fn test_golden_metric() {
        let expected = "\
Eiger Trail
===========

Region:         Bernese Oberland
Saved:          2024-07-14 18:05 UTC
Track points:   3

Statistics
----------

Distance:       12.35 km
Elevation gain: 850 m
Elevation loss: 845 m
Lowest point:   1034 m
Highest point:  1884 m
Duration:       4h 05m
Average speed:  3.0 km/h
Pace:           19:51 /km

Waypoints (2)
-------------

1. Alpiglen [trailhead]
   46.577500\u{b0} N, 7.983100\u{b0} E, 1616 m
2. Spring [water_source]
   46.600000\u{b0} N, 8.010000\u{b0} E

Notes
-----

Exposed in places.

Spring: Reliable until September
";
        assert_eq!(render(&golden_model(UnitSystem::Metric)), expected);
    }

    #[test]
    fn test_imperial_units() {
        let text = render(&golden_model(UnitSystem::Imperial));
        assert!(text.contains("Distance:       7.67 mi\n"));
        assert!(text.contains("Elevation gain: 2789 ft\n"));
        assert!(text.contains(", 5302 ft\n"));
    }

    #[test]
    fn test_empty_sections() {
        let mut model = golden_model(UnitSystem::Metric);
        model.waypoints.clear();
        model.description = "   ".to_string();
        model.region = None;
        let text = render(&model);
        assert!(text.contains("Waypoints (0)\n-------------\n\n(none)\n"));
        assert!(text.ends_with("Notes\n-----\n\n(none)\n"));
        assert!(!text.contains("Region:"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let model = sample_model(UnitSystem::Metric);
        assert_eq!(render(&model), render(&model));
        assert_eq!(render(&model.clone()).as_bytes(), render(&model).as_bytes());
    }
}
