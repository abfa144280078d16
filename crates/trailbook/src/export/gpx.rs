//! GPX 1.1 document generation.
//!
//! Generates valid GPX 1.1 XML with the route's waypoints as `wpt` elements and
//! the decoded track as a single `trk`/`trkseg`.

use std::fmt::Write;

use chrono::SecondsFormat;

use super::ReportModel;

const CREATOR: &str = "trailbook";

/// Render the GPX document.
///
/// Coordinates are written with seven decimals, finer than the track codec's
/// quantization, and elevations with one.
#[must_use]
pub fn render(model: &ReportModel) -> String {
    let mut gpx = String::new();

    gpx.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    gpx.push('\n');
    let _ = write!(gpx, r#"<gpx version="1.1" creator="{CREATOR}""#);
    gpx.push_str(r#" xmlns="http://www.topografix.com/GPX/1/1""#);
    gpx.push_str(r#" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance""#);
    gpx.push_str(r#" xsi:schemaLocation="http://www.topografix.com/GPX/1/1 http://www.topografix.com/GPX/1/1/gpx.xsd">"#);
    gpx.push('\n');

    gpx.push_str("  <metadata>\n");
    let _ = writeln!(gpx, "    <name>{}</name>", escape_xml(&model.name));
    if !model.description.is_empty() {
        let _ = writeln!(gpx, "    <desc>{}</desc>", escape_xml(&model.description));
    }
    let _ = writeln!(
        gpx,
        "    <time>{}</time>",
        model.created_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    gpx.push_str("  </metadata>\n");

    for wp in &model.waypoints {
        let _ = writeln!(
            gpx,
            r#"  <wpt lat="{:.7}" lon="{:.7}">"#,
            wp.latitude, wp.longitude
        );
        if let Some(ele) = wp.elevation {
            let _ = writeln!(gpx, "    <ele>{ele:.1}</ele>");
        }
        let _ = writeln!(gpx, "    <name>{}</name>", escape_xml(&wp.label));
        if let Some(note) = &wp.note {
            let _ = writeln!(gpx, "    <cmt>{}</cmt>", escape_xml(note));
        }
        let _ = writeln!(gpx, "    <sym>{}</sym>", wp.category.style().icon);
        let _ = writeln!(gpx, "    <type>{}</type>", wp.category.as_str());
        gpx.push_str("  </wpt>\n");
    }

    gpx.push_str("  <trk>\n");
    let _ = writeln!(gpx, "    <name>{}</name>", escape_xml(&model.name));
    gpx.push_str("    <trkseg>\n");

    for point in &model.points {
        let _ = write!(
            gpx,
            r#"      <trkpt lat="{:.7}" lon="{:.7}""#,
            point.latitude, point.longitude
        );
        if point.elevation.is_none() && point.timestamp.is_none() {
            gpx.push_str("/>\n");
            continue;
        }
        gpx.push_str(">\n");

        if let Some(ele) = point.elevation {
            let _ = writeln!(gpx, "        <ele>{ele:.1}</ele>");
        }
        if let Some(ts) = point.timestamp {
            let _ = writeln!(
                gpx,
                "        <time>{}</time>",
                ts.to_rfc3339_opts(SecondsFormat::Millis, true)
            );
        }

        gpx.push_str("      </trkpt>\n");
    }

    gpx.push_str("    </trkseg>\n");
    gpx.push_str("  </trk>\n");
    gpx.push_str("</gpx>\n");

    gpx
}

/// Escapes XML special characters in a string.
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
