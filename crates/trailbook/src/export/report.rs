//! Multi-page PDF report.
//!
//! Page one carries the title and statistics, page two a Web Mercator map
//! of the track with start, end and waypoint markers, page three the
//! elevation chart, and the remaining pages a waypoint table.
//!
//! The document id is a hash of the route content. The embedded creation
//! date is the render time, so two renders of the same model differ in
//! their metadata only.

use std::f64::consts::FRAC_PI_4;
use std::io::{BufWriter, Write};

use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Point, Rgb,
};
use tracing::debug;

use super::ReportModel;
use crate::cancel::CancelToken;
use crate::error::{Error, ExportError, Result};
use crate::route::Waypoint;
use crate::track::{subsample, ProfileSample};
use crate::units::{format_distance, format_elevation};

/// Default number of profile samples plotted in the elevation chart.
pub const DEFAULT_PROFILE_POINTS: usize = 200;

const PAGE_WIDTH: f64 = 210.0;
const PAGE_HEIGHT: f64 = 297.0;
const MARGIN: f64 = 20.0;
const MAP_MAX_POINTS: usize = 2_000;
const TABLE_ROWS_PER_PAGE: usize = 32;
const TABLE_ROW_HEIGHT: f64 = 7.0;
const MARKER_SIZE: f64 = 1.6;

const TRACK_COLOR: [u8; 3] = [0x1e, 0x63, 0xb5];
const START_COLOR: [u8; 3] = [0x2e, 0x7d, 0x32];
const END_COLOR: [u8; 3] = [0xc6, 0x28, 0x28];
const GRID_COLOR: [u8; 3] = [0x9e, 0x9e, 0x9e];
const TEXT_COLOR: [u8; 3] = [0x21, 0x21, 0x21];

/// Render the report for `model` into `out`.
///
/// # Errors
///
/// Returns [`Error::Cancelled`] if `cancel` fires before a page is drawn and
/// [`ExportError::RenderingFailed`] if the document cannot be assembled.
pub fn write<W: Write>(
    model: &ReportModel,
    max_points: usize,
    cancel: &CancelToken,
    out: &mut BufWriter<W>,
) -> Result<()> {
    let report = build(model, max_points, cancel)?;
    ensure_active(cancel)?;
    report
        .doc
        .save(out)
        .map_err(|e| ExportError::rendering("report", e.to_string()))?;
    debug!(pages = report.pages, "Rendered report");
    Ok(())
}

struct Report {
    doc: PdfDocumentReference,
    pages: usize,
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

fn build(model: &ReportModel, max_points: usize, cancel: &CancelToken) -> Result<Report> {
    ensure_active(cancel)?;

    let (doc, page, layer) = PdfDocument::new(
        pdf_text(&model.name),
        mm(PAGE_WIDTH),
        mm(PAGE_HEIGHT),
        "Summary",
    );
    let doc = doc.with_document_id(document_id(model));
    let fonts = Fonts {
        regular: doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| ExportError::rendering("report", e.to_string()))?,
        bold: doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| ExportError::rendering("report", e.to_string()))?,
    };

    draw_title_page(&doc.get_page(page).get_layer(layer), &fonts, model);
    let mut pages = 1;

    ensure_active(cancel)?;
    draw_map_page(&new_page(&doc, "Map"), &fonts, model);
    pages += 1;

    ensure_active(cancel)?;
    let samples: Vec<ProfileSample> = model.profile().collect();
    draw_profile_page(
        &new_page(&doc, "Elevation"),
        &fonts,
        model,
        &subsample(&samples, max_points),
    );
    pages += 1;

    let chunks = table_chunks(&model.waypoints);
    let total = chunks.len();
    for (index, chunk) in chunks.into_iter().enumerate() {
        ensure_active(cancel)?;
        let layer = new_page(&doc, "Waypoints");
        draw_waypoint_table(&layer, &fonts, model, chunk, index * TABLE_ROWS_PER_PAGE, (index + 1, total));
        pages += 1;
    }

    Ok(Report { doc, pages })
}

fn ensure_active(cancel: &CancelToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled {
            operation: "report render",
        });
    }
    Ok(())
}

fn new_page(doc: &PdfDocumentReference, name: &str) -> PdfLayerReference {
    let (page, layer) = doc.add_page(mm(PAGE_WIDTH), mm(PAGE_HEIGHT), name);
    doc.get_page(page).get_layer(layer)
}

/// Stable identifier derived from the route content.
fn document_id(model: &ReportModel) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(model.name.as_bytes());
    hasher.update(model.created_at.to_rfc3339().as_bytes());
    for point in &model.points {
        hasher.update(&point.latitude.to_le_bytes());
        hasher.update(&point.longitude.to_le_bytes());
    }
    for wp in &model.waypoints {
        hasher.update(wp.label.as_bytes());
    }
    hasher.finalize().to_hex().as_str()[..32].to_string()
}

fn draw_title_page(layer: &PdfLayerReference, fonts: &Fonts, model: &ReportModel) {
    set_color(layer, TEXT_COLOR);
    let mut y = PAGE_HEIGHT - MARGIN - 10.0;
    text(layer, &fonts.bold, 22.0, MARGIN, y, &model.name);
    y -= 10.0;

    if let Some(region) = &model.region {
        text(layer, &fonts.regular, 12.0, MARGIN, y, region);
        y -= 6.0;
    }
    let saved = model.created_at.format("Saved %Y-%m-%d %H:%M UTC").to_string();
    text(layer, &fonts.regular, 10.0, MARGIN, y, &saved);
    y -= 6.0;
    let count = format!("{} track points, {} waypoints", model.points.len(), model.waypoints.len());
    text(layer, &fonts.regular, 10.0, MARGIN, y, &count);
    y -= 12.0;

    if !model.description.trim().is_empty() {
        for row in wrap(model.description.trim(), 90) {
            text(layer, &fonts.regular, 11.0, MARGIN, y, &row);
            y -= 5.5;
        }
        y -= 6.5;
    }

    text(layer, &fonts.bold, 14.0, MARGIN, y, "Statistics");
    y -= 9.0;
    for (label, value) in model.formatted.rows() {
        text(layer, &fonts.regular, 11.0, MARGIN, y, label);
        text(layer, &fonts.bold, 11.0, MARGIN + 50.0, y, value);
        y -= 7.0;
    }
}

/// Spherical Web Mercator: longitude and northing in radians.
fn mercator(latitude: f64, longitude: f64) -> (f64, f64) {
    let lat = latitude.clamp(-85.051_128, 85.051_128).to_radians();
    (longitude.to_radians(), (FRAC_PI_4 + lat / 2.0).tan().ln())
}

/// Maps projected coordinates into a page rectangle, keeping aspect ratio.
#[derive(Debug, Clone, Copy)]
struct MapFrame {
    min: (f64, f64),
    scale: f64,
    origin: (f64, f64),
}

impl MapFrame {
    /// Fit `coords` (latitude, longitude) into the box at `origin` of `size` mm.
    fn fit(coords: impl IntoIterator<Item = (f64, f64)>, origin: (f64, f64), size: (f64, f64)) -> Option<Self> {
        let mut min = (f64::INFINITY, f64::INFINITY);
        let mut max = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for (lat, lon) in coords {
            let (x, y) = mercator(lat, lon);
            min = (min.0.min(x), min.1.min(y));
            max = (max.0.max(x), max.1.max(y));
        }
        if !min.0.is_finite() {
            return None;
        }

        let extent = ((max.0 - min.0).max(1e-12), (max.1 - min.1).max(1e-12));
        let scale = (size.0 / extent.0).min(size.1 / extent.1);
        // Center the shorter axis; a single point lands in the middle.
        let used = ((max.0 - min.0) * scale, (max.1 - min.1) * scale);
        Some(Self {
            min,
            scale,
            origin: (
                origin.0 + (size.0 - used.0) / 2.0,
                origin.1 + (size.1 - used.1) / 2.0,
            ),
        })
    }

    fn project(&self, latitude: f64, longitude: f64) -> (f64, f64) {
        let (x, y) = mercator(latitude, longitude);
        (
            self.origin.0 + (x - self.min.0) * self.scale,
            self.origin.1 + (y - self.min.1) * self.scale,
        )
    }
}

fn draw_map_page(layer: &PdfLayerReference, fonts: &Fonts, model: &ReportModel) {
    set_color(layer, TEXT_COLOR);
    text(layer, &fonts.bold, 16.0, MARGIN, PAGE_HEIGHT - MARGIN - 6.0, "Map");

    let size = PAGE_WIDTH - 2.0 * MARGIN;
    let bottom = PAGE_HEIGHT - MARGIN - 20.0 - size;
    set_stroke(layer, GRID_COLOR, 0.3);
    rectangle(layer, (MARGIN, bottom), (size, size));

    let inset = 6.0;
    let coords = model
        .points
        .iter()
        .map(|p| (p.latitude, p.longitude))
        .chain(model.waypoints.iter().map(|w| (w.latitude, w.longitude)));
    let Some(frame) = MapFrame::fit(
        coords,
        (MARGIN + inset, bottom + inset),
        (size - 2.0 * inset, size - 2.0 * inset),
    ) else {
        set_color(layer, TEXT_COLOR);
        text(layer, &fonts.regular, 11.0, MARGIN + inset, bottom + size / 2.0, "No track recorded");
        return;
    };

    let track: Vec<(f64, f64)> = subsample(&model.points, MAP_MAX_POINTS)
        .iter()
        .map(|p| frame.project(p.latitude, p.longitude))
        .collect();
    set_stroke(layer, TRACK_COLOR, 0.8);
    polyline(layer, &track);

    if let (Some(&start), Some(&end)) = (track.first(), track.last()) {
        set_stroke(layer, START_COLOR, 0.8);
        marker(layer, start);
        set_stroke(layer, END_COLOR, 0.8);
        marker(layer, end);
    }

    for wp in &model.waypoints {
        let at = frame.project(wp.latitude, wp.longitude);
        set_stroke(layer, wp.category.style().color, 0.6);
        marker(layer, at);
        set_color(layer, wp.category.style().color);
        text(layer, &fonts.regular, 7.0, at.0 + 2.5, at.1 - 1.0, &wp.label);
    }

    set_color(layer, TEXT_COLOR);
    let legend = bottom - 8.0;
    text(layer, &fonts.regular, 9.0, MARGIN, legend, "Start (green), finish (red), waypoints in category colors.");
}

fn draw_profile_page(
    layer: &PdfLayerReference,
    fonts: &Fonts,
    model: &ReportModel,
    samples: &[ProfileSample],
) {
    set_color(layer, TEXT_COLOR);
    text(layer, &fonts.bold, 16.0, MARGIN, PAGE_HEIGHT - MARGIN - 6.0, "Elevation profile");

    let left = MARGIN + 15.0;
    let width = PAGE_WIDTH - left - MARGIN;
    let height = 120.0;
    let bottom = PAGE_HEIGHT - MARGIN - 30.0 - height;

    set_stroke(layer, GRID_COLOR, 0.3);
    polyline(layer, &[(left, bottom + height), (left, bottom), (left + width, bottom)]);

    if samples.is_empty() {
        text(layer, &fonts.regular, 11.0, left + 5.0, bottom + height / 2.0, "No elevation data");
        return;
    }

    let max_distance = samples.last().map_or(0.0, |s| s.distance_m).max(1.0);
    let (low, high) = samples.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
        (lo.min(s.elevation_m), hi.max(s.elevation_m))
    });
    let span = (high - low).max(10.0);
    let floor = low - (span - (high - low)) / 2.0;

    let series: Vec<(f64, f64)> = samples
        .iter()
        .map(|s| {
            (
                left + s.distance_m / max_distance * width,
                bottom + (s.elevation_m - floor) / span * height,
            )
        })
        .collect();
    set_stroke(layer, TRACK_COLOR, 0.8);
    polyline(layer, &series);

    set_color(layer, TEXT_COLOR);
    text(layer, &fonts.regular, 8.0, MARGIN, bottom + height - 1.0, &format_elevation(floor + span, model.units));
    text(layer, &fonts.regular, 8.0, MARGIN, bottom, &format_elevation(floor, model.units));
    text(layer, &fonts.regular, 8.0, left, bottom - 6.0, &format_distance(0.0, model.units));
    text(
        layer,
        &fonts.regular,
        8.0,
        left + width - 15.0,
        bottom - 6.0,
        &format_distance(max_distance, model.units),
    );

    let mut y = bottom - 20.0;
    for (label, value) in model
        .formatted
        .rows()
        .into_iter()
        .filter(|(label, _)| label.starts_with("Elevation") || label.ends_with("point"))
    {
        text(layer, &fonts.regular, 10.0, MARGIN, y, label);
        text(layer, &fonts.bold, 10.0, MARGIN + 40.0, y, value);
        y -= 6.0;
    }
}

/// Waypoint rows per table page. An empty list still yields one page.
fn table_chunks(waypoints: &[Waypoint]) -> Vec<&[Waypoint]> {
    if waypoints.is_empty() {
        return vec![waypoints];
    }
    waypoints.chunks(TABLE_ROWS_PER_PAGE).collect()
}

fn draw_waypoint_table(
    layer: &PdfLayerReference,
    fonts: &Fonts,
    model: &ReportModel,
    rows: &[Waypoint],
    first_index: usize,
    (page, total): (usize, usize),
) {
    set_color(layer, TEXT_COLOR);
    let title = if total > 1 {
        format!("Waypoints ({page}/{total})")
    } else {
        "Waypoints".to_string()
    };
    text(layer, &fonts.bold, 16.0, MARGIN, PAGE_HEIGHT - MARGIN - 6.0, &title);

    if rows.is_empty() {
        text(layer, &fonts.regular, 11.0, MARGIN, PAGE_HEIGHT - MARGIN - 20.0, "No waypoints recorded");
        return;
    }

    let columns = [0.0, 10.0, 70.0, 105.0, 130.0, 155.0];
    let headers = ["#", "Label", "Category", "Latitude", "Longitude", "Elevation"];
    let mut y = PAGE_HEIGHT - MARGIN - 20.0;
    for (x, header) in columns.iter().zip(headers) {
        text(layer, &fonts.bold, 9.0, MARGIN + x, y, header);
    }
    set_stroke(layer, GRID_COLOR, 0.3);
    polyline(layer, &[(MARGIN, y - 2.0), (PAGE_WIDTH - MARGIN, y - 2.0)]);
    y -= TABLE_ROW_HEIGHT;

    for (offset, wp) in rows.iter().enumerate() {
        let cells = [
            (first_index + offset + 1).to_string(),
            truncate(&wp.label, 32),
            wp.category.as_str().to_string(),
            format!("{:.5}", wp.latitude),
            format!("{:.5}", wp.longitude),
            wp.elevation
                .map_or_else(|| "-".to_string(), |e| format_elevation(e, model.units)),
        ];
        for (x, cell) in columns.iter().zip(&cells) {
            text(layer, &fonts.regular, 9.0, MARGIN + x, y, cell);
        }
        y -= TABLE_ROW_HEIGHT;
    }
}

#[allow(clippy::cast_possible_truncation)]
fn mm(value: f64) -> Mm {
    Mm(value as f32)
}

fn rgb([r, g, b]: [u8; 3]) -> Color {
    Color::Rgb(Rgb::new(
        f32::from(r) / 255.0,
        f32::from(g) / 255.0,
        f32::from(b) / 255.0,
        None,
    ))
}

fn set_color(layer: &PdfLayerReference, color: [u8; 3]) {
    layer.set_fill_color(rgb(color));
}

#[allow(clippy::cast_possible_truncation)]
fn set_stroke(layer: &PdfLayerReference, color: [u8; 3], thickness: f64) {
    layer.set_outline_color(rgb(color));
    layer.set_outline_thickness(thickness as f32);
}

#[allow(clippy::cast_possible_truncation)]
fn text(layer: &PdfLayerReference, font: &IndirectFontRef, size: f64, x: f64, y: f64, value: &str) {
    layer.use_text(pdf_text(value), size as f32, mm(x), mm(y), font);
}

fn polyline(layer: &PdfLayerReference, points: &[(f64, f64)]) {
    if points.len() < 2 {
        return;
    }
    layer.add_line(Line {
        points: points
            .iter()
            .map(|&(x, y)| (Point::new(mm(x), mm(y)), false))
            .collect(),
        is_closed: false,
    });
}

fn rectangle(layer: &PdfLayerReference, (x, y): (f64, f64), (w, h): (f64, f64)) {
    layer.add_line(Line {
        points: vec![
            (Point::new(mm(x), mm(y)), false),
            (Point::new(mm(x + w), mm(y)), false),
            (Point::new(mm(x + w), mm(y + h)), false),
            (Point::new(mm(x), mm(y + h)), false),
        ],
        is_closed: true,
    });
}

fn marker(layer: &PdfLayerReference, (x, y): (f64, f64)) {
    rectangle(
        layer,
        (x - MARKER_SIZE / 2.0, y - MARKER_SIZE / 2.0),
        (MARKER_SIZE, MARKER_SIZE),
    );
}

/// Keeps printable ASCII; every other character becomes `?`.
fn pdf_text(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '?' })
        .collect()
}

fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let mut out: String = value.chars().take(max.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

fn wrap(value: &str, width: usize) -> Vec<String> {
    let mut rows = Vec::new();
    let mut row = String::new();
    for word in value.split_whitespace() {
        if !row.is_empty() && row.len() + 1 + word.len() > width {
            rows.push(std::mem::take(&mut row));
        }
        if !row.is_empty() {
            row.push(' ');
        }
        row.push_str(word);
    }
    if !row.is_empty() {
        rows.push(row);
    }
    rows
}
