//! Export of saved routes as text summaries, GPX files and PDF reports.
//!
//! Every encoder reads the same [`ReportModel`], which decodes the track and
//! formats the statistics once. Files are written to a scratch file in the
//! destination directory and renamed into place only once complete.

pub mod gpx;
pub mod report;
pub mod summary;

use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::error::{Error, ExportError, Result};
use crate::route::{RouteStats, SavedRoute, Waypoint};
use crate::track::{elevation_profile, ProfileIter, TrackCodec, TrackPoint};
use crate::units::{self, UnitSystem};

/// Output format of an export.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// Plain-text hike summary.
    Summary,
    /// GPX 1.1 track and waypoints.
    Gpx,
    /// Multi-page PDF report.
    Report,
}

impl ExportFormat {
    /// File extension without the dot.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Summary => "txt",
            Self::Gpx => "gpx",
            Self::Report => "pdf",
        }
    }

    /// MIME type of the produced payload.
    #[must_use]
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Summary => "text/plain",
            Self::Gpx => "application/gpx+xml",
            Self::Report => "application/pdf",
        }
    }

    /// Short name used in logs and errors.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Gpx => "gpx",
            Self::Report => "report",
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rendered export held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    /// Format of the payload.
    pub format: ExportFormat,
    /// Encoded document.
    pub payload: Vec<u8>,
    /// Suggested file name.
    pub filename: String,
    /// MIME type of the payload.
    pub mime_type: &'static str,
}

/// Statistics already converted to display strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedStats {
    /// Total distance.
    pub distance: String,
    /// Total climb.
    pub elevation_gain: String,
    /// Total descent.
    pub elevation_loss: String,
    /// Lowest elevation, if any point has one.
    pub min_elevation: Option<String>,
    /// Highest elevation, if any point has one.
    pub max_elevation: Option<String>,
    /// Elapsed time, if the track is timestamped.
    pub duration: Option<String>,
    /// Average speed, if a duration is known.
    pub average_speed: Option<String>,
    /// Average pace, if a duration is known.
    pub pace: Option<String>,
}

impl FormattedStats {
    /// Format route statistics for the given unit system.
    #[must_use]
    pub fn new(stats: &RouteStats, units: UnitSystem) -> Self {
        let speed = stats.average_speed();
        Self {
            distance: units::format_distance(stats.distance_m, units),
            elevation_gain: units::format_elevation(stats.elevation_gain_m, units),
            elevation_loss: units::format_elevation(stats.elevation_loss_m, units),
            min_elevation: stats
                .min_elevation_m
                .map(|e| units::format_elevation(e, units)),
            max_elevation: stats
                .max_elevation_m
                .map(|e| units::format_elevation(e, units)),
            duration: stats.duration_s.map(units::format_duration),
            average_speed: speed.map(|s| units::format_speed(s, units)),
            pace: speed.map(|s| units::format_pace(s, units)),
        }
    }

    /// Labeled rows in display order, skipping values that are unknown.
    #[must_use]
    pub fn rows(&self) -> Vec<(&'static str, &str)> {
        let mut rows = vec![
            ("Distance", self.distance.as_str()),
            ("Elevation gain", self.elevation_gain.as_str()),
            ("Elevation loss", self.elevation_loss.as_str()),
        ];
        let optional = [
            ("Lowest point", &self.min_elevation),
            ("Highest point", &self.max_elevation),
            ("Duration", &self.duration),
            ("Average speed", &self.average_speed),
            ("Pace", &self.pace),
        ];
        rows.extend(
            optional
                .into_iter()
                .filter_map(|(label, value)| value.as_deref().map(|v| (label, v))),
        );
        rows
    }
}

/// Normalized input shared by all encoders.
#[derive(Debug, Clone)]
pub struct ReportModel {
    /// Route name.
    pub name: String,
    /// Route description, possibly empty.
    pub description: String,
    /// Region, if known.
    pub region: Option<String>,
    /// When the route was saved.
    pub created_at: DateTime<Utc>,
    /// Statistics in SI units.
    pub stats: RouteStats,
    /// Statistics as display strings.
    pub formatted: FormattedStats,
    /// Decoded track points.
    pub points: Vec<TrackPoint>,
    /// Route waypoints in order.
    pub waypoints: Vec<Waypoint>,
    /// Display unit system.
    pub units: UnitSystem,
}

impl ReportModel {
    /// Build the model for a saved route.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the route's track cannot be decoded.
    pub fn new(route: &SavedRoute, waypoints: &[Waypoint], units: UnitSystem) -> Result<Self> {
        let points = TrackCodec::decode(&route.track)?;
        Ok(Self {
            name: route.name.clone(),
            description: route.description.clone(),
            region: route.region.clone(),
            created_at: route.created_at,
            stats: route.stats,
            formatted: FormattedStats::new(&route.stats, units),
            points,
            waypoints: waypoints.to_vec(),
            units,
        })
    }

    /// Lazy elevation profile over the decoded points.
    #[must_use]
    pub fn profile(&self) -> ProfileIter<'_> {
        elevation_profile(&self.points)
    }

    /// File name for an export of this route.
    #[must_use]
    pub fn filename(&self, format: ExportFormat) -> String {
        format!("{}.{}", slugify(&self.name), format.extension())
    }
}

/// Lowercase `name`, replacing every run of non-alphanumerics with `-`.
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "route".to_string()
    } else {
        slug.to_string()
    }
}

/// Produces export artifacts from report models.
#[derive(Debug, Clone)]
pub struct ExportEngine {
    profile_max_points: usize,
}

impl Default for ExportEngine {
    fn default() -> Self {
        Self::new(report::DEFAULT_PROFILE_POINTS)
    }
}

impl ExportEngine {
    /// Create an engine whose report charts use at most `profile_max_points`
    /// profile samples.
    #[must_use]
    pub fn new(profile_max_points: usize) -> Self {
        Self {
            profile_max_points: profile_max_points.max(2),
        }
    }

    /// Render the plain-text summary.
    #[must_use]
    pub fn summary(&self, model: &ReportModel) -> ExportArtifact {
        artifact(
            ExportFormat::Summary,
            model,
            summary::render(model).into_bytes(),
        )
    }

    /// Render the GPX document.
    #[must_use]
    pub fn gpx(&self, model: &ReportModel) -> ExportArtifact {
        artifact(ExportFormat::Gpx, model, gpx::render(model).into_bytes())
    }

    /// Render the PDF report in memory on a blocking worker.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `cancel` fires between pages and
    /// [`ExportError::RenderingFailed`] if the document cannot be assembled.
    pub async fn report(&self, model: &ReportModel, cancel: &CancelToken) -> Result<ExportArtifact> {
        let owned = model.clone();
        let cancel = cancel.clone();
        let max_points = self.profile_max_points;
        let payload = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            let mut buf = BufWriter::new(Vec::new());
            report::write(&owned, max_points, &cancel, &mut buf)?;
            buf.into_inner()
                .map_err(|e| ExportError::rendering("report", e.to_string()).into())
        })
        .await
        .map_err(|e| Error::internal(format!("report worker panicked: {e}")))??;

        Ok(artifact(ExportFormat::Report, model, payload))
    }

    /// Write an export of `model` into `dir` and return the published path.
    ///
    /// The file only appears under its final name once it is complete; a
    /// failed or cancelled export leaves nothing behind.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::WriteFailed`] on I/O failure, plus the render
    /// errors of the chosen format.
    pub async fn export(
        &self,
        format: ExportFormat,
        model: &ReportModel,
        dir: &Path,
        cancel: &CancelToken,
    ) -> Result<PathBuf> {
        let destination = dir.join(model.filename(format));
        let owned = model.clone();
        let cancel = cancel.clone();
        let dir = dir.to_path_buf();
        let max_points = self.profile_max_points;
        let target = destination.clone();

        tokio::task::spawn_blocking(move || {
            publish(&dir, &target, &cancel, |out| match format {
                ExportFormat::Summary => write_all(out, summary::render(&owned).as_bytes()),
                ExportFormat::Gpx => write_all(out, gpx::render(&owned).as_bytes()),
                ExportFormat::Report => report::write(&owned, max_points, &cancel, out),
            })
        })
        .await
        .map_err(|e| Error::internal(format!("export worker panicked: {e}")))??;

        info!(format = %format, path = %destination.display(), "Exported route");
        Ok(destination)
    }
}

fn artifact(format: ExportFormat, model: &ReportModel, payload: Vec<u8>) -> ExportArtifact {
    debug!(format = %format, bytes = payload.len(), "Rendered export");
    ExportArtifact {
        format,
        payload,
        filename: model.filename(format),
        mime_type: format.mime_type(),
    }
}

fn write_all<W: Write>(out: &mut BufWriter<W>, bytes: &[u8]) -> Result<()> {
    out.write_all(bytes)?;
    Ok(())
}

/// Passes writes through and keeps the first I/O error of the sink.
#[derive(Debug)]
struct TrackedWriter<W> {
    inner: W,
    error: Option<io::Error>,
}

impl<W: Write> TrackedWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, error: None }
    }

    fn record(&mut self, e: io::Error) -> io::Error {
        if e.kind() == io::ErrorKind::Interrupted {
            return e;
        }
        let copy = io::Error::new(e.kind(), e.to_string());
        self.error.get_or_insert(e);
        copy
    }
}

impl<W: Write> Write for TrackedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf).map_err(|e| self.record(e))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().map_err(|e| self.record(e))
    }
}

/// Run `render` against `sink` and flush it.
///
/// A failure of the sink is reported as [`ExportError::WriteFailed`] for
/// `destination`, whatever error the renderer wrapped it in.
fn render_into<W, F>(sink: W, destination: &Path, render: F) -> Result<()>
where
    W: Write,
    F: FnOnce(&mut BufWriter<TrackedWriter<W>>) -> Result<()>,
{
    let mut out = BufWriter::new(TrackedWriter::new(sink));
    let result = render(&mut out).and_then(|()| out.flush().map_err(Error::from));

    match (result, out.get_mut().error.take()) {
        (Ok(()), _) => Ok(()),
        (Err(_), Some(source)) => Err(ExportError::WriteFailed {
            path: destination.to_path_buf(),
            source,
        }
        .into()),
        (Err(e), None) => Err(e),
    }
}

/// Write through `render` into a scratch file in `dir`, then rename it to
/// `destination`.
fn publish<F>(dir: &Path, destination: &Path, cancel: &CancelToken, render: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<TrackedWriter<&mut std::fs::File>>) -> Result<()>,
{
    let write_failed = |source: io::Error| ExportError::WriteFailed {
        path: destination.to_path_buf(),
        source,
    };

    std::fs::create_dir_all(dir).map_err(write_failed)?;
    let mut scratch = tempfile::Builder::new()
        .prefix(".trailbook-")
        .suffix(".partial")
        .tempfile_in(dir)
        .map_err(write_failed)?;

    render_into(scratch.as_file_mut(), destination, render)?;
    scratch.as_file().sync_all().map_err(write_failed)?;

    if cancel.is_cancelled() {
        return Err(Error::Cancelled {
            operation: "export",
        });
    }

    scratch
        .persist(destination)
        .map_err(|e| write_failed(e.error))?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::route::WaypointCategory;
    use chrono::TimeZone;

    pub(crate) fn sample_model(units: UnitSystem) -> ReportModel {
        let start = Utc.with_ymd_and_hms(2024, 7, 14, 6, 30, 0).unwrap();
        let points: Vec<TrackPoint> = (0..40_i32)
            .map(|i| {
                let f = f64::from(i);
                TrackPoint::new(46.55 + f * 0.000_5, 7.95 + f * 0.000_4)
                    .with_elevation(1_200.0 + (f * 0.4).sin() * 60.0 + f * 5.0)
                    .with_timestamp(start + chrono::Duration::seconds(i64::from(i) * 45))
            })
            .collect();
        let mut route = SavedRoute::from_points(
            "Grindelwald & First <Loop>",
            "Steep start, easy ridge walk.",
            &points,
        )
        .unwrap()
        .with_region("Bernese Oberland");
        route.created_at = Utc.with_ymd_and_hms(2024, 7, 14, 18, 0, 0).unwrap();
        let waypoints = vec![
            Waypoint::new(46.55, 7.95, "Trailhead", WaypointCategory::Trailhead).with_elevation(1_200.0),
            Waypoint::new(46.56, 7.958, "Bachalpsee", WaypointCategory::WaterSource)
                .with_elevation(2_265.0)
                .with_note("Refill before the ridge"),
            Waypoint::new(46.567, 7.965, "Faulhorn", WaypointCategory::Summit),
        ];
        ReportModel::new(&route, &waypoints, units).unwrap()
    }

    #[test]
    fn test_format_metadata() {
        assert_eq!(ExportFormat::Summary.extension(), "txt");
        assert_eq!(ExportFormat::Gpx.mime_type(), "application/gpx+xml");
        assert_eq!(ExportFormat::Report.mime_type(), "application/pdf");
        assert_eq!(ExportFormat::Report.to_string(), "report");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Grindelwald & First <Loop>"), "grindelwald-first-loop");
        assert_eq!(slugify("  Eiger  "), "eiger");
        assert_eq!(slugify("Höhenweg"), "h-henweg");
        assert_eq!(slugify("!!!"), "route");
    }

    #[test]
    fn test_model_decodes_track_and_formats_stats() {
        let model = sample_model(UnitSystem::Metric);
        assert_eq!(model.points.len(), 40);
        assert_eq!(model.waypoints.len(), 3);
        assert!(model.formatted.distance.ends_with(" km") || model.formatted.distance.ends_with(" m"));
        assert!(model.formatted.duration.is_some());
        assert_eq!(model.filename(ExportFormat::Gpx), "grindelwald-first-loop.gpx");
        assert_eq!(model.profile().count(), 40);
    }

    #[test]
    fn test_formatted_rows_skip_unknown_values() {
        let stats = RouteStats {
            distance_m: 500.0,
            ..RouteStats::default()
        };
        let formatted = FormattedStats::new(&stats, UnitSystem::Metric);
        let labels: Vec<_> = formatted.rows().into_iter().map(|(l, _)| l).collect();
        assert_eq!(labels, vec!["Distance", "Elevation gain", "Elevation loss"]);
    }

    #[test]
    fn test_artifacts_carry_metadata() {
        let engine = ExportEngine::default();
        let model = sample_model(UnitSystem::Metric);

        let summary = engine.summary(&model);
        assert_eq!(summary.mime_type, "text/plain");
        assert_eq!(summary.filename, "grindelwald-first-loop.txt");

        let gpx = engine.gpx(&model);
        assert_eq!(gpx.format, ExportFormat::Gpx);
        assert!(gpx.payload.starts_with(b"<?xml"));
    }

    #[tokio::test]
    async fn test_report_artifact_is_pdf() {
        let engine = ExportEngine::new(50);
        let model = sample_model(UnitSystem::Imperial);
        let artifact = engine.report(&model, &CancelToken::new()).await.unwrap();
        assert!(artifact.payload.starts_with(b"%PDF"));
        assert_eq!(artifact.filename, "grindelwald-first-loop.pdf");
    }

    #[tokio::test]
    async fn test_export_publishes_each_format() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ExportEngine::default();
        let model = sample_model(UnitSystem::Metric);
        let cancel = CancelToken::new();

        for format in [ExportFormat::Summary, ExportFormat::Gpx, ExportFormat::Report] {
            let path = engine.export(format, &model, dir.path(), &cancel).await.unwrap();
            assert_eq!(path.extension().unwrap(), format.extension());
            assert!(std::fs::metadata(&path).unwrap().len() > 0);
        }

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 3);
        assert!(names.iter().all(|n| !n.ends_with(".partial")));
    }

    #[tokio::test]
    async fn test_export_written_summary_matches_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ExportEngine::default();
        let model = sample_model(UnitSystem::Metric);

        let path = engine
            .export(ExportFormat::Summary, &model, dir.path(), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(std::fs::read(path).unwrap(), engine.summary(&model).payload);
    }

    #[tokio::test]
    async fn test_cancelled_export_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ExportEngine::default();
        let model = sample_model(UnitSystem::Metric);
        let cancel = CancelToken::new();
        cancel.cancel();

        for format in [ExportFormat::Summary, ExportFormat::Report] {
            let err = engine
                .export(format, &model, dir.path(), &cancel)
                .await
                .unwrap_err();
            assert!(err.is_cancelled(), "{format}: {err}");
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    /// Accepts `limit` bytes, then fails like a full disk.
    #[derive(Debug)]
    struct FullDisk {
        written: usize,
        limit: usize,
    }

    impl FullDisk {
        fn new(limit: usize) -> Self {
            Self { written: 0, limit }
        }
    }

    impl Write for FullDisk {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.written >= self.limit {
                return Err(io::Error::other("no space left on device"));
            }
            let n = buf.len().min(self.limit - self.written);
            self.written += n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_sink_failure_mid_write_is_write_failed() {
        let destination = Path::new("/exports/route.txt");
        let body = vec![b'x'; 20_000];

        let err = render_into(FullDisk::new(1_024), destination, |out| write_all(out, &body))
            .unwrap_err();
        match err {
            Error::Export(ExportError::WriteFailed { path, source }) => {
                assert_eq!(path, destination);
                assert!(source.to_string().contains("no space left"));
            }
            other => panic!("expected WriteFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_report_sink_failure_is_write_failed() {
        let model = sample_model(UnitSystem::Metric);
        let err = render_into(FullDisk::new(256), Path::new("/exports/route.pdf"), |out| {
            report::write(&model, 50, &CancelToken::new(), out)
        })
        .unwrap_err();
        assert!(
            matches!(err, Error::Export(ExportError::WriteFailed { .. })),
            "{err:?}"
        );
    }

    #[test]
    fn test_render_failure_stays_rendering_failed() {
        let err = render_into(Vec::new(), Path::new("/exports/route.pdf"), |_| {
            Err(ExportError::rendering("report", "layout overflow").into())
        })
        .unwrap_err();
        assert!(matches!(err, Error::Export(ExportError::RenderingFailed { .. })));
    }

    #[test]
    fn test_render_into_flushes_everything() {
        let mut sink = Vec::new();
        render_into(&mut sink, Path::new("/exports/route.txt"), |out| {
            write_all(out, b"hello")
        })
        .unwrap();
        assert_eq!(sink, b"hello");
    }

    #[tokio::test]
    async fn test_export_into_unwritable_destination_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let engine = ExportEngine::default();
        let model = sample_model(UnitSystem::Metric);

        let err = engine
            .export(ExportFormat::Gpx, &model, &blocker, &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Export(ExportError::WriteFailed { .. })));
    }
}
