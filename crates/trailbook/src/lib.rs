//! `trailbook` - Offline storage, compression and export of hiking routes
//!
//! This library converts recorded or shared GPS routes into a compact
//! persisted form and back into text summaries, GPX files and PDF reports.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cancel;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod ingest;
pub mod logging;
pub mod route;
pub mod storage;
pub mod track;
pub mod units;

pub use cancel::CancelToken;
pub use config::Config;
pub use error::{Error, Result};
pub use export::{ExportArtifact, ExportEngine, ExportFormat, ReportModel};
pub use ingest::{RouteIngestor, SharedRoute, SharedWaypoint};
pub use logging::init_logging;
pub use route::{RouteStats, SavedRoute, Waypoint, WaypointCategory};
pub use storage::{Storage, StorageStats};
pub use track::{CompressedTrack, TrackCodec, TrackPoint};
pub use units::UnitSystem;
