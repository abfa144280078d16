//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::export::ExportFormat;
use crate::units::UnitSystem;

/// Saved route commands.
#[derive(Debug, Subcommand)]
pub enum RoutesCommand {
    /// List saved routes, newest first
    List {
        /// Maximum number of routes to show
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show a saved route with its statistics and waypoints
    Show {
        /// Local route id
        id: i64,

        /// Unit system for statistics
        #[arg(short, long, value_enum)]
        units: Option<UnitSystem>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Delete a saved route and its waypoints
    Delete {
        /// Local route id
        id: i64,
    },
}

/// Import command arguments.
#[derive(Debug, Args)]
pub struct ImportCommand {
    /// Remote route identifier, e.g. `alps/eiger-trail`
    pub id: String,

    /// Read route documents from this directory instead of the remote server
    #[arg(long, value_name = "DIR")]
    pub from_dir: Option<PathBuf>,
}

/// GPX import command arguments.
#[derive(Debug, Args)]
pub struct ImportGpxCommand {
    /// GPX file to import
    pub file: PathBuf,
}

/// Export command arguments.
#[derive(Debug, Args)]
pub struct ExportCommand {
    /// Local route id
    pub route_id: i64,

    /// Output format
    #[arg(short, long, value_enum)]
    pub format: ExportFormat,

    /// Directory to write the export to
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Unit system for summaries and reports
    #[arg(short, long, value_enum)]
    pub units: Option<UnitSystem>,
}

/// Profile command arguments.
#[derive(Debug, Args)]
pub struct ProfileCommand {
    /// Local route id
    pub route_id: i64,

    /// Maximum number of samples to print
    #[arg(short, long)]
    pub max_points: Option<usize>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
