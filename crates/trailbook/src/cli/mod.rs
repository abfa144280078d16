//! Command-line interface for trailbook.
//!
//! This module provides the CLI structure for the `trailbook` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, ExportCommand, ImportCommand, ImportGpxCommand, ProfileCommand, RoutesCommand,
    StatusCommand,
};

use crate::logging::Verbosity;

/// trailbook - Keep your hiking routes offline
///
/// Imports shared routes and GPX files into a local store, and exports saved
/// routes as text summaries, GPX files and PDF reports.
#[derive(Debug, Parser)]
#[command(name = "trailbook")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage saved routes
    #[command(subcommand)]
    Routes(RoutesCommand),

    /// Import a shared route for offline use
    Import(ImportCommand),

    /// Import a local GPX file
    ImportGpx(ImportGpxCommand),

    /// Export a saved route
    Export(ExportCommand),

    /// Print the elevation profile of a saved route
    Profile(ProfileCommand),

    /// Show store status
    Status(StatusCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.verbose, self.quiet)
    }
}
