//! `trailbook` - CLI for the trailbook route pipeline
//!
//! This binary imports shared routes and GPX files into the local store and
//! exports saved routes.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::Parser;

use trailbook::cli::{
    Cli, Command, ConfigCommand, ExportCommand, ImportCommand, ProfileCommand, RoutesCommand,
};
use trailbook::ingest::{DirectoryTransport, HttpTransport, RouteTransport};
use trailbook::route::SavedRoute;
use trailbook::track::ElevationProfile;
use trailbook::units::{format_distance, format_elevation};
use trailbook::{
    init_logging, CancelToken, Config, Error, ExportEngine, ReportModel, RouteIngestor, Storage,
    Waypoint,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    // These must work even when the active configuration is broken.
    if let Command::Config(ConfigCommand::Path) = &cli.command {
        println!("{}", Config::default_config_path().display());
        return Ok(());
    }
    if let Command::Config(ConfigCommand::Validate { file }) = &cli.command {
        let path = file
            .clone()
            .or_else(|| cli.config.clone())
            .unwrap_or_else(Config::default_config_path);
        println!("Validating configuration: {}", path.display());
        match Config::load_from(Some(path)) {
            Ok(_) => println!("Configuration is valid."),
            Err(e) => anyhow::bail!("configuration error: {e}"),
        }
        return Ok(());
    }

    let config = Config::load_from(cli.config.clone())?;

    match cli.command {
        Command::Routes(cmd) => handle_routes(&config, cmd),
        Command::Import(cmd) => handle_import(&config, cmd).await,
        Command::ImportGpx(cmd) => handle_import_gpx(&config, &cmd.file).await,
        Command::Export(cmd) => handle_export(&config, cmd).await,
        Command::Profile(cmd) => handle_profile(&config, &cmd),
        Command::Status(cmd) => handle_status(&config, cmd.json),
        Command::Config(cmd) => handle_config(&config, &cmd),
    }
}

fn open_storage(config: &Config) -> anyhow::Result<Storage> {
    let path = config.database_path();
    Storage::open(&path).with_context(|| format!("opening route store at {}", path.display()))
}

fn load_route(storage: &Storage, id: i64) -> anyhow::Result<(SavedRoute, Vec<Waypoint>)> {
    let route = storage.get_route(id)?.ok_or(Error::RouteNotFound { id })?;
    let waypoints = storage.waypoints_for_route(id)?;
    Ok((route, waypoints))
}

/// A token cancelled on Ctrl-C.
fn interrupt_token() -> CancelToken {
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    cancel
}

fn handle_routes(config: &Config, cmd: RoutesCommand) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    match cmd {
        RoutesCommand::List { limit, json } => {
            let routes = storage.list_routes(limit)?;
            if json {
                let rows: Vec<_> = routes
                    .iter()
                    .map(|r| {
                        serde_json::json!({
                            "id": r.id,
                            "remote_id": r.remote_id,
                            "name": r.name,
                            "region": r.region,
                            "points": r.track.point_count(),
                            "distance_m": r.stats.distance_m,
                            "created_at": r.created_at,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if routes.is_empty() {
                println!("No saved routes.");
            } else {
                for r in &routes {
                    println!(
                        "{:>5}  {:<32}  {:>10}  {}",
                        r.id.unwrap_or_default(),
                        r.name,
                        format_distance(r.stats.distance_m, config.export.units),
                        r.created_at.format("%Y-%m-%d"),
                    );
                }
            }
        }
        RoutesCommand::Show { id, units, json } => {
            let (route, waypoints) = load_route(&storage, id)?;
            if json {
                let value = serde_json::json!({
                    "id": route.id,
                    "remote_id": route.remote_id,
                    "name": route.name,
                    "description": route.description,
                    "region": route.region,
                    "created_at": route.created_at,
                    "points": route.track.point_count(),
                    "stats": route.stats,
                    "waypoints": waypoints,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                let units = units.unwrap_or(config.export.units);
                let model = ReportModel::new(&route, &waypoints, units)?;
                let artifact = ExportEngine::default().summary(&model);
                print!("{}", String::from_utf8_lossy(&artifact.payload));
            }
        }
        RoutesCommand::Delete { id } => {
            if !storage.delete_route(id)? {
                return Err(Error::RouteNotFound { id }.into());
            }
            println!("Deleted route {id}.");
        }
    }
    Ok(())
}

async fn handle_import(config: &Config, cmd: ImportCommand) -> anyhow::Result<()> {
    let transport: Arc<dyn RouteTransport> = match cmd.from_dir {
        Some(dir) => Arc::new(DirectoryTransport::new(dir)),
        None => Arc::new(HttpTransport::new(
            config.remote.base_url.clone(),
            config.remote_timeout(),
            &config.remote.user_agent,
        )?),
    };
    let ingestor = RouteIngestor::new(transport, Arc::new(Mutex::new(open_storage(config)?)));

    let saved = ingestor
        .fetch_and_import(&cmd.id, &interrupt_token())
        .await
        .with_context(|| format!("importing route '{}'", cmd.id))?;
    println!(
        "Imported '{}' as route {}.",
        saved.name,
        saved.id.unwrap_or_default()
    );
    Ok(())
}

async fn handle_import_gpx(config: &Config, file: &Path) -> anyhow::Result<()> {
    let root = file.parent().unwrap_or_else(|| Path::new("."));
    let ingestor = RouteIngestor::new(
        Arc::new(DirectoryTransport::new(root)),
        Arc::new(Mutex::new(open_storage(config)?)),
    );

    let saved = ingestor
        .import_gpx(file)
        .await
        .with_context(|| format!("importing {}", file.display()))?;
    println!(
        "Imported '{}' as route {} ({} points).",
        saved.name,
        saved.id.unwrap_or_default(),
        saved.track.point_count()
    );
    Ok(())
}

async fn handle_export(config: &Config, cmd: ExportCommand) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let (route, waypoints) = load_route(&storage, cmd.route_id)?;
    drop(storage);

    let units = cmd.units.unwrap_or(config.export.units);
    let model = ReportModel::new(&route, &waypoints, units)?;
    let engine = ExportEngine::new(config.export.profile_max_points);
    let dir = cmd.output.unwrap_or_else(|| config.output_dir());

    let path = engine
        .export(cmd.format, &model, &dir, &interrupt_token())
        .await?;
    println!("{}", path.display());
    Ok(())
}

fn handle_profile(config: &Config, cmd: &ProfileCommand) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let (route, _) = load_route(&storage, cmd.route_id)?;
    let profile = ElevationProfile::from_track(&route.track).map_err(Error::from)?;
    let samples = profile.samples(cmd.max_points.unwrap_or(config.export.profile_max_points));

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&samples)?);
        return Ok(());
    }
    if samples.is_empty() {
        println!("Route {} has no elevation data.", cmd.route_id);
        return Ok(());
    }
    let units = config.export.units;
    for sample in &samples {
        println!(
            "{:>10}  {:>8}",
            format_distance(sample.distance_m, units),
            format_elevation(sample.elevation_m, units)
        );
    }
    Ok(())
}

fn handle_status(config: &Config, json: bool) -> anyhow::Result<()> {
    let storage = open_storage(config)?;
    let stats = storage.stats()?;

    if json {
        let status = serde_json::json!({
            "database_path": config.database_path(),
            "routes": stats.total_routes,
            "waypoints": stats.total_waypoints,
            "track_points": stats.total_points,
            "distance_m": stats.total_distance_m,
            "newest_route": stats.newest_route,
            "db_size_bytes": stats.db_size_bytes,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        let units = config.export.units;
        println!("trailbook status");
        println!("----------------");
        println!("Database:      {}", config.database_path().display());
        println!("Routes:        {}", stats.total_routes);
        println!("Waypoints:     {}", stats.total_waypoints);
        println!("Track points:  {}", stats.total_points);
        println!(
            "Distance:      {}",
            format_distance(stats.total_distance_m, units)
        );
        if let Some(newest) = stats.newest_route {
            println!("Newest route:  {}", newest.format("%Y-%m-%d %H:%M UTC"));
        }
        println!("Size:          {} bytes", stats.db_size_bytes);
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: &ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json: true } => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        ConfigCommand::Show { json: false } => {
            println!("Current Configuration");
            println!("=====================");
            println!();
            println!("[Storage]");
            println!("  Database path:      {}", config.database_path().display());
            println!();
            println!("[Export]");
            println!("  Output directory:   {}", config.output_dir().display());
            println!("  Units:              {}", config.export.units);
            println!("  Profile points:     {}", config.export.profile_max_points);
            println!();
            println!("[Remote]");
            println!("  Base URL:           {}", config.remote.base_url);
            println!("  Timeout (s):        {}", config.remote.timeout_secs);
            println!("  User agent:         {}", config.remote.user_agent);
        }
        // Handled before the configuration is loaded.
        ConfigCommand::Path | ConfigCommand::Validate { .. } => {}
    }
    Ok(())
}
