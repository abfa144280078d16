//! Storage layer for trailbook.
//!
//! This module provides `SQLite`-based persistent storage for saved routes and
//! the waypoints they own. A route and its waypoints are committed in a single
//! transaction, so a route is either stored with all of its waypoints or not
//! at all.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::{debug, info, warn};

use crate::error::{Error, Result, StorageError};
use crate::route::{RouteStats, SavedRoute, Waypoint, WaypointCategory};
use crate::track::CompressedTrack;

const ROUTE_COLUMNS: &str = "id, remote_id, name, description, region, track, \
     distance_m, elevation_gain_m, elevation_loss_m, duration_s, \
     min_elevation_m, max_elevation_m, created_at";

/// Storage engine for saved routes.
///
/// Provides persistent storage using `SQLite` with support for:
/// - All-or-nothing commits of a route with its waypoints
/// - Lookup by local id or by the remote identifier a route was imported under
/// - Cascading deletion of waypoints with their route
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| StorageError::Open {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )?;

        migrations::initialize_schema(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| StorageError::Open {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store a route together with its waypoints in one transaction.
    ///
    /// Returns the stored route and waypoints with their assigned ids. If any
    /// insert fails, nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyExists`] if a route with the same remote
    /// identifier is stored, or another storage error if a write fails.
    pub fn save_route(
        &mut self,
        route: &SavedRoute,
        waypoints: &[Waypoint],
    ) -> Result<(SavedRoute, Vec<Waypoint>)> {
        let tx = self.conn.transaction()?;

        let route_id = Self::insert_route_row(&tx, route)?;
        let mut stored = Vec::with_capacity(waypoints.len());
        for (position, waypoint) in waypoints.iter().enumerate() {
            let id = Self::insert_waypoint_row(&tx, route_id, position, waypoint)?;
            stored.push(Waypoint {
                id: Some(id),
                route_id: Some(route_id),
                ..waypoint.clone()
            });
        }

        // Dropping `tx` on an early return rolls back.
        tx.commit()?;

        info!(
            route_id,
            waypoints = stored.len(),
            "Saved route '{}'",
            route.name
        );
        Ok((
            SavedRoute {
                id: Some(route_id),
                ..route.clone()
            },
            stored,
        ))
    }

    /// Store a route without waypoints.
    ///
    /// # Errors
    ///
    /// Same as [`Storage::save_route`].
    pub fn insert_route(&mut self, route: &SavedRoute) -> Result<i64> {
        let (stored, _) = self.save_route(route, &[])?;
        stored
            .id
            .ok_or_else(|| Error::internal("stored route has no id"))
    }

    fn insert_route_row(tx: &Transaction<'_>, route: &SavedRoute) -> Result<i64> {
        if let Some(remote_id) = &route.remote_id {
            let exists: Option<i64> = tx
                .query_row(
                    "SELECT id FROM routes WHERE remote_id = ?1",
                    [remote_id],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_some() {
                return Err(StorageError::AlreadyExists {
                    remote_id: remote_id.clone(),
                }
                .into());
            }
        }

        let stats = &route.stats;
        let point_count = i64::try_from(route.track.point_count()).unwrap_or(i64::MAX);
        let result = tx.execute(
            r"
            INSERT INTO routes (
                remote_id, name, description, region, track, track_version, point_count,
                distance_m, elevation_gain_m, elevation_loss_m, duration_s,
                min_elevation_m, max_elevation_m, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ",
            params![
                route.remote_id,
                route.name,
                route.description,
                route.region,
                route.track.to_bytes(),
                route.track.version(),
                point_count,
                stats.distance_m,
                stats.elevation_gain_m,
                stats.elevation_loss_m,
                stats.duration_s,
                stats.min_elevation_m,
                stats.max_elevation_m,
                route.created_at.to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                return Err(StorageError::AlreadyExists {
                    remote_id: route.remote_id.clone().unwrap_or_default(),
                }
                .into());
            }
            Err(e) => return Err(e.into()),
        }

        let id = tx.last_insert_rowid();
        debug!("Inserted route with id {}", id);
        Ok(id)
    }

    fn insert_waypoint_row(
        tx: &Transaction<'_>,
        route_id: i64,
        position: usize,
        waypoint: &Waypoint,
    ) -> Result<i64> {
        let position = i64::try_from(position).unwrap_or(i64::MAX);
        tx.execute(
            r"
            INSERT INTO waypoints (
                route_id, position, latitude, longitude, elevation, label, category, note
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
            params![
                route_id,
                position,
                waypoint.latitude,
                waypoint.longitude,
                waypoint.elevation,
                waypoint.label,
                waypoint.category.as_str(),
                waypoint.note,
            ],
        )?;
        Ok(tx.last_insert_rowid())
    }

    /// Get a route by its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or the stored track
    /// blob is unreadable.
    pub fn get_route(&self, id: i64) -> Result<Option<SavedRoute>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {ROUTE_COLUMNS} FROM routes WHERE id = ?1"),
                [id],
                RouteRow::from_row,
            )
            .optional()?;
        row.map(RouteRow::into_route).transpose()
    }

    /// Get a route by the remote identifier it was imported under.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_route_by_remote_id(&self, remote_id: &str) -> Result<Option<SavedRoute>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {ROUTE_COLUMNS} FROM routes WHERE remote_id = ?1"),
                [remote_id],
                RouteRow::from_row,
            )
            .optional()?;
        row.map(RouteRow::into_route).transpose()
    }

    /// List the most recently saved routes.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_routes(&self, limit: usize) -> Result<Vec<SavedRoute>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ROUTE_COLUMNS} FROM routes ORDER BY created_at DESC, id DESC LIMIT ?1"
        ))?;

        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map([limit_i64], RouteRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter().map(RouteRow::into_route).collect()
    }

    /// Get the waypoints of a route in their original order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn waypoints_for_route(&self, route_id: i64) -> Result<Vec<Waypoint>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, route_id, latitude, longitude, elevation, label, category, note
            FROM waypoints WHERE route_id = ?1 ORDER BY position ASC
            ",
        )?;

        let waypoints = stmt
            .query_map([route_id], Self::row_to_waypoint)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(waypoints)
    }

    /// Delete a route and, by cascade, its waypoints.
    ///
    /// Returns `true` if a route was deleted, `false` if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete_route(&self, id: i64) -> Result<bool> {
        let affected = self.conn.execute("DELETE FROM routes WHERE id = ?1", [id])?;
        if affected > 0 {
            info!("Deleted route {}", id);
        }
        Ok(affected > 0)
    }

    /// Count stored routes.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_routes(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM routes", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Count stored waypoints across all routes.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_waypoints(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM waypoints", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let total_routes = self.count_routes()?;
        let total_waypoints = self.count_waypoints()?;

        let (total_points, total_distance_m): (i64, f64) = self.conn.query_row(
            "SELECT COALESCE(SUM(point_count), 0), COALESCE(SUM(distance_m), 0.0) FROM routes",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let newest: Option<String> = self
            .conn
            .query_row(
                "SELECT created_at FROM routes ORDER BY created_at DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let newest_route = newest
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            total_routes,
            total_waypoints,
            total_points,
            total_distance_m,
            newest_route,
            db_size_bytes,
        })
    }

    fn row_to_waypoint(row: &rusqlite::Row) -> rusqlite::Result<Waypoint> {
        let category: String = row.get(6)?;
        Ok(Waypoint {
            id: Some(row.get(0)?),
            route_id: Some(row.get(1)?),
            latitude: row.get(2)?,
            longitude: row.get(3)?,
            elevation: row.get(4)?,
            label: row.get(5)?,
            category: WaypointCategory::from_name(&category),
            note: row.get(7)?,
        })
    }

    #[cfg(test)]
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}

/// A routes row before its track blob is parsed.
struct RouteRow {
    id: i64,
    remote_id: Option<String>,
    name: String,
    description: String,
    region: Option<String>,
    track: Vec<u8>,
    stats: RouteStats,
    created_at: String,
}

impl RouteRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            remote_id: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            region: row.get(4)?,
            track: row.get(5)?,
            stats: RouteStats {
                distance_m: row.get(6)?,
                elevation_gain_m: row.get(7)?,
                elevation_loss_m: row.get(8)?,
                duration_s: row.get(9)?,
                min_elevation_m: row.get(10)?,
                max_elevation_m: row.get(11)?,
            },
            created_at: row.get(12)?,
        })
    }

    fn into_route(self) -> Result<SavedRoute> {
        let track = CompressedTrack::from_bytes(&self.track)?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at).map_or_else(
            |_| {
                warn!(
                    "Route {} has an unreadable created_at '{}'",
                    self.id, self.created_at
                );
                DateTime::<Utc>::default()
            },
            |dt| dt.with_timezone(&Utc),
        );
        Ok(SavedRoute {
            id: Some(self.id),
            remote_id: self.remote_id,
            name: self.name,
            description: self.description,
            track,
            stats: self.stats,
            region: self.region,
            created_at,
        })
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageStats {
    /// Total number of saved routes.
    pub total_routes: i64,
    /// Total number of waypoints across all routes.
    pub total_waypoints: i64,
    /// Total number of track points across all routes.
    pub total_points: i64,
    /// Combined length of all routes in meters.
    pub total_distance_m: f64,
    /// When the most recent route was saved.
    pub newest_route: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}
