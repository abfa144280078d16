//! `SQLite` schema definitions for trailbook.
//!
//! Routes own their waypoints; deleting a route cascades to its waypoints.

/// SQL statement to create the routes table.
pub const CREATE_ROUTES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS routes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    remote_id TEXT UNIQUE,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    region TEXT,
    track BLOB NOT NULL,
    track_version INTEGER NOT NULL,
    point_count INTEGER NOT NULL,
    distance_m REAL NOT NULL,
    elevation_gain_m REAL NOT NULL,
    elevation_loss_m REAL NOT NULL,
    duration_s REAL,
    min_elevation_m REAL,
    max_elevation_m REAL,
    created_at TEXT NOT NULL
)
";

/// SQL statement to create the waypoints table.
pub const CREATE_WAYPOINTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS waypoints (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    route_id INTEGER NOT NULL REFERENCES routes(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    elevation REAL,
    label TEXT NOT NULL,
    category TEXT NOT NULL,
    note TEXT
)
";

/// SQL statement to create an index on `created_at` for listing.
pub const CREATE_CREATED_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_routes_created ON routes(created_at DESC)
";

/// SQL statement to create an index for loading a route's waypoints in order.
pub const CREATE_WAYPOINT_ROUTE_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_waypoints_route ON waypoints(route_id, position)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_ROUTES_TABLE,
    CREATE_WAYPOINTS_TABLE,
    CREATE_CREATED_INDEX,
    CREATE_WAYPOINT_ROUTE_INDEX,
    CREATE_METADATA_TABLE,
];
