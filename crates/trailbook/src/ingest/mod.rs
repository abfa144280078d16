//! Import of remote routes for offline use.
//!
//! An import runs in two phases. The fetch phase awaits the transport and
//! decodes the document while racing a [`CancelToken`]; nothing is persisted
//! until it has completed. The commit phase compresses the track and stores
//! the route with its waypoints in a single transaction, holding a claim on
//! the remote id so that concurrent imports of one route cannot both commit.

pub mod document;
pub mod gpx_file;
pub mod transport;

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::error::{DecodeError, Error, Result, StorageError};
use crate::route::SavedRoute;
use crate::storage::Storage;

pub use document::{validate_route_id, SharedRoute, SharedWaypoint};
pub use gpx_file::gpx_route_id;
pub use transport::{DirectoryTransport, HttpTransport, RouteTransport};

/// Fetches shared routes and commits them to the local store.
///
/// Cloning is cheap; clones share the transport, the store and the set of
/// in-flight imports.
#[derive(Debug, Clone)]
pub struct RouteIngestor {
    transport: Arc<dyn RouteTransport>,
    storage: Arc<Mutex<Storage>>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl RouteIngestor {
    /// Create an ingestor over `transport` that commits into `storage`.
    #[must_use]
    pub fn new(transport: Arc<dyn RouteTransport>, storage: Arc<Mutex<Storage>>) -> Self {
        Self {
            transport,
            storage,
            in_flight: Arc::default(),
        }
    }

    /// The store imports are committed to.
    #[must_use]
    pub fn storage(&self) -> &Arc<Mutex<Storage>> {
        &self.storage
    }

    /// Fetch and decode the shared route `id`.
    ///
    /// The transport future is dropped as soon as `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if cancelled, a network error if the
    /// transport fails and a decode error if the document is malformed or
    /// describes a different route.
    pub async fn fetch_route(&self, id: &str, cancel: &CancelToken) -> Result<SharedRoute> {
        validate_route_id(id)?;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled { operation: "fetch" });
        }

        debug!(id, transport = self.transport.name(), "Fetching shared route");
        let body = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled { operation: "fetch" }),
            body = self.transport.fetch(id) => body?,
        };

        let route = SharedRoute::from_json(&body)?;
        if route.id != id {
            return Err(DecodeError::invalid(
                "id",
                format!("document describes '{}', expected '{id}'", route.id),
            )
            .into());
        }

        debug!(
            id,
            points = route.track.len(),
            waypoints = route.waypoints.len(),
            "Decoded shared route"
        );
        Ok(route)
    }

    /// Start fetching `id` on a background task.
    ///
    /// The result is delivered through the returned [`PendingFetch`].
    #[must_use]
    pub fn spawn_fetch(&self, id: impl Into<String>, cancel: CancelToken) -> PendingFetch {
        let id = id.into();
        let ingestor = self.clone();
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let result = ingestor.fetch_route(&id, &cancel).await;
            // The receiver may have been dropped; nobody is waiting then.
            let _ = tx.send(result);
        });
        PendingFetch { rx }
    }

    /// Store `shared` as a saved route with its waypoints.
    ///
    /// Route and waypoints are committed in one transaction; on failure
    /// nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ImportInProgress`] if another import of the same id
    /// is committing, [`StorageError::AlreadyExists`] if the route is already
    /// stored, a codec error if the track cannot be compressed, and other
    /// storage errors if the commit fails.
    pub async fn import_for_offline_use(&self, shared: SharedRoute) -> Result<SavedRoute> {
        shared.validate()?;
        let claim = InFlightClaim::acquire(&self.in_flight, &shared.id)?;

        let storage = Arc::clone(&self.storage);
        let saved = tokio::task::spawn_blocking(move || commit(&storage, &shared))
            .await
            .map_err(|e| Error::internal(format!("import worker panicked: {e}")))??;

        drop(claim);
        Ok(saved)
    }

    /// Fetch `id` and import it once the document is fully decoded.
    ///
    /// # Errors
    ///
    /// Any error of [`RouteIngestor::fetch_route`] or
    /// [`RouteIngestor::import_for_offline_use`].
    pub async fn fetch_and_import(&self, id: &str, cancel: &CancelToken) -> Result<SavedRoute> {
        let shared = self.fetch_route(id, cancel).await?;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled { operation: "fetch" });
        }
        self.import_for_offline_use(shared).await
    }

    /// Import a local GPX file.
    ///
    /// The remote id is derived from the file contents, so importing the
    /// same file twice fails with [`StorageError::AlreadyExists`].
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read, a decode error if it
    /// is not valid GPX, and any error of
    /// [`RouteIngestor::import_for_offline_use`].
    pub async fn import_gpx(&self, path: &Path) -> Result<SavedRoute> {
        let bytes = tokio::fs::read(path).await?;
        let shared = SharedRoute::from_gpx(&bytes)?;
        debug!(path = %path.display(), id = %shared.id, "Parsed GPX file");
        self.import_for_offline_use(shared).await
    }
}

/// A fetch running on a background task.
#[derive(Debug)]
pub struct PendingFetch {
    rx: oneshot::Receiver<Result<SharedRoute>>,
}

impl PendingFetch {
    /// Wait for the fetch to finish.
    ///
    /// # Errors
    ///
    /// Returns the fetch error, or an internal error if the task died.
    pub async fn wait(self) -> Result<SharedRoute> {
        self.rx
            .await
            .map_err(|_| Error::internal("fetch task ended without a result"))?
    }
}

/// Holds a remote id in the in-flight set until dropped.
#[derive(Debug)]
struct InFlightClaim {
    set: Arc<Mutex<HashSet<String>>>,
    id: String,
}

impl InFlightClaim {
    fn acquire(set: &Arc<Mutex<HashSet<String>>>, id: &str) -> Result<Self> {
        let mut ids = set.lock().unwrap_or_else(PoisonError::into_inner);
        if !ids.insert(id.to_string()) {
            return Err(Error::ImportInProgress {
                remote_id: id.to_string(),
            });
        }
        Ok(Self {
            set: Arc::clone(set),
            id: id.to_string(),
        })
    }
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

fn commit(storage: &Mutex<Storage>, shared: &SharedRoute) -> Result<SavedRoute> {
    let mut storage = storage
        .lock()
        .map_err(|_| Error::internal("route store lock poisoned"))?;

    if storage.get_route_by_remote_id(&shared.id)?.is_some() {
        return Err(StorageError::AlreadyExists {
            remote_id: shared.id.clone(),
        }
        .into());
    }

    let mut route = SavedRoute::from_points(&shared.name, &shared.description, &shared.track)?
        .with_remote_id(&shared.id);
    route.region.clone_from(&shared.region);

    let (saved, waypoints) = storage.save_route(&route, &shared.to_waypoints())?;
    info!(
        remote_id = %shared.id,
        route_id = ?saved.id,
        points = saved.track.point_count(),
        waypoints = waypoints.len(),
        "Imported route for offline use"
    );
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::document::tests::sample_document;
    use crate::ingest::transport::tests::StaticTransport;
    use crate::route::WaypointCategory;
    use std::time::Duration;

    fn ingestor_with(transport: StaticTransport) -> RouteIngestor {
        let storage = Storage::open_in_memory().unwrap();
        RouteIngestor::new(Arc::new(transport), Arc::new(Mutex::new(storage)))
    }

    fn shared(id: &str) -> SharedRoute {
        SharedRoute::from_json(sample_document(id).as_bytes()).unwrap()
    }

    fn counts(ingestor: &RouteIngestor) -> (i64, i64) {
        let storage = ingestor.storage().lock().unwrap();
        (
            storage.count_routes().unwrap(),
            storage.count_waypoints().unwrap(),
        )
    }

    #[tokio::test]
    async fn test_fetch_and_import() {
        let ingestor = ingestor_with(
            StaticTransport::default().with_document("alps/lake-loop", sample_document("alps/lake-loop")),
        );

        let saved = ingestor
            .fetch_and_import("alps/lake-loop", &CancelToken::new())
            .await
            .unwrap();
        let id = saved.id.unwrap();
        assert_eq!(saved.remote_id.as_deref(), Some("alps/lake-loop"));
        assert_eq!(saved.name, "Lake Loop");
        assert_eq!(saved.region.as_deref(), Some("Engadin"));
        assert_eq!(saved.track.point_count(), 4);
        assert!(saved.stats.distance_m > 0.0);

        let storage = ingestor.storage().lock().unwrap();
        let waypoints = storage.waypoints_for_route(id).unwrap();
        assert_eq!(waypoints.len(), 3);
        assert!(waypoints.iter().all(|w| w.route_id == Some(id)));
        assert_eq!(waypoints[1].category, WaypointCategory::WaterSource);
        assert_eq!(storage.get_route(id).unwrap().unwrap().points().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_failed_waypoint_rolls_back_import() {
        let ingestor = ingestor_with(StaticTransport::default());
        ingestor
            .storage()
            .lock()
            .unwrap()
            .conn()
            .execute_batch(
                r"
                CREATE TRIGGER fail_on_boom BEFORE INSERT ON waypoints
                WHEN NEW.label = 'boom'
                BEGIN
                    SELECT RAISE(ABORT, 'forced waypoint failure');
                END;
                ",
            )
            .unwrap();

        let mut route = shared("r1");
        route.waypoints[1].label = "boom".to_string();
        let err = ingestor.import_for_offline_use(route.clone()).await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)), "{err}");
        assert_eq!(counts(&ingestor), (0, 0));

        // The claim is released, so a corrected import goes through.
        route.waypoints[1].label = "Spring".to_string();
        ingestor.import_for_offline_use(route).await.unwrap();
        assert_eq!(counts(&ingestor), (1, 3));
    }

    #[tokio::test]
    async fn test_sequential_duplicate_is_rejected() {
        let ingestor = ingestor_with(StaticTransport::default());
        ingestor.import_for_offline_use(shared("r1")).await.unwrap();

        let err = ingestor.import_for_offline_use(shared("r1")).await.unwrap_err();
        assert!(matches!(err, Error::Storage(StorageError::AlreadyExists { .. })));
        assert!(err.is_duplicate_import());
        assert_eq!(counts(&ingestor), (1, 3));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_imports_store_one_route() {
        let ingestor = ingestor_with(StaticTransport::default());

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let ingestor = ingestor.clone();
                tokio::spawn(async move { ingestor.import_for_offline_use(shared("r1")).await })
            })
            .collect();

        let mut stored = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => stored += 1,
                Err(err) => assert!(err.is_duplicate_import(), "{err}"),
            }
        }
        assert_eq!(stored, 1);
        assert_eq!(counts(&ingestor), (1, 3));
    }

    #[tokio::test]
    async fn test_in_flight_claim_rejects_second_import() {
        let ingestor = ingestor_with(StaticTransport::default());
        let claim = InFlightClaim::acquire(&ingestor.in_flight, "r1").unwrap();

        let err = ingestor.import_for_offline_use(shared("r1")).await.unwrap_err();
        assert!(matches!(err, Error::ImportInProgress { ref remote_id } if remote_id == "r1"));
        ingestor.import_for_offline_use(shared("r2")).await.unwrap();

        drop(claim);
        ingestor.import_for_offline_use(shared("r1")).await.unwrap();
        assert_eq!(counts(&ingestor), (2, 6));
    }

    #[tokio::test]
    async fn test_cancel_abandons_fetch() {
        let transport = StaticTransport::default()
            .with_document("r1", sample_document("r1"))
            .with_delay(Duration::from_secs(30));
        let ingestor = ingestor_with(transport);
        let cancel = CancelToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = ingestor.fetch_and_import("r1", &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(counts(&ingestor), (0, 0));
    }

    #[tokio::test]
    async fn test_cancelled_token_skips_transport() {
        let transport = StaticTransport::default().with_document("r1", sample_document("r1"));
        let ingestor = ingestor_with(transport.clone());
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = ingestor.fetch_route("r1", &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(transport.fetches(), 0);
    }

    #[tokio::test]
    async fn test_decode_failure_persists_nothing() {
        let ingestor = ingestor_with(StaticTransport::default().with_document("r1", "not json"));
        let err = ingestor
            .fetch_and_import("r1", &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Decode(DecodeError::Json(_))));
        assert_eq!(counts(&ingestor), (0, 0));
    }

    #[tokio::test]
    async fn test_document_for_other_route_is_rejected() {
        let ingestor = ingestor_with(StaticTransport::default().with_document("r1", sample_document("r2")));
        let err = ingestor.fetch_route("r1", &CancelToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::Decode(DecodeError::Invalid { .. })));
    }

    #[tokio::test]
    async fn test_missing_and_invalid_ids() {
        let transport = StaticTransport::default();
        let ingestor = ingestor_with(transport.clone());

        let err = ingestor.fetch_route("nope", &CancelToken::new()).await.unwrap_err();
        assert!(err.to_string().contains("not found"));

        let err = ingestor.fetch_route("../etc/passwd", &CancelToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
        assert_eq!(transport.fetches(), 1);
    }

    #[tokio::test]
    async fn test_spawn_fetch_delivers_result() {
        let ingestor = ingestor_with(StaticTransport::default().with_document("r1", sample_document("r1")));
        let pending = ingestor.spawn_fetch("r1", CancelToken::new());
        let route = pending.wait().await.unwrap();
        assert_eq!(route.track.len(), 4);
        assert_eq!(counts(&ingestor), (0, 0));
    }

    #[tokio::test]
    async fn test_import_gpx_twice_is_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("walk.gpx");
        std::fs::write(
            &path,
            r#"<?xml version="1.0"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <trk><name>Walk</name><trkseg>
    <trkpt lat="47.0" lon="8.0"><ele>400.0</ele></trkpt>
    <trkpt lat="47.001" lon="8.001"><ele>410.0</ele></trkpt>
  </trkseg></trk>
</gpx>
"#,
        )
        .unwrap();

        let ingestor = ingestor_with(StaticTransport::default());
        let saved = ingestor.import_gpx(&path).await.unwrap();
        assert_eq!(saved.name, "Walk");
        assert!(saved.remote_id.as_deref().unwrap().starts_with("gpx-"));

        let err = ingestor.import_gpx(&path).await.unwrap_err();
        assert!(err.is_duplicate_import());
    }
}
