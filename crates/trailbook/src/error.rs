//! Error types for trailbook.
//!
//! Each pipeline stage has its own error enum so callers can tell a network
//! failure from a malformed document, a render failure, or a storage failure.
//! They are all wrapped by the crate-level [`Error`].

use std::path::PathBuf;
use thiserror::Error;

/// Failures of the compressed track codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The blob is truncated, fails its checksum, or is internally inconsistent.
    #[error("corrupt track data: {reason}")]
    Corrupt {
        /// What was wrong with the blob.
        reason: String,
    },

    /// The blob was written by a format version this codec does not know.
    #[error("unsupported track format version {version}")]
    UnsupportedVersion {
        /// The version tag found in the blob.
        version: u8,
    },

    /// A point handed to the encoder cannot be represented.
    #[error("invalid track point at index {index}: {reason}")]
    InvalidPoint {
        /// Position of the offending point in the input sequence.
        index: usize,
        /// Why the point was rejected.
        reason: String,
    },
}

impl CodecError {
    /// Create a corrupt-data error.
    #[must_use]
    pub fn corrupt(reason: impl Into<String>) -> Self {
        Self::Corrupt {
            reason: reason.into(),
        }
    }
}

/// Failures of the remote route transport.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// The request could not be sent or the response could not be read.
    #[error("network request for route '{key}' failed: {message}")]
    Request {
        /// Route identifier being fetched.
        key: String,
        /// Description of the transport failure.
        message: String,
    },

    /// The remote answered with a non-success status.
    #[error("remote returned status {status} for route '{key}'")]
    Status {
        /// Route identifier being fetched.
        key: String,
        /// HTTP status code.
        status: u16,
    },

    /// No document exists under the identifier.
    #[error("remote route '{key}' not found")]
    NotFound {
        /// Route identifier being fetched.
        key: String,
    },
}

/// Failures while decoding a remote route document.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The document is not valid JSON for the route schema.
    #[error("malformed route document: {0}")]
    Json(#[from] serde_json::Error),

    /// The document parsed but carries an invalid value.
    #[error("invalid route document field '{field}': {reason}")]
    Invalid {
        /// Field that failed validation.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A GPX file could not be parsed.
    #[error("malformed GPX file: {0}")]
    Gpx(String),
}

impl DecodeError {
    /// Create an invalid-field error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Failures while producing an export artifact.
#[derive(Error, Debug)]
pub enum ExportError {
    /// Assembling or laying out the document failed.
    #[error("failed to render {format} export: {message}")]
    RenderingFailed {
        /// Export format being rendered.
        format: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// Writing the finished artifact failed.
    #[error("failed to write export to {path}: {source}")]
    WriteFailed {
        /// Destination that could not be written.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl ExportError {
    /// Create a rendering error for the given format.
    #[must_use]
    pub fn rendering(format: &'static str, message: impl Into<String>) -> Self {
        Self::RenderingFailed {
            format,
            message: message.into(),
        }
    }
}

/// Failures of the local route store.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    Open {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    Migration {
        /// Description of what went wrong.
        message: String,
    },

    /// A constraint (foreign key, NOT NULL, CHECK, trigger) rejected a write.
    #[error("storage constraint violated: {message}")]
    ConstraintViolation {
        /// Message reported by the database.
        message: String,
    },

    /// The database failed to read or write.
    #[error("storage I/O failure: {0}")]
    IoFailure(#[source] rusqlite::Error),

    /// A route was already imported under this remote identifier.
    #[error("route '{remote_id}' has already been saved")]
    AlreadyExists {
        /// The remote identifier.
        remote_id: String,
    },
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        if err.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation) {
            Self::ConstraintViolation {
                message: err.to_string(),
            }
        } else {
            Self::IoFailure(err)
        }
    }
}

/// The main error type for trailbook operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Pipeline Errors ===
    /// Track compression or decompression failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Fetching a remote route failed.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// A remote route document could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// An export could not be produced.
    #[error(transparent)]
    Export(#[from] ExportError),

    /// The local store rejected an operation.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Another import for the same remote identifier is running.
    #[error("an import of route '{remote_id}' is already in progress")]
    ImportInProgress {
        /// The remote identifier.
        remote_id: String,
    },

    /// The operation was cancelled by its caller.
    #[error("{operation} was cancelled")]
    Cancelled {
        /// Description of the cancelled operation.
        operation: &'static str,
    },

    /// No saved route has this id.
    #[error("route {id} not found")]
    RouteNotFound {
        /// The requested route id.
        id: i64,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for trailbook operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.into())
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if the failure is transient and the caller may retry.
    ///
    /// Only transport failures qualify; the pipeline itself never retries.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(NetworkError::NotFound { .. }) => false,
            Self::Network(_) => true,
            _ => false,
        }
    }

    /// Check if this error reports a duplicate or concurrent import.
    #[must_use]
    pub fn is_duplicate_import(&self) -> bool {
        matches!(
            self,
            Self::ImportInProgress { .. } | Self::Storage(StorageError::AlreadyExists { .. })
        )
    }

    /// Check if this error reports a cancelled operation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_error_display() {
        let err = CodecError::corrupt("checksum mismatch");
        assert_eq!(err.to_string(), "corrupt track data: checksum mismatch");

        let err = CodecError::UnsupportedVersion { version: 9 };
        assert_eq!(err.to_string(), "unsupported track format version 9");
    }

    #[test]
    fn test_codec_error_is_transparent() {
        let err: Error = CodecError::UnsupportedVersion { version: 3 }.into();
        assert_eq!(err.to_string(), "unsupported track format version 3");
        assert!(matches!(err, Error::Codec(_)));
    }

    #[test]
    fn test_network_errors_are_retryable() {
        let err: Error = NetworkError::Request {
            key: "alps/eiger".to_string(),
            message: "connection reset".to_string(),
        }
        .into();
        assert!(err.is_retryable());

        let err: Error = NetworkError::Status {
            key: "alps/eiger".to_string(),
            status: 503,
        }
        .into();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_not_found_is_not_retryable() {
        let err: Error = NetworkError::NotFound {
            key: "alps/missing".to_string(),
        }
        .into();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("alps/missing"));
    }

    #[test]
    fn test_decode_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: Error = DecodeError::from(json_err).into();
        assert!(matches!(err, Error::Decode(DecodeError::Json(_))));
        assert!(err.to_string().starts_with("malformed route document"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_decode_invalid_display() {
        let err = DecodeError::invalid("track[2].latitude", "out of range");
        let msg = err.to_string();
        assert!(msg.contains("track[2].latitude"));
        assert!(msg.contains("out of range"));
    }

    #[test]
    fn test_export_error_display() {
        let err = ExportError::rendering("report", "font unavailable");
        assert_eq!(
            err.to_string(),
            "failed to render report export: font unavailable"
        );

        let err = ExportError::WriteFailed {
            path: PathBuf::from("/readonly/out.pdf"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("/readonly/out.pdf"));
    }

    #[test]
    fn test_duplicate_import_detection() {
        let err = Error::ImportInProgress {
            remote_id: "alps/eiger".to_string(),
        };
        assert!(err.is_duplicate_import());

        let err: Error = StorageError::AlreadyExists {
            remote_id: "alps/eiger".to_string(),
        }
        .into();
        assert!(err.is_duplicate_import());
        assert_eq!(err.to_string(), "route 'alps/eiger' has already been saved");

        assert!(!Error::internal("boom").is_duplicate_import());
    }

    #[test]
    fn test_cancelled_display() {
        let err = Error::Cancelled {
            operation: "route fetch",
        };
        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), "route fetch was cancelled");
    }

    #[test]
    fn test_from_rusqlite_constraint_error() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v TEXT NOT NULL);")
            .unwrap();
        let sqlite_err = conn
            .execute("INSERT INTO t (v) VALUES (NULL)", [])
            .unwrap_err();

        let err: Error = sqlite_err.into();
        assert!(matches!(
            err,
            Error::Storage(StorageError::ConstraintViolation { .. })
        ));
    }

    #[test]
    fn test_from_rusqlite_other_error() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let sqlite_err = conn.execute("SELECT * FROM missing_table", []).unwrap_err();

        let err: Error = sqlite_err.into();
        assert!(matches!(err, Error::Storage(StorageError::IoFailure(_))));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_route_not_found_display() {
        let err = Error::RouteNotFound { id: 42 };
        assert_eq!(err.to_string(), "route 42 not found");
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = Error::ConfigValidation {
            message: "profile_max_points must be at least 2".to_string(),
        };
        assert!(err.to_string().contains("profile_max_points"));
    }
}
