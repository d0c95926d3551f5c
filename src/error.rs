//! # Error Types
//!
//! Custom error types for Altimeter Sync using `thiserror`.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Main error type for Altimeter Sync
#[derive(Debug, Error)]
pub enum AltimeterError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Record store errors
    #[error("Record store error: {0}")]
    Store(#[from] StoreError),

    /// Sensor acquisition errors
    #[error("Sensor error: {0}")]
    Sensor(String),

    /// Reference pressure could not be fetched
    #[error("Reference pressure error: {0}")]
    Reference(String),

    /// Upload payload or persisted state could not be encoded or decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by the record store.
///
/// None of these are fatal to the sync loop. `MountFailed` at open leaves the
/// store closed for the rest of the process; everything else is reported to
/// the immediate caller and the store stays usable.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage root could not be mounted
    #[error("failed to mount storage at '{}': {source}", path.display())]
    MountFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Storage directory could not be opened for listing
    #[error("failed to open directory '{}': {source}", path.display())]
    DirectoryOpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Directory walk did not finish cleanly
    #[error("failed to close directory '{}': {source}", path.display())]
    DirectoryCloseFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Record file could not be created or written
    #[error("failed to open '{}' for writing: {source}", path.display())]
    FileOpenForWriteFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Record file could not be opened or fully read
    #[error("failed to open '{}' for reading: {source}", path.display())]
    FileOpenForReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Operation attempted while the store is not mounted
    #[error("record store is not open")]
    NotOpen,
}

/// Result type alias for Altimeter Sync
pub type Result<T> = std::result::Result<T, AltimeterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_message_contains_path() {
        let err = StoreError::FileOpenForWriteFailed {
            path: PathBuf::from("/sdcard/00000007.bin"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "read-only"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/sdcard/00000007.bin"));
        assert!(msg.contains("writing"));
    }

    #[test]
    fn test_store_error_converts_into_main_error() {
        let err: AltimeterError = StoreError::NotOpen.into();
        assert!(matches!(err, AltimeterError::Store(StoreError::NotOpen)));
        assert_eq!(err.to_string(), "Record store error: record store is not open");
    }
}
