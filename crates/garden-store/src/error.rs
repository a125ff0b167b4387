//! Error types for garden-store.

use std::path::PathBuf;

use garden_types::DecodeError;

/// Result type for garden-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in garden-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A stored document could not be decoded.
    #[error("Malformed status document for {device_id}: {source}")]
    Decode {
        device_id: String,
        source: DecodeError,
    },

    /// A stored document is not a JSON object, so a command cannot be staged in it.
    #[error("Status record for {device_id} is not a JSON object")]
    NotAnObject { device_id: String },

    /// The database was written by a schema version this build does not know.
    #[error("Unsupported schema version {0}")]
    UnsupportedSchema(i32),

    /// A snapshot could not be encoded for storage.
    #[error("Failed to encode status document: {0}")]
    Encode(DecodeError),

    /// Invalid timestamp.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(i64),
}
