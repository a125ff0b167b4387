//! Error types for decoding garden controller data.

use thiserror::Error;

/// Errors that can occur when decoding a status payload or command token.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// The payload is not valid JSON, or a field has the wrong type.
    #[error("Malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload is valid JSON but not an object.
    #[error("Payload must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// A field holds a value that cannot be represented.
    #[error("Invalid value for '{field}': {message}")]
    InvalidField {
        /// Wire name of the offending field.
        field: &'static str,
        /// What was wrong with it.
        message: String,
    },

    /// A command token that is not part of the device protocol.
    #[error("Unknown command token: {0:?}")]
    UnknownCommand(String),
}

/// Result type alias using garden-types' [`DecodeError`].
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;
