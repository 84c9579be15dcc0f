/*!
 * Error types for the epubtrans application.
 *
 * This module contains custom error types for different parts of the application,
 * using the thiserror crate for ergonomic error definitions.
 */

use thiserror::Error;

/// Errors that can occur when working with translation backends
#[derive(Error, Debug)]
pub enum BackendError {
    /// Error when making a backend request fails
    #[error("Backend request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing a backend response fails
    #[error("Failed to parse backend response: {0}")]
    ParseError(String),

    /// Error returned by the backend service itself
    #[error("Backend responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the service
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The backend answered with a different number of items than requested
    #[error("Backend returned {got} translations for a batch of {expected}")]
    BatchMismatch {
        /// Number of items submitted
        expected: usize,
        /// Number of items returned
        got: usize,
    },

    /// Every candidate backend failed instantiation or canary validation
    #[error("No translation backend available: every candidate failed validation")]
    NoBackendAvailable,
}

/// Errors that can occur while reading or writing the ebook container
#[derive(Error, Debug)]
pub enum ContainerError {
    /// Error from a file operation
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from the underlying archive layer
    #[error("Archive error: {0}")]
    Archive(String),

    /// The container metadata (OCF descriptor or package manifest) is unusable
    #[error("Container metadata error: {0}")]
    Metadata(String),

    /// A sub-document id that is not part of the container was requested
    #[error("Unknown sub-document: {0}")]
    UnknownDocument(String),
}

impl From<zip::result::ZipError> for ContainerError {
    fn from(error: zip::result::ZipError) -> Self {
        Self::Archive(error.to_string())
    }
}
