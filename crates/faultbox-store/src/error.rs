//! Error types for the data layer.

use thiserror::Error;

/// Failures raised by a primary or cache transport.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// The transport could not be established.
    #[error("{backend} connection failed: {message}")]
    Connect {
        backend: &'static str,
        message: String,
    },

    /// The transport is not connected.
    #[error("{backend} is not connected")]
    Disconnected { backend: &'static str },

    /// A command reached the backend and failed.
    #[error("{backend} command failed: {message}")]
    Command {
        backend: &'static str,
        message: String,
    },

    /// A stored value could not be decoded.
    #[error("failed to decode value at {key}: {message}")]
    Decode { key: String, message: String },
}

/// Failures surfaced to callers of the store.
///
/// Cache problems never appear here; they degrade to mock data instead.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Listing records from the primary store failed.
    #[error("failed to query users from primary store: {0}")]
    Query(#[source] TransportError),

    /// Seeding the empty primary store with mock records failed.
    #[error("failed to insert mock user {id} into primary store: {source}")]
    Seed {
        id: String,
        #[source]
        source: TransportError,
    },
}

/// Result type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;
