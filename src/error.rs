use thiserror::Error;

use crate::models::SensorId;

/// Failure reported by a [`crate::store::SensorStore`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("HTTP {0}")]
    Status(u16),
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed response body: {0}")]
    Body(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        Self::Body(error.to_string())
    }
}

/// Errors surfaced by the repository operations.
///
/// None of them are fatal: a populated snapshot stays usable and the caller
/// retries by invoking the operation again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("failed to fetch sensors: HTTP {status}")]
    Fetch { status: u16 },
    #[error("failed to update sensor {id}: HTTP {status}")]
    Update { id: SensorId, status: u16 },
    #[error("{0}")]
    Network(String),
    #[error("{0}")]
    MalformedBody(String),
}

impl SyncError {
    /// Map a store failure raised by the LIST request.
    pub fn from_list(error: StoreError) -> Self {
        match error {
            StoreError::Status(status) => Self::Fetch { status },
            StoreError::Network(message) => Self::Network(message),
            StoreError::Body(message) => Self::MalformedBody(message),
        }
    }

    /// Map a store failure raised by the UPDATE request for `id`.
    pub fn from_update(id: &SensorId, error: StoreError) -> Self {
        match error {
            StoreError::Status(status) => Self::Update {
                id: id.clone(),
                status,
            },
            StoreError::Network(message) => Self::Network(message),
            StoreError::Body(message) => Self::MalformedBody(message),
        }
    }
}
