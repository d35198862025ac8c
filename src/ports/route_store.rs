use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

/// Error type for route table persistence
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    /// The backing file could not be read or written
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The table could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for route store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Flat `path -> target` mapping as it is persisted.
pub type RouteTable = HashMap<String, String>;

/// RouteStore defines the port for the durable projection of the route table.
#[async_trait]
pub trait RouteStore: Send + Sync + 'static {
    /// Read the persisted table.
    ///
    /// Never fails: a missing or unreadable table yields an empty one.
    async fn load(&self) -> RouteTable;

    /// Overwrite the persisted table with `table`.
    async fn save(&self, table: &RouteTable) -> StoreResult<()>;
}
