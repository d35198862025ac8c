use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::ports::route_store::{RouteStore, RouteTable, StoreResult};

pub const ROUTES_FILENAME: &str = "routes.json";

/// Route table persisted as a flat JSON object in `<runtime>/routes.json`.
pub struct JsonRouteStore {
    path: PathBuf,
}

impl JsonRouteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store scoped to `runtime_path`.
    pub fn in_runtime_dir(runtime_path: &Path) -> Self {
        Self::new(runtime_path.join(ROUTES_FILENAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RouteStore for JsonRouteStore {
    async fn load(&self) -> RouteTable {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(file = %self.path.display(), "No persisted routes, starting empty");
                return RouteTable::new();
            }
            Err(e) => {
                tracing::warn!(
                    file = %self.path.display(),
                    error = %e,
                    "Failed to read routes, starting empty"
                );
                return RouteTable::new();
            }
        };

        match serde_json::from_slice::<RouteTable>(&raw) {
            Ok(table) => table,
            Err(e) => {
                tracing::warn!(
                    file = %self.path.display(),
                    error = %e,
                    "Invalid routes file, starting empty"
                );
                RouteTable::new()
            }
        }
    }

    async fn save(&self, table: &RouteTable) -> StoreResult<()> {
        let raw = serde_json::to_vec(table)?;
        tokio::fs::write(&self.path, raw).await?;
        Ok(())
    }
}
