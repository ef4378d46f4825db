//! Session table backends for tabtally.

pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemorySessionStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSessionStore;

use std::sync::Arc;
use tabtally_config::StoreConfig;
use tabtally_core::SessionStore;
use tabtally_core::error::StoreError;

/// Open the backend selected by `config.backend`.
pub async fn open_store(config: &StoreConfig) -> Result<Arc<dyn SessionStore>, StoreError> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(InMemorySessionStore::new())),
        #[cfg(feature = "sqlite")]
        "sqlite" => Ok(Arc::new(
            SqliteSessionStore::new(&config.resolved_url(), config.max_connections).await?,
        )),
        other => Err(StoreError::Connection(format!(
            "store backend '{other}' is not available"
        ))),
    }
}
