#[cfg(feature = "mongodb")]
use super::MongoStore;
use super::{CatalogStore, DiskStore, MemoryStore, StorageResult};
use crate::{ScraperError, ScraperResult};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum StoreType {
    Memory,
    Disk {
        path: PathBuf,
    },
    #[cfg(feature = "mongodb")]
    Mongo {
        connection_string: String,
        database: String,
    },
}

/// Opens a store of the requested kind. Failing to reach the backend is a
/// fatal setup error.
pub async fn create_store(store_type: StoreType) -> ScraperResult<Arc<dyn CatalogStore>> {
    let store: StorageResult<Arc<dyn CatalogStore>> = match store_type {
        StoreType::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreType::Disk { path } => DiskStore::new(path).map(|s| Arc::new(s) as Arc<dyn CatalogStore>),
        #[cfg(feature = "mongodb")]
        StoreType::Mongo {
            connection_string,
            database,
        } => {
            if connection_string.is_empty() {
                return Err(ScraperError::ConfigError(
                    "a MongoDB connection string is required".to_string(),
                ));
            }
            MongoStore::new(&connection_string, &database)
                .await
                .map(|s| Arc::new(s) as Arc<dyn CatalogStore>)
        }
    };

    store.map_err(|e| ScraperError::ConnectionError(e.to_string()))
}
