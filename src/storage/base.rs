use async_trait::async_trait;
use thiserror::Error;

use super::types::{ProductFilter, ProductRecord, ScrapeStage, SessionLog};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("store unreachable: {0}")]
    Connection(String),

    #[error("store operation failed: {0}")]
    Operation(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("store handle is closed")]
    Closed,
}

pub type StorageResult<T> = Result<T, StorageError>;

impl From<serde_json::Error> for StorageError {
    fn from(error: serde_json::Error) -> Self {
        StorageError::Serialization(error.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(error: std::io::Error) -> Self {
        StorageError::Operation(error.to_string())
    }
}

/// The catalog document store: product records keyed by identifier, an
/// append-only session log and a single session counter.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Round-trips to the backend; an error here is fatal for a worker.
    async fn check_connection(&self) -> StorageResult<()>;

    /// Atomically increments the session counter and returns the new value.
    async fn next_session_id(&self) -> StorageResult<u64>;

    /// Merges `record` into the stored document with the same identifier,
    /// creating it when absent.
    async fn upsert_product(&self, record: &ProductRecord) -> StorageResult<()>;

    async fn find_product(&self, asin: &str) -> StorageResult<Option<ProductRecord>>;

    async fn contains_product(&self, asin: &str) -> StorageResult<bool> {
        Ok(self.find_product(asin).await?.is_some())
    }

    async fn identifiers(&self) -> StorageResult<Vec<String>>;

    /// Records currently sitting at exactly `stage`.
    async fn products_at_stage(&self, stage: ScrapeStage) -> StorageResult<Vec<ProductRecord>>;

    async fn products(&self) -> StorageResult<Vec<ProductRecord>>;

    async fn search_products(&self, filter: &ProductFilter) -> StorageResult<Vec<ProductRecord>> {
        Ok(self
            .products()
            .await?
            .into_iter()
            .filter(|record| filter.matches(record))
            .collect())
    }

    async fn append_session_log(&self, entry: &SessionLog) -> StorageResult<()>;

    async fn session_logs(&self) -> StorageResult<Vec<SessionLog>>;

    /// Releases the connection. Further calls on this handle fail.
    async fn close(&self) -> StorageResult<()>;
}
