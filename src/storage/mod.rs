pub mod base;
pub mod disk;
pub mod export;
pub mod factory;
pub mod memory;
#[cfg(feature = "mongodb")]
pub mod mongo;
pub mod types;

pub use base::{CatalogStore, StorageError, StorageResult};
pub use disk::DiskStore;
pub use factory::{create_store, StoreType};
pub use memory::MemoryStore;
#[cfg(feature = "mongodb")]
pub use mongo::MongoStore;
pub use types::{
    is_valid_asin, ItemMetadata, ProductFilter, ProductRecord, Review, ScrapeStage,
    ScraperVersions, SessionLog, SessionLogInfo,
};
