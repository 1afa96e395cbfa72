pub mod core;
pub mod fetcher;
pub mod parser;
pub mod spiders;
pub mod stats;
pub mod storage;

pub use core::{
    Crawler, ItemScraper, ScraperError, ScraperResult, SessionReport, SpiderConfig, SpiderWorker,
};
pub use fetcher::{BrowserSession, HttpFetcher, PageFetcher};
pub use spiders::{ProductSpiderWorker, ReviewSpiderWorker, SearchSpiderWorker};
pub use stats::StatsTracker;
pub use storage::{create_store, CatalogStore, StoreType};
