pub mod product;
pub mod review;
pub mod search;

#[cfg(test)]
mod tests;

pub use product::{ProductItemScraper, ProductSpiderWorker};
pub use review::{ReviewItemScraper, ReviewSpiderWorker, ReviewTarget};
pub use search::{SearchItemScraper, SearchSpiderWorker};

/// Bumped whenever a stage's extraction changes shape.
pub const SEARCH_SCRAPER_VERSION: u32 = 1;
pub const PRODUCT_SCRAPER_VERSION: u32 = 1;
pub const REVIEW_SCRAPER_VERSION: u32 = 1;
