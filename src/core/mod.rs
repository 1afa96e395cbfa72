pub mod config;
pub mod crawler;
pub mod errors;
pub mod item_scraper;
pub mod spider;

pub use config::{AntiBotSignatures, SpiderConfig};
pub use crawler::{Crawler, SessionReport};
pub use errors::{ScraperError, ScraperResult};
pub use item_scraper::{ItemScraper, ParsedPage, ScrapeState};
pub use spider::{EntryOutcome, SpiderWorker, WorkerContext, WorkerProgress, WorkerState};
