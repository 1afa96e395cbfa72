use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::fmt::Debug;

use crate::fetcher::BrowserSession;
use crate::storage::{
    is_valid_asin, CatalogStore, ItemMetadata, ProductRecord, ScrapeStage, ScraperVersions,
    SessionLogInfo,
};
use crate::ScraperResult;

/// Where a worker run currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Init,
    Querying,
    Processing(usize),
    LoggingAndClose,
    Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    Completed,
    /// The anti-bot wall was hit. The rest of the queue is abandoned.
    Blocked,
}

/// What a run achieved so far. Survives errors and panics so the session
/// log can still be written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerProgress {
    pub queued: usize,
    pub processed: usize,
    pub updated: Vec<String>,
    pub aborted: bool,
    pub error: Option<String>,
}

impl WorkerProgress {
    pub fn summary(&self) -> SessionLogInfo {
        let message = match (&self.error, self.aborted) {
            (Some(error), _) => Some(format!("failed: {}", error)),
            (None, true) => Some("aborted: anti-bot check triggered".to_string()),
            (None, false) => None,
        };
        SessionLogInfo {
            update_count: self.updated.len(),
            updated_asins: self.updated.clone(),
            message,
            ..Default::default()
        }
    }
}

/// Everything a worker may touch while processing one queue entry.
pub struct WorkerContext<'a> {
    pub store: &'a dyn CatalogStore,
    pub browser: &'a mut BrowserSession,
    pub session_id: u64,
    pub session_time: DateTime<Utc>,
    pub(crate) updated: &'a mut Vec<String>,
}

impl WorkerContext<'_> {
    pub fn stamp(&self, stage: ScrapeStage, version: u32) -> ItemMetadata {
        ItemMetadata {
            last_session_id: self.session_id,
            last_session_time: self.session_time,
            scrap_status: stage,
            scraper_versions: ScraperVersions::for_stage(stage, version),
        }
    }

    /// Stamps and upserts one record. Records with a malformed identifier
    /// are dropped and `false` is returned.
    pub async fn persist(
        &mut self,
        mut record: ProductRecord,
        stage: ScrapeStage,
        version: u32,
    ) -> ScraperResult<bool> {
        if !is_valid_asin(&record.asin) {
            debug!("Dropping record with invalid identifier {:?}", record.asin);
            self.browser.stats().record_items(0, 1);
            return Ok(false);
        }

        record.metadata = Some(self.stamp(stage, version));
        self.store.upsert_product(&record).await?;
        self.browser.stats().record_persisted();
        info!("Updated {} ({})", record.asin, stage.as_str());
        self.updated.push(record.asin);
        Ok(true)
    }
}

/// One crawl stage: decides its queue and handles each entry with a fresh
/// item scraper.
#[async_trait]
pub trait SpiderWorker: Send {
    type Entry: Debug + Send + Sync;

    fn action_type(&self) -> &str;

    /// Materialises the work queue once, before processing starts.
    async fn query(&mut self, store: &dyn CatalogStore) -> ScraperResult<Vec<Self::Entry>>;

    async fn process(
        &mut self,
        entry: &Self::Entry,
        ctx: &mut WorkerContext<'_>,
    ) -> ScraperResult<EntryOutcome>;

    fn log(&self, progress: &WorkerProgress) -> SessionLogInfo {
        progress.summary()
    }
}
