use async_trait::async_trait;
use log::{debug, info};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use url::Url;

use super::SEARCH_SCRAPER_VERSION;
use crate::core::config::SpiderConfig;
use crate::core::item_scraper::{ItemScraper, ParsedPage, ScrapeState};
use crate::core::spider::{EntryOutcome, SpiderWorker, WorkerContext, WorkerProgress};
use crate::fetcher::Page;
use crate::parser::locale::is_filtered;
use crate::parser::{search_page, SearchCard};
use crate::storage::{is_valid_asin, CatalogStore, ProductRecord, ScrapeStage, SessionLogInfo};
use crate::ScraperResult;

/// Walks every results page of one keyword.
pub struct SearchItemScraper {
    state: ScrapeState<SearchCard>,
    seen: HashSet<String>,
    exclude_keywords: BTreeSet<String>,
    dropped: usize,
}

impl SearchItemScraper {
    pub fn new(
        starting_url: Url,
        seen: HashSet<String>,
        exclude_keywords: BTreeSet<String>,
        max_pages: Option<usize>,
    ) -> Self {
        Self {
            state: ScrapeState::new(starting_url, max_pages),
            seen,
            exclude_keywords,
            dropped: 0,
        }
    }

    /// Identifiers known before the run plus every one accepted during it.
    pub fn seen(&self) -> &HashSet<String> {
        &self.seen
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    fn accept(&mut self, card: &SearchCard) -> bool {
        if self.seen.contains(&card.asin) {
            return false;
        }
        if let Some(title) = &card.title {
            if is_filtered(title, &self.exclude_keywords) {
                debug!("Filtered {} ({})", card.asin, title);
                self.dropped += 1;
                return false;
            }
        }
        if !is_valid_asin(&card.asin) {
            debug!("Dropping card with malformed identifier {:?}", card.asin);
            self.dropped += 1;
            return false;
        }
        self.seen.insert(card.asin.clone());
        true
    }
}

impl ItemScraper for SearchItemScraper {
    type Item = SearchCard;
    type Output = Vec<SearchCard>;

    fn state(&self) -> &ScrapeState<SearchCard> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ScrapeState<SearchCard> {
        &mut self.state
    }

    fn parse(&mut self, page: &Page) -> ParsedPage<SearchCard> {
        let (cards, next_page) = {
            let document = page.document();
            let base = &self.state.starting_url;
            (
                search_page::extract(&document, base),
                search_page::next_page_url(&document, base),
            )
        };

        let items = cards.into_iter().filter(|card| self.accept(card)).collect();
        ParsedPage { items, next_page }
    }

    fn dump(self) -> Vec<SearchCard> {
        self.state.data
    }
}

/// Discovers products by keyword and creates their records.
pub struct SearchSpiderWorker {
    config: SpiderConfig,
    keywords: Vec<String>,
    seen: HashSet<String>,
}

impl SearchSpiderWorker {
    pub fn new(config: SpiderConfig) -> Self {
        let keywords = config.query_keywords.clone();
        Self {
            config,
            keywords,
            seen: HashSet::new(),
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Identifiers to treat as already discovered.
    pub fn with_seen<I, S>(mut self, seen: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.seen.extend(seen.into_iter().map(Into::into));
        self
    }
}

#[async_trait]
impl SpiderWorker for SearchSpiderWorker {
    type Entry = String;

    fn action_type(&self) -> &str {
        "Search Page Scraping"
    }

    async fn query(&mut self, store: &dyn CatalogStore) -> ScraperResult<Vec<String>> {
        self.seen.extend(store.identifiers().await?);
        Ok(self.keywords.clone())
    }

    async fn process(
        &mut self,
        keyword: &String,
        ctx: &mut WorkerContext<'_>,
    ) -> ScraperResult<EntryOutcome> {
        info!("Scraping pages for keyword: {}", keyword);
        let mut scraper = SearchItemScraper::new(
            self.config.search_url(keyword),
            self.seen.clone(),
            self.config.exclude_keywords.clone(),
            self.config.max_pages,
        );
        scraper.run(ctx.browser).await?;
        if !scraper.validate() {
            return Ok(EntryOutcome::Blocked);
        }

        self.seen.extend(scraper.seen().iter().cloned());
        let dropped = scraper.dropped();
        let cards = scraper.dump();
        ctx.browser.stats().record_items(cards.len(), dropped);

        for card in cards {
            let record = ProductRecord {
                title: card.title,
                thumbnail: card.thumbnail,
                ..ProductRecord::new(card.asin)
            };
            ctx.persist(record, ScrapeStage::Discovered, SEARCH_SCRAPER_VERSION)
                .await?;
        }
        Ok(EntryOutcome::Completed)
    }

    fn log(&self, progress: &WorkerProgress) -> SessionLogInfo {
        let mut info = progress.summary();
        info.context.insert(
            "query_keywords".to_string(),
            Value::from(self.keywords.clone()),
        );
        info
    }
}
