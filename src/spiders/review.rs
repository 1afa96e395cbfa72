use async_trait::async_trait;
use log::{debug, info};
use url::Url;

use super::REVIEW_SCRAPER_VERSION;
use crate::core::config::SpiderConfig;
use crate::core::item_scraper::{ItemScraper, ParsedPage, ScrapeState};
use crate::core::spider::{EntryOutcome, SpiderWorker, WorkerContext};
use crate::fetcher::Page;
use crate::parser::review_page;
use crate::storage::{CatalogStore, ProductRecord, Review, ScrapeStage};
use crate::ScraperResult;

/// Walks the review pages of one product.
pub struct ReviewItemScraper {
    asin: String,
    base_url: Url,
    state: ScrapeState<Review>,
}

impl ReviewItemScraper {
    pub fn new(asin: impl Into<String>, url: Url, max_pages: Option<usize>) -> Self {
        Self {
            asin: asin.into(),
            base_url: url.clone(),
            state: ScrapeState::new(url, max_pages),
        }
    }
}

impl ItemScraper for ReviewItemScraper {
    type Item = Review;
    type Output = Vec<Review>;

    fn state(&self) -> &ScrapeState<Review> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ScrapeState<Review> {
        &mut self.state
    }

    fn parse(&mut self, page: &Page) -> ParsedPage<Review> {
        let document = page.document();
        let reviews = review_page::extract(&document);
        debug!("{} reviews for {} on {}", reviews.len(), self.asin, page.url);
        ParsedPage {
            items: reviews,
            next_page: review_page::next_page_url(&document, &self.base_url),
        }
    }

    fn dump(self) -> Vec<Review> {
        self.state.data
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewTarget {
    pub asin: String,
    pub url: Url,
}

/// Collects the reviews of products whose details are known.
pub struct ReviewSpiderWorker {
    config: SpiderConfig,
    asins: Option<Vec<String>>,
}

impl ReviewSpiderWorker {
    pub fn new(config: SpiderConfig) -> Self {
        Self {
            config,
            asins: None,
        }
    }

    pub fn with_asins<I, S>(mut self, asins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.asins = Some(asins.into_iter().map(Into::into).collect());
        self
    }

    fn target(&self, asin: String, review_url: Option<Url>) -> ScraperResult<ReviewTarget> {
        let url = match review_url {
            Some(url) => url,
            None => self.config.review_index_url(&asin)?,
        };
        Ok(ReviewTarget { asin, url })
    }
}

#[async_trait]
impl SpiderWorker for ReviewSpiderWorker {
    type Entry = ReviewTarget;

    fn action_type(&self) -> &str {
        "Review Page Scraping"
    }

    async fn query(&mut self, store: &dyn CatalogStore) -> ScraperResult<Vec<ReviewTarget>> {
        let mut targets = Vec::new();
        match self.asins.clone() {
            Some(asins) => {
                for asin in asins {
                    let review_url = store
                        .find_product(&asin)
                        .await?
                        .and_then(|record| record.review_url);
                    targets.push(self.target(asin, review_url)?);
                }
            }
            None => {
                for record in store.products_at_stage(ScrapeStage::DetailScraped).await? {
                    targets.push(self.target(record.asin, record.review_url)?);
                }
            }
        }
        Ok(targets)
    }

    async fn process(
        &mut self,
        target: &ReviewTarget,
        ctx: &mut WorkerContext<'_>,
    ) -> ScraperResult<EntryOutcome> {
        let mut scraper =
            ReviewItemScraper::new(target.asin.as_str(), target.url.clone(), self.config.max_pages);
        scraper.run(ctx.browser).await?;
        if !scraper.validate() {
            return Ok(EntryOutcome::Blocked);
        }

        let reviews = scraper.dump();
        info!("Collected {} reviews for {}", reviews.len(), target.asin);
        ctx.browser.stats().record_items(reviews.len(), 0);

        let record = ProductRecord {
            reviews: Some(reviews),
            ..ProductRecord::new(target.asin.as_str())
        };
        ctx.persist(record, ScrapeStage::ReviewScraped, REVIEW_SCRAPER_VERSION)
            .await?;
        Ok(EntryOutcome::Completed)
    }
}
