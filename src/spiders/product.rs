use async_trait::async_trait;
use log::{info, warn};
use url::Url;

use super::PRODUCT_SCRAPER_VERSION;
use crate::core::config::SpiderConfig;
use crate::core::item_scraper::{ItemScraper, ParsedPage, ScrapeState};
use crate::core::spider::{EntryOutcome, SpiderWorker, WorkerContext};
use crate::fetcher::Page;
use crate::parser::{product_page, ProductDetails};
use crate::storage::{CatalogStore, ProductRecord, ScrapeStage};
use crate::ScraperResult;

/// Reads the detail page of one product. Never paginates.
pub struct ProductItemScraper {
    asin: String,
    state: ScrapeState<ProductDetails>,
}

impl ProductItemScraper {
    pub fn new(asin: impl Into<String>, url: Url) -> Self {
        Self {
            asin: asin.into(),
            state: ScrapeState::new(url, Some(1)),
        }
    }

    pub fn asin(&self) -> &str {
        &self.asin
    }
}

impl ItemScraper for ProductItemScraper {
    type Item = ProductDetails;
    type Output = Option<ProductDetails>;

    fn state(&self) -> &ScrapeState<ProductDetails> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ScrapeState<ProductDetails> {
        &mut self.state
    }

    fn parse(&mut self, page: &Page) -> ParsedPage<ProductDetails> {
        let details = product_page::extract(&page.document(), &self.state.starting_url);
        ParsedPage::last(details.into_iter().collect())
    }

    fn dump(self) -> Option<ProductDetails> {
        self.state.data.into_iter().next()
    }
}

/// Fills in detail fields for discovered products.
pub struct ProductSpiderWorker {
    config: SpiderConfig,
    asins: Option<Vec<String>>,
}

impl ProductSpiderWorker {
    pub fn new(config: SpiderConfig) -> Self {
        Self {
            config,
            asins: None,
        }
    }

    /// Scrapes exactly these products instead of querying the store.
    pub fn with_asins<I, S>(mut self, asins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.asins = Some(asins.into_iter().map(Into::into).collect());
        self
    }
}

#[async_trait]
impl SpiderWorker for ProductSpiderWorker {
    type Entry = String;

    fn action_type(&self) -> &str {
        "Product Page Scraping"
    }

    async fn query(&mut self, store: &dyn CatalogStore) -> ScraperResult<Vec<String>> {
        if let Some(asins) = &self.asins {
            for asin in asins {
                if !store.contains_product(asin).await? {
                    info!("{} is not in the catalog yet, it will be created", asin);
                }
            }
            return Ok(asins.clone());
        }
        Ok(store
            .products_at_stage(ScrapeStage::Discovered)
            .await?
            .into_iter()
            .map(|record| record.asin)
            .collect())
    }

    async fn process(
        &mut self,
        asin: &String,
        ctx: &mut WorkerContext<'_>,
    ) -> ScraperResult<EntryOutcome> {
        let mut scraper = ProductItemScraper::new(asin.as_str(), self.config.product_url(asin)?);
        scraper.run(ctx.browser).await?;
        if !scraper.validate() {
            return Ok(EntryOutcome::Blocked);
        }

        let record = match scraper.dump() {
            Some(details) => {
                ctx.browser.stats().record_items(1, 0);
                details.into_record(asin.as_str())
            }
            None => {
                warn!("Nothing extracted from the detail page of {}", asin);
                ProductRecord::new(asin.as_str())
            }
        };
        ctx.persist(record, ScrapeStage::DetailScraped, PRODUCT_SCRAPER_VERSION)
            .await?;
        info!("Detail page of {} done", asin);
        Ok(EntryOutcome::Completed)
    }
}
