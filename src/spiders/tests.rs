use super::*;
use crate::core::config::{AntiBotSignatures, SpiderConfig};
use crate::core::spider::{EntryOutcome, SpiderWorker, WorkerContext};
use crate::core::{Crawler, WorkerState};
use crate::fetcher::{BrowserSession, MockFetcher, NoCaptchaSolver};
use crate::storage::{
    CatalogStore, MemoryStore, ProductRecord, ScrapeStage, SessionLog, StorageError,
    StorageResult,
};
use crate::{ScraperError, ScraperResult};
use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn card(asin: &str, title: &str) -> String {
    format!(
        r#"<div data-asin="{asin}" data-component-type="s-search-result">
             <img class="s-image" src="https://m.media-amazon.com/images/I/{asin}.jpg">
             <h2><a href="/dp/{asin}"><span>{title}</span></a></h2>
           </div>"#
    )
}

fn results_page(cards: &[(&str, &str)], next: Option<&str>) -> String {
    let cards: String = cards.iter().map(|(asin, title)| card(asin, title)).collect();
    let next = next
        .map(|href| format!(r#"<a class="s-pagination-next" href="{}">Suivant</a>"#, href))
        .unwrap_or_default();
    format!(
        r#"<html><head><title>Amazon.fr : tampon</title></head><body>
           <span data-component-type="s-search-results">{cards}</span>{next}
           </body></html>"#
    )
}

fn tampon_pages() -> MockFetcher {
    MockFetcher::new()
        .with_page(
            "https://www.amazon.fr/s?k=tampon",
            results_page(
                &[
                    ("B082VVRKTP", "Tampax Compak Regular"),
                    ("B011111111", "Élastiques pour cheveux"),
                    ("B07Q2SNNBH", "Tampons bio Natracare"),
                ],
                Some("/s?k=tampon&page=2"),
            ),
        )
        .with_page(
            "https://www.amazon.fr/s?k=tampon&page=2",
            results_page(
                &[
                    ("B0C1234567", "Tampons Super Plus"),
                    ("B0D7654321", "Tampons sans applicateur"),
                ],
                None,
            ),
        )
}

fn browser(fetcher: &MockFetcher) -> BrowserSession {
    BrowserSession::new(
        Box::new(fetcher.clone()),
        Arc::new(NoCaptchaSolver),
        AntiBotSignatures::default(),
    )
}

async fn run_worker<W: SpiderWorker>(
    store: &MemoryStore,
    fetcher: &MockFetcher,
    worker: &mut W,
) -> ScraperResult<crate::core::SessionReport> {
    let crawler = Crawler::open(Arc::new(store.connect()), browser(fetcher)).await?;
    crawler.run(worker).await
}

#[tokio::test]
async fn test_search_session_end_to_end() {
    let store = MemoryStore::new();
    let fetcher = tampon_pages();
    let mut worker = SearchSpiderWorker::new(SpiderConfig::default()).with_keywords(["tampon"]);

    let report = run_worker(&store, &fetcher, &mut worker).await.unwrap();

    assert_eq!(report.state, WorkerState::Terminal);
    assert!(!report.aborted);
    assert_eq!(report.updated.len(), 4);
    assert_eq!(fetcher.fetch_count(), 2);
    assert!(fetcher.is_closed());

    let mut asins = store.identifiers().await.unwrap();
    asins.sort();
    assert_eq!(
        asins,
        vec!["B07Q2SNNBH", "B082VVRKTP", "B0C1234567", "B0D7654321"]
    );

    let record = store.find_product("B082VVRKTP").await.unwrap().unwrap();
    assert_eq!(record.title.as_deref(), Some("Tampax Compak Regular"));
    assert_eq!(record.stage(), Some(ScrapeStage::Discovered));
    let metadata = record.metadata.unwrap();
    assert_eq!(metadata.last_session_id, report.session_id);
    assert_eq!(metadata.scraper_versions.search, Some(SEARCH_SCRAPER_VERSION));

    let logs = store.session_logs().await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].id, report.session_id);
    assert_eq!(logs[0].action_type, "Search Page Scraping");
    assert_eq!(logs[0].info.update_count, 4);
    assert_eq!(
        logs[0].info.context.get("query_keywords"),
        Some(&serde_json::json!(["tampon"]))
    );
}

#[tokio::test]
async fn test_seen_identifier_is_not_rediscovered() {
    let store = MemoryStore::new();
    let fetcher = tampon_pages();
    let mut worker = SearchSpiderWorker::new(SpiderConfig::default())
        .with_keywords(["tampon"])
        .with_seen(["B082VVRKTP"]);

    let report = run_worker(&store, &fetcher, &mut worker).await.unwrap();

    assert_eq!(report.updated.len(), 3);
    assert!(!report.updated.contains(&"B082VVRKTP".to_string()));
    assert!(store.find_product("B082VVRKTP").await.unwrap().is_none());
}

#[tokio::test]
async fn test_stored_identifiers_count_as_seen() {
    let store = MemoryStore::new();
    store
        .upsert_product(&ProductRecord::new("B07Q2SNNBH"))
        .await
        .unwrap();
    let fetcher = tampon_pages();
    let mut worker = SearchSpiderWorker::new(SpiderConfig::default()).with_keywords(["tampon"]);

    let report = run_worker(&store, &fetcher, &mut worker).await.unwrap();

    assert_eq!(report.updated.len(), 3);
    let untouched = store.find_product("B07Q2SNNBH").await.unwrap().unwrap();
    assert_eq!(untouched.metadata, None);
}

#[tokio::test]
async fn test_antirobot_aborts_remaining_queue() {
    let store = MemoryStore::new();
    let fetcher = tampon_pages()
        .with_page(
            "https://www.amazon.fr/s?k=cup",
            "<html><head><title>Nos excuses</title></head></html>",
        )
        .with_page(
            "https://www.amazon.fr/s?k=serviette",
            results_page(&[("B0E0000001", "Serviettes")], None),
        );
    let mut worker = SearchSpiderWorker::new(SpiderConfig::default())
        .with_keywords(["tampon", "cup", "serviette"]);

    let report = run_worker(&store, &fetcher, &mut worker).await.unwrap();

    assert!(report.aborted);
    assert_eq!(report.queued, 3);
    assert_eq!(report.updated.len(), 4);
    assert_eq!(report.stats.antirobot_hits, 1);

    let visited: Vec<String> = fetcher.fetched().iter().map(|u| u.to_string()).collect();
    assert_eq!(visited.len(), 3);
    assert!(!visited.iter().any(|u| u.contains("serviette")));
    assert!(store.find_product("B0E0000001").await.unwrap().is_none());

    let logs = store.session_logs().await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].info.update_count, 4);
    assert_eq!(
        logs[0].info.message.as_deref(),
        Some("aborted: anti-bot check triggered")
    );
    assert!(fetcher.is_closed());
}

#[tokio::test]
async fn test_blocked_first_page_persists_nothing() {
    let store = MemoryStore::new();
    let fetcher = MockFetcher::new().with_page(
        "https://www.amazon.fr/s?k=tampon",
        "<html><head><title>Amazon.fr - Robot Check</title></head></html>",
    );
    let mut worker = SearchSpiderWorker::new(SpiderConfig::default()).with_keywords(["tampon"]);

    let report = run_worker(&store, &fetcher, &mut worker).await.unwrap();

    assert!(report.aborted);
    assert!(report.updated.is_empty());
    assert_eq!(fetcher.fetch_count(), 1);
    assert_eq!(store.session_logs().await.unwrap()[0].info.update_count, 0);
}

const PRODUCT_PAGE: &str = r#"<html><head><title>Amazon.fr : Tampax</title></head><body>
  <span id="productTitle">Tampax Compak Regular</span>
  <a id="bylineInfo">Marque : Tampax</a>
  <div class="apexPriceToPay"><span class="a-offscreen">4,99 €</span></div>
  <a data-hook="see-all-reviews-link-foot" href="/product-reviews/B082VVRKTP/ref=cm">Tous</a>
</body></html>"#;

const REVIEW_PAGE: &str = r#"<html><head><title>Amazon.fr : Commentaires</title></head><body>
  <div data-hook="review">
    <i data-hook="review-star-rating"><span class="a-icon-alt">4,0 sur 5 étoiles</span></i>
    <span data-hook="review-date">Commenté en France le 3 mars 2023</span>
    <span data-hook="review-body">Pratique</span>
  </div>
</body></html>"#;

#[tokio::test]
async fn test_stages_advance_and_never_regress() {
    let store = MemoryStore::new();
    let fetcher = tampon_pages()
        .with_page("https://www.amazon.fr/dp/B082VVRKTP", PRODUCT_PAGE)
        .with_page("https://www.amazon.fr/product-reviews/B082VVRKTP/ref=cm", REVIEW_PAGE);
    let config = SpiderConfig::default();

    let mut search = SearchSpiderWorker::new(config.clone()).with_keywords(["tampon"]);
    run_worker(&store, &fetcher, &mut search).await.unwrap();

    let mut product = ProductSpiderWorker::new(config.clone());
    let report = run_worker(&store, &fetcher, &mut product).await.unwrap();
    assert_eq!(report.updated.len(), 4);

    let record = store.find_product("B082VVRKTP").await.unwrap().unwrap();
    assert_eq!(record.stage(), Some(ScrapeStage::DetailScraped));
    assert_eq!(record.price, Some(4.99));
    assert_eq!(record.brand.as_deref(), Some("Tampax"));
    assert_eq!(record.title.as_deref(), Some("Tampax Compak Regular"));
    assert!(record.thumbnail.is_some());

    let mut reviews = ReviewSpiderWorker::new(config.clone()).with_asins(["B082VVRKTP"]);
    run_worker(&store, &fetcher, &mut reviews).await.unwrap();

    let record = store.find_product("B082VVRKTP").await.unwrap().unwrap();
    assert_eq!(record.stage(), Some(ScrapeStage::ReviewScraped));
    let stored_reviews = record.reviews.unwrap();
    assert_eq!(stored_reviews.len(), 1);
    assert_eq!(stored_reviews[0].rating, Some(4));
    assert_eq!(stored_reviews[0].location.as_deref(), Some("France"));

    let mut again = ProductSpiderWorker::new(config).with_asins(["B082VVRKTP"]);
    run_worker(&store, &fetcher, &mut again).await.unwrap();

    let record = store.find_product("B082VVRKTP").await.unwrap().unwrap();
    assert_eq!(record.stage(), Some(ScrapeStage::ReviewScraped));
    let versions = record.metadata.unwrap().scraper_versions;
    assert_eq!(versions.search, Some(SEARCH_SCRAPER_VERSION));
    assert_eq!(versions.product, Some(PRODUCT_SCRAPER_VERSION));
    assert_eq!(versions.review, Some(REVIEW_SCRAPER_VERSION));

    let ids: Vec<u64> = store
        .session_logs()
        .await
        .unwrap()
        .iter()
        .map(|log| log.id)
        .collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_review_worker_queries_detail_stage_only() {
    let store = MemoryStore::new();
    let fetcher = tampon_pages();
    let mut search = SearchSpiderWorker::new(SpiderConfig::default()).with_keywords(["tampon"]);
    run_worker(&store, &fetcher, &mut search).await.unwrap();

    let mut reviews = ReviewSpiderWorker::new(SpiderConfig::default());
    let report = run_worker(&store, &fetcher, &mut reviews).await.unwrap();

    assert_eq!(report.queued, 0);
    assert!(report.updated.is_empty());
}

/// Persists its entry, then fails or panics on the entry named `boom`.
struct FaultyWorker {
    panic: bool,
}

#[async_trait]
impl SpiderWorker for FaultyWorker {
    type Entry = String;

    fn action_type(&self) -> &str {
        "Faulty"
    }

    async fn query(&mut self, _store: &dyn CatalogStore) -> ScraperResult<Vec<String>> {
        Ok(vec!["B012345678".to_string(), "boom".to_string(), "B087654321".to_string()])
    }

    async fn process(
        &mut self,
        entry: &String,
        ctx: &mut WorkerContext<'_>,
    ) -> ScraperResult<EntryOutcome> {
        if entry == "boom" {
            if self.panic {
                panic!("parser exploded");
            }
            return Err(ScraperError::ExtractionError("unexpected markup".to_string()));
        }
        ctx.persist(ProductRecord::new(entry.as_str()), ScrapeStage::Discovered, 1)
            .await?;
        Ok(EntryOutcome::Completed)
    }
}

#[tokio::test]
async fn test_log_and_close_after_processing_error() {
    let store = MemoryStore::new();
    let fetcher = MockFetcher::new();
    let mut worker = FaultyWorker { panic: false };

    let result = run_worker(&store, &fetcher, &mut worker).await;

    assert!(matches!(result, Err(ScraperError::ExtractionError(_))));
    assert!(fetcher.is_closed());
    let logs = store.session_logs().await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].info.updated_asins, vec!["B012345678"]);
    assert_eq!(
        logs[0].info.message.as_deref(),
        Some("failed: Extraction error: unexpected markup")
    );
}

#[tokio::test]
async fn test_log_and_close_after_panic() {
    let store = MemoryStore::new();
    let fetcher = MockFetcher::new();
    let handle = store.connect();
    let crawler = Crawler::open(Arc::new(handle.clone()), browser(&fetcher))
        .await
        .unwrap();
    let mut worker = FaultyWorker { panic: true };

    let outcome = AssertUnwindSafe(crawler.run(&mut worker)).catch_unwind().await;

    assert!(outcome.is_err());
    assert!(fetcher.is_closed());
    assert!(handle.is_closed());
    let logs = store.session_logs().await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].info.update_count, 1);
    assert_eq!(logs[0].info.message.as_deref(), Some("failed: worker panicked"));
}

/// A store whose backend is never reachable.
#[derive(Default)]
struct UnreachableStore {
    closed: AtomicBool,
}

#[async_trait]
impl CatalogStore for UnreachableStore {
    async fn check_connection(&self) -> StorageResult<()> {
        Err(StorageError::Connection("connection refused".to_string()))
    }

    async fn next_session_id(&self) -> StorageResult<u64> {
        Err(StorageError::Connection("connection refused".to_string()))
    }

    async fn upsert_product(&self, _record: &ProductRecord) -> StorageResult<()> {
        Err(StorageError::Connection("connection refused".to_string()))
    }

    async fn find_product(&self, _asin: &str) -> StorageResult<Option<ProductRecord>> {
        Err(StorageError::Connection("connection refused".to_string()))
    }

    async fn identifiers(&self) -> StorageResult<Vec<String>> {
        Err(StorageError::Connection("connection refused".to_string()))
    }

    async fn products_at_stage(&self, _stage: ScrapeStage) -> StorageResult<Vec<ProductRecord>> {
        Err(StorageError::Connection("connection refused".to_string()))
    }

    async fn products(&self) -> StorageResult<Vec<ProductRecord>> {
        Err(StorageError::Connection("connection refused".to_string()))
    }

    async fn append_session_log(&self, _entry: &SessionLog) -> StorageResult<()> {
        Err(StorageError::Connection("connection refused".to_string()))
    }

    async fn session_logs(&self) -> StorageResult<Vec<SessionLog>> {
        Err(StorageError::Connection("connection refused".to_string()))
    }

    async fn close(&self) -> StorageResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_unreachable_store_is_fatal_at_init() {
    let store = Arc::new(UnreachableStore::default());
    let fetcher = MockFetcher::new();

    let result = Crawler::open(store.clone(), browser(&fetcher)).await;

    match result {
        Err(e) => assert!(e.is_fatal()),
        Ok(_) => panic!("opening against an unreachable store must fail"),
    }
    assert!(store.closed.load(Ordering::SeqCst));
    assert!(fetcher.is_closed());
    assert_eq!(fetcher.fetch_count(), 0);
}
