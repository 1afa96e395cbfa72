use std::path::PathBuf;
use std::sync::Arc;

use catalogcrawl::core::config::{AntiBotSignatures, DEFAULT_BASE_URL};
use catalogcrawl::fetcher::{CaptchaSolver, NoCaptchaSolver, RemoteCaptchaSolver};
use catalogcrawl::storage::export::{export_products, export_reviews, snapshot};
use catalogcrawl::storage::MemoryStore;
use catalogcrawl::{
    create_store, BrowserSession, CatalogStore, Crawler, HttpFetcher, ProductSpiderWorker,
    ReviewSpiderWorker, ScraperError, ScraperResult, SearchSpiderWorker, SessionReport,
    SpiderConfig, SpiderWorker, StatsTracker, StoreType,
};
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use url::Url;

#[derive(Parser)]
#[command(name = "catalogcrawl")]
#[command(about = "Stage-based crawler for storefront search, product and review pages")]
#[command(version)]
struct Cli {
    /// Catalog backend
    #[arg(long, global = true, value_enum, default_value = "disk")]
    store: StoreKind,

    /// Directory of the disk store
    #[arg(long, global = true, default_value = "data")]
    data_path: PathBuf,

    #[arg(long, global = true, env = "MONGODB_URI")]
    mongodb_uri: Option<String>,

    #[arg(long, global = true, default_value = "amazon")]
    database: String,

    /// Endpoint of the CAPTCHA solving service
    #[arg(long, global = true, env = "CAPTCHA_SOLVER_URL")]
    solver_url: Option<Url>,

    #[arg(long, global = true, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Extra page-title fragment marking an anti-bot block (repeatable)
    #[arg(long = "block-title", global = true)]
    block_titles: Vec<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    Memory,
    Disk,
    Mongo,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover products from search keywords
    Search {
        /// Keyword to search for (repeatable, defaults to the built-in set)
        #[arg(short, long = "keyword")]
        keywords: Vec<String>,
        #[arg(long)]
        max_pages: Option<usize>,
    },

    /// Scrape detail pages of discovered products
    Product {
        /// Product identifier to scrape instead of querying the store
        #[arg(short, long = "asin")]
        asins: Vec<String>,
    },

    /// Scrape reviews of products with known details
    Review {
        #[arg(short, long = "asin")]
        asins: Vec<String>,
        #[arg(long)]
        max_pages: Option<usize>,
    },

    /// Run search, product and review stages in order
    All {
        #[arg(long)]
        max_pages: Option<usize>,
    },

    /// Write product and review CSV exports
    Export {
        #[arg(long, default_value = "products.csv")]
        products: PathBuf,
        #[arg(long, default_value = "reviews.csv")]
        reviews: PathBuf,
    },

    /// Dump every record as JSON
    Snapshot {
        #[arg(default_value = "catalog.json")]
        path: PathBuf,
    },
}

/// Hands out one store handle per stage; each crawler closes its own.
struct Stores {
    kind: StoreKind,
    data_path: PathBuf,
    #[cfg_attr(not(feature = "mongodb"), allow(dead_code))]
    mongodb_uri: Option<String>,
    #[cfg_attr(not(feature = "mongodb"), allow(dead_code))]
    database: String,
    memory: MemoryStore,
}

impl Stores {
    async fn open(&self) -> ScraperResult<Arc<dyn CatalogStore>> {
        match self.kind {
            StoreKind::Memory => Ok(Arc::new(self.memory.connect())),
            StoreKind::Disk => {
                create_store(StoreType::Disk {
                    path: self.data_path.clone(),
                })
                .await
            }
            StoreKind::Mongo => self.open_mongo().await,
        }
    }

    #[cfg(feature = "mongodb")]
    async fn open_mongo(&self) -> ScraperResult<Arc<dyn CatalogStore>> {
        let connection_string = self.mongodb_uri.clone().ok_or_else(|| {
            ScraperError::ConfigError("--mongodb-uri or MONGODB_URI is required".to_string())
        })?;
        create_store(StoreType::Mongo {
            connection_string,
            database: self.database.clone(),
        })
        .await
    }

    #[cfg(not(feature = "mongodb"))]
    async fn open_mongo(&self) -> ScraperResult<Arc<dyn CatalogStore>> {
        Err(ScraperError::ConfigError(
            "built without the mongodb feature".to_string(),
        ))
    }
}

struct Session {
    stores: Stores,
    solver_url: Option<Url>,
    stats: StatsTracker,
}

impl Session {
    fn browser(&self, config: &SpiderConfig) -> ScraperResult<BrowserSession> {
        let fetcher = HttpFetcher::new(config)?.with_stats(self.stats.clone());
        let solver: Arc<dyn CaptchaSolver> = match &self.solver_url {
            Some(endpoint) => Arc::new(RemoteCaptchaSolver::new(endpoint.clone())),
            None => Arc::new(NoCaptchaSolver),
        };
        Ok(BrowserSession::new(Box::new(fetcher), solver, config.antibot.clone())
            .with_stats(self.stats.clone()))
    }

    async fn run_stage<W: SpiderWorker>(
        &self,
        config: &SpiderConfig,
        mut worker: W,
    ) -> ScraperResult<SessionReport> {
        let browser = self.browser(config)?;
        let store = self.stores.open().await?;
        let crawler = Crawler::open(store, browser).await?;
        let report = crawler.run(&mut worker).await?;
        println!(
            "Session {} ({}): {} records updated{}",
            report.session_id,
            report.action_type,
            report.updated.len(),
            if report.aborted {
                ", aborted by anti-bot check"
            } else {
                ""
            }
        );
        Ok(report)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };
    env_logger::builder()
        .filter_level(level)
        .filter_module("selectors", log::LevelFilter::Warn)
        .filter_module("html5ever", log::LevelFilter::Error)
        .parse_default_env()
        .init();

    let mut config = SpiderConfig::default().with_base_url(&cli.base_url)?;
    if !cli.block_titles.is_empty() {
        let mut signatures = AntiBotSignatures::default();
        signatures.contains.extend(cli.block_titles);
        config = config.with_antibot_signatures(signatures);
    }
    let session = Session {
        stores: Stores {
            kind: cli.store,
            data_path: cli.data_path,
            mongodb_uri: cli.mongodb_uri,
            database: cli.database,
            memory: MemoryStore::new(),
        },
        solver_url: cli.solver_url,
        stats: StatsTracker::new(),
    };

    match cli.command {
        Commands::Search {
            keywords,
            max_pages,
        } => {
            let config = config.with_max_pages(max_pages);
            let mut worker = SearchSpiderWorker::new(config.clone());
            if !keywords.is_empty() {
                worker = worker.with_keywords(keywords);
            }
            session.run_stage(&config, worker).await?;
        }
        Commands::Product { asins } => {
            let mut worker = ProductSpiderWorker::new(config.clone());
            if !asins.is_empty() {
                worker = worker.with_asins(asins);
            }
            session.run_stage(&config, worker).await?;
        }
        Commands::Review { asins, max_pages } => {
            let config = config.with_max_pages(max_pages);
            let mut worker = ReviewSpiderWorker::new(config.clone());
            if !asins.is_empty() {
                worker = worker.with_asins(asins);
            }
            session.run_stage(&config, worker).await?;
        }
        Commands::All { max_pages } => {
            let config = config.with_max_pages(max_pages);
            let report = session
                .run_stage(&config, SearchSpiderWorker::new(config.clone()))
                .await?;
            if report.aborted {
                warn!("Search stage was blocked, skipping product and review stages");
            } else {
                let report = session
                    .run_stage(&config, ProductSpiderWorker::new(config.clone()))
                    .await?;
                if report.aborted {
                    warn!("Product stage was blocked, skipping review stage");
                } else {
                    session
                        .run_stage(&config, ReviewSpiderWorker::new(config.clone()))
                        .await?;
                }
            }
        }
        Commands::Export { products, reviews } => {
            let store = session.stores.open().await?;
            let product_count = export_products(store.as_ref(), &products).await?;
            let review_count = export_reviews(store.as_ref(), &reviews).await?;
            store.close().await?;
            println!(
                "Exported {} products to {} and {} reviews to {}",
                product_count,
                products.display(),
                review_count,
                reviews.display()
            );
            return Ok(());
        }
        Commands::Snapshot { path } => {
            let store = session.stores.open().await?;
            let count = snapshot(store.as_ref(), &path).await?;
            store.close().await?;
            println!("Saved {} records to {}", count, path.display());
            return Ok(());
        }
    }

    info!("Crawl finished");
    session.stats.finish();
    session.stats.print_summary();
    Ok(())
}
