use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct CrawlStats {
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub pages_fetched: usize,
    pub failed_fetches: usize,
    pub bytes_downloaded: usize,
    pub status_codes: HashMap<u16, usize>,
    pub antirobot_hits: usize,
    pub captchas_seen: usize,
    pub captchas_solved: usize,
    pub items_scraped: usize,
    pub items_dropped: usize,
    pub records_persisted: usize,
    pub average_response_time: f64, // in milliseconds
}

#[derive(Debug, Clone)]
pub struct StatsTracker {
    stats: Arc<RwLock<CrawlStats>>,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self {
            stats: Arc::new(RwLock::new(CrawlStats {
                start_time: Utc::now(),
                end_time: None,
                pages_fetched: 0,
                failed_fetches: 0,
                bytes_downloaded: 0,
                status_codes: HashMap::new(),
                antirobot_hits: 0,
                captchas_seen: 0,
                captchas_solved: 0,
                items_scraped: 0,
                items_dropped: 0,
                records_persisted: 0,
                average_response_time: 0.0,
            })),
        }
    }

    pub fn record_page(&self, status: u16, size: usize, duration: Duration) {
        let mut stats = self.stats.write();
        stats.pages_fetched += 1;
        *stats.status_codes.entry(status).or_insert(0) += 1;
        stats.bytes_downloaded += size;

        let current_total = stats.average_response_time * (stats.pages_fetched - 1) as f64;
        let new_duration = duration.num_milliseconds() as f64;
        stats.average_response_time = (current_total + new_duration) / stats.pages_fetched as f64;
    }

    pub fn record_failed_fetch(&self) {
        self.stats.write().failed_fetches += 1;
    }

    pub fn record_antirobot(&self) {
        self.stats.write().antirobot_hits += 1;
    }

    pub fn record_captcha(&self, solved: bool) {
        let mut stats = self.stats.write();
        stats.captchas_seen += 1;
        if solved {
            stats.captchas_solved += 1;
        }
    }

    pub fn record_items(&self, scraped: usize, dropped: usize) {
        let mut stats = self.stats.write();
        stats.items_scraped += scraped;
        stats.items_dropped += dropped;
    }

    pub fn record_persisted(&self) {
        self.stats.write().records_persisted += 1;
    }

    pub fn finish(&self) {
        self.stats.write().end_time = Some(Utc::now());
    }

    pub fn get_stats(&self) -> CrawlStats {
        self.stats.read().clone()
    }

    pub fn print_summary(&self) {
        let stats = self.stats.read();
        let duration = stats
            .end_time
            .unwrap_or_else(Utc::now)
            .signed_duration_since(stats.start_time);

        println!("\nCrawl Statistics:");
        println!("=================");
        println!("Duration: {} seconds", duration.num_seconds());
        println!("Pages Fetched: {}", stats.pages_fetched);
        println!("Failed Fetches: {}", stats.failed_fetches);
        println!(
            "Data Downloaded: {:.2} MB",
            stats.bytes_downloaded as f64 / 1_000_000.0
        );
        println!(
            "Average Response Time: {:.2}ms",
            stats.average_response_time
        );
        println!("Anti-bot Blocks: {}", stats.antirobot_hits);
        println!(
            "Captchas Solved: {}/{}",
            stats.captchas_solved, stats.captchas_seen
        );
        println!(
            "Items Scraped: {} (dropped {})",
            stats.items_scraped, stats.items_dropped
        );
        println!("Records Persisted: {}", stats.records_persisted);

        println!("\nStatus Codes:");
        for (code, count) in &stats.status_codes {
            println!("  {}: {}", code, count);
        }
    }
}

impl Default for StatsTracker {
    fn default() -> Self {
        Self::new()
    }
}
