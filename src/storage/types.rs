use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::OnceLock;
use url::Url;

/// How far a record has progressed through the crawl. Ordering follows the
/// stage sequence, so `max` never regresses a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ScrapeStage {
    #[serde(rename = "SearchPage")]
    Discovered,
    #[serde(rename = "ProductPage")]
    DetailScraped,
    #[serde(rename = "ReviewPage")]
    ReviewScraped,
}

impl ScrapeStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeStage::Discovered => "SearchPage",
            ScrapeStage::DetailScraped => "ProductPage",
            ScrapeStage::ReviewScraped => "ReviewPage",
        }
    }

    /// This stage and every later one.
    pub fn at_or_after(&self) -> Vec<ScrapeStage> {
        [
            ScrapeStage::Discovered,
            ScrapeStage::DetailScraped,
            ScrapeStage::ReviewScraped,
        ]
        .into_iter()
        .filter(|stage| stage >= self)
        .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScraperVersions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<u32>,
}

impl ScraperVersions {
    pub fn for_stage(stage: ScrapeStage, version: u32) -> Self {
        let mut versions = Self::default();
        match stage {
            ScrapeStage::Discovered => versions.search = Some(version),
            ScrapeStage::DetailScraped => versions.product = Some(version),
            ScrapeStage::ReviewScraped => versions.review = Some(version),
        }
        versions
    }

    fn merge(&mut self, other: &ScraperVersions) {
        if other.search.is_some() {
            self.search = other.search;
        }
        if other.product.is_some() {
            self.product = other.product;
        }
        if other.review.is_some() {
            self.review = other.review;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub last_session_id: u64,
    pub last_session_time: DateTime<Utc>,
    pub scrap_status: ScrapeStage,
    #[serde(default)]
    pub scraper_versions: ScraperVersions,
}

impl ItemMetadata {
    /// Session fields follow the newer write; the stage only moves forward.
    pub fn merge(&mut self, incoming: &ItemMetadata) {
        self.last_session_id = incoming.last_session_id;
        self.last_session_time = incoming.last_session_time;
        self.scrap_status = self.scrap_status.max(incoming.scrap_status);
        self.scraper_versions.merge(&incoming.scraper_versions);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Review {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

/// One catalog document. Any field other than `asin` may be absent; an
/// absent field in an upsert leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub asin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_reviews: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_bullets: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unities: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_url: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviews: Option<Vec<Review>>,
    #[serde(
        rename = "_metadata",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub metadata: Option<ItemMetadata>,
}

fn asin_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^B0[A-Z0-9]{8}$").expect("valid asin pattern"))
}

/// Catalog identifiers are ten uppercase alphanumerics starting with `B0`.
pub fn is_valid_asin(asin: &str) -> bool {
    asin_pattern().is_match(asin)
}

impl ProductRecord {
    pub fn new(asin: impl Into<String>) -> Self {
        Self {
            asin: asin.into(),
            ..Default::default()
        }
    }

    pub fn stage(&self) -> Option<ScrapeStage> {
        self.metadata.as_ref().map(|m| m.scrap_status)
    }

    /// Folds an incoming partial record into this one.
    pub fn merge(&mut self, incoming: ProductRecord) {
        fn take<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        take(&mut self.title, incoming.title);
        take(&mut self.thumbnail, incoming.thumbnail);
        take(&mut self.brand, incoming.brand);
        take(&mut self.price, incoming.price);
        take(&mut self.avg_rating, incoming.avg_rating);
        take(&mut self.num_reviews, incoming.num_reviews);
        take(&mut self.feature_bullets, incoming.feature_bullets);
        take(&mut self.unities, incoming.unities);
        take(&mut self.category, incoming.category);
        take(&mut self.review_url, incoming.review_url);
        take(&mut self.reviews, incoming.reviews);

        if let Some(incoming) = incoming.metadata {
            match self.metadata.as_mut() {
                Some(current) => current.merge(&incoming),
                None => self.metadata = Some(incoming),
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionLogInfo {
    pub update_count: usize,
    #[serde(default)]
    pub updated_asins: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Stage-specific context such as the query keywords.
    #[serde(flatten)]
    pub context: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionLog {
    pub id: u64,
    pub time: DateTime<Utc>,
    pub action_type: String,
    pub info: SessionLogInfo,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

impl ProductFilter {
    pub fn matches(&self, record: &ProductRecord) -> bool {
        if let Some(category) = &self.category {
            if record.category.as_deref() != Some(category.as_str()) {
                return false;
            }
        }
        if self.min_price.is_none() && self.max_price.is_none() {
            return true;
        }
        let Some(price) = record.price else {
            return false;
        };
        self.min_price.map_or(true, |min| price >= min)
            && self.max_price.map_or(true, |max| price <= max)
    }
}
