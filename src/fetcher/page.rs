use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use std::sync::OnceLock;
use url::Url;

/// A rendered page as handed back by a fetcher.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: Url,
    pub status: u16,
    pub title: String,
    pub html: String,
    pub timestamp: DateTime<Utc>,
}

fn title_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    SELECTOR.get_or_init(|| Selector::parse("title").expect("valid title selector"))
}

impl Page {
    pub fn new(url: Url, status: u16, html: impl Into<String>) -> Self {
        let html = html.into();
        let title = Html::parse_document(&html)
            .select(title_selector())
            .next()
            .map(|e| e.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        Self {
            url,
            status,
            title,
            html,
            timestamp: Utc::now(),
        }
    }

    /// Parses the markup. The returned tree is not `Send`, so callers keep it
    /// out of await points.
    pub fn document(&self) -> Html {
        Html::parse_document(&self.html)
    }
}
