use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use reqwest::{header, Client, ClientBuilder};
use thiserror::Error;
use url::Url;

use super::{FormMethod, FormSubmission, Page, PageFetcher};
use crate::core::config::SpiderConfig;
use crate::{ScraperError, ScraperResult, StatsTracker};

#[derive(Debug, Error)]
pub enum HttpFetcherError {
    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] header::InvalidHeaderName),
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] header::InvalidHeaderValue),
}

impl From<HttpFetcherError> for ScraperError {
    fn from(err: HttpFetcherError) -> Self {
        match err {
            HttpFetcherError::HttpError(e) => ScraperError::HttpError(e),
            other => ScraperError::ConfigError(other.to_string()),
        }
    }
}

/// A cookie-keeping HTTP session standing in for a browser tab.
pub struct HttpFetcher {
    client: Client,
    stats: StatsTracker,
    closed: bool,
}

impl HttpFetcher {
    pub fn new(config: &SpiderConfig) -> Result<Self, HttpFetcherError> {
        let mut header_map = header::HeaderMap::new();
        header_map.insert(
            header::USER_AGENT,
            header::HeaderValue::from_str(&config.user_agent)?,
        );
        for (key, value) in &config.headers {
            let name = header::HeaderName::from_bytes(key.as_bytes())?;
            let value = header::HeaderValue::from_str(value)?;
            header_map.insert(name, value);
        }

        let client = ClientBuilder::new()
            .default_headers(header_map)
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            stats: StatsTracker::new(),
            closed: false,
        })
    }

    pub fn with_stats(mut self, stats: StatsTracker) -> Self {
        self.stats = stats;
        self
    }

    async fn read_page(
        &self,
        response: reqwest::Response,
        started: DateTime<Utc>,
    ) -> ScraperResult<Page> {
        let url = response.url().clone();
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            self.stats.record_failed_fetch();
            ScraperError::HttpError(e)
        })?;

        self.stats
            .record_page(status, body.len(), Utc::now().signed_duration_since(started));
        debug!(
            "Received response: url={}, status={}, body_length={}",
            url,
            status,
            body.len()
        );
        Ok(Page::new(url, status, body))
    }

    fn ensure_open(&self) -> ScraperResult<()> {
        if self.closed {
            return Err(ScraperError::ConnectionError(
                "browser session already closed".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&mut self, url: &Url) -> ScraperResult<Page> {
        self.ensure_open()?;
        info!("Fetching URL: {}", url);
        let started = Utc::now();
        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            self.stats.record_failed_fetch();
            ScraperError::HttpError(e)
        })?;
        self.read_page(response, started).await
    }

    async fn submit_form(&mut self, form: &FormSubmission) -> ScraperResult<Page> {
        self.ensure_open()?;
        debug!("Submitting {:?} form to {}", form.method, form.action);
        let request = match form.method {
            FormMethod::Get => self.client.get(form.get_url()),
            FormMethod::Post => self.client.post(form.action.clone()).form(&form.fields),
        };
        let started = Utc::now();
        let response = request.send().await.map_err(|e| {
            self.stats.record_failed_fetch();
            ScraperError::HttpError(e)
        })?;
        self.read_page(response, started).await
    }

    async fn close(&mut self) -> ScraperResult<()> {
        self.closed = true;
        Ok(())
    }
}
