use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

use super::{FormSubmission, Page, PageFetcher};
use crate::{ScraperError, ScraperResult};

#[derive(Debug, Clone)]
pub struct MockPage {
    pub status: u16,
    pub html: String,
}

impl MockPage {
    pub fn ok(html: impl Into<String>) -> Self {
        Self {
            status: 200,
            html: html.into(),
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    pages: HashMap<String, MockPage>,
    history: Vec<Url>,
    submissions: Vec<FormSubmission>,
    closed: bool,
}

/// Scripted fetcher keyed by absolute URL. Clones share the same script and
/// history, so a test can keep one handle while the session owns another.
#[derive(Debug, Clone, Default)]
pub struct MockFetcher {
    state: Arc<Mutex<MockState>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, html: impl Into<String>) -> Self {
        self.with_response(url, MockPage::ok(html))
    }

    pub fn with_response(self, url: &str, page: MockPage) -> Self {
        self.state.lock().pages.insert(url.to_string(), page);
        self
    }

    pub fn fetched(&self) -> Vec<Url> {
        self.state.lock().history.clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.state.lock().history.len()
    }

    pub fn submissions(&self) -> Vec<FormSubmission> {
        self.state.lock().submissions.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn respond(&self, url: &Url) -> ScraperResult<Page> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(ScraperError::ConnectionError(
                "mock session already closed".to_string(),
            ));
        }
        state.history.push(url.clone());
        let page = state
            .pages
            .get(url.as_str())
            .cloned()
            .unwrap_or(MockPage {
                status: 404,
                html: String::new(),
            });
        Ok(Page::new(url.clone(), page.status, page.html))
    }
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn fetch(&mut self, url: &Url) -> ScraperResult<Page> {
        self.respond(url)
    }

    /// Answers with whatever page is scripted for the form action, query
    /// string ignored.
    async fn submit_form(&mut self, form: &FormSubmission) -> ScraperResult<Page> {
        self.state.lock().submissions.push(form.clone());
        let mut action = form.action.clone();
        action.set_query(None);
        self.respond(&action)
    }

    async fn close(&mut self) -> ScraperResult<()> {
        self.state.lock().closed = true;
        Ok(())
    }
}
