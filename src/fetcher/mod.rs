pub mod captcha;
pub mod http_fetcher;
pub mod mock_fetcher;
pub mod page;
pub mod session;

use crate::ScraperResult;
use async_trait::async_trait;
use url::Url;

pub use captcha::{CaptchaSolver, NoCaptchaSolver, RemoteCaptchaSolver};
pub use http_fetcher::HttpFetcher;
pub use mock_fetcher::{MockFetcher, MockPage};
pub use page::Page;
pub use session::{BrowserSession, Visit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMethod {
    Get,
    Post,
}

/// A filled-in HTML form ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct FormSubmission {
    pub action: Url,
    pub method: FormMethod,
    pub fields: Vec<(String, String)>,
}

impl FormSubmission {
    /// The URL a GET submission navigates to.
    pub fn get_url(&self) -> Url {
        let mut url = self.action.clone();
        if !self.fields.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &self.fields {
                pairs.append_pair(name, value);
            }
        }
        url
    }
}

/// A stateful browsing session. One fetcher is driven by one worker at a
/// time, so every method takes `&mut self`.
#[async_trait]
pub trait PageFetcher: Send {
    async fn fetch(&mut self, url: &Url) -> ScraperResult<Page>;

    async fn submit_form(&mut self, form: &FormSubmission) -> ScraperResult<Page> {
        match form.method {
            FormMethod::Get => self.fetch(&form.get_url()).await,
            FormMethod::Post => Err(crate::ScraperError::ExtractionError(format!(
                "POST submission to {} is not supported by this fetcher",
                form.action
            ))),
        }
    }

    async fn close(&mut self) -> ScraperResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_url_appends_fields() {
        let form = FormSubmission {
            action: Url::parse("https://www.amazon.fr/errors/validateCaptcha").unwrap(),
            method: FormMethod::Get,
            fields: vec![
                ("amzn".to_string(), "abc=".to_string()),
                ("field-keywords".to_string(), "XKCD".to_string()),
            ],
        };
        assert_eq!(
            form.get_url().as_str(),
            "https://www.amazon.fr/errors/validateCaptcha?amzn=abc%3D&field-keywords=XKCD"
        );
    }
}
