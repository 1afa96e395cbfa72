use async_trait::async_trait;
use log::{debug, info, warn};
use std::collections::HashSet;
use url::Url;

use crate::fetcher::{BrowserSession, Page, Visit};
use crate::ScraperResult;

/// What one page yielded: its items and where to go next.
#[derive(Debug, Clone)]
pub struct ParsedPage<T> {
    pub items: Vec<T>,
    pub next_page: Option<Url>,
}

impl<T> ParsedPage<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_page: None,
        }
    }
}

/// Bookkeeping shared by every per-target scraper.
#[derive(Debug, Clone)]
pub struct ScrapeState<T> {
    pub data: Vec<T>,
    /// Sticky: once the interstitial has been seen it stays set.
    pub antirobot: bool,
    pub starting_url: Url,
    pub max_pages: Option<usize>,
    pub pages: usize,
    /// Every URL fetched so far; a pagination link back into it ends the run.
    pub visited: HashSet<Url>,
}

impl<T> ScrapeState<T> {
    pub fn new(starting_url: Url, max_pages: Option<usize>) -> Self {
        Self {
            data: Vec::new(),
            antirobot: false,
            starting_url,
            max_pages,
            pages: 0,
            visited: HashSet::new(),
        }
    }

    fn page_cap_reached(&self) -> bool {
        self.max_pages.is_some_and(|max| self.pages >= max)
    }
}

/// Drives one target (a keyword, a product, a product's reviews) through
/// its pages on a single browser session.
#[async_trait]
pub trait ItemScraper: Send {
    type Item: Send;
    type Output;

    fn state(&self) -> &ScrapeState<Self::Item>;

    fn state_mut(&mut self) -> &mut ScrapeState<Self::Item>;

    /// Pure extraction over a fetched page.
    fn parse(&mut self, page: &Page) -> ParsedPage<Self::Item>;

    /// Accumulated results, whether or not the run was valid.
    fn dump(self) -> Self::Output;

    async fn run(&mut self, session: &mut BrowserSession) -> ScraperResult<()> {
        let mut current = Some(self.state().starting_url.clone());

        while let Some(url) = current.take() {
            if self.state().antirobot {
                break;
            }
            if self.state().page_cap_reached() {
                debug!("Page cap reached before {}", url);
                break;
            }

            let visit = session.visit(&url).await?;
            self.state_mut().pages += 1;
            self.state_mut().visited.insert(url.clone());

            let page = match visit {
                Visit::Blocked(_) => {
                    warn!("Anti-bot check triggered on {}", url);
                    self.state_mut().antirobot = true;
                    break;
                }
                Visit::Ready(page) => page,
            };

            let parsed = self.parse(&page);
            info!(
                "Scraped page {} of {} ({} items)",
                self.state().pages,
                self.state().starting_url,
                parsed.items.len()
            );
            self.state_mut().data.extend(parsed.items);

            current = match parsed.next_page {
                Some(next) if self.state().visited.contains(&next) => {
                    debug!("Pagination of {} loops back to {}", url, next);
                    None
                }
                next => next,
            };
        }

        Ok(())
    }

    fn validate(&self) -> bool {
        !self.state().antirobot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::AntiBotSignatures;
    use crate::fetcher::{MockFetcher, NoCaptchaSolver};
    use std::sync::Arc;

    /// Follows `<a id="next">` links and yields one item per page title.
    struct TitleScraper {
        state: ScrapeState<String>,
    }

    impl ItemScraper for TitleScraper {
        type Item = String;
        type Output = Vec<String>;

        fn state(&self) -> &ScrapeState<String> {
            &self.state
        }

        fn state_mut(&mut self) -> &mut ScrapeState<String> {
            &mut self.state
        }

        fn parse(&mut self, page: &Page) -> ParsedPage<String> {
            let next = page
                .html
                .split("href=\"")
                .nth(1)
                .and_then(|rest| rest.split('"').next())
                .and_then(|href| page.url.join(href).ok());
            ParsedPage {
                items: vec![page.title.clone()],
                next_page: next,
            }
        }

        fn dump(self) -> Vec<String> {
            self.state.data
        }
    }

    fn chain() -> MockFetcher {
        MockFetcher::new()
            .with_page(
                "https://www.amazon.fr/p1",
                r#"<title>one</title><a id="next" href="/p2">"#,
            )
            .with_page(
                "https://www.amazon.fr/p2",
                r#"<title>two</title><a id="next" href="/p3">"#,
            )
            .with_page("https://www.amazon.fr/p3", "<title>three</title>")
    }

    fn session(fetcher: &MockFetcher) -> BrowserSession {
        BrowserSession::new(
            Box::new(fetcher.clone()),
            Arc::new(NoCaptchaSolver),
            AntiBotSignatures::default(),
        )
    }

    fn scraper(max_pages: Option<usize>) -> TitleScraper {
        TitleScraper {
            state: ScrapeState::new(Url::parse("https://www.amazon.fr/p1").unwrap(), max_pages),
        }
    }

    #[tokio::test]
    async fn test_follows_pagination_to_the_end() {
        let fetcher = chain();
        let mut scraper = scraper(None);
        scraper.run(&mut session(&fetcher)).await.unwrap();

        assert!(scraper.validate());
        assert_eq!(scraper.dump(), vec!["one", "two", "three"]);
        assert_eq!(fetcher.fetch_count(), 3);
    }

    #[tokio::test]
    async fn test_pagination_cycle_terminates() {
        let fetcher = MockFetcher::new()
            .with_page(
                "https://www.amazon.fr/p1",
                r#"<title>one</title><a id="next" href="/p2">"#,
            )
            .with_page(
                "https://www.amazon.fr/p2",
                r#"<title>two</title><a id="next" href="/p1">"#,
            );
        let mut scraper = scraper(None);
        scraper.run(&mut session(&fetcher)).await.unwrap();

        assert!(scraper.validate());
        assert_eq!(scraper.dump(), vec!["one", "two"]);
        assert_eq!(fetcher.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_page_cap() {
        let fetcher = chain();
        let mut scraper = scraper(Some(2));
        scraper.run(&mut session(&fetcher)).await.unwrap();

        assert_eq!(scraper.dump(), vec!["one", "two"]);
        assert_eq!(fetcher.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_antirobot_flag_is_sticky() {
        let fetcher = chain().with_page("https://www.amazon.fr/p2", "<title>Nos excuses</title>");
        let mut browser = session(&fetcher);
        let mut scraper = scraper(None);

        scraper.run(&mut browser).await.unwrap();
        assert!(!scraper.validate());
        assert_eq!(fetcher.fetch_count(), 2);

        scraper.run(&mut browser).await.unwrap();
        assert!(!scraper.validate());
        assert_eq!(fetcher.fetch_count(), 2);
        assert_eq!(scraper.dump(), vec!["one"]);
    }
}
