use log::{debug, info, warn};
use scraper::Selector;
use std::sync::{Arc, OnceLock};
use url::Url;

use super::{CaptchaSolver, FormMethod, FormSubmission, Page, PageFetcher};
use crate::core::config::AntiBotSignatures;
use crate::{ScraperResult, StatsTracker};

const CAPTCHA_FIELD: &str = "field-keywords";

/// Outcome of navigating to a URL once the guards have run.
#[derive(Debug, Clone)]
pub enum Visit {
    /// The anti-bot interstitial was served. The crawling identity is burned.
    Blocked(Page),
    /// Content page. A failed CAPTCHA solve still lands here.
    Ready(Page),
}

impl Visit {
    pub fn page(&self) -> &Page {
        match self {
            Visit::Blocked(page) | Visit::Ready(page) => page,
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Visit::Blocked(_))
    }
}

struct Challenge {
    image: Option<Url>,
    form: FormSubmission,
    solution_field: String,
}

struct Selectors {
    form: Selector,
    image: Selector,
    hidden: Selector,
    solution: Selector,
}

fn selectors() -> &'static Selectors {
    static SELECTORS: OnceLock<Selectors> = OnceLock::new();
    SELECTORS.get_or_init(|| Selectors {
        form: Selector::parse(r#"form[action="/errors/validateCaptcha"]"#)
            .expect("valid captcha form selector"),
        image: Selector::parse("img[src]").expect("valid image selector"),
        hidden: Selector::parse(r#"input[type="hidden"][name]"#).expect("valid hidden selector"),
        solution: Selector::parse("input#captchacharacters").expect("valid solution selector"),
    })
}

fn find_challenge(page: &Page) -> Option<Challenge> {
    let document = page.document();
    let sel = selectors();
    let form = document.select(&sel.form).next()?;

    let action = form
        .value()
        .attr("action")
        .and_then(|href| page.url.join(href).ok())?;
    let method = match form.value().attr("method") {
        Some(m) if m.eq_ignore_ascii_case("post") => FormMethod::Post,
        _ => FormMethod::Get,
    };
    let image = form
        .select(&sel.image)
        .next()
        .or_else(|| document.select(&sel.image).next())
        .and_then(|img| img.value().attr("src"))
        .and_then(|src| page.url.join(src).ok());
    let fields = form
        .select(&sel.hidden)
        .filter_map(|input| {
            let name = input.value().attr("name")?;
            let value = input.value().attr("value").unwrap_or_default();
            Some((name.to_string(), value.to_string()))
        })
        .collect();
    let solution_field = form
        .select(&sel.solution)
        .next()
        .and_then(|input| input.value().attr("name"))
        .unwrap_or(CAPTCHA_FIELD)
        .to_string();

    Some(Challenge {
        image,
        form: FormSubmission {
            action,
            method,
            fields,
        },
        solution_field,
    })
}

/// One browsing identity: a fetcher, the solver it may call, and the
/// signatures that reveal it has been blocked.
pub struct BrowserSession {
    fetcher: Box<dyn PageFetcher>,
    solver: Arc<dyn CaptchaSolver>,
    antibot: AntiBotSignatures,
    stats: StatsTracker,
}

impl BrowserSession {
    pub fn new(
        fetcher: Box<dyn PageFetcher>,
        solver: Arc<dyn CaptchaSolver>,
        antibot: AntiBotSignatures,
    ) -> Self {
        Self {
            fetcher,
            solver,
            antibot,
            stats: StatsTracker::new(),
        }
    }

    pub fn with_stats(mut self, stats: StatsTracker) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> &StatsTracker {
        &self.stats
    }

    /// Navigates to `url`, then checks for the anti-bot interstitial and
    /// for a CAPTCHA challenge, in that order.
    pub async fn visit(&mut self, url: &Url) -> ScraperResult<Visit> {
        let page = self.fetcher.fetch(url).await?;
        if self.antibot.matches(&page.title) {
            return Ok(self.blocked(page));
        }

        let Some(challenge) = find_challenge(&page) else {
            return Ok(Visit::Ready(page));
        };

        let page = self.solve_once(page, challenge).await;
        if self.antibot.matches(&page.title) {
            return Ok(self.blocked(page));
        }
        Ok(Visit::Ready(page))
    }

    pub async fn close(&mut self) -> ScraperResult<()> {
        debug!("Closing browser session");
        self.fetcher.close().await
    }

    fn blocked(&self, page: Page) -> Visit {
        warn!("Anti-bot page served for {} (title {:?})", page.url, page.title);
        self.stats.record_antirobot();
        Visit::Blocked(page)
    }

    async fn solve_once(&mut self, page: Page, challenge: Challenge) -> Page {
        info!("Captcha challenge on {}", page.url);
        let Some(image) = challenge.image else {
            warn!("Captcha form on {} has no image", page.url);
            self.stats.record_captcha(false);
            return page;
        };

        let solution = match self.solver.solve(&image).await {
            Ok(solution) => solution,
            Err(e) => {
                warn!("Captcha not solved: {}", e);
                self.stats.record_captcha(false);
                return page;
            }
        };

        let mut form = challenge.form;
        form.fields.push((challenge.solution_field, solution));
        match self.fetcher.submit_form(&form).await {
            Ok(next) => {
                let solved = find_challenge(&next).is_none();
                if !solved {
                    warn!("Captcha still present after submission on {}", next.url);
                }
                self.stats.record_captcha(solved);
                next
            }
            Err(e) => {
                warn!("Captcha submission failed: {}", e);
                self.stats.record_captcha(false);
                page
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::{MockFetcher, NoCaptchaSolver};
    use async_trait::async_trait;

    struct FixedSolver(&'static str);

    #[async_trait]
    impl CaptchaSolver for FixedSolver {
        async fn solve(&self, _image_url: &Url) -> ScraperResult<String> {
            Ok(self.0.to_string())
        }
    }

    const CAPTCHA_PAGE: &str = r#"<html><head><title>Amazon.fr</title></head><body>
        <form method="get" action="/errors/validateCaptcha">
          <input type="hidden" name="amzn" value="tok3n">
          <input type="hidden" name="amzn-r" value="/dp/B012345678">
          <img src="https://images-na.ssl-images-amazon.com/captcha/x.jpg">
          <input id="captchacharacters" name="field-keywords" type="text">
        </form></body></html>"#;

    const PRODUCT_PAGE: &str =
        "<html><head><title>Amazon.fr : Coupe menstruelle</title></head><body></body></html>";

    fn session(fetcher: &MockFetcher, solver: Arc<dyn CaptchaSolver>) -> BrowserSession {
        BrowserSession::new(
            Box::new(fetcher.clone()),
            solver,
            AntiBotSignatures::default(),
        )
    }

    #[tokio::test]
    async fn test_blocked_page_is_reported() {
        let fetcher = MockFetcher::new().with_page(
            "https://www.amazon.fr/s?k=tampon",
            "<title>Nos excuses</title>",
        );
        let mut session = session(&fetcher, Arc::new(NoCaptchaSolver));

        let url = Url::parse("https://www.amazon.fr/s?k=tampon").unwrap();
        let visit = session.visit(&url).await.unwrap();

        assert!(visit.is_blocked());
        assert_eq!(session.stats().get_stats().antirobot_hits, 1);
    }

    #[tokio::test]
    async fn test_captcha_solved_once_and_submitted() {
        let fetcher = MockFetcher::new()
            .with_page("https://www.amazon.fr/dp/B012345678", CAPTCHA_PAGE)
            .with_page("https://www.amazon.fr/errors/validateCaptcha", PRODUCT_PAGE);
        let mut session = session(&fetcher, Arc::new(FixedSolver("KXMPRT")));

        let url = Url::parse("https://www.amazon.fr/dp/B012345678").unwrap();
        let visit = session.visit(&url).await.unwrap();

        assert!(!visit.is_blocked());
        assert_eq!(visit.page().title, "Amazon.fr : Coupe menstruelle");

        let submissions = fetcher.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].method, FormMethod::Get);
        assert_eq!(
            submissions[0].fields,
            vec![
                ("amzn".to_string(), "tok3n".to_string()),
                ("amzn-r".to_string(), "/dp/B012345678".to_string()),
                ("field-keywords".to_string(), "KXMPRT".to_string()),
            ]
        );
        let stats = session.stats().get_stats();
        assert_eq!((stats.captchas_seen, stats.captchas_solved), (1, 1));
    }

    #[tokio::test]
    async fn test_failed_solve_is_soft() {
        let fetcher =
            MockFetcher::new().with_page("https://www.amazon.fr/dp/B012345678", CAPTCHA_PAGE);
        let mut session = session(&fetcher, Arc::new(NoCaptchaSolver));

        let url = Url::parse("https://www.amazon.fr/dp/B012345678").unwrap();
        let visit = session.visit(&url).await.unwrap();

        assert!(matches!(visit, Visit::Ready(_)));
        assert!(fetcher.submissions().is_empty());
        assert_eq!(fetcher.fetch_count(), 1);
        assert_eq!(session.stats().get_stats().captchas_solved, 0);
    }

    #[tokio::test]
    async fn test_page_after_captcha_is_rechecked() {
        let fetcher = MockFetcher::new()
            .with_page("https://www.amazon.fr/dp/B012345678", CAPTCHA_PAGE)
            .with_page(
                "https://www.amazon.fr/errors/validateCaptcha",
                "<title>Robot Check</title>",
            );
        let mut session = session(&fetcher, Arc::new(FixedSolver("WRONG")));

        let url = Url::parse("https://www.amazon.fr/dp/B012345678").unwrap();
        assert!(session.visit(&url).await.unwrap().is_blocked());
    }

    #[tokio::test]
    async fn test_close_releases_fetcher() {
        let fetcher = MockFetcher::new();
        let mut session = session(&fetcher, Arc::new(NoCaptchaSolver));
        session.close().await.unwrap();
        assert!(fetcher.is_closed());
    }
}
