use scraper::{Html, Selector};
use std::sync::OnceLock;
use url::Url;

use super::{css, first_attr, first_text, resolve};

/// One listing card of a search results page.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCard {
    pub asin: String,
    pub title: Option<String>,
    pub thumbnail: Option<Url>,
}

struct Selectors {
    results: Selector,
    card: Selector,
    title: Selector,
    image: Selector,
    next: Selector,
}

fn selectors() -> &'static Selectors {
    static SELECTORS: OnceLock<Selectors> = OnceLock::new();
    SELECTORS.get_or_init(|| Selectors {
        results: css(r#"span[data-component-type="s-search-results"]"#),
        card: css("div[data-asin]"),
        title: css("h2 span"),
        image: css("img.s-image"),
        next: css("a.s-pagination-next[href]"),
    })
}

/// Cards inside the results frame. Sponsored rows without an identifier are
/// skipped.
pub fn extract(document: &Html, base: &Url) -> Vec<SearchCard> {
    let sel = selectors();
    let Some(frame) = document.select(&sel.results).next() else {
        return Vec::new();
    };

    frame
        .select(&sel.card)
        .filter_map(|card| {
            let asin = card.value().attr("data-asin")?.trim();
            if asin.is_empty() {
                return None;
            }
            Some(SearchCard {
                asin: asin.to_string(),
                title: first_text(card, &sel.title),
                thumbnail: first_attr(card, &sel.image, "src").and_then(|src| resolve(base, &src)),
            })
        })
        .collect()
}

pub fn next_page_url(document: &Html, base: &Url) -> Option<Url> {
    first_attr(document.root_element(), &selectors().next, "href")
        .and_then(|href| resolve(base, &href))
}
