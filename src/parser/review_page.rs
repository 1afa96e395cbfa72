use scraper::{Html, Selector};
use std::sync::OnceLock;
use url::Url;

use super::locale::{parse_review_rating, split_review_byline};
use super::{css, first_attr, first_text, resolve};
use crate::storage::Review;

struct Selectors {
    card: Selector,
    rating: Selector,
    title: Selector,
    original_title: Selector,
    byline: Selector,
    body: Selector,
    next: Selector,
}

fn selectors() -> &'static Selectors {
    static SELECTORS: OnceLock<Selectors> = OnceLock::new();
    SELECTORS.get_or_init(|| Selectors {
        card: css(r#"div[data-hook="review"]"#),
        rating: css(
            r#"i[data-hook="review-star-rating"] span, i[data-hook="cmps-review-star-rating"] span"#,
        ),
        title: css(r#"a[data-hook="review-title"] span:not([class])"#),
        original_title: css(r#"span[data-hook="review-title"] > span.cr-original-review-content"#),
        byline: css(r#"span[data-hook="review-date"]"#),
        body: css(r#"span[data-hook="review-body"]"#),
        next: css("li.a-last a[href]"),
    })
}

pub fn extract(document: &Html) -> Vec<Review> {
    let sel = selectors();
    document
        .select(&sel.card)
        .map(|card| {
            let (location, date) = first_text(card, &sel.byline)
                .map(|byline| split_review_byline(&byline))
                .unwrap_or((None, None));
            Review {
                body: first_text(card, &sel.body),
                rating: first_text(card, &sel.rating).and_then(|r| parse_review_rating(&r)),
                title: first_text(card, &sel.title)
                    .or_else(|| first_text(card, &sel.original_title)),
                location,
                date,
            }
        })
        .collect()
}

pub fn next_page_url(document: &Html, base: &Url) -> Option<Url> {
    first_attr(document.root_element(), &selectors().next, "href")
        .and_then(|href| resolve(base, &href))
}
