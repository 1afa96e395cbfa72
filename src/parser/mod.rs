pub mod locale;
pub mod product_page;
pub mod review_page;
pub mod search_page;

use scraper::{ElementRef, Selector};
use url::Url;

pub use product_page::ProductDetails;
pub use search_page::SearchCard;

pub(crate) fn css(selector: &str) -> Selector {
    Selector::parse(selector).expect("static selector is valid")
}

/// Whitespace-normalised text content of an element.
pub(crate) fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text of the first match under `scope`, `None` when missing or blank.
pub(crate) fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope
        .select(selector)
        .next()
        .map(text_of)
        .filter(|text| !text.is_empty())
}

pub(crate) fn first_attr(
    scope: ElementRef<'_>,
    selector: &Selector,
    attr: &str,
) -> Option<String> {
    scope
        .select(selector)
        .find_map(|e| e.value().attr(attr))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Resolves a possibly relative link against the site origin.
pub(crate) fn resolve(base: &Url, href: &str) -> Option<Url> {
    base.join(href.trim()).ok()
}
