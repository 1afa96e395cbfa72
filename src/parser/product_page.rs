use scraper::{Html, Selector};
use std::sync::OnceLock;
use url::Url;

use super::locale::{parse_count, parse_price, parse_rating, parse_units};
use super::{css, first_attr, first_text, resolve, text_of};
use crate::storage::ProductRecord;

/// Fields read from a product detail page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductDetails {
    pub title: Option<String>,
    pub brand: Option<String>,
    pub price: Option<f64>,
    pub avg_rating: Option<f64>,
    pub num_reviews: Option<u64>,
    pub feature_bullets: Option<Vec<String>>,
    pub unities: Option<u32>,
    pub category: Option<String>,
    pub review_url: Option<Url>,
}

impl ProductDetails {
    pub fn is_empty(&self) -> bool {
        *self == ProductDetails::default()
    }

    pub fn into_record(self, asin: impl Into<String>) -> ProductRecord {
        ProductRecord {
            title: self.title,
            brand: self.brand,
            price: self.price,
            avg_rating: self.avg_rating,
            num_reviews: self.num_reviews,
            feature_bullets: self.feature_bullets,
            unities: self.unities,
            category: self.category,
            review_url: self.review_url,
            ..ProductRecord::new(asin)
        }
    }
}

struct Selectors {
    title: Selector,
    byline: Selector,
    prices: [Selector; 3],
    rating: Selector,
    num_reviews: Selector,
    bullets: Selector,
    spec_rows: Selector,
    th: Selector,
    td: Selector,
    review_link: Selector,
    breadcrumbs: Selector,
}

fn selectors() -> &'static Selectors {
    static SELECTORS: OnceLock<Selectors> = OnceLock::new();
    SELECTORS.get_or_init(|| Selectors {
        title: css("#productTitle"),
        byline: css("#bylineInfo"),
        prices: [
            css(".apexPriceToPay .a-offscreen"),
            css(r#"div[data-feature-name="corePriceDisplay_desktop"] .aok-offscreen"#),
            css(r#"div[data-feature-name="corePriceDisplay_desktop"] .a-offscreen"#),
        ],
        rating: css("#acrPopover"),
        num_reviews: css("#acrCustomerReviewText"),
        bullets: css("#feature-bullets span.a-list-item"),
        spec_rows: css("#productDetails_techSpec_section_1 tr"),
        th: css("th"),
        td: css("td"),
        review_link: css(r#"a[data-hook="see-all-reviews-link-foot"]"#),
        breadcrumbs: css("#wayfinding-breadcrumbs_feature_div li a"),
    })
}

fn price(document: &Html, sel: &Selectors) -> Option<f64> {
    sel.prices.iter().find_map(|selector| {
        document
            .select(selector)
            .map(text_of)
            .find_map(|text| parse_price(&text))
    })
}

fn unities(document: &Html, sel: &Selectors) -> Option<u32> {
    document.select(&sel.spec_rows).find_map(|row| {
        let header = first_text(row, &sel.th)?;
        if header != "Unités" {
            return None;
        }
        parse_units(&first_text(row, &sel.td)?)
    })
}

/// Everything recognisable on a detail page, or `None` when the page
/// carries none of it.
pub fn extract(document: &Html, base: &Url) -> Option<ProductDetails> {
    let sel = selectors();
    let root = document.root_element();

    let bullets: Vec<String> = document
        .select(&sel.bullets)
        .map(text_of)
        .filter(|b| !b.is_empty())
        .collect();

    let details = ProductDetails {
        title: first_text(root, &sel.title),
        brand: first_text(root, &sel.byline)
            .and_then(|line| line.split_whitespace().last().map(str::to_string)),
        price: price(document, sel),
        avg_rating: first_attr(root, &sel.rating, "title").and_then(|t| parse_rating(&t)),
        num_reviews: first_text(root, &sel.num_reviews).and_then(|t| parse_count(&t)),
        feature_bullets: (!bullets.is_empty()).then_some(bullets),
        unities: unities(document, sel),
        category: document.select(&sel.breadcrumbs).map(text_of).last(),
        review_url: first_attr(root, &sel.review_link, "href").and_then(|h| resolve(base, &h)),
    };

    (!details.is_empty()).then_some(details)
}
