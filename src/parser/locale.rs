//! Cleanup of the French storefront's numbers, labels and dates.

use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

const MONTHS: [(&str, &str); 12] = [
    ("janvier", "January"),
    ("février", "February"),
    ("mars", "March"),
    ("avril", "April"),
    ("mai", "May"),
    ("juin", "June"),
    ("juillet", "July"),
    ("août", "August"),
    ("septembre", "September"),
    ("octobre", "October"),
    ("novembre", "November"),
    ("décembre", "December"),
];

const BYLINE_PREFIXES: [&str; 7] = ["Évalué", "Évaluté", "Commenté", "en", "aux", "au", "à"];

fn leading_number() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(\d+(?:[.,]\d+)?)").expect("valid number regex"))
}

fn byline_separator() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\sle\s").expect("valid byline regex"))
}

fn is_space(c: char) -> bool {
    c.is_whitespace() || c == '\u{a0}' || c == '\u{202f}'
}

/// `"12,99 €"` -> `12.99`. Thousands separators (spaces, or dots when a
/// decimal comma is present) are dropped.
pub fn parse_price(raw: &str) -> Option<f64> {
    let mut cleaned: String = raw
        .chars()
        .filter(|c| !is_space(*c) && *c != '€')
        .collect();
    if cleaned.ends_with("EUR") {
        cleaned.truncate(cleaned.len() - 3);
    }
    if cleaned.contains(',') {
        cleaned = cleaned.replace('.', "").replace(',', ".");
    }
    cleaned.parse::<f64>().ok()
}

/// `"1 234 évaluations"` -> `1234`.
pub fn parse_count(raw: &str) -> Option<u64> {
    let digits: String = raw
        .chars()
        .take_while(|c| !c.is_alphabetic())
        .filter(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Reads the leading numeral of a label such as `"4,5 sur 5 étoiles"`.
pub fn parse_rating(raw: &str) -> Option<f64> {
    let caps = leading_number().captures(raw)?;
    caps[1].replace(',', ".").parse().ok()
}

/// Star rating of a single review, integer part only.
pub fn parse_review_rating(raw: &str) -> Option<u8> {
    let rating = parse_rating(raw)?.trunc();
    (1.0..=5.0).contains(&rating).then_some(rating as u8)
}

/// `"12 unités"` -> `12`. Anything not counted in units is ignored.
pub fn parse_units(raw: &str) -> Option<u32> {
    if !raw.to_lowercase().contains("unité") {
        return None;
    }
    let first = raw.split(is_space).find(|token| !token.is_empty())?;
    let value: f64 = first.replace(',', ".").parse().ok()?;
    (value >= 0.0).then_some(value.trunc() as u32)
}

/// `"3 mars 2023"` or `"1er janvier 2022"`.
pub fn parse_french_date(raw: &str) -> Option<NaiveDate> {
    let tokens: Vec<&str> = raw.split(is_space).filter(|t| !t.is_empty()).collect();
    let [day, month, year] = tokens[..] else {
        return None;
    };
    let day = day.strip_suffix("er").unwrap_or(day);
    let month = month.to_lowercase();
    let (_, english) = MONTHS.iter().find(|(fr, _)| *fr == month)?;
    NaiveDate::parse_from_str(&format!("{} {} {}", day, english, year), "%d %B %Y").ok()
}

/// Splits `"Commenté en France le 3 mars 2023"` into the reviewer location
/// and the review date.
pub fn split_review_byline(raw: &str) -> (Option<String>, Option<NaiveDate>) {
    let mut parts = byline_separator().splitn(raw.trim(), 2);
    let (Some(origin), Some(date)) = (parts.next(), parts.next()) else {
        return (None, None);
    };

    let location = origin
        .split(is_space)
        .filter(|t| !t.is_empty())
        .skip_while(|t| BYLINE_PREFIXES.contains(t))
        .collect::<Vec<_>>()
        .join(" ");
    let location = (!location.is_empty()).then_some(location);

    (location, parse_french_date(date))
}

/// True when the title mentions any blocklisted keyword.
pub fn is_filtered<'a, I>(title: &str, blocklist: I) -> bool
where
    I: IntoIterator<Item = &'a String>,
{
    let title = title.to_lowercase();
    blocklist
        .into_iter()
        .any(|keyword| title.contains(&keyword.to_lowercase()))
}
