//! Flat exports of the catalog for the dashboard and CSV consumers.

use chrono::NaiveDate;
use log::info;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use super::types::ProductRecord;
use super::CatalogStore;
use crate::ScraperResult;

const BULLET_SEPARATOR: &str = " | ";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductRow {
    pub asin: String,
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub brand: Option<String>,
    pub price: Option<f64>,
    pub avg_rating: Option<f64>,
    pub num_reviews: Option<u64>,
    pub feature_bullets: Option<String>,
    pub unities: Option<u32>,
    pub category: Option<String>,
}

impl From<&ProductRecord> for ProductRow {
    fn from(record: &ProductRecord) -> Self {
        Self {
            asin: record.asin.clone(),
            title: record.title.clone(),
            thumbnail: record.thumbnail.as_ref().map(|u| u.to_string()),
            brand: record.brand.clone(),
            price: record.price,
            avg_rating: record.avg_rating,
            num_reviews: record.num_reviews,
            feature_bullets: record
                .feature_bullets
                .as_ref()
                .map(|bullets| bullets.join(BULLET_SEPARATOR)),
            unities: record.unities,
            category: record.category.clone(),
        }
    }
}

/// One embedded review, joined back to its product by identifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewRow {
    pub asin: String,
    pub rating: Option<u8>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub location: Option<String>,
    pub date: Option<NaiveDate>,
}

pub fn product_rows(records: &[ProductRecord]) -> Vec<ProductRow> {
    records.iter().map(ProductRow::from).collect()
}

pub fn review_rows(records: &[ProductRecord]) -> Vec<ReviewRow> {
    records
        .iter()
        .flat_map(|record| {
            record.reviews.iter().flatten().map(move |review| ReviewRow {
                asin: record.asin.clone(),
                rating: review.rating,
                title: review.title.clone(),
                body: review.body.clone(),
                location: review.location.clone(),
                date: review.date,
            })
        })
        .collect()
}

pub fn write_csv<W: Write, R: Serialize>(writer: W, rows: &[R]) -> ScraperResult<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub async fn export_products(store: &dyn CatalogStore, path: &Path) -> ScraperResult<usize> {
    let rows = product_rows(&store.products().await?);
    write_csv(File::create(path)?, &rows)?;
    info!("Exported {} products to {}", rows.len(), path.display());
    Ok(rows.len())
}

pub async fn export_reviews(store: &dyn CatalogStore, path: &Path) -> ScraperResult<usize> {
    let rows = review_rows(&store.products().await?);
    write_csv(File::create(path)?, &rows)?;
    info!("Exported {} reviews to {}", rows.len(), path.display());
    Ok(rows.len())
}

/// Dumps every record, metadata included, as a JSON array.
pub async fn snapshot(store: &dyn CatalogStore, path: &Path) -> ScraperResult<usize> {
    let records = store.products().await?;
    std::fs::write(path, serde_json::to_string_pretty(&records)?)?;
    info!("Snapshot of {} records saved to {}", records.len(), path.display());
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::Review;

    fn catalog() -> Vec<ProductRecord> {
        vec![
            ProductRecord {
                price: Some(12.99),
                feature_bullets: Some(vec!["Bio".into(), "Sans parfum".into()]),
                reviews: Some(vec![
                    Review {
                        rating: Some(5),
                        title: Some("Top".into()),
                        date: NaiveDate::from_ymd_opt(2023, 3, 3),
                        ..Default::default()
                    },
                    Review {
                        rating: Some(2),
                        ..Default::default()
                    },
                ]),
                ..ProductRecord::new("B012345678")
            },
            ProductRecord::new("B087654321"),
            ProductRecord {
                reviews: Some(vec![Review {
                    body: Some("Bien".into()),
                    ..Default::default()
                }]),
                ..ProductRecord::new("B011111111")
            },
        ]
    }

    #[test]
    fn test_review_rows_flatten_per_review() {
        let rows = review_rows(&catalog());
        let asins: Vec<_> = rows.iter().map(|r| r.asin.as_str()).collect();
        assert_eq!(asins, vec!["B012345678", "B012345678", "B011111111"]);
        assert_eq!(rows[0].rating, Some(5));
        assert_eq!(rows[2].body.as_deref(), Some("Bien"));
    }

    #[test]
    fn test_product_rows_join_bullets() {
        let rows = product_rows(&catalog());
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].feature_bullets.as_deref(), Some("Bio | Sans parfum"));
        assert_eq!(rows[1].feature_bullets, None);
    }

    #[test]
    fn test_review_csv_has_identifier_first() {
        let mut out = Vec::new();
        write_csv(&mut out, &review_rows(&catalog())).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();

        assert_eq!(lines.next(), Some("asin,rating,title,body,location,date"));
        assert_eq!(lines.next(), Some("B012345678,5,Top,,,2023-03-03"));
        assert_eq!(text.lines().count(), 4);
    }
}
