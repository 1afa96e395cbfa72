use async_trait::async_trait;
use futures::TryStreamExt;
use log::{debug, info};
use mongodb::bson::{self, doc, Bson, Document};
use mongodb::options::{IndexOptions, ReturnDocument};
use mongodb::{Client, Collection, IndexModel};
use std::sync::atomic::{AtomicBool, Ordering};

use super::base::{CatalogStore, StorageError, StorageResult};
use super::types::{ProductRecord, ScrapeStage, SessionLog};

const ITEM_COLLECTION: &str = "items";
const LOG_COLLECTION: &str = "session_logs";
const COUNTER_COLLECTION: &str = "log_counters";
const COUNTER_ID: &str = "log_counter";

pub struct MongoStore {
    client: Client,
    database_name: String,
    items: Collection<Document>,
    logs: Collection<Document>,
    counters: Collection<Document>,
    closed: AtomicBool,
}

impl MongoStore {
    pub async fn new(connection_string: &str, database_name: &str) -> StorageResult<Self> {
        let client = Client::with_uri_str(connection_string)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let db = client.database(database_name);
        let store = Self {
            items: db.collection(ITEM_COLLECTION),
            logs: db.collection(LOG_COLLECTION),
            counters: db.collection(COUNTER_COLLECTION),
            client,
            database_name: database_name.to_string(),
            closed: AtomicBool::new(false),
        };

        store
            .items
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "asin": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        info!("Connected to MongoDB database {}", database_name);

        Ok(store)
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }

    fn decode<T: serde::de::DeserializeOwned>(mut document: Document) -> StorageResult<T> {
        document.remove("_id");
        Ok(bson::from_document(document)?)
    }

    async fn collect<T: serde::de::DeserializeOwned>(
        &self,
        collection: &Collection<Document>,
        filter: Document,
    ) -> StorageResult<Vec<T>> {
        let documents: Vec<Document> = collection.find(filter).await?.try_collect().await?;
        documents.into_iter().map(Self::decode).collect()
    }
}

/// Splits a record into a `$set` body. Metadata is set field by field so the
/// scrape stage can be advanced separately without ever moving backwards.
fn update_body(record: &ProductRecord) -> StorageResult<(Document, Option<ScrapeStage>)> {
    let mut fields = bson::to_document(record)?;
    let mut set = Document::new();
    let mut stage = None;

    if let Some(Bson::Document(metadata)) = fields.remove("_metadata") {
        for (key, value) in metadata {
            match key.as_str() {
                "scrap_status" => stage = record.stage(),
                "scraper_versions" => {
                    if let Bson::Document(versions) = value {
                        for (name, version) in versions {
                            set.insert(format!("_metadata.scraper_versions.{}", name), version);
                        }
                    }
                }
                _ => {
                    set.insert(format!("_metadata.{}", key), value);
                }
            }
        }
    }
    for (key, value) in fields {
        set.insert(key, value);
    }

    Ok((set, stage))
}

/// Matches the record only while its stored stage is missing or earlier than
/// `stage`.
fn stage_guard(asin: &str, stage: ScrapeStage) -> Document {
    let later: Vec<&str> = stage.at_or_after().iter().map(|s| s.as_str()).collect();
    doc! {
        "asin": asin,
        "_metadata.scrap_status": { "$nin": later },
    }
}

#[async_trait]
impl CatalogStore for MongoStore {
    async fn check_connection(&self) -> StorageResult<()> {
        self.ensure_open()?;
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(())
    }

    async fn next_session_id(&self) -> StorageResult<u64> {
        self.ensure_open()?;
        let counter = self
            .counters
            .find_one_and_update(
                doc! { "_id": COUNTER_ID },
                doc! { "$inc": { "count": 1_i64 } },
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await?
            .ok_or_else(|| StorageError::Operation("session counter missing".to_string()))?;

        let id = match counter.get("count") {
            Some(Bson::Int64(n)) => *n,
            Some(Bson::Int32(n)) => i64::from(*n),
            other => {
                return Err(StorageError::Operation(format!(
                    "unexpected counter value {:?}",
                    other
                )))
            }
        };
        debug!("Issued session id {} from {}", id, self.database_name);
        u64::try_from(id).map_err(|_| StorageError::Operation(format!("negative counter {}", id)))
    }

    async fn upsert_product(&self, record: &ProductRecord) -> StorageResult<()> {
        self.ensure_open()?;
        let (set, stage) = update_body(record)?;

        self.items
            .update_one(doc! { "asin": record.asin.as_str() }, doc! { "$set": set })
            .upsert(true)
            .await?;

        if let Some(stage) = stage {
            self.items
                .update_one(
                    stage_guard(&record.asin, stage),
                    doc! { "$set": { "_metadata.scrap_status": stage.as_str() } },
                )
                .await?;
        }
        Ok(())
    }

    async fn find_product(&self, asin: &str) -> StorageResult<Option<ProductRecord>> {
        self.ensure_open()?;
        self.items
            .find_one(doc! { "asin": asin })
            .await?
            .map(Self::decode)
            .transpose()
    }

    async fn contains_product(&self, asin: &str) -> StorageResult<bool> {
        self.ensure_open()?;
        Ok(self.items.count_documents(doc! { "asin": asin }).await? > 0)
    }

    async fn identifiers(&self) -> StorageResult<Vec<String>> {
        self.ensure_open()?;
        let values = self.items.distinct("asin", doc! {}).await?;
        Ok(values
            .into_iter()
            .filter_map(|value| match value {
                Bson::String(asin) => Some(asin),
                _ => None,
            })
            .collect())
    }

    async fn products_at_stage(&self, stage: ScrapeStage) -> StorageResult<Vec<ProductRecord>> {
        self.ensure_open()?;
        self.collect(&self.items, doc! { "_metadata.scrap_status": stage.as_str() })
            .await
    }

    async fn products(&self) -> StorageResult<Vec<ProductRecord>> {
        self.ensure_open()?;
        self.collect(&self.items, doc! {}).await
    }

    async fn append_session_log(&self, entry: &SessionLog) -> StorageResult<()> {
        self.ensure_open()?;
        self.logs.insert_one(bson::to_document(entry)?).await?;
        Ok(())
    }

    async fn session_logs(&self) -> StorageResult<Vec<SessionLog>> {
        self.ensure_open()?;
        self.collect(&self.logs, doc! {}).await
    }

    async fn close(&self) -> StorageResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.client.clone().shutdown().await;
            debug!("Closed MongoDB client for {}", self.database_name);
        }
        Ok(())
    }
}

impl From<bson::ser::Error> for StorageError {
    fn from(err: bson::ser::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<bson::de::Error> for StorageError {
    fn from(err: bson::de::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<mongodb::error::Error> for StorageError {
    fn from(err: mongodb::error::Error) -> Self {
        StorageError::Operation(err.to_string())
    }
}
