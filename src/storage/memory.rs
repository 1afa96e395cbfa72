use async_trait::async_trait;
use log::{debug, trace};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::base::{CatalogStore, StorageError, StorageResult};
use super::types::{ProductRecord, ScrapeStage, SessionLog};

/// The three collections, shared by the in-memory and on-disk stores.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub(crate) struct CatalogState {
    #[serde(default)]
    pub items: BTreeMap<String, ProductRecord>,
    #[serde(default)]
    pub session_logs: Vec<SessionLog>,
    #[serde(default)]
    pub log_counter: u64,
}

impl CatalogState {
    pub fn next_session_id(&mut self) -> u64 {
        self.log_counter += 1;
        self.log_counter
    }

    pub fn upsert(&mut self, record: &ProductRecord) {
        match self.items.get_mut(&record.asin) {
            Some(stored) => {
                trace!("Merging into existing record {}", record.asin);
                stored.merge(record.clone());
            }
            None => {
                trace!("Inserting new record {}", record.asin);
                self.items.insert(record.asin.clone(), record.clone());
            }
        }
    }

    pub fn at_stage(&self, stage: ScrapeStage) -> Vec<ProductRecord> {
        self.items
            .values()
            .filter(|record| record.stage() == Some(stage))
            .cloned()
            .collect()
    }
}

/// A process-local store. Clones made with [`MemoryStore::connect`] share
/// the collections but each has its own open/closed state, like separate
/// connections to one database.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<CatalogState>>,
    closed: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.is_closed() {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn check_connection(&self) -> StorageResult<()> {
        self.ensure_open()
    }

    async fn next_session_id(&self) -> StorageResult<u64> {
        self.ensure_open()?;
        let id = self.state.lock().next_session_id();
        debug!("Issued session id {}", id);
        Ok(id)
    }

    async fn upsert_product(&self, record: &ProductRecord) -> StorageResult<()> {
        self.ensure_open()?;
        self.state.lock().upsert(record);
        Ok(())
    }

    async fn find_product(&self, asin: &str) -> StorageResult<Option<ProductRecord>> {
        self.ensure_open()?;
        Ok(self.state.lock().items.get(asin).cloned())
    }

    async fn identifiers(&self) -> StorageResult<Vec<String>> {
        self.ensure_open()?;
        Ok(self.state.lock().items.keys().cloned().collect())
    }

    async fn products_at_stage(&self, stage: ScrapeStage) -> StorageResult<Vec<ProductRecord>> {
        self.ensure_open()?;
        Ok(self.state.lock().at_stage(stage))
    }

    async fn products(&self) -> StorageResult<Vec<ProductRecord>> {
        self.ensure_open()?;
        Ok(self.state.lock().items.values().cloned().collect())
    }

    async fn append_session_log(&self, entry: &SessionLog) -> StorageResult<()> {
        self.ensure_open()?;
        self.state.lock().session_logs.push(entry.clone());
        Ok(())
    }

    async fn session_logs(&self) -> StorageResult<Vec<SessionLog>> {
        self.ensure_open()?;
        Ok(self.state.lock().session_logs.clone())
    }

    async fn close(&self) -> StorageResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
