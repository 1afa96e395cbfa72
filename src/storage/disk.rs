use async_trait::async_trait;
use fs2::FileExt;
use log::{debug, info};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::base::{CatalogStore, StorageError, StorageResult};
use super::memory::CatalogState;
use super::types::{ProductRecord, ScrapeStage, SessionLog};

const CATALOG_FILE: &str = "catalog.json";
const LOCK_FILE: &str = "catalog.lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
}

/// Paths of one catalog directory. Every operation takes the lock file,
/// reloads `catalog.json`, and for writes rewrites it before unlocking, so
/// handles in different processes observe each other's changes.
#[derive(Debug)]
struct CatalogFiles {
    path: PathBuf,
    lock_path: PathBuf,
}

impl CatalogFiles {
    fn lock(&self, access: Access) -> StorageResult<File> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)?;
        match access {
            Access::Read => FileExt::lock_shared(&file)?,
            Access::Write => FileExt::lock_exclusive(&file)?,
        }
        Ok(file)
    }

    fn load(&self) -> StorageResult<CatalogState> {
        if !self.path.exists() {
            return Ok(CatalogState::default());
        }
        let raw = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Writes next to the target then renames, so a crash never leaves a
    /// truncated catalog behind.
    fn store(&self, state: &CatalogState) -> StorageResult<()> {
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(state)?)?;
        fs::rename(&tmp, &self.path)?;
        debug!("Persisted catalog to {}", self.path.display());
        Ok(())
    }

    fn with_state<T>(
        &self,
        access: Access,
        f: impl FnOnce(&mut CatalogState) -> T,
    ) -> StorageResult<T> {
        let lock = self.lock(access)?;
        let mut state = self.load()?;
        let out = f(&mut state);
        if access == Access::Write {
            self.store(&state)?;
        }
        FileExt::unlock(&lock)?;
        Ok(out)
    }
}

/// A file-backed store that keeps the whole catalog in one JSON document.
/// Safe to share between processes on the same directory.
#[derive(Debug)]
pub struct DiskStore {
    files: Arc<CatalogFiles>,
    closed: AtomicBool,
}

impl DiskStore {
    pub fn new<P: AsRef<Path>>(base_path: P) -> StorageResult<Self> {
        let base_path = base_path.as_ref();
        fs::create_dir_all(base_path).map_err(|e| {
            StorageError::Connection(format!("{}: {}", base_path.display(), e))
        })?;
        let files = CatalogFiles {
            path: base_path.join(CATALOG_FILE),
            lock_path: base_path.join(LOCK_FILE),
        };

        let (records, logs) = files.with_state(Access::Read, |state| {
            (state.items.len(), state.session_logs.len())
        })?;
        info!(
            "Opened {} with {} records and {} session logs",
            files.path.display(),
            records,
            logs
        );

        Ok(Self {
            files: Arc::new(files),
            closed: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.files.path
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }

    /// Runs `f` against a freshly loaded catalog on the blocking pool.
    async fn with_state<T, F>(&self, access: Access, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut CatalogState) -> T + Send + 'static,
    {
        self.ensure_open()?;
        let files = Arc::clone(&self.files);
        tokio::task::spawn_blocking(move || files.with_state(access, f))
            .await
            .map_err(|e| StorageError::Operation(format!("catalog task failed: {}", e)))?
    }
}

#[async_trait]
impl CatalogStore for DiskStore {
    async fn check_connection(&self) -> StorageResult<()> {
        self.ensure_open()?;
        if !self.files.path.parent().map_or(false, Path::is_dir) {
            return Err(StorageError::Connection(format!(
                "{} is not reachable",
                self.files.path.display()
            )));
        }
        Ok(())
    }

    async fn next_session_id(&self) -> StorageResult<u64> {
        let id = self
            .with_state(Access::Write, CatalogState::next_session_id)
            .await?;
        debug!("Issued session id {}", id);
        Ok(id)
    }

    async fn upsert_product(&self, record: &ProductRecord) -> StorageResult<()> {
        let record = record.clone();
        self.with_state(Access::Write, move |state| state.upsert(&record))
            .await
    }

    async fn find_product(&self, asin: &str) -> StorageResult<Option<ProductRecord>> {
        let asin = asin.to_string();
        self.with_state(Access::Read, move |state| state.items.remove(&asin))
            .await
    }

    async fn identifiers(&self) -> StorageResult<Vec<String>> {
        self.with_state(Access::Read, |state| {
            std::mem::take(&mut state.items).into_keys().collect()
        })
        .await
    }

    async fn products_at_stage(&self, stage: ScrapeStage) -> StorageResult<Vec<ProductRecord>> {
        self.with_state(Access::Read, move |state| state.at_stage(stage))
            .await
    }

    async fn products(&self) -> StorageResult<Vec<ProductRecord>> {
        self.with_state(Access::Read, |state| {
            std::mem::take(&mut state.items).into_values().collect()
        })
        .await
    }

    async fn append_session_log(&self, entry: &SessionLog) -> StorageResult<()> {
        let entry = entry.clone();
        self.with_state(Access::Write, move |state| state.session_logs.push(entry))
            .await
    }

    async fn session_logs(&self) -> StorageResult<Vec<SessionLog>> {
        self.with_state(Access::Read, |state| std::mem::take(&mut state.session_logs))
            .await
    }

    async fn close(&self) -> StorageResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
