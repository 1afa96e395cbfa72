use chrono::{DateTime, Utc};
use futures::FutureExt;
use log::{debug, error, info, warn};
use std::panic::{resume_unwind, AssertUnwindSafe};
use std::sync::Arc;

use super::spider::{EntryOutcome, SpiderWorker, WorkerContext, WorkerProgress, WorkerState};
use crate::fetcher::BrowserSession;
use crate::stats::CrawlStats;
use crate::storage::{CatalogStore, SessionLog};
use crate::{ScraperError, ScraperResult};

/// What a finished worker run reports back to its caller.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_id: u64,
    pub action_type: String,
    pub state: WorkerState,
    pub queued: usize,
    pub updated: Vec<String>,
    pub aborted: bool,
    pub stats: CrawlStats,
}

/// Owns the store handle and the browser session for exactly one worker run.
pub struct Crawler {
    store: Arc<dyn CatalogStore>,
    browser: BrowserSession,
    session_id: u64,
    session_time: DateTime<Utc>,
    state: WorkerState,
}

impl Crawler {
    /// Verifies the store and claims a fresh session id. Failure is fatal and
    /// both resources are released before returning.
    pub async fn open(store: Arc<dyn CatalogStore>, mut browser: BrowserSession) -> ScraperResult<Self> {
        info!("Initializing crawl session");
        let claimed = async {
            store.check_connection().await?;
            store.next_session_id().await
        }
        .await;

        match claimed {
            Ok(session_id) => {
                info!("Session {} opened", session_id);
                Ok(Self {
                    store,
                    browser,
                    session_id,
                    session_time: Utc::now(),
                    state: WorkerState::Init,
                })
            }
            Err(e) => {
                error!("Catalog store unreachable: {}", e);
                if let Err(close_err) = browser.close().await {
                    warn!("Failed to close browser session: {}", close_err);
                }
                if let Err(close_err) = store.close().await {
                    warn!("Failed to close store: {}", close_err);
                }
                Err(ScraperError::ConnectionError(format!(
                    "catalog store unreachable: {}",
                    e
                )))
            }
        }
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Runs the worker to completion. The session log is written and both
    /// resources are closed on every exit path, panics included.
    pub async fn run<W: SpiderWorker>(mut self, worker: &mut W) -> ScraperResult<SessionReport> {
        info!(
            "Starting {} (session {})",
            worker.action_type(),
            self.session_id
        );
        let mut progress = WorkerProgress::default();

        let outcome = AssertUnwindSafe(self.process(worker, &mut progress))
            .catch_unwind()
            .await;

        self.state = WorkerState::LoggingAndClose;
        progress.error = match &outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some("worker panicked".to_string()),
        };
        let logged = self.write_log(worker, &progress).await;
        let closed = self.close().await;
        self.state = WorkerState::Terminal;

        let processed = match outcome {
            Ok(result) => result,
            Err(panic) => resume_unwind(panic),
        };
        processed?;
        logged?;
        closed?;

        self.browser.stats().finish();
        info!(
            "{} finished: {} records updated{}",
            worker.action_type(),
            progress.updated.len(),
            if progress.aborted { " (aborted)" } else { "" }
        );

        Ok(SessionReport {
            session_id: self.session_id,
            action_type: worker.action_type().to_string(),
            state: self.state,
            queued: progress.queued,
            updated: progress.updated,
            aborted: progress.aborted,
            stats: self.browser.stats().get_stats(),
        })
    }

    async fn process<W: SpiderWorker>(
        &mut self,
        worker: &mut W,
        progress: &mut WorkerProgress,
    ) -> ScraperResult<()> {
        self.state = WorkerState::Querying;
        let queue = worker.query(self.store.as_ref()).await?;
        progress.queued = queue.len();
        info!("Found {} entries to process", queue.len());

        let mut ctx = WorkerContext {
            store: self.store.as_ref(),
            browser: &mut self.browser,
            session_id: self.session_id,
            session_time: self.session_time,
            updated: &mut progress.updated,
        };

        for (index, entry) in queue.iter().enumerate() {
            self.state = WorkerState::Processing(index);
            debug!("Processing {:?} ({}/{})", entry, index + 1, queue.len());

            match worker.process(entry, &mut ctx).await? {
                EntryOutcome::Completed => progress.processed += 1,
                EntryOutcome::Blocked => {
                    warn!("Anti-bot detected on {:?}, aborting remaining queue", entry);
                    progress.aborted = true;
                    break;
                }
            }
        }

        Ok(())
    }

    async fn write_log<W: SpiderWorker>(
        &self,
        worker: &W,
        progress: &WorkerProgress,
    ) -> ScraperResult<()> {
        let entry = SessionLog {
            id: self.session_id,
            time: Utc::now(),
            action_type: worker.action_type().to_string(),
            info: worker.log(progress),
        };
        info!(
            "Writing session log {} ({} updates)",
            entry.id, entry.info.update_count
        );
        self.store.append_session_log(&entry).await?;
        Ok(())
    }

    async fn close(&mut self) -> ScraperResult<()> {
        let browser = self.browser.close().await;
        let store = self.store.close().await;
        if let Err(e) = &browser {
            warn!("Failed to close browser session: {}", e);
        }
        browser?;
        store?;
        Ok(())
    }
}
