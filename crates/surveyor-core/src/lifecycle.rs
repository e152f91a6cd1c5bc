//! Inventory lifecycle manager.
//!
//! Owns the state machine of an index (RUNNING → SUCCESS | PARTIAL_SUCCESS |
//! FAILURE), bridges foreground and background execution, and produces the
//! progress stream. The RUNNING row is committed before any crawl work
//! starts, so an index is listable from the moment `create` allocates it,
//! and the terminal status is committed before the final event is emitted.

use crate::crawler::{CrawlOutcome, Crawler, ResourceCounts};
use crate::db::Engine;
use crate::error::{Result, SurveyorError};
use crate::executor::TaskExecutor;
use crate::progress::Progress;
use crate::store::{IndexStatus, IndexStore, InventoryIndex};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{error, info, warn};

/// Result of a `create` call: the committed index id plus the progress
/// event stream.
///
/// Foreground creates return with the stream fully buffered and closed;
/// background creates return a live receiver the caller may poll or drain
/// while the crawl proceeds on a worker.
pub struct CreateHandle {
    pub id: i64,
    pub events: UnboundedReceiver<Progress>,
}

/// Orchestrates create/list/get/delete over the index store.
///
/// Explicitly constructed and explicitly injected: holds the storage engine
/// handle, the task executor, and the crawl collaborator, and nothing
/// per-index beyond what the store persists.
pub struct InventoryManager {
    engine: Engine,
    executor: Arc<dyn TaskExecutor>,
    crawler: Arc<dyn Crawler>,
}

impl InventoryManager {
    /// Build the manager and initialize the schema.
    pub fn new(
        engine: Engine,
        executor: Arc<dyn TaskExecutor>,
        crawler: Arc<dyn Crawler>,
    ) -> Result<Self> {
        engine.with_session(|s| IndexStore::init_schema(s))?;
        Ok(Self {
            engine,
            executor,
            crawler,
        })
    }

    /// Start a new crawl and return its progress stream.
    ///
    /// The RUNNING row is inserted and committed before any crawl work, so
    /// an error before that commit aborts the call with no row left behind.
    /// With `background == false` the crawl runs on the calling thread and
    /// this returns only after the terminal status is committed; with
    /// `background == true` the crawl is submitted to the executor and the
    /// terminal status is committed by the worker, independent of whether
    /// the caller stays attached.
    pub fn create(&self, import_target: Option<String>, background: bool) -> Result<CreateHandle> {
        let index = self
            .engine
            .with_session(|s| IndexStore::insert(s, import_target.as_deref()))?;
        let id = index.id;
        info!(id, background, "inventory index created");

        let (sender, events) = unbounded_channel();
        let engine = self.engine.clone();
        let crawler = self.crawler.clone();
        let job = move || run_crawl(&engine, crawler.as_ref(), id, import_target, &sender);

        if background {
            self.executor.submit(Box::new(job));
        } else {
            job();
        }

        Ok(CreateHandle { id, events })
    }

    /// All committed index rows, oldest first. Returns immediately
    /// regardless of any RUNNING indices.
    pub fn list(&self) -> Result<Vec<InventoryIndex>> {
        self.engine.with_session(|s| IndexStore::list(s))
    }

    pub fn get(&self, id: i64) -> Result<InventoryIndex> {
        self.engine.with_session(|s| IndexStore::get(s, id))
    }

    /// Delete a terminal index and return the removed record.
    ///
    /// Fails with `Conflict` while the index is RUNNING: a background worker
    /// may still be writing it. The status check and the removal share one
    /// immediate transaction, so the check cannot race the worker's terminal
    /// write.
    pub fn delete(&self, id: i64) -> Result<InventoryIndex> {
        self.engine.with_session(|s| {
            let index = IndexStore::get(s, id)?;
            if index.status == IndexStatus::Running {
                return Err(SurveyorError::Conflict { id });
            }
            IndexStore::delete(s, id)
        })
    }
}

/// Run the crawl body for one index and commit its terminal state.
///
/// Any error raised by the crawl is absorbed into a committed FAILURE; the
/// final event is emitted only after the terminal commit succeeds, keeping
/// the commit-then-notify ordering observable through `list`/`get`.
fn run_crawl(
    engine: &Engine,
    crawler: &dyn Crawler,
    id: i64,
    import_target: Option<String>,
    sender: &UnboundedSender<Progress>,
) {
    let mut last_counts = ResourceCounts::default();
    let outcome = crawler.crawl(import_target.as_deref(), &mut |update| {
        last_counts = update.counts;
        // A detached consumer is fine; the crawl's fate is independent.
        let _ = sender.send(Progress::running(id, update));
    });

    let (status, counts, message) = match outcome {
        Ok(CrawlOutcome::Complete(counts)) => (
            IndexStatus::Success,
            counts,
            format!(
                "inventory crawl completed: {} resources, {} warnings, {} errors",
                counts.resources, counts.warnings, counts.errors
            ),
        ),
        Ok(CrawlOutcome::Partial { counts, reason }) => (
            IndexStatus::PartialSuccess,
            counts,
            format!(
                "inventory crawl partially completed ({} resources): {}",
                counts.resources, reason
            ),
        ),
        Err(e) => (IndexStatus::Failure, last_counts, e.to_string()),
    };

    match finalize(engine, id, status, &message) {
        Ok(true) => {
            info!(id, %status, "inventory index finalized");
            let _ = sender.send(Progress::terminal(id, counts, status, message));
        }
        Ok(false) => {
            warn!(id, "inventory index already terminal, skipping finalize");
        }
        Err(e) => {
            // Terminal state was not committed, so no final event is sent;
            // the stream just ends.
            error!(id, "failed to finalize inventory index: {}", e);
        }
    }
}

/// Commit the terminal transition. Returns false if the index is already
/// terminal (or gone), so only one terminal write can ever succeed.
fn finalize(engine: &Engine, id: i64, status: IndexStatus, message: &str) -> Result<bool> {
    engine.with_session(|s| {
        let current = match IndexStore::get(s, id) {
            Ok(index) => index,
            Err(SurveyorError::NotFound { .. }) => return Ok(false),
            Err(e) => return Err(e),
        };
        if current.status.is_terminal() {
            return Ok(false);
        }
        IndexStore::update_status(s, id, status, Some(message))?;
        Ok(true)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::{CrawlUpdate, ScriptedCrawler};
    use crate::executor::ThreadPool;
    use std::sync::mpsc::{channel, Receiver, Sender};
    use std::sync::Mutex;

    /// Crawler that blocks until released, for observing the RUNNING state.
    struct GatedCrawler {
        entered: Sender<()>,
        gate: Mutex<Receiver<()>>,
    }

    impl GatedCrawler {
        fn new() -> (Self, Receiver<()>, Sender<()>) {
            let (entered_tx, entered_rx) = channel();
            let (release_tx, release_rx) = channel();
            (
                Self {
                    entered: entered_tx,
                    gate: Mutex::new(release_rx),
                },
                entered_rx,
                release_tx,
            )
        }
    }

    impl Crawler for GatedCrawler {
        fn crawl(
            &self,
            _import_target: Option<&str>,
            report: &mut dyn FnMut(CrawlUpdate),
        ) -> Result<CrawlOutcome> {
            report(CrawlUpdate {
                phase: "crawling".to_string(),
                counts: ResourceCounts::default(),
            });
            let _ = self.entered.send(());
            let _ = self.gate.lock().unwrap().recv();
            Ok(CrawlOutcome::Complete(ResourceCounts {
                resources: 1,
                ..Default::default()
            }))
        }
    }

    struct FailingCrawler;

    impl Crawler for FailingCrawler {
        fn crawl(
            &self,
            _import_target: Option<&str>,
            report: &mut dyn FnMut(CrawlUpdate),
        ) -> Result<CrawlOutcome> {
            report(CrawlUpdate {
                phase: "crawling".to_string(),
                counts: ResourceCounts {
                    resources: 2,
                    ..Default::default()
                },
            });
            Err(SurveyorError::CrawlFailure {
                message: "provider unreachable".to_string(),
            })
        }
    }

    fn manager_with(crawler: Arc<dyn Crawler>) -> InventoryManager {
        let engine = Engine::in_memory().unwrap();
        let executor = Arc::new(ThreadPool::new(2));
        InventoryManager::new(engine, executor, crawler).unwrap()
    }

    fn drain(events: &mut UnboundedReceiver<Progress>) -> Vec<Progress> {
        let mut out = Vec::new();
        while let Some(event) = events.blocking_recv() {
            out.push(event);
        }
        out
    }

    #[test]
    fn test_foreground_create_commits_terminal_before_returning() {
        let manager = manager_with(Arc::new(ScriptedCrawler::completing(3)));
        let mut handle = manager.create(None, false).unwrap();

        // Terminal status is already durable when create returns.
        let stored = manager.get(handle.id).unwrap();
        assert_eq!(stored.status, IndexStatus::Success);

        let events = drain(&mut handle.events);
        assert!(events.len() >= 3);
        let last = events.last().unwrap();
        assert!(last.is_final);
        assert_eq!(last.status, Some(IndexStatus::Success));
        assert_eq!(last.counts.resources, 3);
        assert_eq!(last.final_message.as_deref(), stored.final_message.as_deref());
        // The terminal event is the only final one.
        assert_eq!(events.iter().filter(|e| e.is_final).count(), 1);
    }

    #[test]
    fn test_create_is_listable_while_running() {
        let (crawler, entered, release) = GatedCrawler::new();
        let manager = manager_with(Arc::new(crawler));

        let mut handle = manager.create(Some("model-a".to_string()), true).unwrap();
        entered.recv().unwrap();

        // Row is visible and RUNNING with no final message.
        let listed = manager.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, handle.id);
        assert_eq!(listed[0].status, IndexStatus::Running);
        assert!(listed[0].final_message.is_none());
        assert_eq!(listed[0].import_target.as_deref(), Some("model-a"));

        release.send(()).unwrap();
        let events = drain(&mut handle.events);
        assert!(events.last().unwrap().is_final);
        assert_eq!(
            manager.get(handle.id).unwrap().status,
            IndexStatus::Success
        );
    }

    #[test]
    fn test_delete_running_index_is_conflict() {
        let (crawler, entered, release) = GatedCrawler::new();
        let manager = manager_with(Arc::new(crawler));

        let mut handle = manager.create(None, true).unwrap();
        entered.recv().unwrap();

        let err = manager.delete(handle.id).unwrap_err();
        assert!(matches!(err, SurveyorError::Conflict { .. }));

        release.send(()).unwrap();
        drain(&mut handle.events);

        // Exactly one delete succeeds once terminal.
        let removed = manager.delete(handle.id).unwrap();
        assert_eq!(removed.id, handle.id);
        let err = manager.get(handle.id).unwrap_err();
        assert!(matches!(err, SurveyorError::NotFound { .. }));
        assert!(manager.list().unwrap().is_empty());
    }

    #[test]
    fn test_crawl_failure_commits_failure_status() {
        let manager = manager_with(Arc::new(FailingCrawler));
        let mut handle = manager.create(None, false).unwrap();

        let stored = manager.get(handle.id).unwrap();
        assert_eq!(stored.status, IndexStatus::Failure);
        assert_eq!(
            stored.final_message.as_deref(),
            Some("crawl failed: provider unreachable")
        );

        // The failure is reported through the stream, not as a call error.
        let events = drain(&mut handle.events);
        let last = events.last().unwrap();
        assert!(last.is_final);
        assert_eq!(last.status, Some(IndexStatus::Failure));
        assert_eq!(last.counts.resources, 2);
    }

    #[test]
    fn test_partial_outcome_commits_partial_success() {
        let crawler = ScriptedCrawler::new(vec![], || {
            Ok(CrawlOutcome::Partial {
                counts: ResourceCounts {
                    resources: 4,
                    warnings: 0,
                    errors: 1,
                },
                reason: "one folder denied".to_string(),
            })
        });
        let manager = manager_with(Arc::new(crawler));
        let handle = manager.create(None, false).unwrap();

        let stored = manager.get(handle.id).unwrap();
        assert_eq!(stored.status, IndexStatus::PartialSuccess);
        assert!(stored
            .final_message
            .as_deref()
            .unwrap()
            .contains("one folder denied"));
    }

    #[test]
    fn test_concurrent_creates_get_distinct_ids() {
        let manager = Arc::new(manager_with(Arc::new(ScriptedCrawler::completing(1))));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let manager = manager.clone();
                std::thread::spawn(move || manager.create(None, false).unwrap().id)
            })
            .collect();
        let ids: Vec<i64> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_ne!(ids[0], ids[1]);
        for id in ids {
            assert!(manager.get(id).unwrap().status.is_terminal());
            manager.delete(id).unwrap();
        }
        assert!(manager.list().unwrap().is_empty());
    }

    #[test]
    fn test_finalize_is_single_shot() {
        let manager = manager_with(Arc::new(ScriptedCrawler::completing(1)));
        let handle = manager.create(None, false).unwrap();

        let engine = manager.engine.clone();
        let again = finalize(&engine, handle.id, IndexStatus::Failure, "late write").unwrap();
        assert!(!again);
        assert_eq!(manager.get(handle.id).unwrap().status, IndexStatus::Success);
    }
}
