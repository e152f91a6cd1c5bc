//! Crawl collaborator interface.
//!
//! The actual resource/policy graph crawler is an external collaborator: an
//! opaque long-running function that reports progress through a callback and
//! eventually succeeds, partially succeeds, or fails. The lifecycle manager
//! only depends on the [`Crawler`] trait.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Item counts accumulated by a crawl so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCounts {
    pub resources: u64,
    pub warnings: u64,
    pub errors: u64,
}

/// One progress report from a running crawl.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlUpdate {
    pub phase: String,
    pub counts: ResourceCounts,
}

/// Terminal outcome of a crawl body that did not raise.
///
/// Whether a degraded run counts as `Partial` rather than an error is the
/// crawler's own policy; the manager does not second-guess it and never
/// retries.
#[derive(Debug, Clone, PartialEq)]
pub enum CrawlOutcome {
    Complete(ResourceCounts),
    Partial {
        counts: ResourceCounts,
        reason: String,
    },
}

impl CrawlOutcome {
    pub fn counts(&self) -> ResourceCounts {
        match self {
            CrawlOutcome::Complete(counts) => *counts,
            CrawlOutcome::Partial { counts, .. } => *counts,
        }
    }
}

/// A long-running crawl/import body.
///
/// `import_target` names the destination model the result should populate;
/// `None` means crawl only. Implementations call `report` as work proceeds;
/// updates are delivered to stream consumers in the order reported.
pub trait Crawler: Send + Sync + 'static {
    fn crawl(
        &self,
        import_target: Option<&str>,
        report: &mut dyn FnMut(CrawlUpdate),
    ) -> Result<CrawlOutcome>;
}

/// A crawler that replays a fixed sequence of updates and a fixed outcome.
///
/// Deterministic stand-in used by the test suites and by the server binary
/// until a cloud provider importer is plugged in.
pub struct ScriptedCrawler {
    updates: Vec<CrawlUpdate>,
    outcome: fn() -> Result<CrawlOutcome>,
}

impl ScriptedCrawler {
    pub fn new(updates: Vec<CrawlUpdate>, outcome: fn() -> Result<CrawlOutcome>) -> Self {
        Self { updates, outcome }
    }

    /// A crawl that walks two phases and completes successfully.
    pub fn completing(resources: u64) -> Self {
        Self::new(
            vec![
                CrawlUpdate {
                    phase: "discovering".to_string(),
                    counts: ResourceCounts::default(),
                },
                CrawlUpdate {
                    phase: "crawling".to_string(),
                    counts: ResourceCounts {
                        resources,
                        ..Default::default()
                    },
                },
            ],
            || {
                Ok(CrawlOutcome::Complete(ResourceCounts {
                    resources: 0,
                    warnings: 0,
                    errors: 0,
                }))
            },
        )
    }
}

impl Crawler for ScriptedCrawler {
    fn crawl(
        &self,
        _import_target: Option<&str>,
        report: &mut dyn FnMut(CrawlUpdate),
    ) -> Result<CrawlOutcome> {
        let mut last = ResourceCounts::default();
        for update in &self.updates {
            last = update.counts;
            report(update.clone());
        }
        match (self.outcome)() {
            Ok(CrawlOutcome::Complete(counts)) if counts == ResourceCounts::default() => {
                // Convenience: an unspecified outcome count inherits the
                // last reported counts.
                Ok(CrawlOutcome::Complete(last))
            }
            other => other,
        }
    }
}
