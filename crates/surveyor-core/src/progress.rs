//! Progress events streamed to create() callers.

use crate::crawler::{CrawlUpdate, ResourceCounts};
use crate::store::IndexStatus;
use serde::{Deserialize, Serialize};

/// One element of the progress stream for a running crawl.
///
/// Ordering: events are delivered in the order the crawl produced them; the
/// terminal event (`is_final == true`) is always last and carries the
/// committed status and final message. It is sent at most once, and only
/// after the terminal status has been committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub id: i64,
    pub phase: String,
    pub counts: ResourceCounts,
    pub is_final: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<IndexStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_message: Option<String>,
}

impl Progress {
    pub fn running(id: i64, update: CrawlUpdate) -> Self {
        Self {
            id,
            phase: update.phase,
            counts: update.counts,
            is_final: false,
            status: None,
            final_message: None,
        }
    }

    pub fn terminal(
        id: i64,
        counts: ResourceCounts,
        status: IndexStatus,
        final_message: String,
    ) -> Self {
        Self {
            id,
            phase: "done".to_string(),
            counts,
            is_final: true,
            status: Some(status),
            final_message: Some(final_message),
        }
    }
}
