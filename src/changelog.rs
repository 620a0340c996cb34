//! Change-log intake
//!
//! Reads change batches as JSON Lines (one JSON array of change records per
//! line) and hands each batch to the dispatcher. This is the redelivering
//! runtime around the dispatcher: a batch whose dispatch fails as a whole is
//! retried a bounded number of times, then dropped.
//!
//! ```json
//! [{"key":{"pointUrl":"10,20"},"eventName":"MODIFY","newImage":{...}}]
//! [{"key":{"pointUrl":"10,20"},"eventName":"REMOVE"}]
//! ```

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::change::ChangeRecord;
use crate::dispatcher::{ChangeDispatcher, DispatchReport};
use crate::error::Result;

/// How often a failed batch is handed to the dispatcher again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedeliveryPolicy {
    pub max_redeliveries: u32,
    pub delay: Duration,
}

impl Default for RedeliveryPolicy {
    fn default() -> Self {
        Self {
            max_redeliveries: 3,
            delay: Duration::from_millis(500),
        }
    }
}

/// Counters for one intake run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub batches: usize,
    pub dispatched: usize,
    pub redeliveries: usize,
    /// Batches given up on after the last redelivery
    pub dropped: usize,
    /// Lines that were not a batch of change records
    pub malformed: usize,
}

/// Decode one JSON Lines entry into a batch
pub fn parse_batch(line: &str) -> Result<Vec<ChangeRecord>> {
    Ok(serde_json::from_str(line)?)
}

/// Dispatch `batch`, redelivering on failure according to `policy`.
///
/// Returns the report of the attempt that succeeded, or `None` if every
/// attempt failed.
pub async fn dispatch_with_redelivery(
    dispatcher: &ChangeDispatcher,
    batch: &[ChangeRecord],
    policy: RedeliveryPolicy,
    stats: &mut FeedStats,
) -> Option<DispatchReport> {
    let mut attempt = 0;
    loop {
        match dispatcher.handle_batch(batch).await {
            Ok(report) => {
                stats.dispatched += 1;
                return Some(report);
            }
            Err(e) if attempt < policy.max_redeliveries => {
                attempt += 1;
                stats.redeliveries += 1;
                tracing::warn!(
                    "Dispatch failed ({}), redelivering batch ({}/{})",
                    e,
                    attempt,
                    policy.max_redeliveries
                );
                tokio::time::sleep(policy.delay).await;
            }
            Err(e) => {
                stats.dropped += 1;
                tracing::error!(
                    "Dropping batch of {} change(s) after {} redeliveries: {}",
                    batch.len(),
                    policy.max_redeliveries,
                    e
                );
                return None;
            }
        }
    }
}

/// Consume batches from `reader` until end of input
pub async fn run_change_feed<R>(
    reader: R,
    dispatcher: &ChangeDispatcher,
    policy: RedeliveryPolicy,
) -> Result<FeedStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = FeedStats::default();
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        stats.batches += 1;

        let batch = match parse_batch(line) {
            Ok(batch) => batch,
            Err(e) => {
                stats.malformed += 1;
                tracing::warn!("Skipping malformed change batch: {}", e);
                continue;
            }
        };

        dispatch_with_redelivery(dispatcher, &batch, policy, &mut stats).await;
    }

    tracing::info!(
        "Change feed ended: {} batch(es), {} dispatched, {} dropped, {} malformed",
        stats.batches,
        stats.dispatched,
        stats.dropped,
        stats.malformed
    );
    Ok(stats)
}
