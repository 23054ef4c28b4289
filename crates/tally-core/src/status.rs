//! # Queue Status
//!
//! Aggregate counts the UI shows next to the online/offline indicator.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::{QueueItem, QueueItemState};

/// Counts over the whole sync queue.
///
/// `pending + synced + failed == total` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub total: u64,
    /// Unsynced with attempts below the retry ceiling.
    pub pending: u64,
    pub synced: u64,
    /// Unsynced with attempts at or beyond the ceiling (dead-lettered).
    pub failed: u64,
}

impl QueueStatus {
    /// Tallies items against a retry ceiling.
    pub fn from_items<'a>(items: impl IntoIterator<Item = &'a QueueItem>, max_retries: u32) -> Self {
        items
            .into_iter()
            .fold(QueueStatus::default(), |mut status, item| {
                status.total += 1;
                match item.state(max_retries) {
                    QueueItemState::Pending { .. } => status.pending += 1,
                    QueueItemState::Synced => status.synced += 1,
                    QueueItemState::DeadLettered { .. } => status.failed += 1,
                }
                status
            })
    }

    /// True when nothing is waiting for the server.
    pub fn is_drained(&self) -> bool {
        self.pending == 0
    }
}
