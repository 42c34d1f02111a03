use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// One pending local write waiting to reach the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub key: String,
    pub value: JsonValue,
    pub user_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
    /// Enqueue order; a newer write for the same slot always has a larger seq.
    pub seq: u64,
}

impl QueueItem {
    pub fn slot(&self) -> String {
        queue_slot(self.user_id.as_deref().unwrap_or_default(), &self.key)
    }
}

pub fn queue_slot(user_id: &str, key: &str) -> String {
    format!("{}:{}", user_id, key)
}

/// Outcome of recording a failed sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Still queued with the given retry count.
    Requeued(u32),
    /// Retry ceiling reached; the item left the queue.
    Dropped,
    /// The slot was overwritten or removed meanwhile; nothing changed.
    Superseded,
}

/// Pending writes keyed by `userId:key`. Last enqueued wins.
#[derive(Debug, Default)]
pub struct WriteQueue {
    items: HashMap<String, QueueItem>,
    next_seq: u64,
}

impl WriteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the pending item for `(user_id, key)`.
    ///
    /// Anonymous writes are never queued; `None` is returned for them.
    pub fn enqueue(
        &mut self,
        key: &str,
        value: JsonValue,
        user_id: Option<&str>,
    ) -> Option<QueueItem> {
        let user_id = user_id.filter(|id| !id.trim().is_empty())?;
        self.next_seq += 1;
        let item = QueueItem {
            key: key.to_string(),
            value,
            user_id: Some(user_id.to_string()),
            timestamp: Utc::now(),
            retry_count: 0,
            seq: self.next_seq,
        };
        self.items.insert(item.slot(), item.clone());
        Some(item)
    }

    /// Puts back an item exactly as it was, used when replaying a journal.
    pub fn restore(&mut self, item: QueueItem) {
        self.next_seq = self.next_seq.max(item.seq);
        let slot = item.slot();
        match self.items.get(&slot) {
            Some(existing) if existing.seq > item.seq => {}
            _ => {
                self.items.insert(slot, item);
            }
        }
    }

    /// Up to `limit` items, oldest first.
    pub fn batch(&self, limit: usize) -> Vec<QueueItem> {
        let mut items: Vec<&QueueItem> = self.items.values().collect();
        items.sort_by_key(|item| item.seq);
        items.into_iter().take(limit).cloned().collect()
    }

    /// Removes the slot only if it still holds the write with `seq`.
    pub fn remove_if_current(&mut self, slot: &str, seq: u64) -> bool {
        if self.items.get(slot).is_some_and(|item| item.seq == seq) {
            self.items.remove(slot);
            true
        } else {
            false
        }
    }

    pub fn record_failure(&mut self, slot: &str, seq: u64, max_retries: u32) -> RetryOutcome {
        let Some(item) = self.items.get_mut(slot).filter(|item| item.seq == seq) else {
            return RetryOutcome::Superseded;
        };
        item.retry_count += 1;
        if item.retry_count >= max_retries {
            self.items.remove(slot);
            RetryOutcome::Dropped
        } else {
            RetryOutcome::Requeued(item.retry_count)
        }
    }

    /// Replay helper: sets the retry count if the slot still holds `seq`.
    pub fn set_retry_count(&mut self, slot: &str, seq: u64, retry_count: u32) {
        if let Some(item) = self.items.get_mut(slot).filter(|item| item.seq == seq) {
            item.retry_count = retry_count;
        }
    }

    pub fn get(&self, user_id: &str, key: &str) -> Option<&QueueItem> {
        self.items.get(&queue_slot(user_id, key))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All items, oldest first.
    pub fn items(&self) -> Vec<QueueItem> {
        self.batch(usize::MAX)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
