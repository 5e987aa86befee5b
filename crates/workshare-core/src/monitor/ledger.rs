//! Bounded activity ledger
//!
//! In-memory FIFO log of element activity with per-element and per-user
//! indices. Entries are shared `Arc`s so the indices never copy activity
//! payloads.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  ActivityLedger                                                 │
//! │  ├── entries:    VecDeque<Arc<ElementActivity>>  (FIFO, capped) │
//! │  ├── by_element: HashMap<ElementId, VecDeque<Arc<..>>>          │
//! │  └── by_user:    HashMap<UserId, VecDeque<Arc<..>>>             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Eviction always removes the globally oldest entry, which is also the
//! front of its element and user queues, so the indices stay in step.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::config::DEFAULT_LEDGER_CAPACITY;
use crate::types::{ElementActivity, ElementId, UserId};

struct LedgerInner {
    entries: VecDeque<Arc<ElementActivity>>,
    by_element: HashMap<ElementId, VecDeque<Arc<ElementActivity>>>,
    by_user: HashMap<UserId, VecDeque<Arc<ElementActivity>>>,
    capacity: usize,
    evicted: u64,
}

impl LedgerInner {
    fn evict_oldest(&mut self) {
        let Some(oldest) = self.entries.pop_front() else {
            return;
        };
        pop_index(&mut self.by_element, &oldest.element_id, &oldest);
        pop_index(&mut self.by_user, &oldest.user_id, &oldest);
        self.evicted += 1;
    }
}

fn pop_index<K>(index: &mut HashMap<K, VecDeque<Arc<ElementActivity>>>, key: &K, entry: &Arc<ElementActivity>)
where
    K: std::hash::Hash + Eq,
{
    if let Some(queue) = index.get_mut(key) {
        if queue.front().is_some_and(|front| Arc::ptr_eq(front, entry)) {
            queue.pop_front();
        }
        if queue.is_empty() {
            index.remove(key);
        }
    }
}

fn newest_first(mut items: Vec<ElementActivity>) -> Vec<ElementActivity> {
    items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    items
}

/// Start of `window` ending at `now`, clamped to the earliest representable time
fn cutoff(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Thread-safe, capacity-bounded log of element activity
pub struct ActivityLedger {
    inner: RwLock<LedgerInner>,
}

impl ActivityLedger {
    /// Create a ledger that keeps at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(LedgerInner {
                entries: VecDeque::new(),
                by_element: HashMap::new(),
                by_user: HashMap::new(),
                capacity: capacity.max(1),
                evicted: 0,
            }),
        }
    }

    /// Append an activity, evicting the oldest entries past capacity.
    pub fn record(&self, activity: ElementActivity) {
        let entry = Arc::new(activity);
        let mut inner = self.inner.write();

        inner
            .by_element
            .entry(entry.element_id.clone())
            .or_default()
            .push_back(entry.clone());
        inner
            .by_user
            .entry(entry.user_id.clone())
            .or_default()
            .push_back(entry.clone());
        inner.entries.push_back(entry);

        while inner.entries.len() > inner.capacity {
            inner.evict_oldest();
        }
    }

    /// Up to `limit` activities on `element_id`, most recent first.
    pub fn history_for(&self, element_id: &ElementId, limit: usize) -> Vec<ElementActivity> {
        let inner = self.inner.read();
        let items = inner
            .by_element
            .get(element_id)
            .map(|q| q.iter().map(|a| (**a).clone()).collect())
            .unwrap_or_default();
        let mut items = newest_first(items);
        items.truncate(limit);
        items
    }

    /// Most recent activity on `element_id`
    pub fn latest_for(&self, element_id: &ElementId) -> Option<ElementActivity> {
        let inner = self.inner.read();
        inner
            .by_element
            .get(element_id)?
            .iter()
            .max_by_key(|a| a.timestamp)
            .map(|a| (**a).clone())
    }

    /// Most recent activity on `element_id` by anyone but `user_id`, no older
    /// than `window`.
    pub fn latest_by_other(
        &self,
        element_id: &ElementId,
        user_id: &UserId,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Option<ElementActivity> {
        let since = cutoff(now, window);
        let inner = self.inner.read();
        inner
            .by_element
            .get(element_id)?
            .iter()
            .filter(|a| &a.user_id != user_id && a.timestamp >= since)
            .max_by_key(|a| a.timestamp)
            .map(|a| (**a).clone())
    }

    /// Activities within the trailing `window`, oldest first
    pub fn active_since(&self, window: Duration, now: DateTime<Utc>) -> Vec<ElementActivity> {
        let since = cutoff(now, window);
        self.inner
            .read()
            .entries
            .iter()
            .filter(|a| a.timestamp >= since)
            .map(|a| (**a).clone())
            .collect()
    }

    /// All retained activities by `user_id`, most recent first
    pub fn by_user(&self, user_id: &UserId) -> Vec<ElementActivity> {
        let inner = self.inner.read();
        let items = inner
            .by_user
            .get(user_id)
            .map(|q| q.iter().map(|a| (**a).clone()).collect())
            .unwrap_or_default();
        newest_first(items)
    }

    /// Users with at least one activity in the trailing `window`
    pub fn active_users(&self, window: Duration, now: DateTime<Utc>) -> BTreeSet<UserId> {
        let since = cutoff(now, window);
        self.inner
            .read()
            .entries
            .iter()
            .filter(|a| a.timestamp >= since)
            .map(|a| a.user_id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.read().capacity
    }

    /// Total entries dropped by eviction since creation
    pub fn evicted(&self) -> u64 {
        self.inner.read().evicted
    }
}

impl Default for ActivityLedger {
    fn default() -> Self {
        Self::new(DEFAULT_LEDGER_CAPACITY)
    }
}
