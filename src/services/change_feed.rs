//! Change notification channels for SmartMark.
//!
//! A [`ChangeFeed`] delivers an at-least-once, payload-free "rows owned by
//! this user changed" signal. The sync controller reacts to every signal
//! with a full re-fetch, so feeds never need to describe what changed.
//!
//! - [`LocalChangeFeed`] fans out events published by the SQLite store
//!   through a `tokio::sync::broadcast` channel.
//! - [`PollingChangeFeed`] works with any store: it polls the owner's rows
//!   and fires when any of them is added, removed or edited.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::services::bookmark_store::BookmarkStore;
use crate::types::bookmark::Bookmark;
use crate::types::errors::StoreError;
use crate::types::sync::ChangeEvent;

/// Capacity of the broadcast buffer behind [`ChangeNotifier`].
const NOTIFIER_CAPACITY: usize = 64;

/// Callback fired on every change notification.
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// Opaque handle for an open subscription.
#[derive(Debug, PartialEq, Eq)]
pub struct SubscriptionHandle {
    id: u64,
    owner_id: String,
}

impl SubscriptionHandle {
    /// Creates a handle. Feeds choose ids unique among their own subscriptions.
    pub fn new(id: u64, owner_id: impl Into<String>) -> Self {
        Self {
            id,
            owner_id: owner_id.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }
}

/// Trait defining a change-notification channel.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Starts delivering notifications for rows owned by `owner_id`.
    async fn subscribe(
        &self,
        owner_id: &str,
        on_change: ChangeCallback,
    ) -> Result<SubscriptionHandle, StoreError>;

    /// Stops a subscription. Unknown handles are ignored.
    fn unsubscribe(&self, handle: SubscriptionHandle);

    /// Number of subscriptions currently open.
    fn active_subscriptions(&self) -> usize;
}

/// Background delivery tasks keyed by subscription id.
#[derive(Default)]
struct SubscriptionTasks {
    next_id: AtomicU64,
    tasks: Mutex<HashMap<u64, JoinHandle<()>>>,
}

impl SubscriptionTasks {
    fn insert(&self, owner_id: &str, task: JoinHandle<()>) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, task);
        SubscriptionHandle::new(id, owner_id)
    }

    fn remove(&self, handle: &SubscriptionHandle) {
        if let Some(task) = self.lock().remove(&handle.id) {
            task.abort();
            debug!(owner_id = %handle.owner_id, "Change subscription closed");
        }
    }

    fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for SubscriptionTasks {
    fn drop(&mut self) {
        for (_, task) in self.lock().drain() {
            task.abort();
        }
    }
}

// === Local feed ===

/// Publishing side of the in-process change channel.
#[derive(Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(NOTIFIER_CAPACITY);
        Self { tx }
    }

    /// Publishes an event. Having no listeners is not an error.
    pub fn publish(&self, event: ChangeEvent) {
        let _ = self.tx.send(event);
    }

    /// Receives every event published from now on, for all owners.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Change feed for stores living in the same process.
pub struct LocalChangeFeed {
    notifier: ChangeNotifier,
    tasks: SubscriptionTasks,
}

impl LocalChangeFeed {
    pub fn new(notifier: ChangeNotifier) -> Self {
        Self {
            notifier,
            tasks: SubscriptionTasks::default(),
        }
    }
}

#[async_trait]
impl ChangeFeed for LocalChangeFeed {
    async fn subscribe(
        &self,
        owner_id: &str,
        on_change: ChangeCallback,
    ) -> Result<SubscriptionHandle, StoreError> {
        // Subscribe before spawning so nothing published after we return is missed.
        let mut rx = self.notifier.subscribe();
        let owner = owner_id.to_string();

        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) if event.owner_id == owner => on_change(),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(owner_id = %owner, skipped, "Change feed lagged");
                        on_change();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        debug!(owner_id, "Local change subscription opened");
        Ok(self.tasks.insert(owner_id, task))
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.tasks.remove(&handle);
    }

    fn active_subscriptions(&self) -> usize {
        self.tasks.len()
    }
}

// === Polling feed ===

/// Change feed that detects remote changes by polling the store.
pub struct PollingChangeFeed {
    store: Arc<dyn BookmarkStore>,
    interval: Duration,
    query_timeout: Duration,
    tasks: SubscriptionTasks,
}

impl PollingChangeFeed {
    /// Polls every `interval`. Each poll is abandoned after `query_timeout`.
    pub fn new(store: Arc<dyn BookmarkStore>, interval: Duration, query_timeout: Duration) -> Self {
        Self {
            store,
            interval,
            query_timeout,
            tasks: SubscriptionTasks::default(),
        }
    }
}

async fn poll(store: &dyn BookmarkStore, owner_id: &str, limit: Duration) -> Result<Vec<Bookmark>, StoreError> {
    match tokio::time::timeout(limit, store.query(owner_id)).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout),
    }
}

#[async_trait]
impl ChangeFeed for PollingChangeFeed {
    async fn subscribe(
        &self,
        owner_id: &str,
        on_change: ChangeCallback,
    ) -> Result<SubscriptionHandle, StoreError> {
        let baseline = poll(self.store.as_ref(), owner_id, self.query_timeout).await;
        if let Err(e) = &baseline {
            warn!(owner_id, "Initial poll failed: {}", e);
        }

        let store = Arc::clone(&self.store);
        let owner = owner_id.to_string();
        let period = self.interval;
        let limit = self.query_timeout;

        let task = tokio::spawn(async move {
            // Whole rows, so edits to title or url count as changes too.
            let mut last: Option<Vec<Bookmark>> = baseline.ok();
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately; the baseline already covers it.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                match poll(store.as_ref(), &owner, limit).await {
                    Ok(rows) => {
                        let changed = last.as_ref().is_some_and(|prev| *prev != rows);
                        last = Some(rows);
                        if changed {
                            on_change();
                        }
                    }
                    Err(e) => debug!(owner_id = %owner, "Poll failed: {}", e),
                }
            }
        });

        debug!(owner_id, interval_ms = period.as_millis() as u64, "Polling change subscription opened");
        Ok(self.tasks.insert(owner_id, task))
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.tasks.remove(&handle);
    }

    fn active_subscriptions(&self) -> usize {
        self.tasks.len()
    }
}
