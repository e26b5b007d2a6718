//! Bookmark Sync Controller for SmartMark.
//!
//! Owns the in-memory list of the signed-in user's bookmarks and keeps it
//! consistent with a [`BookmarkStore`] and a [`ChangeFeed`]:
//!
//! - every change notification triggers a full re-fetch, never a patch;
//! - deletes are applied locally first and sent to the store afterwards;
//! - every fetch carries a sequence number, and a response older than the
//!   last applied one is dropped;
//! - `dispose` bumps a generation counter, and continuations started under
//!   an older generation drop their results.
//!
//! All operations take `&self`, so a controller can be shared as
//! `Arc<SyncController>` and driven from concurrent tasks. The state mutex
//! is never held across an `.await`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::services::bookmark_store::BookmarkStore;
use crate::services::change_feed::{ChangeCallback, ChangeFeed, SubscriptionHandle};
use crate::types::bookmark::{filter_bookmarks, normalize_url, sort_newest_first, Bookmark, NewBookmark};
use crate::types::errors::{StoreError, SyncError};
use crate::types::sync::{ConnectionState, SyncSnapshot};

/// Default upper bound for a single reconciliation fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SyncController {
    core: Arc<ControllerCore>,
}

struct ControllerCore {
    store: Arc<dyn BookmarkStore>,
    feed: Arc<dyn ChangeFeed>,
    fetch_timeout: Duration,
    state: Mutex<ControllerState>,
    revision: watch::Sender<u64>,
}

struct ControllerState {
    user_id: Option<String>,
    items: Vec<Bookmark>,
    connection: ConnectionState,
    /// Bumped by every initialize and dispose.
    generation: u64,
    issued_seq: u64,
    applied_seq: u64,
    /// Deletes sent to the store and not yet answered.
    pending_deletes: HashSet<String>,
    /// Confirmed deletes, keyed to the last fetch sequence issued before
    /// confirmation. Fetches up to that sequence may still contain the row.
    tombstones: HashMap<String, u64>,
    subscription: Option<SubscriptionHandle>,
    last_error: Option<SyncError>,
    revision: u64,
}

impl ControllerState {
    fn new() -> Self {
        Self {
            user_id: None,
            items: Vec::new(),
            connection: ConnectionState::Disconnected,
            generation: 0,
            issued_seq: 0,
            applied_seq: 0,
            pending_deletes: HashSet::new(),
            tombstones: HashMap::new(),
            subscription: None,
            last_error: None,
            revision: 0,
        }
    }

    /// Builds the new item list from a fetch result.
    ///
    /// Drops foreign rows, duplicates and rows deleted locally but possibly
    /// still present in a fetch issued before the delete landed.
    fn reconcile_rows(&self, rows: Vec<Bookmark>, owner: &str, seq: u64) -> Vec<Bookmark> {
        let mut seen = HashSet::new();
        let mut items: Vec<Bookmark> = rows
            .into_iter()
            .filter(|b| b.user_id == owner)
            .filter(|b| !self.pending_deletes.contains(&b.id))
            .filter(|b| self.tombstones.get(&b.id).map_or(true, |&t| seq > t))
            .filter(|b| seen.insert(b.id.clone()))
            .collect();
        sort_newest_first(&mut items);
        items
    }
}

impl ControllerCore {
    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publishes a new revision. Call with the state lock held.
    fn touch(&self, st: &mut ControllerState) {
        st.revision += 1;
        self.revision.send_replace(st.revision);
    }

    fn active_owner(&self) -> Result<(String, u64), SyncError> {
        let st = self.lock();
        match (&st.user_id, st.connection.is_active()) {
            (Some(owner), true) => Ok((owner.clone(), st.generation)),
            _ => Err(SyncError::NotActive),
        }
    }

    fn record_error(&self, generation: u64, err: &SyncError) {
        let mut st = self.lock();
        if st.generation == generation {
            st.last_error = Some(err.clone());
            self.touch(&mut st);
        }
    }

    /// Runs one full fetch and applies it unless it is stale or the
    /// controller was disposed in the meantime.
    async fn reconcile(&self, expected_generation: Option<u64>) -> Result<(), SyncError> {
        let (seq, generation, owner) = {
            let mut st = self.lock();
            if !st.connection.is_active() {
                return Err(SyncError::NotActive);
            }
            if expected_generation.is_some_and(|g| g != st.generation) {
                return Err(SyncError::NotActive);
            }
            let owner = st.user_id.clone().ok_or(SyncError::NotActive)?;
            st.issued_seq += 1;
            if st.connection != ConnectionState::Syncing {
                st.connection = ConnectionState::Syncing;
                self.touch(&mut st);
            }
            (st.issued_seq, st.generation, owner)
        };

        debug!(seq, owner_id = %owner, "Fetching bookmarks");
        let result = match tokio::time::timeout(self.fetch_timeout, self.store.query(&owner)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout),
        };

        let mut st = self.lock();
        if st.generation != generation || !st.connection.is_active() {
            debug!(seq, "Dropping fetch result after dispose");
            return Err(SyncError::NotActive);
        }
        if seq <= st.applied_seq {
            debug!(seq, applied = st.applied_seq, "Discarding stale fetch result");
            return Ok(());
        }
        st.applied_seq = seq;
        let newer_in_flight = st.issued_seq > seq;

        match result {
            Ok(rows) => {
                st.items = st.reconcile_rows(rows, &owner, seq);
                st.tombstones.retain(|_, t| *t >= seq);
                st.connection = if newer_in_flight {
                    ConnectionState::Syncing
                } else {
                    ConnectionState::Live
                };
                st.last_error = None;
                self.touch(&mut st);
                debug!(seq, count = st.items.len(), "Bookmarks reconciled");
                Ok(())
            }
            Err(e) => {
                let err = SyncError::FetchFailed(e.to_string());
                warn!(seq, "{}", err);
                st.connection = if newer_in_flight {
                    ConnectionState::Syncing
                } else {
                    ConnectionState::Error
                };
                st.last_error = Some(err.clone());
                self.touch(&mut st);
                Err(err)
            }
        }
    }

    /// Opens the change subscription for `generation` unless one is open.
    async fn ensure_subscription(self: &Arc<Self>, owner: &str, generation: u64) -> Result<(), SyncError> {
        if self.lock().subscription.is_some() {
            return Ok(());
        }

        let weak = Arc::downgrade(self);
        let on_change: ChangeCallback = Arc::new(move || {
            let Some(core) = weak.upgrade() else { return };
            tokio::spawn(async move {
                debug!("Change notification received");
                if let Err(e) = core.reconcile(Some(generation)).await {
                    debug!("Reconciliation after notification failed: {}", e);
                }
            });
        });

        let handle = match self.feed.subscribe(owner, on_change).await {
            Ok(handle) => handle,
            Err(e) => {
                let err = SyncError::SubscribeFailed(e.to_string());
                warn!(owner_id = owner, "{}", err);
                let mut st = self.lock();
                if st.generation == generation {
                    st.connection = ConnectionState::Error;
                    st.last_error = Some(err.clone());
                    self.touch(&mut st);
                }
                return Err(err);
            }
        };

        let mut st = self.lock();
        if st.generation != generation {
            drop(st);
            self.feed.unsubscribe(handle);
            return Err(SyncError::NotActive);
        }
        if st.subscription.is_some() {
            // A concurrent retry for the same generation got there first.
            drop(st);
            self.feed.unsubscribe(handle);
            return Ok(());
        }
        st.subscription = Some(handle);
        Ok(())
    }
}

impl SyncController {
    pub fn new(
        store: Arc<dyn BookmarkStore>,
        feed: Arc<dyn ChangeFeed>,
        fetch_timeout: Duration,
    ) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            core: Arc::new(ControllerCore {
                store,
                feed,
                fetch_timeout,
                state: Mutex::new(ControllerState::new()),
                revision,
            }),
        }
    }

    /// Binds the controller to `user_id`, subscribes to its changes and
    /// loads its bookmarks.
    ///
    /// Calling again for the same user while live or syncing is a no-op.
    /// While in the error state it retries. A different user must wait for
    /// [`dispose`](Self::dispose).
    pub async fn initialize(&self, user_id: &str) -> Result<(), SyncError> {
        if user_id.is_empty() {
            return Err(SyncError::SessionMissing);
        }

        let generation = {
            let mut st = self.core.lock();
            if st.connection.is_active() {
                let active = st.user_id.clone().unwrap_or_default();
                if active != user_id {
                    return Err(SyncError::AlreadyActive(active));
                }
                if st.connection != ConnectionState::Error {
                    debug!(user_id, "Sync already active");
                    return Ok(());
                }
                st.generation
            } else {
                st.generation += 1;
                st.user_id = Some(user_id.to_string());
                st.connection = ConnectionState::Syncing;
                st.items.clear();
                st.last_error = None;
                self.core.touch(&mut st);
                info!(user_id, "Bookmark sync starting");
                st.generation
            }
        };

        self.core.ensure_subscription(user_id, generation).await?;
        self.core.reconcile(Some(generation)).await
    }

    /// Validates, normalizes and inserts a bookmark, then reconciles.
    ///
    /// Returns the row as stored. On failure the local list is untouched.
    pub async fn add(&self, title: &str, raw_url: &str) -> Result<Bookmark, SyncError> {
        let title = title.trim();
        let raw_url = raw_url.trim();
        if title.is_empty() {
            return Err(SyncError::InvalidInput("title is required".to_string()));
        }
        if raw_url.is_empty() {
            return Err(SyncError::InvalidInput("url is required".to_string()));
        }

        let (owner, generation) = self.core.active_owner()?;
        let record = NewBookmark {
            title: title.to_string(),
            url: normalize_url(raw_url),
            user_id: owner,
        };

        let inserted = match self.core.store.insert(record).await {
            Ok(row) => row,
            Err(e) => {
                let err = SyncError::InsertFailed(e.to_string());
                warn!("{}", err);
                self.core.record_error(generation, &err);
                return Err(err);
            }
        };
        info!(bookmark_id = %inserted.id, "Bookmark added");

        // The insert already succeeded; a failed refresh is reported through state.
        if let Err(e) = self.core.reconcile(Some(generation)).await {
            debug!("Reconciliation after insert failed: {}", e);
        }
        Ok(inserted)
    }

    /// Removes a bookmark locally, then deletes it from the store.
    ///
    /// Unknown ids are a no-op. If the remote delete fails the row stays
    /// hidden until the next successful reconciliation brings it back.
    pub async fn remove(&self, bookmark_id: &str) -> Result<(), SyncError> {
        let (owner, generation) = {
            let mut st = self.core.lock();
            let Some(index) = st.items.iter().position(|b| b.id == bookmark_id) else {
                debug!(bookmark_id, "Delete of unknown bookmark ignored");
                return Ok(());
            };
            let Some(owner) = st.user_id.clone() else {
                return Ok(());
            };
            st.items.remove(index);
            st.pending_deletes.insert(bookmark_id.to_string());
            self.core.touch(&mut st);
            (owner, st.generation)
        };

        let result = self.core.store.delete(bookmark_id, &owner).await;

        let mut st = self.core.lock();
        let current = st.generation == generation;
        if current {
            st.pending_deletes.remove(bookmark_id);
        }

        match result {
            Ok(()) => {
                if current {
                    let issued = st.issued_seq;
                    st.tombstones.insert(bookmark_id.to_string(), issued);
                }
                info!(bookmark_id, "Bookmark deleted");
                Ok(())
            }
            Err(e) => {
                let err = SyncError::DeleteFailed(e.to_string());
                warn!(bookmark_id, "{}", err);
                if current {
                    st.last_error = Some(err.clone());
                    self.core.touch(&mut st);
                }
                Err(err)
            }
        }
    }

    /// Re-fetches the active user's bookmarks. This is the manual retry.
    ///
    /// Reopens the change subscription first if an earlier attempt failed,
    /// so the controller never reports `Live` without one.
    pub async fn refresh(&self) -> Result<(), SyncError> {
        let (owner, generation) = self.core.active_owner()?;
        self.core.ensure_subscription(&owner, generation).await?;
        self.core.reconcile(Some(generation)).await
    }

    /// Closes the subscription and forgets the user. Idempotent.
    pub fn dispose(&self) {
        let handle = {
            let mut st = self.core.lock();
            if !st.connection.is_active() && st.subscription.is_none() {
                return;
            }
            st.generation += 1;
            st.connection = ConnectionState::Disconnected;
            if let Some(user_id) = st.user_id.take() {
                info!(user_id = %user_id, "Bookmark sync stopped");
            }
            st.items.clear();
            st.pending_deletes.clear();
            st.tombstones.clear();
            st.last_error = None;
            self.core.touch(&mut st);
            st.subscription.take()
        };

        if let Some(handle) = handle {
            self.core.feed.unsubscribe(handle);
        }
    }

    /// Bookmarks matching `query`, newest first.
    pub fn filtered(&self, query: &str) -> Vec<Bookmark> {
        filter_bookmarks(&self.core.lock().items, query)
    }

    pub fn items(&self) -> Vec<Bookmark> {
        self.core.lock().items.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.core.lock().connection
    }

    pub fn user_id(&self) -> Option<String> {
        self.core.lock().user_id.clone()
    }

    pub fn last_error(&self) -> Option<SyncError> {
        self.core.lock().last_error.clone()
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        let st = self.core.lock();
        SyncSnapshot {
            user_id: st.user_id.clone(),
            items: st.items.clone(),
            state: st.connection,
            last_error: st.last_error.as_ref().map(|e| e.to_string()),
            revision: st.revision,
        }
    }

    /// Observes state revisions. Every applied change bumps the value.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.core.revision.subscribe()
    }
}

impl Drop for SyncController {
    fn drop(&mut self) {
        self.dispose();
    }
}
