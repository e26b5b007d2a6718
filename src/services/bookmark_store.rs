//! Bookmark storage for SmartMark.
//!
//! [`BookmarkStore`] is the contract the sync controller reconciles
//! against. [`SqliteBookmarkStore`] is the local implementation; the HTTP
//! implementation lives in [`crate::services::rest_store`].

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tracing::debug;
use uuid::Uuid;

use crate::database::connection::Database;
use crate::services::change_feed::ChangeNotifier;
use crate::types::bookmark::{Bookmark, NewBookmark};
use crate::types::errors::StoreError;
use crate::types::sync::{ChangeEvent, ChangeKind};

/// Trait defining remote bookmark storage.
///
/// Identifiers and creation timestamps are assigned here, never by callers.
#[async_trait]
pub trait BookmarkStore: Send + Sync {
    /// Returns all bookmarks owned by `owner_id`, newest first.
    async fn query(&self, owner_id: &str) -> Result<Vec<Bookmark>, StoreError>;

    /// Inserts a bookmark and returns the stored row.
    async fn insert(&self, record: NewBookmark) -> Result<Bookmark, StoreError>;

    /// Deletes the bookmark `id` if it is owned by `owner_id`.
    ///
    /// Deleting a row that is missing or owned by someone else matches no
    /// rows and succeeds.
    async fn delete(&self, id: &str, owner_id: &str) -> Result<(), StoreError>;
}

/// Bookmark store backed by the `bookmarks` table.
pub struct SqliteBookmarkStore {
    db: Arc<Database>,
    notifier: Option<ChangeNotifier>,
    last_created_at: AtomicI64,
}

impl SqliteBookmarkStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            notifier: None,
            last_created_at: AtomicI64::new(0),
        }
    }

    /// Publishes a [`ChangeEvent`] on every successful write.
    pub fn with_notifier(mut self, notifier: ChangeNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Returns a strictly increasing creation timestamp in microseconds.
    fn next_created_at(&self) -> i64 {
        let now = Utc::now().timestamp_micros();
        let previous = self
            .last_created_at
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
            .unwrap_or(now);
        now.max(previous + 1)
    }

    fn publish(&self, owner_id: &str, kind: ChangeKind) {
        if let Some(notifier) = &self.notifier {
            notifier.publish(ChangeEvent {
                owner_id: owner_id.to_string(),
                kind,
            });
        }
    }

    /// Runs `work` against the connection on the blocking pool.
    async fn with_connection<T, F>(&self, work: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || work(&*db.connection()))
            .await
            .map_err(|e| StoreError::Database(format!("Store task failed: {}", e)))?
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn row_to_bookmark(row: &rusqlite::Row) -> rusqlite::Result<Bookmark> {
        let micros: i64 = row.get(4)?;
        let created_at = DateTime::<Utc>::from_timestamp_micros(micros)
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(4, micros))?;
        Ok(Bookmark {
            id: row.get(0)?,
            title: row.get(1)?,
            url: row.get(2)?,
            user_id: row.get(3)?,
            created_at,
        })
    }
}

#[async_trait]
impl BookmarkStore for SqliteBookmarkStore {
    async fn query(&self, owner_id: &str) -> Result<Vec<Bookmark>, StoreError> {
        let owner_id = owner_id.to_string();
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, url, user_id, created_at FROM bookmarks \
                 WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC",
            )?;
            let rows = stmt.query_map(params![owner_id], Self::row_to_bookmark)?;
            let bookmarks = rows.collect::<rusqlite::Result<Vec<Bookmark>>>()?;
            Ok(bookmarks)
        })
        .await
    }

    async fn insert(&self, record: NewBookmark) -> Result<Bookmark, StoreError> {
        let micros = self.next_created_at();
        let created_at = DateTime::<Utc>::from_timestamp_micros(micros)
            .ok_or_else(|| StoreError::Decode(format!("timestamp out of range: {}", micros)))?;
        let row = Bookmark {
            id: Uuid::new_v4().to_string(),
            title: record.title,
            url: record.url,
            user_id: record.user_id,
            created_at,
        };

        let stored = row.clone();
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO bookmarks (id, title, url, user_id, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![stored.id, stored.title, stored.url, stored.user_id, micros],
            )
        })
        .await?;

        debug!(bookmark_id = %row.id, owner_id = %row.user_id, "Bookmark inserted");
        self.publish(&row.user_id, ChangeKind::Insert);
        Ok(row)
    }

    async fn delete(&self, id: &str, owner_id: &str) -> Result<(), StoreError> {
        let (bookmark_id, owner) = (id.to_string(), owner_id.to_string());
        let affected = self
            .with_connection(move |conn| {
                conn.execute(
                    "DELETE FROM bookmarks WHERE id = ?1 AND user_id = ?2",
                    params![bookmark_id, owner],
                )
            })
            .await?;

        if affected > 0 {
            debug!(bookmark_id = id, owner_id, "Bookmark deleted");
            self.publish(owner_id, ChangeKind::Delete);
        }
        Ok(())
    }
}
