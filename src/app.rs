//! App Core for SmartMark.
//!
//! Wires settings, storage, auth, the change feed and the sync controller
//! together, and gates the dashboard on an authenticated session.

use std::error::Error;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::database::connection::Database;
use crate::managers::draft::BookmarkDraft;
use crate::managers::sync_controller::SyncController;
use crate::services::auth::{LocalAuthService, SessionProvider};
use crate::services::bookmark_store::{BookmarkStore, SqliteBookmarkStore};
use crate::services::change_feed::{ChangeFeed, ChangeNotifier, LocalChangeFeed};
use crate::services::search_debounce::SearchDebouncer;
use crate::services::settings_engine::{SettingsEngine, SettingsEngineTrait};
use crate::types::bookmark::Bookmark;
use crate::types::errors::{AuthError, SyncError};
use crate::types::session::User;
use crate::types::settings::{BackendKind, SyncSettings};

/// Central application struct holding all services and the controller.
///
/// Must be constructed inside a tokio runtime: the search debouncer and the
/// session watcher run as background tasks.
pub struct App {
    pub settings: SettingsEngine,
    pub db: Arc<Database>,
    pub auth: Arc<LocalAuthService>,
    pub store: Arc<dyn BookmarkStore>,
    pub feed: Arc<dyn ChangeFeed>,
    pub controller: Arc<SyncController>,
    pub search: SearchDebouncer,
    /// Add-form contents, kept across failed submits and cleared on sign-out.
    draft: Mutex<BookmarkDraft>,
    session_watcher: JoinHandle<()>,
}

impl App {
    /// Opens the database named in `settings` inside `data_dir`.
    pub fn open(data_dir: &Path, settings: SettingsEngine) -> Result<Self, Box<dyn Error>> {
        let db_path = data_dir.join(&settings.get_settings().backend.database_file);
        info!("Opening database at {}", db_path.display());
        let db = Database::open(&db_path)?;
        Self::with_database(db, settings)
    }

    /// Builds the app on top of an already opened database.
    pub fn with_database(db: Database, settings: SettingsEngine) -> Result<Self, Box<dyn Error>> {
        let db = Arc::new(db);
        let config = settings.get_settings().clone();

        let auth = Arc::new(LocalAuthService::new(db.clone()));
        let (store, feed) = build_backend(&db, &config)?;

        let controller = Arc::new(SyncController::new(
            store.clone(),
            feed.clone(),
            Duration::from_millis(config.sync.fetch_timeout_ms),
        ));
        let search = SearchDebouncer::new(Duration::from_millis(config.sync.search_debounce_ms));
        let session_watcher = spawn_session_watcher(&auth, &controller);

        Ok(Self {
            settings,
            db,
            auth,
            store,
            feed,
            controller,
            search,
            draft: Mutex::new(BookmarkDraft::default()),
            session_watcher,
        })
    }

    /// Starts bookmark sync for the signed-in user.
    ///
    /// Fails with [`SyncError::SessionMissing`] when nobody is signed in;
    /// the front end should send the user to the sign-in screen.
    pub async fn open_dashboard(&self) -> Result<User, SyncError> {
        let user = self
            .auth
            .current_user()
            .await
            .ok_or(SyncError::SessionMissing)?;
        self.controller.initialize(&user.id).await?;
        Ok(user)
    }

    /// Stops bookmark sync. Safe to call when already stopped.
    pub fn close_dashboard(&self) {
        self.controller.dispose();
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let user = self.auth.sign_in_with_password(email, password).await?;
        if self.controller.user_id().is_some_and(|active| active != user.id) {
            self.controller.dispose();
            self.clear_draft();
        }
        Ok(user)
    }

    pub fn sign_out(&self) {
        self.controller.dispose();
        self.clear_draft();
        self.auth.sign_out();
    }

    /// Current add-form contents.
    pub fn draft(&self) -> BookmarkDraft {
        self.lock_draft().clone()
    }

    /// Replaces the given add-form fields and returns the result.
    pub fn edit_draft(&self, title: Option<&str>, url: Option<&str>) -> BookmarkDraft {
        let mut draft = self.lock_draft();
        if let Some(title) = title {
            draft.title = title.to_string();
        }
        if let Some(url) = url {
            draft.url = url.to_string();
        }
        draft.clone()
    }

    /// Submits the add form. The form is cleared only when the insert succeeds.
    pub async fn submit_draft(&self) -> Result<Bookmark, SyncError> {
        let mut draft = self.draft();
        let saved = draft.submit(&self.controller).await?;
        *self.lock_draft() = draft;
        Ok(saved)
    }

    fn clear_draft(&self) {
        *self.lock_draft() = BookmarkDraft::default();
    }

    fn lock_draft(&self) -> MutexGuard<'_, BookmarkDraft> {
        self.draft.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.session_watcher.abort();
        self.controller.dispose();
    }
}

/// Picks the store and change feed for the configured backend.
fn build_backend(
    db: &Arc<Database>,
    config: &SyncSettings,
) -> Result<(Arc<dyn BookmarkStore>, Arc<dyn ChangeFeed>), Box<dyn Error>> {
    match config.backend.kind {
        BackendKind::Local => {
            let notifier = ChangeNotifier::new();
            let store: Arc<dyn BookmarkStore> =
                Arc::new(SqliteBookmarkStore::new(db.clone()).with_notifier(notifier.clone()));
            let feed: Arc<dyn ChangeFeed> = Arc::new(LocalChangeFeed::new(notifier));
            Ok((store, feed))
        }
        BackendKind::Rest => build_rest_backend(config),
    }
}

#[cfg(feature = "rest")]
fn build_rest_backend(
    config: &SyncSettings,
) -> Result<(Arc<dyn BookmarkStore>, Arc<dyn ChangeFeed>), Box<dyn Error>> {
    use crate::services::change_feed::PollingChangeFeed;
    use crate::services::rest_store::RestBookmarkStore;

    let url = config
        .backend
        .rest_url
        .as_deref()
        .ok_or("backend.rest_url is required for the rest backend")?;
    let key = config
        .backend
        .rest_api_key
        .as_deref()
        .ok_or("backend.rest_api_key is required for the rest backend")?;

    let request_timeout = Duration::from_millis(config.sync.fetch_timeout_ms);

    info!("Using REST backend at {}", url);
    let mut rest = RestBookmarkStore::new(url, key, request_timeout)?;
    if let Some(token) = config.backend.rest_access_token.as_deref() {
        rest = rest.with_access_token(token);
    }
    let store: Arc<dyn BookmarkStore> = Arc::new(rest);
    let feed: Arc<dyn ChangeFeed> = Arc::new(PollingChangeFeed::new(
        store.clone(),
        Duration::from_millis(config.sync.poll_interval_ms.max(1)),
        request_timeout,
    ));
    Ok((store, feed))
}

#[cfg(not(feature = "rest"))]
fn build_rest_backend(
    _config: &SyncSettings,
) -> Result<(Arc<dyn BookmarkStore>, Arc<dyn ChangeFeed>), Box<dyn Error>> {
    Err("smartmark was built without the `rest` feature".into())
}

/// Disposes the controller whenever the session ends or switches user.
fn spawn_session_watcher(
    auth: &LocalAuthService,
    controller: &Arc<SyncController>,
) -> JoinHandle<()> {
    let mut sessions = auth.subscribe();
    let controller = Arc::downgrade(controller);

    tokio::spawn(async move {
        while sessions.changed().await.is_ok() {
            let user_id = sessions.borrow_and_update().as_ref().map(|u| u.id.clone());
            let Some(strong) = controller.upgrade() else { break };
            let active = strong.user_id();
            if active.is_some() && active != user_id {
                debug!("Session changed, stopping bookmark sync");
                strong.dispose();
            }
        }
    })
}
