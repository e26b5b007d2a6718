use std::fmt;

// === SyncError ===

/// Errors surfaced by the bookmark sync controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// No authenticated session exists. Fatal for the dashboard screen.
    SessionMissing,
    /// A reconciliation fetch failed. Previously loaded items are kept.
    FetchFailed(String),
    /// Inserting a new bookmark failed. Local items are unchanged.
    InsertFailed(String),
    /// The remote delete failed after the item was removed locally.
    DeleteFailed(String),
    /// Caller-supplied input was rejected before reaching the store.
    InvalidInput(String),
    /// The controller is disconnected.
    NotActive,
    /// The controller is already bound to another user.
    AlreadyActive(String),
    /// The change subscription could not be opened.
    SubscribeFailed(String),
}

impl SyncError {
    /// Returns true if the error should send the user back to the sign-in screen.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::SessionMissing)
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::SessionMissing => write!(f, "No active session"),
            SyncError::FetchFailed(msg) => write!(f, "Failed to load bookmarks: {}", msg),
            SyncError::InsertFailed(msg) => write!(f, "Failed to add bookmark: {}", msg),
            SyncError::DeleteFailed(msg) => write!(f, "Failed to delete bookmark: {}", msg),
            SyncError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            SyncError::NotActive => write!(f, "Bookmark sync is not active"),
            SyncError::AlreadyActive(user_id) => {
                write!(f, "Bookmark sync already active for user: {}", user_id)
            }
            SyncError::SubscribeFailed(msg) => {
                write!(f, "Failed to subscribe to bookmark changes: {}", msg)
            }
        }
    }
}

impl std::error::Error for SyncError {}

// === StoreError ===

/// Errors returned by bookmark store backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Local database operation failed.
    Database(String),
    /// HTTP transport or status error from a remote store.
    Http(String),
    /// A row or response body could not be decoded.
    Decode(String),
    /// The operation did not finish in time.
    Timeout,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Database(msg) => write!(f, "Bookmark database error: {}", msg),
            StoreError::Http(msg) => write!(f, "Bookmark backend HTTP error: {}", msg),
            StoreError::Decode(msg) => write!(f, "Bookmark decode error: {}", msg),
            StoreError::Timeout => write!(f, "Bookmark backend timed out"),
        }
    }
}

impl std::error::Error for StoreError {}

// === AuthError ===

/// Errors related to authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The email address is malformed.
    InvalidEmail(String),
    /// The password does not meet the minimum requirements.
    WeakPassword,
    /// An account with this email already exists.
    EmailTaken(String),
    /// Email or password did not match.
    InvalidCredentials,
    /// Database operation failed.
    Database(String),
    /// Password hashing failed.
    Crypto(String),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidEmail(email) => write!(f, "Invalid email: {}", email),
            AuthError::WeakPassword => {
                write!(f, "Password should be at least 6 characters")
            }
            AuthError::EmailTaken(email) => write!(f, "User already registered: {}", email),
            AuthError::InvalidCredentials => write!(f, "Invalid login credentials"),
            AuthError::Database(msg) => write!(f, "Auth database error: {}", msg),
            AuthError::Crypto(msg) => write!(f, "Auth crypto error: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

// === SettingsError ===

/// Errors related to settings management.
#[derive(Debug)]
pub enum SettingsError {
    /// An I/O error occurred while reading or writing settings.
    IoError(String),
    /// Failed to serialize or deserialize settings.
    SerializationError(String),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::IoError(msg) => write!(f, "Settings I/O error: {}", msg),
            SettingsError::SerializationError(msg) => {
                write!(f, "Settings serialization error: {}", msg)
            }
        }
    }
}

impl std::error::Error for SettingsError {}
