//! Unit tests for SmartMark error types: Display messages and classification.

use smartmark::types::errors::{AuthError, SettingsError, StoreError, SyncError};

#[test]
fn test_sync_error_messages() {
    assert_eq!(SyncError::SessionMissing.to_string(), "No active session");
    assert_eq!(
        SyncError::FetchFailed("boom".into()).to_string(),
        "Failed to load bookmarks: boom"
    );
    assert_eq!(
        SyncError::InsertFailed("boom".into()).to_string(),
        "Failed to add bookmark: boom"
    );
    assert_eq!(
        SyncError::DeleteFailed("boom".into()).to_string(),
        "Failed to delete bookmark: boom"
    );
    assert_eq!(
        SyncError::InvalidInput("title is required".into()).to_string(),
        "Invalid input: title is required"
    );
    assert_eq!(SyncError::NotActive.to_string(), "Bookmark sync is not active");
    assert_eq!(
        SyncError::AlreadyActive("u1".into()).to_string(),
        "Bookmark sync already active for user: u1"
    );
    assert_eq!(
        SyncError::SubscribeFailed("closed".into()).to_string(),
        "Failed to subscribe to bookmark changes: closed"
    );
}

/// Only a missing session sends the user back to sign-in.
#[test]
fn test_only_session_missing_is_fatal() {
    assert!(SyncError::SessionMissing.is_fatal());
    for err in [
        SyncError::FetchFailed(String::new()),
        SyncError::InsertFailed(String::new()),
        SyncError::DeleteFailed(String::new()),
        SyncError::InvalidInput(String::new()),
        SyncError::NotActive,
        SyncError::AlreadyActive(String::new()),
        SyncError::SubscribeFailed(String::new()),
    ] {
        assert!(!err.is_fatal(), "{:?} should not be fatal", err);
    }
}

#[test]
fn test_store_error_messages() {
    assert_eq!(
        StoreError::Database("locked".into()).to_string(),
        "Bookmark database error: locked"
    );
    assert_eq!(
        StoreError::Http("503".into()).to_string(),
        "Bookmark backend HTTP error: 503"
    );
    assert_eq!(
        StoreError::Decode("bad json".into()).to_string(),
        "Bookmark decode error: bad json"
    );
    assert_eq!(StoreError::Timeout.to_string(), "Bookmark backend timed out");
}

#[test]
fn test_auth_error_messages() {
    assert_eq!(
        AuthError::InvalidEmail("nope".into()).to_string(),
        "Invalid email: nope"
    );
    assert_eq!(
        AuthError::WeakPassword.to_string(),
        "Password should be at least 6 characters"
    );
    assert_eq!(
        AuthError::EmailTaken("a@b.c".into()).to_string(),
        "User already registered: a@b.c"
    );
    assert_eq!(AuthError::InvalidCredentials.to_string(), "Invalid login credentials");
    assert_eq!(
        AuthError::Database("x".into()).to_string(),
        "Auth database error: x"
    );
    assert_eq!(AuthError::Crypto("x".into()).to_string(), "Auth crypto error: x");
}

#[test]
fn test_settings_error_messages_carry_detail() {
    let errors = [
        SettingsError::IoError("disk full".into()),
        SettingsError::SerializationError("disk full".into()),
    ];
    for err in &errors {
        assert!(err.to_string().contains("disk full"), "{:?}", err);
    }
}

#[test]
fn test_errors_implement_std_error() {
    fn assert_error<E: std::error::Error>(_: &E) {}
    assert_error(&SyncError::NotActive);
    assert_error(&StoreError::Timeout);
    assert_error(&AuthError::WeakPassword);
    assert_error(&SettingsError::IoError("k".into()));
}
