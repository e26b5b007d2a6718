//! Authentication for SmartMark.
//!
//! [`SessionProvider`] is the narrow contract the dashboard needs: who is
//! signed in, if anyone. [`LocalAuthService`] implements it with
//! email/password accounts stored in SQLite. Passwords are hashed with
//! PBKDF2-HMAC-SHA256 and a random per-account salt.

use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use rusqlite::params;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::database::connection::Database;
use crate::types::errors::AuthError;
use crate::types::session::User;

const PBKDF2_ITERATIONS: u32 = 100_000;
const SALT_LENGTH: usize = 16;
const HASH_LENGTH: usize = 32;
const MIN_PASSWORD_LENGTH: usize = 6;

/// Source of the currently authenticated user.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Returns the signed-in user, or `None` when there is no session.
    async fn current_user(&self) -> Option<User>;
}

/// Email/password accounts backed by the `users` table.
///
/// Holds at most one active session. Session changes are published on a
/// watch channel so listeners can tear down user-scoped state on sign-out.
pub struct LocalAuthService {
    db: Arc<Database>,
    rng: SystemRandom,
    session: watch::Sender<Option<User>>,
}

impl LocalAuthService {
    pub fn new(db: Arc<Database>) -> Self {
        let (session, _) = watch::channel(None);
        Self {
            db,
            rng: SystemRandom::new(),
            session,
        }
    }

    /// Creates an account. Does not sign in.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::WeakPassword);
        }

        let mut salt = [0u8; SALT_LENGTH];
        self.rng
            .fill(&mut salt)
            .map_err(|_| AuthError::Crypto("Failed to generate salt".to_string()))?;

        let password = Zeroizing::new(password.to_string());
        let db = Arc::clone(&self.db);
        let id = Uuid::new_v4().to_string();

        let user = run_blocking(move || {
            let hash = Zeroizing::new(hash_password(&password, &salt)?);
            let now = chrono::Utc::now().timestamp();
            let result = db.connection().execute(
                "INSERT INTO users (id, email, password_hash, salt, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, email, hash.as_slice(), salt.as_slice(), now],
            );
            match result {
                Ok(_) => Ok(User { id, email }),
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Err(AuthError::EmailTaken(email))
                }
                Err(e) => Err(AuthError::Database(e.to_string())),
            }
        })
        .await?;

        info!(user_id = %user.id, "Account created");
        Ok(user)
    }

    /// Verifies credentials and makes the account the active session.
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = normalize_email(email).map_err(|_| AuthError::InvalidCredentials)?;
        let password = Zeroizing::new(password.to_string());
        let db = Arc::clone(&self.db);

        let user = run_blocking(move || {
            let row = db.connection().query_row(
                "SELECT id, password_hash, salt FROM users WHERE email = ?1",
                params![email],
                |row| {
                    let id: String = row.get(0)?;
                    let hash: Vec<u8> = row.get(1)?;
                    let salt: Vec<u8> = row.get(2)?;
                    Ok((id, Zeroizing::new(hash), salt))
                },
            );

            let (id, stored_hash, salt) = match row {
                Ok(found) => found,
                Err(rusqlite::Error::QueryReturnedNoRows) => return Err(AuthError::InvalidCredentials),
                Err(e) => return Err(AuthError::Database(e.to_string())),
            };

            pbkdf2::verify(
                pbkdf2::PBKDF2_HMAC_SHA256,
                iterations()?,
                &salt,
                password.as_bytes(),
                &stored_hash,
            )
            .map_err(|_| {
                warn!("Rejected sign-in attempt");
                AuthError::InvalidCredentials
            })?;

            Ok(User { id, email })
        })
        .await?;

        info!(user_id = %user.id, "Signed in");
        self.session.send_replace(Some(user.clone()));
        Ok(user)
    }

    /// Ends the active session, if any.
    pub fn sign_out(&self) {
        if let Some(previous) = self.session.send_replace(None) {
            info!(user_id = %previous.id, "Signed out");
        }
    }

    /// Returns a receiver that observes sign-in and sign-out.
    pub fn subscribe(&self) -> watch::Receiver<Option<User>> {
        self.session.subscribe()
    }

    /// Synchronous read of the active session.
    pub fn user(&self) -> Option<User> {
        self.session.borrow().clone()
    }
}

#[async_trait]
impl SessionProvider for LocalAuthService {
    async fn current_user(&self) -> Option<User> {
        self.user()
    }
}

/// Runs key derivation and SQLite work on the blocking pool.
async fn run_blocking<T, F>(work: F) -> Result<T, AuthError>
where
    F: FnOnce() -> Result<T, AuthError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AuthError::Database(format!("Auth task failed: {}", e)))?
}

fn iterations() -> Result<NonZeroU32, AuthError> {
    NonZeroU32::new(PBKDF2_ITERATIONS)
        .ok_or_else(|| AuthError::Crypto("Invalid iteration count".to_string()))
}

fn hash_password(password: &str, salt: &[u8]) -> Result<[u8; HASH_LENGTH], AuthError> {
    let mut out = [0u8; HASH_LENGTH];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations()?,
        salt,
        password.as_bytes(),
        &mut out,
    );
    Ok(out)
}

/// Trims and lowercases an email, rejecting obviously malformed input.
pub fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    };
    if valid {
        Ok(email)
    } else {
        Err(AuthError::InvalidEmail(email))
    }
}
