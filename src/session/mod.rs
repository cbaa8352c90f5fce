//! Cookie sessions backed by SQLite.
//!
//! Holds the logged-in user and one-shot flash messages shown on the next
//! rendered page.

use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_sessions::{cookie::SameSite, Expiry, Session, SessionManagerLayer};
use tower_sessions_sqlx_store::SqliteStore;

use crate::config::Config;
use crate::errors::AppError;
use crate::models::User;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "stores_session";

/// Session expiry time in seconds (14 days).
const SESSION_EXPIRY_SECONDS: i64 = 14 * 24 * 60 * 60;

/// Keys used inside the session record.
pub mod keys {
    pub const USER: &str = "user";
    pub const FLASHES: &str = "flashes";
}

/// Create the session store and its table.
pub async fn init_store(pool: &SqlitePool) -> Result<SqliteStore, sqlx::Error> {
    let store = SqliteStore::new(pool.clone());
    store.migrate().await?;
    Ok(store)
}

/// Create the session layer for the router.
pub fn create_session_layer(
    store: SqliteStore,
    config: &Config,
) -> SessionManagerLayer<SqliteStore> {
    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_secure(config.secure_cookies())
        .with_same_site(SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}

/// The user as remembered by the session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionUser {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl From<&User> for SessionUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

/// A one-shot message for the next page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Flash {
    /// `success` or `error`; doubles as the CSS class.
    pub kind: String,
    pub message: String,
}

async fn push_flash(session: &Session, kind: &str, message: &str) -> Result<(), AppError> {
    let mut flashes: Vec<Flash> = session.get(keys::FLASHES).await?.unwrap_or_default();
    flashes.push(Flash {
        kind: kind.to_string(),
        message: message.to_string(),
    });
    session.insert(keys::FLASHES, flashes).await?;
    Ok(())
}

pub async fn flash_success(session: &Session, message: &str) -> Result<(), AppError> {
    push_flash(session, "success", message).await
}

pub async fn flash_error(session: &Session, message: &str) -> Result<(), AppError> {
    push_flash(session, "error", message).await
}

/// Flash every message carried by an error.
pub async fn flash_errors(session: &Session, error: &AppError) -> Result<(), AppError> {
    for message in error.flash_messages() {
        flash_error(session, &message).await?;
    }
    Ok(())
}

/// Remove and return all pending flashes.
pub async fn take_flashes(session: &Session) -> Result<Vec<Flash>, AppError> {
    Ok(session
        .remove::<Vec<Flash>>(keys::FLASHES)
        .await?
        .unwrap_or_default())
}

/// Remember `user` as logged in, rotating the session id.
pub async fn login(session: &Session, user: &User) -> Result<(), AppError> {
    session.cycle_id().await?;
    session.insert(keys::USER, SessionUser::from(user)).await?;
    Ok(())
}

/// Forget the logged-in user; pending flashes survive.
pub async fn logout(session: &Session) -> Result<(), AppError> {
    session.remove::<SessionUser>(keys::USER).await?;
    session.cycle_id().await?;
    Ok(())
}

pub async fn current_user(session: &Session) -> Result<Option<SessionUser>, AppError> {
    Ok(session.get(keys::USER).await?)
}

/// Data every rendered page needs: who is logged in and what to flash.
///
/// Extracting it consumes the pending flashes.
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    pub user: Option<SessionUser>,
    pub flashes: Vec<Flash>,
}

impl PageContext {
    /// Build the context from a session, consuming its flashes.
    pub async fn load(session: &Session) -> Result<Self, AppError> {
        Ok(Self {
            user: current_user(session).await?,
            flashes: take_flashes(session).await?,
        })
    }

    pub fn is_logged_in(&self) -> bool {
        self.user.is_some()
    }
}

impl<S> FromRequestParts<S> for PageContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<Session>() {
            Some(session) => Self::load(session).await,
            None => Ok(Self::default()),
        }
    }
}
